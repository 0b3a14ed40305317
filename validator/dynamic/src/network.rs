//! Virtual network, subnet and network security group validation.

use crate::{cache::VirtualNetworkCache, errors::LinkedResource, Error, Result, Validator};
use admission_validator_core::{
    cluster::{Cluster, FeatureState},
    network::{parse_cidr, unique_subnets, verify_no_overlap, VirtualNetworkSubnet},
    resource_id::split_subnet_id,
    CloudError, ErrorCode, ErrorKind, ResourceId, Subnet,
};
use ahash::AHashSet as HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const MINIMUM_SUBNET_PREFIX_LEN: u8 = 27;

const VNET_ACTIONS: &[&str] = &[
    "Microsoft.Network/virtualNetworks/join/action",
    "Microsoft.Network/virtualNetworks/read",
    "Microsoft.Network/virtualNetworks/write",
    "Microsoft.Network/virtualNetworks/subnets/join/action",
    "Microsoft.Network/virtualNetworks/subnets/read",
    "Microsoft.Network/virtualNetworks/subnets/write",
];

const SUBNET_ACTIONS: &[&str] = &[
    "Microsoft.Network/virtualNetworks/subnets/join/action",
    "Microsoft.Network/virtualNetworks/subnets/read",
    "Microsoft.Network/virtualNetworks/subnets/write",
];

const ROUTE_TABLE_ACTIONS: &[&str] = &[
    "Microsoft.Network/routeTables/join/action",
    "Microsoft.Network/routeTables/read",
    "Microsoft.Network/routeTables/write",
];

const NAT_GATEWAY_ACTIONS: &[&str] = &[
    "Microsoft.Network/natGateways/join/action",
    "Microsoft.Network/natGateways/read",
    "Microsoft.Network/natGateways/write",
];

const NSG_ACTIONS: &[&str] = &["Microsoft.Network/networkSecurityGroups/join/action"];

const NSG_NOT_PROPERLY_ATTACHED: &str = "When the enable-preconfigured-nsg option is specified, both the master and worker subnets should have network security groups (NSG) attached to them before starting the cluster installation.";

pub(crate) async fn validate_vnet(
    v: &Validator,
    cancel: &CancellationToken,
    location: &str,
    subnets: &[Subnet],
    additional_cidrs: &[&str],
) -> Result<()> {
    if subnets.is_empty() {
        return Err(Error::NoSubnets);
    }
    let subnets = unique_subnets(subnets);
    let mut cache = VirtualNetworkCache::new(&*v.clients.virtual_networks);

    let mut seen = HashSet::new();
    let mut vnets = Vec::new();
    for s in &subnets {
        let (vnet_id, _) = split_subnet_id(&s.id)?;
        let vnet = vnet_id.parse::<ResourceId>()?;
        if seen.insert(vnet_id.to_lowercase()) {
            vnets.push(vnet);
        }
    }

    for vnet in &vnets {
        v.validate_linked(cancel, LinkedResource::VirtualNetwork, vnet.as_str(), "", VNET_ACTIONS)
            .await?;
        validate_vnet_location(cancel, &mut cache, vnet, location).await?;
    }

    for s in &subnets {
        v.validate_linked(cancel, LinkedResource::Subnet, &s.id, &s.path, SUBNET_ACTIONS)
            .await?;
    }

    for s in &subnets {
        let route_table = find_subnet(cancel, &mut cache, &s.id, "")
            .await?
            .route_table_id()
            .map(str::to_string);
        if let Some(id) = route_table {
            v.validate_linked(cancel, LinkedResource::RouteTable, &id, "", ROUTE_TABLE_ACTIONS)
                .await?;
        }
    }

    for s in &subnets {
        let nat_gateway = find_subnet(cancel, &mut cache, &s.id, "")
            .await?
            .nat_gateway_id()
            .map(str::to_string);
        if let Some(id) = nat_gateway {
            v.validate_linked(cancel, LinkedResource::NatGateway, &id, "", NAT_GATEWAY_ACTIONS)
                .await?;
        }
    }

    validate_cidr_ranges(cancel, &mut cache, &subnets, additional_cidrs).await
}

async fn validate_vnet_location(
    cancel: &CancellationToken,
    cache: &mut VirtualNetworkCache<'_>,
    vnet: &ResourceId,
    location: &str,
) -> Result<()> {
    debug!(%vnet, "Validating vnet location");
    let network = match cache.get(cancel, vnet, None).await {
        Ok(network) => network,
        Err(e) if e.is_not_found() => {
            return Err(LinkedResource::VirtualNetwork.not_found(vnet.as_str(), "").into())
        }
        Err(e) => return Err(e),
    };

    if !network.location.eq_ignore_ascii_case(location) {
        return Err(CloudError::structural(
            ErrorCode::InvalidLinkedVNet,
            "",
            format!(
                "The vnet location '{}' must match the cluster location '{location}'.",
                network.location
            ),
        )
        .into());
    }
    Ok(())
}

async fn validate_cidr_ranges(
    cancel: &CancellationToken,
    cache: &mut VirtualNetworkCache<'_>,
    subnets: &[Subnet],
    additional_cidrs: &[&str],
) -> Result<()> {
    debug!("Validating CIDR ranges");
    let mut nets = Vec::new();
    for s in subnets {
        let subnet = find_subnet(cancel, cache, &s.id, "").await?;
        for prefix in subnet.prefixes() {
            nets.push(parse_cidr(prefix)?);
        }
    }
    for cidr in additional_cidrs {
        nets.push(parse_cidr(cidr)?);
    }

    verify_no_overlap(&nets).map_err(|overlap| {
        CloudError::structural(
            ErrorCode::InvalidLinkedVNet,
            "",
            format!("The provided CIDRs must not overlap: '{overlap}'."),
        )
        .into()
    })
}

pub(crate) async fn validate_subnets(
    v: &Validator,
    cancel: &CancellationToken,
    oc: &Cluster,
    subnets: &[Subnet],
) -> Result<()> {
    debug!("Validating subnets");
    let mut cache = VirtualNetworkCache::new(&*v.clients.virtual_networks);
    let found = resolve_subnets(cancel, &mut cache, subnets).await?;

    let preconfigured = oc.properties.network_profile.preconfigured_nsg == FeatureState::Enabled;
    let creating = oc.is_creating();
    if creating && preconfigured {
        let attached = found.iter().filter(|(_, ss)| ss.nsg_id().is_some()).count();
        if attached != 0 && attached != found.len() {
            return Err(CloudError::structural(
                ErrorCode::InvalidLinkedVNet,
                "",
                NSG_NOT_PROPERLY_ATTACHED,
            )
            .into());
        }
        info!(attached, "Cluster creation with preconfigured NSGs");
    }

    for (s, ss) in &found {
        if creating {
            if !preconfigured && ss.nsg_id().is_some() {
                return Err(invalid_subnet(
                    s,
                    format!(
                        "The provided subnet '{}' is invalid: must not have a network security group attached.",
                        s.id
                    ),
                ));
            }
        } else if !preconfigured {
            let expected = oc.platform_nsg_id(&s.id)?;
            let attached = ss
                .nsg_id()
                .is_some_and(|id| id.eq_ignore_ascii_case(&expected));
            if !attached {
                return Err(invalid_subnet(
                    s,
                    format!(
                        "The provided subnet '{}' is invalid: must have network security group '{expected}' attached.",
                        s.id
                    ),
                ));
            }
        } else if ss.nsg_id().is_none() {
            return Err(invalid_subnet(
                s,
                format!(
                    "The provided subnet '{}' is invalid: must have a network security group attached.",
                    s.id
                ),
            ));
        }

        if !ss.is_succeeded() {
            return Err(invalid_subnet(
                s,
                format!("The provided subnet '{}' is not in a Succeeded state", s.id),
            ));
        }

        for prefix in ss.prefixes() {
            if parse_cidr(prefix)?.prefix_len() > MINIMUM_SUBNET_PREFIX_LEN {
                return Err(invalid_subnet(
                    s,
                    format!("The provided subnet '{}' is invalid: must be /27 or larger.", s.id),
                ));
            }
        }
    }
    Ok(())
}

pub(crate) async fn validate_pre_configured_nsgs(
    v: &Validator,
    cancel: &CancellationToken,
    oc: &Cluster,
    subnets: &[Subnet],
) -> Result<()> {
    if oc.properties.network_profile.preconfigured_nsg != FeatureState::Enabled {
        return Ok(());
    }
    debug!("Validating preconfigured NSGs");

    let mut cache = VirtualNetworkCache::new(&*v.clients.virtual_networks);
    let found = resolve_subnets(cancel, &mut cache, subnets).await?;

    let mut seen = HashSet::new();
    let mut nsgs = Vec::new();
    for (_, ss) in &found {
        let nsg = ss.nsg_id().ok_or_else(|| {
            CloudError::not_found(ErrorCode::NotFound, "", NSG_NOT_PROPERLY_ATTACHED)
        })?;
        if seen.insert(nsg.to_lowercase()) {
            nsgs.push(nsg.to_string());
        }
    }

    let mut denied = Vec::new();
    for nsg in &nsgs {
        match v
            .validate_linked(cancel, LinkedResource::NetworkSecurityGroup, nsg, "", NSG_ACTIONS)
            .await
        {
            Ok(()) => {}
            Err(Error::Cloud(e)) if e.kind() == ErrorKind::PermissionDenied => denied.push(e),
            Err(e) => return Err(e),
        }
    }

    match CloudError::combined(denied) {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Resolves each distinct subnet in its network, in the order given.
async fn resolve_subnets(
    cancel: &CancellationToken,
    cache: &mut VirtualNetworkCache<'_>,
    subnets: &[Subnet],
) -> Result<Vec<(Subnet, VirtualNetworkSubnet)>> {
    if subnets.is_empty() {
        return Err(Error::NoSubnets);
    }

    let mut found = Vec::with_capacity(subnets.len());
    for s in unique_subnets(subnets) {
        let subnet = find_subnet(cancel, cache, &s.id, &s.path).await?.clone();
        found.push((s, subnet));
    }
    Ok(found)
}

async fn find_subnet<'c>(
    cancel: &CancellationToken,
    cache: &'c mut VirtualNetworkCache<'_>,
    id: &str,
    target: &str,
) -> Result<&'c VirtualNetworkSubnet> {
    match cache.subnet(cancel, id).await {
        Ok(Some(subnet)) => Ok(subnet),
        Ok(None) => Err(LinkedResource::Subnet.not_found(id, target).into()),
        Err(e) if e.is_not_found() => Err(LinkedResource::Subnet.not_found(id, target).into()),
        Err(e) => Err(e),
    }
}

fn invalid_subnet(s: &Subnet, message: String) -> Error {
    CloudError::structural(ErrorCode::InvalidLinkedVNet, &s.path, message).into()
}
