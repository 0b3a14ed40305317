use ahash::AHashSet as HashSet;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SUBNET_SUCCEEDED: &str = "Succeeded";

/// A subnet referenced by the cluster document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subnet {
    /// The subnet's resource id.
    pub id: String,

    /// Where the subnet is referenced in the cluster document, e.g.
    /// `properties.workerProfiles[0].subnetId`. Used for error targets.
    pub path: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetwork {
    pub id: String,
    pub location: String,
    #[serde(default)]
    pub subnets: Vec<VirtualNetworkSubnet>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkSubnet {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_prefix: Option<String>,
    #[serde(default)]
    pub address_prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_security_group: Option<SubResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_table: Option<SubResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nat_gateway: Option<SubResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubResource {
    pub id: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid CIDR address: {0}")]
pub struct InvalidCidr(pub String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{other} overlaps with {net}")]
pub struct CidrOverlap {
    pub net: IpNet,
    pub other: IpNet,
}

// === impl Subnet ===

impl Subnet {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

/// Drops subnets whose id repeats an earlier one, ignoring case. Enriched
/// worker pools commonly share a subnet.
pub fn unique_subnets(subnets: &[Subnet]) -> Vec<Subnet> {
    let mut seen = HashSet::with_capacity(subnets.len());
    subnets
        .iter()
        .filter(|s| seen.insert(s.id.to_lowercase()))
        .cloned()
        .collect()
}

// === impl VirtualNetwork ===

impl VirtualNetwork {
    pub fn subnet(&self, id: &str) -> Option<&VirtualNetworkSubnet> {
        self.subnets.iter().find(|s| s.id.eq_ignore_ascii_case(id))
    }
}

// === impl VirtualNetworkSubnet ===

impl VirtualNetworkSubnet {
    /// The subnet's address prefixes; the singular form wins when set.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        let single = self.address_prefix.as_deref();
        let many = single
            .is_none()
            .then(|| self.address_prefixes.iter().map(String::as_str))
            .into_iter()
            .flatten();
        single.into_iter().chain(many)
    }

    pub fn nsg_id(&self) -> Option<&str> {
        Self::sub_resource_id(&self.network_security_group)
    }

    pub fn route_table_id(&self) -> Option<&str> {
        Self::sub_resource_id(&self.route_table)
    }

    pub fn nat_gateway_id(&self) -> Option<&str> {
        Self::sub_resource_id(&self.nat_gateway)
    }

    pub fn is_succeeded(&self) -> bool {
        self.provisioning_state.as_deref() == Some(SUBNET_SUCCEEDED)
    }

    fn sub_resource_id(r: &Option<SubResource>) -> Option<&str> {
        r.as_ref().map(|r| r.id.as_str()).filter(|id| !id.is_empty())
    }
}

/// Parses a CIDR, masking off any host bits.
pub fn parse_cidr(s: &str) -> Result<IpNet, InvalidCidr> {
    s.parse::<IpNet>()
        .map(|net| net.trunc())
        .map_err(|_| InvalidCidr(s.to_string()))
}

/// Fails on the first pair of networks that share any address.
pub fn verify_no_overlap(nets: &[IpNet]) -> Result<(), CidrOverlap> {
    for (i, net) in nets.iter().enumerate() {
        for (j, other) in nets.iter().enumerate() {
            if i == j {
                continue;
            }
            if net.contains(&other.network()) || net.contains(&other.broadcast()) {
                return Err(CidrOverlap {
                    net: *net,
                    other: *other,
                });
            }
        }
    }
    Ok(())
}
