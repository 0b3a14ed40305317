use crate::{cancellable, Result, Validator};
use admission_validator_core::{
    cluster::{Cluster, LoadBalancerProfile, OutboundType},
    resources::PUBLIC_IP_ADDRESSES,
    CloudError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// SNAT ports each frontend IP contributes.
const FRONTEND_PORTS_PER_IP: i64 = 63992;

/// SNAT ports allocated to each backend instance.
const PORTS_PER_INSTANCE: i64 = 1024;

pub(crate) async fn validate(v: &Validator, cancel: &CancellationToken, oc: &Cluster) -> Result<()> {
    let network = &oc.properties.network_profile;
    if network.outbound_type == OutboundType::UserDefinedRouting {
        debug!("Skipping load balancer validation for user-defined routing");
        return Ok(());
    }
    let (lb, managed_ips) = match &network.load_balancer_profile {
        Some(lb) => match &lb.managed_outbound_ips {
            Some(ips) => (lb, i64::from(ips.count)),
            None => return Ok(()),
        },
        None => return Ok(()),
    };

    validate_ip_quota(v, cancel, oc, lb, managed_ips).await?;
    if !oc.is_creating() {
        validate_backend_capacity(v, cancel, oc, managed_ips).await?;
    }
    Ok(())
}

async fn validate_ip_quota(
    v: &Validator,
    cancel: &CancellationToken,
    oc: &Cluster,
    lb: &LoadBalancerProfile,
    managed_ips: i64,
) -> Result<()> {
    let requested = if oc.is_creating() {
        managed_ips + i64::from(oc.has_public_ingress())
    } else {
        managed_ips - lb.effective_outbound_ips.len() as i64
    };

    let usages = cancellable(cancel, v.clients.network_usages.list(&oc.location)).await??;
    let usage = match usages
        .iter()
        .find(|u| u.name.value.eq_ignore_ascii_case(PUBLIC_IP_ADDRESSES))
    {
        Some(usage) => usage,
        None => {
            info!(location = %oc.location, "No public IP usage reported");
            return Ok(());
        }
    };

    if requested > usage.limit - usage.current_value {
        return Err(CloudError::quota_exceeded(
            "properties.networkProfile.loadBalancerProfile.ManagedOutboundIPs.Count",
            format!(
                "Resource quota of {PUBLIC_IP_ADDRESSES} exceeded. Maximum allowed: {}, Current in use: {}, Additional requested: {requested}.",
                usage.limit, usage.current_value
            ),
        )
        .into());
    }
    Ok(())
}

async fn validate_backend_capacity(
    v: &Validator,
    cancel: &CancellationToken,
    oc: &Cluster,
    managed_ips: i64,
) -> Result<()> {
    let infra_id = &oc.properties.infra_id;
    let pool = cancellable(
        cancel,
        v.clients
            .backend_address_pools
            .get(oc.resource_group_name(), infra_id, infra_id),
    )
    .await??;

    let instances = pool.backend_ip_configurations.len() as i64;
    let frontend_ports = managed_ips * FRONTEND_PORTS_PER_IP;
    let max_instances = frontend_ports / PORTS_PER_INSTANCE;
    if instances > max_instances {
        return Err(CloudError::invalid_parameter(
            "properties.networkProfile.loadBalancerProfile",
            format!(
                "Insufficient frontend ports to support the backend instance count.  Total frontend ports: {frontend_ports}, Required frontend ports: {}, Total backend instances: {instances}",
                instances * PORTS_PER_INSTANCE
            ),
        )
        .into());
    }
    Ok(())
}
