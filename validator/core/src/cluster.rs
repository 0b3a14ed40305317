//! The subset of the cluster document the dynamic validators read.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire value of the original cluster architecture, with one NSG per role.
pub const ARCHITECTURE_VERSION_V1: u32 = 0;

/// Wire value of the current architecture, with a single shared NSG.
pub const ARCHITECTURE_VERSION_V2: u32 = 1;

const NSG_SUFFIX_V1_CONTROL_PLANE: &str = "-controlplane-nsg";
const NSG_SUFFIX_V1_NODE: &str = "-node-nsg";
const NSG_SUFFIX_V2: &str = "-nsg";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ManagedServiceIdentity>,
    #[serde(default)]
    pub properties: ClusterProperties,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedServiceIdentity {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub user_assigned_identities: BTreeMap<String, UserAssignedIdentity>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAssignedIdentity {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub principal_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterProperties {
    #[serde(default)]
    pub provisioning_state: ProvisioningState,
    #[serde(default)]
    pub architecture_version: u32,
    #[serde(rename = "infraId", default)]
    pub infra_id: String,
    #[serde(default)]
    pub cluster_profile: ClusterProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_principal_profile: Option<ServicePrincipalProfile>,
    #[serde(default)]
    pub network_profile: NetworkProfile,
    #[serde(default)]
    pub master_profile: MasterProfile,
    #[serde(default)]
    pub worker_profiles: Vec<WorkerProfile>,
    #[serde(default)]
    pub worker_profiles_status: Vec<WorkerProfile>,
    #[serde(default)]
    pub ingress_profiles: Vec<IngressProfile>,
    #[serde(
        rename = "platformWorkloadIdentityProfile",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub platform_workload_identity_profile: Option<PlatformWorkloadIdentityProfile>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ProvisioningState {
    #[default]
    Creating,
    Updating,
    AdminUpdating,
    Succeeded,
    Failed,
    Deleting,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum FeatureState {
    Enabled,
    #[default]
    Disabled,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterProfile {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub resource_group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_issuer: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipalProfile {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub sp_object_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    #[serde(default)]
    pub pod_cidr: String,
    #[serde(default)]
    pub service_cidr: String,
    #[serde(default)]
    pub outbound_type: OutboundType,
    #[serde(rename = "preconfiguredNSG", default)]
    pub preconfigured_nsg: FeatureState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_profile: Option<LoadBalancerProfile>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum OutboundType {
    #[default]
    Loadbalancer,
    UserDefinedRouting,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerProfile {
    #[serde(
        rename = "managedOutboundIps",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub managed_outbound_ips: Option<ManagedOutboundIps>,
    #[serde(rename = "effectiveOutboundIps", default)]
    pub effective_outbound_ips: Vec<EffectiveOutboundIp>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ManagedOutboundIps {
    pub count: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EffectiveOutboundIp {
    pub id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterProfile {
    #[serde(default)]
    pub vm_size: String,
    #[serde(default)]
    pub subnet_id: String,
    #[serde(default)]
    pub encryption_at_host: FeatureState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_encryption_set_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vm_size: String,
    #[serde(default)]
    pub subnet_id: String,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub encryption_at_host: FeatureState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_encryption_set_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformWorkloadIdentityProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgradeable_to: Option<String>,
    #[serde(default)]
    pub platform_workload_identities: BTreeMap<String, PlatformWorkloadIdentity>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformWorkloadIdentity {
    pub resource_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub object_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown architecture version {0}")]
pub struct UnknownArchitectureVersion(pub u32);

// === impl Cluster ===

impl Cluster {
    pub fn is_creating(&self) -> bool {
        self.properties.provisioning_state == ProvisioningState::Creating
    }

    /// Worker pools as currently known, along with the document property
    /// they were read from.
    ///
    /// Once a cluster is running its pools are enriched from the live
    /// machine sets and reported under `workerProfilesStatus`.
    pub fn worker_profiles(&self) -> (&[WorkerProfile], &'static str) {
        if self.properties.worker_profiles_status.is_empty() {
            (&self.properties.worker_profiles, "workerProfiles")
        } else {
            (
                &self.properties.worker_profiles_status,
                "workerProfilesStatus",
            )
        }
    }

    /// The name of the platform-managed resource group.
    pub fn resource_group_name(&self) -> &str {
        let id = &self.properties.cluster_profile.resource_group_id;
        id.rsplit('/').next().unwrap_or(id)
    }

    pub fn has_public_ingress(&self) -> bool {
        self.properties
            .ingress_profiles
            .iter()
            .any(|p| p.visibility == Visibility::Public)
    }

    /// The id of the NSG the platform attaches to the given subnet.
    pub fn platform_nsg_id(&self, subnet_id: &str) -> Result<String, UnknownArchitectureVersion> {
        let props = &self.properties;
        let suffix = match props.architecture_version {
            ARCHITECTURE_VERSION_V1
                if subnet_id.eq_ignore_ascii_case(&props.master_profile.subnet_id) =>
            {
                NSG_SUFFIX_V1_CONTROL_PLANE
            }
            ARCHITECTURE_VERSION_V1 => NSG_SUFFIX_V1_NODE,
            ARCHITECTURE_VERSION_V2 => NSG_SUFFIX_V2,
            v => return Err(UnknownArchitectureVersion(v)),
        };
        Ok(format!(
            "{}/providers/Microsoft.Network/networkSecurityGroups/{}{suffix}",
            props.cluster_profile.resource_group_id, props.infra_id
        ))
    }

    /// The OpenShift minor versions the platform identity set must satisfy:
    /// the installed one, followed by the upgrade target when it is newer.
    pub fn identity_minor_versions(&self) -> Vec<String> {
        let mut versions = Vec::with_capacity(2);
        let current = minor_version(&self.properties.cluster_profile.version);
        if let Some(current) = current {
            versions.push(current.to_string());
        }

        let upgradeable = self
            .properties
            .platform_workload_identity_profile
            .as_ref()
            .and_then(|p| p.upgradeable_to.as_deref())
            .and_then(minor_version);
        if let Some(upgradeable) = upgradeable {
            let newer = match current {
                Some(current) => parse_minor(upgradeable) > parse_minor(current),
                None => true,
            };
            if newer {
                versions.push(upgradeable.to_string());
            }
        }
        versions
    }
}

/// Truncates `X.Y.Z` to `X.Y`.
pub fn minor_version(version: &str) -> Option<&str> {
    let mut dots = version.match_indices('.');
    let (major_end, _) = dots.next()?;
    if major_end == 0 {
        return None;
    }
    match dots.next() {
        Some((minor_end, _)) => Some(&version[..minor_end]),
        None if version.len() > major_end + 1 => Some(version),
        None => None,
    }
}

fn parse_minor(version: &str) -> (u32, u32) {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}
