//! Snapshots of the compute and network resources the validators inspect.

use crate::network::SubResource;
use serde::{Deserialize, Serialize};

pub const ENCRYPTION_AT_HOST_CAPABILITY: &str = "EncryptionAtHostSupported";
pub const VIRTUAL_MACHINES: &str = "virtualMachines";
pub const PUBLIC_IP_ADDRESSES: &str = "PublicIPAddresses";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskEncryptionSet {
    pub id: String,
    pub location: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSku {
    pub name: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<SkuCapability>,
    #[serde(default)]
    pub restrictions: Vec<SkuRestriction>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SkuCapability {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuRestriction {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub name: UsageName,
    pub current_value: i64,
    pub limit: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageName {
    pub value: String,
    #[serde(default)]
    pub localized_value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendAddressPool {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub backend_ip_configurations: Vec<SubResource>,
}

// === impl ResourceSku ===

impl ResourceSku {
    pub fn capability(&self, name: &str) -> Option<&str> {
        self.capabilities
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    /// Whether the SKU is offered, unrestricted, in `location`.
    pub fn is_available_in(&self, location: &str) -> bool {
        let listed = self
            .locations
            .iter()
            .any(|l| l.eq_ignore_ascii_case(location));
        let restricted = self.restrictions.iter().any(|r| {
            r.kind == "Location" && r.values.iter().any(|v| v.eq_ignore_ascii_case(location))
        });
        listed && !restricted
    }
}
