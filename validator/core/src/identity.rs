//! Role definitions and federated credentials of managed identities.

use crate::authz::ActionSet;
use serde::{Deserialize, Serialize};

/// The role the cluster identity needs on each platform identity to manage
/// its federated credentials.
pub const FEDERATED_CREDENTIAL_ROLE_ID: &str = "ef318e2a-8334-4a05-9e4a-295a196c6a6e";

/// Audience of every federated credential the platform creates.
pub const FEDERATED_CREDENTIAL_AUDIENCE: &str = "openshift";

const SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub data_actions: Vec<String>,
}

/// The role a platform operator's identity must be assigned for a given
/// OpenShift version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformWorkloadIdentityRole {
    pub operator_name: String,
    #[serde(default)]
    pub role_definition_name: String,
    #[serde(default)]
    pub role_definition_id: String,
    #[serde(default)]
    pub service_accounts: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedIdentityCredential {
    pub name: String,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub audiences: Vec<String>,
}

// === impl RoleDefinition ===

impl RoleDefinition {
    /// Every action and data action the role grants.
    pub fn action_set(&self) -> ActionSet {
        self.permissions
            .iter()
            .flat_map(|p| p.actions.iter().chain(p.data_actions.iter()))
            .cloned()
            .collect()
    }
}

// === impl PlatformWorkloadIdentityRole ===

impl PlatformWorkloadIdentityRole {
    /// The federated credentials the platform provisions for this role on a
    /// cluster: one per service account.
    pub fn expected_credentials(
        &self,
        cluster_name: &str,
        issuer: &str,
    ) -> Vec<FederatedIdentityCredential> {
        self.service_accounts
            .iter()
            .map(|sa| {
                let account = sa
                    .strip_prefix(SERVICE_ACCOUNT_PREFIX)
                    .and_then(|s| s.rsplit(':').next())
                    .unwrap_or(sa);
                FederatedIdentityCredential {
                    name: format!("{cluster_name}_{account}"),
                    issuer: issuer.to_string(),
                    subject: sa.clone(),
                    audiences: vec![FEDERATED_CREDENTIAL_AUDIENCE.to_string()],
                }
            })
            .collect()
    }
}

// === impl FederatedIdentityCredential ===

impl FederatedIdentityCredential {
    /// Matches on name, issuer, subject and audience.
    pub fn matches(&self, expected: &FederatedIdentityCredential) -> bool {
        self.name.eq_ignore_ascii_case(&expected.name)
            && self.issuer == expected.issuer
            && self.subject == expected.subject
            && self.audiences == expected.audiences
    }
}
