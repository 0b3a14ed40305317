//! Collaborators the validators read cloud state through.

use crate::{
    authz::{AuthorizationDecisionResponse, AuthorizationRequest},
    identity::{FederatedIdentityCredential, RoleDefinition},
    network::VirtualNetwork,
    resources::{BackendAddressPool, DiskEncryptionSet, ResourceSku, Usage},
};
use http::StatusCode;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// A failed call to a cloud API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The service answered with an error status.
    #[error("{status}: {message}")]
    Response { status: StatusCode, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A bearer token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
}

#[async_trait::async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken>;
}

/// The authorization-decision service.
#[async_trait::async_trait]
pub trait CheckAccess: Send + Sync {
    /// Returns `None` when the service answers without a body.
    async fn check_access(
        &self,
        req: &AuthorizationRequest,
    ) -> Result<Option<AuthorizationDecisionResponse>>;
}

#[async_trait::async_trait]
pub trait VirtualNetworks: Send + Sync {
    async fn get(
        &self,
        resource_group: &str,
        name: &str,
        expand: Option<&str>,
    ) -> Result<VirtualNetwork>;
}

#[async_trait::async_trait]
pub trait DiskEncryptionSets: Send + Sync {
    async fn get(&self, resource_group: &str, name: &str) -> Result<DiskEncryptionSet>;
}

#[async_trait::async_trait]
pub trait ResourceSkus: Send + Sync {
    async fn list(&self, filter: &str) -> Result<Vec<ResourceSku>>;
}

#[async_trait::async_trait]
pub trait NetworkUsages: Send + Sync {
    async fn list(&self, location: &str) -> Result<Vec<Usage>>;
}

#[async_trait::async_trait]
pub trait LoadBalancerBackendAddressPools: Send + Sync {
    async fn get(
        &self,
        resource_group: &str,
        load_balancer: &str,
        pool: &str,
    ) -> Result<BackendAddressPool>;
}

#[async_trait::async_trait]
pub trait RoleDefinitions: Send + Sync {
    async fn get_by_id(&self, role_definition_id: &str) -> Result<RoleDefinition>;
}

#[async_trait::async_trait]
pub trait FederatedIdentityCredentials: Send + Sync {
    async fn list(
        &self,
        resource_group: &str,
        identity: &str,
    ) -> Result<Vec<FederatedIdentityCredential>>;
}

// === impl ClientError ===

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Response { status, .. } => Some(*status),
            Self::Other(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(StatusCode::FORBIDDEN)
    }

    /// The service-provided message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Response { message, .. } => Some(message),
            Self::Other(_) => None,
        }
    }
}
