#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod actions;
mod authz;
mod cache;
mod disk_encryption;
mod encryption_at_host;
mod errors;
mod load_balancer;
mod metrics;
mod network;
mod service_principal;
mod workload_identity;


pub use self::{
    authz::{Clock, PollEvent, PollState, TokioClock},
    errors::Error,
    metrics::ValidatorMetrics,
    service_principal::ensure_access_token_claims,
};
pub use admission_validator_core::{AuthorizerKind, Subnet};

use admission_validator_core::{
    authz::ActionSet,
    clients::{
        CheckAccess, DiskEncryptionSets, FederatedIdentityCredentials,
        LoadBalancerBackendAddressPools, NetworkUsages, ResourceSkus, RoleDefinitions,
        TokenCredential, VirtualNetworks,
    },
    cluster::{Cluster, PlatformWorkloadIdentity},
    identity::PlatformWorkloadIdentityRole,
};
use std::{collections::BTreeMap, future::Future, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Platform workload identity roles keyed by operator name.
pub type PlatformIdentityRoles = BTreeMap<String, PlatformWorkloadIdentityRole>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Time between authorization-decision attempts.
    pub poll_interval: Duration,

    /// Upper bound on waiting for a role assignment to propagate. Must
    /// exceed the decision service's propagation window.
    pub poll_timeout: Duration,

    /// Scope of the tokens whose subject is checked for access.
    pub resource_manager_scope: String,

    /// Scope of the tokens whose directory roles are inspected.
    pub graph_scope: String,
}

/// The identity on whose behalf a validator checks access.
#[derive(Clone)]
pub struct Authorizer {
    pub kind: AuthorizerKind,

    /// Reported in permission errors, when known.
    pub app_id: Option<String>,

    pub credential: Arc<dyn TokenCredential>,
}

/// Cloud APIs consulted during validation.
#[derive(Clone)]
pub struct Clients {
    pub check_access: Arc<dyn CheckAccess>,
    pub virtual_networks: Arc<dyn VirtualNetworks>,
    pub disk_encryption_sets: Arc<dyn DiskEncryptionSets>,
    pub resource_skus: Arc<dyn ResourceSkus>,
    pub network_usages: Arc<dyn NetworkUsages>,
    pub backend_address_pools: Arc<dyn LoadBalancerBackendAddressPools>,
    pub federated_credentials: Arc<dyn FederatedIdentityCredentials>,
}

/// A platform workload identity whose permissions have been resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformIdentity {
    pub identity: PlatformWorkloadIdentity,
    pub actions: ActionSet,
}

/// Validates the cloud resources a cluster links to, on behalf of one
/// authorizer.
pub struct Validator {
    authorizer: Authorizer,
    clients: Clients,
    config: ValidatorConfig,
    metrics: ValidatorMetrics,
    clock: Arc<dyn Clock>,
    platform_identities: Option<BTreeMap<String, PlatformIdentity>>,
}

/// Checks a service principal's own credentials.
#[async_trait::async_trait]
pub trait ServicePrincipalValidator {
    async fn validate_service_principal(
        &self,
        cancel: &CancellationToken,
        credential: &dyn TokenCredential,
    ) -> Result<()>;
}

/// Validation of the resources a cluster document links to.
///
/// Each call owns its own virtual network cache and stops at the first
/// failure.
#[async_trait::async_trait]
pub trait Dynamic: ServicePrincipalValidator {
    async fn validate_vnet(
        &self,
        cancel: &CancellationToken,
        location: &str,
        subnets: &[Subnet],
        additional_cidrs: &[&str],
    ) -> Result<()>;

    async fn validate_subnets(
        &self,
        cancel: &CancellationToken,
        oc: &Cluster,
        subnets: &[Subnet],
    ) -> Result<()>;

    async fn validate_pre_configured_nsgs(
        &self,
        cancel: &CancellationToken,
        oc: &Cluster,
        subnets: &[Subnet],
    ) -> Result<()>;

    async fn validate_disk_encryption_sets(
        &self,
        cancel: &CancellationToken,
        oc: &Cluster,
    ) -> Result<()>;

    async fn validate_encryption_at_host(&self, cancel: &CancellationToken, oc: &Cluster)
        -> Result<()>;

    async fn validate_load_balancer_profile(
        &self,
        cancel: &CancellationToken,
        oc: &Cluster,
    ) -> Result<()>;

    /// On success, later permission checks are made per platform identity.
    async fn validate_platform_workload_identity_profile(
        &mut self,
        cancel: &CancellationToken,
        oc: &Cluster,
        roles: &PlatformIdentityRoles,
        role_definitions: &dyn RoleDefinitions,
    ) -> Result<()>;

    async fn validate_cluster_user_assigned_identity(
        &self,
        cancel: &CancellationToken,
        identities: &BTreeMap<String, PlatformWorkloadIdentity>,
        role_definitions: &dyn RoleDefinitions,
    ) -> Result<()>;
}

// === impl ValidatorConfig ===

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(6 * 60),
            resource_manager_scope: "https://management.azure.com/.default".to_string(),
            graph_scope: "https://graph.microsoft.com/.default".to_string(),
        }
    }
}

// === impl Validator ===

impl Validator {
    pub fn new(
        authorizer: Authorizer,
        clients: Clients,
        config: ValidatorConfig,
        metrics: ValidatorMetrics,
    ) -> Self {
        Self {
            authorizer,
            clients,
            config,
            metrics,
            clock: Arc::new(TokioClock),
            platform_identities: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// Platform identities resolved by the workload identity profile check.
    pub fn platform_identities(&self) -> Option<&BTreeMap<String, PlatformIdentity>> {
        self.platform_identities.as_ref()
    }
}

#[async_trait::async_trait]
impl Dynamic for Validator {
    #[tracing::instrument(skip_all, fields(authorizer = %self.authorizer.kind))]
    async fn validate_vnet(
        &self,
        cancel: &CancellationToken,
        location: &str,
        subnets: &[Subnet],
        additional_cidrs: &[&str],
    ) -> Result<()> {
        network::validate_vnet(self, cancel, location, subnets, additional_cidrs).await
    }

    #[tracing::instrument(skip_all, fields(authorizer = %self.authorizer.kind))]
    async fn validate_subnets(
        &self,
        cancel: &CancellationToken,
        oc: &Cluster,
        subnets: &[Subnet],
    ) -> Result<()> {
        network::validate_subnets(self, cancel, oc, subnets).await
    }

    #[tracing::instrument(skip_all, fields(authorizer = %self.authorizer.kind))]
    async fn validate_pre_configured_nsgs(
        &self,
        cancel: &CancellationToken,
        oc: &Cluster,
        subnets: &[Subnet],
    ) -> Result<()> {
        network::validate_pre_configured_nsgs(self, cancel, oc, subnets).await
    }

    #[tracing::instrument(skip_all, fields(authorizer = %self.authorizer.kind))]
    async fn validate_disk_encryption_sets(
        &self,
        cancel: &CancellationToken,
        oc: &Cluster,
    ) -> Result<()> {
        disk_encryption::validate(self, cancel, oc).await
    }

    #[tracing::instrument(skip_all, fields(authorizer = %self.authorizer.kind))]
    async fn validate_encryption_at_host(
        &self,
        cancel: &CancellationToken,
        oc: &Cluster,
    ) -> Result<()> {
        encryption_at_host::validate(self, cancel, oc).await
    }

    #[tracing::instrument(skip_all, fields(authorizer = %self.authorizer.kind))]
    async fn validate_load_balancer_profile(
        &self,
        cancel: &CancellationToken,
        oc: &Cluster,
    ) -> Result<()> {
        load_balancer::validate(self, cancel, oc).await
    }

    #[tracing::instrument(skip_all, fields(authorizer = %self.authorizer.kind))]
    async fn validate_platform_workload_identity_profile(
        &mut self,
        cancel: &CancellationToken,
        oc: &Cluster,
        roles: &PlatformIdentityRoles,
        role_definitions: &dyn RoleDefinitions,
    ) -> Result<()> {
        let identities =
            workload_identity::validate_profile(self, cancel, oc, roles, role_definitions).await?;
        self.platform_identities = Some(identities);
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(authorizer = %self.authorizer.kind))]
    async fn validate_cluster_user_assigned_identity(
        &self,
        cancel: &CancellationToken,
        identities: &BTreeMap<String, PlatformWorkloadIdentity>,
        role_definitions: &dyn RoleDefinitions,
    ) -> Result<()> {
        workload_identity::validate_cluster_identity(self, cancel, identities, role_definitions)
            .await
    }
}

#[async_trait::async_trait]
impl ServicePrincipalValidator for Validator {
    #[tracing::instrument(skip_all, fields(authorizer = %self.authorizer.kind))]
    async fn validate_service_principal(
        &self,
        cancel: &CancellationToken,
        credential: &dyn TokenCredential,
    ) -> Result<()> {
        service_principal::validate(&self.config, cancel, credential).await
    }
}

/// Runs `f` unless the validation is cancelled first.
async fn cancellable<F: Future>(cancel: &CancellationToken, f: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        out = f => Ok(out),
    }
}
