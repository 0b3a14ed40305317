use crate::{
    core::{
        clients::{RoleDefinitions, TokenCredential},
        cluster::Cluster,
        Subnet,
    },
    dynamic::{
        ensure_access_token_claims, AuthorizerKind, Clients, Dynamic, Error,
        PlatformIdentityRoles, Result, ServicePrincipalValidator, Validator, ValidatorConfig,
        ValidatorMetrics,
    },
};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Builds validators that share cloud clients, configuration and metrics.
#[derive(Clone)]
pub struct Validators {
    clients: Clients,
    config: ValidatorConfig,
    metrics: ValidatorMetrics,
}

/// Credentials of the identities a cluster validation acts as.
#[derive(Clone)]
pub struct Credentials {
    pub first_party: Arc<dyn TokenCredential>,
    pub first_party_app_id: String,

    /// Required unless the cluster uses platform workload identities.
    pub service_principal: Option<Arc<dyn TokenCredential>>,

    /// The cluster's user-assigned identity. Required when the cluster uses
    /// platform workload identities.
    pub cluster_identity: Option<Arc<dyn TokenCredential>>,
}

/// Validates every resource a cluster links to, first as the cluster's own
/// identity and then as the resource provider.
#[derive(Clone)]
pub struct ClusterValidation {
    validators: Validators,
    credentials: Credentials,
    role_definitions: Arc<dyn RoleDefinitions>,
}

// === impl Validators ===

impl Validators {
    /// Registers validator metrics in `prom`.
    pub fn new(clients: Clients, config: ValidatorConfig, prom: &mut Registry) -> Self {
        Self {
            clients,
            config,
            metrics: ValidatorMetrics::register(prom),
        }
    }

    pub fn validator(
        &self,
        kind: AuthorizerKind,
        app_id: Option<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Validator {
        Validator::new(
            crate::dynamic::Authorizer {
                kind,
                app_id,
                credential,
            },
            self.clients.clone(),
            self.config.clone(),
            self.metrics.clone(),
        )
    }
}

// === impl ClusterValidation ===

impl ClusterValidation {
    pub fn new(
        validators: Validators,
        credentials: Credentials,
        role_definitions: Arc<dyn RoleDefinitions>,
    ) -> Self {
        Self {
            validators,
            credentials,
            role_definitions,
        }
    }

    /// Runs the full validation sequence, stopping at the first failure.
    ///
    /// `roles` lists the platform workload identity roles required for the
    /// cluster's version and is ignored for service principal clusters.
    #[tracing::instrument(skip_all, fields(cluster = %oc.id))]
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        oc: &Cluster,
        roles: &PlatformIdentityRoles,
    ) -> Result<()> {
        let subnets = cluster_subnets(oc);
        let scopes = [self.validators.config.resource_manager_scope.as_str()];
        let network = &oc.properties.network_profile;
        let cidrs = [network.pod_cidr.as_str(), network.service_cidr.as_str()]
            .into_iter()
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>();

        let cluster = self.cluster_validator(cancel, oc, roles, &scopes).await?;
        info!(authorizer = %cluster.authorizer().kind, "Validating cluster resources");
        cluster
            .validate_vnet(cancel, &oc.location, &subnets, &cidrs)
            .await?;
        cluster.validate_subnets(cancel, oc, &subnets).await?;
        cluster.validate_disk_encryption_sets(cancel, oc).await?;
        cluster.validate_encryption_at_host(cancel, oc).await?;
        cluster
            .validate_pre_configured_nsgs(cancel, oc, &subnets)
            .await?;

        ensure_access_token_claims(cancel, &*self.credentials.first_party, &scopes).await?;
        let fp = self.validators.validator(
            AuthorizerKind::FirstParty,
            Some(self.credentials.first_party_app_id.clone()),
            self.credentials.first_party.clone(),
        );
        info!("Validating resource provider access");
        fp.validate_vnet(cancel, &oc.location, &subnets, &cidrs)
            .await?;
        fp.validate_disk_encryption_sets(cancel, oc).await?;
        fp.validate_pre_configured_nsgs(cancel, oc, &subnets).await?;
        fp.validate_load_balancer_profile(cancel, oc).await?;
        Ok(())
    }

    /// Validates the cluster's own identity and returns a validator acting
    /// as it.
    async fn cluster_validator(
        &self,
        cancel: &CancellationToken,
        oc: &Cluster,
        roles: &PlatformIdentityRoles,
        scopes: &[&str],
    ) -> Result<Validator> {
        let profile = match &oc.properties.platform_workload_identity_profile {
            Some(profile) => profile,
            None => {
                let credential = self
                    .credentials
                    .service_principal
                    .clone()
                    .ok_or(Error::MissingCredential("service principal"))?;
                ensure_access_token_claims(cancel, &*credential, scopes).await?;

                let app_id = oc
                    .properties
                    .service_principal_profile
                    .as_ref()
                    .map(|sp| sp.client_id.clone());
                let v = self.validators.validator(
                    AuthorizerKind::ClusterServicePrincipal,
                    app_id,
                    credential.clone(),
                );
                v.validate_service_principal(cancel, &*credential).await?;
                return Ok(v);
            }
        };

        let credential = self
            .credentials
            .cluster_identity
            .clone()
            .ok_or(Error::MissingCredential("cluster managed identity"))?;
        let msi = self.validators.validator(
            AuthorizerKind::ClusterUserAssignedIdentity,
            None,
            credential,
        );
        msi.validate_cluster_user_assigned_identity(
            cancel,
            &profile.platform_workload_identities,
            &*self.role_definitions,
        )
        .await?;

        let mut v = self.validators.validator(
            AuthorizerKind::WorkloadIdentity,
            None,
            self.credentials.first_party.clone(),
        );
        v.validate_platform_workload_identity_profile(cancel, oc, roles, &*self.role_definitions)
            .await?;
        Ok(v)
    }
}

/// The control plane subnet followed by each worker pool's subnet, with
/// the document path each is read from.
pub fn cluster_subnets(oc: &Cluster) -> Vec<Subnet> {
    let mut subnets = vec![Subnet::new(
        &oc.properties.master_profile.subnet_id,
        "properties.masterProfile.subnetId",
    )];

    let (workers, property) = oc.worker_profiles();
    for (i, wp) in workers.iter().enumerate() {
        if wp.subnet_id.is_empty() {
            debug!(pool = %wp.name, "Worker pool has no subnet");
            continue;
        }
        subnets.push(Subnet::new(
            &wp.subnet_id,
            format!("properties.{property}[{i}].subnetId"),
        ));
    }
    subnets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        authz::{
            AccessDecision, AuthorizationDecision, AuthorizationDecisionResponse,
            AuthorizationRequest,
        },
        clients::{
            self, AccessToken, CheckAccess, ClientError, DiskEncryptionSets,
            FederatedIdentityCredentials, LoadBalancerBackendAddressPools, NetworkUsages,
            ResourceSkus, VirtualNetworks,
        },
        cluster::{ServicePrincipalProfile, WorkerProfile},
        identity::{FederatedIdentityCredential, RoleDefinition},
        network::{VirtualNetwork, VirtualNetworkSubnet},
        resources::{BackendAddressPool, DiskEncryptionSet, ResourceSku, Usage},
        ErrorCode,
    };
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    const SUB: &str = "/subscriptions/00000000-0000-0000-0000-000000000000";

    struct FakeCredential(serde_json::Value);

    /// Grants everything and records who asked for what.
    #[derive(Default)]
    struct FakeCheckAccess(Mutex<Vec<(String, String)>>);

    struct FakeCloud;

    fn vnet_id() -> String {
        format!("{SUB}/resourceGroups/vnet-rg/providers/Microsoft.Network/virtualNetworks/vnet")
    }

    fn subnet_id(name: &str) -> String {
        format!("{}/subnets/{name}", vnet_id())
    }

    fn not_found() -> ClientError {
        ClientError::from(anyhow::anyhow!("unexpected lookup"))
    }

    #[async_trait::async_trait]
    impl TokenCredential for FakeCredential {
        async fn get_token(&self, _scopes: &[&str]) -> clients::Result<AccessToken> {
            let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&self.0).unwrap());
            Ok(AccessToken {
                token: format!("eyJhbGciOiJub25lIn0.{payload}.sig"),
            })
        }
    }

    #[async_trait::async_trait]
    impl CheckAccess for FakeCheckAccess {
        async fn check_access(
            &self,
            req: &AuthorizationRequest,
        ) -> clients::Result<Option<AuthorizationDecisionResponse>> {
            self.0.lock().push((
                req.subject.attributes.object_id.clone(),
                req.resource.id.clone(),
            ));
            Ok(Some(AuthorizationDecisionResponse {
                value: req
                    .actions
                    .iter()
                    .map(|a| AuthorizationDecision {
                        action_id: a.id.clone(),
                        access_decision: AccessDecision::Allowed,
                    })
                    .collect(),
            }))
        }
    }

    #[async_trait::async_trait]
    impl VirtualNetworks for FakeCloud {
        async fn get(
            &self,
            _resource_group: &str,
            _name: &str,
            _expand: Option<&str>,
        ) -> clients::Result<VirtualNetwork> {
            let subnet = |name: &str, prefix: &str| VirtualNetworkSubnet {
                id: subnet_id(name),
                address_prefix: Some(prefix.to_string()),
                provisioning_state: Some("Succeeded".to_string()),
                ..Default::default()
            };
            Ok(VirtualNetwork {
                id: vnet_id(),
                location: "eastus".to_string(),
                subnets: vec![subnet("master", "10.0.0.0/24"), subnet("worker", "10.0.1.0/24")],
            })
        }
    }

    #[async_trait::async_trait]
    impl DiskEncryptionSets for FakeCloud {
        async fn get(&self, _: &str, _: &str) -> clients::Result<DiskEncryptionSet> {
            Err(not_found())
        }
    }

    #[async_trait::async_trait]
    impl ResourceSkus for FakeCloud {
        async fn list(&self, _: &str) -> clients::Result<Vec<ResourceSku>> {
            Ok(vec![])
        }
    }

    #[async_trait::async_trait]
    impl NetworkUsages for FakeCloud {
        async fn list(&self, _: &str) -> clients::Result<Vec<Usage>> {
            Ok(vec![])
        }
    }

    #[async_trait::async_trait]
    impl LoadBalancerBackendAddressPools for FakeCloud {
        async fn get(&self, _: &str, _: &str, _: &str) -> clients::Result<BackendAddressPool> {
            Ok(BackendAddressPool::default())
        }
    }

    #[async_trait::async_trait]
    impl RoleDefinitions for FakeCloud {
        async fn get_by_id(&self, _: &str) -> clients::Result<RoleDefinition> {
            Ok(RoleDefinition::default())
        }
    }

    #[async_trait::async_trait]
    impl FederatedIdentityCredentials for FakeCloud {
        async fn list(&self, _: &str, _: &str) -> clients::Result<Vec<FederatedIdentityCredential>> {
            Ok(vec![])
        }
    }

    fn cluster() -> Cluster {
        let mut oc = Cluster {
            id: format!("{SUB}/resourceGroups/rg/providers/Microsoft.RedHatOpenShift/openShiftClusters/cluster"),
            name: "cluster".to_string(),
            location: "eastus".to_string(),
            ..Default::default()
        };
        oc.properties.network_profile.pod_cidr = "10.128.0.0/14".to_string();
        oc.properties.network_profile.service_cidr = "172.30.0.0/16".to_string();
        oc.properties.master_profile.subnet_id = subnet_id("master");
        oc.properties.worker_profiles = vec![WorkerProfile {
            name: "worker".to_string(),
            subnet_id: subnet_id("worker"),
            count: 3,
            ..Default::default()
        }];
        oc.properties.service_principal_profile = Some(ServicePrincipalProfile {
            client_id: "sp-client".to_string(),
            sp_object_id: "sp-oid".to_string(),
        });
        oc
    }

    fn validation(
        check_access: Arc<FakeCheckAccess>,
        service_principal: serde_json::Value,
    ) -> (ClusterValidation, Registry) {
        let cloud = Arc::new(FakeCloud);
        let clients = Clients {
            check_access,
            virtual_networks: cloud.clone(),
            disk_encryption_sets: cloud.clone(),
            resource_skus: cloud.clone(),
            network_usages: cloud.clone(),
            backend_address_pools: cloud.clone(),
            federated_credentials: cloud.clone(),
        };
        let mut prom = Registry::default();
        let validators = Validators::new(clients, ValidatorConfig::default(), &mut prom);
        let credentials = Credentials {
            first_party: Arc::new(FakeCredential(serde_json::json!({ "oid": "fp-oid" }))),
            first_party_app_id: "fp-app".to_string(),
            service_principal: Some(Arc::new(FakeCredential(service_principal))),
            cluster_identity: None,
        };
        (ClusterValidation::new(validators, credentials, cloud), prom)
    }

    fn cloud_error(res: Result<()>) -> crate::core::CloudError {
        match res {
            Err(Error::Cloud(e)) => e,
            res => panic!("expected a cloud error, got {res:?}"),
        }
    }

    #[test]
    fn subnets_follow_document_order() {
        let mut oc = cluster();
        oc.properties.worker_profiles_status = vec![
            WorkerProfile {
                name: "worker-a".to_string(),
                subnet_id: subnet_id("worker"),
                ..Default::default()
            },
            WorkerProfile {
                name: "empty".to_string(),
                ..Default::default()
            },
        ];
        assert_eq!(
            cluster_subnets(&oc),
            vec![
                Subnet::new(subnet_id("master"), "properties.masterProfile.subnetId"),
                Subnet::new(
                    subnet_id("worker"),
                    "properties.workerProfilesStatus[0].subnetId"
                ),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cluster_identity_then_resource_provider() {
        let check_access = Arc::new(FakeCheckAccess::default());
        let (validation, _prom) =
            validation(check_access.clone(), serde_json::json!({ "oid": "sp-oid" }));

        validation
            .run(&CancellationToken::new(), &cluster(), &Default::default())
            .await
            .expect("cluster must be valid");

        let vnet_subjects = check_access
            .0
            .lock()
            .iter()
            .filter(|(_, resource)| *resource == vnet_id())
            .map(|(subject, _)| subject.clone())
            .collect::<Vec<_>>();
        assert_eq!(vnet_subjects, vec!["sp-oid".to_string(), "fp-oid".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_service_principal_stops_validation() {
        let check_access = Arc::new(FakeCheckAccess::default());
        let (validation, _prom) = validation(check_access.clone(), serde_json::json!({}));

        let err = cloud_error(
            validation
                .run(&CancellationToken::new(), &cluster(), &Default::default())
                .await,
        );
        assert_eq!(err.code(), ErrorCode::InvalidServicePrincipalClaims);
        assert!(check_access.0.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn service_principal_credential_is_required() {
        let check_access = Arc::new(FakeCheckAccess::default());
        let (mut validation, _prom) =
            validation(check_access, serde_json::json!({ "oid": "sp-oid" }));
        validation.credentials.service_principal = None;

        let err = validation
            .run(&CancellationToken::new(), &cluster(), &Default::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "no service principal credential was supplied"
        );
    }
}
