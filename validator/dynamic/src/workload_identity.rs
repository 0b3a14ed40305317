//! Platform workload identity profile validation.

use crate::{cancellable, Error, PlatformIdentity, PlatformIdentityRoles, PollState, Result, Validator};
use admission_validator_core::{
    clients::RoleDefinitions,
    cluster::{Cluster, PlatformWorkloadIdentity},
    identity::FEDERATED_CREDENTIAL_ROLE_ID,
    AuthorizerKind, CloudError, ResourceId,
};
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const IDENTITIES_TARGET: &str =
    "properties.PlatformWorkloadIdentityProfile.PlatformWorkloadIdentities";

/// Validates the profile's identities and resolves the actions each one's
/// role grants.
pub(crate) async fn validate_profile(
    v: &Validator,
    cancel: &CancellationToken,
    oc: &Cluster,
    roles: &PlatformIdentityRoles,
    role_definitions: &dyn RoleDefinitions,
) -> Result<BTreeMap<String, PlatformIdentity>> {
    let profile = oc
        .properties
        .platform_workload_identity_profile
        .as_ref()
        .ok_or(Error::MissingProfile("platform workload identity profile"))?;
    let identities = &profile.platform_workload_identities;

    validate_identity_set(oc, identities, roles)?;

    let (_, cluster_identity) = oc
        .identity
        .as_ref()
        .and_then(|msi| msi.user_assigned_identities.iter().next())
        .map(|(id, identity)| id.parse::<ResourceId>().map(|id| (id, identity)))
        .transpose()?
        .ok_or(Error::MissingProfile("cluster managed identity"))?;
    let actions = federated_credential_actions(cancel, role_definitions).await?;
    check_federated_credential_access(
        v,
        cancel,
        identities,
        &actions,
        Some(cluster_identity.principal_id.as_str()),
    )
    .await?;

    let mut resolved = BTreeMap::new();
    for (operator, identity) in identities {
        let role = match roles.get(operator) {
            Some(role) => role,
            None => continue,
        };
        let definition = cancellable(cancel, role_definitions.get_by_id(&role.role_definition_id))
            .await??;
        debug!(%operator, role = %role.role_definition_name, "Resolved platform identity role");
        resolved.insert(
            operator.clone(),
            PlatformIdentity {
                identity: identity.clone(),
                actions: definition.action_set(),
            },
        );
    }

    validate_federated_credentials(v, cancel, oc, identities, roles).await?;
    Ok(resolved)
}

/// Checks that the acting cluster identity can manage the federated
/// credentials of every platform identity.
pub(crate) async fn validate_cluster_identity(
    v: &Validator,
    cancel: &CancellationToken,
    identities: &BTreeMap<String, PlatformWorkloadIdentity>,
    role_definitions: &dyn RoleDefinitions,
) -> Result<()> {
    let actions = federated_credential_actions(cancel, role_definitions).await?;
    check_federated_credential_access(v, cancel, identities, &actions, None).await
}

fn validate_identity_set(
    oc: &Cluster,
    identities: &BTreeMap<String, PlatformWorkloadIdentity>,
    roles: &PlatformIdentityRoles,
) -> Result<()> {
    let supplied = identities.keys().map(String::as_str).collect::<BTreeSet<_>>();
    let required = roles.keys().map(String::as_str).collect::<BTreeSet<_>>();
    if supplied == required {
        return Ok(());
    }

    let versions = oc.identity_minor_versions().join(" or ");
    let required = required.into_iter().collect::<Vec<_>>().join(" ");
    Err(CloudError::identity_mismatch(
        IDENTITIES_TARGET,
        format!(
            "There's a mismatch between the required and expected set of platform workload identities for the requested OpenShift minor version '{versions}'. The required platform workload identities are '[{required}]'"
        ),
    )
    .into())
}

async fn federated_credential_actions(
    cancel: &CancellationToken,
    role_definitions: &dyn RoleDefinitions,
) -> Result<Vec<String>> {
    let definition =
        cancellable(cancel, role_definitions.get_by_id(FEDERATED_CREDENTIAL_ROLE_ID)).await??;
    Ok(definition.action_set().iter().map(str::to_string).collect())
}

async fn check_federated_credential_access(
    v: &Validator,
    cancel: &CancellationToken,
    identities: &BTreeMap<String, PlatformWorkloadIdentity>,
    actions: &[String],
    subject: Option<&str>,
) -> Result<()> {
    let actions = actions.iter().map(String::as_str).collect::<Vec<_>>();
    for (operator, identity) in identities {
        let resource = identity.resource_id.parse::<ResourceId>()?;
        if actions.is_empty() {
            continue;
        }

        let state = v.poll_access(cancel, &resource, &actions, subject).await?;
        if state.is_allowed() {
            continue;
        }
        warn!(%operator, %resource, "Cluster identity cannot manage federated credentials");
        let err = CloudError::permission_denied(
            AuthorizerKind::ClusterUserAssignedIdentity,
            format!("properties.platformWorkloadIdentityProfile.platformWorkloadIdentities.{operator}.resourceId"),
            format!(
                "The cluster user assigned identity does not have required permissions on platform workload identity '{}'.",
                identity.resource_id
            ),
        );
        return Err(match state {
            PollState::Denied { message } => err.with_original_message(message),
            _ => err,
        }
        .into());
    }
    Ok(())
}

/// Rejects federated credentials on platform identities that the platform
/// did not provision for this cluster.
async fn validate_federated_credentials(
    v: &Validator,
    cancel: &CancellationToken,
    oc: &Cluster,
    identities: &BTreeMap<String, PlatformWorkloadIdentity>,
    roles: &PlatformIdentityRoles,
) -> Result<()> {
    let issuer = oc
        .properties
        .cluster_profile
        .oidc_issuer
        .as_deref()
        .unwrap_or_default();

    for (operator, identity) in identities {
        let resource = identity.resource_id.parse::<ResourceId>()?;
        let expected = roles
            .get(operator)
            .map(|role| role.expected_credentials(&oc.name, issuer))
            .unwrap_or_default();
        let credentials = cancellable(
            cancel,
            v.clients
                .federated_credentials
                .list(resource.resource_group(), resource.name()),
        )
        .await??;

        let unexpected = credentials
            .iter()
            .find(|found| !expected.iter().any(|e| found.matches(e)));
        if let Some(credential) = unexpected {
            let remedy = if oc.is_creating() {
                "Please ensure this identity is only used for this cluster and does not have any existing federated identity credentials."
            } else {
                "Please ensure only federated credentials provisioned by the ARO service for this cluster are present."
            };
            return Err(CloudError::federated_credential(
                format!("properties.platformWorkloadIdentityProfile.platformWorkloadIdentities.{operator}.resourceId"),
                format!(
                    "Unexpected federated credential '{}' found on platform workload identity '{}' used for role '{operator}'. {remedy}",
                    credential.name, identity.resource_id
                ),
            )
            .into());
        }
    }
    Ok(())
}
