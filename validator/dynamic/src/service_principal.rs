use crate::{cancellable, Result, ValidatorConfig};
use admission_validator_core::{
    clients::TokenCredential,
    token::{self, TokenError},
    CloudError, ErrorCode,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Lets a principal manage the applications it owns, which a cluster's
/// principal must not be able to do.
const APPLICATION_OWNED_BY_ROLE: &str = "Application.ReadWrite.OwnedBy";

pub(crate) async fn validate(
    config: &ValidatorConfig,
    cancel: &CancellationToken,
    credential: &dyn TokenCredential,
) -> Result<()> {
    let scopes = [config.graph_scope.as_str()];
    let token = cancellable(cancel, credential.get_token(&scopes)).await??;
    let claims = token::parse_unverified(&token.token)?;

    if claims.has_role(APPLICATION_OWNED_BY_ROLE) {
        warn!("Service principal can manage its own applications");
        return Err(CloudError::service_principal(
            ErrorCode::InvalidServicePrincipalCredentials,
            "The provided service principal must not have the Application.ReadWrite.OwnedBy permission.",
        )
        .into());
    }
    Ok(())
}

/// Fails when the principal's token does not identify it in the tenant, which
/// happens when the principal was removed.
pub async fn ensure_access_token_claims(
    cancel: &CancellationToken,
    credential: &dyn TokenCredential,
    scopes: &[&str],
) -> Result<()> {
    let token = cancellable(cancel, credential.get_token(scopes)).await??;

    let claims = match token::parse_unverified(&token.token) {
        Ok(claims) => claims,
        Err(TokenError::InvalidSegments | TokenError::Decode(_) | TokenError::Claims(_)) => {
            return Err(CloudError::service_principal(
                ErrorCode::InvalidServicePrincipalToken,
                "The provided service principal generated an invalid token.",
            )
            .into())
        }
        Err(e) => return Err(e.into()),
    };

    if !claims.has_principal() {
        return Err(CloudError::service_principal(
            ErrorCode::InvalidServicePrincipalClaims,
            "The Azure Red Hat Openshift resource provider service principal has been removed from your tenant. To restore, please unregister and then re-register the Azure Red Hat OpenShift resource provider.",
        )
        .into());
    }
    Ok(())
}
