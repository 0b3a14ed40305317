use crate::{errors::LinkedResource, PollState, Result, Validator};
use admission_validator_core::ResourceId;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A failed permission poll and the platform operator it was made for, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Denial {
    pub operator: Option<String>,
    pub state: PollState,
}

impl Validator {
    /// Checks that the acting identity holds `actions` on `resource`.
    ///
    /// Once platform identities are known, each one is only checked for the
    /// actions its role grants, and identities granted none are skipped. The
    /// first identity that fails is reported.
    pub(crate) async fn validate_actions(
        &self,
        cancel: &CancellationToken,
        resource: &ResourceId,
        actions: &[&str],
    ) -> Result<Option<Denial>> {
        let identities = match &self.platform_identities {
            Some(identities) => identities,
            None => {
                let state = self.poll_access(cancel, resource, actions, None).await?;
                return Ok((!state.is_allowed()).then_some(Denial {
                    operator: None,
                    state,
                }));
            }
        };

        for (operator, identity) in identities {
            let required = identity.actions.intersect(actions);
            if required.is_empty() {
                debug!(%operator, %resource, "No required actions granted by role");
                continue;
            }

            let state = self
                .poll_access(
                    cancel,
                    resource,
                    &required,
                    Some(identity.identity.object_id.as_str()),
                )
                .await?;
            if !state.is_allowed() {
                return Ok(Some(Denial {
                    operator: Some(operator.clone()),
                    state,
                }));
            }
        }
        Ok(None)
    }

    /// Checks `actions` on a linked resource, describing any failure in
    /// terms of that resource.
    pub(crate) async fn validate_linked(
        &self,
        cancel: &CancellationToken,
        kind: LinkedResource,
        id: &str,
        target: &str,
        actions: &[&str],
    ) -> Result<()> {
        let resource = id.parse::<ResourceId>()?;
        debug!(%resource, ?kind, "Validating permissions");
        match self.validate_actions(cancel, &resource, actions).await {
            Ok(None) => Ok(()),
            Ok(Some(denial)) => Err(kind.denied(&self.authorizer, id, target, denial).into()),
            Err(e) if e.is_not_found() => Err(kind.not_found(id, target).into()),
            Err(e) => Err(e),
        }
    }
}
