//! Polling the authorization-decision service until access is granted.
//!
//! Role assignments take several minutes to reach the decision service, so a
//! denial is only final once the poll deadline passes.

use crate::{
    cancellable,
    metrics::{CheckResult, PollOutcome},
    Error, Result, Validator,
};
use admission_validator_core::{
    authz::AuthorizationRequest, clients::TokenCredential, token, ResourceId,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shortest wait between decision requests, whatever the configuration says.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A source of time, so that polls can be driven by virtual time.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep_until(&self, deadline: Instant);
}

#[derive(Copy, Clone, Debug, Default)]
pub struct TokioClock;

/// Progress of a single permission poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollState {
    /// Not yet granted; `not_allowed` holds the last attempt's missing actions.
    Pending {
        attempts: u32,
        not_allowed: Vec<String>,
    },

    Allowed,

    /// The decision service refused the request outright.
    Denied { message: String },

    /// The deadline passed before every action was granted.
    TimedOut {
        attempts: u32,
        not_allowed: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollEvent {
    /// An attempt completed; holds the actions that were not granted.
    Decision(Vec<String>),

    /// The decision service answered with a 403.
    Forbidden(String),

    Deadline,
}

// === impl TokioClock ===

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await
    }
}

// === impl PollState ===

impl PollState {
    pub fn start() -> Self {
        Self::Pending {
            attempts: 0,
            not_allowed: Vec::new(),
        }
    }

    pub fn on(self, event: PollEvent) -> Self {
        let attempts = match self {
            Self::Pending { attempts, .. } => attempts,
            terminal => return terminal,
        };

        match event {
            PollEvent::Decision(not_allowed) if not_allowed.is_empty() => Self::Allowed,
            PollEvent::Decision(not_allowed) => Self::Pending {
                attempts: attempts + 1,
                not_allowed,
            },
            PollEvent::Forbidden(message) => Self::Denied { message },
            PollEvent::Deadline => match self {
                Self::Pending {
                    attempts,
                    not_allowed,
                } => Self::TimedOut {
                    attempts,
                    not_allowed,
                },
                other => other,
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    fn outcome(&self) -> PollOutcome {
        match self {
            Self::Allowed => PollOutcome::Allowed,
            Self::Denied { .. } => PollOutcome::Denied,
            Self::Pending { .. } | Self::TimedOut { .. } => PollOutcome::TimedOut,
        }
    }
}

// === impl Validator ===

impl Validator {
    /// Polls until `actions` are all granted on `resource` or the deadline
    /// passes.
    ///
    /// Without an explicit `subject`, access is checked for the subject of the
    /// authorizer's own token, which is fetched once per poll.
    pub(crate) async fn poll_access(
        &self,
        cancel: &CancellationToken,
        resource: &ResourceId,
        actions: &[&str],
        subject: Option<&str>,
    ) -> Result<PollState> {
        let interval = self.config.poll_interval.max(MIN_POLL_INTERVAL);
        let start = self.clock.now();
        let deadline = start + self.config.poll_timeout;
        let mut next = start;
        let mut subject = subject.map(str::to_string);
        let mut state = PollState::start();

        loop {
            let event = match self.check_access(cancel, resource, actions, &mut subject).await {
                Ok(not_allowed) => PollEvent::Decision(not_allowed),
                Err(Error::Client(e)) if e.is_forbidden() => {
                    PollEvent::Forbidden(e.message().unwrap_or_default().to_string())
                }
                Err(error) => {
                    if matches!(error, Error::Cancelled) {
                        self.metrics.poll(self.authorizer.kind, PollOutcome::Cancelled);
                    }
                    return Err(error);
                }
            };
            state = state.on(event);
            if state.is_terminal() {
                break;
            }

            next += interval;
            if next >= deadline {
                state = state.on(PollEvent::Deadline);
                break;
            }
            if let PollState::Pending {
                attempts,
                not_allowed,
            } = &state
            {
                debug!(%resource, attempts, ?not_allowed, "Waiting for permissions to propagate");
            }
            if let Err(error) = cancellable(cancel, self.clock.sleep_until(next)).await {
                self.metrics.poll(self.authorizer.kind, PollOutcome::Cancelled);
                return Err(error);
            }
        }

        self.metrics.poll(self.authorizer.kind, state.outcome());
        match &state {
            PollState::Allowed => info!(%resource, "Access allowed"),
            PollState::Denied { message } => warn!(%resource, %message, "Access denied"),
            PollState::TimedOut {
                attempts,
                not_allowed,
            } => warn!(%resource, attempts, ?not_allowed, "Timed out waiting for access"),
            PollState::Pending { .. } => {}
        }
        Ok(state)
    }

    /// Issues one decision request, returning the actions not granted.
    async fn check_access(
        &self,
        cancel: &CancellationToken,
        resource: &ResourceId,
        actions: &[&str],
        subject: &mut Option<String>,
    ) -> Result<Vec<String>> {
        let object_id = match subject {
            Some(oid) => oid.clone(),
            None => {
                let oid = self.subject_object_id(cancel, &*self.authorizer.credential).await?;
                *subject = Some(oid.clone());
                oid
            }
        };

        let req = AuthorizationRequest::new(&object_id, resource.as_str(), actions);
        let rsp = match cancellable(cancel, self.clients.check_access.check_access(&req)).await? {
            Ok(rsp) => rsp,
            Err(error) => {
                if !error.is_forbidden() && !error.is_not_found() {
                    tracing::error!(%resource, %error, "Unexpected error checking access");
                }
                self.metrics
                    .check_access(self.authorizer.kind, CheckResult::Error);
                return Err(error.into());
            }
        };

        let not_allowed = match rsp {
            Some(rsp) => rsp.not_allowed(actions),
            None => {
                info!(%resource, "Empty response from the decision service");
                actions.iter().map(|a| a.to_string()).collect()
            }
        };
        let result = if not_allowed.is_empty() {
            CheckResult::Allowed
        } else {
            CheckResult::NotAllowed
        };
        self.metrics.check_access(self.authorizer.kind, result);
        Ok(not_allowed)
    }

    async fn subject_object_id(
        &self,
        cancel: &CancellationToken,
        credential: &dyn TokenCredential,
    ) -> Result<String> {
        let scopes = [self.config.resource_manager_scope.as_str()];
        let token = cancellable(cancel, credential.get_token(&scopes)).await??;
        Ok(token::object_id(&token.token)?)
    }
}
