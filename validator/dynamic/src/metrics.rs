use admission_validator_core::AuthorizerKind;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct ValidatorMetrics {
    check_access_requests: Family<CheckLabels, Counter>,
    polls: Family<PollLabels, Counter>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum CheckResult {
    Allowed,
    NotAllowed,
    Error,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    Allowed,
    Denied,
    TimedOut,
    Cancelled,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct CheckLabels {
    authorizer: &'static str,
    result: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct PollLabels {
    authorizer: &'static str,
    outcome: &'static str,
}

// === impl ValidatorMetrics ===

impl ValidatorMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let check_access_requests = Family::<CheckLabels, Counter>::default();
        reg.register(
            "check_access_requests",
            "Total number of authorization decision requests",
            check_access_requests.clone(),
        );

        let polls = Family::<PollLabels, Counter>::default();
        reg.register(
            "polls",
            "Total number of completed permission polls",
            polls.clone(),
        );

        Self {
            check_access_requests,
            polls,
        }
    }

    pub(crate) fn check_access(&self, authorizer: AuthorizerKind, result: CheckResult) {
        let result = match result {
            CheckResult::Allowed => "allowed",
            CheckResult::NotAllowed => "not_allowed",
            CheckResult::Error => "error",
        };
        self.check_access_requests
            .get_or_create(&CheckLabels {
                authorizer: label(authorizer),
                result,
            })
            .inc();
    }

    pub(crate) fn poll(&self, authorizer: AuthorizerKind, outcome: PollOutcome) {
        let outcome = match outcome {
            PollOutcome::Allowed => "allowed",
            PollOutcome::Denied => "denied",
            PollOutcome::TimedOut => "timed_out",
            PollOutcome::Cancelled => "cancelled",
        };
        self.polls
            .get_or_create(&PollLabels {
                authorizer: label(authorizer),
                outcome,
            })
            .inc();
    }
}

fn label(authorizer: AuthorizerKind) -> &'static str {
    match authorizer {
        AuthorizerKind::FirstParty => "first_party",
        AuthorizerKind::ClusterServicePrincipal => "cluster_service_principal",
        AuthorizerKind::WorkloadIdentity => "workload_identity",
        AuthorizerKind::ClusterUserAssignedIdentity => "cluster_user_assigned_identity",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn counts_are_labeled_by_authorizer() {
        let mut reg = Registry::with_prefix("admission_validator");
        let metrics = ValidatorMetrics::register(&mut reg);
        metrics.check_access(AuthorizerKind::FirstParty, CheckResult::NotAllowed);
        metrics.poll(AuthorizerKind::FirstParty, PollOutcome::TimedOut);

        let mut out = String::new();
        encode(&mut out, &reg).unwrap();
        assert!(out.contains(
            r#"admission_validator_check_access_requests_total{authorizer="first_party",result="not_allowed"} 1"#
        ));
        assert!(out.contains(
            r#"admission_validator_polls_total{authorizer="first_party",outcome="timed_out"} 1"#
        ));
    }
}
