//! Authorization-decision wire types.

use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};

/// Asks the decision service to expand the subject's group memberships.
pub const GROUP_EXPANSION: &str = "GroupExpansion";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthorizationRequest {
    pub subject: SubjectInfo,
    pub actions: Vec<ActionInfo>,
    pub resource: ResourceInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubjectInfo {
    pub attributes: SubjectAttributes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAttributes {
    #[serde(rename = "ObjectId")]
    pub object_id: String,
    #[serde(
        rename = "xms-az-grpclaimname",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub claim_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionInfo {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceInfo {
    pub id: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessDecision {
    Allowed,
    NotAllowed,
    Denied,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDecision {
    pub action_id: String,
    pub access_decision: AccessDecision,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationDecisionResponse {
    #[serde(default)]
    pub value: Vec<AuthorizationDecision>,
}

/// The actions granted to an identity by its role definition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionSet(Vec<String>);

// === impl AuthorizationRequest ===

impl AuthorizationRequest {
    /// Builds a request that always expands the subject's groups.
    pub fn new(object_id: &str, resource_id: &str, actions: &[&str]) -> Self {
        Self {
            subject: SubjectInfo {
                attributes: SubjectAttributes {
                    object_id: object_id.to_string(),
                    claim_name: Some(GROUP_EXPANSION.to_string()),
                },
            },
            actions: actions
                .iter()
                .map(|id| ActionInfo { id: id.to_string() })
                .collect(),
            resource: ResourceInfo {
                id: resource_id.to_string(),
            },
        }
    }
}

// === impl AuthorizationDecisionResponse ===

impl AuthorizationDecisionResponse {
    /// Returns the requested actions that were not granted, in request
    /// order. An action absent from the response is not granted.
    pub fn not_allowed(&self, actions: &[&str]) -> Vec<String> {
        let decisions = self
            .value
            .iter()
            .map(|d| (d.action_id.as_str(), d.access_decision))
            .collect::<HashMap<_, _>>();
        actions
            .iter()
            .filter(|a| decisions.get(*a) != Some(&AccessDecision::Allowed))
            .map(|a| a.to_string())
            .collect()
    }
}

// === impl ActionSet ===

impl ActionSet {
    /// Keeps the required actions this set grants, in required order.
    pub fn intersect<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|r| self.0.iter().any(|a| a.eq_ignore_ascii_case(r)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ActionSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
