use once_cell::sync::Lazy;
use regex::Regex;
use std::{fmt, str::FromStr};
use thiserror::Error;

static RESOURCE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^/subscriptions/([^/]+)/resourceGroups/([^/]+)/providers/([^/]+)/(.+)$")
        .expect("resource id pattern must compile")
});

/// Number of `/`-separated segments in a subnet id, counting the empty
/// segment before the leading slash.
const SUBNET_ID_SEGMENTS: usize = 11;

/// A parsed, fully-qualified cloud resource identifier.
///
/// Child resources keep their whole type path, e.g. a subnet has the type
/// `virtualNetworks/vnet/subnets` and its own name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId {
    subscription_id: String,
    resource_group: String,
    provider: String,
    resource_type: String,
    name: String,
    id: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("parsing failed for {0}. Invalid resource Id format")]
pub struct ParseResourceIdError(pub String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("subnet ID {0:?} has incorrect length")]
pub struct SubnetIdError(pub String);

// === impl ResourceId ===

impl ResourceId {
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Compares two ids the way the resource manager does: ignoring case.
    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.id.eq_ignore_ascii_case(other)
    }
}

impl FromStr for ResourceId {
    type Err = ParseResourceIdError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        let err = || ParseResourceIdError(id.to_string());
        let caps = RESOURCE_ID.captures(id).ok_or_else(err)?;

        let segments = caps[4].split('/').collect::<Vec<_>>();
        if segments.len() < 2 || segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty())
        {
            return Err(err());
        }

        let (name, types) = segments.split_last().ok_or_else(err)?;
        Ok(Self {
            subscription_id: caps[1].to_string(),
            resource_group: caps[2].to_string(),
            provider: caps[3].to_string(),
            resource_type: types.join("/"),
            name: name.to_string(),
            id: id.to_string(),
        })
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

/// Splits a subnet id into its parent virtual network id and the subnet name.
pub fn split_subnet_id(subnet_id: &str) -> Result<(&str, &str), SubnetIdError> {
    if subnet_id.split('/').count() != SUBNET_ID_SEGMENTS {
        return Err(SubnetIdError(subnet_id.to_string()));
    }

    let mut parts = subnet_id.rsplitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(_), Some(vnet_id)) => Ok((vnet_id, name)),
        _ => Err(SubnetIdError(subnet_id.to_string())),
    }
}
