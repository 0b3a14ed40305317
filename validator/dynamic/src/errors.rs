use crate::{actions::Denial, Authorizer, PollState};
use admission_validator_core::{
    clients::ClientError,
    cluster::UnknownArchitectureVersion,
    network::InvalidCidr,
    resource_id::{ParseResourceIdError, SubnetIdError},
    token::TokenError,
    CloudError, ErrorCode,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A definitive validation failure to report to the user.
    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    ResourceId(#[from] ParseResourceIdError),

    #[error(transparent)]
    SubnetId(#[from] SubnetIdError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Cidr(#[from] InvalidCidr),

    #[error(transparent)]
    Architecture(#[from] UnknownArchitectureVersion),

    #[error("no subnets provided")]
    NoSubnets,

    #[error("cluster document has no {0}")]
    MissingProfile(&'static str),

    #[error("no {0} credential was supplied")]
    MissingCredential(&'static str),

    #[error("validation cancelled")]
    Cancelled,
}

/// A resource a cluster links to, as named in user-facing errors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum LinkedResource {
    VirtualNetwork,
    Subnet,
    RouteTable,
    NatGateway,
    NetworkSecurityGroup,
    DiskEncryptionSet,
}

// === impl Error ===

impl Error {
    pub fn as_cloud_error(&self) -> Option<&CloudError> {
        match self {
            Self::Cloud(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_not_found())
    }
}

// === impl LinkedResource ===

impl LinkedResource {
    fn noun(&self) -> &'static str {
        match self {
            Self::VirtualNetwork => "vnet",
            Self::Subnet => "subnet",
            Self::RouteTable => "route table",
            Self::NatGateway => "nat gateway",
            Self::NetworkSecurityGroup => "network security group",
            Self::DiskEncryptionSet => "disk encryption set",
        }
    }

    fn not_found_code(&self) -> ErrorCode {
        match self {
            Self::VirtualNetwork | Self::Subnet | Self::NetworkSecurityGroup => {
                ErrorCode::InvalidLinkedVNet
            }
            Self::RouteTable => ErrorCode::InvalidLinkedRouteTable,
            Self::NatGateway => ErrorCode::InvalidLinkedNatGateway,
            Self::DiskEncryptionSet => ErrorCode::InvalidLinkedDiskEncryptionSet,
        }
    }

    /// What a service principal is expected to hold on the resource.
    fn grant(&self) -> &'static str {
        match self {
            Self::DiskEncryptionSet => "Reader permission",
            _ => "Network Contributor role",
        }
    }

    fn names_application(&self) -> bool {
        matches!(self, Self::VirtualNetwork | Self::NetworkSecurityGroup)
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::NetworkSecurityGroup => {
                " This is required when the enable-preconfigured-nsg option is specified."
            }
            _ => "",
        }
    }

    pub(crate) fn not_found(&self, id: &str, target: &str) -> CloudError {
        let message = match self {
            Self::Subnet => format!("The provided subnet '{id}' could not be found."),
            _ => format!("The {} '{id}' could not be found.", self.noun()),
        };
        CloudError::not_found(self.not_found_code(), target, message)
    }

    /// Describes an authorizer's failure to obtain access to the resource.
    pub(crate) fn denied(
        &self,
        authorizer: &Authorizer,
        id: &str,
        target: &str,
        denial: Denial,
    ) -> CloudError {
        let noun = self.noun();
        let suffix = self.suffix();
        let message = match (&denial.operator, &authorizer.app_id) {
            (Some(operator), _) => format!(
                "The {operator} platform managed identity does not have required permissions on {noun} '{id}'.{suffix}"
            ),
            (None, Some(app_id)) if self.names_application() => format!(
                "The {} service principal (Application ID: {app_id}) does not have {} on {noun} '{id}'.{suffix}",
                authorizer.kind,
                self.grant(),
            ),
            (None, _) => format!(
                "The {} service principal does not have {} on {noun} '{id}'.{suffix}",
                authorizer.kind,
                self.grant(),
            ),
        };

        let err = CloudError::permission_denied(authorizer.kind, target, message);
        match denial.state {
            PollState::Denied { message } => err.with_original_message(message),
            _ => err,
        }
    }
}
