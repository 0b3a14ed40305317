use http::StatusCode;
use std::fmt;

/// A user-facing validation failure.
///
/// Values are only produced through the constructors below so that every
/// failure carries a consistent status, code and kind.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{}: {code}: {target}: {message}", .status.as_u16())]
pub struct CloudError {
    status: StatusCode,
    code: ErrorCode,
    target: String,
    message: String,
    kind: ErrorKind,
    details: Vec<CloudErrorBody>,
}

/// One entry of a combined error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloudErrorBody {
    pub code: ErrorCode,
    pub target: String,
    pub message: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    StructuralMismatch,
    QuotaExceeded,
    InvalidParameter,
    FederatedCredentialMismatch,
    Internal,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidLinkedVNet,
    InvalidLinkedRouteTable,
    InvalidLinkedNatGateway,
    InvalidLinkedDiskEncryptionSet,
    NotFound,
    InvalidResourceProviderPermissions,
    InvalidServicePrincipalPermissions,
    InvalidWorkloadIdentityPermissions,
    InvalidClusterMSIPermissions,
    ResourceQuotaExceeded,
    InvalidParameter,
    PlatformWorkloadIdentityMismatch,
    PlatformWorkloadIdentityContainsInvalidFederatedCredential,
    InvalidServicePrincipalCredentials,
    InvalidServicePrincipalToken,
    InvalidServicePrincipalClaims,
}

/// The identity on whose behalf permissions are checked.
///
/// Selects both the wording of permission errors and their code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AuthorizerKind {
    FirstParty,
    ClusterServicePrincipal,
    WorkloadIdentity,
    ClusterUserAssignedIdentity,
}

// === impl CloudError ===

impl CloudError {
    pub fn not_found(code: ErrorCode, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, ErrorKind::NotFound, target, message)
    }

    pub fn structural(code: ErrorCode, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, ErrorKind::StructuralMismatch, target, message)
    }

    pub fn permission_denied(
        authorizer: AuthorizerKind,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            authorizer.permission_code(),
            ErrorKind::PermissionDenied,
            target,
            message,
        )
    }

    pub fn quota_exceeded(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceQuotaExceeded,
            ErrorKind::QuotaExceeded,
            target,
            message,
        )
    }

    pub fn invalid_parameter(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidParameter,
            ErrorKind::InvalidParameter,
            target,
            message,
        )
    }

    pub fn federated_credential(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::PlatformWorkloadIdentityContainsInvalidFederatedCredential,
            ErrorKind::FederatedCredentialMismatch,
            target,
            message,
        )
    }

    pub fn identity_mismatch(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::PlatformWorkloadIdentityMismatch,
            ErrorKind::StructuralMismatch,
            target,
            message,
        )
    }

    /// A failure of the supplied service principal's credentials or claims.
    pub fn service_principal(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            code,
            ErrorKind::InvalidParameter,
            "properties.servicePrincipalProfile",
            message,
        )
    }

    /// Folds several errors into one. A single error is returned unchanged;
    /// otherwise the first error's status, code and kind describe the whole,
    /// and every error is listed both as a detail and as a line of the
    /// message.
    pub fn combined(errors: Vec<CloudError>) -> Option<Self> {
        let mut errors = errors.into_iter();
        let first = errors.next()?;
        let rest = errors.collect::<Vec<_>>();
        if rest.is_empty() {
            return Some(first);
        }

        let details = std::iter::once(&first)
            .chain(rest.iter())
            .map(CloudError::body)
            .collect::<Vec<_>>();
        let mut message = format!("Multiple errors occurred ({}).", details.len());
        for detail in &details {
            message.push('\n');
            message.push_str(&detail.message);
        }
        Some(Self {
            status: first.status,
            code: first.code,
            target: String::new(),
            message,
            kind: first.kind,
            details,
        })
    }

    /// Appends the upstream service's explanation to the message.
    pub fn with_original_message(mut self, original: impl fmt::Display) -> Self {
        self.message = format!("{}\nOriginal error message: {original}", self.message);
        self
    }

    fn new(
        code: ErrorCode,
        kind: ErrorKind,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            target: target.into(),
            message: message.into(),
            kind,
            details: Vec::new(),
        }
    }

    fn body(&self) -> CloudErrorBody {
        CloudErrorBody {
            code: self.code,
            target: self.target.clone(),
            message: self.message.clone(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn details(&self) -> &[CloudErrorBody] {
        &self.details
    }
}

// === impl ErrorCode ===

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidLinkedVNet => "InvalidLinkedVNet",
            Self::InvalidLinkedRouteTable => "InvalidLinkedRouteTable",
            Self::InvalidLinkedNatGateway => "InvalidLinkedNatGateway",
            Self::InvalidLinkedDiskEncryptionSet => "InvalidLinkedDiskEncryptionSet",
            Self::NotFound => "NotFound",
            Self::InvalidResourceProviderPermissions => "InvalidResourceProviderPermissions",
            Self::InvalidServicePrincipalPermissions => "InvalidServicePrincipalPermissions",
            Self::InvalidWorkloadIdentityPermissions => "InvalidWorkloadIdentityPermissions",
            Self::InvalidClusterMSIPermissions => "InvalidClusterMSIPermissions",
            Self::ResourceQuotaExceeded => "ResourceQuotaExceeded",
            Self::InvalidParameter => "InvalidParameter",
            Self::PlatformWorkloadIdentityMismatch => "PlatformWorkloadIdentityMismatch",
            Self::PlatformWorkloadIdentityContainsInvalidFederatedCredential => {
                "PlatformWorkloadIdentityContainsInvalidFederatedCredential"
            }
            Self::InvalidServicePrincipalCredentials => "InvalidServicePrincipalCredentials",
            Self::InvalidServicePrincipalToken => "InvalidServicePrincipalToken",
            Self::InvalidServicePrincipalClaims => "InvalidServicePrincipalClaims",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl AuthorizerKind ===

impl AuthorizerKind {
    /// The error code reported when this authorizer lacks a permission.
    pub fn permission_code(&self) -> ErrorCode {
        match self {
            Self::FirstParty => ErrorCode::InvalidResourceProviderPermissions,
            Self::ClusterServicePrincipal => ErrorCode::InvalidServicePrincipalPermissions,
            Self::WorkloadIdentity => ErrorCode::InvalidWorkloadIdentityPermissions,
            Self::ClusterUserAssignedIdentity => ErrorCode::InvalidClusterMSIPermissions,
        }
    }

    /// Whether permission checks are made per platform workload identity.
    pub fn is_workload_identity(&self) -> bool {
        matches!(self, Self::WorkloadIdentity)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstParty => "resource provider",
            Self::ClusterServicePrincipal => "cluster",
            Self::WorkloadIdentity => "workload identity",
            Self::ClusterUserAssignedIdentity => "cluster user assigned identity",
        }
    }
}

impl fmt::Display for AuthorizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
