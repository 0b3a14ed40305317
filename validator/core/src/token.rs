//! Unverified bearer-token claim extraction.
//!
//! Tokens are obtained directly from the identity provider, so their
//! signatures are not checked here; only the payload is decoded.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub altsecid: Option<String>,
    #[serde(default)]
    pub puid: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token contains an invalid number of segments")]
    InvalidSegments,

    #[error("failed to decode token payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("failed to parse token claims: {0}")]
    Claims(#[from] serde_json::Error),

    #[error("token has no oid claim")]
    MissingObjectId,
}

/// Decodes the claims of a JWT without validating it.
pub fn parse_unverified(token: &str) -> Result<Claims, TokenError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(TokenError::InvalidSegments),
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// The object id of the token's subject.
pub fn object_id(token: &str) -> Result<String, TokenError> {
    parse_unverified(token)?
        .oid
        .filter(|oid| !oid.is_empty())
        .ok_or(TokenError::MissingObjectId)
}

// === impl Claims ===

impl Claims {
    /// Whether the token identifies a principal in the tenant.
    pub fn has_principal(&self) -> bool {
        [&self.altsecid, &self.oid, &self.puid]
            .into_iter()
            .any(|c| c.as_deref().is_some_and(|c| !c.is_empty()))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(claims: serde_json::Value) -> String {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        format!("eyJhbGciOiJub25lIn0.{payload}.sig")
    }

    #[test]
    fn extracts_object_id() {
        let t = token(serde_json::json!({ "oid": "1234", "roles": ["Reader"] }));
        assert_eq!(object_id(&t).unwrap(), "1234");
        assert!(parse_unverified(&t).unwrap().has_role("Reader"));
    }

    #[test]
    fn rejects_wrong_segment_count() {
        let err = parse_unverified("abc.def").unwrap_err();
        assert_eq!(err.to_string(), "token contains an invalid number of segments");
    }

    #[test]
    fn missing_object_id() {
        let t = token(serde_json::json!({ "puid": "p" }));
        assert!(matches!(object_id(&t), Err(TokenError::MissingObjectId)));
        assert!(parse_unverified(&t).unwrap().has_principal());
    }

    #[test]
    fn no_principal_claims() {
        let t = token(serde_json::json!({ "oid": "" }));
        assert!(!parse_unverified(&t).unwrap().has_principal());
    }
}
