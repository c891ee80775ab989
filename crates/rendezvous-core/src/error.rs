//! Error taxonomy for the Rendezvous client.
//!
//! One enum across crypto, transport, and protocol failures. The numeric
//! codes are stable and round-trip with the server: codes below 400 are
//! client-local, codes from 400 up mirror the HTTP status the server uses
//! for the same condition.

use rendezvous_crypto::CryptoError;
use rendezvous_proto::CodecError;
use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, RendezvousError>;

/// All failures a public client operation can surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RendezvousError {
    /// Transport failure or cancellation; no status was received.
    #[error("no response from server")]
    NoResponse,

    /// Catch-all for conditions with no better kind.
    #[error("unknown error: {reason}")]
    Unknown {
        /// What happened, best effort.
        reason: String,
    },

    /// An expected response body was absent.
    #[error("no data in response")]
    NoDataInResponse,

    /// The response decoded but is semantically invalid.
    #[error("invalid server data: {reason}")]
    InvalidServerData {
        /// Which check failed.
        reason: String,
    },

    /// A local record failed to encode.
    #[error("serialization failed: {reason}")]
    SerializationFailed {
        /// Underlying codec error.
        reason: String,
    },

    /// A downloaded file failed its hash or GCM check.
    #[error("invalid file: {reason}")]
    InvalidFile {
        /// Which check failed.
        reason: String,
    },

    /// An observer attempted to post.
    #[error("no permission to write to this topic")]
    NoPermissionToWrite,

    /// A local precondition failed, or the server rejected the request.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Which precondition failed.
        reason: String,
    },

    /// The auth token was rejected.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A signature did not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// The resource already exists server-side.
    #[error("resource already exists")]
    ResourceAlreadyExists,

    /// The request was based on stale state (old `UserInfo` or topic).
    #[error("request outdated")]
    RequestOutdated,

    /// The server rejected a topic-key upload.
    #[error("invalid topic key upload")]
    InvalidTopicKeyUpload,

    /// The server failed internally.
    #[error("internal server error")]
    InternalServerError,

    /// A cryptographic operation failed (bad key size, failed agreement,
    /// GCM tag mismatch). Fatal for the affected message; never retried.
    #[error(transparent)]
    Crypto(CryptoError),
}

impl RendezvousError {
    /// Stable numeric code for this error kind.
    pub fn code(&self) -> u16 {
        match self {
            Self::NoResponse => 0,
            Self::Unknown { .. } | Self::Crypto(_) => 1,
            Self::NoDataInResponse => 2,
            Self::InvalidServerData { .. } => 3,
            Self::SerializationFailed { .. } => 4,
            Self::InvalidFile { .. } => 5,
            Self::NoPermissionToWrite => 6,
            Self::InvalidRequest { .. } => 400,
            Self::AuthenticationFailed => 401,
            Self::InvalidSignature => 406,
            Self::ResourceAlreadyExists => 409,
            Self::RequestOutdated => 410,
            Self::InvalidTopicKeyUpload => 412,
            Self::InternalServerError => 500,
        }
    }

    /// Map a non-success HTTP status to its error kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest { reason: "rejected by server".to_string() },
            401 => Self::AuthenticationFailed,
            406 => Self::InvalidSignature,
            409 => Self::ResourceAlreadyExists,
            410 => Self::RequestOutdated,
            412 => Self::InvalidTopicKeyUpload,
            500 => Self::InternalServerError,
            other => Self::Unknown { reason: format!("unexpected status {other}") },
        }
    }
}

impl From<CryptoError> for RendezvousError {
    fn from(err: CryptoError) -> Self {
        match err {
            // A failed verification is a protocol-level rejection, not a
            // local crypto fault.
            CryptoError::BadSignature => Self::InvalidSignature,
            other => Self::Crypto(other),
        }
    }
}

impl From<CodecError> for RendezvousError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encode(reason) => Self::SerializationFailed { reason },
            CodecError::Decode(reason) => Self::InvalidServerData { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_with_status_mapping() {
        for status in [400u16, 401, 406, 409, 410, 412, 500] {
            assert_eq!(RendezvousError::from_status(status).code(), status);
        }
    }

    #[test]
    fn unexpected_status_maps_to_unknown() {
        assert_eq!(RendezvousError::from_status(418).code(), 1);
    }

    #[test]
    fn bad_signature_becomes_invalid_signature() {
        let err: RendezvousError = CryptoError::BadSignature.into();
        assert_eq!(err, RendezvousError::InvalidSignature);
        assert_eq!(err.code(), 406);
    }

    #[test]
    fn crypto_failure_stays_crypto() {
        let err: RendezvousError = CryptoError::CryptoFailure.into();
        assert!(matches!(err, RendezvousError::Crypto(CryptoError::CryptoFailure)));
    }
}
