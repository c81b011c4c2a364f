//! Error conditions that callers need to tell apart.
//!
//! Most failures in this crate are plain [`anyhow::Error`] values with
//! context attached. The types here exist for the handful of conditions the
//! UI treats specially: credential problems (which should re-prompt for a
//! key rather than print a stack of context) and session-storage quota
//! problems (which should recommend exporting the session).

use thiserror::Error;

use crate::Error;

/// The environment variable holding our backend API key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// A problem with the backend credential.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// No API key is configured at all.
    #[error("no API key is configured (set {API_KEY_VAR} or add it to .env)")]
    Missing,

    /// The backend rejected the API key we sent.
    #[error("the content backend rejected the configured API key")]
    Invalid,
}

/// We could not write a session snapshot because storage is full.
#[derive(Debug, Error)]
#[error("session storage is full; export your sessions and delete old ones")]
pub struct StorageQuotaError;

/// Does this error chain indicate a credential problem?
///
/// The backend reports authentication failures as ordinary errors whose text
/// mentions the API key, so we match on that marker in addition to our own
/// typed [`CredentialError`].
pub fn is_credential_failure(err: &Error) -> bool {
    err.chain().any(|cause| {
        if cause.downcast_ref::<CredentialError>().is_some() {
            return true;
        }
        let text = cause.to_string().to_lowercase();
        text.contains("api key") || text.contains("api_key")
    })
}
