//! DKIM authentication with a header-coverage requirement.
//!
//! Cryptographic verification is delegated to a [`DkimEngine`]; this module
//! owns the structural decision on top of it. A record is accepted only when
//! at least one verified signature covers every header in
//! [`REQUIRED_HEADERS`], so that a valid but narrowly scoped signature (e.g.
//! one that only signs `From`) is not taken as proof of message integrity.

use std::{collections::BTreeSet, fmt::Display, future::Future, pin::Pin, sync::Arc};

use tracing::{debug, info};

use crate::{RawEmailRecord, ValidateFuture, Validator};

/// Header names (lowercase) a signature must cover for the record to pass.
pub const REQUIRED_HEADERS: [&str; 4] = ["from", "to", "cc", "subject"];

/// Boxed future type for engine verification.
pub type VerifyFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<SignatureRecord>, VerificationError>> + Send + 'a>>;

/// Errors surfaced by a [`DkimEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// The message or one of its signatures could not be parsed.
    Parse(String),
    /// A transient failure, such as a DNS timeout while fetching the key.
    Temporary(String),
    /// Signatures were present but none of them verified.
    Failed(String),
}

impl Display for VerificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationError::Parse(msg) => write!(f, "Parse error: {msg}"),
            VerificationError::Temporary(msg) => write!(f, "Temporary error: {msg}"),
            VerificationError::Failed(msg) => write!(f, "Verification failed: {msg}"),
        }
    }
}

impl std::error::Error for VerificationError {}

/// A verified DKIM signature as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    domain: String,
    selector: String,
    headers: BTreeSet<String>,
}

impl SignatureRecord {
    /// Creates a new [`SignatureRecord`], normalizing header names to
    /// trimmed lowercase.
    pub fn new<I, S>(domain: &str, selector: &str, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domain: domain.to_string(),
            selector: selector.to_string(),
            headers: headers
                .into_iter()
                .map(|name| name.as_ref().trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// Returns the signing domain (`d=` tag).
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the key selector (`s=` tag).
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Returns the lowercase names of the headers covered by the signature.
    pub fn headers(&self) -> &BTreeSet<String> {
        &self.headers
    }

    /// Returns whether the signature covers every header in `required`
    /// (case-insensitive).
    pub fn covers(&self, required: &[&str]) -> bool {
        required
            .iter()
            .all(|name| self.headers.contains(&name.to_ascii_lowercase()))
    }
}

/// External DKIM verification capability.
///
/// Implementations parse the `DKIM-Signature` headers of `content`,
/// canonicalize, fetch the public keys and verify. They return the signatures
/// that verified, an empty list when the message carries no signature, or an
/// error when verification could not be completed or every signature failed.
pub trait DkimEngine: Send + Sync {
    fn verify<'a>(&'a self, content: &'a [u8]) -> VerifyFuture<'a>;
}

/// Validator that requires a verified DKIM signature covering
/// [`REQUIRED_HEADERS`].
pub struct DkimValidator {
    engine: Arc<dyn DkimEngine>,
}

impl DkimValidator {
    /// Creates a new [`DkimValidator`] delegating verification to `engine`.
    pub fn new(engine: Arc<dyn DkimEngine>) -> Self {
        info!(required = ?REQUIRED_HEADERS, "DKIM validator initialized");
        Self { engine }
    }

    /// Returns whether any signature covers the required header set.
    pub fn any_signature_covers_required(signatures: &[SignatureRecord]) -> bool {
        signatures
            .iter()
            .any(|signature| signature.covers(&REQUIRED_HEADERS))
    }
}

impl Validator for DkimValidator {
    fn is_valid<'a>(&'a self, record: &'a RawEmailRecord) -> ValidateFuture<'a> {
        Box::pin(async move {
            let signatures = match self.engine.verify(record.content()).await {
                Ok(signatures) => signatures,
                Err(e) => {
                    info!(from = %record.from(), error = %e, "DKIM validation failed");
                    return false;
                }
            };

            if signatures.is_empty() {
                info!(from = %record.from(), "No DKIM signature found");
                return false;
            }

            let valid = Self::any_signature_covers_required(&signatures);
            for signature in &signatures {
                debug!(
                    domain = %signature.domain(),
                    selector = %signature.selector(),
                    headers = ?signature.headers(),
                    "Verified DKIM signature"
                );
            }
            if !valid {
                info!(
                    from = %record.from(),
                    signatures = signatures.len(),
                    required = ?REQUIRED_HEADERS,
                    "No DKIM signature covers the required headers"
                );
            }
            valid
        })
    }

    fn identity(&self) -> &str {
        "dkim"
    }
}
