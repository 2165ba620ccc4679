//! Test doubles shared by the unit tests of this crate.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use crate::{
    parse_raw_headers,
    transport::{PublishFuture, RecordPublisher, TransportError},
    validators::dkim::{DkimEngine, SignatureRecord, VerificationError, VerifyFuture},
    RawEmailRecord, ValidateFuture, Validator,
};

/// Validator that always returns the same verdict.
pub struct FixedValidator {
    identity: String,
    valid: bool,
}

impl FixedValidator {
    pub fn new(identity: &str, valid: bool) -> Self {
        Self {
            identity: identity.to_string(),
            valid,
        }
    }
}

impl Validator for FixedValidator {
    fn is_valid<'a>(&'a self, _record: &'a RawEmailRecord) -> ValidateFuture<'a> {
        Box::pin(async move { self.valid })
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

/// Validator that counts how many times it was invoked.
pub struct CountingValidator {
    inner: FixedValidator,
    calls: AtomicUsize,
}

impl CountingValidator {
    pub fn new(identity: &str, valid: bool) -> Self {
        Self {
            inner: FixedValidator::new(identity, valid),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Validator for CountingValidator {
    fn is_valid<'a>(&'a self, record: &'a RawEmailRecord) -> ValidateFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.is_valid(record)
    }

    fn identity(&self) -> &str {
        self.inner.identity()
    }
}

/// Validator that panics while being evaluated.
pub struct PanickingValidator {
    identity: String,
}

impl PanickingValidator {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
        }
    }
}

impl Validator for PanickingValidator {
    fn is_valid<'a>(&'a self, _record: &'a RawEmailRecord) -> ValidateFuture<'a> {
        Box::pin(async move { explode(&self.identity) })
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

/// Validator that panics before returning its future, while inspecting
/// the record outside of the async block.
pub struct EagerPanickingValidator {
    identity: String,
}

impl EagerPanickingValidator {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
        }
    }
}

impl Validator for EagerPanickingValidator {
    fn is_valid<'a>(&'a self, record: &'a RawEmailRecord) -> ValidateFuture<'a> {
        let sixth = &record.to()[5];
        Box::pin(async move { !sixth.is_empty() })
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

fn explode(identity: &str) -> bool {
    panic!("validator {identity} exploded")
}

/// Engine that returns a canned result regardless of the content.
pub struct StaticEngine {
    result: Result<Vec<SignatureRecord>, VerificationError>,
}

impl StaticEngine {
    pub fn new(result: Result<Vec<SignatureRecord>, VerificationError>) -> Self {
        Self { result }
    }
}

impl DkimEngine for StaticEngine {
    fn verify<'a>(&'a self, _content: &'a [u8]) -> VerifyFuture<'a> {
        Box::pin(async move { self.result.clone() })
    }
}

/// Engine that trusts every `DKIM-Signature` header in the content and
/// reports its `d=`, `s=` and `h=` tags without any cryptography.
pub struct HeaderListEngine;

impl DkimEngine for HeaderListEngine {
    fn verify<'a>(&'a self, content: &'a [u8]) -> VerifyFuture<'a> {
        Box::pin(async move {
            let text = String::from_utf8_lossy(content);
            let (headers, _) = parse_raw_headers(&text);
            let signatures = headers
                .iter()
                .filter(|(name, _)| name.eq_ignore_ascii_case("DKIM-Signature"))
                .map(|(_, value)| {
                    let tag = |name: &str| {
                        value
                            .split(';')
                            .filter_map(|tag| tag.split_once('='))
                            .find(|(key, _)| key.trim() == name)
                            .map(|(_, value)| value.trim().to_string())
                            .unwrap_or_default()
                    };
                    SignatureRecord::new(&tag("d"), &tag("s"), tag("h").split(':'))
                })
                .collect();
            Ok(signatures)
        })
    }
}

/// Publisher that keeps every published payload in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(Vec<u8>, String)>>,
}

impl RecordingPublisher {
    /// Returns the published `(payload, ordering key)` pairs, in order.
    pub fn published(&self) -> Vec<(Vec<u8>, String)> {
        self.published.lock().unwrap().clone()
    }
}

impl RecordPublisher for RecordingPublisher {
    fn publish<'a>(&'a self, payload: &'a [u8], ordering_key: &'a str) -> PublishFuture<'a> {
        Box::pin(async move {
            let mut published = self.published.lock().unwrap();
            published.push((payload.to_vec(), ordering_key.to_string()));
            Ok(format!("recorded-{}", published.len()))
        })
    }

    fn destination(&self) -> &str {
        "memory"
    }
}

/// Publisher whose every publish fails.
pub struct FailingPublisher;

impl RecordPublisher for FailingPublisher {
    fn publish<'a>(&'a self, _payload: &'a [u8], _ordering_key: &'a str) -> PublishFuture<'a> {
        Box::pin(async move { Err(TransportError::Connection("broker unavailable".to_string())) })
    }

    fn destination(&self) -> &str {
        "nowhere"
    }
}
