//! Producer-side envelope policy.
//!
//! Decides which received envelopes become records on the inbound queue.
//! Patterns must match the whole address, as an SMTP `MAIL FROM` or
//! `RCPT TO` filter would.

use std::fmt::Display;

use regex::Regex;
use tracing::info;

use crate::{ConfigError, IngressConfig, RawEmailRecord};

/// Reason an envelope was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressRejection {
    /// The envelope carries no sender.
    MissingSender,
    /// The sender does not match the configured pattern.
    SenderNotAllowed(String),
    /// No recipient matches the configured pattern.
    NoAllowedRecipient,
}

impl Display for IngressRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngressRejection::MissingSender => write!(f, "Envelope has no sender"),
            IngressRejection::SenderNotAllowed(from) => {
                write!(f, "Sender not allowed: {from}")
            }
            IngressRejection::NoAllowedRecipient => {
                write!(f, "No recipient matches the allowed pattern")
            }
        }
    }
}

impl std::error::Error for IngressRejection {}

/// Sender and recipient filters applied before a record is produced.
#[derive(Debug, Clone, Default)]
pub struct IngressPolicy {
    senders: Option<Regex>,
    recipients: Option<Regex>,
}

impl IngressPolicy {
    /// Creates a new [`IngressPolicy`] from optional patterns.
    pub fn new(senders: Option<&str>, recipients: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            senders: senders.map(anchored).transpose()?,
            recipients: recipients.map(anchored).transpose()?,
        })
    }

    /// Builds the policy described by the `[ingress]` table.
    pub fn from_config(config: &IngressConfig) -> Result<Self, ConfigError> {
        Self::new(config.senders.as_deref(), config.recipients.as_deref())
            .map_err(|e| ConfigError::Invalid(format!("Invalid ingress pattern: {e}")))
    }

    /// Checks an envelope against the policy.
    pub fn admit(&self, from: &str, to: &[String]) -> Result<(), IngressRejection> {
        if from.trim().is_empty() {
            info!("Ignoring envelope without sender");
            return Err(IngressRejection::MissingSender);
        }
        if let Some(senders) = &self.senders {
            if !senders.is_match(from) {
                info!(from = %from, pattern = %senders, "Ignoring envelope from disallowed sender");
                return Err(IngressRejection::SenderNotAllowed(from.to_string()));
            }
        }
        if let Some(recipients) = &self.recipients {
            if !to.iter().any(|rcpt| recipients.is_match(rcpt)) {
                info!(
                    to = ?to,
                    pattern = %recipients,
                    "Ignoring envelope with no allowed recipient"
                );
                return Err(IngressRejection::NoAllowedRecipient);
            }
        }
        Ok(())
    }

    /// Admits the envelope and wraps it with `content` into a record.
    pub fn build_record(
        &self,
        from: &str,
        to: Vec<String>,
        content: Vec<u8>,
    ) -> Result<RawEmailRecord, IngressRejection> {
        self.admit(from, &to)?;
        Ok(RawEmailRecord::new(from.to_string(), to, content))
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}
