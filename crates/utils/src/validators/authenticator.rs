//! DKIM verification engine backed by the `mail-auth` crate.
//!
//! Feature-gated behind `email-auth`. Performs the full verification (header
//! parsing, canonicalization, DNS key lookup, signature check) and reports
//! the signatures that passed as [`SignatureRecord`]s.

use mail_auth::{AuthenticatedMessage, DkimResult, MessageAuthenticator};
use tracing::{debug, info, warn};

use crate::{
    validators::dkim::{DkimEngine, SignatureRecord, VerificationError, VerifyFuture},
    DnsResolver,
};

/// [`DkimEngine`] performing real DKIM verification through `mail-auth`.
pub struct MailAuthEngine {
    authenticator: MessageAuthenticator,
}

impl MailAuthEngine {
    /// Creates a new [`MailAuthEngine`] using the given DNS resolver.
    pub fn new(resolver: DnsResolver) -> Result<Self, VerificationError> {
        let authenticator = match resolver {
            DnsResolver::System => MessageAuthenticator::new_system_conf().or_else(|_| {
                warn!("Failed to load system DNS config, falling back to Cloudflare TLS");
                MessageAuthenticator::new_cloudflare_tls()
            }),
            DnsResolver::Cloudflare => MessageAuthenticator::new_cloudflare(),
            DnsResolver::CloudflareTls => MessageAuthenticator::new_cloudflare_tls(),
        }
        .map_err(|e| VerificationError::Temporary(format!("Failed to create DNS resolver: {e}")))?;
        info!(resolver = %resolver, "DKIM engine initialized");
        Ok(Self { authenticator })
    }
}

impl DkimEngine for MailAuthEngine {
    fn verify<'a>(&'a self, content: &'a [u8]) -> VerifyFuture<'a> {
        Box::pin(async move {
            // verification runs over the original bytes, any re-serialization
            // would break the body hash
            let message = AuthenticatedMessage::parse(content).ok_or_else(|| {
                debug!("Failed to parse message for DKIM verification");
                VerificationError::Parse("message could not be parsed".to_string())
            })?;

            let outputs = self.authenticator.verify_dkim(&message).await;
            debug!(signatures = outputs.len(), "DKIM verification returned");

            let mut verified = Vec::new();
            let mut last_failure = None;

            for output in &outputs {
                let result = output.result();
                match (result, output.signature()) {
                    (DkimResult::Pass, Some(signature)) => {
                        verified.push(SignatureRecord::new(
                            &signature.d,
                            &signature.s,
                            signature.h.iter(),
                        ));
                    }
                    (DkimResult::TempError(e), _) => {
                        last_failure = Some(VerificationError::Temporary(e.to_string()));
                    }
                    (DkimResult::PermError(e), _) => {
                        last_failure = Some(VerificationError::Parse(e.to_string()));
                    }
                    (result, _) => {
                        last_failure = Some(VerificationError::Failed(
                            format_dkim_result(result).to_string(),
                        ));
                    }
                }
            }

            match last_failure {
                Some(failure) if verified.is_empty() => Err(failure),
                _ => Ok(verified),
            }
        })
    }
}

fn format_dkim_result(result: &DkimResult) -> &'static str {
    match result {
        DkimResult::Pass => "pass",
        DkimResult::Fail(_) => "fail",
        DkimResult::Neutral(_) => "neutral",
        DkimResult::None => "none",
        DkimResult::TempError(_) => "temperror",
        DkimResult::PermError(_) => "permerror",
    }
}
