//! Entry point for one delivered message.
//!
//! The [`Dispatcher`] ties the stages together: base64 decode, record
//! decode, pipeline evaluation and, for records that pass, re-encode and
//! publish. Every stage failure is folded into a [`DispatchResult`] value so
//! a caller consuming a queue never has to unwind or retry.

use std::{fmt::Display, sync::Arc};

use tracing::{debug, error, info, warn};

use crate::{
    CodecError, InboundMessage, PipelineOutcome, RecordCodec, RecordPublisher, TransportError,
    ValidationPipeline,
};

/// Final state of one [`Dispatcher::handle`] invocation.
#[derive(Debug)]
pub enum DispatchResult {
    /// The record passed every validator and was published.
    Forwarded {
        message_id: String,
        outcome: PipelineOutcome,
    },
    /// At least one validator failed, nothing was published.
    Rejected(PipelineOutcome),
    /// The payload could not be decoded into a record.
    Malformed(CodecError),
    /// The record passed but could not be re-encoded.
    EncodeFailed {
        error: CodecError,
        outcome: PipelineOutcome,
    },
    /// The record passed but the publisher failed.
    PublishFailed {
        error: TransportError,
        outcome: PipelineOutcome,
    },
}

impl DispatchResult {
    /// Returns whether the record was published downstream.
    pub fn is_forwarded(&self) -> bool {
        matches!(self, DispatchResult::Forwarded { .. })
    }

    /// Returns the pipeline outcome, if the record got far enough to be
    /// evaluated.
    pub fn outcome(&self) -> Option<&PipelineOutcome> {
        match self {
            DispatchResult::Forwarded { outcome, .. }
            | DispatchResult::Rejected(outcome)
            | DispatchResult::EncodeFailed { outcome, .. }
            | DispatchResult::PublishFailed { outcome, .. } => Some(outcome),
            DispatchResult::Malformed(_) => None,
        }
    }
}

impl Display for DispatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchResult::Forwarded {
                message_id,
                outcome,
            } => write!(f, "forwarded as {message_id} ({outcome})"),
            DispatchResult::Rejected(outcome) => write!(f, "rejected ({outcome})"),
            DispatchResult::Malformed(e) => write!(f, "malformed: {e}"),
            DispatchResult::EncodeFailed { error, .. } => write!(f, "not forwarded: {error}"),
            DispatchResult::PublishFailed { error, .. } => write!(f, "not forwarded: {error}"),
        }
    }
}

/// Decodes, validates and forwards inbound records.
///
/// Holds no mutable state; one instance is shared across every concurrent
/// dispatch through an [`Arc`].
pub struct Dispatcher {
    codec: RecordCodec,
    pipeline: ValidationPipeline,
    publisher: Arc<dyn RecordPublisher>,
    ordering_key: String,
}

impl Dispatcher {
    /// Creates a new [`Dispatcher`] forwarding valid records to `publisher`
    /// under `ordering_key`.
    pub fn new(
        codec: RecordCodec,
        pipeline: ValidationPipeline,
        publisher: Arc<dyn RecordPublisher>,
        ordering_key: String,
    ) -> Self {
        if pipeline.is_empty() {
            warn!("No validators configured, every well-formed record will be forwarded");
        }
        info!(
            validators = ?pipeline.identities(),
            destination = %publisher.destination(),
            ordering_key = %ordering_key,
            "Dispatcher initialized"
        );
        Self {
            codec,
            pipeline,
            publisher,
            ordering_key,
        }
    }

    /// Handles one delivered message end to end.
    pub async fn handle(&self, message: InboundMessage) -> DispatchResult {
        let message_id = message.id().to_string();

        let record = match message
            .payload()
            .and_then(|payload| self.codec.decode(&payload))
        {
            Ok(record) => record,
            Err(e) => {
                warn!(message_id = %message_id, error = %e, "Dropping malformed record");
                return DispatchResult::Malformed(e);
            }
        };

        debug!(
            message_id = %message_id,
            from = %record.from(),
            to = ?record.to(),
            subject = %record.subject(),
            size = record.len(),
            "Decoded record"
        );

        let outcome = self.pipeline.evaluate(&record).await;
        info!(
            message_id = %message_id,
            passing = ?outcome.passing(),
            failing = ?outcome.failing(),
            "Validation complete"
        );

        if !outcome.is_valid() {
            info!(
                message_id = %message_id,
                from = %record.from(),
                "Record rejected, not forwarding"
            );
            return DispatchResult::Rejected(outcome);
        }

        let payload = match self.codec.encode(&record) {
            Ok(payload) => payload,
            Err(error) => {
                error!(message_id = %message_id, error = %error, "Failed to re-encode record");
                return DispatchResult::EncodeFailed { error, outcome };
            }
        };

        match self.publisher.publish(&payload, &self.ordering_key).await {
            Ok(published_id) => {
                info!(
                    message_id = %message_id,
                    published_id = %published_id,
                    destination = %self.publisher.destination(),
                    "Record forwarded"
                );
                DispatchResult::Forwarded {
                    message_id: published_id,
                    outcome,
                }
            }
            Err(error) => {
                error!(
                    message_id = %message_id,
                    destination = %self.publisher.destination(),
                    error = %error,
                    "Failed to forward record"
                );
                DispatchResult::PublishFailed { error, outcome }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{FailingPublisher, FixedValidator, HeaderListEngine, RecordingPublisher},
        DkimValidator, RawEmailRecord, Validator,
    };

    const SIGNED: &[u8] = b"DKIM-Signature: v=1; a=rsa-sha256; d=example.com; s=s1;\r\n\th=from:to:cc:subject:date; bh=abc; b=def\r\nFrom: sender@example.com\r\nTo: rcpt@example.com\r\nCc: copy@example.com\r\nSubject: Quarterly report\r\nDate: Fri, 1 Mar 2024 10:00:00 +0000\r\n\r\nBody\r\n";

    const UNSIGNED: &[u8] = b"From: sender@example.com\r\nTo: rcpt@example.com\r\nSubject: Quarterly report\r\n\r\nBody\r\n";

    fn dkim_pipeline() -> ValidationPipeline {
        ValidationPipeline::new(vec![Box::new(DkimValidator::new(Arc::new(HeaderListEngine)))])
    }

    fn encoded(content: &[u8]) -> Vec<u8> {
        let record = RawEmailRecord::from_parts("sender@example.com", &["rcpt@example.com"], content);
        RecordCodec::new().unwrap().encode(&record).unwrap()
    }

    fn dispatcher(
        pipeline: ValidationPipeline,
        publisher: Arc<dyn RecordPublisher>,
    ) -> Dispatcher {
        Dispatcher::new(
            RecordCodec::new().unwrap(),
            pipeline,
            publisher,
            "email".to_string(),
        )
    }

    #[tokio::test]
    async fn test_signed_record_is_forwarded_unchanged() {
        let publisher = Arc::new(RecordingPublisher::default());
        let dispatcher = dispatcher(dkim_pipeline(), publisher.clone());
        let payload = encoded(SIGNED);

        let result = dispatcher.handle(InboundMessage::from_payload(&payload)).await;

        assert!(result.is_forwarded());
        assert_eq!(result.outcome().unwrap().passing(), ["dkim"]);
        assert_eq!(publisher.published(), vec![(payload, "email".to_string())]);
    }

    #[tokio::test]
    async fn test_unsigned_record_is_rejected() {
        let publisher = Arc::new(RecordingPublisher::default());
        let dispatcher = dispatcher(dkim_pipeline(), publisher.clone());

        let result = dispatcher
            .handle(InboundMessage::from_payload(&encoded(UNSIGNED)))
            .await;

        assert!(matches!(&result, DispatchResult::Rejected(outcome) if outcome.failing() == ["dkim"]));
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_truncated_record_is_malformed() {
        let publisher = Arc::new(RecordingPublisher::default());
        let dispatcher = dispatcher(dkim_pipeline(), publisher.clone());
        let payload = encoded(SIGNED);

        let result = dispatcher
            .handle(InboundMessage::from_payload(&payload[..payload.len() - 10]))
            .await;

        assert!(matches!(result, DispatchResult::Malformed(CodecError::Malformed(_))));
        assert!(result.outcome().is_none());
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_base64_is_malformed() {
        let publisher = Arc::new(RecordingPublisher::default());
        let dispatcher = dispatcher(dkim_pipeline(), publisher.clone());
        let message = InboundMessage {
            data: "not base64!".to_string(),
            ..Default::default()
        };

        let result = dispatcher.handle(message).await;

        assert!(matches!(result, DispatchResult::Malformed(CodecError::Base64(_))));
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_reported() {
        let dispatcher = dispatcher(dkim_pipeline(), Arc::new(FailingPublisher));

        let result = dispatcher
            .handle(InboundMessage::from_payload(&encoded(SIGNED)))
            .await;

        assert!(!result.is_forwarded());
        assert!(matches!(
            result,
            DispatchResult::PublishFailed {
                error: TransportError::Connection(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_any_failing_validator_blocks_forward() {
        let publisher = Arc::new(RecordingPublisher::default());
        let validators: Vec<Box<dyn Validator>> = vec![
            Box::new(DkimValidator::new(Arc::new(HeaderListEngine))),
            Box::new(FixedValidator::new("policy", false)),
        ];
        let dispatcher = dispatcher(ValidationPipeline::new(validators), publisher.clone());

        let result = dispatcher
            .handle(InboundMessage::from_payload(&encoded(SIGNED)))
            .await;

        let outcome = result.outcome().unwrap();
        assert_eq!(outcome.passing(), ["dkim"]);
        assert_eq!(outcome.failing(), ["policy"]);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_empty_pipeline_forwards() {
        let publisher = Arc::new(RecordingPublisher::default());
        let dispatcher = dispatcher(ValidationPipeline::new(vec![]), publisher.clone());

        let result = dispatcher
            .handle(InboundMessage::from_payload(&encoded(UNSIGNED)))
            .await;

        assert!(result.is_forwarded());
        assert_eq!(publisher.published().len(), 1);
    }

    #[tokio::test]
    async fn test_forward_order_is_preserved() {
        let publisher = Arc::new(RecordingPublisher::default());
        let dispatcher = dispatcher(ValidationPipeline::new(vec![]), publisher.clone());
        let payloads: Vec<Vec<u8>> = ["a", "b", "c"]
            .iter()
            .map(|subject| encoded(format!("Subject: {subject}\r\n\r\n").as_bytes()))
            .collect();

        for payload in &payloads {
            dispatcher.handle(InboundMessage::from_payload(payload)).await;
        }

        let published: Vec<Vec<u8>> = publisher
            .published()
            .into_iter()
            .map(|(payload, _)| payload)
            .collect();
        assert_eq!(published, payloads);
    }

    #[test]
    fn test_dispatch_result_display() {
        let rejected = DispatchResult::Rejected(PipelineOutcome::default());
        assert_eq!(rejected.to_string(), "rejected (valid=true passing=[] failing=[])");

        let malformed = DispatchResult::Malformed(CodecError::Base64("bad".to_string()));
        assert_eq!(malformed.to_string(), "malformed: Invalid base64 payload: bad");
    }
}
