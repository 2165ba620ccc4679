//! Aggregate pass/fail decision over a set of validators.

use std::{fmt::Display, panic::AssertUnwindSafe};

use futures::FutureExt;
use tracing::{debug, warn};

use crate::{RawEmailRecord, Validator};

/// Verdict of one validator for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    /// Stable name of the validator that rendered the verdict.
    pub identity: String,
    /// Whether the record passed the validator.
    pub valid: bool,
}

/// All verdicts rendered for one record, in configured validator order.
///
/// The record is valid iff no validator failed; an empty set of verdicts
/// is therefore valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    verdicts: Vec<ValidationVerdict>,
}

impl PipelineOutcome {
    /// Returns a new outcome with `verdict` appended.
    pub fn with_verdict(mut self, verdict: ValidationVerdict) -> Self {
        self.verdicts.push(verdict);
        self
    }

    /// Returns every verdict in evaluation order.
    pub fn verdicts(&self) -> &[ValidationVerdict] {
        &self.verdicts
    }

    /// Returns the identities of the validators that passed.
    pub fn passing(&self) -> Vec<&str> {
        self.identities(true)
    }

    /// Returns the identities of the validators that failed.
    pub fn failing(&self) -> Vec<&str> {
        self.identities(false)
    }

    /// Returns whether the record passed every validator.
    pub fn is_valid(&self) -> bool {
        self.verdicts.iter().all(|verdict| verdict.valid)
    }

    fn identities(&self, valid: bool) -> Vec<&str> {
        self.verdicts
            .iter()
            .filter(|verdict| verdict.valid == valid)
            .map(|verdict| verdict.identity.as_str())
            .collect()
    }
}

impl Display for PipelineOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "valid={} passing=[{}] failing=[{}]",
            self.is_valid(),
            self.passing().join(", "),
            self.failing().join(", ")
        )
    }
}

/// Runs every validator exactly once over `record` and folds the verdicts
/// into a [`PipelineOutcome`].
///
/// There is no short-circuit, a failing validator does not prevent the
/// remaining ones from running. A validator that panics is recorded as
/// failed.
pub async fn evaluate(
    record: &RawEmailRecord,
    validators: &[Box<dyn Validator>],
) -> PipelineOutcome {
    let mut outcome = PipelineOutcome::default();
    for validator in validators {
        // building the future may panic too, not only polling it
        let valid = AssertUnwindSafe(async { validator.is_valid(record).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                warn!(
                    validator = validator.identity(),
                    "Validator panicked, counting as failed"
                );
                false
            });
        debug!(validator = validator.identity(), valid = valid, "Validator verdict");
        outcome = outcome.with_verdict(ValidationVerdict {
            identity: validator.identity().to_string(),
            valid,
        });
    }
    outcome
}

/// Ordered, immutable set of validators configured at startup.
///
/// Holds no per-record state, a single pipeline is shared by all concurrent
/// dispatches.
pub struct ValidationPipeline {
    validators: Vec<Box<dyn Validator>>,
}

impl std::fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationPipeline")
            .field("validators", &self.identities())
            .finish()
    }
}

impl ValidationPipeline {
    /// Creates a new [`ValidationPipeline`] running `validators` in order.
    pub fn new(validators: Vec<Box<dyn Validator>>) -> Self {
        Self { validators }
    }

    /// Evaluates `record` against every configured validator.
    pub async fn evaluate(&self, record: &RawEmailRecord) -> PipelineOutcome {
        evaluate(record, &self.validators).await
    }

    /// Returns the identities of the configured validators, in order.
    pub fn identities(&self) -> Vec<&str> {
        self.validators.iter().map(|v| v.identity()).collect()
    }

    /// Returns the number of configured validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Returns whether no validator is configured.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}
