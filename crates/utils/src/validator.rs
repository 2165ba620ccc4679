//! Pluggable checks run over every decoded email record.
//!
//! A [`Validator`] inspects a [`RawEmailRecord`] and renders a boolean
//! verdict. Validators run inside the
//! [`ValidationPipeline`](crate::ValidationPipeline) and may perform async
//! operations such as DNS lookups. Concrete implementations live in the
//! [`validators`](crate::validators) module.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::RawEmailRecord;

/// Boxed future type for validator operations, enabling async validators.
pub type ValidateFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Trait for checks that decide whether a record may be forwarded.
///
/// Implementations must not mutate the record and must never surface an
/// error: any internal failure (unparseable sub-structure, lookup failure)
/// resolves to `false`, so that one misbehaving validator cannot abort the
/// evaluation of the others.
pub trait Validator: Send + Sync {
    /// Returns whether the record passes this check.
    fn is_valid<'a>(&'a self, record: &'a RawEmailRecord) -> ValidateFuture<'a>;

    /// Returns the stable name of this validator, used for attribution in
    /// logs and pipeline outcomes.
    fn identity(&self) -> &str;
}

impl<V: Validator + ?Sized> Validator for Arc<V> {
    fn is_valid<'a>(&'a self, record: &'a RawEmailRecord) -> ValidateFuture<'a> {
        (**self).is_valid(record)
    }

    fn identity(&self) -> &str {
        (**self).identity()
    }
}
