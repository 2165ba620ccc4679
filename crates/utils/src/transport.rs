use std::{error::Error, fmt::Display, future::Future, io, pin::Pin};

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Boxed future type for publish operations, enabling object safety.
///
/// Resolves to the message id assigned to the published record.
pub type PublishFuture<'a> = Pin<Box<dyn Future<Output = TransportResult<String>> + Send + 'a>>;

/// Errors that can occur while publishing or consuming records.
#[derive(Debug)]
pub enum TransportError {
    /// A connection error occurred.
    Connection(String),
    /// A serialization error occurred.
    Serialization(String),
    /// The broker rejected or failed a command.
    Command(String),
    /// An I/O error occurred.
    Io(io::Error),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Connection(msg) => write!(f, "Connection error: {msg}"),
            TransportError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            TransportError::Command(msg) => write!(f, "Command error: {msg}"),
            TransportError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl Error for TransportError {}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Trait for destinations that validated records are forwarded to.
///
/// A publisher is bound to one fixed destination at construction and
/// delivers records in publish order for a given ordering key. Publishing a
/// record is a single atomic operation: either the full record is delivered
/// or nothing is. Publishers never retry, retry policy belongs to the
/// caller's transport.
pub trait RecordPublisher: Send + Sync {
    /// Publishes the encoded record bytes under `ordering_key`.
    fn publish<'a>(&'a self, payload: &'a [u8], ordering_key: &'a str) -> PublishFuture<'a>;

    /// Returns a printable name of the destination (queue, topic, directory).
    fn destination(&self) -> &str;
}
