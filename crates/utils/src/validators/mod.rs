//! Built-in validators run by the validation pipeline.
//!
//! Currently provides DKIM authentication with header coverage
//! ([`DkimValidator`]) and its production verification engine
//! ([`MailAuthEngine`], feature-gated behind `email-auth`).

#[cfg(feature = "email-auth")]
pub mod authenticator;
pub mod dkim;

#[cfg(feature = "email-auth")]
pub use authenticator::*;
pub use dkim::*;
