pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod inbound;
pub mod ingress;
pub mod mime;
pub mod pipeline;
pub mod record;
pub mod setup;
pub mod transport;
pub mod transports;
pub mod validator;
pub mod validators;

#[cfg(test)]
pub(crate) mod testing;

pub use codec::*;
pub use config::*;
pub use dispatcher::*;
pub use inbound::*;
pub use ingress::*;
pub use mime::*;
pub use pipeline::*;
pub use record::*;
pub use setup::*;
pub use transport::*;
pub use transports::*;
pub use validator::*;
pub use validators::*;
