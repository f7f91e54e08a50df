//! Core askdoc library (config, transport, streaming answer pipeline).

pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod stream;
pub mod transport;

pub use error::{ChatError, ChatErrorKind, ChatResult};
pub use session::SessionContext;
