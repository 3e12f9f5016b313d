//! bcilink operator - telnet client for the BCI2000 operator
//!
//! This crate implements the core `Remote` contract against a running
//! BCI2000 operator, launching one when nothing is listening.

pub mod operator;
pub mod transcript;
pub mod transport;

pub use operator::{
    OperatorConnection, OperatorError, OperatorSettings, DEFAULT_STARTUP_TIMEOUT_MS,
    DEFAULT_TELNET_IP, DEFAULT_TELNET_PORT, DEFAULT_TIMEOUT_MS,
};
pub use transcript::Transcript;
pub use transport::TelnetTransport;
