//! Contract of the remote operator collaborator
//!
//! Every call is a single blocking round trip. Implementations never retry;
//! a failed call surfaces as a `RemoteError` and the caller decides what to do.

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Not connected to operator")]
    NotConnected,
    #[error("Connection failed: {0}")]
    ConnectFailed(String),
    #[error("Command `{command}` rejected: {response}")]
    Rejected { command: String, response: String },
    #[error("Invalid response to `{command}`: {response:?}")]
    InvalidResponse { command: String, response: String },
    #[error("Transport error: {0}")]
    Transport(String),
}

/// An acquisition module to launch during startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLaunch {
    /// Executable name of the module (e.g., "SignalGenerator")
    pub name: String,
    /// Launch arguments; `None` when the module takes none
    pub args: Option<Vec<String>>,
}

impl ModuleLaunch {
    /// Create a launch entry, normalizing an empty argument list to `None`
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args: if args.is_empty() { None } else { Some(args) },
        }
    }
}

/// Synchronous request/response access to a BCI2000 operator
pub trait Remote {
    /// Operator executable to launch if nothing is listening yet
    fn set_operator_path(&mut self, _path: &Path) {}

    /// Open the connection and run the given initialization commands
    fn connect(&mut self, init_commands: &[String]) -> Result<(), RemoteError>;

    /// Execute a raw operator command, returning its response text
    fn execute(&mut self, command: &str) -> Result<String, RemoteError>;

    fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), RemoteError>;

    fn get_parameter(&mut self, name: &str) -> Result<String, RemoteError>;

    fn add_state_variable(
        &mut self,
        name: &str,
        bit_width: u32,
        initial_value: u32,
    ) -> Result<(), RemoteError>;

    fn set_state_variable(&mut self, name: &str, value: u32) -> Result<(), RemoteError>;

    fn get_state_variable(&mut self, name: &str) -> Result<f64, RemoteError>;

    fn startup_modules(&mut self, modules: &[ModuleLaunch]) -> Result<(), RemoteError>;

    /// Ask the operator to load a parameter file from its own filesystem
    fn load_parameters_remote(&mut self, path: &Path) -> Result<(), RemoteError>;

    fn set_config(&mut self) -> Result<(), RemoteError>;

    fn start(&mut self) -> Result<(), RemoteError>;

    fn stop(&mut self) -> Result<(), RemoteError>;
}
