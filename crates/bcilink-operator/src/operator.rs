//! Blocking operator connection over telnet
//!
//! `OperatorConnection` implements the core `Remote` contract by driving the
//! async telnet transport on a private current-thread runtime. It must not be
//! used from inside another async runtime.

use bcilink_core::{ModuleLaunch, Remote, RemoteError};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{debug, info, trace, warn};

use crate::transcript::Transcript;
use crate::transport::TelnetTransport;

pub const DEFAULT_TELNET_IP: &str = "127.0.0.1";
pub const DEFAULT_TELNET_PORT: u16 = 3999;

/// Default timeout for a single round trip
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default time allowed for a launched operator or its modules to come up
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30000;

const RETRY_INTERVAL_MS: u64 = 250;

const STARTUP_SYSTEM: &str = "Startup system localhost";
const WAIT_FOR_CONNECTED: &str = "Wait for Connected";
const SET_CONFIG: &str = "Set config";
const START: &str = "Start";
const STOP: &str = "Stop";
const QUIT: &str = "Quit";

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Not connected to operator")]
    NotConnected,
    #[error("Operator not reachable at {0}")]
    NotReachable(SocketAddr),
    #[error("Invalid telnet address {0}")]
    InvalidAddress(String),
    #[error("Failed to launch operator {}: {source}", path.display())]
    LaunchFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Command `{command}` rejected: {response}")]
    Rejected { command: String, response: String },
    #[error("Invalid response to `{command}`: {response:?}")]
    InvalidResponse { command: String, response: String },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Transport error: {0}")]
    TransportError(#[from] anyhow::Error),
}

impl From<OperatorError> for RemoteError {
    fn from(e: OperatorError) -> Self {
        match e {
            OperatorError::NotConnected => RemoteError::NotConnected,
            OperatorError::Rejected { command, response } => {
                RemoteError::Rejected { command, response }
            }
            OperatorError::InvalidResponse { command, response } => {
                RemoteError::InvalidResponse { command, response }
            }
            other @ (OperatorError::NotReachable(_)
            | OperatorError::InvalidAddress(_)
            | OperatorError::LaunchFailed { .. }) => RemoteError::ConnectFailed(other.to_string()),
            OperatorError::IoError(e) => RemoteError::Transport(e.to_string()),
            OperatorError::TransportError(e) => RemoteError::Transport(format!("{:#}", e)),
        }
    }
}

/// Connection and logging settings for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorSettings {
    pub telnet_ip: String,
    pub telnet_port: u16,
    /// Show the operator window when launching it
    pub window_visible: bool,
    pub timeout_ms: u64,
    pub startup_timeout_ms: u64,
    /// Transcript file, disabled when `None`
    pub log_file: Option<PathBuf>,
    /// Include state traffic in the transcript
    pub log_states: bool,
    /// Include bare prompts in the transcript
    pub log_prompts: bool,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            telnet_ip: DEFAULT_TELNET_IP.to_string(),
            telnet_port: DEFAULT_TELNET_PORT,
            window_visible: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            log_file: None,
            log_states: false,
            log_prompts: false,
        }
    }
}

pub fn set_parameter_command(name: &str, value: &str) -> String {
    format!("Set parameter {} {}", name, value)
}

pub fn get_parameter_command(name: &str) -> String {
    format!("Get parameter {}", name)
}

pub fn add_state_command(name: &str, bit_width: u32, initial_value: u32) -> String {
    format!("Add state {} {} {}", name, bit_width, initial_value)
}

pub fn set_state_command(name: &str, value: u32) -> String {
    format!("Set state {} {}", name, value)
}

pub fn get_state_command(name: &str) -> String {
    format!("Get state {}", name)
}

/// `Start executable` line for one module; arguments get a `--` prefix if missing
pub fn start_executable_command(module: &ModuleLaunch) -> String {
    let mut command = format!("Start executable {} --local", module.name);
    for arg in module.args.iter().flatten() {
        command.push(' ');
        if !arg.starts_with("--") {
            command.push_str("--");
        }
        command.push_str(arg);
    }
    command
}

pub fn load_parameterfile_command(path: &Path) -> String {
    format!("Load parameterfile \"{}\"", path.display())
}

/// Command line arguments for launching an idle operator
pub fn launch_args(settings: &OperatorSettings) -> Vec<String> {
    let mut args = vec![
        "--Telnet".to_string(),
        format!("{}:{}", settings.telnet_ip, settings.telnet_port),
        "--StartupIdle".to_string(),
    ];
    if !settings.window_visible {
        args.push("--Hide".to_string());
    }
    args
}

fn is_error_response(response: &str) -> bool {
    response.starts_with("Error")
}

fn launch_operator(path: &Path, settings: &OperatorSettings) -> Result<(), OperatorError> {
    let args = launch_args(settings);
    info!(path = %path.display(), args = ?args, "Launching operator");

    let mut command = Command::new(path);
    command.args(&args);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        command.current_dir(dir);
    }
    command.spawn().map_err(|source| OperatorError::LaunchFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Async half of the connection
struct Link {
    settings: OperatorSettings,
    operator_path: Option<PathBuf>,
    transport: Option<TelnetTransport>,
    transcript: Option<Transcript>,
    launched: bool,
}

impl Link {
    async fn resolve(&self) -> Result<SocketAddr, OperatorError> {
        let address = format!("{}:{}", self.settings.telnet_ip, self.settings.telnet_port);
        let mut addrs = tokio::net::lookup_host(address.clone())
            .await
            .map_err(|_| OperatorError::InvalidAddress(address.clone()))?;
        addrs.next().ok_or(OperatorError::InvalidAddress(address))
    }

    /// Connect to a listening operator, launching one if nothing answers
    async fn open(&mut self) -> Result<TelnetTransport, OperatorError> {
        let target = self.resolve().await?;
        match TelnetTransport::connect(target, self.settings.timeout_ms).await {
            Ok(transport) => return Ok(transport),
            Err(e) => debug!(target = %target, error = %e, "No operator listening"),
        }

        let Some(path) = self.operator_path.clone() else {
            return Err(OperatorError::NotReachable(target));
        };
        launch_operator(&path, &self.settings)?;
        self.launched = true;

        let deadline = Instant::now() + Duration::from_millis(self.settings.startup_timeout_ms);
        loop {
            tokio::time::sleep(Duration::from_millis(RETRY_INTERVAL_MS)).await;
            match TelnetTransport::connect(target, self.settings.timeout_ms).await {
                Ok(transport) => return Ok(transport),
                Err(e) if Instant::now() < deadline => {
                    trace!(target = %target, error = %e, "Operator not up yet");
                }
                Err(e) => {
                    warn!(target = %target, error = %e, "Operator did not come up in time");
                    return Err(OperatorError::NotReachable(target));
                }
            }
        }
    }

    async fn connect(&mut self, init_commands: &[String]) -> Result<(), OperatorError> {
        if self.transport.is_some() {
            debug!("Already connected to operator");
            return Ok(());
        }
        if let Some(path) = &self.settings.log_file {
            self.transcript = Some(Transcript::open(
                path,
                self.settings.log_states,
                self.settings.log_prompts,
            )?);
        }

        let mut transport = self.open().await?;
        transport.read_banner().await?;
        let target = transport.target();
        info!(target = %target, "Connected to operator");
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.note(&format!("Connected to {}", target));
        }
        self.transport = Some(transport);

        for command in init_commands {
            self.command(command, None).await?;
        }
        Ok(())
    }

    /// One round trip; the response is returned as-is
    async fn transceive(
        &mut self,
        command: &str,
        timeout_ms: Option<u64>,
    ) -> Result<String, OperatorError> {
        let transport = self.transport.as_mut().ok_or(OperatorError::NotConnected)?;
        let result = match timeout_ms {
            Some(ms) => transport.transceive_within(command, ms).await,
            None => transport.transceive(command).await,
        };
        // a late reply would be read as the answer to the next command
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(command = %command, error = %e, "Dropping operator connection");
                self.transport = None;
                if let Some(transcript) = self.transcript.as_mut() {
                    transcript.note(&format!("Connection dropped after `{}`: {}", command, e));
                }
                return Err(e.into());
            }
        };
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record(command, &response);
        }
        Ok(response)
    }

    /// One round trip; an `Error` response becomes `Rejected`
    async fn command(
        &mut self,
        command: &str,
        timeout_ms: Option<u64>,
    ) -> Result<String, OperatorError> {
        let response = self.transceive(command, timeout_ms).await?;
        if is_error_response(&response) {
            warn!(command = %command, response = %response, "Operator rejected command");
            return Err(OperatorError::Rejected {
                command: command.to_string(),
                response,
            });
        }
        Ok(response)
    }

    /// Ask the operator to exit; it closes the connection without a prompt
    async fn quit(&mut self) -> Result<(), OperatorError> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        transport.send(QUIT).await?;
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record(QUIT, "");
        }
        info!(target = %transport.target(), "Operator asked to quit");
        Ok(())
    }
}

/// Blocking `Remote` implementation backed by a telnet connection
pub struct OperatorConnection {
    runtime: Runtime,
    link: Link,
}

impl OperatorConnection {
    pub fn new(settings: OperatorSettings) -> Result<Self, OperatorError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            link: Link {
                settings,
                operator_path: None,
                transport: None,
                transcript: None,
                launched: false,
            },
        })
    }

    pub fn settings(&self) -> &OperatorSettings {
        &self.link.settings
    }

    pub fn is_connected(&self) -> bool {
        self.link.transport.is_some()
    }

    /// Whether this connection launched the operator process itself
    pub fn launched_operator(&self) -> bool {
        self.link.launched
    }

    /// Tell the operator to exit and drop the connection
    pub fn quit(&mut self) -> Result<(), OperatorError> {
        self.runtime.block_on(self.link.quit())
    }

    fn run(&mut self, command: &str) -> Result<String, OperatorError> {
        self.runtime.block_on(self.link.command(command, None))
    }

    fn run_within(&mut self, command: &str, timeout_ms: u64) -> Result<String, OperatorError> {
        self.runtime.block_on(self.link.command(command, Some(timeout_ms)))
    }
}

impl Drop for OperatorConnection {
    fn drop(&mut self) {
        // only an operator we launched is shut down with us
        if self.link.launched {
            if let Err(e) = self.quit() {
                warn!(error = %e, "Failed to quit operator");
            }
        }
    }
}

impl Remote for OperatorConnection {
    fn set_operator_path(&mut self, path: &Path) {
        self.link.operator_path = Some(path.to_path_buf());
    }

    fn connect(&mut self, init_commands: &[String]) -> Result<(), RemoteError> {
        Ok(self.runtime.block_on(self.link.connect(init_commands))?)
    }

    fn execute(&mut self, command: &str) -> Result<String, RemoteError> {
        Ok(self.runtime.block_on(self.link.transceive(command, None))?)
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), RemoteError> {
        self.run(&set_parameter_command(name, value))?;
        Ok(())
    }

    fn get_parameter(&mut self, name: &str) -> Result<String, RemoteError> {
        Ok(self.run(&get_parameter_command(name))?)
    }

    fn add_state_variable(
        &mut self,
        name: &str,
        bit_width: u32,
        initial_value: u32,
    ) -> Result<(), RemoteError> {
        self.run(&add_state_command(name, bit_width, initial_value))?;
        Ok(())
    }

    fn set_state_variable(&mut self, name: &str, value: u32) -> Result<(), RemoteError> {
        self.run(&set_state_command(name, value))?;
        Ok(())
    }

    fn get_state_variable(&mut self, name: &str) -> Result<f64, RemoteError> {
        let command = get_state_command(name);
        let response = self.run(&command)?;
        response
            .parse::<f64>()
            .map_err(|_| RemoteError::InvalidResponse { command, response })
    }

    fn startup_modules(&mut self, modules: &[ModuleLaunch]) -> Result<(), RemoteError> {
        self.run(STARTUP_SYSTEM)?;
        for module in modules {
            self.run(&start_executable_command(module))?;
        }
        let startup_timeout_ms = self.link.settings.startup_timeout_ms;
        self.run_within(WAIT_FOR_CONNECTED, startup_timeout_ms)?;
        info!(modules = modules.len(), "Modules connected");
        Ok(())
    }

    fn load_parameters_remote(&mut self, path: &Path) -> Result<(), RemoteError> {
        self.run(&load_parameterfile_command(path))?;
        Ok(())
    }

    fn set_config(&mut self) -> Result<(), RemoteError> {
        self.run(SET_CONFIG)?;
        Ok(())
    }

    fn start(&mut self) -> Result<(), RemoteError> {
        self.run(START)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RemoteError> {
        self.run(STOP)?;
        Ok(())
    }
}
