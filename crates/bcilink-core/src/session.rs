//! Session bootstrap and lifecycle
//!
//! The session owns the remote connection and every registry that talks to
//! it. Startup is a strict sequence:
//!
//! 1. `connect`: locate the operator, connect, run init commands
//! 2. `declare_parameters`: announce every registered parameter set
//! 3. `start_modules`: launch the three acquisition modules
//! 4. `load_configuration`: load the parameter file, then add all states
//! 5. `set_config`: commit the configuration
//! 6. `start`: start the run, run deferred commands, notify readiness
//!
//! `bootstrap` runs all of them in order. After that, `stop` and `start`
//! may toggle the run.

use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::discovery::{self, DiscoveryError, DEFAULT_OPERATOR_EXECUTABLE};
use crate::encoding::StateType;
use crate::parameter::{self, ParameterError, ParameterSet};
use crate::remote::{ModuleLaunch, Remote, RemoteError};
use crate::state::{StateError, StateHandle, StateRegistry, StateVariable};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Cannot {operation} while session is {phase}")]
    InvalidPhase { operation: &'static str, phase: Phase },
    #[error("Session has been released")]
    Released,
    #[error("Operator discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("State error: {0}")]
    State(#[from] StateError),
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),
    #[error("Unknown parameter set {0}")]
    UnknownParameterSet(usize),
}

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Unconfigured,
    Connected,
    ParametersDeclared,
    ConfigSet,
    Running,
    Stopped,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unconfigured => "unconfigured",
            Self::Connected => "connected",
            Self::ParametersDeclared => "parameters-declared",
            Self::ConfigSet => "config-set",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The three acquisition module slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSet {
    pub signal_source: ModuleLaunch,
    pub signal_processing: ModuleLaunch,
    pub application: ModuleLaunch,
}

impl Default for ModuleSet {
    fn default() -> Self {
        Self {
            signal_source: ModuleLaunch::new("SignalGenerator", Vec::new()),
            signal_processing: ModuleLaunch::new("DummySignalProcessing", Vec::new()),
            application: ModuleLaunch::new("DummyApplication", Vec::new()),
        }
    }
}

impl ModuleSet {
    pub fn launches(&self) -> Vec<ModuleLaunch> {
        vec![
            self.signal_source.clone(),
            self.signal_processing.clone(),
            self.application.clone(),
        ]
    }
}

/// Startup settings consumed by the bootstrap
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Explicit operator executable; searched for when absent or missing
    pub operator_path: Option<PathBuf>,
    /// Directory searched recursively for the operator
    pub operator_search_dir: PathBuf,
    /// File name suffix identifying the operator executable
    pub operator_executable: String,
    /// Commands run right after connecting
    pub init_commands: Vec<String>,
    pub modules: ModuleSet,
    /// Launch the modules during startup
    pub start_modules: bool,
    /// Parameter file loaded by the operator before states are added
    pub parameters_path: Option<PathBuf>,
    /// Start the run at the end of startup
    pub start_run: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            operator_path: None,
            operator_search_dir: PathBuf::from("StreamingAssets"),
            operator_executable: DEFAULT_OPERATOR_EXECUTABLE.to_string(),
            init_commands: Vec::new(),
            modules: ModuleSet::default(),
            start_modules: true,
            parameters_path: None,
            start_run: true,
        }
    }
}

/// Identifies a parameter set registered with a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterSetId(usize);

/// Called once when the session becomes ready
pub type ReadyListener = Box<dyn FnOnce(&mut Session)>;

/// A single remote operator session and its registries
pub struct Session {
    remote: Option<Box<dyn Remote>>,
    config: SessionConfig,
    phase: Phase,
    states: StateRegistry,
    parameter_sets: Vec<ParameterSet>,
    modules_started: bool,
    run_started: bool,
    post_start_commands: Vec<String>,
    ready_listeners: Vec<ReadyListener>,
    ready: bool,
}

impl Session {
    pub fn new(remote: Box<dyn Remote>, config: SessionConfig) -> Self {
        Self {
            remote: Some(remote),
            config,
            phase: Phase::Unconfigured,
            states: StateRegistry::new(),
            parameter_sets: Vec::new(),
            modules_started: false,
            run_started: false,
            post_start_commands: Vec::new(),
            ready_listeners: Vec::new(),
            ready: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether startup completed and readiness was broadcast
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_released(&self) -> bool {
        self.remote.is_none()
    }

    // ---- registration (setup phase) ----

    /// Declare a state; see `StateRegistry::declare`
    pub fn declare_state(
        &mut self,
        name: &str,
        state_type: StateType,
    ) -> Result<StateHandle, StateError> {
        self.states.declare(name, state_type)
    }

    pub fn find_state(&self, name: &str) -> Option<StateHandle> {
        self.states.find(name)
    }

    pub fn state(&self, handle: StateHandle) -> Option<&StateVariable> {
        self.states.get(handle)
    }

    pub fn states(&self) -> &StateRegistry {
        &self.states
    }

    /// Register a parameter set; its values are loaded back once ready
    pub fn add_parameter_set(&mut self, set: ParameterSet) -> Result<ParameterSetId, SessionError> {
        if self.phase >= Phase::ParametersDeclared {
            return Err(SessionError::InvalidPhase {
                operation: "add parameters",
                phase: self.phase,
            });
        }
        let id = ParameterSetId(self.parameter_sets.len());
        debug!(section = %set.section(), count = set.len(), "Registered parameter set");
        self.parameter_sets.push(set);
        self.on_ready(Box::new(move |session: &mut Session| {
            if let Err(e) = session.load_parameters(id, None) {
                warn!(error = %e, "Failed to load parameters after startup");
            }
        }));
        Ok(id)
    }

    /// Run `listener` once readiness is broadcast, or now if already ready
    pub fn on_ready(&mut self, listener: ReadyListener) {
        if self.ready {
            listener(self);
        } else {
            self.ready_listeners.push(listener);
        }
    }

    /// Queue a command to run right after the run starts
    pub fn execute_after_start(&mut self, command: impl Into<String>) -> Result<(), SessionError> {
        let command = command.into();
        if self.ready {
            self.execute(&command)?;
        } else {
            self.post_start_commands.push(command);
        }
        Ok(())
    }

    // ---- bootstrap ----

    /// Run the whole startup sequence
    pub fn bootstrap(&mut self) -> Result<(), SessionError> {
        self.connect()?;
        self.declare_parameters()?;
        self.start_modules()?;
        self.load_configuration()?;
        self.set_config()?;
        self.start()?;
        Ok(())
    }

    /// Unconfigured -> Connected
    pub fn connect(&mut self) -> Result<(), SessionError> {
        self.expect_phase("connect", Phase::Unconfigured)?;

        let operator = discovery::locate_operator(
            self.config.operator_path.as_deref(),
            &self.config.operator_search_dir,
            &self.config.operator_executable,
        )?;

        let init_commands = self.config.init_commands.clone();
        let remote = self.remote_mut()?;
        remote.set_operator_path(&operator);
        remote.connect(&init_commands)?;

        self.phase = Phase::Connected;
        info!(operator = %operator.display(), "Connected to operator");
        Ok(())
    }

    /// Connected -> ParametersDeclared
    pub fn declare_parameters(&mut self) -> Result<(), SessionError> {
        self.expect_phase("declare parameters", Phase::Connected)?;

        let directives: Vec<String> = self
            .parameter_sets
            .iter()
            .flat_map(|set| set.add_directives())
            .collect();
        let remote = self.remote_mut()?;
        for directive in &directives {
            let response = remote.execute(directive)?;
            if response.starts_with("Error") {
                warn!(directive = %directive, response = %response, "Operator rejected parameter");
            }
        }

        self.phase = Phase::ParametersDeclared;
        debug!(count = directives.len(), "Declared parameters");
        Ok(())
    }

    /// Launch the acquisition modules unless disabled
    pub fn start_modules(&mut self) -> Result<(), SessionError> {
        self.expect_phase("start modules", Phase::ParametersDeclared)?;
        if self.states.is_declared_remote() || self.modules_started {
            return Err(SessionError::InvalidPhase {
                operation: "start modules",
                phase: self.phase,
            });
        }

        if self.config.start_modules {
            let launches = self.config.modules.launches();
            self.remote_mut()?.startup_modules(&launches)?;
            info!(
                modules = ?launches.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
                "Started modules"
            );
        } else {
            debug!("Module startup disabled");
        }
        self.modules_started = true;
        Ok(())
    }

    /// Load the parameter file, then add every declared state
    pub fn load_configuration(&mut self) -> Result<(), SessionError> {
        self.expect_phase("load configuration", Phase::ParametersDeclared)?;
        if self.states.is_declared_remote() {
            return Err(SessionError::InvalidPhase {
                operation: "load configuration twice",
                phase: self.phase,
            });
        }

        let parameters_path = self.config.parameters_path.clone();
        let remote = self.remote.as_deref_mut().ok_or(SessionError::Released)?;
        match parameters_path {
            Some(path) => {
                remote.load_parameters_remote(&path)?;
                info!(path = %path.display(), "Loaded parameter file");
            }
            None => debug!("No parameter file configured"),
        }
        self.states.declare_remote(remote)?;
        Ok(())
    }

    /// ParametersDeclared -> ConfigSet
    pub fn set_config(&mut self) -> Result<(), SessionError> {
        self.expect_phase("set config", Phase::ParametersDeclared)?;
        if !self.states.is_declared_remote() {
            return Err(SessionError::InvalidPhase {
                operation: "set config before states are declared",
                phase: self.phase,
            });
        }
        self.remote_mut()?.set_config()?;
        self.phase = Phase::ConfigSet;
        Ok(())
    }

    /// ConfigSet/Stopped -> Running
    ///
    /// The first start also runs the deferred commands and broadcasts
    /// readiness.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if !matches!(self.phase, Phase::ConfigSet | Phase::Stopped) {
            return Err(SessionError::InvalidPhase {
                operation: "start",
                phase: self.phase,
            });
        }

        let start_run = self.config.start_run || self.phase == Phase::Stopped;
        if start_run {
            self.remote_mut()?.start()?;
            self.run_started = true;
            info!("Run started");
        } else {
            debug!("Run start suppressed");
        }
        self.phase = Phase::Running;

        if !self.ready {
            // a failing command must not hold back readiness
            for command in std::mem::take(&mut self.post_start_commands) {
                if let Err(e) = self.execute(&command) {
                    warn!(command = %command, error = %e, "Deferred command failed");
                }
            }
            self.ready = true;
            let listeners = std::mem::take(&mut self.ready_listeners);
            debug!(listeners = listeners.len(), "Session ready");
            for listener in listeners {
                listener(self);
            }
        }
        Ok(())
    }

    /// Running -> Stopped; a no-op once the remote is released
    pub fn stop(&mut self) -> Result<(), SessionError> {
        let Some(remote) = self.remote.as_deref_mut() else {
            return Ok(());
        };
        if self.phase != Phase::Running {
            return Err(SessionError::InvalidPhase {
                operation: "stop",
                phase: self.phase,
            });
        }
        if self.run_started {
            remote.stop()?;
            self.run_started = false;
            info!("Run stopped");
        }
        self.phase = Phase::Stopped;
        Ok(())
    }

    /// Stop if running and release the remote; safe to call repeatedly
    pub fn shutdown(&mut self) {
        if self.remote.is_none() {
            return;
        }
        if self.phase == Phase::Running {
            if let Err(e) = self.stop() {
                warn!(error = %e, "Failed to stop run during shutdown");
            }
        }
        self.remote = None;
        debug!("Session released");
    }

    // ---- per-tick access ----

    /// Send-on-change write; only allowed once the session is ready
    pub fn set_state(&mut self, handle: StateHandle, value: i32) -> Result<bool, SessionError> {
        self.expect_ready("set state")?;
        let remote = self.remote.as_deref_mut().ok_or(SessionError::Released)?;
        Ok(self.states.set(remote, handle, value)?)
    }

    pub fn get_state(&mut self, handle: StateHandle) -> Result<i32, SessionError> {
        self.expect_ready("get state")?;
        let remote = self.remote.as_deref_mut().ok_or(SessionError::Released)?;
        Ok(self.states.read(remote, handle)?)
    }

    /// Execute a raw operator command and return its response
    pub fn execute(&mut self, command: &str) -> Result<String, SessionError> {
        Ok(self.remote_mut()?.execute(command)?)
    }

    // ---- parameters ----

    pub fn parameters(&self, id: ParameterSetId) -> Result<&ParameterSet, SessionError> {
        self.parameter_sets
            .get(id.0)
            .ok_or(SessionError::UnknownParameterSet(id.0))
    }

    pub fn parameters_mut(&mut self, id: ParameterSetId) -> Result<&mut ParameterSet, SessionError> {
        self.parameter_sets
            .get_mut(id.0)
            .ok_or(SessionError::UnknownParameterSet(id.0))
    }

    pub fn save_parameters(&mut self, id: ParameterSetId, name: Option<&str>) -> Result<(), SessionError> {
        let set = self
            .parameter_sets
            .get(id.0)
            .ok_or(SessionError::UnknownParameterSet(id.0))?;
        let remote = self.remote.as_deref_mut().ok_or(SessionError::Released)?;
        set.save(remote, name)?;
        Ok(())
    }

    pub fn load_parameters(&mut self, id: ParameterSetId, name: Option<&str>) -> Result<usize, SessionError> {
        let set = self
            .parameter_sets
            .get_mut(id.0)
            .ok_or(SessionError::UnknownParameterSet(id.0))?;
        let remote = self.remote.as_deref_mut().ok_or(SessionError::Released)?;
        Ok(set.load(remote, name)?)
    }

    pub fn get_parameter_string(&mut self, name: &str) -> Result<String, SessionError> {
        Ok(parameter::get_string(self.remote_mut()?, name)?)
    }

    pub fn set_parameter_string(&mut self, name: &str, value: &str) -> Result<(), SessionError> {
        Ok(parameter::set_string(self.remote_mut()?, name, value)?)
    }

    pub fn get_parameter_int(&mut self, name: &str) -> Result<i32, SessionError> {
        Ok(parameter::get_int(self.remote_mut()?, name)?)
    }

    pub fn set_parameter_int(&mut self, name: &str, value: i32) -> Result<(), SessionError> {
        Ok(parameter::set_int(self.remote_mut()?, name, value)?)
    }

    fn remote_mut(&mut self) -> Result<&mut (dyn Remote + 'static), SessionError> {
        self.remote.as_deref_mut().ok_or(SessionError::Released)
    }

    fn expect_phase(&self, operation: &'static str, phase: Phase) -> Result<(), SessionError> {
        if self.remote.is_none() {
            return Err(SessionError::Released);
        }
        if self.phase != phase {
            return Err(SessionError::InvalidPhase {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }

    fn expect_ready(&self, operation: &'static str) -> Result<(), SessionError> {
        if !self.ready {
            return Err(SessionError::InvalidPhase {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
