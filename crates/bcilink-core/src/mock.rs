//! Recording remote used by unit tests

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::remote::{ModuleLaunch, Remote, RemoteError};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect(Vec<String>),
    Execute(String),
    SetParameter(String, String),
    GetParameter(String),
    AddState(String, u32, u32),
    SetState(String, u32),
    GetState(String),
    StartupModules(Vec<ModuleLaunch>),
    LoadParameters(PathBuf),
    SetConfig,
    Start,
    Stop,
}

/// Remote that records every call and answers from in-memory tables
#[derive(Default)]
pub struct MockRemote {
    pub calls: Rc<RefCell<Vec<Call>>>,
    pub parameters: HashMap<String, String>,
    pub states: HashMap<String, f64>,
    pub fail_connect: bool,
    /// Canned `execute` replies by command
    pub responses: HashMap<String, String>,
    /// Commands whose `execute` fails with a transport error
    pub failing_commands: Vec<String>,
}

impl MockRemote {
    pub fn new() -> (Self, Rc<RefCell<Vec<Call>>>) {
        let remote = Self::default();
        let calls = remote.calls.clone();
        (remote, calls)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl Remote for MockRemote {
    fn connect(&mut self, init_commands: &[String]) -> Result<(), RemoteError> {
        self.record(Call::Connect(init_commands.to_vec()));
        if self.fail_connect {
            return Err(RemoteError::ConnectFailed("refused".to_string()));
        }
        Ok(())
    }

    fn execute(&mut self, command: &str) -> Result<String, RemoteError> {
        self.record(Call::Execute(command.to_string()));
        if self.failing_commands.iter().any(|c| c == command) {
            return Err(RemoteError::Transport("connection reset".to_string()));
        }
        Ok(self.responses.get(command).cloned().unwrap_or_default())
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), RemoteError> {
        self.record(Call::SetParameter(name.to_string(), value.to_string()));
        self.parameters.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn get_parameter(&mut self, name: &str) -> Result<String, RemoteError> {
        self.record(Call::GetParameter(name.to_string()));
        Ok(self.parameters.get(name).cloned().unwrap_or_default())
    }

    fn add_state_variable(
        &mut self,
        name: &str,
        bit_width: u32,
        initial_value: u32,
    ) -> Result<(), RemoteError> {
        self.record(Call::AddState(name.to_string(), bit_width, initial_value));
        Ok(())
    }

    fn set_state_variable(&mut self, name: &str, value: u32) -> Result<(), RemoteError> {
        self.record(Call::SetState(name.to_string(), value));
        self.states.insert(name.to_string(), value as f64);
        Ok(())
    }

    fn get_state_variable(&mut self, name: &str) -> Result<f64, RemoteError> {
        self.record(Call::GetState(name.to_string()));
        Ok(self.states.get(name).copied().unwrap_or(0.0))
    }

    fn startup_modules(&mut self, modules: &[ModuleLaunch]) -> Result<(), RemoteError> {
        self.record(Call::StartupModules(modules.to_vec()));
        Ok(())
    }

    fn load_parameters_remote(&mut self, path: &Path) -> Result<(), RemoteError> {
        self.record(Call::LoadParameters(path.to_path_buf()));
        Ok(())
    }

    fn set_config(&mut self) -> Result<(), RemoteError> {
        self.record(Call::SetConfig);
        Ok(())
    }

    fn start(&mut self) -> Result<(), RemoteError> {
        self.record(Call::Start);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RemoteError> {
        self.record(Call::Stop);
        Ok(())
    }
}

/// Only the state writes from a call log
pub fn state_writes(calls: &[Call]) -> Vec<(String, u32)> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::SetState(name, value) => Some((name.clone(), *value)),
            _ => None,
        })
        .collect()
}
