//! State variable registry with send-on-change
//!
//! A state is only written to the operator when its raw value differs from
//! the last value sent (or on the very first write), so remote traffic grows
//! with the number of value changes rather than with the tick rate.

use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::encoding::{self, StateType};
use crate::remote::{Remote, RemoteError};

#[derive(Error, Debug)]
pub enum StateError {
    #[error("State {0} already exists")]
    DuplicateName(String),
    #[error("State {0} does not exist")]
    NotFound(String),
    #[error("State {0} declared after states were sent to the operator")]
    DeclarationClosed(String),
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// Index of a declared state inside its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateHandle(usize);

/// A named, fixed-width state mirrored to the operator
#[derive(Debug, Clone)]
pub struct StateVariable {
    name: String,
    state_type: StateType,
    last_sent_value: i32,
    has_sent_before: bool,
}

impl StateVariable {
    pub fn new(name: impl Into<String>, state_type: StateType) -> Self {
        Self {
            name: name.into(),
            state_type,
            last_sent_value: 0,
            has_sent_before: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state_type(&self) -> StateType {
        self.state_type
    }

    /// Last raw value written, `None` before the first write
    pub fn last_sent(&self) -> Option<i32> {
        self.has_sent_before.then_some(self.last_sent_value)
    }

    /// Write `raw` to the operator if it changed since the last send
    ///
    /// Returns `true` when anything was written. The sign field of signed
    /// states is only written when the sign flips or on the first send.
    pub fn set(&mut self, remote: &mut dyn Remote, raw: i32) -> Result<bool, RemoteError> {
        if self.has_sent_before && raw == self.last_sent_value {
            return Ok(false);
        }

        let encoded = encoding::encode(self.state_type, raw);
        trace!(state = %self.name, raw = raw, value = encoded.value, "Writing state");
        remote.set_state_variable(&self.name, encoded.value)?;

        if let Some(negative) = encoded.negative {
            let was_negative = self.last_sent_value < 0;
            if !self.has_sent_before || negative != was_negative {
                remote.set_state_variable(
                    &encoding::sign_field_name(&self.name),
                    u32::from(negative),
                )?;
            }
        }

        self.last_sent_value = raw;
        self.has_sent_before = true;
        Ok(true)
    }

    /// Read the current value back from the operator
    pub fn get(&self, remote: &mut dyn Remote) -> Result<i32, RemoteError> {
        let value = remote.get_state_variable(&self.name)?;
        Ok(encoding::decode(value))
    }
}

/// All states of one session, unique by name
#[derive(Debug, Default)]
pub struct StateRegistry {
    states: Vec<StateVariable>,
    by_name: HashMap<String, StateHandle>,
    declared_remote: bool,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new state
    ///
    /// A duplicate name is rejected and the existing handle stays valid.
    /// Declaring is refused once the states were issued to the operator.
    pub fn declare(
        &mut self,
        name: &str,
        state_type: StateType,
    ) -> Result<StateHandle, StateError> {
        if self.declared_remote {
            warn!(state = %name, "State declared after startup, ignoring");
            return Err(StateError::DeclarationClosed(name.to_string()));
        }
        if self.by_name.contains_key(name) {
            warn!(state = %name, "State already exists");
            return Err(StateError::DuplicateName(name.to_string()));
        }

        let handle = StateHandle(self.states.len());
        self.states.push(StateVariable::new(name, state_type));
        self.by_name.insert(name.to_string(), handle);
        debug!(state = %name, state_type = %state_type, "Declared state");
        Ok(handle)
    }

    pub fn find(&self, name: &str) -> Option<StateHandle> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, handle: StateHandle) -> Option<&StateVariable> {
        self.states.get(handle.0)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateVariable> {
        self.states.iter()
    }

    /// Whether the states were already issued to the operator
    pub fn is_declared_remote(&self) -> bool {
        self.declared_remote
    }

    /// Send-on-change write through the state behind `handle`
    pub fn set(
        &mut self,
        remote: &mut dyn Remote,
        handle: StateHandle,
        raw: i32,
    ) -> Result<bool, StateError> {
        let state = self.state_mut(handle)?;
        Ok(state.set(remote, raw)?)
    }

    pub fn read(&self, remote: &mut dyn Remote, handle: StateHandle) -> Result<i32, StateError> {
        let state = self
            .states
            .get(handle.0)
            .ok_or_else(|| StateError::NotFound(format!("#{}", handle.0)))?;
        Ok(state.get(remote)?)
    }

    /// Issue the "add state" directives for every declared state
    ///
    /// Signed states declare their sign field as a second bit-field. After
    /// this call the registry is closed for new declarations.
    pub fn declare_remote(&mut self, remote: &mut dyn Remote) -> Result<(), RemoteError> {
        for state in &self.states {
            for field in encoding::field_declarations(&state.name, state.state_type) {
                remote.add_state_variable(&field.name, field.bit_width, field.initial_value)?;
            }
        }
        self.declared_remote = true;
        debug!(count = self.states.len(), "Declared states on operator");
        Ok(())
    }

    fn state_mut(&mut self, handle: StateHandle) -> Result<&mut StateVariable, StateError> {
        self.states
            .get_mut(handle.0)
            .ok_or_else(|| StateError::NotFound(format!("#{}", handle.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{state_writes, Call, MockRemote};

    #[test]
    fn test_unsigned_send_on_change() {
        let (mut remote, calls) = MockRemote::new();
        let mut registry = StateRegistry::new();
        let handle = registry.declare("Speed", StateType::UnsignedInt32).unwrap();

        for value in [0, 0, 3, 3, 3, 4, 3, 3] {
            registry.set(&mut remote, handle, value).unwrap();
        }

        let writes = state_writes(&calls.borrow());
        let values: Vec<u32> = writes.iter().map(|(_, v)| *v).collect();
        // first call always writes, even for the zero-initialized value
        assert_eq!(values, vec![0, 3, 4, 3]);
        assert!(writes.iter().all(|(name, _)| name == "Speed"));
    }

    #[test]
    fn test_signed_score_scenario() {
        let (mut remote, calls) = MockRemote::new();
        let mut registry = StateRegistry::new();
        let handle = registry.declare("Score", StateType::SignedInt32).unwrap();

        assert!(registry.set(&mut remote, handle, -5).unwrap());
        assert!(!registry.set(&mut remote, handle, -5).unwrap());
        assert!(registry.set(&mut remote, handle, 7).unwrap());

        assert_eq!(
            state_writes(&calls.borrow()),
            vec![
                ("Score".to_string(), 5),
                ("ScoreSign".to_string(), 1),
                ("Score".to_string(), 7),
                ("ScoreSign".to_string(), 0),
            ]
        );
    }

    #[test]
    fn test_sign_written_only_on_flip() {
        let (mut remote, calls) = MockRemote::new();
        let mut registry = StateRegistry::new();
        let handle = registry.declare("X", StateType::SignedInt16).unwrap();

        for value in [3, 4, 5, -1, -2, -3, 0, 2] {
            registry.set(&mut remote, handle, value).unwrap();
        }

        let sign_writes: Vec<u32> = state_writes(&calls.borrow())
            .into_iter()
            .filter(|(name, _)| name == "XSign")
            .map(|(_, v)| v)
            .collect();
        // first write, flip to negative, flip back at zero
        assert_eq!(sign_writes, vec![0, 1, 0]);
    }

    #[test]
    fn test_boolean_encoding() {
        let (mut remote, calls) = MockRemote::new();
        let mut registry = StateRegistry::new();
        let handle = registry.declare("Visible", StateType::Boolean).unwrap();

        registry.set(&mut remote, handle, 5).unwrap();
        registry.set(&mut remote, handle, 0).unwrap();

        assert_eq!(
            state_writes(&calls.borrow()),
            vec![("Visible".to_string(), 1), ("Visible".to_string(), 0)]
        );
    }

    #[test]
    fn test_duplicate_rejected_first_handle_valid() {
        let (mut remote, calls) = MockRemote::new();
        let mut registry = StateRegistry::new();
        let first = registry.declare("Target", StateType::UnsignedInt16).unwrap();

        let second = registry.declare("Target", StateType::SignedInt32);
        assert!(matches!(second, Err(StateError::DuplicateName(name)) if name == "Target"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find("Target"), Some(first));

        registry.set(&mut remote, first, 9).unwrap();
        assert_eq!(state_writes(&calls.borrow()), vec![("Target".to_string(), 9)]);
        assert_eq!(
            registry.get(first).unwrap().state_type(),
            StateType::UnsignedInt16
        );
    }

    #[test]
    fn test_declare_remote_and_close() {
        let (mut remote, calls) = MockRemote::new();
        let mut registry = StateRegistry::new();
        registry.declare("Flag", StateType::Boolean).unwrap();
        registry.declare("Pos", StateType::SignedInt32).unwrap();

        registry.declare_remote(&mut remote).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![
                Call::AddState("Flag".to_string(), 1, 0),
                Call::AddState("Pos".to_string(), 32, 0),
                Call::AddState("PosSign".to_string(), 1, 0),
            ]
        );
        assert!(matches!(
            registry.declare("Late", StateType::Boolean),
            Err(StateError::DeclarationClosed(_))
        ));
    }

    #[test]
    fn test_read_truncates() {
        let (mut remote, _calls) = MockRemote::new();
        remote.states.insert("Feedback".to_string(), 41.9);
        let mut registry = StateRegistry::new();
        let handle = registry.declare("Feedback", StateType::UnsignedInt16).unwrap();

        assert_eq!(registry.read(&mut remote, handle).unwrap(), 41);
    }
}
