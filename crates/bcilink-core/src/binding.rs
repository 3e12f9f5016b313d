//! Custom variable binding
//!
//! Custom variables are described by plain data (`VariableDescriptor`) that
//! survives reloads and config files. At bind time each descriptor's
//! `recipient` is resolved into a live `Producer` or `Consumer` and attached
//! to a `StateSender`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::encoding::StateType;
use crate::sender::StateSender;
use crate::session::Session;
use crate::state::StateError;

#[derive(Error, Debug)]
pub enum BindingError {
    #[error("No recipient {recipient} for custom variable {name}")]
    Unresolved { name: String, recipient: String },
    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Something that yields the current value of a send variable
pub trait Producer {
    fn read(&mut self) -> f32;
}

impl<F: FnMut() -> f32> Producer for F {
    fn read(&mut self) -> f32 {
        self()
    }
}

/// Something that receives the value of a get variable every tick
pub trait Consumer {
    fn write(&mut self, value: i32);
}

impl<F: FnMut(i32)> Consumer for F {
    fn write(&mut self, value: i32) {
        self(value)
    }
}

/// Direction of a custom variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// Read from the scene and pushed to the operator
    Send,
    /// Read from the operator and handed to the scene
    Get,
}

/// Serializable description of a custom variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub kind: VariableKind,
    /// State type for send variables
    #[serde(rename = "type", default = "default_state_type")]
    pub state_type: StateType,
    #[serde(default = "default_scale")]
    pub scale: i32,
    /// Key the resolver maps to a producer or consumer
    pub recipient: String,
}

fn default_state_type() -> StateType {
    StateType::UnsignedInt32
}

fn default_scale() -> i32 {
    1
}

/// Maps recipient keys to live callables
pub trait Resolver {
    fn producer(&mut self, recipient: &str) -> Option<Box<dyn Producer>>;
    fn consumer(&mut self, recipient: &str) -> Option<Box<dyn Consumer>>;
}

/// Ordered list of custom variable descriptors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomVariables {
    #[serde(default)]
    pub variables: Vec<VariableDescriptor>,
}

impl CustomVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_send(&mut self, name: &str, recipient: &str, scale: i32, state_type: StateType) {
        self.variables.push(VariableDescriptor {
            name: name.to_string(),
            kind: VariableKind::Send,
            state_type,
            scale,
            recipient: recipient.to_string(),
        });
    }

    pub fn add_get(&mut self, name: &str, recipient: &str) {
        self.variables.push(VariableDescriptor {
            name: name.to_string(),
            kind: VariableKind::Get,
            state_type: default_state_type(),
            scale: 1,
            recipient: recipient.to_string(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableDescriptor> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Resolve every descriptor and attach it to `sender`
    ///
    /// Descriptors whose recipient cannot be resolved are logged and
    /// skipped. Returns the number of variables bound.
    pub fn bind(
        &self,
        sender: &mut StateSender,
        session: &mut Session,
        resolver: &mut dyn Resolver,
    ) -> Result<usize, BindingError> {
        let mut bound = 0;
        for descriptor in &self.variables {
            match bind_one(descriptor, sender, session, resolver) {
                Ok(()) => bound += 1,
                Err(BindingError::Unresolved { name, recipient }) => {
                    warn!(variable = %name, recipient = %recipient, "Custom variable not bound");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(object = %sender.object_name(), bound = bound, "Bound custom variables");
        Ok(bound)
    }
}

fn bind_one(
    descriptor: &VariableDescriptor,
    sender: &mut StateSender,
    session: &mut Session,
    resolver: &mut dyn Resolver,
) -> Result<(), BindingError> {
    let unresolved = || BindingError::Unresolved {
        name: descriptor.name.clone(),
        recipient: descriptor.recipient.clone(),
    };
    match descriptor.kind {
        VariableKind::Send => {
            let producer = resolver.producer(&descriptor.recipient).ok_or_else(unresolved)?;
            sender.add_custom_send_variable(
                session,
                &descriptor.name,
                producer,
                descriptor.scale,
                descriptor.state_type,
            )?;
        }
        VariableKind::Get => {
            let consumer = resolver.consumer(&descriptor.recipient).ok_or_else(unresolved)?;
            sender.add_custom_get_variable(session, &descriptor.name, consumer)?;
        }
    }
    Ok(())
}
