//! Per-object state sender
//!
//! A `StateSender` belongs to one scene object and owns the bindings that
//! move values between that object and the operator on every tick. State
//! names are prefixed with the object name, whitespace removed from both.

use std::rc::Rc;
use tracing::{debug, warn};

use crate::binding::{Consumer, Producer};
use crate::encoding::StateType;
use crate::session::{Session, SessionError};
use crate::state::{StateError, StateHandle};

/// Default scale for world coordinates (millimetres from metres)
pub const DEFAULT_GLOBAL_SCALE: i32 = 1000;
pub const DEFAULT_SCREEN_SCALE: i32 = 1;
pub const DEFAULT_SPEED_SCALE: i32 = 1;

/// Live data of a scene object
pub trait ObjectSource {
    /// World position
    fn position(&self) -> [f32; 3];
    /// Position in screen coordinates (pixels, depth)
    fn screen_position(&self) -> [f32; 3];
    /// Visibility, `None` when the object cannot be rendered
    fn is_visible(&self) -> Option<bool>;
    /// Speed magnitude, `None` when the object has no physics body
    fn speed(&self) -> Option<f32>;
}

/// Which object states to send, each with its scale
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectStates {
    pub global_x: Option<i32>,
    pub global_y: Option<i32>,
    pub global_z: Option<i32>,
    pub screen_x: Option<i32>,
    pub screen_y: Option<i32>,
    pub screen_z: Option<i32>,
    pub on_screen: bool,
    pub speed: Option<i32>,
}

enum Binding {
    Send {
        handle: StateHandle,
        producer: Box<dyn Producer>,
        scale: i32,
    },
    Get {
        handle: StateHandle,
        consumer: Box<dyn Consumer>,
    },
}

/// Bindings of one scene object
pub struct StateSender {
    object_name: String,
    bindings: Vec<Binding>,
}

impl StateSender {
    pub fn new(object_name: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            bindings: Vec::new(),
        }
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// `<ObjectName><StateName>` with all whitespace removed
    pub fn state_name(&self, name: &str) -> String {
        self.object_name
            .chars()
            .chain(name.chars())
            .filter(|c| !c.is_whitespace())
            .collect()
    }

    /// Declare `<Object><name>` and send the producer's value to it
    ///
    /// Boolean states always use a scale of 1.
    pub fn add_send_state(
        &mut self,
        session: &mut Session,
        name: &str,
        state_type: StateType,
        producer: Box<dyn Producer>,
        scale: i32,
    ) -> Result<StateHandle, StateError> {
        let handle = session.declare_state(&self.state_name(name), state_type)?;
        let scale = if state_type == StateType::Boolean { 1 } else { scale };
        self.bindings.push(Binding::Send {
            handle,
            producer,
            scale,
        });
        Ok(handle)
    }

    /// Send the producer's value to an already declared state
    ///
    /// An unknown state name is logged and ignored.
    pub fn add_send_existing_state(
        &mut self,
        session: &Session,
        name: &str,
        producer: Box<dyn Producer>,
        scale: i32,
    ) -> Option<StateHandle> {
        let Some(handle) = session.find_state(name) else {
            warn!(state = %name, "State does not exist");
            return None;
        };
        self.bindings.push(Binding::Send {
            handle,
            producer,
            scale,
        });
        Some(handle)
    }

    /// Hand the value of state `name` to `consumer` every tick
    ///
    /// The state is reused when it exists, otherwise it is declared as an
    /// unsigned 16-bit state.
    pub fn add_get_state(
        &mut self,
        session: &mut Session,
        name: &str,
        consumer: Box<dyn Consumer>,
    ) -> Result<StateHandle, StateError> {
        let handle = match session.find_state(name) {
            Some(handle) => handle,
            None => session.declare_state(name, StateType::UnsignedInt16)?,
        };
        self.bindings.push(Binding::Get { handle, consumer });
        Ok(handle)
    }

    /// Send to `<Object><name>`, declaring it on first use
    pub fn add_custom_send_variable(
        &mut self,
        session: &mut Session,
        name: &str,
        producer: Box<dyn Producer>,
        scale: i32,
        state_type: StateType,
    ) -> Result<StateHandle, StateError> {
        let full_name = self.state_name(name);
        if session.find_state(&full_name).is_none() {
            return self.add_send_state(session, name, state_type, producer, scale);
        }
        self.add_send_existing_state(session, &full_name, producer, scale)
            .ok_or(StateError::NotFound(full_name))
    }

    pub fn add_custom_get_variable(
        &mut self,
        session: &mut Session,
        name: &str,
        consumer: Box<dyn Consumer>,
    ) -> Result<StateHandle, StateError> {
        self.add_get_state(session, name, consumer)
    }

    /// Declare the selected object states, reading them from `source`
    pub fn attach_object(
        &mut self,
        session: &mut Session,
        source: Rc<dyn ObjectSource>,
        selection: &ObjectStates,
    ) -> Result<(), StateError> {
        let axes = [
            ("GlobalX", selection.global_x, false, 0),
            ("GlobalY", selection.global_y, false, 1),
            ("GlobalZ", selection.global_z, false, 2),
            ("ScreenX", selection.screen_x, true, 0),
            ("ScreenY", selection.screen_y, true, 1),
            ("ScreenZ", selection.screen_z, true, 2),
        ];
        for (name, scale, screen, axis) in axes {
            let Some(scale) = scale else { continue };
            let source = source.clone();
            let producer: Box<dyn Producer> = if screen {
                Box::new(move || source.screen_position()[axis])
            } else {
                Box::new(move || source.position()[axis])
            };
            self.add_send_state(session, name, StateType::SignedInt32, producer, scale)?;
        }

        if selection.on_screen {
            if source.is_visible().is_some() {
                let source = source.clone();
                let producer = Box::new(move || match source.is_visible() {
                    Some(true) => 1.0_f32,
                    _ => 0.0,
                });
                self.add_send_state(session, "Is on screen", StateType::Boolean, producer, 1)?;
            } else {
                debug!(object = %self.object_name, "No renderer, skipping on-screen state");
            }
        }

        if let Some(scale) = selection.speed {
            if source.speed().is_some() {
                let source = source.clone();
                let producer = Box::new(move || source.speed().unwrap_or(0.0));
                self.add_send_state(session, "Speed", StateType::UnsignedInt32, producer, scale)?;
            } else {
                debug!(object = %self.object_name, "No physics body, skipping speed state");
            }
        }
        Ok(())
    }

    /// Push every send binding and dispatch every get binding
    ///
    /// Does nothing until the session is ready.
    pub fn tick(&mut self, session: &mut Session) -> Result<(), SessionError> {
        if !session.is_ready() {
            return Ok(());
        }
        for binding in &mut self.bindings {
            match binding {
                Binding::Send {
                    handle,
                    producer,
                    scale,
                } => {
                    let value = (producer.read() * *scale as f32) as i32;
                    session.set_state(*handle, value)?;
                }
                Binding::Get { handle, consumer } => {
                    let value = session.get_state(*handle)?;
                    consumer.write(value);
                }
            }
        }
        Ok(())
    }
}
