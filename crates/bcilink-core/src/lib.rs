//! bcilink Core - state/parameter synchronization with a BCI2000 operator
//!
//! This crate provides the synchronization core of bcilink:
//! - State variable registry with send-on-change writes
//! - Float parameter registry with explicit save/load
//! - Session bootstrap driving the operator through its startup sequence
//! - Per-object state senders and late-bound custom variables

pub mod binding;
pub mod discovery;
pub mod encoding;
pub mod parameter;
pub mod remote;
pub mod sender;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod mock;

pub use binding::{BindingError, Consumer, CustomVariables, Producer, Resolver, VariableDescriptor, VariableKind};
pub use discovery::{locate_operator, DiscoveryError};
pub use encoding::StateType;
pub use parameter::{Parameter, ParameterError, ParameterSet};
pub use remote::{ModuleLaunch, Remote, RemoteError};
pub use sender::{ObjectSource, ObjectStates, StateSender};
pub use session::{ModuleSet, ParameterSetId, Phase, Session, SessionConfig, SessionError};
pub use state::{StateError, StateHandle, StateRegistry, StateVariable};
