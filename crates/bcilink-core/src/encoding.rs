//! Wire encoding of state values
//!
//! BCI2000 states are unsigned bit-fields. Signed quantities are carried as a
//! magnitude field plus a separate one-bit `<Name>Sign` field. Everything that
//! knows about that convention lives here so the registry only deals with
//! `StateType` and `EncodedValue`.

use serde::{Deserialize, Serialize};

/// Suffix of the auxiliary sign field declared for signed states
pub const SIGN_SUFFIX: &str = "Sign";

/// Type of a state variable as seen by the scene side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateType {
    UnsignedInt32,
    SignedInt32,
    UnsignedInt16,
    SignedInt16,
    Boolean,
}

impl StateType {
    /// Width in bits of the primary remote field
    pub fn bit_width(self) -> u32 {
        match self {
            Self::UnsignedInt32 | Self::SignedInt32 => 32,
            Self::UnsignedInt16 | Self::SignedInt16 => 16,
            Self::Boolean => 1,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Self::SignedInt32 | Self::SignedInt16)
    }
}

impl std::fmt::Display for StateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UnsignedInt32 => "unsigned_int32",
            Self::SignedInt32 => "signed_int32",
            Self::UnsignedInt16 => "unsigned_int16",
            Self::SignedInt16 => "signed_int16",
            Self::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A remote bit-field to declare for a state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDeclaration {
    pub name: String,
    pub bit_width: u32,
    pub initial_value: u32,
}

/// Value of a state after encoding for the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedValue {
    /// Value written to the primary field
    pub value: u32,
    /// Sign bit for signed types (`true` when negative), `None` otherwise
    pub negative: Option<bool>,
}

/// Name of the sign field belonging to a signed state
pub fn sign_field_name(name: &str) -> String {
    format!("{}{}", name, SIGN_SUFFIX)
}

/// Remote fields that have to exist for a state of the given type
pub fn field_declarations(name: &str, state_type: StateType) -> Vec<FieldDeclaration> {
    let mut fields = vec![FieldDeclaration {
        name: name.to_string(),
        bit_width: state_type.bit_width(),
        initial_value: 0,
    }];
    if state_type.is_signed() {
        fields.push(FieldDeclaration {
            name: sign_field_name(name),
            bit_width: 1,
            initial_value: 0,
        });
    }
    fields
}

/// Encode a raw scene value for the given state type
///
/// Unsigned types are passed through unchanged (no clamping); a negative raw
/// value reinterprets its bits, which is the caller's problem.
pub fn encode(state_type: StateType, raw: i32) -> EncodedValue {
    match state_type {
        StateType::Boolean => EncodedValue {
            value: u32::from(raw != 0),
            negative: None,
        },
        StateType::UnsignedInt16 | StateType::UnsignedInt32 => EncodedValue {
            value: raw as u32,
            negative: None,
        },
        StateType::SignedInt16 | StateType::SignedInt32 => EncodedValue {
            value: raw.unsigned_abs(),
            negative: Some(raw < 0),
        },
    }
}

/// Turn a value read back from the remote into an integer
pub fn decode(remote: f64) -> i32 {
    // float-to-int `as` truncates toward zero and saturates
    remote as i32
}
