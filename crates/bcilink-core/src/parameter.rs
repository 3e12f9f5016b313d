//! Float parameter registry
//!
//! Parameters are declared locally, announced to the operator with one
//! `ADD PARAMETER` line each, and then synchronized explicitly: `set` and
//! `get` only touch the local cache, `save` pushes it and `load` pulls it.

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::remote::{Remote, RemoteError};

/// Characters stripped from operator responses before parsing
const TRIM_CHARS: &[char] = &['\r', '\n', ' ', '>'];

/// Default configuration tab for scene parameters
pub const DEFAULT_SECTION: &str = "Unity";

#[derive(Error, Debug)]
pub enum ParameterError {
    #[error("This parameter does not exist. ({0})")]
    NotFound(String),
    #[error("String for the parameter <{name}> was: {raw:?}")]
    Parse { name: String, raw: String },
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// A float parameter shown in one configuration section
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    /// Optional sub-tab; empty for none
    pub subsection: String,
    pub value: f32,
    pub low_range: f32,
    pub high_range: f32,
}

impl Parameter {
    pub fn new(
        subsection: impl Into<String>,
        name: impl Into<String>,
        value: f32,
        low_range: f32,
        high_range: f32,
    ) -> Self {
        Self {
            name: name.into(),
            subsection: subsection.into(),
            value,
            low_range,
            high_range,
        }
    }

    /// The `ADD PARAMETER` line announcing this parameter in `section`
    pub fn add_directive(&self, section: &str) -> String {
        let mut line = format!("ADD PARAMETER {}", section);
        if !self.subsection.is_empty() {
            line.push(':');
            line.push_str(&self.subsection);
        }
        line.push_str(&format!(
            " float {}= {} {} {} {}",
            self.name, self.value, self.value, self.low_range, self.high_range
        ));
        line
    }
}

/// Parameters of one configuration section, in declaration order
#[derive(Debug, Clone)]
pub struct ParameterSet {
    section: String,
    parameters: Vec<Parameter>,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::new(DEFAULT_SECTION)
    }
}

impl ParameterSet {
    pub fn new(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            parameters: Vec::new(),
        }
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    /// Declare a parameter, replacing any earlier one with the same name
    pub fn declare(
        &mut self,
        subsection: &str,
        name: &str,
        value: f32,
        low_range: f32,
        high_range: f32,
    ) {
        let parameter = Parameter::new(subsection, name, value, low_range, high_range);
        match self.position(name) {
            Some(index) => {
                debug!(parameter = %name, "Replacing parameter declaration");
                self.parameters[index] = parameter;
            }
            None => self.parameters.push(parameter),
        }
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// Cached value; use `load` to sync with the operator first
    pub fn get(&self, name: &str) -> Result<f32, ParameterError> {
        self.find(name).map(|p| p.value)
    }

    /// Update the cached value; use `save` to push it
    pub fn set(&mut self, name: &str, value: f32) -> Result<(), ParameterError> {
        self.find_mut(name)?.value = value;
        Ok(())
    }

    /// Push one cached value, or all of them when `name` is `None`
    pub fn save(&self, remote: &mut dyn Remote, name: Option<&str>) -> Result<(), ParameterError> {
        match name {
            Some(name) => {
                let parameter = self.find(name)?;
                remote.set_parameter(&parameter.name, &parameter.value.to_string())?;
            }
            None => {
                for parameter in &self.parameters {
                    remote.set_parameter(&parameter.name, &parameter.value.to_string())?;
                }
            }
        }
        Ok(())
    }

    /// Pull one value, or all of them when `name` is `None`
    ///
    /// Returns the number of cached values updated. Unparseable responses
    /// are logged and leave the cached value alone. When loading all
    /// parameters a remote failure on one name does not stop the others.
    pub fn load(&mut self, remote: &mut dyn Remote, name: Option<&str>) -> Result<usize, ParameterError> {
        match name {
            Some(name) => {
                let index = self
                    .position(name)
                    .ok_or_else(|| ParameterError::NotFound(name.to_string()))?;
                Ok(usize::from(self.load_at(remote, index)?))
            }
            None => {
                let mut updated = 0;
                for index in 0..self.parameters.len() {
                    match self.load_at(remote, index) {
                        Ok(true) => updated += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(
                                parameter = %self.parameters[index].name,
                                error = %e,
                                "Failed to load parameter"
                            );
                        }
                    }
                }
                Ok(updated)
            }
        }
    }

    /// One `ADD PARAMETER` line per declared parameter, in declaration order
    pub fn add_directives(&self) -> Vec<String> {
        self.parameters
            .iter()
            .map(|p| p.add_directive(&self.section))
            .collect()
    }

    fn load_at(&mut self, remote: &mut dyn Remote, index: usize) -> Result<bool, RemoteError> {
        let parameter = &mut self.parameters[index];
        let raw = remote.get_parameter(&parameter.name)?;
        match parse_f32(&raw) {
            Some(value) => {
                parameter.value = value;
                Ok(true)
            }
            None => {
                error!(parameter = %parameter.name, raw = %raw, "Failed to parse parameter value");
                Ok(false)
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    fn find(&self, name: &str) -> Result<&Parameter, ParameterError> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ParameterError::NotFound(name.to_string()))
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut Parameter, ParameterError> {
        self.parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| ParameterError::NotFound(name.to_string()))
    }
}

/// Raw string value of any operator parameter
pub fn get_string(remote: &mut dyn Remote, name: &str) -> Result<String, ParameterError> {
    let raw = remote.get_parameter(name)?;
    Ok(raw.trim_matches(TRIM_CHARS).to_string())
}

pub fn set_string(remote: &mut dyn Remote, name: &str, value: &str) -> Result<(), ParameterError> {
    remote.set_parameter(name, value)?;
    Ok(())
}

/// Integer value of any operator parameter
pub fn get_int(remote: &mut dyn Remote, name: &str) -> Result<i32, ParameterError> {
    let raw = remote.get_parameter(name)?;
    let parsed = raw.trim_matches(TRIM_CHARS).parse::<i32>();
    parsed.map_err(|_| ParameterError::Parse {
        name: name.to_string(),
        raw,
    })
}

pub fn set_int(remote: &mut dyn Remote, name: &str, value: i32) -> Result<(), ParameterError> {
    remote.set_parameter(name, &value.to_string())?;
    Ok(())
}

// str::parse is locale independent, only the prompt residue needs stripping
fn parse_f32(raw: &str) -> Option<f32> {
    raw.trim_matches(TRIM_CHARS).parse::<f32>().ok()
}
