//! Configuration loading and validation

use anyhow::Result;
use bcilink_core::{
    ModuleLaunch, ModuleSet, ObjectStates, ParameterSet, SessionConfig, StateType,
    VariableDescriptor, VariableKind,
};
use bcilink_operator::{
    OperatorSettings, DEFAULT_STARTUP_TIMEOUT_MS, DEFAULT_TELNET_IP, DEFAULT_TELNET_PORT,
    DEFAULT_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default, rename = "parameter_set")]
    pub parameter_sets: Vec<ParameterSetConfig>,
    #[serde(default, rename = "object")]
    pub objects: Vec<ObjectConfig>,
    #[serde(default)]
    pub custom: Vec<CustomConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Explicit operator executable; searched for when absent or missing
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Directory searched recursively for the operator
    #[serde(default = "default_search_dir")]
    pub search_dir: PathBuf,
    /// File name suffix of the operator executable
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default = "default_telnet_ip")]
    pub telnet_ip: String,
    #[serde(default = "default_telnet_port")]
    pub telnet_port: u16,
    /// Transcript of operator traffic
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub log_states: bool,
    #[serde(default)]
    pub log_prompts: bool,
    #[serde(default = "default_true")]
    pub window_visible: bool,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_ms: u64,
    /// Commands run right after connecting
    #[serde(default)]
    pub init_commands: Vec<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            path: None,
            search_dir: default_search_dir(),
            executable: default_executable(),
            telnet_ip: default_telnet_ip(),
            telnet_port: default_telnet_port(),
            log_file: None,
            log_states: false,
            log_prompts: false,
            window_visible: true,
            timeout_ms: default_timeout(),
            startup_timeout_ms: default_startup_timeout(),
            init_commands: Vec::new(),
        }
    }
}

fn default_search_dir() -> PathBuf {
    PathBuf::from("./StreamingAssets")
}

fn default_executable() -> String {
    bcilink_core::discovery::DEFAULT_OPERATOR_EXECUTABLE.to_string()
}

fn default_telnet_ip() -> String {
    DEFAULT_TELNET_IP.to_string()
}

fn default_telnet_port() -> u16 {
    DEFAULT_TELNET_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_startup_timeout() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Skip module startup, e.g. when modules are launched by hand
    #[serde(default)]
    pub dont_start_modules: bool,
    #[serde(default = "default_source")]
    pub source: ModuleConfig,
    #[serde(default = "default_processing")]
    pub processing: ModuleConfig,
    #[serde(default = "default_application")]
    pub application: ModuleConfig,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            dont_start_modules: false,
            source: default_source(),
            processing: default_processing(),
            application: default_application(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ModuleConfig {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    fn to_launch(&self) -> ModuleLaunch {
        ModuleLaunch::new(self.name.clone(), self.args.clone())
    }
}

fn default_source() -> ModuleConfig {
    ModuleConfig::named("SignalGenerator")
}

fn default_processing() -> ModuleConfig {
    ModuleConfig::named("DummySignalProcessing")
}

fn default_application() -> ModuleConfig {
    ModuleConfig::named("DummyApplication")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Parameter file loaded by the operator before states are added
    #[serde(default)]
    pub parameters_path: Option<PathBuf>,
    /// Configure everything but leave the run stopped
    #[serde(default)]
    pub dont_start_run: bool,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Commands run once the run has started
    #[serde(default)]
    pub post_start_commands: Vec<String>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            parameters_path: None,
            dont_start_run: false,
            tick_interval_ms: default_tick_interval(),
            post_start_commands: Vec::new(),
        }
    }
}

fn default_tick_interval() -> u64 {
    20 // 50 Hz, a typical frame rate
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSetConfig {
    #[serde(default = "default_section")]
    pub section: String,
    #[serde(default, rename = "parameter")]
    pub parameters: Vec<ParameterConfig>,
}

fn default_section() -> String {
    bcilink_core::parameter::DEFAULT_SECTION.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    #[serde(default)]
    pub subsection: String,
    pub name: String,
    pub value: f32,
    pub low: f32,
    pub high: f32,
}

/// A simulated scene object circling the origin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub name: String,
    /// Orbit radius in metres
    #[serde(default = "default_radius")]
    pub radius: f32,
    /// Time for one orbit
    #[serde(default = "default_period")]
    pub period_secs: f32,
    /// Per-state scales; a state is sent only when its scale is set
    #[serde(default)]
    pub global_x: Option<i32>,
    #[serde(default)]
    pub global_y: Option<i32>,
    #[serde(default)]
    pub global_z: Option<i32>,
    #[serde(default)]
    pub screen_x: Option<i32>,
    #[serde(default)]
    pub screen_y: Option<i32>,
    #[serde(default)]
    pub screen_z: Option<i32>,
    #[serde(default)]
    pub speed: Option<i32>,
    #[serde(default)]
    pub on_screen: bool,
}

fn default_radius() -> f32 {
    1.0
}

fn default_period() -> f32 {
    4.0
}

impl ObjectConfig {
    pub fn to_states(&self) -> ObjectStates {
        ObjectStates {
            global_x: self.global_x,
            global_y: self.global_y,
            global_z: self.global_z,
            screen_x: self.screen_x,
            screen_y: self.screen_y,
            screen_z: self.screen_z,
            on_screen: self.on_screen,
            speed: self.speed,
        }
    }
}

/// Custom variable attached to an object's sender
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomConfig {
    pub name: String,
    pub kind: VariableKind,
    #[serde(rename = "type", default = "default_state_type")]
    pub state_type: StateType,
    #[serde(default = "default_scale")]
    pub scale: i32,
    pub recipient: String,
    /// Object whose name prefixes send variables
    pub object: String,
}

fn default_state_type() -> StateType {
    StateType::UnsignedInt32
}

fn default_scale() -> i32 {
    1
}

impl CustomConfig {
    pub fn to_descriptor(&self) -> VariableDescriptor {
        VariableDescriptor {
            name: self.name.clone(),
            kind: self.kind,
            state_type: self.state_type,
            scale: self.scale,
            recipient: self.recipient.clone(),
        }
    }
}

impl Config {
    /// Convert to the core session configuration
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            operator_path: self.operator.path.clone(),
            operator_search_dir: self.operator.search_dir.clone(),
            operator_executable: self.operator.executable.clone(),
            init_commands: self.operator.init_commands.clone(),
            modules: ModuleSet {
                signal_source: self.modules.source.to_launch(),
                signal_processing: self.modules.processing.to_launch(),
                application: self.modules.application.to_launch(),
            },
            start_modules: !self.modules.dont_start_modules,
            parameters_path: self.session.parameters_path.clone(),
            start_run: !self.session.dont_start_run,
        }
    }

    /// Convert to operator connection settings
    pub fn to_operator_settings(&self) -> OperatorSettings {
        OperatorSettings {
            telnet_ip: self.operator.telnet_ip.clone(),
            telnet_port: self.operator.telnet_port,
            window_visible: self.operator.window_visible,
            timeout_ms: self.operator.timeout_ms,
            startup_timeout_ms: self.operator.startup_timeout_ms,
            log_file: self.operator.log_file.clone(),
            log_states: self.operator.log_states,
            log_prompts: self.operator.log_prompts,
        }
    }

    pub fn to_parameter_sets(&self) -> Vec<ParameterSet> {
        self.parameter_sets
            .iter()
            .map(|set| {
                let mut parameters = ParameterSet::new(set.section.clone());
                for p in &set.parameters {
                    parameters.declare(&p.subsection, &p.name, p.value, p.low, p.high);
                }
                parameters
            })
            .collect()
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save an example configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        parameter_sets: vec![ParameterSetConfig {
            section: default_section(),
            parameters: vec![ParameterConfig {
                subsection: "Game".to_string(),
                name: "OrbitSpeed".to_string(),
                value: 1.0,
                low: 0.0,
                high: 10.0,
            }],
        }],
        objects: vec![ObjectConfig {
            name: "Cube".to_string(),
            radius: default_radius(),
            period_secs: default_period(),
            global_x: Some(bcilink_core::sender::DEFAULT_GLOBAL_SCALE),
            global_y: None,
            global_z: Some(bcilink_core::sender::DEFAULT_GLOBAL_SCALE),
            screen_x: Some(bcilink_core::sender::DEFAULT_SCREEN_SCALE),
            screen_y: None,
            screen_z: None,
            speed: Some(bcilink_core::sender::DEFAULT_SPEED_SCALE),
            on_screen: true,
        }],
        custom: vec![CustomConfig {
            name: "Feedback".to_string(),
            kind: VariableKind::Get,
            state_type: default_state_type(),
            scale: 1,
            recipient: "log".to_string(),
            object: "Cube".to_string(),
        }],
        ..Config::default()
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(&temp_dir.path().join("bcilink.toml")).unwrap();

        assert_eq!(config.operator.telnet_port, 3999);
        assert_eq!(config.operator.search_dir, PathBuf::from("./StreamingAssets"));
        assert!(config.objects.is_empty());

        let session = config.to_session_config();
        assert!(session.start_modules);
        assert!(session.start_run);
        assert_eq!(session.modules.signal_source.name, "SignalGenerator");
    }

    #[test]
    fn test_parse_sections() {
        let content = r#"
[operator]
telnet_port = 4000
window_visible = false
init_commands = ["Set parameter SamplingRate 512Hz"]

[modules]
dont_start_modules = true

[modules.application]
name = "CursorTask"
args = ["Debug=1"]

[session]
parameters_path = "../parms/Unity.prm"
dont_start_run = true

[[parameter_set]]
section = "Game"

[[parameter_set.parameter]]
subsection = "Speed"
name = "BallSpeed"
value = 2.0
low = 0.0
high = 5.0

[[object]]
name = "Ball"
global_x = 1000
on_screen = true

[[custom]]
name = "Score"
kind = "send"
type = "signed_int32"
recipient = "clock"
object = "Ball"
"#;
        let config: Config = toml::from_str(content).unwrap();

        let settings = config.to_operator_settings();
        assert_eq!(settings.telnet_port, 4000);
        assert!(!settings.window_visible);

        let session = config.to_session_config();
        assert!(!session.start_modules);
        assert!(!session.start_run);
        assert_eq!(session.modules.application.name, "CursorTask");
        assert_eq!(session.modules.application.args, Some(vec!["Debug=1".to_string()]));
        assert_eq!(session.modules.signal_source.args, None);
        assert_eq!(
            session.parameters_path,
            Some(PathBuf::from("../parms/Unity.prm"))
        );

        let sets = config.to_parameter_sets();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].section(), "Game");
        assert_eq!(sets[0].get("BallSpeed").unwrap(), 2.0);

        let states = config.objects[0].to_states();
        assert_eq!(states.global_x, Some(1000));
        assert_eq!(states.global_y, None);
        assert!(states.on_screen);

        let descriptor = config.custom[0].to_descriptor();
        assert_eq!(descriptor.state_type, StateType::SignedInt32);
        assert_eq!(descriptor.scale, 1);
    }

    #[test]
    fn test_default_config_is_loadable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bcilink.toml");
        save_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.objects.len(), 1);
        assert_eq!(config.objects[0].name, "Cube");
        assert_eq!(config.custom[0].kind, VariableKind::Get);
        assert_eq!(config.parameter_sets[0].parameters[0].name, "OrbitSpeed");
    }
}
