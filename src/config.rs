use serde::{Deserialize, Serialize};
use std::{fs::File, io, io::BufReader, path::Path, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaygroundConfig {
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    #[serde(default = "default_trigger_buffer_size")]
    pub trigger_buffer_size: usize,

    #[serde(default = "default_interrupt_buffer_size")]
    pub interrupt_buffer_size: usize,

    /// Maximum number of REPL output entries kept; `None` keeps everything.
    #[serde(default)]
    pub output_history_limit: Option<usize>,

    #[serde(default = "default_shutdown_timeout", with = "duration_ms")]
    pub shutdown_timeout: Duration,

    #[serde(default)]
    pub interpreter: InterpreterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Upper bound on evaluation steps for a single run; `None` means unbounded.
    #[serde(default)]
    pub max_steps: Option<u64>,

    /// Number of steps between cooperative yields to the scheduler.
    #[serde(default = "default_yield_interval")]
    pub yield_interval: u64,

    /// Deepest nesting of expressions and blocks the parser accepts.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            yield_interval: default_yield_interval(),
            max_depth: default_max_depth(),
        }
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> ConfigResult<T> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> ConfigResult<T> {
    let config = serde_json::from_str(s)?;
    Ok(config)
}

fn default_event_buffer_size() -> usize {
    256
}
fn default_trigger_buffer_size() -> usize {
    32
}
fn default_interrupt_buffer_size() -> usize {
    16
}
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_yield_interval() -> u64 {
    64
}
fn default_max_depth() -> usize {
    128
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
            trigger_buffer_size: default_trigger_buffer_size(),
            interrupt_buffer_size: default_interrupt_buffer_size(),
            output_history_limit: None,
            shutdown_timeout: default_shutdown_timeout(),
            interpreter: InterpreterConfig::default(),
        }
    }
}

impl PlaygroundConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let config: Self = from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(s: &str) -> ConfigResult<Self> {
        let config: Self = from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Channel capacities must be non-zero; tokio panics on zero-sized channels.
    pub fn validate(&self) -> ConfigResult<()> {
        let capacities = [
            ("event_buffer_size", self.event_buffer_size),
            ("trigger_buffer_size", self.trigger_buffer_size),
            ("interrupt_buffer_size", self.interrupt_buffer_size),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        if self.interpreter.yield_interval == 0 {
            return Err(ConfigError::Invalid(
                "interpreter.yield_interval must be greater than 0".to_string(),
            ));
        }
        if self.interpreter.max_depth == 0 {
            return Err(ConfigError::Invalid(
                "interpreter.max_depth must be greater than 0".to_string(),
            ));
        }
        if self.output_history_limit == Some(0) {
            return Err(ConfigError::Invalid(
                "output_history_limit must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}
