//! Runtime configuration
//!
//! Durations are written as humantime strings (`"2s"`, `"500ms"`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tracksim_core::{TrackError, TrackResult};
use tracksim_visual::{Color, ViewConfig, DEFAULT_MESH_COLOR, SUBJECT_COLOR};

use crate::LogConfig;

/// Positions server endpoints and command limits
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    /// Port of the pose broadcast channel
    pub pub_port: u16,
    /// Port of the command channel
    pub cmd_port: u16,
    #[serde(with = "duration_str")]
    pub connect_timeout: Duration,
    /// How long a record command may wait for its ack
    #[serde(with = "duration_str")]
    pub command_timeout: Duration,
    /// Inbound broadcast buffer (messages)
    pub receive_buffer: usize,
    /// Pending record commands before callers wait
    pub command_queue: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            pub_port: 18950,
            cmd_port: 18951,
            connect_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(5),
            receive_buffer: 1024,
            command_queue: 64,
        }
    }
}

impl ClientConfig {
    pub fn pub_addr(&self) -> String {
        format!("{}:{}", self.host, self.pub_port)
    }

    pub fn cmd_addr(&self) -> String {
        format!("{}:{}", self.host, self.cmd_port)
    }
}

/// Everything a tool panel needs to start
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub client: ClientConfig,
    pub reset_camera_on_new_actor: bool,
    /// `#rrggbb`
    pub default_mesh_color: String,
    /// `#rrggbb`
    pub subject_color: String,
    pub subject_opacity: f32,
    /// Where remembered poses live; `None` keeps them in memory only
    pub memory_path: Option<PathBuf>,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            client: ClientConfig::default(),
            reset_camera_on_new_actor: false,
            default_mesh_color: DEFAULT_MESH_COLOR.to_hex(),
            subject_color: SUBJECT_COLOR.to_hex(),
            subject_opacity: 0.8,
            memory_path: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl PanelConfig {
    pub fn from_json_str(json: &str) -> TrackResult<Self> {
        serde_json::from_str(json).map_err(|e| TrackError::Config(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> TrackResult<Self> {
        let path = path.as_ref();
        tracing::info!("Loading configuration from {:?}", path);
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn view_config(&self) -> TrackResult<ViewConfig> {
        if !(0.0..=1.0).contains(&self.subject_opacity) {
            return Err(TrackError::Config(format!(
                "subject_opacity must be within [0, 1], got {}",
                self.subject_opacity
            )));
        }
        Ok(ViewConfig {
            reset_camera_on_new_actor: self.reset_camera_on_new_actor,
            default_mesh_color: parse_color("default_mesh_color", &self.default_mesh_color)?,
            subject_color: parse_color("subject_color", &self.subject_color)?,
            subject_opacity: self.subject_opacity,
        })
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            json: self.log_json,
        }
    }
}

fn parse_color(field: &str, value: &str) -> TrackResult<Color> {
    Color::from_hex(value)
        .ok_or_else(|| TrackError::Config(format!("{} is not a #rrggbb color: {:?}", field, value)))
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
