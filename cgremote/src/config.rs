use crate::error::ConfigurationError;
use crate::error::CoreGraphicsError;
use crate::options::EventFilterMask;
use crate::options::EventSuppressionState;
use crate::options::LocalEventClass;
use crate::server::WindowServer;
use crate::suppression::DEFAULT_SUPPRESSION_INTERVAL;
use crate::suppression::interval_from_secs;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use strum::Display;

pub const CONFIG_FILE_NAME: &str = "cgremote.json";

/// Which window server implementation to talk to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub enum Backend {
    /// CoreGraphics (macOS only)
    Quartz,
    /// In-process model of the window server
    Simulated,
}

impl Default for Backend {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Quartz
        } else {
            Self::Simulated
        }
    }
}

/// Settings applied to a window server connection at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct RemoteOperationConfig {
    /// Window server implementation (default: Quartz on macOS, Simulated elsewhere)
    pub backend: Backend,
    /// Seconds local events stay filtered after a synthetic event is posted (default: 0.25)
    pub suppression_interval: f64,
    /// Local event classes delivered during the suppression interval (default: Keyboard, SystemDefined)
    pub suppression_interval_filter: Vec<LocalEventClass>,
    /// Local event classes delivered during a remote mouse drag (default: Keyboard, SystemDefined)
    pub remote_mouse_drag_filter: Vec<LocalEventClass>,
    /// Combine the state of synthetic events with the state of local hardware (default: true)
    pub event_state_combining: bool,
}

impl Default for RemoteOperationConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            suppression_interval: DEFAULT_SUPPRESSION_INTERVAL.as_secs_f64(),
            suppression_interval_filter: vec![
                LocalEventClass::Keyboard,
                LocalEventClass::SystemDefined,
            ],
            remote_mouse_drag_filter: vec![
                LocalEventClass::Keyboard,
                LocalEventClass::SystemDefined,
            ],
            event_state_combining: true,
        }
    }
}

/// `$CGREMOTE_CONFIG_HOME`, falling back to `~/.config/cgremote`.
pub fn config_home() -> Option<PathBuf> {
    std::env::var_os("CGREMOTE_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config").join("cgremote")))
}

impl RemoteOperationConfig {
    pub fn default_path() -> Option<PathBuf> {
        config_home().map(|home| home.join(CONFIG_FILE_NAME))
    }

    pub fn read(path: &Path) -> Result<Self, ConfigurationError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&raw).map_err(|source| ConfigurationError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Reads the default config file, or returns defaults when there is none.
    pub fn load() -> Result<Self, ConfigurationError> {
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::info!("loading configuration from {}", path.display());
                Self::read(&path)
            }
            _ => {
                tracing::debug!("no configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn filter(&self, state: EventSuppressionState) -> EventFilterMask {
        match state {
            EventSuppressionState::SuppressionInterval => {
                self.suppression_interval_filter.iter().copied().collect()
            }
            EventSuppressionState::RemoteMouseDrag => {
                self.remote_mouse_drag_filter.iter().copied().collect()
            }
        }
    }

    #[tracing::instrument(skip_all, fields(server = server.name()))]
    pub fn apply(&self, server: &dyn WindowServer) -> Result<(), CoreGraphicsError> {
        server.set_event_state_combining(self.event_state_combining)?;
        server.set_local_events_suppression_interval(interval_from_secs(
            self.suppression_interval,
        )?)?;

        for state in [
            EventSuppressionState::SuppressionInterval,
            EventSuppressionState::RemoteMouseDrag,
        ] {
            server.set_local_events_filter_during_suppression_state(self.filter(state), state)?;
        }

        Ok(())
    }

    #[cfg(feature = "schemars")]
    pub fn json_schema() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&schemars::schema_for!(RemoteOperationConfig))
    }
}
