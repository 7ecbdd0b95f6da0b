pub mod capture;
pub mod error;
pub mod pipeline;
pub mod transport;
pub mod utils;

use std::path::{Path, PathBuf};

use capture::frame::PixelFormat;
use capture::v4l2::MAX_STALL_WARNING_MS;
use serde::{Deserialize, Serialize};

pub use error::{Error, Result};

/// Prefix for environment overrides, e.g. `BOSON_RELAY_TRANSPORT__DRY_RUN=true`.
pub const ENV_PREFIX: &str = "BOSON_RELAY";

/// System configuration, loaded once at startup and passed by reference
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub transport: TransportConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device node path, a bare index (`1` → `/dev/video1`), or empty to
    /// auto-detect a Y16 capable node.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Advertised in the stream header; not enforced on the device.
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
    /// Reject a device that grants a resolution other than the requested one.
    pub strict_format: bool,
    /// Warn when no frame arrives for this long; `0` disables the warning.
    /// At most `MAX_STALL_WARNING_MS`.
    pub stall_warning_ms: u64,
    pub pin_cpu: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub socket_path: PathBuf,
    pub brand: String,
    pub model: String,
    /// Capture without connecting or sending anything.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub timing: bool,
    /// Frames per timing report.
    pub window: u32,
    /// Log the raw pixel range with each timing report.
    pub inspect: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".into(),
            width: 640,
            height: 512,
            fps: 60,
            format: PixelFormat::Y16,
            buffer_count: 2,
            strict_format: false,
            stall_warning_ms: 2000,
            pin_cpu: None,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/lepton-frames"),
            brand: "flir".into(),
            model: "boson".into(),
            dry_run: false,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            timing: false,
            window: 120,
            inspect: false,
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `BOSON_RELAY_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.capture.stall_warning_ms > MAX_STALL_WARNING_MS {
            return Err(config::ConfigError::Message(format!(
                "capture.stall_warning_ms = {} exceeds {}",
                self.capture.stall_warning_ms, MAX_STALL_WARNING_MS
            ))
            .into());
        }
        Ok(())
    }
}
