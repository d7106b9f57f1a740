use std::env;
use thiserror::Error;

use crate::quality::VALID_BITRATES;

/// Default proxy listening port, consumed by the embedding runtime.
pub const DEFAULT_PORT: u16 = 3412;

/// A rejected configuration value.
///
/// All variants are fatal: the startup boundary reports the message to the
/// operator and exits before the proxy starts listening.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid PORT value '{0}': expected a TCP port number")]
    InvalidPort(String),

    #[error("invalid {var} value '{value}': expected one of 96000, 128000, 192000, 320000")]
    InvalidBitrate { var: &'static str, value: String },

    #[error("invalid {var} value '{value}': expected 'true' or 'false'")]
    InvalidFlag { var: &'static str, value: String },
}

/// Filter configuration, loaded once at startup from environment variables.
///
/// The core never mutates this; forced bitrates and the overseas flag feed
/// the negotiator and resolver, while `port` and `verbose` are consumed by
/// the embedding binary (listen address and log filter level respectively).
#[derive(Clone, Debug)]
pub struct Config {
    /// Listening port for the intercepting proxy (default 3412).
    pub port: u16,
    /// Use the alternate CDN host prefix for clients outside the origin region.
    pub overseas: bool,
    /// Ask the embedder for per-exchange log output.
    pub verbose: bool,
    /// Pin the playback bitrate, ignoring whatever the server advertises.
    pub forced_playback_bitrate: Option<u32>,
    /// Pin the download bitrate, ignoring whatever the server advertises.
    pub forced_download_bitrate: Option<u32>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to defaults; set-but-invalid variables are
    /// an error, never silently defaulted.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for a malformed port, a forced bitrate outside
    /// the closed set {96000, 128000, 192000, 320000}, or a flag that is not
    /// `true`/`false`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            Err(_) => DEFAULT_PORT,
        };

        let overseas = parse_flag("OVERSEAS")?;
        let verbose = parse_flag("VERBOSE")?;

        let forced_playback_bitrate = parse_forced_bitrate("FORCE_PLAYBACK_BITRATE")?;
        let forced_download_bitrate = parse_forced_bitrate("FORCE_DOWNLOAD_BITRATE")?;

        Ok(Config {
            port,
            overseas,
            verbose,
            forced_playback_bitrate,
            forced_download_bitrate,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            overseas: false,
            verbose: false,
            forced_playback_bitrate: None,
            forced_download_bitrate: None,
        }
    }
}

/// Parse a boolean env var; unset or empty means `false`.
fn parse_flag(var: &'static str) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(raw) if raw.is_empty() => Ok(false),
        Ok(raw) => match raw.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { var, value: raw }),
        },
        Err(_) => Ok(false),
    }
}

/// Parse a forced-bitrate env var; unset or empty means no override.
fn parse_forced_bitrate(var: &'static str) -> Result<Option<u32>, ConfigError> {
    let raw = match env::var(var) {
        Ok(raw) if !raw.is_empty() => raw,
        _ => return Ok(None),
    };

    let bitrate: u32 = raw.parse().map_err(|_| ConfigError::InvalidBitrate {
        var,
        value: raw.clone(),
    })?;

    if !VALID_BITRATES.contains(&bitrate) {
        return Err(ConfigError::InvalidBitrate { var, value: raw });
    }

    Ok(Some(bitrate))
}
