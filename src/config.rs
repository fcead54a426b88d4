use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const API_KEY_VAR: &str = "ELEVENLABS_API_KEY";
pub const BASE_URL_VAR: &str = "ELEVENLABS_BASE_URL";
pub const OUTPUT_FORMAT_VAR: &str = "ELEVENLABS_OUTPUT_FORMAT";
pub const TIMEOUT_VAR: &str = "ELEVENLABS_TIMEOUT_SECS";
pub const OUTPUT_DIR_VAR: &str = "SCENARIO_TTS_OUTPUT_DIR";

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_OUTPUT_FORMAT: &str = "mp3_44100_128";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "ELEVENLABS_API_KEY not found in environment variables!\n\n\
         Please create a .env file with:\n\
         ELEVENLABS_API_KEY=your_api_key_here"
    )]
    MissingCredential,
    #[error("invalid {var} value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Runtime settings read from the process environment.
#[derive(Clone)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub output_format: String,
    pub output_dir: PathBuf,
    pub timeout: Duration,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("output_format", &self.output_format)
            .field("output_dir", &self.output_dir)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = get(API_KEY_VAR).ok_or(ConfigError::MissingCredential)?;

        let base_url = match get(BASE_URL_VAR) {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                url.trim_end_matches('/').to_string()
            }
            Some(url) => {
                return Err(ConfigError::Invalid {
                    var: BASE_URL_VAR,
                    value: url,
                    reason: "expected an http:// or https:// URL",
                });
            }
            None => DEFAULT_BASE_URL.to_string(),
        };

        let timeout = match get(TIMEOUT_VAR) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: TIMEOUT_VAR,
                        value: raw,
                        reason: "expected a positive number of seconds",
                    });
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_key,
            base_url,
            output_format: get(OUTPUT_FORMAT_VAR).unwrap_or_else(|| DEFAULT_OUTPUT_FORMAT.into()),
            output_dir: get(OUTPUT_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            timeout,
        })
    }
}
