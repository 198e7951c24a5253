//! Environment-driven server configuration

use crate::realtime::{azure, AzureConfig, GeminiConfig};
use crate::timer::DEFAULT_WARNING_THRESHOLD;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";
pub const DEFAULT_BREAK_ENDING_BUFFER_SECONDS: u64 = 120;

/// Which realtime voice provider a run connects to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Gemini,
    Azure,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "azure" => Ok(Self::Azure),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gemini => "gemini",
            Self::Azure => "azure",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    /// Fraction of a session after which the speaker is warned, in (0, 1]
    pub time_warning_threshold: f64,
    /// Breaks longer than this get their "ending soon" call this many seconds early
    pub break_ending_buffer_seconds: u64,
    pub provider: ProviderKind,
    /// Agenda preloaded into every conference run
    pub agenda_file: Option<PathBuf>,
    pub gemini: GeminiConfig,
    pub azure: AzureConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset and blank values take defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let threshold: f64 = parsed(&get, "MAISTRO_TIME_WARNING_THRESHOLD", DEFAULT_WARNING_THRESHOLD);
        let time_warning_threshold = if threshold > 0.0 && threshold <= 1.0 {
            threshold
        } else {
            tracing::warn!(value = threshold, "MAISTRO_TIME_WARNING_THRESHOLD outside (0, 1], using default");
            DEFAULT_WARNING_THRESHOLD
        };

        let mut gemini = GeminiConfig::new(get("GEMINI_API_KEY").unwrap_or_default());
        if let Some(model) = get("GEMINI_MODEL") {
            gemini.model = model;
        }
        if let Some(voice) = get("GEMINI_VOICE") {
            gemini.voice = voice;
        }

        let mut azure = AzureConfig::new(
            get("AZURE_OPENAI_API_KEY").unwrap_or_default(),
            get("AZURE_OPENAI_ENDPOINT").unwrap_or_default(),
            get("AZURE_OPENAI_DEPLOYMENT").unwrap_or_default(),
        );
        azure.api_version =
            get("AZURE_OPENAI_API_VERSION").unwrap_or_else(|| azure::DEFAULT_API_VERSION.to_string());
        azure.session_renewal_seconds = parsed(
            &get,
            "MAISTRO_SESSION_RENEWAL_SECONDS",
            azure::DEFAULT_RENEWAL_SECONDS,
        );

        Self {
            host: get("MAISTRO_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parsed(&get, "MAISTRO_PORT", DEFAULT_PORT),
            allowed_origins: get("MAISTRO_ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect(),
            time_warning_threshold,
            break_ending_buffer_seconds: parsed(
                &get,
                "MAISTRO_BREAK_ENDING_BUFFER_SECONDS",
                DEFAULT_BREAK_ENDING_BUFFER_SECONDS,
            ),
            provider: parsed(&get, "MAISTRO_PROVIDER", ProviderKind::default()),
            agenda_file: get("MAISTRO_AGENDA_FILE").map(PathBuf::from),
            gemini,
            azure,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Model name reported to clients for the selected provider
    pub fn provider_model(&self) -> &str {
        match self.provider {
            ProviderKind::Gemini => &self.gemini.model,
            ProviderKind::Azure => &self.azure.deployment,
        }
    }
}

fn parsed<T, F>(get: &F, key: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Invalid configuration value, using default");
            default
        }),
    }
}
