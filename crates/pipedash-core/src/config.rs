//! Configuration
//!
//! Settings are layered, later sources winning:
//!
//! 1. built-in defaults ([`Settings::default`])
//! 2. a TOML file (`--config`, or `pipedash.toml` in the working directory)
//! 3. environment variables `PIPEDASH__<SECTION>__<KEY>`, e.g.
//!    `PIPEDASH__STREAM__TRANSPORT=poll`
//!
//! The backend URL has its own lookup chain, see [`resolve_backend_url`].
//!
//! ```rust,no_run
//! use pipedash_core::config::{load_environment, Settings};
//!
//! load_environment();
//! let settings = Settings::load(None).expect("valid configuration");
//! println!("{}", settings.backend_url());
//! ```

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Backend used when nothing else is configured
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Environment variables consulted for the backend URL, in order
pub const BACKEND_URL_VARS: &[&str] = &["PIPEDASH_BACKEND_URL", "NEXT_PUBLIC_BACKEND_URL"];

/// Environment files loaded by [`load_environment`], in order of priority
pub const ENV_FILE_PATHS: &[&str] = &["/etc/pipedash/environment", ".env"];

/// Load `KEY=VALUE` files into the process environment.
///
/// `PIPEDASH_ENV_FILE` overrides the search list. Variables that are
/// already set are left alone. Returns the file that was loaded.
pub fn load_environment() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = match std::env::var("PIPEDASH_ENV_FILE") {
        Ok(custom) => vec![PathBuf::from(custom)],
        Err(_) => ENV_FILE_PATHS.iter().map(PathBuf::from).collect(),
    };

    for path in candidates {
        if !path.exists() {
            continue;
        }
        match dotenvy::from_path(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Loaded environment file");
                return Some(path);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to read environment file"),
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

/// Resolve the backend base URL: explicit value, then the environment,
/// then [`DEFAULT_BACKEND_URL`]. Trailing slashes are dropped.
pub fn resolve_backend_url(configured: Option<&str>) -> String {
    resolve_backend_url_with(configured, |key| std::env::var(key).ok())
}

fn resolve_backend_url_with(
    configured: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    configured
        .map(str::to_string)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            BACKEND_URL_VARS
                .iter()
                .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
        })
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
        .trim()
        .trim_end_matches('/')
        .to_string()
}

/// Which live source follows a started run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Server-Sent Events on `/api/stream`
    #[default]
    Stream,
    /// Periodic `GET /api/status`
    Poll,
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stream" | "sse" => Ok(Transport::Stream),
            "poll" | "polling" => Ok(Transport::Poll),
            other => Err(format!("Unknown transport: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Base URL; `None` defers to the environment
    pub url: Option<String>,
    pub health_timeout_ms: u64,
    pub submit_timeout_ms: u64,
    /// Timeout for status and results requests
    pub request_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: None,
            health_timeout_ms: 3_000,
            submit_timeout_ms: 10_000,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Probe interval while no live run is streaming
    pub interval_ms: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self { interval_ms: 15_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub transport: Transport,
    /// Attempt `n` waits `reconnect_base_ms * n`
    pub reconnect_base_ms: u64,
    pub max_reconnect_attempts: u32,
    pub poll_interval_ms: u64,
    pub first_poll_delay_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            transport: Transport::Stream,
            reconnect_base_ms: 2_000,
            max_reconnect_attempts: 3,
            poll_interval_ms: 2_000,
            first_poll_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Skip the backend entirely
    pub force: bool,
    /// Delay between the warm-up snapshot and the first stage
    pub warmup_ms: u64,
    /// Multiplier applied to warm-up and stage dwell times
    pub time_scale: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            force: false,
            warmup_ms: 1_000,
            time_scale: 1.0,
        }
    }
}

impl SimulationSettings {
    /// Scale a nominal duration by `time_scale`
    pub fn scaled(&self, nominal: Duration) -> Duration {
        if self.time_scale.is_finite() && self.time_scale >= 0.0 {
            nominal.mul_f64(self.time_scale)
        } else {
            nominal
        }
    }

    pub fn warmup(&self) -> Duration {
        self.scaled(Duration::from_millis(self.warmup_ms))
    }
}

/// All pipedash settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSettings,
    pub health: HealthSettings,
    pub stream: StreamSettings,
    pub simulation: SimulationSettings,
}

impl Settings {
    /// Load layered settings. An explicit `path` must exist; the implicit
    /// `pipedash.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("pipedash").required(false)),
        };

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("PIPEDASH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        debug!(?settings, "Loaded settings");
        Ok(settings)
    }

    pub fn backend_url(&self) -> String {
        resolve_backend_url(self.backend.url.as_deref())
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.health_timeout_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.submit_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.request_timeout_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health.interval_ms.max(1))
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.stream.reconnect_base_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.stream.poll_interval_ms)
    }

    pub fn first_poll_delay(&self) -> Duration {
        Duration::from_millis(self.stream.first_poll_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.health_timeout(), Duration::from_secs(3));
        assert_eq!(settings.submit_timeout(), Duration::from_secs(10));
        assert_eq!(settings.health_interval(), Duration::from_secs(15));
        assert_eq!(settings.reconnect_base(), Duration::from_secs(2));
        assert_eq!(settings.stream.max_reconnect_attempts, 3);
        assert_eq!(settings.stream.transport, Transport::Stream);
        assert!(!settings.simulation.force);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[backend]
url = "http://analysis.internal:9000/"
health_timeout_ms = 500

[stream]
transport = "poll"
max_reconnect_attempts = 5

[simulation]
time_scale = 0.5
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.backend_url(), "http://analysis.internal:9000");
        assert_eq!(settings.health_timeout(), Duration::from_millis(500));
        assert_eq!(settings.stream.transport, Transport::Poll);
        assert_eq!(settings.stream.max_reconnect_attempts, 5);
        // untouched keys keep their defaults
        assert_eq!(settings.backend.submit_timeout_ms, 10_000);
        assert_eq!(
            settings.simulation.warmup(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_backend_url_lookup_chain() {
        let none = |_: &str| None;
        assert_eq!(resolve_backend_url_with(None, none), DEFAULT_BACKEND_URL);

        let env = |key: &str| match key {
            "NEXT_PUBLIC_BACKEND_URL" => Some("http://10.0.0.5:8000/".to_string()),
            _ => None,
        };
        assert_eq!(resolve_backend_url_with(None, env), "http://10.0.0.5:8000");
        assert_eq!(
            resolve_backend_url_with(Some("http://explicit:1"), env),
            "http://explicit:1"
        );
        assert_eq!(resolve_backend_url_with(Some("  "), none), DEFAULT_BACKEND_URL);
    }

    #[test]
    fn test_transport_from_str() {
        assert_eq!("SSE".parse::<Transport>(), Ok(Transport::Stream));
        assert_eq!("poll".parse::<Transport>(), Ok(Transport::Poll));
        assert!("carrier-pigeon".parse::<Transport>().is_err());
    }

    #[test]
    fn test_time_scale_guards_against_nonsense() {
        let mut sim = SimulationSettings::default();
        sim.time_scale = f64::NAN;
        assert_eq!(sim.scaled(Duration::from_secs(2)), Duration::from_secs(2));
        sim.time_scale = 0.0;
        assert_eq!(sim.scaled(Duration::from_secs(2)), Duration::ZERO);
    }
}
