//! foldergrid.toml configuration parser.
//!
//! Every section and field is optional; the `*_settings()` accessors resolve
//! them against built-in defaults into the typed settings the other crates
//! consume.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoldergridConfig {
    pub scanner: Option<ScannerConfig>,
    pub detector: Option<DetectorConfig>,
    pub engine: Option<EngineConfig>,
    pub health: Option<HealthConfig>,
    pub store: Option<StoreConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub max_depth: Option<usize>,
    pub sniff_bytes: Option<usize>,
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub acceptance_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub build_timeout: Option<String>,
    pub run_timeout: Option<String>,
    pub stop_grace: Option<String>,
    pub inspect_timeout: Option<String>,
    pub scale_timeout: Option<String>,
    pub retry_attempts: Option<u32>,
    pub retry_backoff: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthConfig {
    pub interval: Option<String>,
    pub check_timeout: Option<String>,
    pub unhealthy_threshold: Option<u32>,
    pub unreachable_threshold: Option<u32>,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

/// Resolved folder-scanner limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerSettings {
    pub max_depth: usize,
    pub sniff_bytes: usize,
    pub max_entries: usize,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            max_depth: 3,
            sniff_bytes: 16 * 1024,
            max_entries: 5_000,
        }
    }
}

/// Resolved timeouts and retry policy for container engine calls.
#[derive(Debug, Clone, PartialEq)]
pub struct EnginePolicy {
    pub build_timeout: Duration,
    pub run_timeout: Duration,
    pub stop_grace: Duration,
    pub inspect_timeout: Duration,
    pub scale_timeout: Duration,
    /// Retries of a transient or unreachable-engine error after the first try.
    pub retry_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff: Duration,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            build_timeout: Duration::from_secs(120),
            run_timeout: Duration::from_secs(30),
            stop_grace: Duration::from_secs(10),
            inspect_timeout: Duration::from_secs(5),
            scale_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Resolved health-check scheduling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSettings {
    pub interval: Duration,
    pub check_timeout: Duration,
    pub unhealthy_threshold: u32,
    pub unreachable_threshold: u32,
    pub workers: usize,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(5),
            unhealthy_threshold: 3,
            unreachable_threshold: 3,
            workers: 8,
        }
    }
}

pub const DEFAULT_ACCEPTANCE_THRESHOLD: f64 = 0.5;

impl FoldergridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FoldergridConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn scanner_settings(&self) -> ScannerSettings {
        let defaults = ScannerSettings::default();
        let Some(cfg) = &self.scanner else {
            return defaults;
        };
        ScannerSettings {
            max_depth: cfg.max_depth.unwrap_or(defaults.max_depth),
            sniff_bytes: cfg.sniff_bytes.unwrap_or(defaults.sniff_bytes),
            max_entries: cfg.max_entries.unwrap_or(defaults.max_entries),
        }
    }

    pub fn acceptance_threshold(&self) -> f64 {
        self.detector
            .as_ref()
            .and_then(|d| d.acceptance_threshold)
            .filter(|t| (0.0..1.0).contains(t))
            .unwrap_or(DEFAULT_ACCEPTANCE_THRESHOLD)
    }

    pub fn engine_policy(&self) -> EnginePolicy {
        let defaults = EnginePolicy::default();
        let Some(cfg) = &self.engine else {
            return defaults;
        };
        EnginePolicy {
            build_timeout: duration_or("build_timeout", &cfg.build_timeout, defaults.build_timeout),
            run_timeout: duration_or("run_timeout", &cfg.run_timeout, defaults.run_timeout),
            stop_grace: duration_or("stop_grace", &cfg.stop_grace, defaults.stop_grace),
            inspect_timeout: duration_or("inspect_timeout", &cfg.inspect_timeout, defaults.inspect_timeout),
            scale_timeout: duration_or("scale_timeout", &cfg.scale_timeout, defaults.scale_timeout),
            retry_attempts: cfg.retry_attempts.unwrap_or(defaults.retry_attempts),
            retry_backoff: duration_or("retry_backoff", &cfg.retry_backoff, defaults.retry_backoff),
        }
    }

    pub fn health_settings(&self) -> HealthSettings {
        let defaults = HealthSettings::default();
        let Some(cfg) = &self.health else {
            return defaults;
        };
        HealthSettings {
            interval: duration_or("interval", &cfg.interval, defaults.interval),
            check_timeout: duration_or("check_timeout", &cfg.check_timeout, defaults.check_timeout),
            unhealthy_threshold: cfg
                .unhealthy_threshold
                .unwrap_or(defaults.unhealthy_threshold)
                .max(1),
            unreachable_threshold: cfg
                .unreachable_threshold
                .unwrap_or(defaults.unreachable_threshold)
                .max(1),
            workers: cfg.workers.unwrap_or(defaults.workers).max(1),
        }
    }

    /// Database path, relative paths resolved against `data_dir`.
    pub fn store_path(&self, data_dir: &Path) -> PathBuf {
        match self.store.as_ref().and_then(|s| s.path.clone()) {
            Some(p) if p.is_absolute() => p,
            Some(p) => data_dir.join(p),
            None => data_dir.join("foldergrid.redb"),
        }
    }
}

fn duration_or(field: &str, value: &Option<String>, default: Duration) -> Duration {
    let Some(raw) = value.as_deref() else {
        return default;
    };
    parse_duration(raw).unwrap_or_else(|| {
        warn!(field, value = raw, ?default, "unparseable duration; using default");
        default
    })
}

/// Parse a duration string like "5s", "500ms", "2m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
