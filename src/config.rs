//! Engine configuration, loadable from `.mendmap.toml` at the analyzed root.
//!
//! The configuration is immutable once constructed and is passed into the
//! orchestrator explicitly; there is no process-wide mutable state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// File extensions included in a scan.
    pub extensions: Vec<String>,
    /// Glob patterns excluded from scans and snapshots.
    pub ignore_patterns: Vec<String>,
    /// Minimum reachable-node count for an entry point to register a
    /// critical path.
    pub critical_path_min_reach: usize,
    /// Window over which the recency score decays linearly to zero.
    pub recency_window_days: i64,
    pub weights: RiskWeights,
    /// Tolerated health-score regression per session (epsilon).
    pub health_tolerance: f64,
    /// Bound on one unit's snapshot-plus-apply wall time.
    pub unit_timeout_secs: u64,
    pub memory_warn_pct: f32,
    pub memory_critical_pct: f32,
    pub disk_warn_pct: f32,
    pub disk_critical_pct: f32,
    /// Name fragments marking files whose edits carry extra risk.
    pub critical_file_patterns: Vec<String>,
    /// Command run after a manifest update when the unit requests an
    /// install step, e.g. `["cargo", "fetch"]`. None disables the step.
    pub install_command: Option<Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extensions: vec![
                "rs".into(),
                "toml".into(),
                "json".into(),
                "yaml".into(),
                "yml".into(),
            ],
            ignore_patterns: vec!["**/target/**".into(), "**/.mendmap/**".into()],
            critical_path_min_reach: 5,
            recency_window_days: 30,
            weights: RiskWeights::default(),
            health_tolerance: 0.05,
            unit_timeout_secs: 300,
            memory_warn_pct: 80.0,
            memory_critical_pct: 90.0,
            disk_warn_pct: 90.0,
            disk_critical_pct: 95.0,
            critical_file_patterns: vec![
                "main".into(),
                "lib".into(),
                "config".into(),
                "settings".into(),
                "schema".into(),
                "database".into(),
            ],
            install_command: None,
        }
    }
}

/// Weights for the component risk factors. Normalized to sum to 1 before
/// scoring.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub dependents: f64,
    pub size: f64,
    pub recency: f64,
    pub critical_paths: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            dependents: 0.3,
            size: 0.2,
            recency: 0.2,
            critical_paths: 0.3,
        }
    }
}

impl RiskWeights {
    pub fn validate(&self) -> Result<(), String> {
        let parts = [self.dependents, self.size, self.recency, self.critical_paths];
        if parts.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err("weights must be finite and non-negative".into());
        }
        if parts.iter().sum::<f64>() <= 0.0 {
            return Err("weights must not all be zero".into());
        }
        Ok(())
    }

    /// Scale the weights so they sum to exactly 1.0.
    pub fn normalize(&mut self) {
        let sum = self.dependents + self.size + self.recency + self.critical_paths;
        self.dependents /= sum;
        self.size /= sum;
        self.recency /= sum;
        self.critical_paths /= sum;
    }
}

const CONFIG_FILE: &str = ".mendmap.toml";

/// Load configuration from `<root>/.mendmap.toml` if present. A missing
/// file yields defaults; a malformed file warns and falls back to
/// defaults rather than failing the run.
pub fn load_config(root: &Path) -> EngineConfig {
    let path: PathBuf = root.join(CONFIG_FILE);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to read {}: {}", path.display(), e);
            }
            return EngineConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(config) => {
            log::debug!("loaded config from {}", path.display());
            config
        }
        Err(e) => {
            log::warn!("{}; using defaults", e);
            EngineConfig::default()
        }
    }
}

pub fn parse_config(contents: &str) -> Result<EngineConfig, String> {
    let mut config = toml::from_str::<EngineConfig>(contents)
        .map_err(|e| format!("failed to parse {}: {}", CONFIG_FILE, e))?;

    if let Err(e) = config.weights.validate() {
        log::warn!("invalid risk weights: {}; using defaults", e);
        config.weights = RiskWeights::default();
    }
    config.weights.normalize();

    Ok(config)
}
