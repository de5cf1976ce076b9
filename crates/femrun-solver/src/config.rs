//! Runner configuration: external program names and execution limits.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// CalculiX executable
    pub ccx: String,
    pub elmer_solver: String,
    pub elmer_grid: String,
    pub gmsh: String,
    /// Threads handed to solvers through `OMP_NUM_THREADS` (0 = solver default)
    pub threads: usize,
    /// Wall-clock limit per external program (seconds, 0 = none)
    pub timeout_secs: u64,
    /// How often a running program is polled for exit or cancellation
    pub poll_interval_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ccx: "ccx".to_string(),
            elmer_solver: "ElmerSolver".to_string(),
            elmer_grid: "ElmerGrid".to_string(),
            gmsh: "gmsh".to_string(),
            threads: 0,
            timeout_secs: 0,
            poll_interval_ms: 50,
        }
    }
}

impl RunnerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(femrun_io::load_json(path)?)
    }

    /// Defaults with `FEMRUN_*` environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by variable name.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("FEMRUN_CCX") {
            self.ccx = v;
        }
        if let Some(v) = lookup("FEMRUN_ELMER_SOLVER") {
            self.elmer_solver = v;
        }
        if let Some(v) = lookup("FEMRUN_ELMER_GRID") {
            self.elmer_grid = v;
        }
        if let Some(v) = lookup("FEMRUN_GMSH") {
            self.gmsh = v;
        }
        if let Some(v) = lookup("FEMRUN_THREADS") {
            self.threads = v
                .trim()
                .parse()
                .map_err(|_| RunError::InvalidConfig(format!("FEMRUN_THREADS='{v}' is not a count")))?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn overrides_replace_program_names() {
        let env: HashMap<&str, &str> = [("FEMRUN_CCX", "/opt/ccx/bin/ccx_2.21"), ("FEMRUN_THREADS", "4")]
            .into_iter()
            .collect();
        let config = RunnerConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .expect("valid overrides");
        assert_eq!(config.ccx, "/opt/ccx/bin/ccx_2.21");
        assert_eq!(config.threads, 4);
        assert_eq!(config.gmsh, "gmsh");
    }

    #[test]
    fn bad_thread_count_is_rejected() {
        let err = RunnerConfig::default()
            .with_overrides(|k| (k == "FEMRUN_THREADS").then(|| "many".to_string()))
            .expect_err("should fail");
        assert!(matches!(err, RunError::InvalidConfig(_)));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("runner.json");
        std::fs::write(&path, r#"{"gmsh": "/usr/local/bin/gmsh", "timeout_secs": 600}"#).expect("write");
        let config = RunnerConfig::from_file(&path).expect("load");
        assert_eq!(config.gmsh, "/usr/local/bin/gmsh");
        assert_eq!(config.timeout_secs, 600);
        assert_eq!(config.elmer_solver, "ElmerSolver");
    }
}
