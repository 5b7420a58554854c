use std::{fs::read_to_string, path::Path, path::PathBuf};

use eyre::WrapErr;
use serde::Deserialize;

use crate::fixtures;

/// Run options for the `react-bench` binary, read from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    /// Root that suite paths are resolved against.
    pub assets_dir: Option<PathBuf>,
    /// Suite to run. The built-in React 0.13 suite when absent.
    pub suite_file_path: Option<PathBuf>,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Clones rendered side by side once a scenario has been timed.
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub show_bench: bool,
}

fn default_iterations() -> u32 {
    100
}

fn default_threads() -> usize {
    1
}

impl Default for Options {
    fn default() -> Self {
        Self {
            assets_dir: None,
            suite_file_path: None,
            iterations: default_iterations(),
            threads: default_threads(),
            show_bench: false,
        }
    }
}

impl Options {
    pub fn from_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let raw = read_to_string(path)
            .wrap_err_with(|| format!("reading options {}", path.display()))?;
        Self::from_json(&raw).wrap_err_with(|| format!("parsing options {}", path.display()))
    }

    pub fn from_json(raw: &str) -> eyre::Result<Self> {
        let mut de = serde_json::Deserializer::from_str(raw);
        Ok(serde_path_to_error::deserialize(&mut de)?)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.assets_dir.clone().unwrap_or_else(fixtures::assets_dir)
    }

    /// Requested thread count, capped at the number of CPUs.
    pub fn threads(&self) -> usize {
        self.threads.clamp(1, num_cpus::get().max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let opts = Options::from_json("{}").unwrap();
        assert_eq!(opts.iterations, 100);
        assert_eq!(opts.threads, 1);
        assert!(!opts.show_bench);
        assert!(opts.suite_file_path.is_none());
        assert_eq!(opts.assets_dir(), fixtures::assets_dir());
    }

    #[test]
    fn reads_all_fields() {
        let opts = Options::from_json(
            r#"{
                "assets_dir": "/tmp/assets",
                "suite_file_path": "suites/react-0.13.yaml",
                "iterations": 5,
                "threads": 0,
                "show_bench": true
            }"#,
        )
        .unwrap();
        assert_eq!(opts.assets_dir(), PathBuf::from("/tmp/assets"));
        assert_eq!(opts.iterations, 5);
        assert_eq!(opts.threads(), 1);
        assert!(opts.show_bench);
    }

    #[test]
    fn type_errors_name_the_field() {
        let err = Options::from_json(r#"{"iterations": "many"}"#).unwrap_err();
        assert!(err.to_string().starts_with("iterations"), "{err}");
    }
}
