//! Configuration loader
//!
//! Loads and validates the YAML engine configuration.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{UboConfig, UboConfigFile};

const CONFIG_FILE: &str = "ubo.yaml";

pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create loader from UBO_CONFIG env var or default to "config/ubo.yaml"
    ///
    /// Path resolution order:
    /// 1. UBO_CONFIG environment variable (explicit override)
    /// 2. Relative "config/ubo.yaml" (works when running from workspace root)
    /// 3. CARGO_MANIFEST_DIR/config/ubo.yaml
    pub fn from_env() -> Self {
        if let Ok(path) = std::env::var("UBO_CONFIG") {
            return Self::new(path);
        }

        let relative = Path::new("config").join(CONFIG_FILE);
        if relative.exists() {
            return Self::new(relative);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let candidate = Path::new(&manifest_dir).join("config").join(CONFIG_FILE);
            if candidate.exists() {
                return Self::new(candidate);
            }
        }

        let compile_time = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("config")
            .join(CONFIG_FILE);
        if compile_time.exists() {
            return Self::new(compile_time);
        }

        // Last resort - let load() fail with a clear error
        Self::new(relative)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<UboConfig> {
        info!("config.load: reading {}", self.path.display());

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        Self::parse(&content).with_context(|| format!("Invalid config {}", self.path.display()))
    }

    /// Load the file if present, else fall back to the built-in defaults
    pub fn load_or_default(&self) -> Result<UboConfig> {
        if self.path.exists() {
            self.load()
        } else {
            info!(
                "config.load: {} not found, using defaults",
                self.path.display()
            );
            Ok(UboConfig::default())
        }
    }

    pub fn parse(content: &str) -> Result<UboConfig> {
        let file: UboConfigFile =
            serde_yaml::from_str(content).context("Failed to parse UBO config YAML")?;
        file.ubo.validate().map_err(|e| anyhow!(e))?;

        info!(
            "config.load: threshold={} depth={} framework={}",
            file.ubo.ownership_threshold,
            file.ubo.recursive_depth,
            file.ubo.regulatory_framework.to_db_str()
        );
        Ok(file.ubo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::io::Write;
    use ubo_types::RegulatoryFramework;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ConfigLoader::parse(
            r#"
ubo:
  ownership_threshold: "10.00"
  regulatory_framework: UK_MLR
"#,
        )
        .expect("parses");
        assert_eq!(config.ownership_threshold, Decimal::new(1000, 2));
        assert_eq!(config.regulatory_framework, RegulatoryFramework::UkMlr);
        assert_eq!(config.recursive_depth, 5);
        assert!(config.control_prong.creation_order_fallback);
    }

    #[test]
    fn test_invalid_depth_rejected() {
        let err = ConfigLoader::parse("ubo:\n  recursive_depth: 12\n").unwrap_err();
        assert!(err.to_string().contains("recursive_depth"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "ubo:\n  recursive_depth: 3\n  max_parallel: 2").expect("write");

        let config = ConfigLoader::new(file.path()).load().expect("loads");
        assert_eq!(config.recursive_depth, 3);
        assert_eq!(config.max_parallel, 2);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().expect("temp dir");
        let loader = ConfigLoader::new(dir.path().join("absent.yaml"));
        assert!(loader.load().is_err());
        assert_eq!(loader.load_or_default().expect("defaults"), UboConfig::default());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("config")
            .join(CONFIG_FILE);
        ConfigLoader::new(path).load().expect("shipped config loads");
    }
}
