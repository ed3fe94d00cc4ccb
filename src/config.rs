//! Splitter configuration
//!
//! Every field has a default, so an empty TOML file (or none at all) gives
//! the standard invoice layout:
//!
//! ```toml
//! source_fallback = "data/Invoices.xls"
//! template = "data/Template.xls"
//! output_dir = "output"
//! output_stem = "Invoices"
//!
//! [retry]
//! max_attempts = 5
//! delay_ms = 1000
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::split::{SplitError, SplitResult};

/// Retry budget of the durable writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn validate(&self) -> SplitResult<()> {
        if self.max_attempts == 0 {
            return Err(SplitError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the workbooks live and how they are laid out
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    /// Source workbook read when no upload is supplied
    pub source_fallback: PathBuf,
    /// Workbook every output is rebuilt from
    pub template: PathBuf,
    /// Default destination directory
    pub output_dir: PathBuf,
    /// Output file names are `<stem>_P1.xls` and `<stem>_P2.xls`
    pub output_stem: String,
    pub primary_sheet: String,
    pub detail_sheet: String,
    /// Column whose value decides the group of a primary row
    pub id_column: String,
    /// Column linking detail rows to primary rows
    pub join_column: String,
    pub retry: RetryPolicy,
}

impl Default for SplitConfig {
    fn default() -> Self {
        SplitConfig {
            source_fallback: PathBuf::from("data/Invoices.xls"),
            template: PathBuf::from("data/Template.xls"),
            output_dir: PathBuf::from("output"),
            output_stem: "Invoices".to_string(),
            primary_sheet: "Invoices".to_string(),
            detail_sheet: "Invoice_Details".to_string(),
            id_column: "IDINVC".to_string(),
            join_column: "CNTITEM".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl SplitConfig {
    /// Parse a TOML configuration
    pub fn from_toml(text: &str) -> SplitResult<Self> {
        let config: SplitConfig =
            toml::from_str(text).map_err(|e| SplitError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SplitResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            SplitError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> SplitResult<()> {
        self.retry.validate()?;
        if self.output_stem.is_empty() {
            return Err(SplitError::Config("output_stem must not be empty".to_string()));
        }
        Ok(())
    }

    /// Path of one output file
    ///
    /// # Arguments
    ///
    /// * `dir` - Destination directory
    /// * `suffix` - Group suffix, `P1` or `P2`
    pub fn output_path(&self, dir: &Path, suffix: &str) -> PathBuf {
        dir.join(format!("{}_{}.xls", self.output_stem, suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SplitConfig::from_toml("").unwrap();
        assert_eq!(config, SplitConfig::default());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay(), Duration::from_secs(1));
        assert_eq!(
            config.output_path(Path::new("out"), "P1"),
            PathBuf::from("out/Invoices_P1.xls")
        );
    }

    #[test]
    fn test_partial_override() {
        let config = SplitConfig::from_toml(
            r#"
            output_stem = "March"
            [retry]
            delay_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.output_stem, "March");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay_ms, 50);
        assert_eq!(config.id_column, "IDINVC");
    }

    #[test]
    fn test_rejects_zero_attempts_and_unknown_keys() {
        assert!(matches!(
            SplitConfig::from_toml("[retry]\nmax_attempts = 0"),
            Err(SplitError::Config(_))
        ));
        assert!(SplitConfig::from_toml("sheet = \"x\"").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xlsplit.toml");
        fs::write(&path, "template = \"t.xls\"").unwrap();
        assert_eq!(
            SplitConfig::from_file(&path).unwrap().template,
            PathBuf::from("t.xls")
        );
        assert!(SplitConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
