//! Workbook partitioning
//!
//! [`Splitter::process`] loads a source workbook, divides the rows of its
//! primary sheet by identifier (digits-only identifiers form group P1, all
//! others P2), carries the division over to the detail sheet through the
//! join column, and writes one workbook per group rebuilt from the
//! template.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use xlsplit::config::SplitConfig;
//! use xlsplit::split::Splitter;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut splitter = Splitter::new(SplitConfig::default());
//! let report = splitter.process(None, Some(Path::new("out")))?;
//! println!("{} and {}", report.p1.path.display(), report.p2.path.display());
//! # Ok(())
//! # }
//! ```

/// Error types for splitting
mod error;

/// Source and template loading
pub mod loader;

/// Row classification and detail filtering
pub mod classify;

/// Template-based output rebuilding
pub mod rebuild;

/// Retrying output writer
pub mod durable;


use std::path::{Path, PathBuf};

use crate::config::SplitConfig;
use crate::ole::xls::Workbook;

pub use classify::{Selection, classify, filter_details, is_numeric_id};
pub use durable::{LocalFs, WriteTarget};
pub use error::{SplitError, SplitResult};
pub use rebuild::{RebuildReport, Rebuilder, rebuild};

/// The two output groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    /// Digits-only identifiers
    P1,
    /// Every other identifier, including missing ones
    P2,
}

impl Group {
    /// File name suffix
    pub fn suffix(self) -> &'static str {
        match self {
            Group::P1 => "P1",
            Group::P2 => "P2",
        }
    }

    fn matches_numeric(self) -> bool {
        self == Group::P1
    }
}

/// Outcome for one written output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub path: PathBuf,
    /// Data rows written to the primary sheet
    pub primary_rows: usize,
    /// Data rows written to the detail sheet
    pub detail_rows: usize,
    pub rebuild: RebuildReport,
}

/// Outcome of [`Splitter::process`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitReport {
    pub p1: GroupReport,
    pub p2: GroupReport,
}

/// Runs the split with a configuration and a write target
#[derive(Debug)]
pub struct Splitter<T = LocalFs> {
    config: SplitConfig,
    target: T,
}

impl Splitter<LocalFs> {
    /// Splitter writing to the local filesystem
    pub fn new(config: SplitConfig) -> Self {
        Self::with_target(config, LocalFs)
    }
}

impl<T: WriteTarget> Splitter<T> {
    pub fn with_target(config: SplitConfig, target: T) -> Self {
        Splitter { config, target }
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Split a workbook into its P1 and P2 outputs
    ///
    /// # Arguments
    ///
    /// * `upload` - Source workbook bytes; the configured fallback file is
    ///   read when `None`
    /// * `dest_dir` - Output directory; the configured one when `None`
    ///
    /// # Returns
    ///
    /// Paths and row counts of both outputs. If the second group fails, the
    /// first group's file stays on disk.
    pub fn process(
        &mut self,
        upload: Option<&[u8]>,
        dest_dir: Option<&Path>,
    ) -> SplitResult<SplitReport> {
        self.config.validate()?;
        let dir = dest_dir.unwrap_or(self.config.output_dir.as_path()).to_path_buf();
        tracing::info!(
            dir = %dir.display(),
            uploaded = upload.is_some(),
            "splitting workbook"
        );

        let source = loader::load_source(upload, &self.config.source_fallback)?;
        self.target.create_dir(&dir)?;

        let p1 = self.process_group(&source, Group::P1, &dir)?;
        let p2 = self.process_group(&source, Group::P2, &dir)?;

        tracing::info!(
            p1 = %p1.path.display(),
            p2 = %p2.path.display(),
            "split complete"
        );
        Ok(SplitReport { p1, p2 })
    }

    fn process_group(
        &mut self,
        source: &Workbook,
        group: Group,
        dir: &Path,
    ) -> SplitResult<GroupReport> {
        let config = &self.config;
        let primary = source
            .sheet(&config.primary_sheet)
            .ok_or_else(|| SplitError::missing_sheet(&config.primary_sheet))?;
        let detail = source
            .sheet(&config.detail_sheet)
            .ok_or_else(|| SplitError::missing_sheet(&config.detail_sheet))?;

        let selection = classify(
            primary,
            &config.id_column,
            &config.join_column,
            group.matches_numeric(),
        )?;
        let details = filter_details(detail, &config.join_column, &selection.join_keys)?;
        tracing::debug!(
            group = group.suffix(),
            primary_rows = selection.data_rows(),
            detail_rows = details.len() - 1,
            join_keys = selection.join_keys.len(),
            "classified rows"
        );

        let template = loader::load_template(&config.template)?;
        let (document, rebuilt) = rebuild(
            &template,
            source,
            &[
                (config.primary_sheet.as_str(), selection.rows.as_slice()),
                (config.detail_sheet.as_str(), details.as_slice()),
            ],
        )?;
        let bytes = document.to_bytes()?;

        let path = config.output_path(dir, group.suffix());
        let policy = config.retry;
        durable::save(&mut self.target, &bytes, &path, &policy)?;
        tracing::info!(
            group = group.suffix(),
            path = %path.display(),
            bytes = bytes.len(),
            "output written"
        );

        Ok(GroupReport {
            path,
            primary_rows: selection.data_rows(),
            detail_rows: details.len() - 1,
            rebuild: rebuilt,
        })
    }
}
