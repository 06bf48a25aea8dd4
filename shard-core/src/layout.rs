//! Filesystem layout
//!
//! Pure mapping from a shard index to the files that describe it:
//! - `cache/sbatch_script_<index>.sh` while submitted
//! - `cache/sbatch_script_<index>_failed.sh` after a worker failure
//! - `output/<index>.txt` after a worker success
//!
//! The mapping depends only on the index and the configured directories,
//! so re-dispatching an index always targets the same files.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::shard::ShardIndex;

const ARTIFACT_PREFIX: &str = "sbatch_script_";
const ARTIFACT_EXTENSION: &str = ".sh";
const FAILED_SUFFIX: &str = "_failed";
const RESULT_EXTENSION: &str = ".txt";
const STAGING_EXTENSION: &str = ".tmp";

/// Which variant of a submission artifact a file name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Written by the dispatcher, awaiting a worker outcome
    Active,
    /// Renamed by a worker that failed
    Failed,
}

/// Directory layout shared by the dispatcher, the workers and the CLI
#[derive(Debug, Clone)]
pub struct ShardLayout {
    cache_dir: PathBuf,
    log_dir: PathBuf,
    output_dir: PathBuf,
    error_log: PathBuf,
}

impl ShardLayout {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        error_log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            log_dir: log_dir.into(),
            output_dir: output_dir.into(),
            error_log: error_log.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.cache_dir.clone(),
            config.log_dir.clone(),
            config.output_dir.clone(),
            config.error_log.clone(),
        )
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn error_log(&self) -> &Path {
        &self.error_log
    }

    /// Creates the cache, log and output directories if they do not exist
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    pub fn artifact_path(&self, shard: ShardIndex) -> PathBuf {
        self.cache_dir
            .join(format!("{}{}{}", ARTIFACT_PREFIX, shard, ARTIFACT_EXTENSION))
    }

    pub fn failed_artifact_path(&self, shard: ShardIndex) -> PathBuf {
        self.cache_dir.join(format!(
            "{}{}{}{}",
            ARTIFACT_PREFIX, shard, FAILED_SUFFIX, ARTIFACT_EXTENSION
        ))
    }

    pub fn result_path(&self, shard: ShardIndex) -> PathBuf {
        self.output_dir
            .join(format!("{}{}", shard, RESULT_EXTENSION))
    }

    /// Hidden sibling of the result record, renamed into place once complete
    pub fn result_staging_path(&self, shard: ShardIndex) -> PathBuf {
        self.output_dir.join(format!(
            ".{}{}{}",
            shard, RESULT_EXTENSION, STAGING_EXTENSION
        ))
    }

    /// SLURM `--output` pattern (`%x` = job name, `%j` = job id)
    pub fn scheduler_log_pattern(&self) -> PathBuf {
        self.log_dir.join("slurm-%x_%j.out")
    }

    /// Parses a cache directory entry name back into its shard and kind
    pub fn parse_artifact_name(name: &str) -> Option<(ShardIndex, ArtifactKind)> {
        let stem = name
            .strip_prefix(ARTIFACT_PREFIX)?
            .strip_suffix(ARTIFACT_EXTENSION)?;

        let (digits, kind) = match stem.strip_suffix(FAILED_SUFFIX) {
            Some(digits) => (digits, ArtifactKind::Failed),
            None => (stem, ArtifactKind::Active),
        };

        parse_digits(digits).map(|shard| (shard, kind))
    }

    /// Parses an output directory entry name back into its shard
    ///
    /// Staging files are not result records and yield `None`.
    pub fn parse_result_name(name: &str) -> Option<ShardIndex> {
        parse_digits(name.strip_suffix(RESULT_EXTENSION)?)
    }
}

fn parse_digits(digits: &str) -> Option<ShardIndex> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ShardLayout {
        ShardLayout::new("cache", "logs", "output", "error_logs.txt")
    }

    #[test]
    fn test_paths_are_keyed_by_padded_index() {
        let layout = layout();
        let shard = ShardIndex::new(1);

        assert_eq!(
            layout.artifact_path(shard),
            PathBuf::from("cache/sbatch_script_000001.sh")
        );
        assert_eq!(
            layout.failed_artifact_path(shard),
            PathBuf::from("cache/sbatch_script_000001_failed.sh")
        );
        assert_eq!(layout.result_path(shard), PathBuf::from("output/000001.txt"));
        assert_eq!(
            layout.result_staging_path(shard),
            PathBuf::from("output/.000001.txt.tmp")
        );
    }

    #[test]
    fn test_mapping_is_stable() {
        let a = layout();
        let b = layout();
        let shard = ShardIndex::new(231_349);
        assert_eq!(a.artifact_path(shard), b.artifact_path(shard));
        assert_eq!(a.result_path(shard), b.result_path(shard));
    }

    #[test]
    fn test_parse_artifact_name() {
        assert_eq!(
            ShardLayout::parse_artifact_name("sbatch_script_000012.sh"),
            Some((ShardIndex::new(12), ArtifactKind::Active))
        );
        assert_eq!(
            ShardLayout::parse_artifact_name("sbatch_script_000012_failed.sh"),
            Some((ShardIndex::new(12), ArtifactKind::Failed))
        );
        assert_eq!(ShardLayout::parse_artifact_name("sbatch_script_.sh"), None);
        assert_eq!(ShardLayout::parse_artifact_name("sbatch_script_12a.sh"), None);
        assert_eq!(ShardLayout::parse_artifact_name("other_000012.sh"), None);
        assert_eq!(ShardLayout::parse_artifact_name("sbatch_script_000012.txt"), None);
    }

    #[test]
    fn test_parse_result_name_ignores_staging_files() {
        assert_eq!(
            ShardLayout::parse_result_name("000007.txt"),
            Some(ShardIndex::new(7))
        );
        assert_eq!(ShardLayout::parse_result_name(".000007.txt.tmp"), None);
        assert_eq!(ShardLayout::parse_result_name("notes.txt"), None);
    }

    #[test]
    fn test_ensure_dirs_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let layout = ShardLayout::new(
            root.path().join("a/cache"),
            root.path().join("a/logs"),
            root.path().join("b/output"),
            root.path().join("error_logs.txt"),
        );

        layout.ensure_dirs().unwrap();
        layout.ensure_dirs().unwrap();

        assert!(layout.cache_dir().is_dir());
        assert!(layout.log_dir().is_dir());
        assert!(layout.output_dir().is_dir());
    }
}
