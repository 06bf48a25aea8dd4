//! Cluster configuration
//!
//! Defines every static parameter of a run: filesystem locations, the
//! SLURM job shape, admission control and the dataset being processed.
//! The configuration is read once at process start and handed to each
//! component at construction.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::shard::ShardIndex;

/// Placeholder replaced by the zero-padded shard index
pub const SHARD_PLACEHOLDER: &str = "{shard}";

/// Placeholder replaced by the raw shard index
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// The configuration is internally inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What the dispatcher does when the queue status query fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorPolicy {
    /// Stop dispatching and return the error
    Abort,
    /// Treat the tick as ceiling-reached and poll again after the delay
    AssumeFull,
}

impl fmt::Display for QueryErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::AssumeFull => write!(f, "assume-full"),
        }
    }
}

impl FromStr for QueryErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "assume-full" | "assume_full" | "backoff" => Ok(Self::AssumeFull),
            other => Err(format!(
                "unknown query error policy '{}', expected 'abort' or 'assume-full'",
                other
            )),
        }
    }
}

/// Resources requested for every shard job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceShape {
    pub nodes: u32,
    pub gpus: u32,
    pub cpus_per_gpu: u32,
    pub tasks_per_node: u32,
}

impl Default for ResourceShape {
    fn default() -> Self {
        Self {
            nodes: 1,
            gpus: 1,
            cpus_per_gpu: 2,
            tasks_per_node: 8,
        }
    }
}

/// Run configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding submission artifacts
    pub cache_dir: PathBuf,

    /// Directory SLURM writes job stdout/stderr into
    pub log_dir: PathBuf,

    /// Directory holding one result record per successful shard
    pub output_dir: PathBuf,

    /// Shared append-only failure log
    pub error_log: PathBuf,

    /// SLURM job name; also scopes the running-job count
    pub job_name: String,

    /// SLURM job comment
    pub job_comment: String,

    /// Resource shape requested per job
    pub resources: ResourceShape,

    /// Maximum number of jobs allowed in the queue under `job_name`
    pub max_concurrent: usize,

    /// Delay between admission polls while the queue is saturated
    pub poll_interval: Duration,

    /// Behaviour when the queue status query fails
    pub on_query_error: QueryErrorPolicy,

    /// Consecutive query failures tolerated under `AssumeFull` (0 = unlimited)
    pub max_query_failures: u32,

    /// Number of shards in the dataset
    pub dataset_size: u64,

    /// Source location template, with `{shard}` or `{index}` placeholders
    pub source_template: String,

    /// Command the submission artifact runs, followed by the shard index
    pub worker_command: String,

    /// Program used to submit artifacts
    pub submit_command: String,

    /// Program used to list queued jobs
    pub queue_command: String,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional and falls back to its default:
    /// - SHARD_CACHE_DIR, SHARD_LOG_DIR, SHARD_OUTPUT_DIR, SHARD_ERROR_LOG
    /// - SHARD_JOB_NAME, SHARD_JOB_COMMENT
    /// - SHARD_NODES, SHARD_GPUS, SHARD_CPUS_PER_GPU, SHARD_TASKS_PER_NODE
    /// - SHARD_MAX_CONCURRENT, SHARD_POLL_INTERVAL_MS (milliseconds)
    /// - SHARD_ON_QUERY_ERROR (`abort` | `assume-full`), SHARD_MAX_QUERY_FAILURES
    /// - SHARD_DATASET_SIZE, SHARD_SOURCE_TEMPLATE
    /// - SHARD_WORKER_COMMAND, SHARD_SUBMIT_COMMAND, SHARD_QUEUE_COMMAND
    ///
    /// A variable that is set but unparseable is an error, not a silent default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Creates configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let locations = Self::locations_from_lookup(&lookup);
        let defaults = Self::default();

        let string_var = |var: &str, default: String| lookup(var).unwrap_or(default);

        let resources = ResourceShape {
            nodes: parse_var(&lookup, "SHARD_NODES", defaults.resources.nodes)?,
            gpus: parse_var(&lookup, "SHARD_GPUS", defaults.resources.gpus)?,
            cpus_per_gpu: parse_var(
                &lookup,
                "SHARD_CPUS_PER_GPU",
                defaults.resources.cpus_per_gpu,
            )?,
            tasks_per_node: parse_var(
                &lookup,
                "SHARD_TASKS_PER_NODE",
                defaults.resources.tasks_per_node,
            )?,
        };

        let poll_interval_ms = parse_var(
            &lookup,
            "SHARD_POLL_INTERVAL_MS",
            defaults.poll_interval.as_millis() as u64,
        )?;

        Ok(Self {
            job_name: string_var("SHARD_JOB_NAME", defaults.job_name),
            job_comment: string_var("SHARD_JOB_COMMENT", defaults.job_comment),
            resources,
            max_concurrent: parse_var(&lookup, "SHARD_MAX_CONCURRENT", defaults.max_concurrent)?,
            poll_interval: Duration::from_millis(poll_interval_ms),
            on_query_error: parse_var(&lookup, "SHARD_ON_QUERY_ERROR", defaults.on_query_error)?,
            max_query_failures: parse_var(
                &lookup,
                "SHARD_MAX_QUERY_FAILURES",
                defaults.max_query_failures,
            )?,
            dataset_size: parse_var(&lookup, "SHARD_DATASET_SIZE", defaults.dataset_size)?,
            worker_command: string_var("SHARD_WORKER_COMMAND", defaults.worker_command),
            submit_command: string_var("SHARD_SUBMIT_COMMAND", defaults.submit_command),
            queue_command: string_var("SHARD_QUEUE_COMMAND", defaults.queue_command),
            ..locations
        })
    }

    /// Defaults overlaid with the variables that cannot fail to parse
    ///
    /// Covers the four filesystem locations and the source template, which
    /// is enough for a worker to record a failure when the rest of the
    /// configuration is unreadable.
    pub fn locations_from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let path_var =
            |var: &str, default: PathBuf| lookup(var).map(PathBuf::from).unwrap_or(default);

        Self {
            cache_dir: path_var("SHARD_CACHE_DIR", defaults.cache_dir.clone()),
            log_dir: path_var("SHARD_LOG_DIR", defaults.log_dir.clone()),
            output_dir: path_var("SHARD_OUTPUT_DIR", defaults.output_dir.clone()),
            error_log: path_var("SHARD_ERROR_LOG", defaults.error_log.clone()),
            source_template: lookup("SHARD_SOURCE_TEMPLATE")
                .unwrap_or_else(|| defaults.source_template.clone()),
            ..defaults
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_name.trim().is_empty() {
            return Err(ConfigError::Invalid("job_name cannot be empty".into()));
        }

        // These end up unquoted in #SBATCH lines
        let log_dir = self.log_dir.to_string_lossy();
        for (name, value) in [
            ("job_name", self.job_name.as_str()),
            ("job_comment", self.job_comment.as_str()),
            ("log_dir", log_dir.as_ref()),
        ] {
            if value.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "{} cannot contain whitespace",
                    name
                )));
            }
        }

        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be greater than 0".into(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll_interval must be greater than 0".into(),
            ));
        }

        if self.dataset_size == 0 {
            return Err(ConfigError::Invalid(
                "dataset_size must be greater than 0".into(),
            ));
        }

        if !self.source_template.contains(SHARD_PLACEHOLDER)
            && !self.source_template.contains(INDEX_PLACEHOLDER)
        {
            return Err(ConfigError::Invalid(format!(
                "source_template must contain {} or {}",
                SHARD_PLACEHOLDER, INDEX_PLACEHOLDER
            )));
        }

        for (name, value) in [
            ("worker_command", &self.worker_command),
            ("submit_command", &self.submit_command),
            ("queue_command", &self.queue_command),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} cannot be empty", name)));
            }
        }

        if self.worker_command.contains(['\n', '\r']) {
            return Err(ConfigError::Invalid(
                "worker_command must be a single line".into(),
            ));
        }

        let shape = &self.resources;
        if shape.nodes == 0 || shape.tasks_per_node == 0 {
            return Err(ConfigError::Invalid(
                "nodes and tasks_per_node must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Renders the source location of one shard from the template
    pub fn source_location(&self, shard: ShardIndex) -> String {
        self.source_template
            .replace(SHARD_PLACEHOLDER, &shard.to_string())
            .replace(INDEX_PLACEHOLDER, &shard.get().to_string())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            log_dir: PathBuf::from("./logs"),
            output_dir: PathBuf::from("./output"),
            error_log: PathBuf::from("./error_logs.txt"),
            job_name: "inferencepipeline".to_string(),
            job_comment: "laion".to_string(),
            resources: ResourceShape::default(),
            max_concurrent: 8,
            poll_interval: Duration::from_millis(500),
            on_query_error: QueryErrorPolicy::AssumeFull,
            max_query_failures: 120,
            dataset_size: 231_350,
            source_template: "pipe:aws s3 cp s3://s-datasets/laion5b/laion2B-data/{shard}.tar -"
                .to_string(),
            worker_command: "shard-worker".to_string(),
            submit_command: "sbatch".to_string(),
            queue_command: "squeue".to_string(),
        }
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                var,
                value: value.clone(),
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.job_name, "inferencepipeline");
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.dataset_size, 231_350);
        assert_eq!(config.resources, ResourceShape::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_without_vars_matches_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        let defaults = Config::default();
        assert_eq!(config.cache_dir, defaults.cache_dir);
        assert_eq!(config.source_template, defaults.source_template);
        assert_eq!(config.on_query_error, QueryErrorPolicy::AssumeFull);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("SHARD_CACHE_DIR", "/scratch/cache"),
            ("SHARD_MAX_CONCURRENT", "32"),
            ("SHARD_POLL_INTERVAL_MS", "250"),
            ("SHARD_GPUS", "4"),
            ("SHARD_ON_QUERY_ERROR", "abort"),
            ("SHARD_JOB_NAME", "embed"),
        ]))
        .unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/scratch/cache"));
        assert_eq!(config.max_concurrent, 32);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.resources.gpus, 4);
        assert_eq!(config.on_query_error, QueryErrorPolicy::Abort);
        assert_eq!(config.job_name, "embed");
    }

    #[test]
    fn test_unparseable_var_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[("SHARD_MAX_CONCURRENT", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("SHARD_MAX_CONCURRENT"));

        let err = Config::from_lookup(lookup_from(&[("SHARD_ON_QUERY_ERROR", "ignore")]))
            .unwrap_err();
        assert!(err.to_string().contains("SHARD_ON_QUERY_ERROR"));
    }

    #[test]
    fn test_locations_survive_unparseable_vars() {
        let vars = lookup_from(&[
            ("SHARD_CACHE_DIR", "/scratch/cache"),
            ("SHARD_ERROR_LOG", "/scratch/errors.txt"),
            ("SHARD_SOURCE_TEMPLATE", "/data/{shard}.tar"),
            ("SHARD_GPUS", "two"),
        ]);

        assert!(Config::from_lookup(&vars).is_err());

        let locations = Config::locations_from_lookup(&vars);
        assert_eq!(locations.cache_dir, PathBuf::from("/scratch/cache"));
        assert_eq!(locations.error_log, PathBuf::from("/scratch/errors.txt"));
        assert_eq!(locations.output_dir, Config::default().output_dir);
        assert_eq!(locations.source_template, "/data/{shard}.tar");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.max_concurrent = 0;
        assert!(config.validate().is_err());
        config.max_concurrent = 8;

        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.poll_interval = Duration::from_millis(500);

        config.job_name = "two words".to_string();
        assert!(config.validate().is_err());
        config.job_name = "inferencepipeline".to_string();

        config.job_comment = "laion 5b".to_string();
        assert!(config.validate().is_err());
        config.job_comment = "laion".to_string();

        config.log_dir = PathBuf::from("/shared/job logs");
        assert!(config.validate().is_err());
        config.log_dir = PathBuf::from("/shared/logs");

        config.worker_command = "python worker.py --verbose".to_string();
        assert!(config.validate().is_ok());
        config.worker_command = "shard-worker\nrm -rf /".to_string();
        assert!(config.validate().is_err());
        config.worker_command = "shard-worker".to_string();

        config.source_template = "s3://bucket/static.tar".to_string();
        assert!(config.validate().is_err());
        config.source_template = "s3://bucket/{index}.tar".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_location_placeholders() {
        let mut config = Config::default();
        assert_eq!(
            config.source_location(ShardIndex::new(7)),
            "pipe:aws s3 cp s3://s-datasets/laion5b/laion2B-data/000007.tar -"
        );

        config.source_template = "data/{index}/{shard}.tar".to_string();
        assert_eq!(
            config.source_location(ShardIndex::new(7)),
            "data/7/000007.tar"
        );
    }

    #[test]
    fn test_query_error_policy_parse() {
        assert_eq!("abort".parse::<QueryErrorPolicy>(), Ok(QueryErrorPolicy::Abort));
        assert_eq!("Assume-Full".parse::<QueryErrorPolicy>(), Ok(QueryErrorPolicy::AssumeFull));
        assert!("retry".parse::<QueryErrorPolicy>().is_err());
        assert_eq!(QueryErrorPolicy::AssumeFull.to_string(), "assume-full");
    }
}
