//! Submission artifact builder
//!
//! Renders the sbatch script for one shard and writes it to the cache
//! directory. The script body is a pure function of the shard index and
//! the static configuration, so rebuilding an index overwrites any stale
//! script from an earlier attempt with identical bytes.

use shard_core::{Config, ResourceShape, ShardIndex, ShardLayout};
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// Writes sbatch scripts that launch the worker for one shard
#[derive(Debug, Clone)]
pub struct ArtifactBuilder {
    layout: ShardLayout,
    job_name: String,
    job_comment: String,
    resources: ResourceShape,
    worker_command: String,
}

impl ArtifactBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            layout: ShardLayout::from_config(config),
            job_name: config.job_name.clone(),
            job_comment: config.job_comment.clone(),
            resources: config.resources,
            worker_command: config.worker_command.clone(),
        }
    }

    pub fn layout(&self) -> &ShardLayout {
        &self.layout
    }

    /// Renders the sbatch script for a shard
    pub fn render(&self, shard: ShardIndex) -> String {
        let shape = &self.resources;

        format!(
            "#!/bin/bash\n\
             #SBATCH --job-name={job_name}\n\
             #SBATCH --comment={comment}\n\
             #SBATCH --nodes={nodes}\n\
             #SBATCH --gpus={gpus}\n\
             #SBATCH --cpus-per-gpu={cpus_per_gpu}\n\
             #SBATCH --ntasks-per-node={tasks_per_node}\n\
             #SBATCH --output={output}\n\
             {worker} {index}\n",
            job_name = self.job_name,
            comment = self.job_comment,
            nodes = shape.nodes,
            gpus = shape.gpus,
            cpus_per_gpu = shape.cpus_per_gpu,
            tasks_per_node = shape.tasks_per_node,
            output = self.layout.scheduler_log_pattern().display(),
            worker = self.worker_command,
            index = shard.get(),
        )
    }

    /// Writes the shard's artifact, replacing any previous one
    pub fn build(&self, shard: ShardIndex) -> io::Result<PathBuf> {
        let path = self.layout.artifact_path(shard);
        std::fs::write(&path, self.render(shard))?;
        debug!("Wrote submission artifact {}", path.display());
        Ok(path)
    }

    /// Removes the shard's active artifact; a missing file is not an error
    pub fn discard(&self, shard: ShardIndex) -> io::Result<()> {
        match std::fs::remove_file(self.layout.artifact_path(shard)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
