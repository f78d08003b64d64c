use crate::parallel::Parallelism;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the per-cluster dispersion store written by postprocessing.
pub const DISPERSION_FILE: &str = "cluster_dispersion.h5";

/// Import stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDataConfig {
    pub output_data_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct W2vEmbeddingConfig {
    pub f_db: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    pub output_data_directory: PathBuf,
    pub w2v_embedding: Option<W2vEmbeddingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreConfig {
    pub output_data_directory: PathBuf,
    pub f_db: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaclusterConfig {
    pub output_data_directory: PathBuf,
    pub f_centroids: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostprocessingConfig {
    pub output_data_directory: PathBuf,
}

/// Pipeline-wide settings.
///
/// Every stage section is optional; a stage that needs a missing section
/// fails with `MissingSetting` naming the dotted key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(rename = "_PARALLEL", default)]
    pub parallel: bool,
    /// Explicit worker count: -1 = all cores, 1 = serial
    #[serde(rename = "_WORKERS", default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<i64>,
    pub import_data: Option<ImportDataConfig>,
    pub embed: Option<EmbedConfig>,
    pub score: Option<ScoreConfig>,
    pub metacluster: Option<MetaclusterConfig>,
    pub postprocessing: Option<PostprocessingConfig>,
}

fn require<'a, T>(section: &'a Option<T>, key: &str) -> Result<&'a T> {
    section
        .as_ref()
        .ok_or_else(|| Error::MissingSetting(key.to_string()))
}

impl PipelineConfig {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    pub fn parallelism(&self) -> Result<Parallelism> {
        match self.workers {
            None => Ok(if self.parallel {
                Parallelism::AllCores
            } else {
                Parallelism::Serial
            }),
            Some(n) => Parallelism::from_workers(n),
        }
    }

    pub fn import_data_directory(&self) -> Result<&Path> {
        Ok(&require(&self.import_data, "import_data.output_data_directory")?.output_data_directory)
    }

    pub fn w2v_model_path(&self) -> Result<PathBuf> {
        let embed = require(&self.embed, "embed.output_data_directory")?;
        let w2v = require(&embed.w2v_embedding, "embed.w2v_embedding.f_db")?;
        Ok(embed.output_data_directory.join(&w2v.f_db))
    }

    pub fn score_db_path(&self) -> Result<PathBuf> {
        let score = require(&self.score, "score.f_db")?;
        Ok(score.output_data_directory.join(&score.f_db))
    }

    pub fn centroids_path(&self) -> Result<PathBuf> {
        let mc = require(&self.metacluster, "metacluster.f_centroids")?;
        Ok(mc.output_data_directory.join(&mc.f_centroids))
    }

    pub fn dispersion_path(&self) -> Result<PathBuf> {
        let post = require(&self.postprocessing, "postprocessing.output_data_directory")?;
        Ok(post.output_data_directory.join(DISPERSION_FILE))
    }
}

/// Source of pipeline settings, injected into every component that needs them
pub trait SettingsProvider {
    fn load(&self) -> Result<PipelineConfig>;
}

/// Settings read from a JSON file on every `load`
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SettingsProvider for JsonFileSettings {
    fn load(&self) -> Result<PipelineConfig> {
        if !self.path.exists() {
            return Err(Error::PathNotFound(self.path.clone()));
        }
        let contents = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", self.path.display(), e)))
    }
}

/// Settings held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub PipelineConfig);

impl SettingsProvider for StaticSettings {
    fn load(&self) -> Result<PipelineConfig> {
        Ok(self.0.clone())
    }
}
