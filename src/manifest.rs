use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::{EntryConfig, ImageSource, CONVENTIONAL_DETAIL, CONVENTIONAL_ICON};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("no {name} in {dir}")]
    Missing { dir: PathBuf, name: String },
    #[error("could not read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed manifest {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("executable of {dir} resolves outside the directory")]
    ExecutableOutsideDir { dir: PathBuf },
}

/// On-disk descriptor of one game directory. Every key is optional, and a
/// key whose value has the wrong type is treated as absent.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Manifest {
    #[serde(deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub version: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub executable: Option<PathBuf>,
    #[serde(deserialize_with = "lenient")]
    pub icon: Option<PathBuf>,
    #[serde(deserialize_with = "lenient")]
    pub detail: Option<DetailSpec>,
    #[serde(deserialize_with = "lenient")]
    pub difficulty: Option<i32>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct DetailSpec {
    #[serde(deserialize_with = "lenient")]
    pub file: Option<PathBuf>,
    #[serde(deserialize_with = "lenient")]
    pub is_movie: Option<bool>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            log::warn!("ignoring manifest field: {}", e);
            Ok(None)
        }
    }
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(dir: &Path, name: &str) -> Result<Self, ManifestError> {
        let path = dir.join(name);
        if !path.is_file() {
            return Err(ManifestError::Missing {
                dir: dir.to_path_buf(),
                name: name.to_string(),
            });
        }
        let text = fs::read_to_string(&path).map_err(|source| ManifestError::Unreadable {
            path: path.clone(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ManifestError::Malformed { path, source })
    }

    /// Applies manifest values over the defaults, field by field. `dir` is
    /// consulted for conventional image names when no image is declared.
    pub fn into_entry_config(self, dir: &Path) -> EntryConfig {
        let mut config = EntryConfig::default();
        if let Some(title) = self.title {
            config.title = title;
        }
        if let Some(version) = self.version {
            config.version = version;
        }
        if let Some(description) = self.description {
            config.description = description;
        }
        if let Some(executable) = self.executable {
            config.executable = executable;
        }
        if let Some(difficulty) = self.difficulty {
            config.difficulty = difficulty;
        }

        config.thumbnail = image_source(dir, self.icon, CONVENTIONAL_ICON);
        let detail = self.detail.unwrap_or_default();
        config.detail = image_source(dir, detail.file, CONVENTIONAL_DETAIL);
        config.detail_is_video = detail.is_movie.unwrap_or(false);
        config
    }
}

fn image_source(dir: &Path, declared: Option<PathBuf>, conventional: &str) -> ImageSource {
    match declared {
        Some(path) => ImageSource::File(path),
        None if dir.join(conventional).is_file() => ImageSource::File(PathBuf::from(conventional)),
        None => ImageSource::Placeholder,
    }
}
