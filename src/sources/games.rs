use crate::manifest::{Manifest, ManifestError};
use crate::model::CatalogEntry;
use crate::sources::Source;
use anyhow::{bail, Result};
use log::{debug, error, info, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Discovers game directories below `root`, one manifest per directory.
pub struct GameDirSource {
    root: PathBuf,
    manifest_name: String,
    skip: Vec<Regex>,
}

impl GameDirSource {
    pub fn new(root: impl Into<PathBuf>, manifest_name: impl Into<String>, skip_patterns: &[String]) -> Self {
        let skip = skip_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("ignoring skip pattern {:?}: {}", pattern, e);
                    None
                }
            })
            .collect();

        Self {
            root: root.into(),
            manifest_name: manifest_name.into(),
            skip,
        }
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() || self.skip.is_empty() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        self.skip.iter().any(|re| re.is_match(&name))
    }

    fn load_entry(&self, dir: &Path) -> Result<CatalogEntry, ManifestError> {
        let manifest = Manifest::load(dir, &self.manifest_name)?;
        let config = manifest.into_entry_config(dir);
        CatalogEntry::new(dir.to_path_buf(), config)
            .ok_or_else(|| ManifestError::ExecutableOutsideDir { dir: dir.to_path_buf() })
    }
}

impl Source for GameDirSource {
    fn scan(&self) -> Result<Vec<CatalogEntry>> {
        if !self.root.is_dir() {
            bail!("games directory {} does not exist", self.root.display());
        }

        let mut entries = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_skipped(e));

        for item in walker {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    error!("while scanning {}: {}", self.root.display(), e);
                    continue;
                }
            };
            if !item.file_type().is_dir() {
                continue;
            }

            debug!("Scanning game directory {:?}", item.path());
            match self.load_entry(item.path()) {
                Ok(entry) => entries.push(entry),
                Err(e @ ManifestError::Missing { .. }) => warn!("{}", e),
                Err(e) => error!("{}", e),
            }
        }

        info!("GameDirSource: found {} entries in {}", entries.len(), self.root.display());
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn game(root: &Path, name: &str, manifest: Option<&str>) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        if let Some(text) = manifest {
            fs::write(dir.join("settings.json"), text).unwrap();
        }
        dir
    }

    #[test]
    fn bad_sibling_does_not_stop_the_scan() {
        let root = tempfile::tempdir().unwrap();
        game(root.path(), "a", Some(r#"{ "title": "Alpha" }"#));
        game(root.path(), "b", Some("{ not json"));
        game(root.path(), "c", None);
        game(root.path(), "d", Some(r#"{ "title": "Delta", "executable": "../a/autorun.exe" }"#));
        game(root.path(), "e", Some(r#"{ "title": "Echo" }"#));

        let source = GameDirSource::new(root.path(), "settings.json", &[]);
        let titles: Vec<String> = source.scan().unwrap().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Alpha", "Echo"]);
    }

    #[test]
    fn scan_is_recursive_and_ordered() {
        let root = tempfile::tempdir().unwrap();
        game(root.path(), "zeta", Some(r#"{ "title": "Zeta" }"#));
        game(root.path(), "group/beta", Some(r#"{ "title": "Beta" }"#));
        game(root.path(), "alpha", Some(r#"{ "title": "Alpha" }"#));

        let source = GameDirSource::new(root.path(), "settings.json", &[]);
        let entries = source.scan().unwrap();
        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Beta", "Zeta"]);
        assert_eq!(entries[1].dir, root.path().join("group/beta"));
        assert_eq!(entries[1].executable, root.path().join("group/beta/autorun.exe"));
    }

    #[test]
    fn skip_patterns_prune_directories() {
        let root = tempfile::tempdir().unwrap();
        game(root.path(), "keep", Some(r#"{ "title": "Keep" }"#));
        game(root.path(), ".cache/hidden", Some(r#"{ "title": "Hidden" }"#));
        game(root.path(), "keep/assets", Some(r#"{ "title": "Assets" }"#));

        let patterns = vec![r"^\.".to_string(), "^assets$".to_string(), "(".to_string()];
        let source = GameDirSource::new(root.path(), "settings.json", &patterns);
        let titles: Vec<String> = source.scan().unwrap().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Keep"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let source = GameDirSource::new(root.path().join("nope"), "settings.json", &[]);
        assert!(source.scan().is_err());
    }
}
