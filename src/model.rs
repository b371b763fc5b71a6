use std::path::{Component, Path, PathBuf};
use tiny_skia::Pixmap;

pub const TITLE_UNSPECIFIED: &str = "title unspecified";
pub const VERSION_UNKNOWN: &str = "unknown";
pub const DESCRIPTION_UNSPECIFIED: &str = "description is not available";
pub const DEFAULT_EXECUTABLE: &str = "autorun.exe";
pub const CONVENTIONAL_ICON: &str = "icon.png";
pub const CONVENTIONAL_DETAIL: &str = "detail.png";
pub const UNRANKED: i32 = -1;
pub const UNRANKED_LABEL: &str = "Unranked";

/// Where an entry's image comes from before it is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Placeholder,
    File(PathBuf),
}

/// A loaded image. `Placeholder` stands in for anything that failed to load.
#[derive(Clone)]
pub enum ImageSlot {
    Loaded(Pixmap),
    Placeholder,
}

impl std::fmt::Debug for ImageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSlot::Loaded(p) => write!(f, "Loaded({}x{})", p.width(), p.height()),
            ImageSlot::Placeholder => f.write_str("Placeholder"),
        }
    }
}

impl ImageSlot {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ImageSlot::Loaded(_))
    }
}

/// Fully-defaulted field set an entry is built from.
#[derive(Debug, Clone)]
pub struct EntryConfig {
    pub title: String,
    pub version: String,
    pub description: String,
    pub executable: PathBuf,
    pub thumbnail: ImageSource,
    pub detail: ImageSource,
    pub detail_is_video: bool,
    pub difficulty: i32,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            title: TITLE_UNSPECIFIED.to_string(),
            version: VERSION_UNKNOWN.to_string(),
            description: DESCRIPTION_UNSPECIFIED.to_string(),
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            thumbnail: ImageSource::Placeholder,
            detail: ImageSource::Placeholder,
            detail_is_video: false,
            difficulty: UNRANKED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub dir: PathBuf,
    pub title: String,
    pub version: String,
    pub description: String,
    /// Always inside `dir`.
    pub executable: PathBuf,
    pub thumbnail_source: ImageSource,
    pub detail_source: ImageSource,
    pub detail_is_video: bool,
    pub difficulty: i32,
    // Populated by `Catalog::load_images` only.
    pub thumbnail: Option<ImageSlot>,
    pub detail: Option<ImageSlot>,
    pub detail_size: Option<(u32, u32)>,
}

impl CatalogEntry {
    /// Builds an entry rooted at `dir`. Returns `None` when the executable
    /// would resolve outside of `dir`.
    pub fn new(dir: PathBuf, config: EntryConfig) -> Option<Self> {
        let executable = anchor(&dir, &config.executable)?;
        let thumbnail_source = anchor_image(&dir, config.thumbnail);
        let detail_source = anchor_image(&dir, config.detail);

        Some(Self {
            dir,
            title: config.title,
            version: config.version,
            description: config.description,
            executable,
            thumbnail_source,
            detail_source,
            detail_is_video: config.detail_is_video,
            difficulty: config.difficulty,
            thumbnail: None,
            detail: None,
            detail_size: None,
        })
    }

    pub fn is_ranked(&self) -> bool {
        self.difficulty >= 0
    }

    pub fn images_loaded(&self) -> bool {
        self.thumbnail.is_some() && self.detail.is_some()
    }

    pub fn release_images(&mut self) {
        self.thumbnail = None;
        self.detail = None;
        self.detail_size = None;
    }
}

fn anchor_image(dir: &Path, source: ImageSource) -> ImageSource {
    match source {
        ImageSource::Placeholder => ImageSource::Placeholder,
        ImageSource::File(rel) => match anchor(dir, &rel) {
            Some(path) => ImageSource::File(path),
            None => {
                log::warn!("{}: image {:?} points outside the entry directory", dir.display(), rel);
                ImageSource::Placeholder
            }
        },
    }
}

/// Joins `rel` onto `dir` and normalizes it lexically, refusing anything that
/// would leave `dir` (absolute paths, prefixes, or `..` past the root).
pub fn anchor(dir: &Path, rel: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }

    let mut path = dir.to_path_buf();
    path.extend(parts);
    Some(path)
}

/// Display name for a difficulty rank; never indexes out of the table.
pub fn difficulty_label(rank: i32, labels: &[String]) -> &str {
    usize::try_from(rank)
        .ok()
        .and_then(|i| labels.get(i))
        .map(String::as_str)
        .unwrap_or(UNRANKED_LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_keeps_paths_inside_dir() {
        let dir = Path::new("/games/puzzle");
        assert_eq!(anchor(dir, Path::new("bin/run.exe")), Some(dir.join("bin/run.exe")));
        assert_eq!(anchor(dir, Path::new("./bin/../run.exe")), Some(dir.join("run.exe")));
        assert_eq!(anchor(dir, Path::new("../other/run.exe")), None);
        assert_eq!(anchor(dir, Path::new("/usr/bin/sh")), None);
        assert_eq!(anchor(dir, Path::new(".")), None);
    }

    #[test]
    fn entry_rejects_escaping_executable() {
        let config = EntryConfig {
            executable: PathBuf::from("../../bin/sh"),
            ..EntryConfig::default()
        };
        assert!(CatalogEntry::new(PathBuf::from("/games/a"), config).is_none());
    }

    #[test]
    fn escaping_image_falls_back_to_placeholder() {
        let config = EntryConfig {
            thumbnail: ImageSource::File(PathBuf::from("../secret.png")),
            detail: ImageSource::File(PathBuf::from("shots/detail.png")),
            ..EntryConfig::default()
        };
        let entry = CatalogEntry::new(PathBuf::from("/games/a"), config).unwrap();
        assert_eq!(entry.thumbnail_source, ImageSource::Placeholder);
        assert_eq!(entry.detail_source, ImageSource::File(PathBuf::from("/games/a/shots/detail.png")));
        assert_eq!(entry.executable, PathBuf::from("/games/a/autorun.exe"));
        assert!(!entry.images_loaded());
    }

    #[test]
    fn unranked_label_never_indexes() {
        let labels = vec!["Easy".to_string(), "Hard".to_string()];
        assert_eq!(difficulty_label(-1, &labels), UNRANKED_LABEL);
        assert_eq!(difficulty_label(1, &labels), "Hard");
        assert_eq!(difficulty_label(7, &labels), UNRANKED_LABEL);
        assert_eq!(difficulty_label(0, &[]), UNRANKED_LABEL);
    }
}
