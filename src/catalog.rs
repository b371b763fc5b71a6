use std::cmp::Ordering;

use log::{debug, error, info};

use crate::model::CatalogEntry;
use crate::sources::Source;
use crate::ui::images::ImageLoader;

/// The ordered set of games for one session. Replaced wholesale on rescan.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog in scan order, ordering by difficulty when asked to
    /// and when at least one entry is ranked.
    pub fn from_entries(mut entries: Vec<CatalogEntry>, sort_by_difficulty: bool) -> Self {
        if sort_by_difficulty && entries.iter().any(CatalogEntry::is_ranked) {
            // sort_by is stable, unranked entries keep scan order at the tail
            entries.sort_by(compare_difficulty);
        }
        Self { entries }
    }

    /// Scans `source`. A source that fails outright yields an empty catalog.
    pub fn scan(source: &dyn Source, sort_by_difficulty: bool) -> Self {
        match source.scan() {
            Ok(entries) => Self::from_entries(entries, sort_by_difficulty),
            Err(e) => {
                error!("catalog scan failed: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Number of pages for a grid holding `per_page` entries.
    pub fn pages(&self, per_page: usize) -> usize {
        if per_page == 0 {
            return 0;
        }
        self.entries.len().div_ceil(per_page)
    }

    /// Entries shown on `page`, possibly fewer than `per_page` on the last one.
    pub fn page(&self, page: usize, per_page: usize) -> &[CatalogEntry] {
        let start = page.saturating_mul(per_page).min(self.entries.len());
        let end = start.saturating_add(per_page).min(self.entries.len());
        &self.entries[start..end]
    }

    /// Loads every thumbnail and detail image, substituting the placeholder
    /// where loading fails. Safe to call again after `release_images`.
    pub fn load_images(&mut self, loader: &ImageLoader) {
        for entry in &mut self.entries {
            let thumbnail = loader.load_slot(&entry.thumbnail_source);
            let detail = if entry.detail_is_video {
                debug!("{}: detail is a video, showing a still placeholder", entry.dir.display());
                crate::model::ImageSlot::Placeholder
            } else {
                loader.load_slot(&entry.detail_source)
            };

            entry.detail_size = Some(loader.slot_size(&detail));
            entry.thumbnail = Some(thumbnail);
            entry.detail = Some(detail);
        }
        info!("Catalog: loaded images for {} entries", self.entries.len());
    }

    /// Drops all image handles, e.g. before the display is torn down.
    pub fn release_images(&mut self) {
        for entry in &mut self.entries {
            entry.release_images();
        }
    }
}

/// Ascending difficulty, with unranked entries after every ranked one.
fn compare_difficulty(a: &CatalogEntry, b: &CatalogEntry) -> Ordering {
    match (a.is_ranked(), b.is_ranked()) {
        (true, true) => a.difficulty.cmp(&b.difficulty),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryConfig, ImageSource};
    use std::fs;
    use std::path::PathBuf;

    fn entry(title: &str, difficulty: i32) -> CatalogEntry {
        let config = EntryConfig {
            title: title.to_string(),
            difficulty,
            ..EntryConfig::default()
        };
        CatalogEntry::new(PathBuf::from("/games").join(title), config).unwrap()
    }

    fn titles(catalog: &Catalog) -> Vec<&str> {
        catalog.entries().iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn difficulty_order_puts_unranked_last() {
        let catalog = Catalog::from_entries(
            vec![entry("u1", -1), entry("hard", 3), entry("u2", -1), entry("easy", 1), entry("mid", 2), entry("mid2", 2)],
            true,
        );
        assert_eq!(titles(&catalog), vec!["easy", "mid", "mid2", "hard", "u1", "u2"]);
    }

    #[test]
    fn unranked_catalog_keeps_scan_order() {
        let catalog = Catalog::from_entries(vec![entry("b", -1), entry("a", -1), entry("c", -1)], true);
        assert_eq!(titles(&catalog), vec!["b", "a", "c"]);
    }

    #[test]
    fn sorting_can_be_disabled() {
        let catalog = Catalog::from_entries(vec![entry("b", 3), entry("a", 1)], false);
        assert_eq!(titles(&catalog), vec!["b", "a"]);
    }

    #[test]
    fn paging() {
        let catalog = Catalog::from_entries((0..10).map(|i| entry(&i.to_string(), -1)).collect(), true);
        assert_eq!(catalog.pages(8), 2);
        assert_eq!(catalog.page(0, 8).len(), 8);
        assert_eq!(catalog.page(1, 8).len(), 2);
        assert_eq!(catalog.page(5, 8).len(), 0);
        assert_eq!(Catalog::default().pages(8), 0);
    }

    #[test]
    fn image_loading_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good");
        fs::create_dir_all(&good).unwrap();
        image::RgbaImage::new(40, 30).save(good.join("detail.png")).unwrap();

        let with_detail = EntryConfig {
            detail: ImageSource::File(PathBuf::from("detail.png")),
            thumbnail: ImageSource::File(PathBuf::from("missing.png")),
            ..EntryConfig::default()
        };
        let video = EntryConfig {
            detail: ImageSource::File(PathBuf::from("detail.png")),
            detail_is_video: true,
            ..EntryConfig::default()
        };
        let mut catalog = Catalog::from_entries(
            vec![
                CatalogEntry::new(good.clone(), with_detail).unwrap(),
                CatalogEntry::new(good, video).unwrap(),
            ],
            true,
        );
        assert!(catalog.entries().iter().all(|e| !e.images_loaded()));

        let loader = ImageLoader::new();
        let snapshot = |c: &Catalog| -> Vec<(bool, bool, Option<(u32, u32)>)> {
            c.entries()
                .iter()
                .map(|e| {
                    (
                        e.thumbnail.as_ref().is_some_and(|s| s.is_loaded()),
                        e.detail.as_ref().is_some_and(|s| s.is_loaded()),
                        e.detail_size,
                    )
                })
                .collect()
        };

        catalog.load_images(&loader);
        let first = snapshot(&catalog);
        catalog.load_images(&loader);
        assert_eq!(first, snapshot(&catalog));
        assert_eq!(first[0], (false, true, Some((40, 30))));
        assert_eq!(first[1], (false, false, Some(loader.placeholder_size())));

        catalog.release_images();
        assert!(catalog.entries().iter().all(|e| !e.images_loaded() && e.detail_size.is_none()));
        catalog.load_images(&loader);
        assert_eq!(first, snapshot(&catalog));
    }
}
