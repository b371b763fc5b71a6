use tiny_skia::Rect;

use crate::config::ThemeConfig;

/// Which page hot-zone a point falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageZone {
    Back,
    Forward,
}

/// Screen geometry of the tile grid, the detail panel and the paging arrows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub width: f32,
    pub height: f32,
    pub rows: usize,
    pub cols: usize,
    pub margin: f32,
    pub tile_width: f32,
    pub tile_height: f32,
    grid_bottom: f32,
}

impl GridLayout {
    pub fn new(theme: &ThemeConfig, rows: usize, cols: usize, width: u32, height: u32) -> Self {
        let width = width.max(1) as f32;
        let height = height.max(1) as f32;
        let grid_bottom = (height * theme.grid_share.clamp(0.1, 1.0)).max(theme.margin * 2.0 + 1.0);
        Self {
            width,
            height,
            rows: rows.max(1),
            cols: cols.max(1),
            margin: theme.margin,
            tile_width: theme.tile_width,
            tile_height: theme.tile_height,
            grid_bottom,
        }
    }

    fn zone_width(&self) -> f32 {
        self.margin * 2.0 + 12.0
    }

    fn grid_area(&self) -> (f32, f32, f32, f32) {
        let left = self.zone_width();
        let top = self.margin;
        let w = (self.width - 2.0 * left).max(1.0);
        let h = (self.grid_bottom - top - self.margin).max(1.0);
        (left, top, w, h)
    }

    fn cell_size(&self) -> (f32, f32) {
        let (_, _, w, h) = self.grid_area();
        (w / self.cols as f32, h / self.rows as f32)
    }

    /// Rectangle a tile is drawn into; the tile keeps its configured size
    /// unless the cell is smaller.
    pub fn tile_rect(&self, row: usize, col: usize) -> Option<Rect> {
        let (left, top, _, _) = self.grid_area();
        let (cw, ch) = self.cell_size();
        let tw = self.tile_width.min(cw - 4.0).max(1.0);
        let th = self.tile_height.min(ch - 4.0).max(1.0);
        let x = left + col as f32 * cw + (cw - tw) / 2.0;
        let y = top + row as f32 * ch + (ch - th) / 2.0;
        Rect::from_xywh(x, y, tw, th)
    }

    /// Grid cell under a point, whether or not it holds an entry.
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (x, y) = (x as f32, y as f32);
        for row in 0..self.rows {
            for col in 0..self.cols {
                if let Some(rect) = self.tile_rect(row, col) {
                    if x >= rect.left() && x < rect.right() && y >= rect.top() && y < rect.bottom() {
                        return Some((row, col));
                    }
                }
            }
        }
        None
    }

    pub fn zone_rect(&self, zone: PageZone) -> Option<Rect> {
        let (_, top, _, h) = self.grid_area();
        let x = match zone {
            PageZone::Back => 0.0,
            PageZone::Forward => self.width - self.zone_width(),
        };
        Rect::from_xywh(x, top, self.zone_width(), h)
    }

    pub fn zone_at(&self, x: f64, y: f64) -> Option<PageZone> {
        let (x, y) = (x as f32, y as f32);
        [PageZone::Back, PageZone::Forward].into_iter().find(|&zone| {
            self.zone_rect(zone).is_some_and(|r| {
                x >= r.left() && x < r.right() && y >= r.top() && y < r.bottom()
            })
        })
    }

    /// Area below the grid for the selected entry's details.
    pub fn detail_rect(&self) -> Option<Rect> {
        let top = self.grid_bottom;
        Rect::from_xywh(
            self.margin,
            top,
            (self.width - 2.0 * self.margin).max(1.0),
            (self.height - top - self.margin).max(1.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> GridLayout {
        GridLayout::new(&ThemeConfig::default(), 3, 4, 640, 480)
    }

    #[test]
    fn tile_centres_hit_their_cell() {
        let l = layout();
        for row in 0..3 {
            for col in 0..4 {
                let r = l.tile_rect(row, col).unwrap();
                let (cx, cy) = (r.left() + r.width() / 2.0, r.top() + r.height() / 2.0);
                assert_eq!(l.cell_at(cx as f64, cy as f64), Some((row, col)));
            }
        }
    }

    #[test]
    fn outside_the_grid_hits_nothing() {
        let l = layout();
        assert_eq!(l.cell_at(1.0, 1.0), None);
        assert_eq!(l.cell_at(320.0, 470.0), None);
    }

    #[test]
    fn hot_zones_sit_at_the_edges() {
        let l = layout();
        let mid = (l.margin + 20.0) as f64;
        assert_eq!(l.zone_at(2.0, mid), Some(PageZone::Back));
        assert_eq!(l.zone_at(638.0, mid), Some(PageZone::Forward));
        assert_eq!(l.zone_at(320.0, mid), None);
    }
}
