use tiny_skia::{Paint, Color, Rect, Transform, PixmapMut, PixmapPaint, PathBuilder, Stroke, Pixmap};
use cosmic_text::{Attrs, Buffer, FontSystem, Metrics, SwashCache};
use crate::config::ThemeConfig;
use crate::executor::LaunchOutcome;
use crate::model::{difficulty_label, CatalogEntry, ImageSlot};
use crate::state::{Phase, RenderView, Report, PULSE_DURATION};
use crate::ui::layout::PageZone;

struct Palette {
    background: Color,
    tile: Color,
    text: Color,
    accent: Color,
    dim: Color,
}

impl Palette {
    fn new(theme: &ThemeConfig) -> Self {
        Self {
            background: ThemeConfig::parse_color(&theme.background),
            tile: ThemeConfig::parse_color(&theme.tile_background),
            text: ThemeConfig::parse_color(&theme.text),
            accent: ThemeConfig::parse_color(&theme.accent),
            dim: ThemeConfig::parse_color(&theme.dim_text),
        }
    }
}

/// Draws a [`RenderView`]. Holds the font state, so it is dropped and
/// rebuilt whenever the display goes away.
pub struct Renderer {
    font_system: FontSystem,
    swash_cache: SwashCache,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            font_system: FontSystem::new(),
            swash_cache: SwashCache::new(),
        }
    }

    pub fn draw(&mut self, pixmap: &mut PixmapMut, view: &RenderView) {
        let palette = Palette::new(view.theme);
        pixmap.fill(palette.background);

        match view.phase {
            Phase::Browsing => self.draw_browser(pixmap, view, &palette),
            Phase::Report(report) => self.draw_report(pixmap, report, view.report_ready, &palette),
        }
    }

    fn draw_browser(&mut self, pixmap: &mut PixmapMut, view: &RenderView, palette: &Palette) {
        let layout = view.layout;
        let theme = view.theme;

        if view.page_entries.is_empty() {
            self.draw_text(pixmap, "No games installed", layout.margin * 3.0, layout.margin * 3.0, 18.0, palette.dim);
            return;
        }

        for (i, entry) in view.page_entries.iter().enumerate() {
            let row = i / layout.cols;
            let col = i % layout.cols;
            let Some(rect) = layout.tile_rect(row, col) else { continue };
            let selected = row == view.cursor.row && col == view.cursor.col;

            let rect = if selected { pulse(rect, view) } else { rect };
            self.draw_rounded_rect(pixmap, rect, theme.border_radius, palette.tile, None);
            let image = entry.thumbnail.as_ref().and_then(|slot| slot_pixmap(slot, view.placeholder));
            if let Some(image) = image {
                draw_scaled(pixmap, image, rect, false);
            }
            if selected {
                self.draw_rounded_rect(pixmap, rect, theme.border_radius, Color::TRANSPARENT, Some(palette.accent));
            }
        }

        for (zone, label, visible) in [
            (PageZone::Back, "<", view.page > 0),
            (PageZone::Forward, ">", view.page + 1 < view.pages),
        ] {
            if let (true, Some(r)) = (visible, layout.zone_rect(zone)) {
                let y = r.top() + r.height() / 2.0 - 12.0;
                self.draw_text(pixmap, label, r.left() + r.width() / 2.0 - 6.0, y, 24.0, palette.accent);
            }
        }

        if let Some(r) = layout.detail_rect() {
            let page_text = format!("{}/{}", view.page + 1, view.pages);
            self.draw_text(pixmap, &page_text, r.right() - 48.0, r.top() - layout.margin - 14.0, 14.0, palette.dim);
            if let Some(entry) = view.selected {
                self.draw_details(pixmap, entry, r, view, palette);
            }
        }
    }

    fn draw_details(&mut self, pixmap: &mut PixmapMut, entry: &CatalogEntry, area: Rect, view: &RenderView, palette: &Palette) {
        let mut text_x = area.left();

        // detail image on the left, aspect preserved
        if let (Some(slot), Some((w, h))) = (entry.detail.as_ref(), entry.detail_size) {
            if let Some(image) = slot_pixmap(slot, view.placeholder) {
                let max_h = area.height();
                let max_w = area.width() * 0.4;
                let scale = (max_w / w.max(1) as f32).min(max_h / h.max(1) as f32);
                let (dw, dh) = (w as f32 * scale, h as f32 * scale);
                if let Some(target) = Rect::from_xywh(area.left(), area.top(), dw, dh) {
                    draw_scaled(pixmap, image, target, true);
                    text_x += dw + view.layout.margin;
                }
            }
        }

        let difficulty = difficulty_label(entry.difficulty, &view.theme.difficulty_labels);
        let mut y = area.top();
        self.draw_text(pixmap, &entry.title, text_x, y, 20.0, palette.text);
        y += 26.0;
        let meta = if entry.detail_is_video {
            format!("ver. {}  |  {}  |  video preview", entry.version, difficulty)
        } else {
            format!("ver. {}  |  {}", entry.version, difficulty)
        };
        self.draw_text(pixmap, &meta, text_x, y, 13.0, palette.dim);
        y += 22.0;
        self.draw_text(pixmap, &entry.description, text_x, y, 14.0, palette.text);
    }

    fn draw_report(&mut self, pixmap: &mut PixmapMut, report: &Report, ready: bool, palette: &Palette) {
        match &report.outcome {
            LaunchOutcome::Failed(failure) => {
                self.draw_text(pixmap, "An error occurred while starting the game.", 16.0, 16.0, 16.0, palette.accent);
                self.draw_text(pixmap, "Please let a staff member know.", 16.0, 40.0, 16.0, palette.text);
                let detail = format!("{}  |  exit code: -1  |  error: {} ({})", report.dir.display(), failure.kind(), failure.code());
                self.draw_text(pixmap, &detail, 16.0, 72.0, 13.0, palette.dim);
                self.draw_text(pixmap, &failure.to_string(), 16.0, 92.0, 13.0, palette.dim);
                self.draw_text(pixmap, "Press Enter to return to the menu.", 16.0, 124.0, 14.0, palette.text);
            }
            LaunchOutcome::Exited(code) => {
                self.draw_text(pixmap, "The game has ended. Please hand over to the next person.", 16.0, 16.0, 16.0, palette.text);
                let detail = format!("{}  |  exit code: {}", report.title, code);
                self.draw_text(pixmap, &detail, 16.0, 40.0, 13.0, palette.dim);
                if ready {
                    self.draw_text(pixmap, "Press any key to continue.", 16.0, 72.0, 16.0, palette.accent);
                }
            }
        }
    }

    fn draw_rounded_rect(&self, pixmap: &mut PixmapMut, rect: Rect, radius: f32, fill: Color, stroke: Option<Color>) {
        let mut pb = PathBuilder::new();
        let x = rect.left();
        let y = rect.top();
        let w = rect.width();
        let h = rect.height();
        let radius = radius.min(w / 2.0).min(h / 2.0);

        pb.move_to(x + radius, y);
        pb.line_to(x + w - radius, y);
        pb.quad_to(x + w, y, x + w, y + radius);
        pb.line_to(x + w, y + h - radius);
        pb.quad_to(x + w, y + h, x + w - radius, y + h);
        pb.line_to(x + radius, y + h);
        pb.quad_to(x, y + h, x, y + h - radius);
        pb.line_to(x, y + radius);
        pb.quad_to(x, y, x + radius, y);
        pb.close();

        if let Some(path) = pb.finish() {
            let mut paint = Paint::default();
            paint.set_color(fill);
            paint.anti_alias = true;
            pixmap.fill_path(&path, &paint, tiny_skia::FillRule::Winding, Transform::identity(), None);

            if let Some(s_color) = stroke {
                let mut s_paint = Paint::default();
                s_paint.set_color(s_color);
                s_paint.anti_alias = true;
                let stroke_obj = Stroke { width: 3.0, ..Default::default() };
                pixmap.stroke_path(&path, &s_paint, &stroke_obj, Transform::identity(), None);
            }
        }
    }

    fn draw_text(&mut self, pixmap: &mut PixmapMut, text: &str, x: f32, y: f32, size: f32, color: Color) {
        let mut buffer = Buffer::new(&mut self.font_system, Metrics::new(size, size * 1.2));
        buffer.set_size(&mut self.font_system, Some(pixmap.width() as f32 - x), None);
        buffer.set_text(&mut self.font_system, text, Attrs::new(), cosmic_text::Shaping::Advanced);
        buffer.shape_until_scroll(&mut self.font_system, false);

        let text_color = cosmic_text::Color::rgba(
            (color.red() * 255.0) as u8,
            (color.green() * 255.0) as u8,
            (color.blue() * 255.0) as u8,
            (color.alpha() * 255.0) as u8,
        );

        buffer.draw(&mut self.font_system, &mut self.swash_cache, text_color, |draw_x, draw_y, w, h, color| {
            let draw_x = draw_x + x as i32;
            let draw_y = draw_y + y as i32;
            if w == 0 || h == 0 { return; }
            if draw_x >= 0 && draw_y >= 0 && draw_x < pixmap.width() as i32 && draw_y < pixmap.height() as i32 {
                 let paint = Paint {
                    shader: tiny_skia::Shader::SolidColor(tiny_skia::Color::from_rgba8(color.r(), color.g(), color.b(), color.a())),
                    ..Paint::default()
                };
                let rect = Rect::from_xywh(draw_x as f32, draw_y as f32, w as f32, h as f32);
                if let Some(r) = rect {
                    pixmap.fill_rect(r, &paint, Transform::identity(), None);
                }
            }
        });
    }
}

fn slot_pixmap<'a>(slot: &'a ImageSlot, placeholder: Option<&'a Pixmap>) -> Option<&'a Pixmap> {
    match slot {
        ImageSlot::Loaded(p) => Some(p),
        ImageSlot::Placeholder => placeholder,
    }
}

/// Grows the selected tile slightly and eases it back after a selection change.
fn pulse(rect: Rect, view: &RenderView) -> Rect {
    let t = (view.selection_age.as_secs_f32() / PULSE_DURATION.as_secs_f32()).clamp(0.0, 1.0);
    let eased = 1.0 - (1.0 - t) * (1.0 - t);
    let scale = 1.0 + 0.1 * (1.0 - eased) + 0.04;
    let (w, h) = (rect.width() * scale, rect.height() * scale);
    let cx = rect.left() + rect.width() / 2.0;
    let cy = rect.top() + rect.height() / 2.0;
    Rect::from_xywh(cx - w / 2.0, cy - h / 2.0, w, h).unwrap_or(rect)
}

/// Draws `image` into `target`, stretched or letterboxed.
fn draw_scaled(pixmap: &mut PixmapMut, image: &Pixmap, target: Rect, keep_aspect: bool) {
    let sx = target.width() / image.width() as f32;
    let sy = target.height() / image.height() as f32;
    let (sx, sy, ox, oy) = if keep_aspect {
        let s = sx.min(sy);
        let ox = (target.width() - image.width() as f32 * s) / 2.0;
        let oy = (target.height() - image.height() as f32 * s) / 2.0;
        (s, s, ox, oy)
    } else {
        (sx, sy, 0.0, 0.0)
    };
    let transform = Transform::from_row(sx, 0.0, 0.0, sy, target.left() + ox, target.top() + oy);
    let paint = PixmapPaint {
        quality: tiny_skia::FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    pixmap.draw_pixmap(0, 0, image.as_ref(), &paint, transform, None);
}
