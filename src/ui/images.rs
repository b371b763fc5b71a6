use std::fs;
use std::path::{Path, PathBuf};
use image::ImageReader;
use thiserror::Error;
use tiny_skia::{Color, Pixmap, Transform};

use crate::model::{ImageSlot, ImageSource};

const PLACEHOLDER_SVG: &[u8] = include_bytes!("../../assets/placeholder.svg");
const PLACEHOLDER_SIZE: (u32, u32) = (256, 192);

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("{0} does not exist")]
    Missing(PathBuf),
    #[error("could not decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not render {path}: {reason}")]
    Svg { path: PathBuf, reason: String },
    #[error("{0} has no pixels")]
    Empty(PathBuf),
}

/// Decodes entry images into premultiplied pixmaps and owns the bundled
/// placeholder substituted for anything that fails.
pub struct ImageLoader {
    placeholder: Option<Pixmap>,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoader {
    pub fn new() -> Self {
        Self { placeholder: render_placeholder() }
    }

    pub fn placeholder(&self) -> Option<&Pixmap> {
        self.placeholder.as_ref()
    }

    pub fn placeholder_size(&self) -> (u32, u32) {
        self.placeholder
            .as_ref()
            .map(|p| (p.width(), p.height()))
            .unwrap_or(PLACEHOLDER_SIZE)
    }

    /// Loads `source`, logging and substituting the placeholder on failure.
    pub fn load_slot(&self, source: &ImageSource) -> ImageSlot {
        match source {
            ImageSource::Placeholder => ImageSlot::Placeholder,
            ImageSource::File(path) => match self.load(path) {
                Ok(pixmap) => ImageSlot::Loaded(pixmap),
                Err(e) => {
                    log::error!("{}", e);
                    ImageSlot::Placeholder
                }
            },
        }
    }

    /// Pixel dimensions a slot will be drawn with.
    pub fn slot_size(&self, slot: &ImageSlot) -> (u32, u32) {
        match slot {
            ImageSlot::Loaded(p) => (p.width(), p.height()),
            ImageSlot::Placeholder => self.placeholder_size(),
        }
    }

    pub fn load(&self, path: &Path) -> Result<Pixmap, ImageError> {
        if !path.is_file() {
            return Err(ImageError::Missing(path.to_path_buf()));
        }
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        if ext.eq_ignore_ascii_case("svg") {
            load_svg(path)
        } else {
            load_raster(path)
        }
    }
}

fn load_raster(path: &Path) -> Result<Pixmap, ImageError> {
    let decode = |source| ImageError::Decode { path: path.to_path_buf(), source };
    let img = ImageReader::open(path)
        .map_err(|source| ImageError::Io { path: path.to_path_buf(), source })?
        .with_guessed_format()
        .map_err(|source| ImageError::Io { path: path.to_path_buf(), source })?
        .decode()
        .map_err(decode)?;
    let mut rgba = img.into_rgba8();

    for pixel in rgba.chunks_exact_mut(4) {
        let a = pixel[3] as f32 / 255.0;
        pixel[0] = (pixel[0] as f32 * a) as u8;
        pixel[1] = (pixel[1] as f32 * a) as u8;
        pixel[2] = (pixel[2] as f32 * a) as u8;
    }

    let width = rgba.width();
    let height = rgba.height();
    let size = tiny_skia::IntSize::from_wh(width, height)
        .ok_or_else(|| ImageError::Empty(path.to_path_buf()))?;
    Pixmap::from_vec(rgba.into_vec(), size).ok_or_else(|| ImageError::Empty(path.to_path_buf()))
}

fn load_svg(path: &Path) -> Result<Pixmap, ImageError> {
    let data = fs::read(path).map_err(|source| ImageError::Io { path: path.to_path_buf(), source })?;
    render_svg(&data, None).map_err(|reason| ImageError::Svg { path: path.to_path_buf(), reason })
}

fn render_svg(data: &[u8], size: Option<(u32, u32)>) -> Result<Pixmap, String> {
    let opt = resvg::usvg::Options::default();
    let tree = resvg::usvg::Tree::from_data(data, &opt).map_err(|e| e.to_string())?;

    let natural = tree.size();
    let (width, height) = size.unwrap_or((natural.width().ceil() as u32, natural.height().ceil() as u32));
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| "zero-sized image".to_string())?;
    let transform = Transform::from_scale(
        width as f32 / natural.width(),
        height as f32 / natural.height(),
    );

    resvg::render(&tree, transform, &mut pixmap.as_mut());
    Ok(pixmap)
}

fn render_placeholder() -> Option<Pixmap> {
    match render_svg(PLACEHOLDER_SVG, Some(PLACEHOLDER_SIZE)) {
        Ok(pixmap) => Some(pixmap),
        Err(e) => {
            log::error!("bundled placeholder failed to render: {}", e);
            let mut pixmap = Pixmap::new(PLACEHOLDER_SIZE.0, PLACEHOLDER_SIZE.1)?;
            pixmap.fill(Color::from_rgba8(42, 42, 58, 255));
            Some(pixmap)
        }
    }
}
