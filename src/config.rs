use serde::Deserialize;
use std::path::{Path, PathBuf};
use directories::ProjectDirs;
use anyhow::{Context, Result};
use std::fs;
use tiny_skia::Color;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_games_dir")]
    pub games_dir: PathBuf,
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,
    #[serde(default = "default_address_file")]
    pub address_file: PathBuf,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_true")]
    pub sort_by_difficulty: bool,
    /// Regexes matched against directory names; matches are not descended.
    #[serde(default)]
    pub skip_dirs: Vec<String>,
    #[serde(default = "default_report_delay_ms")]
    pub report_delay_ms: u64,
}

fn default_games_dir() -> PathBuf { PathBuf::from("Games") }
fn default_manifest_name() -> String { "settings.json".to_string() }
fn default_address_file() -> PathBuf { PathBuf::from("address.txt") }
fn default_log_file() -> PathBuf { PathBuf::from("error.txt") }
fn default_true() -> bool { true }
fn default_report_delay_ms() -> u64 { 2000 }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            games_dir: default_games_dir(),
            manifest_name: default_manifest_name(),
            address_file: default_address_file(),
            log_file: default_log_file(),
            sort_by_difficulty: true,
            skip_dirs: Vec::new(),
            report_delay_ms: default_report_delay_ms(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct InputConfig {
    #[serde(default = "default_hold_threshold")]
    pub hold_threshold: u32,
    #[serde(default = "default_repeat_period")]
    pub repeat_period: u32,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default = "default_gamepad_device")]
    pub gamepad_device: PathBuf,
    #[serde(default)]
    pub pad_confirm: u8,
    #[serde(default = "default_pad_back")]
    pub pad_back: u8,
    #[serde(default = "default_axis_threshold")]
    pub axis_threshold: i16,
}

fn default_hold_threshold() -> u32 { 30 }
fn default_repeat_period() -> u32 { 3 }
fn default_frame_rate() -> u32 { 60 }
fn default_gamepad_device() -> PathBuf { PathBuf::from("/dev/input/js0") }
fn default_pad_back() -> u8 { 1 }
fn default_axis_threshold() -> i16 { 16384 }

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            hold_threshold: default_hold_threshold(),
            repeat_period: default_repeat_period(),
            frame_rate: default_frame_rate(),
            gamepad_device: default_gamepad_device(),
            pad_confirm: 0,
            pad_back: default_pad_back(),
            axis_threshold: default_axis_threshold(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct GridConfig {
    #[serde(default = "default_rows")]
    pub rows: usize,
    #[serde(default = "default_cols")]
    pub cols: usize,
}

fn default_rows() -> usize { 3 }
fn default_cols() -> usize { 4 }

impl Default for GridConfig {
    fn default() -> Self {
        Self { rows: default_rows(), cols: default_cols() }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ThemeConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub fullscreen: bool,
    #[serde(default = "default_tile_width")]
    pub tile_width: f32,
    #[serde(default = "default_tile_height")]
    pub tile_height: f32,
    #[serde(default = "default_margin")]
    pub margin: f32,
    /// Share of the window height given to the tile grid; the rest shows details.
    #[serde(default = "default_grid_share")]
    pub grid_share: f32,
    #[serde(default = "default_border_radius")]
    pub border_radius: f32,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_tile_background")]
    pub tile_background: String,
    #[serde(default = "default_text")]
    pub text: String,
    #[serde(default = "default_accent")]
    pub accent: String,
    #[serde(default = "default_dim_text")]
    pub dim_text: String,
    #[serde(default = "default_difficulty_labels")]
    pub difficulty_labels: Vec<String>,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_tile_width() -> f32 { 128.0 }
fn default_tile_height() -> f32 { 96.0 }
fn default_margin() -> f32 { 10.0 }
fn default_grid_share() -> f32 { 0.6 }
fn default_border_radius() -> f32 { 8.0 }
fn default_background() -> String { "101018ff".to_string() }
fn default_tile_background() -> String { "2a2a3aff".to_string() }
fn default_text() -> String { "e0e0e0ff".to_string() }
fn default_accent() -> String { "ff4040ff".to_string() }
fn default_dim_text() -> String { "808090ff".to_string() }
fn default_difficulty_labels() -> Vec<String> {
    ["Beginner", "Easy", "Normal", "Hard", "Expert"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fullscreen: false,
            tile_width: default_tile_width(),
            tile_height: default_tile_height(),
            margin: default_margin(),
            grid_share: default_grid_share(),
            border_radius: default_border_radius(),
            background: default_background(),
            tile_background: default_tile_background(),
            text: default_text(),
            accent: default_accent(),
            dim_text: default_dim_text(),
            difficulty_labels: default_difficulty_labels(),
        }
    }
}

impl ThemeConfig {
    pub fn parse_color(hex: &str) -> Color {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 8 || !hex.is_ascii() {
            return Color::BLACK;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0);
        let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0);
        let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0);
        let a = u8::from_str_radix(&hex[6..8], 16).unwrap_or(255);

        Color::from_rgba8(r, g, b, a)
    }
}

pub fn default_config_path() -> PathBuf {
    match ProjectDirs::from("org", "booth", "booth") {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("parsing {}", config_path.display()))?;

    // A zero-sized grid can't hold a cursor.
    config.grid.rows = config.grid.rows.max(1);
    config.grid.cols = config.grid.cols.max(1);
    config.input.repeat_period = config.input.repeat_period.max(1);
    config.input.frame_rate = config.input.frame_rate.max(1);
    Ok(config)
}

/// Reads the optional single launch argument (a network address) from `path`.
pub fn load_launch_address(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
