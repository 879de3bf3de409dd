//! Configuration
//!
//! Configuration is loaded with the following precedence (highest to
//! lowest):
//! 1. CLI flags (--config, --backend, --font, --font-size, --orientation)
//! 2. Environment variables (SUMI_BACKEND, SUMI_FONT_SIZE, ...)
//! 3. Config file (~/.config/sumi/config.toml or XDG_CONFIG_HOME)
//! 4. Built-in defaults

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sumi_core::{Palette, Rgba};
use thiserror::Error;

use crate::renderer::RenderOptions;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// CLI arguments overriding the configuration
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Path to the config file (overrides the XDG default)
    pub config_path: Option<PathBuf>,
    /// Backend override
    pub backend: Option<BackendKind>,
    /// Font file override
    pub font_path: Option<PathBuf>,
    /// Font size override
    pub font_size: Option<f32>,
    /// Orientation override
    pub orientation: Option<u32>,
}

/// Available display backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Framebuffer if available, emulation otherwise
    #[default]
    Auto,
    /// Linux framebuffer with EPDC updates
    Fbdev,
    /// In-memory e-paper emulation
    Emulation,
}

impl BackendKind {
    /// Parse a backend name from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(BackendKind::Auto),
            "fbdev" => Some(BackendKind::Fbdev),
            "emulation" | "emu" => Some(BackendKind::Emulation),
            _ => None,
        }
    }
}

/// Named built-in palettes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaletteName {
    /// 16 base colors plus the xterm color cube and grayscale ramp
    #[default]
    Default,
    /// Tango 16-color palette
    Tango,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Display backend
    #[serde(default)]
    pub backend: BackendKind,
    /// Framebuffer device path
    #[serde(default = "default_fbdev")]
    pub fbdev: PathBuf,
}

fn default_fbdev() -> PathBuf {
    PathBuf::from("/dev/fb0")
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            fbdev: default_fbdev(),
        }
    }
}

/// Font settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Path to a monospace TrueType font
    pub path: PathBuf,
    /// Font size in points
    pub size: f32,
    /// Display resolution in dots per inch, used to convert the point
    /// size to pixels
    pub dpi: u32,
}

impl FontConfig {
    /// Font size in pixels for the glyph rasterizer (72 points per inch)
    pub fn pixel_size(&self) -> f32 {
        self.size * self.dpi as f32 / 72.0
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/usr/share/fonts/dejavu/DejaVuSansMono.ttf"),
            size: 12.0,
            dpi: 96,
        }
    }
}

/// Color settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Default foreground color (hex)
    pub foreground: String,
    /// Default background color (hex)
    pub background: String,
    /// Render bold text with bright palette colors
    pub bright_on_bold: bool,
    /// Base palette
    #[serde(default)]
    pub palette: PaletteName,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            foreground: "#f7f7f7".to_string(),
            background: "#000000".to_string(),
            bright_on_bold: true,
            palette: PaletteName::Default,
        }
    }
}

/// Renderer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Display rotation in 90-degree steps (0-3)
    pub orientation: u32,
    /// Rectangle merger waste bound; two regions merge when they cover at
    /// least this fraction of their bounding box
    pub merge_ratio: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            orientation: 0,
            merge_ratio: 0.75,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub font: FontConfig,
    pub colors: ColorConfig,
    pub render: RenderConfig,
}

impl Config {
    /// Default config file path following XDG conventions
    pub fn default_path() -> Option<PathBuf> {
        let base = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join("sumi").join("config.toml"))
    }

    /// Load a config file
    pub fn load_file(path: &PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.clone()));
        }
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration with full precedence handling
    ///
    /// A config file named on the command line must exist; the default
    /// location is allowed to be absent.
    pub fn load_with_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config_path {
            Some(path) => Self::load_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_file(&path)?,
                _ => Config::default(),
            },
        };

        config.apply_env();
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Apply `SUMI_*` environment overrides
    fn apply_env(&mut self) {
        if let Ok(backend) = env::var("SUMI_BACKEND") {
            if let Some(kind) = BackendKind::parse(&backend) {
                self.general.backend = kind;
            }
        }
        if let Ok(size) = env::var("SUMI_FONT_SIZE") {
            if let Ok(size) = size.parse() {
                self.font.size = size;
            }
        }
        if let Ok(font) = env::var("SUMI_FONT") {
            self.font.path = PathBuf::from(font);
        }
        if let Ok(orientation) = env::var("SUMI_ORIENTATION") {
            if let Ok(orientation) = orientation.parse::<u32>() {
                self.render.orientation = orientation;
            }
        }
    }

    /// Apply CLI overrides
    fn apply_args(&mut self, args: &CliArgs) {
        if let Some(backend) = args.backend {
            self.general.backend = backend;
        }
        if let Some(path) = &args.font_path {
            self.font.path = path.clone();
        }
        if let Some(size) = args.font_size {
            self.font.size = size;
        }
        if let Some(orientation) = args.orientation {
            self.render.orientation = orientation;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.font.size >= 4.0 && self.font.size <= 128.0) {
            return Err(ConfigError::ValidationError(format!(
                "font size {} out of range (4-128)",
                self.font.size
            )));
        }
        if !(24..=1200).contains(&self.font.dpi) {
            return Err(ConfigError::ValidationError(format!(
                "dpi {} out of range (24-1200)",
                self.font.dpi
            )));
        }
        if self.render.orientation > 3 {
            return Err(ConfigError::ValidationError(format!(
                "orientation {} out of range (0-3)",
                self.render.orientation
            )));
        }
        if !(self.render.merge_ratio > 0.0 && self.render.merge_ratio <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "merge ratio {} out of range (0-1]",
                self.render.merge_ratio
            )));
        }
        Ok(())
    }

    /// Renderer color options derived from this configuration
    pub fn render_options(&self) -> RenderOptions {
        let palette = match self.colors.palette {
            PaletteName::Default => Palette::default_256(),
            PaletteName::Tango => Palette::tango_16(),
        };
        RenderOptions {
            palette,
            default_fg: Rgba::parse_hex(&self.colors.foreground)
                .unwrap_or(Rgba::from_hex(0xF7F7F7)),
            default_bg: Rgba::parse_hex(&self.colors.background).unwrap_or(Rgba::BLACK),
            bright_on_bold: self.colors.bright_on_bold,
        }
    }

    /// Merge ratio as an integer fraction for the rectangle merger
    pub fn merge_ratio_fraction(&self) -> (u32, u32) {
        ((self.render.merge_ratio * 64.0).round() as u32, 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.general.backend, BackendKind::Auto);
        assert_eq!(config.render.orientation, 0);
        assert!((config.render.merge_ratio - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r##"
            [general]
            backend = "emulation"

            [font]
            path = "/tmp/font.ttf"
            size = 20.0
            dpi = 144

            [colors]
            foreground = "#101010"
            background = "#fafafa"
            bright_on_bold = false
            palette = "tango"

            [render]
            orientation = 1
            merge_ratio = 0.8
            "##,
        )
        .unwrap();

        assert_eq!(config.general.backend, BackendKind::Emulation);
        assert_eq!(config.font.size, 20.0);
        assert_eq!(config.font.dpi, 144);
        assert_eq!(config.colors.palette, PaletteName::Tango);
        assert_eq!(config.render.orientation, 1);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[render]\norientation = 2\n").unwrap();
        assert_eq!(config.render.orientation, 2);
        assert_eq!(config.general.backend, BackendKind::Auto);
        assert_eq!(config.font.size, 12.0);
        assert_eq!(config.font.dpi, 96);
    }

    #[test]
    fn test_pixel_size_from_points_and_dpi() {
        // 12 pt at 96 dpi is exactly 16 px
        let config = Config::default();
        assert_eq!(config.font.pixel_size(), 16.0);

        let mut config = Config::default();
        config.font.size = 10.0;
        config.font.dpi = 144;
        assert_eq!(config.font.pixel_size(), 20.0);
    }

    #[test]
    fn test_validation_rejects_bad_dpi() {
        let mut config = Config::default();
        config.font.dpi = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_orientation() {
        let mut config = Config::default();
        config.render.orientation = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_render_options() {
        let mut config = Config::default();
        config.colors.foreground = "#ffffff".to_string();
        config.colors.palette = PaletteName::Tango;
        let options = config.render_options();
        assert_eq!(options.default_fg, Rgba::WHITE);
        assert_eq!(options.palette.len(), 16);
    }

    #[test]
    fn test_merge_ratio_fraction() {
        let config = Config::default();
        assert_eq!(config.merge_ratio_fraction(), (48, 64));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(BackendKind::parse("fbdev"), Some(BackendKind::Fbdev));
        assert_eq!(BackendKind::parse("EMU"), Some(BackendKind::Emulation));
        assert_eq!(BackendKind::parse("sdl"), None);
    }
}
