// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section and key is optional. A missing file means defaults; a broken
// file logs a warning and also falls back to defaults.
//
// Loading happens before the logger exists (the logger itself is configured
// here), so the outcome is returned as a `ConfigStatus` and logged later.

use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mesh::MAX_SUBDIVISION_DEPTH;

pub const CONFIG_PATH: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub demo: DemoConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Sierpinski Triangle".to_string(),
            width: 800,
            height: 600,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.1, 0.1, 0.1, 1.0],
            max_frames_in_flight: 2,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "renderer.log".to_string(),
            show_fps: true,
        }
    }
}

/// Subdivision demo settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Triangle the demo starts from, in normalized device coordinates
    pub initial_triangle: [[f32; 2]; 3],
    pub step_interval_secs: f32,
    pub max_depth: u32,
    pub auto_step: bool,
    pub shader_dir: PathBuf,
    pub hot_reload_shaders: bool,
    /// Copies of the triangle drawn each frame (`[[demo.objects]]`)
    pub objects: Vec<ObjectConfig>,
}

/// One drawn copy of the scene mesh
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    pub offset: [f32; 2],
    pub color: [f32; 3],
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            color: [1.0, 0.0, 0.0],
        }
    }
}

impl ObjectConfig {
    pub fn offset(&self) -> Vec2 {
        Vec2::from(self.offset)
    }

    pub fn color(&self) -> Vec3 {
        Vec3::from(self.color)
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            initial_triangle: [[0.0, -0.5], [0.5, 0.5], [-0.5, 0.5]],
            step_interval_secs: 2.0,
            max_depth: 8,
            auto_step: true,
            shader_dir: PathBuf::from("shaders"),
            hot_reload_shaders: true,
            objects: vec![ObjectConfig::default()],
        }
    }
}

impl DemoConfig {
    pub fn initial_vertices(&self) -> [Vec2; 3] {
        self.initial_triangle.map(Vec2::from)
    }

    /// Interval between automatic steps. Values `validate` rejects never
    /// schedule a step.
    pub fn step_interval(&self) -> Duration {
        Duration::try_from_secs_f32(self.step_interval_secs).unwrap_or(Duration::MAX)
    }
}

/// How the configuration was obtained, logged once logging is up
#[derive(Debug)]
pub enum ConfigStatus {
    Loaded(PathBuf),
    Missing(PathBuf),
    Invalid(anyhow::Error),
}

impl ConfigStatus {
    pub fn log(&self, config: &Config) {
        match self {
            ConfigStatus::Loaded(path) => {
                log::info!("Loaded configuration from {:?}", path);
                log::debug!("Config: {:?}", config);
            }
            ConfigStatus::Missing(path) => {
                log::info!("Config file not found at {:?}, using defaults", path);
            }
            ConfigStatus::Invalid(e) => {
                log::warn!("Failed to load config: {:#}. Using defaults.", e);
            }
        }
    }
}

impl Config {
    /// Load `config.toml`, falling back to defaults on any error
    pub fn load() -> (Self, ConfigStatus) {
        Self::load_or_default(CONFIG_PATH)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, ConfigStatus) {
        let path = path.as_ref();
        if !path.exists() {
            return (Config::default(), ConfigStatus::Missing(path.to_path_buf()));
        }
        match Self::load_from_path(path) {
            Ok(config) => (config, ConfigStatus::Loaded(path.to_path_buf())),
            Err(e) => (Config::default(), ConfigStatus::Invalid(e)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        Ok(config)
    }

    /// Reject values the renderer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.graphics.max_frames_in_flight == 0 {
            anyhow::bail!("graphics.max_frames_in_flight must be at least 1");
        }

        let interval = self.demo.step_interval_secs;
        if !interval.is_finite() || interval <= 0.0 {
            anyhow::bail!(
                "demo.step_interval_secs must be a positive number, got {}",
                interval
            );
        }
        Duration::try_from_secs_f32(interval).with_context(|| {
            format!("demo.step_interval_secs is out of range, got {}", interval)
        })?;

        if self.demo.max_depth > MAX_SUBDIVISION_DEPTH {
            anyhow::bail!(
                "demo.max_depth must be at most {}, got {}",
                MAX_SUBDIVISION_DEPTH,
                self.demo.max_depth
            );
        }

        if self.demo.objects.is_empty() {
            anyhow::bail!("demo.objects needs at least one entry");
        }
        for (i, object) in self.demo.objects.iter().enumerate() {
            if !object.offset().is_finite() || !object.color().is_finite() {
                anyhow::bail!("demo.objects[{}] has a non-finite offset or color", i);
            }
        }

        let [a, b, c] = self.demo.initial_vertices();
        if (b - a).perp_dot(c - a).abs() <= f32::EPSILON {
            anyhow::bail!("demo.initial_triangle has zero area");
        }

        Ok(())
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config::load_from_path(dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(config.demo.max_depth, 8);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"
            [window]
            width = 1024

            [demo]
            max_depth = 3
            auto_step = false
            "#,
        );
        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.demo.max_depth, 3);
        assert!(!config.demo.auto_step);
        assert_eq!(config.demo.step_interval(), Duration::from_secs(2));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let file = write_config("[window\nwidth = ");
        assert!(Config::load_from_path(file.path()).is_err());
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let file = write_config("[graphics]\nmax_frames_in_flight = 0\n");
        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("max_frames_in_flight"));
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        let mut config = Config::default();
        config.demo.step_interval_secs = 0.0;
        assert!(config.validate().is_err());
        config.demo.step_interval_secs = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn interval_too_long_for_a_duration_is_rejected() {
        let file = write_config("[demo]\nstep_interval_secs = 1e20\n");
        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("step_interval_secs"));
    }

    #[test]
    fn unvalidated_interval_never_panics() {
        let demo = DemoConfig {
            step_interval_secs: 1e20,
            ..DemoConfig::default()
        };
        assert_eq!(demo.step_interval(), Duration::MAX);
    }

    #[test]
    fn max_depth_is_bounded() {
        let file = write_config("[demo]\nmax_depth = 40\n");
        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("max_depth"));

        let mut config = Config::default();
        config.demo.max_depth = MAX_SUBDIVISION_DEPTH;
        assert!(config.validate().is_ok());
        config.demo.max_depth = MAX_SUBDIVISION_DEPTH + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn objects_list_replaces_the_default_object() {
        let file = write_config(
            r#"
            [[demo.objects]]
            offset = [-0.5, 0.0]
            color = [0.0, 1.0, 0.0]

            [[demo.objects]]
            offset = [0.5, 0.0]
            "#,
        );
        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.demo.objects.len(), 2);
        assert_eq!(config.demo.objects[0].offset(), Vec2::new(-0.5, 0.0));
        assert_eq!(config.demo.objects[0].color(), Vec3::new(0.0, 1.0, 0.0));
        // unspecified keys take the per-object defaults
        assert_eq!(config.demo.objects[1].color(), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn empty_objects_list_is_rejected() {
        let mut config = Config::default();
        config.demo.objects.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_or_default_reports_what_happened() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (config, status) = Config::load_or_default(dir.path().join("nope.toml"));
        assert!(matches!(status, ConfigStatus::Missing(_)));
        assert_eq!(config.window.width, 800);

        let broken = write_config("[graphics]\nmax_frames_in_flight = 0\n");
        let (config, status) = Config::load_or_default(broken.path());
        assert!(matches!(status, ConfigStatus::Invalid(_)));
        assert_eq!(config.graphics.max_frames_in_flight, 2);

        let good = write_config("[window]\nwidth = 640\n");
        let (config, status) = Config::load_or_default(good.path());
        assert!(matches!(status, ConfigStatus::Loaded(_)));
        assert_eq!(config.window.width, 640);
    }

    #[test]
    fn degenerate_triangle_is_rejected() {
        let mut config = Config::default();
        config.demo.initial_triangle = [[0.0, 0.0], [0.5, 0.5], [1.0, 1.0]];
        assert!(config.validate().is_err());
    }

    #[test]
    fn present_mode_parsing() {
        let mut config = Config::default();
        assert_eq!(config.present_mode(), ash::vk::PresentModeKHR::FIFO);
        config.graphics.present_mode = "Mailbox".to_string();
        assert_eq!(config.present_mode(), ash::vk::PresentModeKHR::MAILBOX);
        config.graphics.present_mode = "vsync-please".to_string();
        assert_eq!(config.present_mode(), ash::vk::PresentModeKHR::FIFO);
    }
}
