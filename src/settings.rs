use std::path::PathBuf;

use crate::chatlog::DEFAULT_START_Y;
use crate::store::{DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DEFAULT_FONT_FAMILY, MAX_ZOOM, MIN_ZOOM};

const SETTINGS_FILE: &str = "captionfe_settings.cfg";

/// Application settings that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    /// Canvas size before any image is loaded.
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub default_zoom: f32,
    /// Font family given to new text layers.
    pub font_family: String,
    /// Where the export dialog opens. Empty = let the OS decide.
    pub export_dir: String,
    /// First y of pasted chat lines.
    pub chat_start_y: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            default_zoom: 1.0,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            export_dir: String::new(),
            chat_start_y: DEFAULT_START_Y,
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/captionfe/captionfe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\CaptionFE\captionfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/CaptionFE/captionfe_settings.cfg
    /// Fallback:   same directory as the executable.
    pub(crate) fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join(crate::PRODUCT_NAME);
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).unwrap_or_else(|_| {
                std::env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(|d| d.to_string_lossy().into_owned()))
                    .unwrap_or_default()
            });
            let config_dir = PathBuf::from(appdata).join(crate::APP_TITLE);
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join(crate::APP_TITLE);
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join(SETTINGS_FILE));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join(SETTINGS_FILE)))
        }
    }

    /// The configured export directory, if it still exists.
    pub fn export_dir(&self) -> Option<PathBuf> {
        let dir = PathBuf::from(self.export_dir.trim());
        (!self.export_dir.trim().is_empty() && dir.is_dir()).then_some(dir)
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "canvas_width={}\n\
             canvas_height={}\n\
             default_zoom={}\n\
             font_family={}\n\
             export_dir={}\n\
             chat_start_y={}\n",
            self.canvas_width,
            self.canvas_height,
            self.default_zoom,
            self.font_family,
            self.export_dir,
            self.chat_start_y,
        )
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        match std::fs::write(&path, self.to_config_string()) {
            Ok(()) => log::info!("Settings saved to {}", path.display()),
            Err(e) => log::warn!("Could not save settings to {}: {}", path.display(), e),
        }
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::parse(&content)
    }

    /// Parse `key=value` lines. Unknown keys and unparsable values keep
    /// their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "canvas_width" => {
                    s.canvas_width = val.parse().ok().filter(|&w| w > 0).unwrap_or(DEFAULT_CANVAS_WIDTH);
                }
                "canvas_height" => {
                    s.canvas_height = val.parse().ok().filter(|&h| h > 0).unwrap_or(DEFAULT_CANVAS_HEIGHT);
                }
                "default_zoom" => {
                    s.default_zoom = val
                        .parse::<f32>()
                        .ok()
                        .filter(|z| z.is_finite())
                        .map_or(1.0, |z| z.clamp(MIN_ZOOM, MAX_ZOOM));
                }
                "font_family" => {
                    if !val.is_empty() {
                        s.font_family = val.to_string();
                    }
                }
                "export_dir" => {
                    s.export_dir = val.to_string();
                }
                "chat_start_y" => {
                    s.chat_start_y = val.parse::<f32>().ok().filter(|y| y.is_finite()).unwrap_or(DEFAULT_START_Y);
                }
                _ => {}
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_keep_defaults() {
        assert_eq!(AppSettings::parse(""), AppSettings::default());
        assert_eq!(AppSettings::parse("not a setting\n=\nfoo=bar"), AppSettings::default());
    }

    #[test]
    fn values_are_trimmed_and_parsed() {
        let s = AppSettings::parse("canvas_width = 800\ncanvas_height=600\nfont_family= Verdana \nchat_start_y=12.5");
        assert_eq!((s.canvas_width, s.canvas_height), (800, 600));
        assert_eq!(s.font_family, "Verdana");
        assert_eq!(s.chat_start_y, 12.5);
    }

    #[test]
    fn corrupt_values_fall_back() {
        let s = AppSettings::parse("canvas_width=-4\ncanvas_height=0\ndefault_zoom=NaN\nchat_start_y=abc\nfont_family=");
        assert_eq!(s, AppSettings::default());
        assert_eq!(AppSettings::parse("default_zoom=9").default_zoom, MAX_ZOOM);
    }

    #[test]
    fn config_string_parses_back() {
        let s = AppSettings {
            canvas_width: 1920,
            canvas_height: 1080,
            default_zoom: 0.5,
            font_family: "Georgia".into(),
            export_dir: "/tmp/shots".into(),
            chat_start_y: 80.0,
        };
        assert_eq!(AppSettings::parse(&s.to_config_string()), s);
    }

    #[test]
    fn missing_export_dir_is_none() {
        let s = AppSettings { export_dir: "/definitely/not/here/captionfe".into(), ..Default::default() };
        assert_eq!(s.export_dir(), None);
        assert_eq!(AppSettings::default().export_dir(), None);
    }
}
