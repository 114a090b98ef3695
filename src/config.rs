use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::theme::ThemeMode;

/// Shell templates for every privileged operation. Placeholders are
/// substituted verbatim, so values must be validated before rendering.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    /// Prints the first non-primary display id, or nothing.
    pub enumerate_displays: String,
    /// `{package}`
    pub resolve_activity: String,
    /// `{display}`, `{component}`
    pub start_activity: String,
    /// `{keycode}`
    pub key_event: String,
    /// One `package/activity` line per launchable app.
    pub list_apps: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            enumerate_displays: "dumpsys display | grep -oE 'mDisplayId=[0-9]+' | cut -d'=' -f2 | grep -v '^0$' | head -n 1".to_string(),
            resolve_activity: "cmd package resolve-activity --brief {package}".to_string(),
            start_activity: "am start --display {display} {component}".to_string(),
            key_event: "input keyevent {keycode}".to_string(),
            list_apps: "cmd package query-activities --brief -a android.intent.action.MAIN -c android.intent.category.LAUNCHER".to_string(),
        }
    }
}

impl CommandTemplates {
    pub fn resolve_activity(&self, package: &str) -> String {
        self.resolve_activity.replace("{package}", package)
    }

    pub fn start_activity(&self, display_id: u32, component: &str) -> String {
        self.start_activity
            .replace("{display}", &display_id.to_string())
            .replace("{component}", component)
    }

    pub fn key_event(&self, keycode: u32) -> String {
        self.key_event.replace("{keycode}", &keycode.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// argv of the elevated shell; commands are written to its stdin.
    pub elevate: Vec<String>,
    pub poll_interval_secs: u64,
    pub command_timeout_secs: u64,
    pub key_queue_capacity: usize,
    pub notifications: bool,
    pub theme: ThemeMode,
    pub commands: CommandTemplates,
    /// Display id (as a string key) to Wayland output name.
    pub outputs: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elevate: vec!["su".to_string()],
            poll_interval_secs: 5,
            command_timeout_secs: 10,
            key_queue_capacity: 8,
            notifications: true,
            theme: ThemeMode::Auto,
            commands: CommandTemplates::default(),
            outputs: HashMap::new(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }
}

/// `$PORTAL_BAR_CONFIG`, else `<config dir>/portal-bar/config.json`.
pub fn config_file_path() -> PathBuf {
    if let Some(path) = std::env::var_os("PORTAL_BAR_CONFIG").filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("portal-bar/config.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "elevate": ["adb", "shell", "su"],
                "poll_interval_secs": 2,
                "theme": "light",
                "commands": { "key_event": "input keyevent --display 2 {keycode}" },
                "outputs": { "2": "HDMI-A-1" }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.elevate, vec!["adb", "shell", "su"]);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(2));
        assert_eq!(cfg.command_timeout_secs, 10);
        assert_eq!(cfg.theme, ThemeMode::Light);
        assert_eq!(cfg.commands.key_event(4), "input keyevent --display 2 4");
        assert_eq!(
            cfg.commands.resolve_activity,
            CommandTemplates::default().resolve_activity
        );
        assert_eq!(cfg.outputs.get("2").map(String::as_str), Some("HDMI-A-1"));
    }

    #[test]
    fn templates_substitute_placeholders() {
        let t = CommandTemplates::default();
        assert_eq!(
            t.resolve_activity("org.example.app"),
            "cmd package resolve-activity --brief org.example.app"
        );
        assert_eq!(
            t.start_activity(2, "org.example.app/.Main"),
            "am start --display 2 org.example.app/.Main"
        );
        assert_eq!(t.key_event(187), "input keyevent 187");
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let cfg = Config {
            poll_interval_secs: 0,
            command_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.command_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
