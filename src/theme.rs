use iced::{Background, Color};
use serde::Deserialize;

/// How the bar palette is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Dark,
    Light,
    /// Follow the desktop color scheme at startup.
    Auto,
}

/// Colors and sizes used by the overlay windows.
pub struct BarColors {
    pub is_dark: bool,
    pub icon: Color,
    pub bar_bg: Color,
    pub expander_bg: Color,
    /// Nav glyphs (logical pixels)
    pub icon_size: f32,
    pub expander_icon_size: f32,
}

impl BarColors {
    pub fn dark() -> Self {
        Self {
            is_dark: true,
            icon: Color {
                r: 1.0,
                g: 1.0,
                b: 1.0,
                a: 0.9,
            },
            bar_bg: Color {
                r: 0.08,
                g: 0.08,
                b: 0.1,
                a: 0.85,
            },
            expander_bg: Color {
                r: 0.08,
                g: 0.08,
                b: 0.1,
                a: 0.6,
            },
            icon_size: 26.0,
            expander_icon_size: 20.0,
        }
    }

    pub fn light() -> Self {
        Self {
            is_dark: false,
            icon: Color {
                r: 0.1,
                g: 0.1,
                b: 0.12,
                a: 0.9,
            },
            bar_bg: Color {
                r: 0.96,
                g: 0.96,
                b: 0.97,
                a: 0.9,
            },
            expander_bg: Color {
                r: 0.96,
                g: 0.96,
                b: 0.97,
                a: 0.7,
            },
            icon_size: 26.0,
            expander_icon_size: 20.0,
        }
    }

    pub fn bar_style(&self) -> impl Fn(&iced::Theme) -> iced::widget::container::Style {
        let color = self.bar_bg;
        move |_theme: &iced::Theme| iced::widget::container::Style {
            background: Some(Background::Color(color)),
            border: iced::Border {
                radius: 32.0.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn expander_style(&self) -> impl Fn(&iced::Theme) -> iced::widget::container::Style {
        let color = self.expander_bg;
        move |_theme: &iced::Theme| iced::widget::container::Style {
            background: Some(Background::Color(color)),
            border: iced::Border {
                radius: 24.0.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Desktop dark-mode preference. Spawns CLI tools synchronously, so only
/// called once at startup.
pub fn detect_system_dark() -> bool {
    // XDG Desktop Portal color-scheme: 0=no preference, 1=dark, 2=light
    if let Ok(output) = std::process::Command::new("dbus-send")
        .args([
            "--session",
            "--print-reply=literal",
            "--dest=org.freedesktop.portal.Desktop",
            "/org/freedesktop/portal/desktop",
            "org.freedesktop.portal.Settings.ReadOne",
            "string:org.freedesktop.appearance",
            "string:color-scheme",
        ])
        .output()
    {
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.contains("uint32 1") {
                return true;
            }
            if stdout.contains("uint32 2") {
                return false;
            }
        }
    }

    if let Ok(output) = std::process::Command::new("gsettings")
        .args(["get", "org.gnome.desktop.interface", "color-scheme"])
        .output()
    {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.contains("prefer-dark") {
            return true;
        }
        if stdout.contains("prefer-light") || stdout.contains("default") {
            return false;
        }
    }

    if let Ok(val) = std::env::var("GTK_THEME") {
        return val.to_lowercase().contains("dark");
    }

    true
}

pub fn resolve(mode: ThemeMode) -> BarColors {
    match mode {
        ThemeMode::Dark => BarColors::dark(),
        ThemeMode::Light => BarColors::light(),
        ThemeMode::Auto => {
            if detect_system_dark() {
                BarColors::dark()
            } else {
                BarColors::light()
            }
        }
    }
}
