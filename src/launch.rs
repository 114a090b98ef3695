use std::sync::Arc;

use tracing::{info, warn};

use crate::apps::AppDescriptor;
use crate::channel::CommandRunner;
use crate::config::CommandTemplates;
use crate::display::DisplayState;
use crate::error::LaunchError;

/// Successful hand-off to the platform. A launch the platform later rejects
/// still reports as launched; the shell only tells us the command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub app: String,
    pub display_id: u32,
    pub component: String,
}

impl std::fmt::Display for LaunchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Launching {} on display {}", self.app, self.display_id)
    }
}

/// Resolve-then-start on the secondary display.
pub struct Launcher {
    runner: Arc<dyn CommandRunner>,
    commands: CommandTemplates,
}

impl Launcher {
    pub fn new(runner: Arc<dyn CommandRunner>, commands: CommandTemplates) -> Self {
        Self { runner, commands }
    }

    pub fn launch(
        &self,
        app: &AppDescriptor,
        display: &DisplayState,
    ) -> Result<LaunchReport, LaunchError> {
        let display_id = match (display.connected, display.display_id) {
            (true, Some(id)) => id,
            _ => return Err(LaunchError::NotConnected),
        };
        if !is_package_name(&app.package) {
            return Err(LaunchError::InvalidPackage(app.package.clone()));
        }

        let resolved = self
            .runner
            .execute(&self.commands.resolve_activity(&app.package));
        let Some(component) = resolved.as_deref().and_then(component_line) else {
            warn!(package = %app.package, "no launchable activity");
            return Err(LaunchError::ResolutionFailed(app.display_name.clone()));
        };

        self.runner
            .execute(&self.commands.start_activity(display_id, &component))
            .ok_or_else(|| LaunchError::Channel(app.display_name.clone()))?;

        info!(package = %app.package, %component, display_id, "launch issued");
        Ok(LaunchReport {
            app: app.display_name.clone(),
            display_id,
            component,
        })
    }
}

/// First `package/Activity` line of resolve output.
fn component_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|l| is_component_name(l))
        .map(str::to_string)
}

/// `<package>/<class>`, where the class may be relative (`.Main`) and may
/// name a nested class (`Outer$Inner`).
fn is_component_name(line: &str) -> bool {
    let Some((package, class)) = line.split_once('/') else {
        return false;
    };
    let class = class.strip_prefix('.').unwrap_or(class);
    is_package_name(package)
        && !class.is_empty()
        && class.split('.').all(|seg| {
            !seg.is_empty()
                && seg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}

/// Package names are dot-separated segments of `[A-Za-z0-9_]`. Anything else
/// would be spliced into a privileged shell line, so it is refused outright.
pub fn is_package_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('.')
            .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}
