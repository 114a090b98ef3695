use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::channel::CommandRunner;
use crate::launch::is_package_name;

/// An installed, launchable application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppDescriptor {
    pub display_name: String,
    pub package: String,
    /// Icon resource reference, if the catalog knows one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl AppDescriptor {
    pub fn new(display_name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            package: package.into(),
            icon: None,
        }
    }
}

/// Source of launchable applications, sorted by display name.
pub trait AppCatalog {
    fn list(&self) -> Vec<AppDescriptor>;
}

/// Lists launcher activities through the elevated channel.
///
/// The shell only knows package names, so those double as display names.
pub struct ShellAppCatalog {
    runner: Arc<dyn CommandRunner>,
    command: String,
}

impl ShellAppCatalog {
    pub fn new(runner: Arc<dyn CommandRunner>, command: String) -> Self {
        Self { runner, command }
    }
}

impl AppCatalog for ShellAppCatalog {
    fn list(&self) -> Vec<AppDescriptor> {
        match self.runner.execute(&self.command) {
            Some(output) => parse_app_list(&output),
            None => {
                warn!("app enumeration failed");
                Vec::new()
            }
        }
    }
}

/// `package/activity` lines to descriptors, one per package.
pub fn parse_app_list(output: &str) -> Vec<AppDescriptor> {
    let mut by_package: BTreeMap<String, AppDescriptor> = BTreeMap::new();
    for line in output.lines().map(str::trim) {
        let Some((package, _activity)) = line.split_once('/') else {
            continue;
        };
        if !is_package_name(package) {
            continue;
        }
        by_package
            .entry(package.to_string())
            .or_insert_with(|| AppDescriptor::new(package, package));
    }
    let mut apps: Vec<AppDescriptor> = by_package.into_values().collect();
    sort_by_name(&mut apps);
    apps
}

/// Case-insensitive ordering by display name, package as tie-breaker.
pub fn sort_by_name(apps: &mut [AppDescriptor]) {
    apps.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.package.cmp(&b.package))
    });
}
