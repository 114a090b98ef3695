use std::process::Command;

fn main() {
    // PORTAL_BAR_VERSION: release builds may inject this; local builds use Cargo's version.
    let version = std::env::var("PORTAL_BAR_VERSION")
        .unwrap_or_else(|_| std::env::var("CARGO_PKG_VERSION").unwrap_or_default());
    println!("cargo:rustc-env=PORTAL_BAR_VERSION={version}");

    // PORTAL_BAR_COMMIT: falls back to `git rev-parse --short HEAD`.
    let commit = std::env::var("PORTAL_BAR_COMMIT").unwrap_or_else(|_| {
        let output = Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output();
        match output {
            Ok(o) if o.status.success() => {
                String::from_utf8_lossy(&o.stdout).trim().to_string()
            }
            _ => "unknown".to_string(),
        }
    });
    println!("cargo:rustc-env=PORTAL_BAR_COMMIT={commit}");

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
}
