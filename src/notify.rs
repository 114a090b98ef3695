use std::process::{Command, Stdio};

use tracing::debug;

use crate::util::truncate_str;

const APP_NAME: &str = "Portal Bar";
const MAX_BODY_CHARS: usize = 120;
const EXPIRE_MS: &str = "3000";

/// Transient user-facing messages (connectivity, launch outcomes).
#[derive(Debug, Clone, Copy)]
pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Show `body` without blocking the caller.
    pub fn show(&self, body: &str) {
        if !self.enabled {
            debug!(body, "notification suppressed");
            return;
        }
        let body = truncate_str(body, MAX_BODY_CHARS);
        std::thread::spawn(move || {
            match Command::new("notify-send")
                .args(["--app-name", APP_NAME, "--expire-time", EXPIRE_MS, APP_NAME, &body])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
            {
                Ok(s) if s.success() => {}
                Ok(s) => debug!("notify-send exited: {s}"),
                Err(e) => debug!("notify-send failed: {e}"),
            }
        });
    }
}
