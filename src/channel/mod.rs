mod session;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ChannelError;
use session::ShellSession;

/// Anything that can run a privileged command line. `None` is the only
/// failure signal: the operation could not be completed.
pub trait CommandRunner: Send + Sync {
    fn execute(&self, command: &str) -> Option<String>;
}

/// Serialized access to a single persistent elevated shell.
///
/// Lifecycle is `open -> (respawn on death)* -> close`. The session is
/// spawned lazily on the first command and again whenever the previous one
/// has exited or lost its framing. The mutex is held for the whole
/// write/read round trip, so at most one command is ever in flight.
/// `close` is final: later commands fail instead of respawning.
pub struct CommandChannel {
    argv: Vec<String>,
    timeout: Duration,
    session: Mutex<Option<ShellSession>>,
    seq: AtomicU64,
    closed: AtomicBool,
}

impl CommandChannel {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            argv,
            timeout,
            session: Mutex::new(None),
            seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.elevate.clone(), config.command_timeout())
    }

    fn next_sentinel(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("__PORTAL_BAR_END_{}_{n}__", std::process::id())
    }

    pub fn try_execute(&self, command: &str) -> Result<String, ChannelError> {
        let mut slot = self.session.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed);
        }

        let reused = slot.as_mut().is_some_and(|s| s.is_alive());
        if !reused && slot.take().is_some() {
            debug!("elevated shell exited, respawning");
        }
        let mut session = match slot.take() {
            Some(s) => s,
            None => ShellSession::spawn(&self.argv)?,
        };

        let sentinel = self.next_sentinel();
        let mut result = session.round_trip(command, &sentinel, self.timeout);

        // A write failure means nothing was delivered, so one retry is safe.
        if reused && matches!(result, Err(ChannelError::Write(_))) {
            warn!(pid = session.pid(), "elevated shell went away between commands, respawning");
            drop(session);
            session = ShellSession::spawn(&self.argv)?;
            result = session.round_trip(command, &sentinel, self.timeout);
        }

        // On failure the session is dropped: its output framing can't be trusted.
        if result.is_ok() {
            *slot = Some(session);
        }
        result
    }

    pub fn is_open(&self) -> bool {
        self.session.lock().as_mut().is_some_and(|s| s.is_alive())
    }

    /// Terminate the session. Waits for an in-flight command to finish.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(session) = self.session.lock().take() {
            info!(pid = session.pid(), "closing elevated shell");
        }
    }
}

impl CommandRunner for CommandChannel {
    fn execute(&self, command: &str) -> Option<String> {
        match self.try_execute(command) {
            Ok(output) => {
                debug!(command, bytes = output.len(), "privileged command done");
                Some(output)
            }
            Err(e) => {
                warn!(command, error = %e, "privileged command failed");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::CommandRunner;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Records every command and answers from a script, in order.
    pub(crate) struct ScriptedRunner {
        pub(crate) calls: Mutex<Vec<String>>,
        replies: Mutex<VecDeque<Option<String>>>,
    }

    impl ScriptedRunner {
        pub(crate) fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = Option<S>>,
            S: Into<String>,
        {
            Self {
                calls: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into_iter().map(|r| r.map(Into::into)).collect()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn execute(&self, command: &str) -> Option<String> {
            self.calls.lock().push(command.to_string());
            self.replies.lock().pop_front().flatten()
        }
    }
}
