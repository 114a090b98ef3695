use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::ChannelError;

/// One long-lived elevated shell. Commands go to stdin; stdout lines arrive
/// through a reader thread so the end-marker wait can be bounded.
pub(crate) struct ShellSession {
    child: Child,
    stdin: ChildStdin,
    line_rx: mpsc::Receiver<String>,
    spawned_at: Instant,
}

impl ShellSession {
    pub(crate) fn spawn(argv: &[String]) -> Result<Self, ChannelError> {
        let (program, args) = argv.split_first().ok_or(ChannelError::NoProgram)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ChannelError::Spawn {
                program: program.clone(),
                source,
            })?;

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (stdin, stdout, stderr) = match pipes {
            (Some(i), Some(o), Some(e)) => (i, o, e),
            (i, o, _) => {
                let _ = child.kill();
                let _ = child.wait();
                let missing = if i.is_none() {
                    "stdin"
                } else if o.is_none() {
                    "stdout"
                } else {
                    "stderr"
                };
                return Err(ChannelError::MissingPipe(missing));
            }
        };

        let pid = child.id();
        let (line_tx, line_rx) = mpsc::channel();

        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(l) => {
                        if line_tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            debug!(pid, "elevated shell stdout closed");
        });

        // Some privileged tools print informational text on stderr.
        thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(Result::ok) {
                warn!(target: "portal_bar::channel", pid, "stderr: {line}");
            }
        });

        info!(pid, program = %program, "elevated shell spawned");
        Ok(Self {
            child,
            stdin,
            line_rx,
            spawned_at: Instant::now(),
        })
    }

    pub(crate) fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub(crate) fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Run `command`, then read stdout until `sentinel` or `timeout`.
    pub(crate) fn round_trip(
        &mut self,
        command: &str,
        sentinel: &str,
        timeout: Duration,
    ) -> Result<String, ChannelError> {
        write!(self.stdin, "{command}\necho {sentinel}\n")
            .and_then(|_| self.stdin.flush())
            .map_err(ChannelError::Write)?;

        let deadline = Instant::now() + timeout;
        let mut lines: Vec<String> = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.line_rx.recv_timeout(remaining) {
                Ok(line) => {
                    if line == sentinel {
                        break;
                    }
                    // Output without a trailing newline shares a line with the marker.
                    if let Some(prefix) = line.strip_suffix(sentinel) {
                        lines.push(prefix.to_string());
                        break;
                    }
                    lines.push(line);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => return Err(ChannelError::Timeout(timeout)),
                Err(mpsc::RecvTimeoutError::Disconnected) => return Err(ChannelError::SessionDied),
            }
        }
        Ok(lines.join("\n").trim().to_string())
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        debug!(
            pid = self.child.id(),
            uptime_secs = self.spawned_at.elapsed().as_secs(),
            "terminating elevated shell"
        );
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
