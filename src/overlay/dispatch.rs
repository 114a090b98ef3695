use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::channel::CommandRunner;
use crate::config::CommandTemplates;

/// Fire-and-forget key injection off the UI thread.
///
/// The queue is bounded: presses that arrive while it is full are dropped,
/// so rapid tapping against a slow channel never builds a backlog.
pub struct KeyDispatcher {
    tx: Option<mpsc::SyncSender<u32>>,
    cancelled: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl KeyDispatcher {
    pub fn spawn(runner: Arc<dyn CommandRunner>, templates: CommandTemplates, capacity: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel::<u32>(capacity.max(1));
        let cancelled = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&cancelled);
        let thread = thread::spawn(move || {
            for keycode in rx {
                if stop.load(Ordering::Acquire) {
                    debug!(keycode, "dispatcher cancelled, discarding press");
                    break;
                }
                let command = templates.key_event(keycode);
                if runner.execute(&command).is_none() {
                    debug!(keycode, "key injection failed");
                }
            }
            debug!("key dispatcher exited");
        });
        Self {
            tx: Some(tx),
            cancelled,
            thread: Some(thread),
        }
    }

    /// Queue `keycode`. Returns `false` if the press was dropped.
    pub fn dispatch(&self, keycode: u32) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(keycode) {
            Ok(()) => true,
            Err(mpsc::TrySendError::Full(_)) => {
                warn!(keycode, "key queue full, dropping press");
                false
            }
            Err(mpsc::TrySendError::Disconnected(_)) => false,
        }
    }

    /// Discard queued presses and let the worker exit on its own. An
    /// injection already in flight is not waited for.
    pub fn shutdown(mut self) {
        self.cancelled.store(true, Ordering::Release);
        self.tx.take();
        self.thread.take();
    }

    /// Let queued presses run, then wait for the worker.
    #[cfg(test)]
    fn drain(mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for KeyDispatcher {
    fn drop(&mut self) {
        self.tx.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::ScriptedRunner;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    /// Blocks every command until the gate opens.
    struct GatedRunner {
        calls: Mutex<Vec<String>>,
        started: Mutex<mpsc::Sender<()>>,
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl CommandRunner for GatedRunner {
        fn execute(&self, command: &str) -> Option<String> {
            self.calls.lock().push(command.to_string());
            let _ = self.started.lock().send(());
            let _ = self.gate.lock().recv();
            Some(String::new())
        }
    }

    #[test]
    fn presses_become_key_events() {
        let runner = Arc::new(ScriptedRunner::new([Some(""), None]));
        let dispatcher = KeyDispatcher::spawn(runner.clone(), CommandTemplates::default(), 4);
        assert!(dispatcher.dispatch(4));
        assert!(dispatcher.dispatch(187));
        dispatcher.drain();
        assert_eq!(
            runner.calls(),
            vec!["input keyevent 4".to_string(), "input keyevent 187".to_string()]
        );
    }

    #[test]
    fn full_queue_drops_presses() {
        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel();
        let runner = Arc::new(GatedRunner {
            calls: Mutex::new(Vec::new()),
            started: Mutex::new(started_tx),
            gate: Mutex::new(gate_rx),
        });
        let dispatcher = KeyDispatcher::spawn(runner.clone(), CommandTemplates::default(), 2);

        assert!(dispatcher.dispatch(4));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        // Worker is blocked on the first press; two more fit, the next doesn't.
        assert!(dispatcher.dispatch(3));
        assert!(dispatcher.dispatch(187));
        assert!(!dispatcher.dispatch(4));

        drop(gate_tx);
        dispatcher.drain();
        assert_eq!(
            *runner.calls.lock(),
            vec![
                "input keyevent 4".to_string(),
                "input keyevent 3".to_string(),
                "input keyevent 187".to_string(),
            ]
        );
    }

    #[test]
    fn shutdown_does_not_wait_for_queued_presses() {
        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel();
        let runner = Arc::new(GatedRunner {
            calls: Mutex::new(Vec::new()),
            started: Mutex::new(started_tx),
            gate: Mutex::new(gate_rx),
        });
        let dispatcher = KeyDispatcher::spawn(runner.clone(), CommandTemplates::default(), 8);
        assert!(dispatcher.dispatch(4));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        for _ in 0..4 {
            assert!(dispatcher.dispatch(3));
        }

        let started = Instant::now();
        dispatcher.shutdown();
        assert!(started.elapsed() < Duration::from_secs(1));

        // Release the in-flight press; the queued ones are discarded.
        drop(gate_tx);
        assert!(started_rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert_eq!(runner.calls.lock().len(), 1);
    }
}
