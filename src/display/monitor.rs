use std::pin::Pin;
use std::sync::Arc;
use std::sync::mpsc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::StreamExt;
use futures::channel::mpsc as async_mpsc;
use tracing::{debug, info};

use super::{DisplayState, DisplayTracker, parse_enumeration};
use crate::channel::CommandRunner;

/// Fixed-interval display poller bound to its owner's lifetime.
///
/// Each tick runs one enumeration query and waits for it to finish before
/// sleeping, so ticks never queue up behind a slow channel. Dropping the
/// handle signals the worker; `stop` also waits for it to exit.
pub struct DisplayMonitor {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DisplayMonitor {
    /// `sink` receives every published change and returns `false` once
    /// nobody is listening anymore.
    pub fn spawn<F>(
        runner: Arc<dyn CommandRunner>,
        command: String,
        interval: Duration,
        mut sink: F,
    ) -> Self
    where
        F: FnMut(DisplayState) -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = thread::spawn(move || {
            let mut tracker = DisplayTracker::new();
            loop {
                let output = runner.execute(&command);
                let observation = parse_enumeration(output.as_deref());
                if let Some(state) = tracker.observe(&observation) {
                    info!(
                        connected = state.connected,
                        display_id = ?state.display_id,
                        "display state changed"
                    );
                    if !sink(state) {
                        debug!("display listener gone, monitor stopping");
                        break;
                    }
                }
                match stop_rx.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
            debug!("display monitor exited");
        });

        Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }
    }

    /// Stop polling and wait for an in-flight tick to finish.
    pub fn stop(mut self) {
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DisplayMonitor {
    fn drop(&mut self) {
        self.stop_tx.take();
    }
}

/// Published display changes as a stream. The monitor lives exactly as long
/// as the stream does.
pub struct DisplayStream<T = DisplayState> {
    rx: async_mpsc::UnboundedReceiver<T>,
    _monitor: DisplayMonitor,
}

impl DisplayStream {
    pub fn spawn(runner: Arc<dyn CommandRunner>, command: String, interval: Duration) -> Self {
        Self::spawn_map(runner, command, interval, |state| state)
    }
}

impl<T: Send + 'static> DisplayStream<T> {
    /// Like `spawn`, with `f` applied to each change on the monitor thread,
    /// so blocking follow-up work stays off the consumer.
    pub fn spawn_map<F>(
        runner: Arc<dyn CommandRunner>,
        command: String,
        interval: Duration,
        mut f: F,
    ) -> Self
    where
        F: FnMut(DisplayState) -> T + Send + 'static,
    {
        let (tx, rx) = async_mpsc::unbounded();
        let monitor = DisplayMonitor::spawn(runner, command, interval, move |state| {
            tx.unbounded_send(f(state)).is_ok()
        });
        Self {
            rx,
            _monitor: monitor,
        }
    }
}

impl<T> futures::Stream for DisplayStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::ScriptedRunner;
    use crate::overlay::OverlayManager;
    use crate::overlay::testing::FakeSurface;
    use parking_lot::Mutex;
    use std::time::Instant;

    fn wait_for_calls(runner: &ScriptedRunner, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while runner.calls().len() < n && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn five_tick_scenario_publishes_three_changes() {
        let runner = Arc::new(ScriptedRunner::new([
            Some(""),
            Some(""),
            Some("2"),
            Some("2"),
            Some(""),
        ]));
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&published);
        let monitor = DisplayMonitor::spawn(
            runner.clone(),
            "enumerate".to_string(),
            Duration::from_millis(10),
            move |state| {
                sink.lock().push(state);
                true
            },
        );
        wait_for_calls(&runner, 5);
        monitor.stop();

        // Past the script the runner fails, which reads as disconnected again.
        let published = published.lock().clone();
        assert_eq!(
            published,
            vec![
                DisplayState::disconnected(),
                DisplayState::connected(2),
                DisplayState::disconnected(),
            ]
        );
        assert!(runner.calls().iter().all(|c| c == "enumerate"));

        let mut overlay = OverlayManager::new(FakeSurface::default());
        for state in &published {
            overlay.sync(state).unwrap();
        }
        let surface = overlay.surface();
        assert_eq!(surface.binds, 1);
        assert_eq!(surface.releases, 1);
        assert_eq!(surface.created.len(), 3);
        assert_eq!(surface.destroyed.len(), 3);
    }

    #[test]
    fn stop_is_prompt_with_long_interval() {
        let runner = Arc::new(ScriptedRunner::new([Some("3")]));
        let monitor = DisplayMonitor::spawn(
            runner.clone(),
            "enumerate".to_string(),
            Duration::from_secs(60),
            |_| true,
        );
        wait_for_calls(&runner, 1);
        let started = Instant::now();
        monitor.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn monitor_stops_when_listener_is_gone() {
        let runner = Arc::new(ScriptedRunner::new([Some("2"), Some(""), Some("4")]));
        let monitor = DisplayMonitor::spawn(
            runner.clone(),
            "enumerate".to_string(),
            Duration::from_millis(5),
            |_| false,
        );
        monitor.stop();
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn stream_yields_published_states() {
        let runner = Arc::new(ScriptedRunner::new([Some("mDisplayId=9")]));
        let mut stream =
            DisplayStream::spawn(runner, "enumerate".to_string(), Duration::from_millis(5));
        let first = futures::executor::block_on(stream.next());
        assert_eq!(first, Some(DisplayState::connected(9)));
        let second = futures::executor::block_on(stream.next());
        assert_eq!(second, Some(DisplayState::disconnected()));
    }

    #[test]
    fn mapped_stream_runs_on_monitor_thread() {
        let runner = Arc::new(ScriptedRunner::new([Some("4")]));
        let consumer = thread::current().id();
        let mut stream = DisplayStream::spawn_map(
            runner,
            "enumerate".to_string(),
            Duration::from_millis(5),
            move |state| (state, thread::current().id() != consumer),
        );
        let first = futures::executor::block_on(stream.next());
        assert_eq!(first, Some((DisplayState::connected(4), true)));
    }
}
