use std::hash::{Hash, Hasher};
use std::io::{BufRead, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::{Message, SharedStatus};
use crate::apps::{AppCatalog, AppDescriptor};
use crate::channel::CommandRunner;
use crate::display::monitor::DisplayStream;
use crate::launch::Launcher;
use crate::overlay::NavButton;
use crate::overlay::layer::enumerate_outputs;

/// How long a client may take to send its command line.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) fn socket_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(runtime_dir).join("portal-bar.sock")
}

/// One control-socket command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Request {
    Status,
    Apps,
    Launch(String),
    Nav(NavButton),
    Collapse,
    Expand,
    Quit,
}

pub(crate) fn parse_request(line: &str) -> Option<Request> {
    let line = line.trim();
    let request = match line {
        "status" => Request::Status,
        "apps" => Request::Apps,
        "back" => Request::Nav(NavButton::Back),
        "home" => Request::Nav(NavButton::Home),
        "recents" => Request::Nav(NavButton::Recents),
        "collapse" => Request::Collapse,
        "expand" => Request::Expand,
        "quit" => Request::Quit,
        cmd if cmd.starts_with("launch ") => {
            let package = cmd["launch ".len()..].trim();
            if package.is_empty() {
                return None;
            }
            Request::Launch(package.to_string())
        }
        _ => return None,
    };
    Some(request)
}

/// Everything the socket thread needs to answer queries without the UI loop.
#[derive(Clone)]
pub(crate) struct IpcContext {
    pub(crate) status: SharedStatus,
    pub(crate) launcher: Arc<Launcher>,
    pub(crate) catalog: Arc<dyn AppCatalog + Send + Sync>,
}

impl Hash for IpcContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.status.id().hash(state);
    }
}

/// Answer `request`. Returns the message for the UI loop, if any, and the
/// reply for the client, if any. Launches run here, on the socket thread.
pub(crate) fn handle_request(
    request: Request,
    ctx: &IpcContext,
) -> (Option<Message>, Option<String>) {
    match request {
        Request::Status => (None, Some(to_json(&ctx.status.snapshot()))),
        Request::Apps => (None, Some(to_json(&ctx.catalog.list()))),
        Request::Launch(package) => {
            let display = ctx.status.snapshot().display;
            let app = AppDescriptor::new(package.clone(), package);
            let text = match ctx.launcher.launch(&app, &display) {
                Ok(report) => {
                    debug!(component = %report.component, "launch reported");
                    report.to_string()
                }
                Err(e) => {
                    warn!(package = %app.package, error = %e, "launch failed");
                    e.to_string()
                }
            };
            (Some(Message::Notify(text.clone())), Some(text))
        }
        Request::Nav(button) => (Some(Message::Nav(button)), None),
        Request::Collapse => (Some(Message::Collapse), None),
        Request::Expand => (Some(Message::Expand), None),
        Request::Quit => (Some(Message::Quit), None),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

pub(crate) fn socket_listener(ctx: &IpcContext) -> mpsc::UnboundedReceiver<Message> {
    let ctx = ctx.clone();
    let (tx, rx) = mpsc::unbounded();
    std::thread::spawn(move || {
        let path = socket_path();
        let _ = std::fs::remove_file(&path);
        let listener = match UnixListener::bind(&path) {
            Ok(l) => l,
            Err(e) => {
                error!("failed to bind socket {path:?}: {e}");
                return;
            }
        };
        // The socket can trigger privileged commands.
        if let Err(e) = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)) {
            warn!("could not restrict socket permissions: {e}");
        }
        info!("listening on {path:?}");
        // One thread per connection: a slow launch or a silent client must
        // not hold up `quit` or `status`.
        for stream in listener.incoming().flatten() {
            if tx.is_closed() {
                break;
            }
            let ctx = ctx.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                if let Some(msg) = serve(&stream, &ctx) {
                    let _ = tx.unbounded_send(msg);
                }
            });
        }
    });
    rx
}

fn serve(stream: &UnixStream, ctx: &IpcContext) -> Option<Message> {
    if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
        debug!("could not set socket read timeout: {e}");
    }
    let mut buf = String::new();
    if let Err(e) = std::io::BufReader::new(stream).read_line(&mut buf) {
        debug!("socket read failed: {e}");
        return None;
    }
    let Some(request) = parse_request(&buf) else {
        warn!("unknown command: {:?}", buf.trim());
        let _ = writeln!(&*stream, "unknown command: {}", buf.trim());
        return None;
    };
    debug!(?request, "control request");
    let (msg, reply) = handle_request(request, ctx);
    if let Some(reply) = reply {
        if let Err(e) = writeln!(&*stream, "{reply}") {
            debug!("socket write failed: {e}");
        }
    }
    msg
}

/// Inputs of the display monitor subscription.
#[derive(Clone)]
pub(crate) struct MonitorContext {
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) command: String,
    pub(crate) interval: Duration,
}

impl Hash for MonitorContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.runner) as *const () as usize).hash(state);
        self.command.hash(state);
        self.interval.hash(state);
    }
}

/// Display changes, each with a fresh output list when a display is
/// connected. Both queries run on the monitor thread.
pub(crate) fn display_stream(ctx: &MonitorContext) -> DisplayStream<Message> {
    DisplayStream::spawn_map(
        ctx.runner.clone(),
        ctx.command.clone(),
        ctx.interval,
        |state| {
            let outputs = if state.connected {
                enumerate_outputs()
            } else {
                Vec::new()
            };
            Message::DisplayChanged(state, outputs)
        },
    )
}

/// Attach retries. Outputs are re-enumerated here, off the UI loop.
pub(crate) fn tick_stream(ms: &u64) -> mpsc::UnboundedReceiver<Message> {
    let ms = *ms;
    let (tx, rx) = mpsc::unbounded();
    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_millis(ms));
        if tx.unbounded_send(Message::RetryAttach(enumerate_outputs())).is_err() {
            break;
        }
    });
    rx
}
