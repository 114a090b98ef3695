use std::sync::Arc;

use iced::widget::space;
use iced::{Color, Element, Subscription, Task};
use iced_layershell::build_pattern::daemon;
use iced_layershell::settings::{LayerShellSettings, StartMode};
use iced_layershell::to_layer_message;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::apps::ShellAppCatalog;
use crate::channel::CommandChannel;
use crate::config::Config;
use crate::display::DisplayState;
use crate::ipc::{self, IpcContext, MonitorContext};
use crate::launch::Launcher;
use crate::notify::Notifier;
use crate::overlay::dispatch::KeyDispatcher;
use crate::overlay::layer::{IcedId, LayerSurface, SurfaceRequest};
use crate::overlay::{NavButton, OverlayManager, OverlayState, WindowSlot};
use crate::theme::{self, BarColors};

/// What the control socket reports. Written only by the UI loop, after the
/// overlay has been reconciled, so readers never see a display the overlay
/// hasn't caught up with.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct StatusSnapshot {
    /// No enumeration has completed yet.
    pub(crate) detecting: bool,
    pub(crate) display: DisplayState,
    pub(crate) overlay: OverlayState,
    /// Display the overlay windows are bound to.
    pub(crate) overlay_display: Option<u32>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            detecting: true,
            display: DisplayState::disconnected(),
            overlay: OverlayState::Absent,
            overlay_display: None,
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct SharedStatus(Arc<RwLock<StatusSnapshot>>);

impl SharedStatus {
    pub(crate) fn snapshot(&self) -> StatusSnapshot {
        self.0.read().clone()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        let mut guard = self.0.write();
        f(&mut *guard);
    }

    /// Identity for subscription hashing.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

pub(crate) struct PortalBar {
    pub(crate) colors: BarColors,
    overlay: OverlayManager<LayerSurface>,
    keys: Option<KeyDispatcher>,
    channel: Arc<CommandChannel>,
    notifier: Notifier,
    /// Last published display state; `None` while detecting.
    display: Option<DisplayState>,
    status: SharedStatus,
    /// Display whose attach failed; retried on every poll tick.
    retry_display: Option<u32>,
    retry_ms: u64,
    /// Set by `Quit`; drops the monitor and retry subscriptions.
    quitting: bool,
    monitor: MonitorContext,
    ipc: IpcContext,
}

#[to_layer_message(multi)]
#[derive(Debug, Clone)]
pub(crate) enum Message {
    /// New display state and the outputs enumerated alongside it.
    DisplayChanged(DisplayState, Vec<String>),
    RetryAttach(Vec<String>),
    Nav(NavButton),
    Collapse,
    Expand,
    Notify(String),
    Quit,
}

pub(crate) fn run() -> Result<(), iced_layershell::Error> {
    info!(
        version = env!("PORTAL_BAR_VERSION"),
        commit = env!("PORTAL_BAR_COMMIT"),
        "starting in background mode"
    );

    let settings = LayerShellSettings {
        start_mode: StartMode::Background,
        ..Default::default()
    };

    daemon(PortalBar::new, PortalBar::namespace, PortalBar::update, PortalBar::view)
        .style(PortalBar::style)
        .subscription(PortalBar::subscription)
        .layer_settings(settings)
        .run()
}

/// Notification text for a newly published state. The very first state is
/// only announced when a display is already there or detection failed. A
/// disconnect that only clears an earlier error is silent.
pub(crate) fn status_message(
    state: &DisplayState,
    previous: Option<&DisplayState>,
) -> Option<String> {
    if let Some(error) = &state.last_error {
        return Some(error.clone());
    }
    match (state.display_id, previous) {
        (Some(id), _) if state.connected => {
            Some(format!("External display connected (display {id})"))
        }
        (_, Some(prev)) if prev.connected => Some("External display disconnected".to_string()),
        _ => None,
    }
}

impl PortalBar {
    fn new() -> (Self, Task<Message>) {
        let config = Config::load().unwrap_or_else(|e| {
            error!("{e}; using defaults");
            Config::default()
        });
        debug!(?config, "configuration loaded");

        let channel = Arc::new(CommandChannel::from_config(&config));
        let status = SharedStatus::default();
        let launcher = Arc::new(Launcher::new(channel.clone(), config.commands.clone()));
        let catalog = Arc::new(ShellAppCatalog::new(
            channel.clone(),
            config.commands.list_apps.clone(),
        ));
        let colors = theme::resolve(config.theme);
        debug!(dark = colors.is_dark, "palette resolved");
        let keys = KeyDispatcher::spawn(
            channel.clone(),
            config.commands.clone(),
            config.key_queue_capacity,
        );

        (
            Self {
                colors,
                overlay: OverlayManager::new(LayerSurface::new(config.outputs.clone())),
                keys: Some(keys),
                channel: channel.clone(),
                notifier: Notifier::new(config.notifications),
                display: None,
                status: status.clone(),
                retry_display: None,
                retry_ms: config.poll_interval().as_millis() as u64,
                quitting: false,
                monitor: MonitorContext {
                    runner: channel,
                    command: config.commands.enumerate_displays.clone(),
                    interval: config.poll_interval(),
                },
                ipc: IpcContext {
                    status,
                    launcher,
                    catalog,
                },
            },
            Task::none(),
        )
    }

    fn namespace() -> String {
        String::from("portal-bar")
    }

    /// Every update drains the layer-shell requests the overlay queued.
    fn update(&mut self, message: Message) -> Task<Message> {
        let task = self.handle(message);
        let surface = self.overlay.surface_mut();
        let mut tasks = Vec::new();
        for request in surface.take_requests() {
            match request {
                SurfaceRequest::Open { handle, settings } => {
                    let (id, open) = Message::layershell_open(settings);
                    surface.opened(handle, id);
                    tasks.push(open);
                }
                SurfaceRequest::Remove(id) => tasks.push(Task::done(Message::RemoveWindow(id))),
            }
        }
        tasks.push(task);
        Task::batch(tasks)
    }

    fn handle(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::DisplayChanged(state, outputs) => {
                self.overlay.surface_mut().set_outputs(outputs);
                let previous = self.display.take();
                match self.overlay.sync(&state) {
                    Ok(overlay) => {
                        self.retry_display = None;
                        debug!(?overlay, "overlay reconciled");
                    }
                    Err(e) => {
                        error!(error = %e, "overlay attach failed");
                        self.retry_display = state.display_id.filter(|_| state.connected);
                    }
                }
                self.display = Some(state.clone());
                self.publish_status();
                if let Some(text) = status_message(&state, previous.as_ref()) {
                    self.notifier.show(&text);
                }
                Task::none()
            }
            Message::RetryAttach(outputs) => {
                self.overlay.surface_mut().set_outputs(outputs);
                if let Some(display_id) = self.retry_display {
                    match self.overlay.start(display_id) {
                        Ok(_) => {
                            self.retry_display = None;
                            self.publish_status();
                        }
                        Err(e) => debug!(display_id, error = %e, "overlay attach retry failed"),
                    }
                }
                Task::none()
            }
            Message::Nav(button) => {
                match (self.overlay.press(button), &self.keys) {
                    (Some(keycode), Some(keys)) => {
                        keys.dispatch(keycode);
                    }
                    (None, _) => debug!(?button, "press ignored, bar not expanded"),
                    (_, None) => {}
                }
                Task::none()
            }
            Message::Collapse => {
                if self.overlay.collapse() {
                    self.publish_status();
                }
                Task::none()
            }
            Message::Expand => {
                if self.overlay.expand() {
                    self.publish_status();
                }
                Task::none()
            }
            Message::Notify(text) => {
                self.notifier.show(&text);
                Task::none()
            }
            Message::Quit => {
                info!(session_open = self.channel.is_open(), "shutting down");
                self.quitting = true;
                self.overlay.stop();
                self.retry_display = None;
                self.publish_status();
                if let Some(keys) = self.keys.take() {
                    keys.shutdown();
                }
                // Closing waits for any in-flight round trip; keep that off
                // the UI loop. Once closed, late ticks fail instead of
                // respawning the shell.
                let channel = Arc::clone(&self.channel);
                std::thread::spawn(move || channel.close());
                if let Err(e) = std::fs::remove_file(ipc::socket_path()) {
                    warn!("could not remove socket: {e}");
                }
                iced::exit()
            }
            _ => Task::none(),
        }
    }

    fn publish_status(&self) {
        let display = self.display.clone();
        let overlay = self.overlay.state();
        let overlay_display = self.overlay.group().map(|g| g.display_id);
        self.status.update(|s| {
            s.detecting = display.is_none();
            s.display = display.unwrap_or_default();
            s.overlay = overlay;
            s.overlay_display = overlay_display;
        });
    }

    fn view(&self, window_id: IcedId) -> Element<'_, Message> {
        match self.overlay.surface().slot_for(window_id) {
            Some(WindowSlot::Main) => self.view_main_bar(),
            Some(slot @ (WindowSlot::LeftExpander | WindowSlot::RightExpander)) => {
                self.view_expander(slot)
            }
            None => space::Space::new().height(0).width(0).into(),
        }
    }

    fn subscription(state: &Self) -> Subscription<Message> {
        let mut subs = vec![Subscription::run_with(state.ipc.clone(), ipc::socket_listener)];
        if state.quitting {
            return Subscription::batch(subs);
        }

        subs.push(Subscription::run_with(state.monitor.clone(), ipc::display_stream));
        if state.retry_display.is_some() {
            subs.push(Subscription::run_with(state.retry_ms, ipc::tick_stream));
        }

        Subscription::batch(subs)
    }

    fn style(&self, _theme: &iced::Theme) -> iced::theme::Style {
        iced::theme::Style {
            background_color: Color::TRANSPARENT,
            text_color: self.colors.icon,
        }
    }
}
