use std::collections::HashMap;

use iced_layershell::reexport::{
    Anchor, KeyboardInteractivity, Layer, NewLayerShellSettings, OutputOption,
};
use tracing::{debug, info, warn};

use super::{WindowHandle, WindowSlot, WindowSurface};
use crate::error::OverlayError;
use crate::util;

pub(crate) type IcedId = iced_layershell::reexport::IcedId;

const MAIN_SIZE: (u32, u32) = (280, 64);
const EXPANDER_SIZE: (u32, u32) = (48, 48);
const SIDE_MARGIN: i32 = 16;
const BOTTOM_MARGIN: i32 = 8;

struct LayerWindow {
    slot: WindowSlot,
    surface_id: Option<IcedId>,
}

/// A layer-shell request for the UI loop to turn into a task.
pub(crate) enum SurfaceRequest {
    /// Open a surface for `handle`; report its id back with `opened`.
    Open {
        handle: WindowHandle,
        settings: NewLayerShellSettings,
    },
    Remove(IcedId),
}

/// `WindowSurface` on Wayland layer-shell overlays.
///
/// Showing a window opens its layer surface on the bound output, hiding
/// removes it. Requests are queued; the UI loop drains them with
/// `take_requests` after every update. Nothing here spawns processes:
/// output enumeration happens off the UI loop and arrives via `set_outputs`.
pub struct LayerSurface {
    output_names: HashMap<String, String>,
    outputs: Vec<String>,
    output: Option<String>,
    windows: HashMap<WindowHandle, LayerWindow>,
    next_handle: u64,
    pending: Vec<SurfaceRequest>,
}

impl LayerSurface {
    /// `output_names` maps display ids to output names ahead of enumeration.
    pub fn new(output_names: HashMap<String, String>) -> Self {
        Self {
            output_names,
            outputs: Vec::new(),
            output: None,
            windows: HashMap::new(),
            next_handle: 0,
            pending: Vec::new(),
        }
    }

    /// Latest output enumeration, primary first.
    pub fn set_outputs(&mut self, outputs: Vec<String>) {
        if !outputs.is_empty() {
            self.outputs = outputs;
        }
    }

    pub(crate) fn take_requests(&mut self) -> Vec<SurfaceRequest> {
        std::mem::take(&mut self.pending)
    }

    /// Record the iced surface opened for `handle`. Returns `false` if the
    /// window is gone.
    pub fn opened(&mut self, handle: WindowHandle, surface_id: IcedId) -> bool {
        match self.windows.get_mut(&handle) {
            Some(window) => {
                window.surface_id = Some(surface_id);
                true
            }
            None => false,
        }
    }

    /// Which overlay window an iced surface belongs to.
    pub fn slot_for(&self, surface_id: IcedId) -> Option<WindowSlot> {
        self.windows
            .values()
            .find(|w| w.surface_id == Some(surface_id))
            .map(|w| w.slot)
    }

    fn resolve_output(&self, display_id: u32) -> Option<String> {
        if let Some(name) = self.output_names.get(&display_id.to_string()) {
            return Some(name.clone());
        }
        // Display ids count outputs in enumeration order, 0 being the primary.
        let name = self.outputs.get(display_id as usize).cloned();
        if let Some(name) = &name {
            warn!(
                display_id,
                output = %name,
                "no configured output for display, guessing by enumeration order"
            );
        }
        name
    }

    fn open_pending(&self, handle: WindowHandle) -> bool {
        self.pending
            .iter()
            .any(|r| matches!(r, SurfaceRequest::Open { handle: h, .. } if *h == handle))
    }

    fn cancel_open(&mut self, handle: WindowHandle) {
        self.pending
            .retain(|r| !matches!(r, SurfaceRequest::Open { handle: h, .. } if *h == handle));
    }

    fn window(&mut self, handle: WindowHandle) -> Result<&mut LayerWindow, OverlayError> {
        self.windows
            .get_mut(&handle)
            .ok_or_else(|| OverlayError::Window(format!("unknown window {handle:?}")))
    }
}

impl WindowSurface for LayerSurface {
    fn bind_display(&mut self, display_id: u32) -> Result<(), OverlayError> {
        let output = self
            .resolve_output(display_id)
            .ok_or(OverlayError::DisplayUnavailable(display_id))?;
        info!(display_id, output = %output, "overlay bound to output");
        self.output = Some(output);
        Ok(())
    }

    fn create_window(&mut self, slot: WindowSlot) -> Result<WindowHandle, OverlayError> {
        if self.output.is_none() {
            return Err(OverlayError::Window("no output bound".to_string()));
        }
        self.next_handle += 1;
        let handle = WindowHandle(self.next_handle);
        self.windows.insert(
            handle,
            LayerWindow {
                slot,
                surface_id: None,
            },
        );
        debug!(?handle, title = slot.title(), "overlay window created");
        Ok(handle)
    }

    fn show_window(&mut self, handle: WindowHandle) -> Result<(), OverlayError> {
        let output = self
            .output
            .clone()
            .ok_or_else(|| OverlayError::Window("no output bound".to_string()))?;
        let window = self.window(handle)?;
        if window.surface_id.is_some() {
            return Ok(());
        }
        let settings = window_settings(window.slot, &output);
        if !self.open_pending(handle) {
            self.pending.push(SurfaceRequest::Open { handle, settings });
        }
        Ok(())
    }

    fn hide_window(&mut self, handle: WindowHandle) -> Result<(), OverlayError> {
        match self.window(handle)?.surface_id.take() {
            Some(id) => self.pending.push(SurfaceRequest::Remove(id)),
            None => self.cancel_open(handle),
        }
        Ok(())
    }

    fn destroy_window(&mut self, handle: WindowHandle) -> Result<(), OverlayError> {
        self.hide_window(handle)?;
        self.windows.remove(&handle);
        Ok(())
    }

    fn release_display(&mut self) {
        self.pending
            .retain(|r| !matches!(r, SurfaceRequest::Open { .. }));
        for (_, window) in self.windows.drain() {
            if let Some(id) = window.surface_id {
                self.pending.push(SurfaceRequest::Remove(id));
            }
        }
        self.output = None;
    }
}

/// Overlay-layer surface for `slot` on `output`: no keyboard focus, input
/// only inside its own bounds.
pub(crate) fn window_settings(slot: WindowSlot, output: &str) -> NewLayerShellSettings {
    let (anchor, size, margin) = match slot {
        WindowSlot::Main => (Anchor::Bottom, MAIN_SIZE, (0, 0, BOTTOM_MARGIN, 0)),
        WindowSlot::LeftExpander => (
            Anchor::Bottom | Anchor::Left,
            EXPANDER_SIZE,
            (0, 0, BOTTOM_MARGIN, SIDE_MARGIN),
        ),
        WindowSlot::RightExpander => (
            Anchor::Bottom | Anchor::Right,
            EXPANDER_SIZE,
            (0, SIDE_MARGIN, BOTTOM_MARGIN, 0),
        ),
    };
    NewLayerShellSettings {
        layer: Layer::Overlay,
        anchor,
        keyboard_interactivity: KeyboardInteractivity::None,
        exclusive_zone: Some(-1),
        size: Some(size),
        margin: Some(margin),
        events_transparent: false,
        output_option: OutputOption::OutputName(output.to_string()),
        ..Default::default()
    }
}

/// Wayland output names, primary first. Tries cosmic-randr, then wlr-randr.
pub(crate) fn enumerate_outputs() -> Vec<String> {
    let result = std::process::Command::new("cosmic-randr")
        .arg("list")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .or_else(|| {
            std::process::Command::new("wlr-randr")
                .output()
                .ok()
                .filter(|o| o.status.success())
        });
    let Some(result) = result else {
        return Vec::new();
    };
    parse_output_names(&String::from_utf8_lossy(&result.stdout))
}

/// Output headers are the unindented lines; the name is their first word.
fn parse_output_names(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(util::strip_ansi)
        .filter(|line| !line.starts_with(' ') && !line.starts_with('\t') && !line.is_empty())
        .filter_map(|line| line.split_whitespace().next().map(String::from))
        .collect()
}
