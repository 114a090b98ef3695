pub mod dispatch;
pub mod layer;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::display::{DisplayState, PRIMARY_DISPLAY_ID};
use crate::error::OverlayError;

/// The three windows of the navigation overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowSlot {
    /// Back / home / recents / collapse, bottom-center.
    Main,
    /// Expand button, bottom-start.
    LeftExpander,
    /// Expand button, bottom-end.
    RightExpander,
}

impl WindowSlot {
    pub const ALL: [WindowSlot; 3] = [
        WindowSlot::Main,
        WindowSlot::LeftExpander,
        WindowSlot::RightExpander,
    ];

    pub fn title(self) -> &'static str {
        match self {
            WindowSlot::Main => "PortalBarMain",
            WindowSlot::LeftExpander => "PortalBarLeftExpander",
            WindowSlot::RightExpander => "PortalBarRightExpander",
        }
    }
}

/// Opaque id handed out by a `WindowSurface`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// Platform window operations the overlay needs. All calls happen on the
/// context that owns the windowing surface.
pub trait WindowSurface {
    /// Acquire a rendering context for `display_id`.
    fn bind_display(&mut self, display_id: u32) -> Result<(), OverlayError>;
    /// Create an always-on-top, non-focusable window for `slot`, initially hidden.
    fn create_window(&mut self, slot: WindowSlot) -> Result<WindowHandle, OverlayError>;
    fn show_window(&mut self, window: WindowHandle) -> Result<(), OverlayError>;
    fn hide_window(&mut self, window: WindowHandle) -> Result<(), OverlayError>;
    fn destroy_window(&mut self, window: WindowHandle) -> Result<(), OverlayError>;
    fn release_display(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverlayState {
    Absent,
    Expanded,
    Collapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayWindows {
    pub main: WindowHandle,
    pub left_expander: WindowHandle,
    pub right_expander: WindowHandle,
}

impl OverlayWindows {
    fn all(&self) -> [WindowHandle; 3] {
        [self.main, self.left_expander, self.right_expander]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayWindowGroup {
    pub display_id: u32,
    pub windows: OverlayWindows,
    pub expanded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavButton {
    Back,
    Home,
    Recents,
}

impl NavButton {
    pub fn keycode(self) -> u32 {
        match self {
            NavButton::Back => 4,
            NavButton::Home => 3,
            NavButton::Recents => 187,
        }
    }
}

/// Owns the single overlay window group and its expanded/collapsed state.
///
/// ```text
/// Absent --start(id)--> Expanded <--collapse/expand--> Collapsed
///   ^                      |                              |
///   +-------- stop --------+------------------------------+
/// ```
pub struct OverlayManager<S: WindowSurface> {
    surface: S,
    group: Option<OverlayWindowGroup>,
}

impl<S: WindowSurface> OverlayManager<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            group: None,
        }
    }

    pub fn state(&self) -> OverlayState {
        match &self.group {
            None => OverlayState::Absent,
            Some(g) if g.expanded => OverlayState::Expanded,
            Some(_) => OverlayState::Collapsed,
        }
    }

    pub fn group(&self) -> Option<&OverlayWindowGroup> {
        self.group.as_ref()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Attach the overlay to `display_id`, starting `Expanded`.
    ///
    /// A group already bound to the same display is left alone; one bound to
    /// another display is torn down first. On failure the manager is `Absent`.
    pub fn start(&mut self, display_id: u32) -> Result<OverlayState, OverlayError> {
        if display_id == PRIMARY_DISPLAY_ID {
            return Err(OverlayError::PrimaryDisplay(display_id));
        }
        if let Some(group) = &self.group {
            if group.display_id == display_id {
                debug!(display_id, "overlay already attached");
                return Ok(self.state());
            }
            info!(from = group.display_id, to = display_id, "display changed, re-attaching overlay");
            self.stop();
        }

        self.surface.bind_display(display_id)?;
        let windows = match self.create_windows() {
            Ok(w) => w,
            Err(e) => {
                self.surface.release_display();
                return Err(OverlayError::AttachFailed {
                    display_id,
                    reason: e.to_string(),
                });
            }
        };
        self.group = Some(OverlayWindowGroup {
            display_id,
            windows,
            expanded: true,
        });

        if let Err(e) = self.apply_visibility() {
            self.stop();
            return Err(OverlayError::AttachFailed {
                display_id,
                reason: e.to_string(),
            });
        }
        info!(display_id, "overlay attached");
        Ok(OverlayState::Expanded)
    }

    /// Tear the group down. Every window is removed individually so one
    /// failure never strands the others. No-op when `Absent`.
    pub fn stop(&mut self) {
        let Some(group) = self.group.take() else {
            return;
        };
        for window in group.windows.all() {
            self.destroy_quietly(window);
        }
        self.surface.release_display();
        info!(display_id = group.display_id, "overlay detached");
    }

    /// Follow a published display state.
    pub fn sync(&mut self, display: &DisplayState) -> Result<OverlayState, OverlayError> {
        match (display.connected, display.display_id) {
            (true, Some(id)) => self.start(id),
            _ => {
                self.stop();
                Ok(OverlayState::Absent)
            }
        }
    }

    /// `Expanded -> Collapsed`. Returns whether anything changed.
    pub fn collapse(&mut self) -> bool {
        self.set_expanded(false)
    }

    /// `Collapsed -> Expanded`. Returns whether anything changed.
    pub fn expand(&mut self) -> bool {
        self.set_expanded(true)
    }

    /// Key code to inject for `button`; buttons only exist while expanded.
    pub fn press(&self, button: NavButton) -> Option<u32> {
        (self.state() == OverlayState::Expanded).then(|| button.keycode())
    }

    fn set_expanded(&mut self, expanded: bool) -> bool {
        match &mut self.group {
            Some(group) if group.expanded != expanded => group.expanded = expanded,
            _ => return false,
        }
        if let Err(e) = self.apply_visibility() {
            warn!(error = %e, "overlay visibility update failed");
        }
        debug!(state = ?self.state(), "overlay folded");
        true
    }

    /// Hide before show, so main and an expander are never up together.
    fn apply_visibility(&mut self) -> Result<(), OverlayError> {
        let Some(group) = &self.group else {
            return Ok(());
        };
        let w = group.windows;
        let (hide, show) = if group.expanded {
            (vec![w.left_expander, w.right_expander], vec![w.main])
        } else {
            (vec![w.main], vec![w.left_expander, w.right_expander])
        };
        let mut first_err = None;
        for window in hide {
            if let Err(e) = self.surface.hide_window(window) {
                first_err.get_or_insert(e);
            }
        }
        for window in show {
            if let Err(e) = self.surface.show_window(window) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn create_windows(&mut self) -> Result<OverlayWindows, OverlayError> {
        let mut created: Vec<WindowHandle> = Vec::with_capacity(WindowSlot::ALL.len());
        for slot in WindowSlot::ALL {
            match self.surface.create_window(slot) {
                Ok(handle) => created.push(handle),
                Err(e) => {
                    for handle in created {
                        self.destroy_quietly(handle);
                    }
                    return Err(e);
                }
            }
        }
        match created[..] {
            [main, left_expander, right_expander] => Ok(OverlayWindows {
                main,
                left_expander,
                right_expander,
            }),
            _ => Err(OverlayError::Window("unexpected window count".to_string())),
        }
    }

    fn destroy_quietly(&mut self, window: WindowHandle) {
        if let Err(e) = self.surface.destroy_window(window) {
            warn!(?window, error = %e, "failed to remove overlay window");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeSurface;
    use super::*;

    fn attached() -> OverlayManager<FakeSurface> {
        let mut overlay = OverlayManager::new(FakeSurface::default());
        assert_eq!(overlay.start(2), Ok(OverlayState::Expanded));
        overlay
    }

    fn assert_consistent(overlay: &OverlayManager<FakeSurface>) {
        let visible = overlay.surface().visible_slots();
        match overlay.state() {
            OverlayState::Expanded => assert_eq!(visible, vec![WindowSlot::Main]),
            OverlayState::Collapsed => assert_eq!(
                visible,
                vec![WindowSlot::LeftExpander, WindowSlot::RightExpander]
            ),
            OverlayState::Absent => assert!(visible.is_empty()),
        }
    }

    #[test]
    fn attach_starts_expanded() {
        let overlay = attached();
        let surface = overlay.surface();
        assert_eq!(surface.binds, 1);
        let slots: Vec<_> = surface.created.iter().map(|(_, s)| *s).collect();
        assert_eq!(slots, WindowSlot::ALL.to_vec());
        assert_eq!(overlay.group().map(|g| g.display_id), Some(2));
        assert_consistent(&overlay);
    }

    #[test]
    fn collapse_then_expand_round_trips() {
        let mut overlay = attached();
        assert!(overlay.collapse());
        assert_eq!(overlay.state(), OverlayState::Collapsed);
        assert_consistent(&overlay);
        assert!(overlay.expand());
        assert_eq!(overlay.state(), OverlayState::Expanded);
        assert_consistent(&overlay);
    }

    #[test]
    fn redundant_folds_are_ignored() {
        let mut overlay = attached();
        assert!(!overlay.expand());
        overlay.collapse();
        assert!(!overlay.collapse());
        assert_consistent(&overlay);

        let mut absent = OverlayManager::new(FakeSurface::default());
        assert!(!absent.collapse());
        assert!(!absent.expand());
        assert_eq!(absent.state(), OverlayState::Absent);
    }

    #[test]
    fn buttons_only_work_expanded() {
        let mut overlay = attached();
        assert_eq!(overlay.press(NavButton::Back), Some(4));
        assert_eq!(overlay.press(NavButton::Home), Some(3));
        assert_eq!(overlay.press(NavButton::Recents), Some(187));
        overlay.collapse();
        assert_eq!(overlay.press(NavButton::Home), None);
        overlay.stop();
        assert_eq!(overlay.press(NavButton::Back), None);
    }

    #[test]
    fn primary_display_is_rejected() {
        let mut overlay = OverlayManager::new(FakeSurface::default());
        assert_eq!(overlay.start(0), Err(OverlayError::PrimaryDisplay(0)));
        assert_eq!(overlay.surface().binds, 0);
        assert_eq!(overlay.state(), OverlayState::Absent);
    }

    #[test]
    fn vanished_display_stays_absent() {
        let mut overlay = OverlayManager::new(FakeSurface {
            fail_bind: true,
            ..FakeSurface::default()
        });
        assert_eq!(overlay.start(5), Err(OverlayError::DisplayUnavailable(5)));
        assert_eq!(overlay.state(), OverlayState::Absent);
        assert!(overlay.surface().created.is_empty());
    }

    #[test]
    fn rejected_window_rolls_back() {
        let mut overlay = OverlayManager::new(FakeSurface {
            fail_create_at: Some(2),
            ..FakeSurface::default()
        });
        let err = overlay.start(2).unwrap_err();
        assert!(matches!(err, OverlayError::AttachFailed { display_id: 2, .. }));
        assert_eq!(overlay.state(), OverlayState::Absent);
        let surface = overlay.surface();
        assert_eq!(surface.created.len(), 2);
        assert_eq!(surface.destroyed.len(), 2);
        assert_eq!(surface.releases, 1);
    }

    #[test]
    fn same_display_is_not_attached_twice() {
        let mut overlay = attached();
        overlay.collapse();
        assert_eq!(overlay.start(2), Ok(OverlayState::Collapsed));
        assert_eq!(overlay.surface().created.len(), 3);
        assert_eq!(overlay.surface().binds, 1);
    }

    #[test]
    fn new_display_id_reattaches() {
        let mut overlay = attached();
        assert_eq!(overlay.start(3), Ok(OverlayState::Expanded));
        let surface = overlay.surface();
        assert_eq!(surface.destroyed.len(), 3);
        assert_eq!(surface.created.len(), 6);
        assert_eq!(surface.binds, 2);
        assert_eq!(surface.releases, 1);
        assert_eq!(overlay.group().map(|g| g.display_id), Some(3));
    }

    #[test]
    fn teardown_survives_a_failing_window() {
        let mut overlay = OverlayManager::new(FakeSurface {
            fail_destroy: Some(WindowSlot::Main),
            ..FakeSurface::default()
        });
        overlay.start(2).unwrap();
        overlay.stop();
        assert_eq!(overlay.state(), OverlayState::Absent);
        assert_eq!(overlay.surface().destroyed.len(), 2);
        assert_eq!(overlay.surface().releases, 1);
    }

    #[test]
    fn stop_when_absent_is_noop() {
        let mut overlay = OverlayManager::new(FakeSurface::default());
        overlay.stop();
        assert_eq!(overlay.surface().releases, 0);
    }

    #[test]
    fn sync_follows_display_state() {
        let mut overlay = OverlayManager::new(FakeSurface::default());
        assert_eq!(overlay.sync(&DisplayState::disconnected()), Ok(OverlayState::Absent));
        assert_eq!(overlay.sync(&DisplayState::connected(2)), Ok(OverlayState::Expanded));
        assert_eq!(overlay.sync(&DisplayState::connected(2)), Ok(OverlayState::Expanded));
        assert_eq!(overlay.sync(&DisplayState::disconnected()), Ok(OverlayState::Absent));
        assert_eq!(overlay.surface().binds, 1);
        assert_eq!(overlay.surface().releases, 1);
    }
}
