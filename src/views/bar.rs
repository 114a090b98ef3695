use iced::widget::text::Shaping;
use iced::widget::{container, mouse_area, row, text};
use iced::{Alignment, Element, Length, mouse};

use crate::app::{Message, PortalBar};
use crate::overlay::{NavButton, WindowSlot};

const GLYPH_BACK: &str = "◁";
const GLYPH_HOME: &str = "○";
const GLYPH_RECENTS: &str = "□";
const GLYPH_COLLAPSE: &str = "▾";
const GLYPH_EXPAND: &str = "▴";

pub(crate) fn nav_glyph(button: NavButton) -> &'static str {
    match button {
        NavButton::Back => GLYPH_BACK,
        NavButton::Home => GLYPH_HOME,
        NavButton::Recents => GLYPH_RECENTS,
    }
}

impl PortalBar {
    fn glyph_button(&self, glyph: &'static str, size: f32, on_press: Message) -> Element<'_, Message> {
        let label = text(glyph)
            .size(size)
            .color(self.colors.icon)
            .shaping(Shaping::Advanced);
        mouse_area(container(label).padding(6))
            .on_press(on_press)
            .interaction(mouse::Interaction::Pointer)
            .into()
    }

    /// Back / home / recents, then the collapse toggle.
    pub(crate) fn view_main_bar(&self) -> Element<'_, Message> {
        let size = self.colors.icon_size;
        let buttons = row![
            self.glyph_button(nav_glyph(NavButton::Back), size, Message::Nav(NavButton::Back)),
            self.glyph_button(nav_glyph(NavButton::Home), size, Message::Nav(NavButton::Home)),
            self.glyph_button(
                nav_glyph(NavButton::Recents),
                size,
                Message::Nav(NavButton::Recents)
            ),
            self.glyph_button(GLYPH_COLLAPSE, size * 0.8, Message::Collapse),
        ]
        .spacing(8)
        .align_y(Alignment::Center);

        container(buttons)
            .style(self.colors.bar_style())
            .center(Length::Fill)
            .into()
    }

    /// Single expand button in a bottom corner.
    pub(crate) fn view_expander(&self, slot: WindowSlot) -> Element<'_, Message> {
        debug_assert!(slot != WindowSlot::Main);
        let button = self.glyph_button(GLYPH_EXPAND, self.colors.expander_icon_size, Message::Expand);
        container(button)
            .style(self.colors.expander_style())
            .center(Length::Fill)
            .into()
    }
}
