use crate::finder::FinderItem;
use crate::help_popup::HelpEntry;
use crate::keybinds::{Action, InputMode};
use crate::nav::NavState;
use crate::which_key::WhichKeyEntry;
use chrono::{DateTime, Local};
use crossterm::event::KeyEvent;
use ratatui::{Frame, layout::Rect};
use unicode_width::UnicodeWidthStr;

/// A header button: the key that triggers it and its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionButton {
    pub key: String,
    pub label: String,
}

impl ActionButton {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }

    pub fn text(&self) -> String {
        format!(" {} {} ", self.key, self.label)
    }

    pub fn display_width(&self) -> u16 {
        self.text().width() as u16
    }
}

/// What the page shell shows above the page body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageChrome {
    pub title: String,
    pub subtitle: Option<String>,
    pub primary: Option<ActionButton>,
    pub secondary: Option<ActionButton>,
}

/// Status bar data contributed by the active page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageStatus {
    pub loading: bool,
    pub refreshed_at: Option<DateTime<Local>>,
    pub error: Option<String>,
}

/// The trait every dashboard page implements.
/// Pages are embedded views inside the hub, one per entity collection.
pub trait Page {
    /// Display name (e.g., "Goals", "Task types").
    fn name(&self) -> &str;

    /// Collection path the page serves; also the first route segment.
    fn route(&self) -> &str;

    /// Key that jumps to the page from the leader menu.
    fn leader_key(&self) -> char;

    /// Short description for the page picker.
    fn description(&self) -> &str;

    fn mode(&self) -> InputMode;

    /// Title, subtitle and header buttons for the current view.
    fn chrome(&self) -> PageChrome;

    fn status(&self) -> PageStatus {
        PageStatus::default()
    }

    /// Which-key entries for this page's leader group.
    fn which_key_entries(&self) -> Vec<WhichKeyEntry> {
        Vec::new()
    }

    /// Items this page contributes to the finder.
    fn finder_items(&self) -> Vec<FinderItem>;

    /// Page-specific keybind documentation.
    fn help_entries(&self) -> Vec<HelpEntry> {
        Vec::new()
    }

    /// Handle a key event. Returns an Action describing what happened.
    fn handle_key(&mut self, key: KeyEvent) -> Action;

    /// Handle a leader sequence the hub did not consume.
    fn handle_leader_action(&mut self, _key: char) -> Option<Action> {
        None
    }

    /// Apply a navigation request addressed to this page.
    fn navigate(&mut self, nav: NavState);

    /// Refetch the page's data (`:refresh`, `<Space>R`).
    fn refresh(&mut self) {}

    /// Save whatever the page is editing (`:w`).
    fn write(&mut self) {}

    /// The route currently shown, e.g. `goals/12`.
    fn current_route(&self) -> String {
        self.route().to_string()
    }

    fn render(&mut self, frame: &mut Frame, area: Rect);

    /// Reset any pending key state (leader, multi-key sequences).
    /// Called by the hub when it takes over input (overlays open/close).
    fn reset_key_state(&mut self) {}

    fn on_focus(&mut self) {}

    fn on_blur(&mut self) {}

    /// The API token changed (`:login` / `:logout`).
    fn on_session_change(&mut self, _token: Option<&str>) {}

    /// Called every loop iteration (~50ms) to drain background results.
    fn tick(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_text() {
        let button = ActionButton::new("a", "New");
        assert_eq!(button.text(), " a New ");
        assert_eq!(button.display_width(), 7);
    }
}
