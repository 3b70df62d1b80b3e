use ratatui::{
    Frame,
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::ui::centered_rect;

/// A single entry in the help popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpEntry {
    /// The key or key combination (e.g., "j/k", "<Space>f", "dd").
    pub key: String,
    pub description: String,
    /// Section header this entry belongs to.
    pub section: Option<String>,
}

impl HelpEntry {
    pub fn new(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            section: None,
        }
    }

    pub fn with_section(
        section: impl Into<String>,
        key: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            section: Some(section.into()),
        }
    }
}

/// The help popup state.
#[derive(Debug, Default)]
pub struct HelpPopup {
    pub visible: bool,
    title: String,
    entries: Vec<HelpEntry>,
    scroll: u16,
}

impl HelpPopup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, title: impl Into<String>, entries: Vec<HelpEntry>) {
        self.visible = true;
        self.title = title.into();
        self.entries = entries;
        self.scroll = 0;
    }

    pub fn hide(&mut self) {
        self.visible = false;
        self.entries.clear();
        self.title.clear();
        self.scroll = 0;
    }

    pub fn scroll_down(&mut self, n: u16) {
        self.scroll = self.scroll.saturating_add(n);
    }

    pub fn scroll_up(&mut self, n: u16) {
        self.scroll = self.scroll.saturating_sub(n);
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        if !self.visible || self.entries.is_empty() {
            return;
        }

        let lines = self.build_lines();

        let popup_width = (area.width.saturating_sub(8)).min(64);
        let popup_height = (area.height.saturating_sub(6)).min(lines.len() as u16 + 2);
        let popup_area = centered_rect(popup_width, popup_height, area);

        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .title(format!(" {} ", self.title))
            .title_alignment(Alignment::Center)
            .borders(Borders::ALL);

        let max_scroll = (lines.len() as u16).saturating_sub(popup_height.saturating_sub(2));
        let scroll = self.scroll.min(max_scroll);

        let paragraph = Paragraph::new(lines).block(block).scroll((scroll, 0));
        frame.render_widget(paragraph, popup_area);
    }

    /// Display lines with a header inserted wherever the section changes.
    fn build_lines(&self) -> Vec<Line<'static>> {
        let mut lines: Vec<Line<'static>> = Vec::new();
        let mut current_section: Option<&str> = None;

        for entry in &self.entries {
            if let Some(section) = entry.section.as_deref() {
                if current_section != Some(section) {
                    if !lines.is_empty() {
                        lines.push(Line::from(""));
                    }
                    lines.push(Line::from(Span::styled(
                        format!(" {section}"),
                        Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                    )));
                    current_section = Some(section);
                }
            }

            lines.push(Line::from(vec![
                Span::styled(
                    format!("  {:>14} ", entry.key),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::raw(entry.description.clone()),
            ]));
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            " Esc/q/?  close    j/k  scroll",
            Style::default().add_modifier(Modifier::DIM),
        )));

        lines
    }
}

/// Keybinds available on every page.
pub fn global_help_entries() -> Vec<HelpEntry> {
    vec![
        HelpEntry::with_section("Navigation", "j / k", "Move down / up"),
        HelpEntry::with_section("Navigation", "gg / G", "Go to top / bottom"),
        HelpEntry::with_section("Navigation", "Ctrl-d / Ctrl-u", "Half-page down / up"),
        HelpEntry::with_section("Navigation", "] / [", "Next / previous page of results"),
        HelpEntry::with_section("Navigation", "gt / gT", "Next / previous page tab"),
        HelpEntry::with_section("Actions", "Enter", "Open details / confirm"),
        HelpEntry::with_section("Actions", "a / o", "New entity"),
        HelpEntry::with_section("Actions", "e / i", "Edit fields"),
        HelpEntry::with_section("Actions", "dd", "Delete entity"),
        HelpEntry::with_section("Actions", "Ctrl-s", "Save"),
        HelpEntry::with_section("Actions", "/", "Search"),
        HelpEntry::with_section("Actions", "R", "Refresh"),
        HelpEntry::with_section("Actions", "Esc", "Back to list"),
        HelpEntry::with_section("Leader (Space)", "<Space>", "Open leader menu"),
        HelpEntry::with_section("Leader (Space)", "<Space><Space>", "Page picker"),
        HelpEntry::with_section("Leader (Space)", "<Space>f", "Find"),
        HelpEntry::with_section("Leader (Space)", "<Space>1-9", "Switch to page"),
        HelpEntry::with_section("Leader (Space)", "<Space>q", "Quit"),
        HelpEntry::with_section("Commands", ":open <route>", "Navigate, e.g. goals/12"),
        HelpEntry::with_section("Commands", ":login <token>", "Store the API token"),
        HelpEntry::with_section("Commands", ":logout", "Forget the API token"),
        HelpEntry::with_section("Commands", ":w", "Save the open form"),
        HelpEntry::with_section("Commands", ":refresh", "Reload the page"),
        HelpEntry::with_section("Commands", ":q / :qa", "Close page / quit"),
        HelpEntry::with_section("Other", "?", "This help"),
        HelpEntry::with_section("Other", "Ctrl-c", "Force quit"),
    ]
}
