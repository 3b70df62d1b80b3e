use ratatui::{
    Frame,
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::ui::centered_rect;

/// A single entry in the which-key menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhichKeyEntry {
    /// The key to press (e.g., "f", "g", "1").
    pub key: String,
    pub description: String,
    /// Whether this entry opens a nested group.
    pub is_group: bool,
}

impl WhichKeyEntry {
    pub fn action(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            is_group: false,
        }
    }

    pub fn group(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            is_group: true,
        }
    }
}

/// The which-key popup state.
#[derive(Debug, Default)]
pub struct WhichKey {
    pub visible: bool,
    pub entries: Vec<WhichKeyEntry>,
    /// Title for the current level (e.g., "Leader").
    pub title: String,
}

impl WhichKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, title: impl Into<String>, entries: Vec<WhichKeyEntry>) {
        self.visible = true;
        self.title = title.into();
        self.entries = entries;
    }

    pub fn hide(&mut self) {
        self.visible = false;
        self.entries.clear();
        self.title.clear();
    }

    /// Render the which-key popup centered on screen.
    pub fn render(&self, frame: &mut Frame, area: Rect) {
        if !self.visible || self.entries.is_empty() {
            return;
        }

        let max_key_len = self.entries.iter().map(|e| e.key.len()).max().unwrap_or(1);
        let max_desc_len = self
            .entries
            .iter()
            .map(|e| e.description.len())
            .max()
            .unwrap_or(10);
        let popup_width = (max_key_len + max_desc_len + 10).min(60) as u16;
        let popup_height = (self.entries.len() as u16 + 2).min(area.height.saturating_sub(4));
        let popup_area = centered_rect(popup_width, popup_height, area);

        frame.render_widget(Clear, popup_area);

        let lines: Vec<Line> = self
            .entries
            .iter()
            .map(|entry| {
                let desc_style = if entry.is_group {
                    Style::default().add_modifier(Modifier::UNDERLINED)
                } else {
                    Style::default()
                };
                let suffix = if entry.is_group { " +" } else { "" };

                Line::from(vec![
                    Span::styled(
                        format!("  {:<width$} ", entry.key, width = max_key_len),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::styled("-> ", Style::default().add_modifier(Modifier::DIM)),
                    Span::styled(format!("{}{}", entry.description, suffix), desc_style),
                ])
            })
            .collect();

        let block = Block::default()
            .title(format!(" {} ", self.title))
            .title_alignment(Alignment::Center)
            .borders(Borders::ALL);

        frame.render_widget(Paragraph::new(lines).block(block), popup_area);
    }
}

/// Top-level leader entries shared by every page. Page-jump keys are
/// appended by the hub from the registered pages.
pub fn hub_leader_entries() -> Vec<WhichKeyEntry> {
    vec![
        WhichKeyEntry::action("f", "Find"),
        WhichKeyEntry::action("R", "Refresh page"),
        WhichKeyEntry::action("q", "Quit"),
        WhichKeyEntry::action("?", "Help"),
        WhichKeyEntry::action("1-9", "Switch to page"),
        WhichKeyEntry::action("<Space>", "Page picker"),
    ]
}
