use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};

use crate::keybinds::TextInput;
use crate::ui::{centered_rect, percent_of};

/// A single item that can appear in the finder results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderItem {
    pub label: String,
    /// Dimmed text after the label (entity kind, subtitle).
    pub description: String,
    /// Passed back on selection: `page:<route>` or a navigation route.
    pub id: String,
}

impl FinderItem {
    pub fn new(
        label: impl Into<String>,
        description: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
            id: id.into(),
        }
    }
}

/// Outcome of a key press inside the finder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinderEvent {
    None,
    /// The id of the chosen item.
    Selected(String),
    Closed,
}

/// Finder overlay: a filtered list of items from every page.
#[derive(Debug)]
pub struct Finder {
    pub visible: bool,
    pub query: TextInput,
    items: Vec<FinderItem>,
    /// Indices into `items`.
    filtered: Vec<usize>,
    list_state: ListState,
    pub title: String,
}

impl Default for Finder {
    fn default() -> Self {
        Self {
            visible: false,
            query: TextInput::new(),
            items: Vec::new(),
            filtered: Vec::new(),
            list_state: ListState::default(),
            title: String::from("Find"),
        }
    }
}

impl Finder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, title: impl Into<String>, items: Vec<FinderItem>) {
        self.visible = true;
        self.title = title.into();
        self.query.clear();
        self.items = items;
        self.list_state.select(None);
        self.filter();
    }

    pub fn close(&mut self) {
        self.visible = false;
        self.query.clear();
        self.items.clear();
        self.filtered.clear();
        self.list_state.select(None);
    }

    pub fn results(&self) -> impl Iterator<Item = &FinderItem> {
        self.filtered.iter().map(|&i| &self.items[i])
    }

    /// Wraps around at both ends.
    pub fn move_down(&mut self) {
        if self.filtered.is_empty() {
            return;
        }
        let current = self.list_state.selected().unwrap_or(0);
        self.list_state.select(Some((current + 1) % self.filtered.len()));
    }

    pub fn move_up(&mut self) {
        if self.filtered.is_empty() {
            return;
        }
        let current = self.list_state.selected().unwrap_or(0);
        let next = if current == 0 {
            self.filtered.len() - 1
        } else {
            current - 1
        };
        self.list_state.select(Some(next));
    }

    pub fn selected_id(&self) -> Option<&str> {
        let sel = self.list_state.selected()?;
        let idx = *self.filtered.get(sel)?;
        Some(&self.items[idx].id)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> FinderEvent {
        match key.code {
            KeyCode::Esc => {
                self.close();
                FinderEvent::Closed
            }
            KeyCode::Enter => match self.selected_id().map(str::to_string) {
                Some(id) => {
                    self.close();
                    FinderEvent::Selected(id)
                }
                None => FinderEvent::None,
            },
            KeyCode::Up | KeyCode::BackTab => {
                self.move_up();
                FinderEvent::None
            }
            KeyCode::Down | KeyCode::Tab => {
                self.move_down();
                FinderEvent::None
            }
            _ => {
                if self.query.handle_key(key) {
                    self.filter();
                }
                FinderEvent::None
            }
        }
    }

    /// Case-insensitive substring match on label or description.
    fn filter(&mut self) {
        let needle = self.query.text.trim().to_lowercase();
        self.filtered = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| {
                needle.is_empty()
                    || item.label.to_lowercase().contains(&needle)
                    || item.description.to_lowercase().contains(&needle)
            })
            .map(|(i, _)| i)
            .collect();

        if self.filtered.is_empty() {
            self.list_state.select(None);
        } else {
            let sel = self.list_state.selected().unwrap_or(0);
            self.list_state.select(Some(sel.min(self.filtered.len() - 1)));
        }
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect) {
        if !self.visible {
            return;
        }

        let popup_width = percent_of(area.width, 60)
            .max(40)
            .min(area.width.saturating_sub(4));
        let popup_height = percent_of(area.height, 60)
            .max(10)
            .min(area.height.saturating_sub(4));
        let popup_area = centered_rect(popup_width, popup_height, area);

        frame.render_widget(Clear, popup_area);

        let [input_area, results_area] =
            Layout::vertical([Constraint::Length(3), Constraint::Min(1)]).areas(popup_area);

        let input = Paragraph::new(Line::from(vec![
            Span::styled("> ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(self.query.text.as_str()),
        ]))
        .block(
            Block::default()
                .title(format!(" {} ({}) ", self.title, self.filtered.len()))
                .borders(Borders::ALL),
        );
        frame.render_widget(input, input_area);
        frame.set_cursor_position((
            input_area.x + 3 + self.query.cursor_column(),
            input_area.y + 1,
        ));

        let items: Vec<ListItem> = self
            .filtered
            .iter()
            .map(|&idx| {
                let item = &self.items[idx];
                let line = if item.description.is_empty() {
                    Line::from(Span::raw(item.label.as_str()))
                } else {
                    Line::from(vec![
                        Span::styled(
                            item.label.as_str(),
                            Style::default().add_modifier(Modifier::BOLD),
                        ),
                        Span::styled(
                            format!("  {}", item.description),
                            Style::default().add_modifier(Modifier::DIM),
                        ),
                    ])
                };
                ListItem::new(line)
            })
            .collect();

        let results = List::new(items)
            .block(Block::default().borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM))
            .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED))
            .highlight_symbol("> ");

        frame.render_stateful_widget(results, results_area, &mut self.list_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn finder() -> Finder {
        let mut finder = Finder::new();
        finder.open(
            "Find",
            vec![
                FinderItem::new("Goals", "page", "page:goals"),
                FinderItem::new("Ship v2", "Goal", "goals/12"),
                FinderItem::new("Platform", "Team", "teams/3"),
            ],
        );
        finder
    }

    #[test]
    fn test_open_selects_first() {
        let finder = finder();
        assert_eq!(finder.selected_id(), Some("page:goals"));
        assert_eq!(finder.results().count(), 3);
    }

    #[test]
    fn test_typing_filters_on_label_and_description() {
        let mut finder = finder();
        for c in "team".chars() {
            finder.handle_key(press(KeyCode::Char(c)));
        }
        assert_eq!(finder.results().count(), 1);
        assert_eq!(finder.selected_id(), Some("teams/3"));

        finder.handle_key(press(KeyCode::Backspace));
        finder.handle_key(press(KeyCode::Backspace));
        finder.handle_key(press(KeyCode::Backspace));
        finder.handle_key(press(KeyCode::Backspace));
        assert_eq!(finder.results().count(), 3);
    }

    #[test]
    fn test_navigation_wraps_and_enter_selects() {
        let mut finder = finder();
        finder.handle_key(press(KeyCode::Up));
        assert_eq!(finder.selected_id(), Some("teams/3"));
        finder.handle_key(press(KeyCode::Down));
        finder.handle_key(press(KeyCode::Down));
        assert_eq!(
            finder.handle_key(press(KeyCode::Enter)),
            FinderEvent::Selected("goals/12".into())
        );
        assert!(!finder.visible);
    }

    #[test]
    fn test_no_results_enter_is_noop() {
        let mut finder = finder();
        for c in "zzz".chars() {
            finder.handle_key(press(KeyCode::Char(c)));
        }
        assert_eq!(finder.selected_id(), None);
        assert_eq!(finder.handle_key(press(KeyCode::Enter)), FinderEvent::None);
        assert!(finder.visible);
        assert_eq!(finder.handle_key(press(KeyCode::Esc)), FinderEvent::Closed);
    }
}
