use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::keybinds::TextInput;
use crate::option_tree::{OptionTree, OptionTreeRenderConfig, TreeOption, render_option_tree};
use crate::ui::percent_of;

/// What a key press inside an open dropdown resulted in.
#[derive(Debug, Clone, PartialEq)]
pub enum DropdownEvent<T> {
    None,
    Selected(T),
    Cleared,
    Closed,
}

/// A single-select dropdown over an [`OptionTree`].
///
/// In tree mode the overlay shows the nested rows with expand/collapse;
/// typing filters immediately. Choosing an option closes the overlay and
/// clears the query.
#[derive(Debug, Clone)]
pub struct Dropdown<T: TreeOption> {
    pub title: String,
    pub tree: OptionTree<T>,
    pub query: TextInput,
    open: bool,
}

impl<T: TreeOption> Dropdown<T> {
    pub fn new(title: impl Into<String>, expand_all: bool) -> Self {
        Self {
            title: title.into(),
            tree: OptionTree::new(expand_all),
            query: TextInput::new(),
            open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Open the overlay, placing the cursor on the current selection.
    pub fn open(&mut self) {
        self.open = true;
        self.tree.goto_top();
        if let Some(key) = self.tree.selection().map(|s| s.key()) {
            self.tree.focus_key(&key);
        }
    }

    pub fn close(&mut self) {
        self.open = false;
        self.query.clear();
        self.tree.clear_query();
    }

    pub fn selection(&self) -> Option<&T> {
        self.tree.selection()
    }

    /// Select `node` programmatically (e.g. from the persisted parent).
    pub fn set_selection(&mut self, node: Option<T>) {
        match node {
            Some(node) => self.tree.select(node),
            None => self.tree.clear_selection(),
        }
    }

    /// Route a key to the open dropdown.
    ///
    /// Up/Down move, Right/Left expand/collapse, Enter selects,
    /// Ctrl-x clears the selection, Esc closes. Everything else edits
    /// the query.
    pub fn handle_key(&mut self, key: KeyEvent) -> DropdownEvent<T> {
        if !self.open {
            return DropdownEvent::None;
        }
        match key.code {
            KeyCode::Esc => {
                self.close();
                DropdownEvent::Closed
            }
            KeyCode::Enter => match self.tree.cursor_node() {
                Some(node) => {
                    self.tree.select(node.clone());
                    self.close();
                    DropdownEvent::Selected(node)
                }
                None => DropdownEvent::None,
            },
            KeyCode::Char('x') if key.modifiers == KeyModifiers::CONTROL => {
                self.tree.clear_selection();
                self.close();
                DropdownEvent::Cleared
            }
            KeyCode::Down | KeyCode::Tab => {
                self.tree.move_down(1);
                DropdownEvent::None
            }
            KeyCode::Up | KeyCode::BackTab => {
                self.tree.move_up(1);
                DropdownEvent::None
            }
            KeyCode::Right => {
                self.tree.expand_cursor();
                DropdownEvent::None
            }
            KeyCode::Left => {
                self.tree.collapse_cursor_or_parent();
                DropdownEvent::None
            }
            _ => {
                if self.query.handle_key(key) {
                    self.tree.set_query(self.query.text.clone());
                }
                DropdownEvent::None
            }
        }
    }

    /// Render the overlay centered in `area`.
    pub fn render(&self, frame: &mut Frame, area: Rect) {
        if !self.open {
            return;
        }

        let width = percent_of(area.width, 50).max(40).min(area.width.saturating_sub(4));
        let height = percent_of(area.height, 60).max(8).min(area.height.saturating_sub(2));
        let [popup] = Layout::vertical([Constraint::Length(height)])
            .flex(Flex::Center)
            .areas(area);
        let [popup] = Layout::horizontal([Constraint::Length(width)])
            .flex(Flex::Center)
            .areas(popup);

        frame.render_widget(Clear, popup);

        let [input_area, tree_area, hint_area] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .areas(popup);

        let input = Paragraph::new(Line::from(vec![
            Span::styled("> ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(self.query.text.clone()),
        ]))
        .block(
            Block::default()
                .title(format!(" {} ", self.title))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Blue)),
        );
        frame.render_widget(input, input_area);
        frame.set_cursor_position((
            input_area.x + 3 + self.query.cursor_column(),
            input_area.y + 1,
        ));

        let block = Block::default().borders(Borders::LEFT | Borders::RIGHT);
        let inner = block.inner(tree_area);
        frame.render_widget(block, tree_area);
        render_option_tree(frame, inner, &self.tree, &OptionTreeRenderConfig::default());

        let hint = Paragraph::new(Span::styled(
            " Enter:select  \u{2190}/\u{2192}:fold  Ctrl-x:clear  Esc:close",
            Style::default().fg(Color::DarkGray),
        ))
        .block(Block::default().borders(Borders::NONE));
        frame.render_widget(hint, hint_area);
    }
}
