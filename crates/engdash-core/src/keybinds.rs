use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Input modes, modeled after vim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Navigation and actions via keybinds.
    #[default]
    Normal,
    /// Text input: form fields, search boxes, the parent picker query.
    Insert,
    /// Command-line mode. Entered with `:`.
    Command,
}

impl InputMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Insert => "INSERT",
            Self::Command => "COMMAND",
        }
    }
}

/// Actions produced by key processing.
/// Pages consume the ones they understand and bubble the rest up to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// The key was consumed, nothing else happens.
    None,
    /// Close the current page, or quit from the dashboard.
    Quit,
    SetMode(InputMode),
    MoveDown(usize),
    MoveUp(usize),
    GotoTop,
    GotoBottom,
    HalfPageDown,
    HalfPageUp,
    /// Open / select / toggle the row under the cursor.
    Confirm,
    Delete,
    /// Start a new entity.
    Add,
    Edit,
    /// Focus the search box.
    Search,
    /// Expand the tree row under the cursor.
    Expand,
    /// Collapse the tree row under the cursor (or jump to its parent).
    Collapse,
    ExpandAll,
    CollapseAll,
    NextPage,
    PrevPage,
    Refresh,
    Save,
    /// Clear the current selection (e.g. remove the chosen parent).
    ClearSelection,
    /// Leave the details view and return to the list.
    Back,
    LeaderKey,
    LeaderSequence(char),
    /// Switch to a page tab by index (0-based).
    SwitchPage(usize),
    NextTab,
    PrevTab,
    PagePicker,
    Finder,
    Help,
    /// Navigate to a route such as `goals/12`.
    Navigate(String),
}

/// Pending key state for multi-key sequences like `gg`, `dd`, `gt`, `gT`.
#[derive(Debug, Default, Clone)]
pub struct KeyState {
    pub leader_active: bool,
    pub pending_key: Option<char>,
}

impl KeyState {
    pub fn reset(&mut self) {
        self.leader_active = false;
        self.pending_key = None;
    }
}

/// Translate a Normal-mode key event into an [`Action`], tracking
/// leader and two-key sequences in `state`.
pub fn process_normal_key(key: KeyEvent, state: &mut KeyState) -> Action {
    if state.leader_active {
        state.leader_active = false;
        return match key.code {
            KeyCode::Char(' ') => Action::PagePicker,
            KeyCode::Char('f') => Action::Finder,
            KeyCode::Char(c @ '1'..='9') => Action::SwitchPage((c as u8 - b'1') as usize),
            KeyCode::Char('q') => Action::Quit,
            KeyCode::Char(c) => Action::LeaderSequence(c),
            _ => Action::None,
        };
    }

    if let Some(pending) = state.pending_key.take() {
        return match (pending, key.code) {
            ('g', KeyCode::Char('g')) => Action::GotoTop,
            ('g', KeyCode::Char('t')) => Action::NextTab,
            ('g', KeyCode::Char('T')) => Action::PrevTab,
            ('d', KeyCode::Char('d')) => Action::Delete,
            _ => Action::None,
        };
    }

    match key.code {
        KeyCode::Char(' ') => {
            state.leader_active = true;
            Action::LeaderKey
        }
        KeyCode::Char('j') | KeyCode::Down => Action::MoveDown(1),
        KeyCode::Char('k') | KeyCode::Up => Action::MoveUp(1),
        KeyCode::Char('l') | KeyCode::Right => Action::Expand,
        KeyCode::Char('h') | KeyCode::Left => Action::Collapse,
        KeyCode::Char('E') => Action::ExpandAll,
        KeyCode::Char('C') => Action::CollapseAll,
        KeyCode::Char('G') => Action::GotoBottom,
        KeyCode::Char('g') => {
            state.pending_key = Some('g');
            Action::None
        }
        KeyCode::Char('d') if key.modifiers == KeyModifiers::CONTROL => Action::HalfPageDown,
        KeyCode::Char('u') if key.modifiers == KeyModifiers::CONTROL => Action::HalfPageUp,
        KeyCode::Char('s') if key.modifiers == KeyModifiers::CONTROL => Action::Save,
        KeyCode::Char('d') => {
            state.pending_key = Some('d');
            Action::None
        }
        KeyCode::Char(']') => Action::NextPage,
        KeyCode::Char('[') => Action::PrevPage,
        KeyCode::Char('R') => Action::Refresh,
        KeyCode::Char('x') => Action::ClearSelection,
        KeyCode::Enter => Action::Confirm,
        KeyCode::Esc => Action::Back,
        KeyCode::Char('/') => Action::Search,
        KeyCode::Char('a') | KeyCode::Char('o') => Action::Add,
        KeyCode::Char('e') | KeyCode::Char('i') => Action::Edit,
        KeyCode::Char(':') => Action::SetMode(InputMode::Command),
        KeyCode::Char('?') => Action::Help,
        KeyCode::Char('q') => Action::Quit,
        _ => Action::None,
    }
}

/// Small line-editing buffer shared by search boxes, form fields and the
/// command line. Cursor positions are byte offsets on char boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    pub text: String,
    pub cursor: usize,
}

impl TextInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.len();
        Self { text, cursor }
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn insert_char(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    /// Delete the character before the cursor. Returns whether text changed.
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let prev = self.prev_boundary();
        self.text.drain(prev..self.cursor);
        self.cursor = prev;
        true
    }

    pub fn move_left(&mut self) {
        self.cursor = self.prev_boundary();
    }

    pub fn move_right(&mut self) {
        if self.cursor < self.text.len() {
            self.cursor = self.text[self.cursor..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| self.cursor + i)
                .unwrap_or(self.text.len());
        }
    }

    /// Apply an editing key. Returns true when the text itself changed.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char(c) => {
                self.insert_char(c);
                true
            }
            KeyCode::Backspace => self.backspace(),
            KeyCode::Left => {
                self.move_left();
                false
            }
            KeyCode::Right => {
                self.move_right();
                false
            }
            KeyCode::Home => {
                self.cursor = 0;
                false
            }
            KeyCode::End => {
                self.cursor = self.text.len();
                false
            }
            _ => false,
        }
    }

    /// Display width of the text before the cursor, for cursor placement.
    pub fn cursor_column(&self) -> u16 {
        use unicode_width::UnicodeWidthStr;
        self.text[..self.cursor].width() as u16
    }

    fn prev_boundary(&self) -> usize {
        self.text[..self.cursor]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    #[test]
    fn test_two_key_sequences() {
        let mut state = KeyState::default();
        assert_eq!(process_normal_key(key('g'), &mut state), Action::None);
        assert_eq!(process_normal_key(key('g'), &mut state), Action::GotoTop);
        assert_eq!(process_normal_key(key('d'), &mut state), Action::None);
        assert_eq!(process_normal_key(key('d'), &mut state), Action::Delete);
        assert_eq!(process_normal_key(key('g'), &mut state), Action::None);
        assert_eq!(process_normal_key(key('T'), &mut state), Action::PrevTab);
    }

    #[test]
    fn test_leader_sequences() {
        let mut state = KeyState::default();
        assert_eq!(process_normal_key(key(' '), &mut state), Action::LeaderKey);
        assert_eq!(process_normal_key(key('3'), &mut state), Action::SwitchPage(2));
        assert!(!state.leader_active);

        process_normal_key(key(' '), &mut state);
        assert_eq!(process_normal_key(key('g'), &mut state), Action::LeaderSequence('g'));
    }

    #[test]
    fn test_ctrl_bindings() {
        let mut state = KeyState::default();
        let ctrl_s = KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL);
        assert_eq!(process_normal_key(ctrl_s, &mut state), Action::Save);
        let ctrl_d = KeyEvent::new(KeyCode::Char('d'), KeyModifiers::CONTROL);
        assert_eq!(process_normal_key(ctrl_d, &mut state), Action::HalfPageDown);
        assert!(state.pending_key.is_none());
    }

    #[test]
    fn test_text_input_editing() {
        let mut input = TextInput::new();
        for c in "héllo".chars() {
            input.insert_char(c);
        }
        assert_eq!(input.text, "héllo");
        assert_eq!(input.cursor, "héllo".len());

        assert!(input.backspace());
        assert_eq!(input.text, "héll");

        input.move_left();
        input.move_left();
        input.move_left();
        assert_eq!(input.cursor, 1);
        input.insert_char('X');
        assert_eq!(input.text, "hXéll");

        input.move_right();
        assert_eq!(input.cursor, 1 + 1 + 'é'.len_utf8());
        assert_eq!(input.cursor_column(), 3);
    }

    #[test]
    fn test_backspace_at_start_is_noop() {
        let mut input = TextInput::with_text("ab");
        input.cursor = 0;
        assert!(!input.backspace());
        assert_eq!(input.text, "ab");
    }
}
