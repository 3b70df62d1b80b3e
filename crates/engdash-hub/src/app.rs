use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::{Frame, layout::Rect};
use rusqlite::Connection;

use engdash_core::{
    finder::{Finder, FinderEvent, FinderItem},
    help_popup::{self, HelpPopup},
    keybinds::{Action, InputMode, KeyState, TextInput, process_normal_key},
    nav::NavState,
    page::{Page, PageStatus},
    session, ui,
    which_key::{self, WhichKey, WhichKeyEntry},
};

/// The main application state.
pub struct App {
    /// Registry of all pages, in tab order.
    pages: Vec<Box<dyn Page>>,
    /// Index of the active page (None = dashboard).
    active_page: Option<usize>,
    pub should_quit: bool,
    /// Hub-level mode (Command while the command line is open).
    mode: InputMode,
    which_key: WhichKey,
    help_popup: HelpPopup,
    finder: Finder,
    command: TextInput,
    /// Key state for the dashboard (persistent so gg/gt work).
    key_state: KeyState,
    /// Session store holding the API token.
    session: Connection,
    /// `ENGDASH_TOKEN` as read at startup; it beats the stored token.
    env_token: Option<String>,
    /// Last hub-level error (bad command, bad route).
    error: Option<String>,
    /// Last hub-level notice, shown in place of the hint.
    notice: Option<String>,
}

impl App {
    pub fn new(pages: Vec<Box<dyn Page>>, session: Connection) -> Self {
        Self {
            pages,
            active_page: None,
            should_quit: false,
            mode: InputMode::Normal,
            which_key: WhichKey::new(),
            help_popup: HelpPopup::new(),
            finder: Finder::new(),
            command: TextInput::new(),
            key_state: KeyState::default(),
            session,
            env_token: None,
            error: None,
            notice: None,
        }
    }

    pub fn with_env_token(mut self, token: Option<String>) -> Self {
        self.env_token = token;
        self
    }

    /// Route of the active page, or `None` on the dashboard.
    pub fn current_route(&self) -> Option<String> {
        self.active_page.map(|idx| self.pages[idx].current_route())
    }

    /// Reset all pending key state (hub + active page).
    /// Called when the hub takes over input for overlays.
    fn reset_all_key_state(&mut self) {
        self.key_state.reset();
        if let Some(idx) = self.active_page {
            self.pages[idx].reset_key_state();
        }
    }

    /// Tick every page so background results land even on hidden tabs.
    pub fn tick(&mut self) {
        for page in &mut self.pages {
            page.tick();
        }
    }

    /// Handle a terminal event.
    pub fn handle_event(&mut self, event: Event) {
        if let Event::Key(key) = event {
            // Ctrl-c always quits
            if key.code == KeyCode::Char('c') && key.modifiers == KeyModifiers::CONTROL {
                self.should_quit = true;
                return;
            }

            if self.finder.visible {
                self.handle_finder_key(key);
                return;
            }

            if self.which_key.visible {
                self.handle_which_key_input(key);
                return;
            }

            if self.help_popup.visible {
                self.handle_help_key(key);
                return;
            }

            if self.mode == InputMode::Command {
                self.handle_command_key(key);
                return;
            }

            match self.active_page {
                Some(idx) => {
                    let action = self.pages[idx].handle_key(key);
                    self.process_action(action);
                }
                None => {
                    let action = process_normal_key(key, &mut self.key_state);
                    self.process_action(action);
                }
            }
        }
    }

    /// Process an action returned by a page or the dashboard.
    fn process_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.close_page(),
            Action::LeaderKey => self.show_leader_menu(),
            Action::LeaderSequence(c) => self.handle_leader_sequence(c),
            Action::SetMode(InputMode::Command) => {
                self.mode = InputMode::Command;
                self.command.clear();
                self.error = None;
                self.notice = None;
            }
            Action::SwitchPage(idx) => self.switch_to_page(idx),
            Action::NextTab => {
                if !self.pages.is_empty() {
                    let next = match self.active_page {
                        Some(current) => (current + 1) % self.pages.len(),
                        None => 0,
                    };
                    self.switch_to_page(next);
                }
            }
            Action::PrevTab => {
                if !self.pages.is_empty() {
                    let prev = match self.active_page {
                        Some(0) | None => self.pages.len() - 1,
                        Some(current) => current - 1,
                    };
                    self.switch_to_page(prev);
                }
            }
            Action::PagePicker => self.open_page_picker(),
            Action::Finder => self.open_finder(),
            Action::Help => self.show_help(),
            Action::Navigate(route) => self.open_route(&route),
            // Dashboard-only conveniences
            Action::Confirm if self.active_page.is_none() => self.switch_to_page(0),
            _ => {}
        }
    }

    /// Close the active page, or quit from the dashboard.
    fn close_page(&mut self) {
        match self.active_page.take() {
            Some(idx) => self.pages[idx].on_blur(),
            None => self.should_quit = true,
        }
    }

    fn page_by_leader(&self, c: char) -> Option<usize> {
        self.pages.iter().position(|p| p.leader_key() == c)
    }

    fn page_by_route(&self, route: &str) -> Option<usize> {
        self.pages.iter().position(|p| p.route() == route)
    }

    /// Show the leader key which-key menu.
    fn show_leader_menu(&mut self) {
        self.reset_all_key_state();
        let mut entries = which_key::hub_leader_entries();
        for page in &self.pages {
            entries.push(WhichKeyEntry::action(
                page.leader_key().to_string(),
                page.name(),
            ));
        }
        if let Some(idx) = self.active_page {
            entries.extend(self.pages[idx].which_key_entries());
        }
        self.which_key.show("Leader", entries);
    }

    /// Handle a key pressed after the leader key.
    fn handle_leader_sequence(&mut self, c: char) {
        match c {
            'R' => {
                if let Some(idx) = self.active_page {
                    self.pages[idx].refresh();
                }
            }
            '?' => self.show_help(),
            c => {
                if let Some(idx) = self.page_by_leader(c) {
                    self.switch_to_page(idx);
                } else if let Some(idx) = self.active_page {
                    if let Some(action) = self.pages[idx].handle_leader_action(c) {
                        self.process_action(action);
                    }
                }
            }
        }
    }

    /// Handle input while which-key is visible.
    fn handle_which_key_input(&mut self, key: KeyEvent) {
        self.which_key.hide();
        self.reset_all_key_state();

        let KeyCode::Char(c) = key.code else {
            return;
        };
        match c {
            'q' => self.process_action(Action::Quit),
            'f' => self.open_finder(),
            ' ' => self.open_page_picker(),
            c @ '1'..='9' => self.switch_to_page((c as u8 - b'1') as usize),
            c => self.handle_leader_sequence(c),
        }
    }

    fn handle_finder_key(&mut self, key: KeyEvent) {
        match self.finder.handle_key(key) {
            FinderEvent::Selected(id) => {
                self.reset_all_key_state();
                self.handle_finder_selection(&id);
            }
            FinderEvent::Closed => self.reset_all_key_state(),
            FinderEvent::None => {}
        }
    }

    /// Finder ids are either `page:<route>` or a navigation route.
    fn handle_finder_selection(&mut self, id: &str) {
        match id.strip_prefix("page:") {
            Some(route) => {
                if let Some(idx) = self.page_by_route(route) {
                    self.switch_to_page(idx);
                }
            }
            None => self.open_route(id),
        }
    }

    /// Parse `route` and hand it to the page serving its collection.
    pub fn open_route(&mut self, route: &str) {
        match route.parse::<NavState>() {
            Ok(nav) => self.navigate_to(nav),
            Err(e) => {
                tracing::debug!(route, error = %e, "bad route");
                self.error = Some(format!("Invalid route: {e}"));
            }
        }
    }

    pub fn navigate_to(&mut self, nav: NavState) {
        let Some(idx) = self.page_by_route(&nav.collection) else {
            self.error = Some(format!("No page for `{}`", nav.collection));
            return;
        };
        self.pages[idx].navigate(nav);
        self.switch_to_page(idx);
    }

    fn handle_command_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.mode = InputMode::Normal;
                self.command.clear();
            }
            KeyCode::Enter => {
                let cmd = self.command.text.trim().to_string();
                self.mode = InputMode::Normal;
                self.command.clear();
                self.execute_command(&cmd);
            }
            KeyCode::Backspace if self.command.text.is_empty() => {
                self.mode = InputMode::Normal;
            }
            _ => {
                self.command.handle_key(key);
            }
        }
    }

    /// Execute a command-mode command.
    fn execute_command(&mut self, cmd: &str) {
        let (name, arg) = match cmd.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (cmd, ""),
        };
        match name {
            "" => {}
            "q" | "quit" => self.close_page(),
            "qa" | "qa!" => self.should_quit = true,
            "open" | "e" if !arg.is_empty() => self.open_route(arg),
            "w" | "write" => {
                if let Some(idx) = self.active_page {
                    self.pages[idx].write();
                }
            }
            "refresh" => {
                if let Some(idx) = self.active_page {
                    self.pages[idx].refresh();
                }
            }
            "login" if !arg.is_empty() => self.login(arg),
            "logout" => self.logout(),
            _ => self.error = Some(format!("Not an editor command: {cmd}")),
        }
    }

    fn login(&mut self, token: &str) {
        if let Err(e) = session::set_token(&self.session, token) {
            tracing::warn!(error = %e, "failed to store token");
            self.error = Some(format!("Could not store token: {e}"));
            return;
        }
        tracing::info!("logged in");
        self.broadcast_token();
        self.notice = Some(if self.env_token_active() {
            format!("Token saved; {} still takes precedence", session::TOKEN_ENV)
        } else {
            "Token saved".to_string()
        });
    }

    fn logout(&mut self) {
        match session::clear_token(&self.session) {
            Ok(existed) => {
                tracing::info!(existed, "logged out");
                self.broadcast_token();
                self.notice = Some(match (existed, self.env_token_active()) {
                    (_, true) => format!("Stored token cleared; {} still in use", session::TOKEN_ENV),
                    (true, false) => "Token removed".to_string(),
                    (false, false) => "No token was stored".to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to clear token");
                self.error = Some(format!("Could not clear token: {e}"));
            }
        }
    }

    fn env_token_active(&self) -> bool {
        self.env_token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    /// Tell every page which token requests should now carry.
    fn broadcast_token(&mut self) {
        let token = match session::resolve_token(&self.session, self.env_token.clone()) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read token");
                self.error = Some(format!("Could not read token: {e}"));
                return;
            }
        };
        for page in &mut self.pages {
            page.on_session_change(token.as_deref());
        }
    }

    /// Switch to a page by index.
    fn switch_to_page(&mut self, idx: usize) {
        if idx < self.pages.len() {
            if let Some(old) = self.active_page {
                if old != idx {
                    self.pages[old].on_blur();
                }
            }
            self.active_page = Some(idx);
            self.pages[idx].on_focus();
            self.mode = InputMode::Normal;
            self.error = None;
        }
    }

    fn page_items(&self) -> Vec<FinderItem> {
        self.pages
            .iter()
            .map(|p| FinderItem::new(p.name(), p.description(), format!("page:{}", p.route())))
            .collect()
    }

    fn open_page_picker(&mut self) {
        let items = self.page_items();
        self.finder.open("Pages", items);
    }

    /// Open the finder over pages and every loaded record.
    fn open_finder(&mut self) {
        let mut items = self.page_items();
        for page in &self.pages {
            items.extend(page.finder_items());
        }
        self.finder.open("Find", items);
    }

    /// Show the help popup with page-specific + global keybinds.
    fn show_help(&mut self) {
        self.reset_all_key_state();
        let mut entries = Vec::new();
        if let Some(idx) = self.active_page {
            entries.extend(self.pages[idx].help_entries());
        }
        entries.extend(help_popup::global_help_entries());

        let title = match self.active_page {
            Some(idx) => format!("{} Help", self.pages[idx].name()),
            None => "Help".to_string(),
        };
        self.help_popup.show(title, entries);
    }

    fn handle_help_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?') => {
                self.help_popup.hide();
                self.reset_all_key_state();
            }
            KeyCode::Char('j') | KeyCode::Down => self.help_popup.scroll_down(1),
            KeyCode::Char('k') | KeyCode::Up => self.help_popup.scroll_up(1),
            KeyCode::Char('d') if key.modifiers == KeyModifiers::CONTROL => {
                self.help_popup.scroll_down(10)
            }
            KeyCode::Char('u') if key.modifiers == KeyModifiers::CONTROL => {
                self.help_popup.scroll_up(10)
            }
            _ => {}
        }
    }

    /// Render the entire application.
    pub fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let (tab_area, content_area, status_area) = ui::standard_layout(area);

        let names: Vec<&str> = self.pages.iter().map(|p| p.name()).collect();
        if !names.is_empty() {
            ui::render_tab_bar(frame, tab_area, &names, self.active_page);
        }

        match self.active_page {
            Some(idx) => self.pages[idx].render(frame, content_area),
            None => self.render_dashboard(frame, content_area),
        }

        if self.mode == InputMode::Command {
            ui::render_command_line(frame, status_area, &self.command.text, self.command.cursor_column());
        } else {
            let (name, mode, mut status) = match self.active_page {
                Some(idx) => {
                    let page = &self.pages[idx];
                    (page.name(), page.mode(), page.status())
                }
                None => ("Dashboard", self.mode, PageStatus::default()),
            };
            if self.error.is_some() {
                status.error = self.error.clone();
            }
            let hint = match (&self.notice, self.active_page) {
                (Some(notice), _) => notice.as_str(),
                (None, Some(_)) => "Space: leader  ?:help  :q: close",
                (None, None) => "Space: leader  ?:help  :q: quit",
            };
            ui::render_status_bar(frame, status_area, mode, name, &status, hint);
        }

        // Overlays (rendered last, on top)
        self.which_key.render(frame, area);
        self.help_popup.render(frame, area);
        self.finder.render(frame, area);
    }

    /// Render the dashboard when no page is active.
    fn render_dashboard(&self, frame: &mut Frame, area: Rect) {
        use ratatui::{
            layout::{Alignment, Constraint, Layout},
            style::{Modifier, Style},
            text::{Line, Span},
            widgets::Paragraph,
        };

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let mut lines = vec![
            Line::from(""),
            Line::from(Span::styled("engdash", bold)),
            Line::from(""),
            Line::from(Span::styled(
                "Goals, reminders, task types, teams and users",
                Style::default().add_modifier(Modifier::DIM),
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("  <Space> ", bold),
                Span::raw("  Open leader menu"),
            ]),
            Line::from(vec![
                Span::styled("  <Space>f ", bold),
                Span::raw("  Find"),
            ]),
            Line::from(vec![
                Span::styled("  :open goals/12 ", bold),
                Span::raw("  Go to a record"),
            ]),
            Line::from(vec![Span::styled("  :q ", bold), Span::raw("  Quit")]),
            Line::from(""),
        ];

        for (i, page) in self.pages.iter().enumerate() {
            lines.push(Line::from(vec![
                Span::styled(format!("  {} ", i + 1), bold),
                Span::styled(
                    page.name(),
                    Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                ),
                Span::styled(
                    format!("  <Space>{}  {}", page.leader_key(), page.description()),
                    Style::default().add_modifier(Modifier::DIM),
                ),
            ]));
        }

        let height = lines.len() as u16;
        let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
        let [_, centered, _] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(height),
            Constraint::Fill(1),
        ])
        .areas(area);

        frame.render_widget(paragraph, centered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engdash_core::page::PageChrome;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Calls {
        navigated: Vec<String>,
        tokens: Vec<Option<String>>,
        refreshed: usize,
        written: usize,
    }

    struct StubPage {
        name: &'static str,
        route: &'static str,
        leader: char,
        key_state: KeyState,
        calls: Rc<RefCell<Calls>>,
    }

    impl Page for StubPage {
        fn name(&self) -> &str {
            self.name
        }

        fn route(&self) -> &str {
            self.route
        }

        fn leader_key(&self) -> char {
            self.leader
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn mode(&self) -> InputMode {
            InputMode::Normal
        }

        fn chrome(&self) -> PageChrome {
            PageChrome::default()
        }

        fn finder_items(&self) -> Vec<FinderItem> {
            vec![FinderItem::new("Item", "", format!("{}/1", self.route))]
        }

        fn handle_key(&mut self, key: KeyEvent) -> Action {
            process_normal_key(key, &mut self.key_state)
        }

        fn navigate(&mut self, nav: NavState) {
            self.calls.borrow_mut().navigated.push(nav.to_string());
        }

        fn refresh(&mut self) {
            self.calls.borrow_mut().refreshed += 1;
        }

        fn write(&mut self) {
            self.calls.borrow_mut().written += 1;
        }

        fn render(&mut self, _frame: &mut Frame, _area: Rect) {}

        fn reset_key_state(&mut self) {
            self.key_state.reset();
        }

        fn on_session_change(&mut self, token: Option<&str>) {
            self.calls.borrow_mut().tokens.push(token.map(str::to_string));
        }
    }

    fn app() -> (App, Rc<RefCell<Calls>>) {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let page = |name, route, leader| -> Box<dyn Page> {
            Box::new(StubPage {
                name,
                route,
                leader,
                key_state: KeyState::default(),
                calls: calls.clone(),
            })
        };
        let pages = vec![page("Goals", "goals", 'g'), page("Teams", "teams", 't')];
        let conn = session::open_memory_db().unwrap();
        (App::new(pages, conn), calls)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_event(Event::Key(KeyEvent::new(code, KeyModifiers::NONE)));
    }

    fn command(app: &mut App, cmd: &str) {
        press(app, KeyCode::Char(':'));
        for c in cmd.chars() {
            press(app, KeyCode::Char(c));
        }
        press(app, KeyCode::Enter);
    }

    #[test]
    fn test_leader_jumps_to_page() {
        let (mut app, _calls) = app();
        press(&mut app, KeyCode::Char(' '));
        assert!(app.which_key.visible);
        press(&mut app, KeyCode::Char('t'));
        assert!(!app.which_key.visible);
        assert_eq!(app.active_page, Some(1));

        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Char('g'));
        assert_eq!(app.active_page, Some(0));
    }

    #[test]
    fn test_open_command_navigates() {
        let (mut app, calls) = app();
        command(&mut app, "open teams/12?refresh=1");
        assert_eq!(app.active_page, Some(1));
        assert_eq!(calls.borrow().navigated, vec!["teams/12?refresh=1"]);

        command(&mut app, "open nowhere");
        assert!(app.error.as_deref().is_some_and(|e| e.contains("nowhere")));
        assert_eq!(app.active_page, Some(1));
    }

    #[test]
    fn test_login_and_logout() {
        let (mut app, calls) = app();
        command(&mut app, "login abc123");
        assert_eq!(session::token(&app.session).unwrap().as_deref(), Some("abc123"));
        assert_eq!(calls.borrow().tokens, vec![Some("abc123".to_string()), Some("abc123".to_string())]);

        command(&mut app, "logout");
        assert_eq!(session::token(&app.session).unwrap(), None);
        assert_eq!(calls.borrow().tokens.len(), 4);
        assert_eq!(app.notice.as_deref(), Some("Token removed"));
    }

    #[test]
    fn test_env_token_outlives_login_and_logout() {
        let (app, calls) = app();
        let mut app = app.with_env_token(Some("from-env".to_string()));

        command(&mut app, "login abc123");
        assert_eq!(session::token(&app.session).unwrap().as_deref(), Some("abc123"));
        assert!(calls.borrow().tokens.iter().all(|t| t.as_deref() == Some("from-env")));
        assert!(app.notice.as_deref().is_some_and(|n| n.contains(session::TOKEN_ENV)));

        command(&mut app, "logout");
        assert_eq!(session::token(&app.session).unwrap(), None);
        assert_eq!(calls.borrow().tokens.len(), 4);
        assert!(calls.borrow().tokens.iter().all(|t| t.as_deref() == Some("from-env")));
    }

    #[test]
    fn test_write_and_refresh_commands_target_active_page() {
        let (mut app, calls) = app();
        command(&mut app, "w");
        assert_eq!(calls.borrow().written, 0);

        app.switch_to_page(0);
        command(&mut app, "w");
        command(&mut app, "refresh");
        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Char('R'));
        assert_eq!(calls.borrow().written, 1);
        assert_eq!(calls.borrow().refreshed, 2);
    }

    #[test]
    fn test_unknown_command_and_quit() {
        let (mut app, _calls) = app();
        command(&mut app, "frobnicate");
        assert!(app.error.is_some());

        app.switch_to_page(1);
        command(&mut app, "q");
        assert_eq!(app.active_page, None);
        assert!(!app.should_quit);
        command(&mut app, "q");
        assert!(app.should_quit);
    }

    #[test]
    fn test_finder_selection_routes() {
        let (mut app, calls) = app();
        app.handle_finder_selection("page:teams");
        assert_eq!(app.active_page, Some(1));

        app.handle_finder_selection("goals/1");
        assert_eq!(app.active_page, Some(0));
        assert_eq!(calls.borrow().navigated, vec!["goals/1"]);
    }
}
