use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{Frame, layout::Rect};

use engdash_api::{
    ApiError, Completion, Entity, EntityBackend, Request, RequestTracker, Response, Slot,
    WriteMode, WriteOutcome,
};
use engdash_core::{
    finder::FinderItem,
    help_popup::HelpEntry,
    keybinds::{Action, InputMode, KeyState, process_normal_key},
    nav::{NavState, Target},
    page::{ActionButton, Page, PageChrome, PageStatus},
    ui as core_ui,
    which_key::WhichKeyEntry,
};

use crate::forest::flatten;
use crate::form::{EntityForm, FormEvent};
use crate::kind::{EntityKind, FieldKind};
use crate::list::EntityList;
use crate::ui;

/// Per-page settings taken from the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageConfig {
    pub page_size: usize,
    /// Expand every tree branch on first load.
    pub expand_all: bool,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            expand_all: false,
        }
    }
}

/// State of the details view.
#[derive(Debug)]
pub enum Details {
    Loading { id: String },
    NotFound { id: String },
    Failed { id: String, message: String },
    Form(Box<EntityForm>),
}

#[derive(Debug)]
pub enum View {
    List,
    Details(Details),
}

/// A delete waiting for y/n.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub id: i64,
    pub name: String,
}

/// List/detail page for one entity kind.
///
/// All network work goes through the backend; completions are drained in
/// `tick` and applied only when their ticket is still current.
pub struct EntityPage {
    kind: &'static EntityKind,
    config: PageConfig,
    backend: Box<dyn EntityBackend>,
    tracker: RequestTracker,
    list: EntityList,
    view: View,
    mode: InputMode,
    /// Insert mode is editing the list search box.
    searching: bool,
    key_state: KeyState,
    pending_delete: Option<PendingDelete>,
    status: PageStatus,
    /// At least one list response was applied.
    loaded: bool,
    /// Select this id once the next list arrives (after a save).
    focus_after_load: Option<i64>,
}

impl EntityPage {
    pub fn new(kind: &'static EntityKind, config: PageConfig, backend: Box<dyn EntityBackend>) -> Self {
        Self {
            kind,
            config,
            backend,
            tracker: RequestTracker::new(),
            list: EntityList::new(kind, config.page_size, config.expand_all),
            view: View::List,
            mode: InputMode::Normal,
            searching: false,
            key_state: KeyState::default(),
            pending_delete: None,
            status: PageStatus::default(),
            loaded: false,
            focus_after_load: None,
        }
    }

    pub fn kind(&self) -> &'static EntityKind {
        self.kind
    }

    pub fn list(&self) -> &EntityList {
        &self.list
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn pending_delete(&self) -> Option<&PendingDelete> {
        self.pending_delete.as_ref()
    }

    pub fn form(&self) -> Option<&EntityForm> {
        match &self.view {
            View::Details(Details::Form(form)) => Some(form.as_ref()),
            _ => None,
        }
    }

    pub fn form_mut(&mut self) -> Option<&mut EntityForm> {
        match &mut self.view {
            View::Details(Details::Form(form)) => Some(form.as_mut()),
            _ => None,
        }
    }

    fn collection(&self) -> String {
        self.kind.collection.to_string()
    }

    /// Issue `request` on `slot`, superseding whatever is in flight there.
    fn submit(&mut self, slot: Slot, request: Request) -> bool {
        let ticket = self.tracker.issue(slot);
        match self.backend.submit(ticket, request) {
            Ok(()) => {
                self.status.loading = true;
                true
            }
            Err(e) => {
                tracing::warn!(collection = self.kind.collection, ?slot, error = %e, "request not sent");
                self.tracker.cancel(slot);
                self.status.loading = self.tracker.any_busy();
                self.status.error = Some(e.user_message());
                false
            }
        }
    }

    /// Refetch the collection.
    pub fn reload(&mut self) {
        tracing::debug!(collection = self.kind.collection, "reloading list");
        let collection = self.collection();
        self.submit(Slot::List, Request::FetchList { collection });
    }

    fn ensure_options(&mut self) {
        if self.kind.tree && !self.loaded && !self.tracker.is_busy(Slot::List) {
            self.reload();
        }
    }

    /// Fetch one record and show it in the form.
    pub fn open_details(&mut self, id: &str) {
        self.pending_delete = None;
        self.mode = InputMode::Normal;
        self.view = View::Details(Details::Loading { id: id.to_string() });
        let collection = self.collection();
        self.submit(
            Slot::Detail,
            Request::FetchOne {
                collection,
                id: id.to_string(),
            },
        );
        self.ensure_options();
    }

    /// Open an empty form.
    pub fn new_entity(&mut self) {
        self.tracker.cancel(Slot::Detail);
        self.status.loading = self.tracker.any_busy();
        self.pending_delete = None;
        self.mode = InputMode::Normal;

        let mut form = EntityForm::new(self.kind, Entity::default(), self.config.expand_all);
        if self.kind.tree {
            form.set_parent_options(self.list.forest());
        }
        self.view = View::Details(Details::Form(Box::new(form)));
        self.ensure_options();
    }

    /// Validate the form and write it: POST for a new record, PUT otherwise.
    pub fn save(&mut self) {
        let kind = self.kind;
        let request = {
            let Some(form) = self.form_mut() else { return };
            if form.saving {
                return;
            }
            match form.validate() {
                Ok(draft) => {
                    form.error = None;
                    form.saving = true;
                    Request::Write {
                        collection: kind.collection.to_string(),
                        mode: WriteMode::save(&draft, kind.tree),
                    }
                }
                Err(e) => {
                    tracing::debug!(collection = kind.collection, error = %e, "form rejected");
                    form.error = Some(e.to_string());
                    return;
                }
            }
        };
        if !self.submit(Slot::Write, request) {
            if let Some(form) = self.form_mut() {
                form.saving = false;
            }
        }
    }

    /// Ask to delete the selected (list) or open (details) record.
    pub fn request_delete(&mut self) {
        let target = match &self.view {
            View::List => self
                .list
                .selected()
                .and_then(|e| e.id.map(|id| (id, e.display_name()))),
            View::Details(Details::Form(form)) => {
                form.id().map(|id| (id, form.original().display_name()))
            }
            View::Details(_) => None,
        };
        self.pending_delete = target.map(|(id, name)| PendingDelete { id, name });
    }

    pub fn confirm_delete(&mut self) {
        let Some(pending) = self.pending_delete.take() else {
            return;
        };
        let collection = self.collection();
        self.submit(
            Slot::Write,
            Request::Write {
                collection,
                mode: WriteMode::Delete { id: pending.id },
            },
        );
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    fn back_to_list(&mut self) {
        self.navigate(NavState::list(self.kind.collection));
    }

    fn apply(&mut self, completion: Completion) {
        let Completion { ticket, result } = completion;
        if !self.tracker.complete(&ticket) {
            return;
        }
        self.status.loading = self.tracker.any_busy();

        match (ticket.slot, result) {
            (Slot::List, Ok(Response::List(items))) => self.apply_list(items),
            (Slot::Detail, Ok(Response::One(entity))) => self.apply_entity(entity),
            (Slot::Write, Ok(Response::Written(outcome))) => self.apply_write(outcome),
            (Slot::Detail, Err(err)) => self.apply_detail_error(err),
            (Slot::Write, Err(err)) => {
                tracing::warn!(collection = self.kind.collection, error = %err, "write failed");
                let message = error_message(&err);
                match self.form_mut() {
                    Some(form) => {
                        form.saving = false;
                        form.error = Some(message);
                    }
                    None => self.status.error = Some(message),
                }
            }
            (slot, Err(err)) => {
                tracing::warn!(collection = self.kind.collection, ?slot, error = %err, "request failed");
                self.status.error = Some(error_message(&err));
            }
            (slot, Ok(_)) => {
                tracing::warn!(collection = self.kind.collection, ?slot, "unexpected response shape");
            }
        }
    }

    fn apply_list(&mut self, items: Vec<Entity>) {
        tracing::debug!(collection = self.kind.collection, count = items.len(), "list loaded");
        self.list.set_items(items);
        self.loaded = true;
        self.status.refreshed_at = Some(Local::now());
        self.status.error = None;
        if let Some(id) = self.focus_after_load.take() {
            self.list.focus_id(id);
        }
        if self.kind.tree {
            let forest = self.list.forest();
            if let Some(form) = self.form_mut() {
                form.set_parent_options(forest);
            }
        }
    }

    fn apply_entity(&mut self, entity: Entity) {
        let mut form = EntityForm::new(self.kind, entity, self.config.expand_all);
        if self.kind.tree && self.loaded {
            form.set_parent_options(self.list.forest());
        }
        self.view = View::Details(Details::Form(Box::new(form)));
    }

    fn apply_detail_error(&mut self, err: ApiError) {
        let id = match &self.view {
            View::Details(Details::Loading { id }) => id.clone(),
            _ => return,
        };
        self.view = if err.is_not_found() {
            tracing::debug!(collection = self.kind.collection, %id, "entity not found");
            View::Details(Details::NotFound { id })
        } else {
            tracing::warn!(collection = self.kind.collection, %id, error = %err, "entity fetch failed");
            View::Details(Details::Failed {
                id,
                message: error_message(&err),
            })
        };
    }

    fn apply_write(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Saved(entity) => {
                tracing::info!(collection = self.kind.collection, id = ?entity.id, "entity saved");
                self.focus_after_load = entity.id;
            }
            WriteOutcome::Deleted(existed) => {
                tracing::info!(collection = self.kind.collection, existed, "entity deleted");
            }
        }
        self.navigate(NavState::list(self.kind.collection).with_refresh());
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc => {
                self.searching = false;
                self.mode = InputMode::Normal;
                self.list.set_search("");
                Action::SetMode(InputMode::Normal)
            }
            KeyCode::Enter => {
                self.searching = false;
                self.mode = InputMode::Normal;
                Action::SetMode(InputMode::Normal)
            }
            _ => {
                if self.list.search.handle_key(key) {
                    self.list.refilter();
                }
                Action::None
            }
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) -> Action {
        let Some(form) = self.form_mut() else {
            self.mode = InputMode::Normal;
            return Action::SetMode(InputMode::Normal);
        };
        match form.handle_edit_key(key) {
            FormEvent::EditFinished => {
                self.mode = InputMode::Normal;
                Action::SetMode(InputMode::Normal)
            }
            _ => Action::None,
        }
    }

    fn handle_list_action(&mut self, action: Action) -> Action {
        match action {
            Action::MoveDown(n) => self.list.move_down(n),
            Action::MoveUp(n) => self.list.move_up(n),
            Action::GotoTop => self.list.goto_top(),
            Action::GotoBottom => self.list.goto_bottom(),
            Action::HalfPageDown => self.list.move_down(10),
            Action::HalfPageUp => self.list.move_up(10),
            Action::NextPage => self.list.next_page(),
            Action::PrevPage => self.list.prev_page(),
            Action::Expand => self.list.expand(),
            Action::Collapse => self.list.collapse(),
            Action::ExpandAll => self.list.expand_all(),
            Action::CollapseAll => self.list.collapse_all(),
            Action::Confirm | Action::Edit => {
                if let Some(id) = self.list.selected().and_then(|e| e.id) {
                    self.open_details(&id.to_string());
                }
            }
            Action::Add => self.new_entity(),
            Action::Delete => self.request_delete(),
            Action::Refresh => self.reload(),
            Action::Search => {
                self.searching = true;
                self.mode = InputMode::Insert;
                return Action::SetMode(InputMode::Insert);
            }
            Action::Back if !self.list.query().is_empty() => self.list.set_search(""),
            other => return bubble(other),
        }
        Action::None
    }

    fn handle_details_action(&mut self, action: Action) -> Action {
        match action {
            Action::Back => self.back_to_list(),
            Action::Refresh => match self.detail_id() {
                Some(id) => self.open_details(&id),
                None => self.ensure_options(),
            },
            Action::Save | Action::Confirm => self.save(),
            Action::Delete => self.request_delete(),
            Action::Add => self.new_entity(),
            Action::MoveDown(_) => {
                if let Some(form) = self.form_mut() {
                    form.focus_next();
                }
            }
            Action::MoveUp(_) => {
                if let Some(form) = self.form_mut() {
                    form.focus_prev();
                }
            }
            Action::GotoTop => {
                if let Some(form) = self.form_mut() {
                    while form.focus() != 0 {
                        form.focus_prev();
                    }
                }
            }
            Action::Edit => {
                if let Some(form) = self.form_mut() {
                    if form.start_edit() == FormEvent::EditStarted {
                        self.mode = InputMode::Insert;
                        return Action::SetMode(InputMode::Insert);
                    }
                }
            }
            Action::ClearSelection => {
                if let Some(form) = self.form_mut() {
                    if form.focused_field().kind == FieldKind::Parent {
                        form.set_parent(None);
                    }
                }
            }
            other => return bubble(other),
        }
        Action::None
    }

    fn detail_id(&self) -> Option<String> {
        match &self.view {
            View::List => None,
            View::Details(Details::Form(form)) => form.id().map(|id| id.to_string()),
            View::Details(
                Details::Loading { id } | Details::NotFound { id } | Details::Failed { id, .. },
            ) => Some(id.clone()),
        }
    }
}

/// Actions the hub handles.
fn bubble(action: Action) -> Action {
    match action {
        Action::Quit
        | Action::LeaderKey
        | Action::LeaderSequence(_)
        | Action::SwitchPage(_)
        | Action::NextTab
        | Action::PrevTab
        | Action::PagePicker
        | Action::Finder
        | Action::Help
        | Action::Navigate(_)
        | Action::SetMode(InputMode::Command) => action,
        _ => Action::None,
    }
}

impl Page for EntityPage {
    fn name(&self) -> &str {
        self.kind.name
    }

    fn route(&self) -> &str {
        self.kind.collection
    }

    fn leader_key(&self) -> char {
        self.kind.leader_key
    }

    fn description(&self) -> &str {
        self.kind.description
    }

    fn mode(&self) -> InputMode {
        self.mode
    }

    fn chrome(&self) -> PageChrome {
        let kind = self.kind;
        match &self.view {
            View::List => PageChrome {
                title: kind.name.to_string(),
                subtitle: Some(if self.loaded {
                    self.list.count_label()
                } else {
                    "Loading…".to_string()
                }),
                primary: Some(ActionButton::new("a", "New")),
                secondary: Some(ActionButton::new("R", "Refresh")),
            },
            View::Details(Details::Form(form)) => PageChrome {
                title: if form.is_new() {
                    format!("New {}", kind.singular)
                } else {
                    kind.singular_title()
                },
                subtitle: (!form.is_new()).then(|| form.original().display_name()),
                primary: Some(ActionButton::new("Enter", "Save")),
                secondary: Some(if form.is_new() {
                    ActionButton::new("Esc", "Back")
                } else {
                    ActionButton::new("dd", "Delete")
                }),
            },
            View::Details(
                Details::Loading { id } | Details::NotFound { id } | Details::Failed { id, .. },
            ) => PageChrome {
                title: kind.singular_title(),
                subtitle: Some(format!("#{id}")),
                primary: None,
                secondary: Some(ActionButton::new("Esc", "Back")),
            },
        }
    }

    fn status(&self) -> PageStatus {
        self.status.clone()
    }

    fn which_key_entries(&self) -> Vec<WhichKeyEntry> {
        let mut entries = vec![WhichKeyEntry::action("n", format!("New {}", self.kind.singular))];
        if self.kind.tree {
            entries.push(WhichKeyEntry::action("E", "Expand all"));
            entries.push(WhichKeyEntry::action("C", "Collapse all"));
        }
        entries
    }

    fn finder_items(&self) -> Vec<FinderItem> {
        let forest = self.list.forest();
        flatten(&forest)
            .into_iter()
            .filter_map(|entity| {
                let id = entity.id?;
                let description = match self.kind.subtitle(entity) {
                    Some(subtitle) => format!("{}  {}", self.kind.singular_title(), subtitle),
                    None => self.kind.singular_title(),
                };
                Some(FinderItem::new(
                    entity.display_name(),
                    description,
                    NavState::details(self.kind.collection, id.to_string()).to_string(),
                ))
            })
            .collect()
    }

    fn help_entries(&self) -> Vec<HelpEntry> {
        let name = self.kind.name;
        let mut entries = vec![
            HelpEntry::with_section(name, "Enter / e", "Open the selected record"),
            HelpEntry::with_section(name, "a", format!("New {}", self.kind.singular)),
            HelpEntry::with_section(name, "dd then y", "Delete"),
            HelpEntry::with_section(name, "/", "Search (Esc clears)"),
        ];
        if self.kind.tree {
            entries.push(HelpEntry::with_section("Tree", "l / h", "Expand / collapse"));
            entries.push(HelpEntry::with_section("Tree", "E / C", "Expand / collapse all"));
        } else {
            entries.push(HelpEntry::with_section(name, "] / [", "Next / previous page"));
        }
        entries.push(HelpEntry::with_section("Form", "j / k", "Next / previous field"));
        entries.push(HelpEntry::with_section("Form", "e", "Edit field (parent opens the picker)"));
        entries.push(HelpEntry::with_section("Form", "Tab", "Next field while editing"));
        entries.push(HelpEntry::with_section("Form", "Enter / Ctrl-s", "Save"));
        if self.kind.tree {
            entries.push(HelpEntry::with_section("Form", "x", "Clear parent"));
        }
        entries
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        if self.pending_delete.is_some() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => self.confirm_delete(),
                _ => self.cancel_delete(),
            }
            return Action::None;
        }

        match self.mode {
            InputMode::Insert if self.searching => self.handle_search_key(key),
            InputMode::Insert => self.handle_form_key(key),
            InputMode::Command => Action::None,
            InputMode::Normal => {
                let action = process_normal_key(key, &mut self.key_state);
                if matches!(self.view, View::List) {
                    self.handle_list_action(action)
                } else {
                    self.handle_details_action(action)
                }
            }
        }
    }

    fn handle_leader_action(&mut self, key: char) -> Option<Action> {
        match key {
            'n' => self.new_entity(),
            'E' if self.kind.tree => self.list.expand_all(),
            'C' if self.kind.tree => self.list.collapse_all(),
            _ => return None,
        }
        Some(Action::None)
    }

    fn navigate(&mut self, mut nav: NavState) {
        let refresh = nav.take_refresh();
        tracing::info!(route = %nav, refresh, "navigate");
        if let Some(query) = nav.param("q") {
            let query = query.to_string();
            self.list.set_search(&query);
        }
        self.pending_delete = None;
        self.searching = false;
        self.mode = InputMode::Normal;
        self.key_state.reset();

        match nav.target {
            Target::List => {
                self.tracker.cancel(Slot::Detail);
                self.status.loading = self.tracker.any_busy();
                self.view = View::List;
                if refresh || (!self.loaded && !self.tracker.is_busy(Slot::List)) {
                    self.reload();
                }
            }
            Target::New => {
                self.new_entity();
                if refresh && !self.tracker.is_busy(Slot::List) {
                    self.reload();
                }
            }
            Target::Details(id) => {
                self.open_details(&id);
                if refresh && !self.tracker.is_busy(Slot::List) {
                    self.reload();
                }
            }
        }
    }

    fn refresh(&mut self) {
        match self.detail_id() {
            Some(id) => self.open_details(&id),
            None => self.reload(),
        }
    }

    fn write(&mut self) {
        self.save();
    }

    fn current_route(&self) -> String {
        let collection = self.kind.collection;
        let nav = match &self.view {
            View::List => {
                let nav = NavState::list(collection);
                if self.list.query().is_empty() {
                    nav
                } else {
                    nav.with_param("q", self.list.query())
                }
            }
            View::Details(Details::Form(form)) => match form.id() {
                Some(id) => NavState::details(collection, id.to_string()),
                None => NavState::new_entity(collection),
            },
            View::Details(
                Details::Loading { id } | Details::NotFound { id } | Details::Failed { id, .. },
            ) => NavState::details(collection, id.clone()),
        };
        nav.to_string()
    }

    fn render(&mut self, frame: &mut Frame, area: Rect) {
        let (header, body) = core_ui::page_layout(area);
        core_ui::render_page_header(frame, header, &self.chrome());

        match &self.view {
            View::List => ui::render_list(frame, body, &self.list, self.searching),
            View::Details(Details::Form(form)) => ui::render_form(frame, body, form),
            View::Details(Details::Loading { id }) => {
                ui::render_details_message(frame, body, &format!("Loading #{id}…"), false)
            }
            View::Details(Details::NotFound { id }) => ui::render_details_message(
                frame,
                body,
                &format!("{} #{id} not found", self.kind.singular_title()),
                true,
            ),
            View::Details(Details::Failed { message, .. }) => {
                ui::render_details_message(frame, body, message, true)
            }
        }

        if let Some(pending) = &self.pending_delete {
            ui::render_delete_confirm(frame, area, self.kind, pending);
        }
        if let Some(form) = self.form() {
            form.parent_picker.render(frame, area);
        }
    }

    fn reset_key_state(&mut self) {
        self.key_state.reset();
    }

    fn on_focus(&mut self) {
        if !self.loaded && !self.tracker.is_busy(Slot::List) {
            self.reload();
        }
    }

    fn on_session_change(&mut self, token: Option<&str>) {
        if let Err(e) = self.backend.set_token(token.map(str::to_string)) {
            self.status.error = Some(e.user_message());
            return;
        }
        if self.loaded {
            self.reload();
        }
    }

    fn tick(&mut self) {
        while let Some(completion) = self.backend.try_recv() {
            self.apply(completion);
        }
    }
}

/// Inline message for a failed request, with a login hint when the
/// server rejected the credentials.
fn error_message(err: &ApiError) -> String {
    let message = err.user_message();
    if err.is_unauthorized() {
        format!("{message} (use :login <token>)")
    } else {
        message
    }
}
