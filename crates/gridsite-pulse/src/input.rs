use crate::export::open_external;
use crate::session::Session;
use crate::views::HistoryAction;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use gridsite_core::{join_tags, QueryId, QueryKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Table,
    History,
    Templates,
}

impl Focus {
    pub fn title(self) -> &'static str {
        match self {
            Focus::Table => "Queries",
            Focus::History => "History",
            Focus::Templates => "Templates",
        }
    }

    fn next(self) -> Self {
        match self {
            Focus::Table => Focus::History,
            Focus::History => Focus::Templates,
            Focus::Templates => Focus::Table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    NewQuery { template_id: Option<String> },
    Tags(QueryId),
    TemplateName { text: String },
}

impl Prompt {
    pub fn title(&self) -> &'static str {
        match self {
            Prompt::NewQuery { template_id: None } => "New query",
            Prompt::NewQuery { template_id: Some(_) } => "New query (template)",
            Prompt::Tags(_) => "Tags (comma separated)",
            Prompt::TemplateName { .. } => "Template name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirm {
    DeleteQuery(QueryId),
    DeleteTemplate(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Editing { prompt: Prompt, buffer: String },
    Confirming(Confirm),
}

/// Terminal-side state: focus, selections and the active prompt.
#[derive(Debug)]
pub struct Console {
    pub focus: Focus,
    pub table_selected: usize,
    pub history_selected: usize,
    pub template_selected: usize,
    pub mode: Mode,
    pub help_open: bool,
    opener: String,
}

impl Console {
    pub fn new(opener: impl Into<String>) -> Self {
        Self {
            focus: Focus::Table,
            table_selected: 0,
            history_selected: 0,
            template_selected: 0,
            mode: Mode::Normal,
            help_open: false,
            opener: opener.into(),
        }
    }

    /// Keep selections inside the lists after rows come and go.
    pub fn clamp(&mut self, session: &Session) {
        let views = session.views();
        self.table_selected = clamp_index(self.table_selected, views.table.visible_rows().count());
        self.history_selected = clamp_index(self.history_selected, views.history.len());
        self.template_selected = clamp_index(self.template_selected, session.templates().len());
    }

    pub fn selected_key(&self, session: &Session) -> Option<QueryKey> {
        let views = session.views();
        match self.focus {
            Focus::Table => views
                .table
                .visible_rows()
                .nth(self.table_selected)
                .map(|row| row.key.clone()),
            Focus::History => views
                .history
                .entries()
                .get(self.history_selected)
                .map(|entry| entry.key.clone()),
            Focus::Templates => None,
        }
    }

    /// The open drawer wins over the list selection.
    fn target_id(&self, session: &Session) -> Option<QueryId> {
        session
            .views()
            .drawer
            .open_key()
            .cloned()
            .or_else(|| self.selected_key(session))
            .and_then(|key| key.confirmed_id().cloned())
    }

    /// History entries carry their own intents; other lists fall back to the target.
    fn intent(&self, session: &Session, rerun: bool) -> Option<QueryId> {
        if self.focus != Focus::History || session.views().drawer.is_open() {
            return self.target_id(session);
        }
        let key = self.selected_key(session)?;
        let actions = session.views().history.actions(&key);
        if actions.is_empty() {
            // Locked entry; the session explains the refusal.
            return key.confirmed_id().cloned();
        }
        actions.into_iter().find_map(|action| match (action, rerun) {
            (HistoryAction::Rerun(id), true) | (HistoryAction::Delete(id), false) => Some(id),
            _ => None,
        })
    }

    fn selected_template(&self, session: &Session) -> Option<String> {
        if self.focus != Focus::Templates {
            return None;
        }
        session
            .templates()
            .at(self.template_selected)
            .map(|template| template.id.clone())
    }

    fn move_selection(&mut self, session: &Session, step: i32) {
        let (selected, len) = match self.focus {
            Focus::Table => (
                &mut self.table_selected,
                session.views().table.visible_rows().count(),
            ),
            Focus::History => (&mut self.history_selected, session.views().history.len()),
            Focus::Templates => (&mut self.template_selected, session.templates().len()),
        };
        if len == 0 {
            *selected = 0;
            return;
        }
        let next = (*selected as i64 + i64::from(step)).clamp(0, len as i64 - 1);
        *selected = next as usize;
    }

    fn edit(&mut self, prompt: Prompt, buffer: String) {
        self.mode = Mode::Editing { prompt, buffer };
    }
}

fn clamp_index(index: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        index.min(len - 1)
    }
}

pub fn handle_input(event: Event, console: &mut Console, session: &mut Session) -> bool {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(key, console, session),
        _ => false,
    }
}

/// Returns true when the user asked to quit.
pub fn handle_key(key: KeyEvent, console: &mut Console, session: &mut Session) -> bool {
    match std::mem::replace(&mut console.mode, Mode::Normal) {
        Mode::Editing { prompt, buffer } => {
            handle_editing(key, console, session, prompt, buffer);
            false
        }
        Mode::Confirming(confirm) => {
            handle_confirm(key, session, confirm);
            false
        }
        Mode::Normal => handle_normal(key, console, session),
    }
}

fn handle_editing(
    key: KeyEvent,
    console: &mut Console,
    session: &mut Session,
    prompt: Prompt,
    mut buffer: String,
) {
    match key.code {
        KeyCode::Esc => {}
        KeyCode::Enter => match prompt {
            Prompt::NewQuery { template_id } => {
                session.submit(&buffer, template_id);
            }
            Prompt::Tags(id) => session.save_tags(&id, &buffer),
            Prompt::TemplateName { text } => session.create_template(&buffer, &text),
        },
        KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => match prompt {
            Prompt::NewQuery { .. } if !buffer.trim().is_empty() => {
                console.edit(Prompt::TemplateName { text: buffer }, String::new());
            }
            prompt => console.edit(prompt, buffer),
        },
        KeyCode::Backspace => {
            buffer.pop();
            console.edit(prompt, buffer);
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            buffer.push(c);
            console.edit(prompt, buffer);
        }
        _ => console.edit(prompt, buffer),
    }
}

fn handle_confirm(key: KeyEvent, session: &mut Session, confirm: Confirm) {
    if !matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
        session.status_note = Some("Cancelled".to_string());
        return;
    }
    match confirm {
        Confirm::DeleteQuery(id) => session.delete(&id),
        Confirm::DeleteTemplate(template_id) => session.delete_template(&template_id),
    }
}

fn handle_normal(key: KeyEvent, console: &mut Console, session: &mut Session) -> bool {
    if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1)) {
        console.help_open = !console.help_open;
        return false;
    }
    if key.code == KeyCode::Esc && console.help_open {
        console.help_open = false;
        return false;
    }
    if console.help_open {
        return false;
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Tab => console.focus = console.focus.next(),
        KeyCode::Down | KeyCode::Char('j') => console.move_selection(session, 1),
        KeyCode::Up | KeyCode::Char('k') => console.move_selection(session, -1),
        KeyCode::Right | KeyCode::Char(']') => session.drawer_next_tab(),
        KeyCode::Left | KeyCode::Char('[') => session.drawer_prev_tab(),
        KeyCode::Esc => session.close_drawer(),
        KeyCode::Enter => match console.focus {
            Focus::Templates => load_template(console, session),
            _ => {
                if let Some(key) = console.selected_key(session) {
                    session.open_drawer(&key);
                }
            }
        },
        KeyCode::Char('n') => {
            let draft = session.take_draft().unwrap_or_default();
            console.edit(Prompt::NewQuery { template_id: None }, draft);
        }
        KeyCode::Char('f') => session.cycle_filter(),
        KeyCode::Char('d') => match console.intent(session, false) {
            Some(id) if !session.allow_actions(&id) => {}
            Some(id) => {
                session.status_note = Some(format!("Delete query #{id}? (y/N)"));
                console.mode = Mode::Confirming(Confirm::DeleteQuery(id));
            }
            None => session.status_note = Some("Select a submitted query first".to_string()),
        },
        KeyCode::Char('r') => match console.intent(session, true) {
            Some(id) => session.rerun(&id),
            None => session.status_note = Some("Select a submitted query first".to_string()),
        },
        KeyCode::Char('t') => match console.target_id(session) {
            Some(id) if !session.allow_actions(&id) => {}
            Some(id) => {
                let current = session
                    .store()
                    .get_confirmed(&id)
                    .map(|query| join_tags(&query.tags))
                    .unwrap_or_default();
                console.edit(Prompt::Tags(id), current);
            }
            None => session.status_note = Some("Select a submitted query first".to_string()),
        },
        KeyCode::Char('e') => match console.target_id(session) {
            Some(id) if !session.allow_actions(&id) => {}
            Some(id) => {
                let url = session.export_url(&id);
                session.status_note = Some(match open_external(&console.opener, &url) {
                    Ok(()) => format!("Opened export for query #{id}"),
                    Err(err) => format!("Export failed: {err:#}"),
                });
            }
            None => session.status_note = Some("Select a submitted query first".to_string()),
        },
        KeyCode::Char('s') => {
            let text = console
                .target_id(session)
                .and_then(|id| session.store().get_confirmed(&id).map(|q| q.text.clone()));
            match text {
                Some(text) => console.edit(Prompt::TemplateName { text }, String::new()),
                None => session.status_note = Some("Select a query to save as template".to_string()),
            }
        }
        KeyCode::Char('l') => load_template(console, session),
        KeyCode::Char('R') => match console.selected_template(session) {
            Some(template_id) => {
                session.run_template(&template_id);
            }
            None => session.status_note = Some("Select a template first (Tab)".to_string()),
        },
        KeyCode::Char('x') => match console.selected_template(session) {
            Some(template_id) => {
                session.status_note = Some("Delete template? (y/N)".to_string());
                console.mode = Mode::Confirming(Confirm::DeleteTemplate(template_id));
            }
            None => session.status_note = Some("Select a template first (Tab)".to_string()),
        },
        _ => {}
    }
    false
}

fn load_template(console: &mut Console, session: &mut Session) {
    let Some(template_id) = console.selected_template(session) else {
        session.status_note = Some("Select a template first (Tab)".to_string());
        return;
    };
    if let Some(text) = session.load_template(&template_id) {
        console.edit(
            Prompt::NewQuery {
                template_id: Some(template_id),
            },
            text,
        );
    }
}
