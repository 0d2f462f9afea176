//! The dashboard session: one store, its pollers and views, and the single
//! place where responses are applied.
//!
//! Every background task (status pollers, command requests, the health probe)
//! reports through [`SessionEvent`]; the main loop hands each event to
//! [`Session::apply`], so store mutations never race each other.

use crate::dispatcher::{CommandDispatcher, CommandOutcome};
use crate::health::HealthBoard;
use crate::poller::{PollOutcome, PollReport, StatusPoller};
use crate::templates::TemplateList;
use crate::views::{Notice, ViewSet};
use chrono::Local;
use gridsite_client::{ApiError, QueryApi};
use gridsite_core::contracts::{
    SubmitForm, TemplateForm, GENERIC_SUBMIT_ERROR, GENERIC_TEMPLATE_ERROR,
};
use gridsite_core::hydrate::InitialPayload;
use gridsite_core::{
    parse_tag_input, HealthSnapshot, Query, QueryId, QueryKey, QueryStatus, QueryStore,
    CREATED_AT_FORMAT,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const NOTICE_HISTORY: usize = 20;
pub const EMPTY_QUERY_NOTE: &str = "Please enter a query.";

#[derive(Debug)]
pub enum SessionEvent {
    Poll(PollReport),
    Command(CommandOutcome),
    Health(Result<HealthSnapshot, ApiError>),
}

pub struct Session {
    store: QueryStore,
    views: ViewSet,
    poller: StatusPoller,
    dispatcher: CommandDispatcher,
    templates: TemplateList,
    health: HealthBoard,
    notices: VecDeque<Notice>,
    pending_submits: HashSet<u64>,
    draft: Option<String>,
    pub status_note: Option<String>,
}

fn now_stamp() -> String {
    Local::now().format(CREATED_AT_FORMAT).to_string()
}

impl Session {
    pub fn new(
        api: Arc<dyn QueryApi>,
        events: mpsc::Sender<SessionEvent>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store: QueryStore::new(),
            views: ViewSet::default(),
            poller: StatusPoller::new(Arc::clone(&api), events.clone(), poll_interval),
            dispatcher: CommandDispatcher::new(api, events),
            templates: TemplateList::default(),
            health: HealthBoard::default(),
            notices: VecDeque::new(),
            pending_submits: HashSet::new(),
            draft: None,
            status_note: None,
        }
    }

    pub fn store(&self) -> &QueryStore {
        &self.store
    }

    pub fn views(&self) -> &ViewSet {
        &self.views
    }

    pub fn templates(&self) -> &TemplateList {
        &self.templates
    }

    pub fn health(&self) -> &HealthBoard {
        &self.health
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn is_polling(&self, id: &QueryId) -> bool {
        self.poller.is_active(id)
    }

    /// A submit is awaiting its id or some query is still being polled.
    pub fn is_processing(&self) -> bool {
        !self.pending_submits.is_empty() || self.poller.active_count() > 0
    }

    /// Text of the last submit the backend refused, for re-editing.
    pub fn take_draft(&mut self) -> Option<String> {
        self.draft.take()
    }

    /// Seed from server-rendered data. Queries that are still in flight get
    /// a poller so they keep moving.
    pub fn hydrate(&mut self, payload: InitialPayload) -> usize {
        let InitialPayload { queries, templates } = payload;
        let mut resumed = 0usize;
        for snapshot in queries {
            let Some(query) = self.store.merge(snapshot).cloned() else {
                continue;
            };
            self.publish(&query);
            if let Some(id) = query.id().filter(|_| !query.is_terminal()) {
                self.poller.start(id.clone());
                resumed += 1;
            }
        }
        self.templates.replace_all(templates);
        info!(
            event = "session_hydrated",
            queries = self.store.len(),
            templates = self.templates.len(),
            resumed
        );
        self.store.len()
    }

    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Poll(report) => self.apply_poll(report),
            SessionEvent::Command(outcome) => self.apply_command(outcome),
            SessionEvent::Health(result) => self.health.apply(result),
        }
    }

    fn apply_poll(&mut self, report: PollReport) {
        let PollReport { ticket, outcome } = report;
        if !self.poller.accept(&ticket) {
            debug!(
                event = "poll_stale",
                query_id = %ticket.id,
                generation = ticket.generation,
                seq = ticket.seq
            );
            return;
        }
        match outcome {
            PollOutcome::Snapshot(snapshot) => match self.store.merge(snapshot).cloned() {
                Some(query) => {
                    self.publish(&query);
                    if query.is_terminal() {
                        self.poller.finish(&ticket.id);
                        info!(
                            event = "query_finished",
                            query_id = %ticket.id,
                            status = %query.status
                        );
                    }
                }
                None => {
                    self.poller.stop(&ticket.id);
                }
            },
            PollOutcome::Failed(err) => {
                warn!(event = "poll_failed", query_id = %ticket.id, error = %err);
                self.poller.finish(&ticket.id);
            }
        }
    }

    fn apply_command(&mut self, outcome: CommandOutcome) {
        match outcome {
            CommandOutcome::Submitted {
                provisional,
                form,
                result,
            } => self.apply_submitted(provisional, form, result),
            CommandOutcome::Deleted { id, result } => match result {
                Ok(()) => {
                    self.poller.stop(&id);
                    self.store.remove(&id);
                    self.views.remove(&QueryKey::Confirmed(id.clone()));
                    info!(event = "query_deleted", query_id = %id);
                    self.status_note = Some(format!("Query #{id} deleted"));
                }
                Err(err) => self.command_failed("delete", &id, err),
            },
            CommandOutcome::Rerun { source, result } => match result {
                Ok(new_id) => {
                    let (text, tags) = self
                        .store
                        .get_confirmed(&source)
                        .map(|query| (query.text.clone(), query.tags.clone()))
                        .unwrap_or_default();
                    if let Some(query) = self
                        .store
                        .insert_pending(new_id.clone(), text, now_stamp(), tags)
                        .cloned()
                    {
                        self.publish(&query);
                        self.poller.start(new_id.clone());
                    }
                    info!(event = "query_rerun", source = %source, query_id = %new_id);
                    self.status_note = Some(format!("Query #{source} re-run as #{new_id}"));
                }
                Err(err) => self.command_failed("re-run", &source, err),
            },
            CommandOutcome::TagsSaved { id, result } => match result {
                Ok(tags) => {
                    if let Some(query) = self.store.set_tags(&id, tags).cloned() {
                        self.publish(&query);
                    }
                    self.status_note = Some(format!("Tags saved for query #{id}"));
                }
                Err(err) => self.command_failed("tag save", &id, err),
            },
            CommandOutcome::TemplateCreated { result } => match result {
                Ok(template) => {
                    info!(event = "template_created", template_id = %template.id);
                    self.status_note = Some(format!("Template \"{}\" saved", template.name));
                    self.templates.upsert(template);
                }
                Err(err) => {
                    warn!(event = "template_create_failed", error = %err);
                    self.status_note = Some(err.user_message(GENERIC_TEMPLATE_ERROR));
                }
            },
            CommandOutcome::TemplateDeleted {
                template_id,
                result,
            } => match result {
                Ok(()) => {
                    if let Some(template) = self.templates.remove(&template_id) {
                        self.status_note = Some(format!("Template \"{}\" deleted", template.name));
                    }
                }
                Err(err) => {
                    warn!(event = "template_delete_failed", template_id = %template_id, error = %err);
                    self.status_note = Some(format!("Template delete failed: {err}"));
                }
            },
        }
    }

    fn apply_submitted(&mut self, provisional: u64, form: SubmitForm, result: Result<QueryId, ApiError>) {
        self.pending_submits.remove(&provisional);
        let from = QueryKey::Provisional(provisional);
        match result {
            Ok(id) => match self.store.confirm(provisional, id.clone()).cloned() {
                Some(query) => {
                    if self.views.table.row(&query.key).is_some() {
                        self.views.remove(&from);
                    } else {
                        self.views.rekey(&from, &query.key);
                    }
                    self.publish(&query);
                    if !query.is_terminal() {
                        self.poller.start(id.clone());
                    }
                    info!(event = "query_confirmed", provisional, query_id = %id);
                    self.status_note = Some(format!("Query #{id} queued"));
                }
                None => self.views.remove(&from),
            },
            Err(err) => {
                warn!(event = "submit_failed", provisional, error = %err);
                self.store.discard_provisional(provisional);
                self.views.remove(&from);
                self.status_note = Some(err.user_message(GENERIC_SUBMIT_ERROR));
                self.draft = Some(form.text);
            }
        }
    }

    fn command_failed(&mut self, command: &str, id: &QueryId, err: ApiError) {
        warn!(event = "command_failed", command, query_id = %id, error = %err);
        self.status_note = Some(format!("{} failed for query #{id}: {err}", capitalize(command)));
    }

    fn publish(&mut self, query: &Query) {
        for notice in self.views.publish(query) {
            info!(event = "query_completed_notice", key = %query.key);
            self.status_note = Some(notice.message());
            self.notices.push_back(notice);
            while self.notices.len() > NOTICE_HISTORY {
                self.notices.pop_front();
            }
        }
    }

    /// Show the record right away and send it; `None` when the text is blank.
    pub fn submit(&mut self, text: &str, template_id: Option<String>) -> Option<QueryKey> {
        let text = text.trim();
        if text.is_empty() {
            self.status_note = Some(EMPTY_QUERY_NOTE.to_string());
            return None;
        }
        let key = self.store.insert_provisional(text, now_stamp());
        let QueryKey::Provisional(provisional) = key else {
            return None;
        };
        if let Some(query) = self.store.get(&key).cloned() {
            self.publish(&query);
        }
        self.pending_submits.insert(provisional);
        let form = match template_id {
            Some(template_id) => SubmitForm::from_template(text, template_id),
            None => SubmitForm::new(text),
        };
        info!(event = "query_submit", provisional, templated = form.template_id.is_some());
        self.dispatcher.submit(provisional, form);
        self.status_note = Some("Submitting query...".to_string());
        Some(key)
    }

    /// Row actions stay locked until the backend picks the query up. Sets the
    /// status note when refusing.
    pub fn allow_actions(&mut self, id: &QueryId) -> bool {
        match self.store.get_confirmed(id).map(|query| query.status) {
            None => {
                self.status_note = Some(format!("Query #{id} is not loaded"));
                false
            }
            Some(QueryStatus::Pending) => {
                self.status_note = Some(format!("Query #{id} is still pending"));
                false
            }
            Some(_) => true,
        }
    }

    pub fn delete(&mut self, id: &QueryId) {
        if !self.allow_actions(id) {
            return;
        }
        self.dispatcher.delete(id.clone());
        self.status_note = Some(format!("Deleting query #{id}..."));
    }

    pub fn rerun(&mut self, id: &QueryId) {
        if !self.allow_actions(id) {
            return;
        }
        self.dispatcher.rerun(id.clone());
        self.status_note = Some(format!("Re-running query #{id}..."));
    }

    pub fn save_tags(&mut self, id: &QueryId, input: &str) {
        if !self.allow_actions(id) {
            return;
        }
        self.dispatcher.save_tags(id.clone(), parse_tag_input(input));
        self.status_note = Some(format!("Saving tags for query #{id}..."));
    }

    pub fn export_url(&self, id: &QueryId) -> String {
        self.dispatcher.export_url(id)
    }

    pub fn open_drawer(&mut self, key: &QueryKey) -> bool {
        match self.store.get(key) {
            Some(query) => {
                self.views.drawer.open(query);
                true
            }
            None => false,
        }
    }

    pub fn close_drawer(&mut self) {
        self.views.drawer.close();
    }

    pub fn drawer_next_tab(&mut self) {
        self.views.drawer.next_tab();
    }

    pub fn drawer_prev_tab(&mut self) {
        self.views.drawer.prev_tab();
    }

    pub fn cycle_filter(&mut self) {
        let label = self
            .views
            .table
            .cycle_filter()
            .map(|status| status.label())
            .unwrap_or("All");
        self.status_note = Some(format!("Filter: {label}"));
    }

    pub fn create_template(&mut self, name: &str, text: &str) {
        let name = name.trim();
        if name.is_empty() || text.trim().is_empty() {
            self.status_note = Some("Template needs a name and query text.".to_string());
            return;
        }
        self.dispatcher.create_template(TemplateForm {
            name: name.to_string(),
            text: text.trim().to_string(),
        });
        self.status_note = Some(format!("Saving template \"{name}\"..."));
    }

    pub fn delete_template(&mut self, template_id: &str) {
        if self.templates.get(template_id).is_none() {
            return;
        }
        self.dispatcher.delete_template(template_id.to_string());
    }

    /// Template text for pre-filling the submit prompt.
    pub fn load_template(&mut self, template_id: &str) -> Option<String> {
        let template = self.templates.get(template_id)?;
        let text = template.text.clone();
        self.status_note = Some(format!("Loaded template \"{}\"", template.name));
        Some(text)
    }

    pub fn run_template(&mut self, template_id: &str) -> Option<QueryKey> {
        let text = self.templates.get(template_id)?.text.clone();
        self.submit(&text, Some(template_id.to_string()))
    }

    pub fn shutdown(&mut self) {
        self.poller.stop_all();
    }
}

fn capitalize(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
