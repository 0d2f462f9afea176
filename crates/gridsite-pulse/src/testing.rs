//! Scripted stand-in for the backend used by the dashboard tests.

use async_trait::async_trait;
use gridsite_client::{ApiError, QueryApi};
use gridsite_core::contracts::{SubmitForm, TemplateForm};
use gridsite_core::{normalize_tags, HealthSnapshot, QueryId, QuerySnapshot, Template};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeApi {
    statuses: Mutex<HashMap<QueryId, VecDeque<Result<QuerySnapshot, ApiError>>>>,
    status_calls: Mutex<HashMap<QueryId, usize>>,
    submits: Mutex<VecDeque<Result<QueryId, ApiError>>>,
    submitted: Mutex<Vec<SubmitForm>>,
    reruns: Mutex<VecDeque<Result<QueryId, ApiError>>>,
    deletes: Mutex<VecDeque<Result<(), ApiError>>>,
    tags: Mutex<VecDeque<Result<Vec<String>, ApiError>>>,
    commands: Mutex<Vec<String>>,
    templates: Mutex<VecDeque<Result<Template, ApiError>>>,
    health: Mutex<VecDeque<Result<HealthSnapshot, ApiError>>>,
    health_calls: Mutex<usize>,
}

fn not_found() -> ApiError {
    ApiError::Status {
        status: 404,
        message: None,
    }
}

impl FakeApi {
    pub fn script_status(&self, id: &QueryId, result: Result<QuerySnapshot, ApiError>) {
        self.statuses
            .lock()
            .expect("statuses lock")
            .entry(id.clone())
            .or_default()
            .push_back(result);
    }

    pub fn script_submit(&self, result: Result<QueryId, ApiError>) {
        self.submits.lock().expect("submits lock").push_back(result);
    }

    pub fn script_rerun(&self, result: Result<QueryId, ApiError>) {
        self.reruns.lock().expect("reruns lock").push_back(result);
    }

    pub fn script_delete(&self, result: Result<(), ApiError>) {
        self.deletes.lock().expect("deletes lock").push_back(result);
    }

    pub fn script_tags(&self, result: Result<Vec<String>, ApiError>) {
        self.tags.lock().expect("tags lock").push_back(result);
    }

    pub fn script_template(&self, result: Result<Template, ApiError>) {
        self.templates.lock().expect("templates lock").push_back(result);
    }

    pub fn script_health(&self, result: Result<HealthSnapshot, ApiError>) {
        self.health.lock().expect("health lock").push_back(result);
    }

    pub fn status_calls(&self, id: &QueryId) -> usize {
        self.status_calls
            .lock()
            .expect("calls lock")
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn health_calls(&self) -> usize {
        *self.health_calls.lock().expect("health calls lock")
    }

    /// Row commands received so far, as `"<command> <id>"`.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("commands lock").clone()
    }

    fn record(&self, command: &str, id: &QueryId) {
        self.commands
            .lock()
            .expect("commands lock")
            .push(format!("{command} {id}"));
    }

    pub fn submitted(&self) -> Vec<SubmitForm> {
        self.submitted.lock().expect("submitted lock").clone()
    }
}

#[async_trait]
impl QueryApi for FakeApi {
    async fn fetch_dashboard(&self) -> Result<String, ApiError> {
        Ok(String::new())
    }

    async fn submit(&self, form: &SubmitForm) -> Result<QueryId, ApiError> {
        self.submitted.lock().expect("submitted lock").push(form.clone());
        self.submits
            .lock()
            .expect("submits lock")
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Malformed("unscripted submit".to_string())))
    }

    async fn status(&self, id: &QueryId) -> Result<QuerySnapshot, ApiError> {
        *self
            .status_calls
            .lock()
            .expect("calls lock")
            .entry(id.clone())
            .or_default() += 1;
        self.statuses
            .lock()
            .expect("statuses lock")
            .get_mut(id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(not_found()))
    }

    async fn delete(&self, id: &QueryId) -> Result<(), ApiError> {
        self.record("delete", id);
        self.deletes
            .lock()
            .expect("deletes lock")
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn rerun(&self, id: &QueryId) -> Result<QueryId, ApiError> {
        self.record("rerun", id);
        self.reruns
            .lock()
            .expect("reruns lock")
            .pop_front()
            .unwrap_or_else(|| Err(not_found()))
    }

    async fn save_tags(&self, id: &QueryId, tags: &[String]) -> Result<Vec<String>, ApiError> {
        self.record("tags", id);
        self.tags
            .lock()
            .expect("tags lock")
            .pop_front()
            .unwrap_or_else(|| Ok(normalize_tags(tags)))
    }

    async fn create_template(&self, form: &TemplateForm) -> Result<Template, ApiError> {
        self.templates
            .lock()
            .expect("templates lock")
            .pop_front()
            .unwrap_or_else(|| {
                Ok(Template {
                    id: "1".to_string(),
                    name: form.name.clone(),
                    text: form.text.clone(),
                    classification: None,
                    last_used_at: None,
                })
            })
    }

    async fn delete_template(&self, _template_id: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn health(&self) -> Result<HealthSnapshot, ApiError> {
        *self.health_calls.lock().expect("health calls lock") += 1;
        self.health
            .lock()
            .expect("health lock")
            .pop_front()
            .unwrap_or_else(|| Err(not_found()))
    }

    fn export_url(&self, id: &QueryId) -> String {
        format!("http://backend.test/queries/export/{id}/")
    }
}
