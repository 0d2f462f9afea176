//! Request and response bodies exchanged with the dashboard backend.

use crate::QueryId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const GENERIC_SUBMIT_ERROR: &str = "There was a problem submitting your query.";
pub const GENERIC_TEMPLATE_ERROR: &str = "There was a problem saving the template.";

pub mod paths {
    use crate::QueryId;

    pub const DASHBOARD: &str = "/queries/";
    pub const SUBMIT: &str = "/queries/submit/";
    pub const HEALTH: &str = "/queries/health/";
    pub const TEMPLATE_CREATE: &str = "/queries/templates/create/";

    pub fn status(id: &QueryId) -> String {
        format!("/queries/status/{id}/")
    }

    pub fn delete(id: &QueryId) -> String {
        format!("/queries/delete/{id}/")
    }

    pub fn rerun(id: &QueryId) -> String {
        format!("/queries/rerun/{id}/")
    }

    pub fn tags(id: &QueryId) -> String {
        format!("/queries/tags/{id}/")
    }

    pub fn export(id: &QueryId) -> String {
        format!("/queries/export/{id}/")
    }

    pub fn template_delete(template_id: &str) -> String {
        format!("/queries/templates/{template_id}/delete/")
    }
}

/// `{query_id}` answer of submit and re-run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryIdPayload {
    pub query_id: QueryId,
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagsPayload {
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Per-field validation messages, e.g. `{"text": ["This field is required."]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidationErrors(pub BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|messages| messages.is_empty())
    }

    /// Every message, flattened and space-joined.
    pub fn message(&self) -> String {
        self.0
            .values()
            .flatten()
            .map(|message| message.trim())
            .filter(|message| !message.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Error body some endpoints return alongside a non-2xx status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorsPayload {
    #[serde(default)]
    pub errors: Option<ValidationErrors>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitForm {
    pub text: String,
    pub template_id: Option<String>,
}

impl SubmitForm {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            template_id: None,
        }
    }

    pub fn from_template(text: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            template_id: Some(template_id.into()),
        }
    }

    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("text", self.text.clone())];
        if let Some(template_id) = self.template_id.as_ref() {
            fields.push(("template_id", template_id.clone()));
        }
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateForm {
    pub name: String,
    pub text: String,
}

impl TemplateForm {
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![("name", self.name.clone()), ("text", self.text.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_flattens_all_fields() {
        let payload: ErrorsPayload = serde_json::from_value(serde_json::json!({
            "success": false,
            "errors": {
                "name": ["Name is taken."],
                "text": ["This field is required.", " "]
            }
        }))
        .expect("payload");
        let errors = payload.errors.expect("errors");
        assert_eq!(
            errors.message(),
            "Name is taken. This field is required."
        );
        assert!(!errors.is_empty());
    }

    #[test]
    fn submit_form_includes_template_only_when_present() {
        assert_eq!(SubmitForm::new("q").fields().len(), 1);
        let fields = SubmitForm::from_template("q", "3").fields();
        assert_eq!(fields[1], ("template_id", "3".to_string()));
    }

    #[test]
    fn query_id_payload_accepts_numbers() {
        let payload: QueryIdPayload =
            serde_json::from_str(r#"{"success": true, "query_id": 17, "task_id": "t-1"}"#)
                .expect("payload");
        assert_eq!(payload.query_id, QueryId::new("17"));
        assert_eq!(paths::status(&payload.query_id), "/queries/status/17/");
    }
}
