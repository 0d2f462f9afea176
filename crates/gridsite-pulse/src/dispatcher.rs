use crate::session::SessionEvent;
use gridsite_client::{ApiError, QueryApi};
use gridsite_core::contracts::{SubmitForm, TemplateForm};
use gridsite_core::{QueryId, Template};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Result of one backend command, delivered back to the session loop.
#[derive(Debug)]
pub enum CommandOutcome {
    Submitted {
        provisional: u64,
        form: SubmitForm,
        result: Result<QueryId, ApiError>,
    },
    Deleted {
        id: QueryId,
        result: Result<(), ApiError>,
    },
    Rerun {
        source: QueryId,
        result: Result<QueryId, ApiError>,
    },
    TagsSaved {
        id: QueryId,
        result: Result<Vec<String>, ApiError>,
    },
    TemplateCreated {
        result: Result<Template, ApiError>,
    },
    TemplateDeleted {
        template_id: String,
        result: Result<(), ApiError>,
    },
}

/// Fires one request per command. Never retries and never touches the store;
/// the session applies each [`CommandOutcome`] when it arrives.
pub struct CommandDispatcher {
    api: Arc<dyn QueryApi>,
    events: mpsc::Sender<SessionEvent>,
}

impl CommandDispatcher {
    pub fn new(api: Arc<dyn QueryApi>, events: mpsc::Sender<SessionEvent>) -> Self {
        Self { api, events }
    }

    pub fn submit(&self, provisional: u64, form: SubmitForm) {
        let api = Arc::clone(&self.api);
        self.spawn("submit", async move {
            let result = api.submit(&form).await;
            CommandOutcome::Submitted {
                provisional,
                form,
                result,
            }
        });
    }

    pub fn delete(&self, id: QueryId) {
        let api = Arc::clone(&self.api);
        self.spawn("delete", async move {
            let result = api.delete(&id).await;
            CommandOutcome::Deleted { id, result }
        });
    }

    pub fn rerun(&self, source: QueryId) {
        let api = Arc::clone(&self.api);
        self.spawn("rerun", async move {
            let result = api.rerun(&source).await;
            CommandOutcome::Rerun { source, result }
        });
    }

    pub fn save_tags(&self, id: QueryId, tags: Vec<String>) {
        let api = Arc::clone(&self.api);
        self.spawn("save_tags", async move {
            let result = api.save_tags(&id, &tags).await;
            CommandOutcome::TagsSaved { id, result }
        });
    }

    pub fn create_template(&self, form: TemplateForm) {
        let api = Arc::clone(&self.api);
        self.spawn("create_template", async move {
            let result = api.create_template(&form).await;
            CommandOutcome::TemplateCreated { result }
        });
    }

    pub fn delete_template(&self, template_id: String) {
        let api = Arc::clone(&self.api);
        self.spawn("delete_template", async move {
            let result = api.delete_template(&template_id).await;
            CommandOutcome::TemplateDeleted {
                template_id,
                result,
            }
        });
    }

    pub fn export_url(&self, id: &QueryId) -> String {
        self.api.export_url(id)
    }

    fn spawn<F>(&self, command: &'static str, request: F)
    where
        F: Future<Output = CommandOutcome> + Send + 'static,
    {
        let events = self.events.clone();
        debug!(event = "command_dispatch", command);
        tokio::spawn(async move {
            let outcome = request.await;
            if events.send(SessionEvent::Command(outcome)).await.is_err() {
                warn!(event = "command_outcome_dropped", command);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;

    async fn next_outcome(rx: &mut mpsc::Receiver<SessionEvent>) -> CommandOutcome {
        match rx.recv().await {
            Some(SessionEvent::Command(outcome)) => outcome,
            other => panic!("expected command outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_reports_the_issued_id_with_its_provisional_key() {
        let api = Arc::new(FakeApi::default());
        api.script_submit(Ok(QueryId::new("17")));
        let (tx, mut rx) = mpsc::channel(4);
        let dispatcher = CommandDispatcher::new(api.clone(), tx);

        dispatcher.submit(3, SubmitForm::from_template("find trials", "9"));
        match next_outcome(&mut rx).await {
            CommandOutcome::Submitted {
                provisional,
                result,
                ..
            } => {
                assert_eq!(provisional, 3);
                assert_eq!(result.expect("id"), QueryId::new("17"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(api.submitted()[0].template_id.as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn failures_come_back_as_outcomes() {
        let api = Arc::new(FakeApi::default());
        api.script_delete(Err(ApiError::Status {
            status: 500,
            message: None,
        }));
        let (tx, mut rx) = mpsc::channel(4);
        let dispatcher = CommandDispatcher::new(api, tx);

        dispatcher.delete(QueryId::new("4"));
        match next_outcome(&mut rx).await {
            CommandOutcome::Deleted { id, result } => {
                assert_eq!(id, QueryId::new("4"));
                assert!(result.is_err());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn export_url_is_built_without_a_request() {
        let api = Arc::new(FakeApi::default());
        let (tx, _rx) = mpsc::channel(1);
        let dispatcher = CommandDispatcher::new(api, tx);
        assert_eq!(
            dispatcher.export_url(&QueryId::new("12")),
            "http://backend.test/queries/export/12/"
        );
    }
}
