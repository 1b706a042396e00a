use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;
use uuid::Uuid;

use crate::agent::{GenerationBackend, HistoryEntry};
use crate::models::{GeminiModel, GenerationConfig, OutgoingMessage};

/// Creates sessions bound to one backend and one fixed generation config.
#[derive(Clone)]
pub struct SessionFactory {
    backend: Arc<dyn GenerationBackend>,
    config: GenerationConfig,
}

impl SessionFactory {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: GenerationConfig) -> Self {
        Self { backend, config }
    }

    pub fn create(&self, model: GeminiModel) -> SessionHandle {
        SessionHandle::create(self.backend.clone(), model, self.config.clone())
    }
}

/// A stateful conversation context. Cloning shares the same context; replacing the
/// handle (model switch, new chat) is the only way to start over.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: String,
    model: GeminiModel,
    config: GenerationConfig,
    backend: Arc<dyn GenerationBackend>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl SessionHandle {
    /// Construction is local and cannot fail; remote faults surface on send.
    pub fn create(
        backend: Arc<dyn GenerationBackend>,
        model: GeminiModel,
        config: GenerationConfig,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        info!(session_id = %id, model = %model, "session created");
        Self {
            inner: Arc::new(SessionInner {
                id,
                model,
                config,
                backend,
                history: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn model(&self) -> GeminiModel {
        self.inner.model
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.inner.config
    }

    pub(crate) fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.inner.backend
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock_history().clone()
    }

    /// Records a completed exchange so later sends carry it as context.
    pub(crate) fn commit_exchange(&self, user: OutgoingMessage, reply: String) {
        let mut history = self.lock_history();
        history.push(HistoryEntry::User(user));
        history.push(HistoryEntry::Model(reply));
    }

    fn lock_history(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        // A poisoned lock still holds a consistent Vec: pushes happen in pairs under one guard.
        self.inner.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.inner.id)
            .field("model", &self.inner.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::scripted::ScriptedBackend;

    #[test]
    fn factory_binds_model_and_config() {
        let factory = SessionFactory::new(Arc::new(ScriptedBackend::default()), GenerationConfig::default());
        let a = factory.create(GeminiModel::Flash);
        let b = factory.create(GeminiModel::Pro);

        assert_ne!(a.id(), b.id());
        assert_eq!(b.model(), GeminiModel::Pro);
        assert_eq!(a.config().temperature, 0.7);
        assert!(a.history().is_empty());
    }

    #[test]
    fn clones_share_history() {
        let session = SessionHandle::create(
            Arc::new(ScriptedBackend::default()),
            GeminiModel::Flash,
            GenerationConfig::default(),
        );
        let other = session.clone();
        session.commit_exchange(OutgoingMessage::Text("Hello".into()), "Hi".into());

        assert_eq!(
            other.history(),
            vec![
                HistoryEntry::User(OutgoingMessage::Text("Hello".into())),
                HistoryEntry::Model("Hi".into()),
            ]
        );
    }
}
