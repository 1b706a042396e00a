//! In-memory [`GenerationBackend`] that replays a fixed script and records requests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};

use super::{Fragment, FragmentStream, GenerationBackend, GenerationRequest};
use crate::errors::AppError;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Script {
    /// Yields each fragment then ends cleanly.
    Reply(Vec<Fragment>),
    /// Yields the fragments, then fails mid-stream.
    FailAfter(Vec<Fragment>, String),
    /// Fails before any fragment is produced.
    RejectOpen(String),
    /// Yields the fragments, then never ends.
    Hang(Vec<Fragment>),
}

impl Script {
    pub fn reply(deltas: &[&str]) -> Self {
        Script::Reply(deltas.iter().map(|d| Fragment::new(vec![d.to_string()])).collect())
    }

    pub fn fail_after(deltas: &[&str], message: &str) -> Self {
        Script::FailAfter(
            deltas.iter().map(|d| Fragment::new(vec![d.to_string()])).collect(),
            message.to_string(),
        )
    }
}

#[derive(Clone, Default)]
pub struct ScriptedBackend {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl GenerationBackend for ScriptedBackend {
    fn open_stream(&self, request: GenerationRequest) -> BoxFuture<'static, Result<FragmentStream, AppError>> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Reply(Vec::new()));

        Box::pin(async move {
            let stream: FragmentStream = match script {
                Script::Reply(fragments) => stream::iter(fragments.into_iter().map(Ok)).boxed(),
                Script::FailAfter(fragments, message) => stream::iter(fragments.into_iter().map(Ok))
                    .chain(stream::once(async move { Err(AppError::transport(message)) }))
                    .boxed(),
                Script::RejectOpen(message) => return Err(AppError::transport(message)),
                Script::Hang(fragments) => stream::iter(fragments.into_iter().map(Ok))
                    .chain(stream::pending())
                    .boxed(),
            };
            Ok(stream)
        })
    }
}
