//! In-process [`ExtractionStore`] with a fixed, scripted response.
//!
//! Every connection it hands out answers the same way, and every connect,
//! execution and release is counted so tests can assert on the connection
//! lifecycle. Releases are counted when a connection is dropped, which
//! covers graceful closes and cancelled callers alike.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{ExtractionParams, ExtractionStore, RawExtraction, StoreConnection, StoreError};

/// What a scripted connection does when the procedure is executed.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Return the given raw output.
    Respond(RawExtraction),
    /// Fail as if the procedure raised error `code`.
    Raise { code: i32, message: String },
    /// Fail with an uninterpretable response.
    Garble(String),
    /// Never complete.
    Hang,
}

#[derive(Debug, Default)]
struct CallStats {
    connects: AtomicUsize,
    executions: AtomicUsize,
    releases: AtomicUsize,
    last_params: Mutex<Option<ExtractionParams>>,
}

/// Scripted store for tests.
#[derive(Debug)]
pub struct ScriptedStore {
    outcome: ScriptedOutcome,
    connect_error: Option<StoreError>,
    stats: Arc<CallStats>,
}

impl ScriptedStore {
    pub fn new(outcome: ScriptedOutcome) -> Self {
        Self {
            outcome,
            connect_error: None,
            stats: Arc::new(CallStats::default()),
        }
    }

    pub fn responding(raw: RawExtraction) -> Self {
        Self::new(ScriptedOutcome::Respond(raw))
    }

    pub fn raising(code: i32, message: impl Into<String>) -> Self {
        Self::new(ScriptedOutcome::Raise {
            code,
            message: message.into(),
        })
    }

    pub fn garbling(detail: impl Into<String>) -> Self {
        Self::new(ScriptedOutcome::Garble(detail.into()))
    }

    pub fn hanging() -> Self {
        Self::new(ScriptedOutcome::Hang)
    }

    /// A store whose connections can never be opened.
    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self {
            connect_error: Some(StoreError::Connection(detail.into())),
            ..Self::new(ScriptedOutcome::Hang)
        }
    }

    /// A store that refuses the session with error `code`, as a failed
    /// login does.
    pub fn refusing(code: i32, message: impl Into<String>) -> Self {
        Self {
            connect_error: Some(StoreError::Database {
                code,
                message: message.into(),
            }),
            ..Self::new(ScriptedOutcome::Hang)
        }
    }

    /// Successful connection attempts.
    pub fn connects(&self) -> usize {
        self.stats.connects.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.stats.executions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.stats.releases.load(Ordering::SeqCst)
    }

    /// Parameters bound by the most recent execution.
    pub fn last_params(&self) -> Option<ExtractionParams> {
        self.stats
            .last_params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ExtractionStore for ScriptedStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        if let Some(err) = &self.connect_error {
            return Err(err.clone());
        }
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            outcome: self.outcome.clone(),
            stats: self.stats.clone(),
        }))
    }
}

struct ScriptedConnection {
    outcome: ScriptedOutcome,
    stats: Arc<CallStats>,
}

#[async_trait]
impl StoreConnection for ScriptedConnection {
    async fn execute_extraction(
        &mut self,
        params: &ExtractionParams,
    ) -> Result<RawExtraction, StoreError> {
        self.stats.executions.fetch_add(1, Ordering::SeqCst);
        *self
            .stats
            .last_params
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(params.clone());

        match &self.outcome {
            ScriptedOutcome::Respond(raw) => Ok(raw.clone()),
            ScriptedOutcome::Raise { code, message } => Err(StoreError::Database {
                code: *code,
                message: message.clone(),
            }),
            ScriptedOutcome::Garble(detail) => Err(StoreError::Protocol(detail.clone())),
            ScriptedOutcome::Hang => futures::future::pending().await,
        }
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}
