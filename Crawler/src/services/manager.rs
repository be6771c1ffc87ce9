// src/services/manager.rs

//! Bounded pool of query sessions, grouped by search token.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::aggregator::SearchTable;
use crate::error::{AppError, Result};
use crate::models::SearchResult;
use crate::services::performer::{QueryPerformer, SearchToken, SessionOutcome};

/// Observer for the sessions of every token.
pub trait SearchListener: Send + Sync {
    /// A session of `token` produced a batch. Called after the batch reached
    /// the table.
    fn on_results(&self, token: SearchToken, results: &[Arc<SearchResult>]);

    /// Every session started for `token` has finished.
    fn on_stopped(&self, token: SearchToken);

    /// A results page of `source` could not be fetched or parsed.
    fn on_error(&self, _token: SearchToken, _source: &str, _error: &AppError) {}
}

#[derive(Default)]
struct TokenSessions {
    performers: Vec<QueryPerformer>,
    handles: Vec<JoinHandle<SessionOutcome>>,
    running: usize,
}

struct ManagerInner {
    table: SearchTable,
    permits: Arc<Semaphore>,
    listener: Option<Arc<dyn SearchListener>>,
    sessions: Mutex<HashMap<SearchToken, TokenSessions>>,
    next_token: AtomicU64,
}

impl ManagerInner {
    fn sessions(&self) -> MutexGuard<'_, HashMap<SearchToken, TokenSessions>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_finished(&self, token: SearchToken) {
        let all_done = {
            let mut sessions = self.sessions();
            let Some(entry) = sessions.get_mut(&token) else {
                return;
            };
            entry.running = entry.running.saturating_sub(1);
            let all_done = entry.running == 0;
            if all_done {
                entry.performers.clear();
            }
            // Handles still present are collected by `wait`.
            if all_done && entry.handles.is_empty() {
                sessions.remove(&token);
            }
            all_done
        };

        if all_done {
            log::debug!("All sessions of token {token} finished");
            if let Some(listener) = &self.listener {
                listener.on_stopped(token);
            }
        }
    }
}

/// Runs query sessions on a fixed number of slots and feeds their results
/// into one [`SearchTable`].
#[derive(Clone)]
pub struct SearchManager {
    inner: Arc<ManagerInner>,
}

impl SearchManager {
    pub fn new(table: SearchTable, max_concurrent: usize) -> Self {
        Self::build(table, max_concurrent, None)
    }

    pub fn with_listener(
        table: SearchTable,
        max_concurrent: usize,
        listener: Arc<dyn SearchListener>,
    ) -> Self {
        Self::build(table, max_concurrent, Some(listener))
    }

    fn build(
        table: SearchTable,
        max_concurrent: usize,
        listener: Option<Arc<dyn SearchListener>>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                table,
                permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
                listener,
                sessions: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    pub fn table(&self) -> &SearchTable {
        &self.inner.table
    }

    /// A token no earlier search of this manager has used.
    pub fn next_token(&self) -> SearchToken {
        self.inner.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue a session. It starts once a slot is free.
    ///
    /// Outcomes are kept until [`SearchManager::wait`] collects them.
    pub fn perform(&self, performer: QueryPerformer) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| {
            AppError::contract("SearchManager::perform requires a Tokio runtime")
        })?;
        if performer.is_started() {
            return Err(AppError::contract(format!(
                "session for '{}' was already started",
                performer.source_name()
            )));
        }

        let token = performer.token();
        let table = self.inner.table.clone();
        let listener = self.inner.listener.clone();
        performer.on_results(move |batch| {
            table.add_batch(&batch);
            if let Some(listener) = &listener {
                listener.on_results(token, &batch);
            }
        });
        if let Some(listener) = self.inner.listener.clone() {
            let source = performer.source_name().to_string();
            performer.on_error(move |error| listener.on_error(token, &source, error));
        }

        let mut sessions = self.inner.sessions();
        let entry = sessions.entry(token).or_default();
        entry.performers.push(performer.clone());
        entry.running += 1;

        let inner = Arc::clone(&self.inner);
        let permits = Arc::clone(&self.inner.permits);
        entry.handles.push(handle.spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => performer.run().await,
                Err(_) => Err(AppError::contract("session pool is closed")),
            };
            inner.session_finished(token);
            outcome.unwrap_or_else(|e| {
                log::warn!("[{}] session did not run: {e}", performer.source_name());
                SessionOutcome {
                    token,
                    source: performer.source_name().to_string(),
                    ..SessionOutcome::default()
                }
            })
        }));
        Ok(())
    }

    /// Stop every running session of `token`.
    pub fn stop(&self, token: SearchToken) {
        let sessions = self.inner.sessions();
        if let Some(entry) = sessions.get(&token) {
            log::info!(
                "Stopping {} session(s) of token {token}",
                entry.performers.len()
            );
            for performer in &entry.performers {
                performer.stop();
            }
        }
    }

    pub fn stop_all(&self) {
        let sessions = self.inner.sessions();
        for performer in sessions.values().flat_map(|entry| &entry.performers) {
            performer.stop();
        }
    }

    /// Whether any session of `token` is still queued or running.
    pub fn is_active(&self, token: SearchToken) -> bool {
        self.inner
            .sessions()
            .get(&token)
            .is_some_and(|entry| entry.running > 0)
    }

    /// Wait for every session of `token` queued so far.
    pub async fn wait(&self, token: SearchToken) -> Vec<SessionOutcome> {
        let handles = {
            let mut sessions = self.inner.sessions();
            let handles = sessions
                .get_mut(&token)
                .map(|entry| std::mem::take(&mut entry.handles))
                .unwrap_or_default();
            if sessions.get(&token).is_some_and(|entry| entry.running == 0) {
                sessions.remove(&token);
            }
            handles
        };

        let outcomes = join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    log::warn!("Session task of token {token} failed: {e}");
                    None
                }
            })
            .collect();

        let mut sessions = self.inner.sessions();
        if sessions
            .get(&token)
            .is_some_and(|entry| entry.running == 0 && entry.handles.is_empty())
        {
            sessions.remove(&token);
        }
        outcomes
    }
}
