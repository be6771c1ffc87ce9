//! Live filtered projections over a [`SearchTable`](crate::aggregator::SearchTable).
//!
//! Listener callbacks never run on the writer path. Each view with a listener
//! owns a bounded queue drained by its own Tokio task; producers enqueue with
//! `try_send` and move on. When the queue is full the event is dropped and a
//! single coalesced `view_changed` is delivered once the queue has drained.

use std::collections::{BTreeMap, HashSet};
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tokio::runtime::Handle;
use tokio::sync::{Notify, mpsc};

use crate::aggregator::{FilterKey, SearchFilter, SearchGroup};
use crate::error::{AppError, Result};
use crate::models::SearchResult;

/// Identifier of a view, unique within its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(pub(crate) u64);

impl ViewId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Receives change notifications for one view.
///
/// Called from the view's dispatch task, one event at a time.
pub trait ViewListener: Send + Sync + 'static {
    /// A batch introduced newly accepted results.
    fn view_added(&self, view: &SearchView, results: &[Arc<SearchResult>]);

    /// An existing group gained a member, or the view was cleared.
    fn view_changed(&self, view: &SearchView);
}

#[derive(Debug)]
enum ViewEvent {
    Added(Vec<Arc<SearchResult>>),
    Changed,
}

struct Dispatcher {
    tx: mpsc::Sender<ViewEvent>,
    overflowed: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl Dispatcher {
    fn send(&self, event: ViewEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.overflowed.store(true, Ordering::Release);
                self.wake.notify_one();
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

pub(crate) struct ViewInner {
    id: ViewId,
    filter: Arc<dyn SearchFilter>,
    groups: RwLock<BTreeMap<FilterKey, SearchGroup>>,
    dispatcher: Mutex<Option<Dispatcher>>,
    queue_capacity: usize,
}

impl ViewInner {
    pub(crate) fn new(id: ViewId, filter: Arc<dyn SearchFilter>, queue_capacity: usize) -> Self {
        Self {
            id,
            filter,
            groups: RwLock::new(BTreeMap::new()),
            dispatcher: Mutex::new(None),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Group every accepted result of `batch` under one write lock and queue
    /// the resulting notifications.
    pub(crate) fn apply(&self, batch: &[Arc<SearchResult>]) {
        let mut accepted = Vec::new();
        let mut changed = false;
        {
            let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
            let mut created: HashSet<FilterKey> = HashSet::new();

            for result in batch {
                if !self.filter.accept(result) {
                    continue;
                }
                let key = self.filter.key(result);
                match groups.entry(key) {
                    Entry::Occupied(mut entry) => {
                        if !created.contains(entry.key()) {
                            changed = true;
                        }
                        entry.get_mut().push(Arc::clone(result));
                    }
                    Entry::Vacant(entry) => {
                        created.insert(entry.key().clone());
                        let mut group = SearchGroup::new(entry.key().clone());
                        group.push(Arc::clone(result));
                        entry.insert(group);
                    }
                }
                accepted.push(Arc::clone(result));
            }
        }

        if !accepted.is_empty() {
            self.notify(ViewEvent::Added(accepted));
        }
        if changed {
            self.notify(ViewEvent::Changed);
        }
    }

    /// Drop every group. Notifies only when something was removed.
    pub(crate) fn reset(&self) {
        let had_groups = {
            let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
            let had_groups = !groups.is_empty();
            groups.clear();
            had_groups
        };
        if had_groups {
            self.notify(ViewEvent::Changed);
        }
    }

    pub(crate) fn detach_listener(&self) {
        let mut dispatcher = self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
        *dispatcher = None;
    }

    pub(crate) fn id(&self) -> ViewId {
        self.id
    }

    fn notify(&self, event: ViewEvent) {
        let dispatcher = self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(dispatcher) = dispatcher.as_ref() {
            dispatcher.send(event);
        }
    }
}

/// A filtered, grouped projection over a table.
///
/// Handles are cheap to clone and all refer to the same view.
#[derive(Clone)]
pub struct SearchView {
    pub(crate) inner: Arc<ViewInner>,
}

impl SearchView {
    pub(crate) fn from_inner(inner: Arc<ViewInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> ViewId {
        self.inner.id
    }

    /// Snapshot of the groups, in ascending key order.
    pub fn results(&self) -> Vec<SearchGroup> {
        let groups = self
            .inner
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        groups.values().cloned().collect()
    }

    /// Snapshot of one group.
    pub fn group(&self, key: &FilterKey) -> Option<SearchGroup> {
        let groups = self
            .inner
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        groups.get(key).cloned()
    }

    pub fn num_groups(&self) -> usize {
        self.inner
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total results across all groups.
    pub fn num_results(&self) -> usize {
        self.inner
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(SearchGroup::len)
            .sum()
    }

    /// Install a listener, replacing any previous one.
    ///
    /// Must be called from within a Tokio runtime; the dispatch task is
    /// spawned on the current one.
    pub fn set_listener<L: ViewListener>(&self, listener: L) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| {
            AppError::contract("SearchView::set_listener requires a Tokio runtime")
        })?;

        let (tx, rx) = mpsc::channel(self.inner.queue_capacity);
        let overflowed = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());

        handle.spawn(dispatch(
            Arc::downgrade(&self.inner),
            Arc::new(listener),
            rx,
            Arc::clone(&overflowed),
            Arc::clone(&wake),
        ));

        let mut dispatcher = self
            .inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *dispatcher = Some(Dispatcher {
            tx,
            overflowed,
            wake,
        });
        log::debug!("{} listener installed", self.id());
        Ok(())
    }

    /// Remove the listener and stop its dispatch task.
    pub fn clear_listener(&self) {
        self.inner.detach_listener();
    }
}

impl fmt::Debug for SearchView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchView")
            .field("id", &self.inner.id)
            .field("groups", &self.num_groups())
            .finish()
    }
}

async fn dispatch(
    view: Weak<ViewInner>,
    listener: Arc<dyn ViewListener>,
    mut rx: mpsc::Receiver<ViewEvent>,
    overflowed: Arc<AtomicBool>,
    wake: Arc<Notify>,
) {
    loop {
        let event = tokio::select! {
            event = rx.recv() => match event {
                Some(event) => Some(event),
                None => break,
            },
            _ = wake.notified() => None,
        };

        let Some(inner) = view.upgrade() else { break };
        let handle = SearchView::from_inner(inner);

        match event {
            Some(ViewEvent::Added(results)) => listener.view_added(&handle, &results),
            Some(ViewEvent::Changed) => listener.view_changed(&handle),
            None => {}
        }

        if rx.is_empty() && overflowed.swap(false, Ordering::AcqRel) {
            listener.view_changed(&handle);
        }
    }
    log::trace!("view dispatch task finished");
}
