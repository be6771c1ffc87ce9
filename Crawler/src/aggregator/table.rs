use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::aggregator::view::{SearchView, ViewId, ViewInner};
use crate::aggregator::SearchFilter;
use crate::error::{AppError, Result};
use crate::models::{AggregatorConfig, SearchResult};

#[derive(Default)]
struct TableState {
    results: Vec<Arc<SearchResult>>,
    views: Vec<Arc<ViewInner>>,
    next_view_id: u64,
}

struct TableInner {
    state: Mutex<TableState>,
    queue_capacity: usize,
}

/// Root collection of every result since the last [`clear`](Self::clear).
///
/// Writers are serialized by one lock; each registered view is updated under
/// that lock, so a batch reaches every view in the same order it reached the
/// table. Cloning yields another handle to the same table.
#[derive(Clone)]
pub struct SearchTable {
    inner: Arc<TableInner>,
}

impl SearchTable {
    pub fn new() -> Self {
        Self::with_config(&AggregatorConfig::default())
    }

    pub fn with_config(config: &AggregatorConfig) -> Self {
        Self {
            inner: Arc::new(TableInner {
                state: Mutex::new(TableState::default()),
                queue_capacity: config.listener_queue_capacity,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TableState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, result: SearchResult) {
        self.add_batch(&[Arc::new(result)]);
    }

    /// Append a batch and fan it out to every registered view.
    pub fn add_batch(&self, batch: &[Arc<SearchResult>]) {
        if batch.is_empty() {
            return;
        }
        let mut state = self.state();
        state.results.extend(batch.iter().cloned());
        for view in &state.views {
            view.apply(batch);
        }
    }

    /// Register a view, seeded with every stored result the filter accepts.
    pub fn view<F>(&self, filter: F) -> SearchView
    where
        F: SearchFilter + 'static,
    {
        self.view_shared(Arc::new(filter))
    }

    /// Like [`view`](Self::view), for a filter shared between views.
    pub fn view_shared(&self, filter: Arc<dyn SearchFilter>) -> SearchView {
        let mut state = self.state();
        let id = ViewId(state.next_view_id);
        state.next_view_id += 1;

        let inner = Arc::new(ViewInner::new(id, filter, self.inner.queue_capacity));
        inner.apply(&state.results);
        state.views.push(Arc::clone(&inner));

        log::debug!("{id} registered, seeded from {} result(s)", state.results.len());
        SearchView::from_inner(inner)
    }

    /// Unregister a view and stop its listener.
    pub fn unbind(&self, view: &SearchView) -> Result<()> {
        let mut state = self.state();
        let position = state
            .views
            .iter()
            .position(|v| Arc::ptr_eq(v, &view.inner))
            .ok_or(AppError::ViewNotRegistered(view.id().get()))?;
        let removed = state.views.remove(position);
        drop(state);

        removed.detach_listener();
        log::debug!("{} unbound", removed.id());
        Ok(())
    }

    /// Empty the table and every view. Views stay registered.
    pub fn clear(&self) {
        let mut state = self.state();
        state.results.clear();
        for view in &state.views {
            view.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.state().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().results.is_empty()
    }

    /// Snapshot of every stored result in arrival order.
    pub fn results(&self) -> Vec<Arc<SearchResult>> {
        self.state().results.clone()
    }

    pub fn num_views(&self) -> usize {
        self.state().views.len()
    }
}

impl Default for SearchTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{AcceptAll, FilterKey, Grouping, SourceFilter, ViewListener};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn result(source: &str, name: &str, n: usize) -> SearchResult {
        SearchResult::new(source, name, format!("https://{source}/item/{n}"), format!("dl/{n}"))
    }

    #[test]
    fn test_two_views_scenario() {
        let table = SearchTable::new();
        let a = table.view(SourceFilter::new(["X"], Grouping::Name).unwrap());
        let b = table.view(SourceFilter::new(["Y"], Grouping::Name).unwrap());

        table.add(result("X", "foo", 1));
        table.add(result("Y", "foo", 2));
        table.add(result("X", "foo", 3));

        let groups_a = a.results();
        assert_eq!(groups_a.len(), 1);
        assert_eq!(groups_a[0].len(), 2);
        assert_eq!(groups_a[0].key().as_str(), "foo");

        let groups_b = b.results();
        assert_eq!(groups_b.len(), 1);
        assert_eq!(groups_b[0].len(), 1);

        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_late_view_is_seeded() {
        let table = SearchTable::new();
        for n in 0..10 {
            table.add(result(if n % 2 == 0 { "X" } else { "Y" }, "foo", n));
        }

        let view = table.view(SourceFilter::new(["X"], Grouping::Uid).unwrap());
        assert_eq!(view.num_groups(), 5);
        assert_eq!(view.num_results(), 5);
    }

    #[test]
    fn test_groups_keep_arrival_order_and_key_order() {
        let table = SearchTable::new();
        let view = table.view(AcceptAll::grouped_by(Grouping::Name));

        table.add(result("X", "zeta", 1));
        table.add(result("X", "alpha", 2));
        table.add(result("Y", "zeta", 3));

        let groups = view.results();
        let keys: Vec<&str> = groups.iter().map(|g| g.key().as_str()).collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);

        let zeta = view.group(&FilterKey::new("zeta")).unwrap();
        let order: Vec<&str> = zeta.results().iter().map(|r| r.source.as_str()).collect();
        assert_eq!(order, vec!["X", "Y"]);
    }

    #[test]
    fn test_clear_then_fresh_groups() {
        let table = SearchTable::new();
        let view = table.view(AcceptAll::grouped_by(Grouping::Name));
        table.add(result("X", "foo", 1));
        table.add(result("X", "bar", 2));

        table.clear();
        assert!(table.is_empty());
        assert_eq!(view.num_groups(), 0);
        assert_eq!(table.num_views(), 1);

        table.add(result("X", "foo", 3));
        let groups = view.results();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 1);
    }

    #[test]
    fn test_unbind() {
        let table = SearchTable::new();
        let other = SearchTable::new();
        let view = table.view(AcceptAll::new());

        assert!(matches!(
            other.unbind(&view),
            Err(AppError::ViewNotRegistered(_))
        ));

        table.unbind(&view).unwrap();
        table.add(result("X", "foo", 1));
        assert_eq!(view.num_results(), 0);
        assert!(matches!(
            table.unbind(&view),
            Err(AppError::ViewNotRegistered(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers() {
        let table = SearchTable::new();
        let x_view = table.view(SourceFilter::new(["X"], Grouping::Uid).unwrap());
        let all_view = table.view(AcceptAll::grouped_by(Grouping::Source));
        let none_view = table.view(SourceFilter::new(["Z"], Grouping::Uid).unwrap());

        let writers: Vec<_> = (0..8)
            .map(|w| {
                let table = table.clone();
                tokio::spawn(async move {
                    for n in 0..50 {
                        let source = if n % 2 == 0 { "X" } else { "Y" };
                        table.add(result(source, "foo", w * 1000 + n));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(table.len(), 400);
        assert_eq!(x_view.num_groups(), 200);
        assert_eq!(x_view.num_results(), 200);
        assert_eq!(all_view.num_groups(), 2);
        assert_eq!(all_view.num_results(), 400);
        assert_eq!(none_view.num_results(), 0);
    }

    #[derive(Debug, PartialEq)]
    enum Seen {
        Added(usize),
        Changed,
    }

    struct ChannelListener(mpsc::UnboundedSender<Seen>);

    impl ViewListener for ChannelListener {
        fn view_added(&self, _view: &SearchView, results: &[Arc<SearchResult>]) {
            let _ = self.0.send(Seen::Added(results.len()));
        }

        fn view_changed(&self, _view: &SearchView) {
            let _ = self.0.send(Seen::Changed);
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_listener_events() {
        let table = SearchTable::new();
        let view = table.view(AcceptAll::grouped_by(Grouping::Name));
        let (tx, mut rx) = mpsc::unbounded_channel();
        view.set_listener(ChannelListener(tx)).unwrap();

        // New groups only.
        table.add_batch(&[
            Arc::new(result("X", "foo", 1)),
            Arc::new(result("X", "foo", 2)),
            Arc::new(result("X", "bar", 3)),
        ]);
        assert_eq!(next(&mut rx).await, Seen::Added(3));

        // Existing group gains a member.
        table.add(result("Y", "foo", 4));
        assert_eq!(next(&mut rx).await, Seen::Added(1));
        assert_eq!(next(&mut rx).await, Seen::Changed);

        table.clear();
        assert_eq!(next(&mut rx).await, Seen::Changed);

        // Clearing an empty view is silent; the next add is the next event.
        table.clear();
        table.add(result("X", "baz", 5));
        assert_eq!(next(&mut rx).await, Seen::Added(1));

        view.clear_listener();
        table.add(result("X", "baz", 6));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_batch_is_silent() {
        let table = SearchTable::new();
        let view = table.view(SourceFilter::new(["X"], Grouping::Name).unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();
        view.set_listener(ChannelListener(tx)).unwrap();

        table.add(result("Y", "foo", 1));
        table.add(result("X", "foo", 2));
        assert_eq!(next(&mut rx).await, Seen::Added(1));
    }

    struct SlowListener {
        tx: mpsc::UnboundedSender<Seen>,
        gate: Arc<tokio::sync::Semaphore>,
    }

    impl ViewListener for SlowListener {
        fn view_added(&self, _view: &SearchView, results: &[Arc<SearchResult>]) {
            while self.gate.try_acquire().is_err() {
                std::thread::sleep(Duration::from_millis(1));
            }
            let _ = self.tx.send(Seen::Added(results.len()));
        }

        fn view_changed(&self, _view: &SearchView) {
            let _ = self.tx.send(Seen::Changed);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overflow_coalesces_into_changed() {
        let table = SearchTable::with_config(&AggregatorConfig {
            listener_queue_capacity: 2,
        });
        let view = table.view(AcceptAll::grouped_by(Grouping::Uid));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        view.set_listener(SlowListener {
            tx,
            gate: Arc::clone(&gate),
        })
        .unwrap();

        // Producers never block, even though the listener is stalled.
        for n in 0..20 {
            table.add(result("X", "foo", n));
        }
        assert_eq!(view.num_results(), 20);

        gate.add_permits(100);
        let mut added = 0;
        loop {
            match next(&mut rx).await {
                Seen::Added(n) => added += n,
                Seen::Changed => break,
            }
        }
        assert!(added < 20);
    }
}
