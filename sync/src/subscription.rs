//! Live-query subscriptions.
//!
//! Each subscription owns one standing query: a feed task listens on the
//! store's change notices and re-runs the query on every notice, replacing
//! the emitted record set wholesale. Views observe the state over a watch
//! channel and never poll. Dropping the handle cancels the feed task, so a
//! logical list has at most one active query; scoped subscriptions tear the
//! old query down before opening its replacement.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use taskhub_shared::session::{SessionState, SessionUser};
use taskhub_shared::store::{DocumentStore, FromRecord, Query};

/// List-subscription state as emitted to views.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionState<T> {
    Loading,
    Error(String),
    Data(Vec<T>),
}

/// Handle to a live list query. Dropping it unsubscribes.
pub struct Subscription<T> {
    state: watch::Receiver<SubscriptionState<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T: Clone> Subscription<T> {
    pub fn current(&self) -> SubscriptionState<T> {
        self.state.borrow().clone()
    }
}

impl<T> Subscription<T> {
    /// Watch channel carrying every state replacement.
    pub fn watch(&self) -> watch::Receiver<SubscriptionState<T>> {
        self.state.clone()
    }

    /// Wait for the next state replacement. Returns false once the feed
    /// task has ended.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Open a live query and map every result set into typed records.
pub fn subscribe<T>(store: Arc<dyn DocumentStore>, query: Query) -> Subscription<T>
where
    T: FromRecord + Clone + Send + Sync + 'static,
{
    let (tx, rx) = watch::channel(SubscriptionState::Loading);
    let task = tokio::spawn(async move {
        // Register on the change feed before the initial query so no write
        // lands unobserved in between.
        let mut changes = store.changes(&query.collection);
        run_query::<T>(store.as_ref(), &query, &tx).await;
        loop {
            match changes.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    run_query::<T>(store.as_ref(), &query, &tx).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    Subscription {
        state: rx,
        task: Some(task),
    }
}

/// Live query keyed on a changing scope identifier (project id, session
/// user, ...). On every scope change the current query is torn down before
/// a replacement opens; an absent scope emits empty data without querying.
pub fn subscribe_scoped<T, S, F>(
    store: Arc<dyn DocumentStore>,
    scope: watch::Receiver<Option<S>>,
    make_query: F,
) -> Subscription<T>
where
    T: FromRecord + Clone + Send + Sync + 'static,
    S: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&S) -> Query + Send + 'static,
{
    let (tx, rx) = watch::channel(SubscriptionState::Loading);
    let task = tokio::spawn(async move {
        let mut scope = scope;
        loop {
            let current = scope.borrow_and_update().clone();
            match current {
                None => {
                    tx.send_replace(SubscriptionState::Data(Vec::new()));
                    if scope.changed().await.is_err() {
                        break;
                    }
                }
                Some(value) => {
                    let query = make_query(&value);
                    let mut changes = store.changes(&query.collection);
                    run_query::<T>(store.as_ref(), &query, &tx).await;
                    loop {
                        tokio::select! {
                            changed = scope.changed() => {
                                if changed.is_err() {
                                    return;
                                }
                                // Dropping `changes` below closes the old
                                // feed before the outer loop reopens.
                                break;
                            }
                            notice = changes.recv() => {
                                match notice {
                                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                                        run_query::<T>(store.as_ref(), &query, &tx).await;
                                    }
                                    Err(broadcast::error::RecvError::Closed) => return,
                                }
                            }
                        }
                    }
                }
            }
        }
    });
    Subscription {
        state: rx,
        task: Some(task),
    }
}

async fn run_query<T: FromRecord>(
    store: &dyn DocumentStore,
    query: &Query,
    tx: &watch::Sender<SubscriptionState<T>>,
) {
    match store.query(query).await {
        Ok(records) => {
            let mapped = records.iter().map(T::from_record).collect();
            tx.send_replace(SubscriptionState::Data(mapped));
        }
        Err(e) => {
            tracing::warn!(collection = %query.collection, error = %e, "live query failed");
            tx.send_replace(SubscriptionState::Error(e.to_string()));
        }
    }
}

/// Single-record subscription state (detail views).
#[derive(Debug, Clone, PartialEq)]
pub enum RecordState<T> {
    Loading,
    NotFound,
    Error(String),
    Data(T),
}

/// Handle to a live point read. Dropping it unsubscribes.
pub struct RecordSubscription<T> {
    state: watch::Receiver<RecordState<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T: Clone> RecordSubscription<T> {
    pub fn current(&self) -> RecordState<T> {
        self.state.borrow().clone()
    }
}

impl<T> RecordSubscription<T> {
    pub fn watch(&self) -> watch::Receiver<RecordState<T>> {
        self.state.clone()
    }

    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }
}

impl<T> Drop for RecordSubscription<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Follow one record by id, e.g. the project detail view.
pub fn subscribe_record<T>(
    store: Arc<dyn DocumentStore>,
    collection: String,
    id: String,
) -> RecordSubscription<T>
where
    T: FromRecord + Clone + Send + Sync + 'static,
{
    let (tx, rx) = watch::channel(RecordState::Loading);
    let task = tokio::spawn(async move {
        let mut changes = store.changes(&collection);
        run_get::<T>(store.as_ref(), &collection, &id, &tx).await;
        loop {
            match changes.recv().await {
                Ok(notice) => {
                    if notice.id == id {
                        run_get::<T>(store.as_ref(), &collection, &id, &tx).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    run_get::<T>(store.as_ref(), &collection, &id, &tx).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    RecordSubscription {
        state: rx,
        task: Some(task),
    }
}

async fn run_get<T: FromRecord>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    tx: &watch::Sender<RecordState<T>>,
) {
    match store.get(collection, id).await {
        Ok(Some(record)) => {
            tx.send_replace(RecordState::Data(T::from_record(&record)));
        }
        Ok(None) => {
            tx.send_replace(RecordState::NotFound);
        }
        Err(e) => {
            tx.send_replace(RecordState::Error(e.to_string()));
        }
    }
}

/// Adapt the session channel into a subscription scope: signed-out and
/// still-initializing sessions both mean "no scope".
pub fn session_scope(
    mut session: watch::Receiver<SessionState>,
) -> watch::Receiver<Option<SessionUser>> {
    let (tx, rx) = watch::channel(session.borrow().user().cloned());
    tokio::spawn(async move {
        while session.changed().await.is_ok() {
            let user = session.borrow_and_update().user().cloned();
            tx.send_replace(user);
        }
    });
    rx
}
