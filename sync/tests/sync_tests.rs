//! End-to-end behavior of the subscription, gateway, and upload layers over
//! the in-memory backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::timeout;

use taskhub_atoms::documents::service::project_documents_query;
use taskhub_atoms::documents::{self, Document};
use taskhub_atoms::expenses::model::{CreateExpensePayload, Expense};
use taskhub_atoms::expenses::service::{create_expense, delete_expense, project_expenses_query};
use taskhub_atoms::projects::model::{CreateProjectPayload, Project};
use taskhub_atoms::projects::service::{create_project, user_projects_query};
use taskhub_atoms::tasks::model::{CreateTaskPayload, Task};
use taskhub_atoms::tasks::service::{create_task, project_tasks_query};
use taskhub_shared::blob::memory::MemoryBlobStore;
use taskhub_shared::error::DataError;
use taskhub_shared::session::{IdentityProvider, SessionManager, SessionUser};
use taskhub_shared::store::memory::MemoryStore;
use taskhub_shared::store::{ChangeEvent, DocumentStore, Fields, Query, Record};
use taskhub_sync::flows::{add_expense, upload_document, FileUpload};
use taskhub_sync::subscription::{
    session_scope, subscribe, subscribe_record, subscribe_scoped, RecordState, Subscription,
    SubscriptionState,
};

fn session(id: &str) -> SessionUser {
    SessionUser {
        user_id: id.to_string(),
        email: format!("{}@example.com", id),
    }
}

fn task_payload(title: &str) -> CreateTaskPayload {
    CreateTaskPayload {
        title: title.to_string(),
        description: None,
        status: None,
        due_date: None,
    }
}

fn expense_payload(description: &str) -> CreateExpensePayload {
    CreateExpensePayload {
        date: chrono::Utc::now(),
        amount: 10.0,
        description: description.to_string(),
        receipt: None,
    }
}

/// Wait until the subscription state satisfies the predicate.
async fn wait_for<T, F>(sub: &mut Subscription<T>, pred: F) -> SubscriptionState<T>
where
    T: Clone,
    F: Fn(&SubscriptionState<T>) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            let state = sub.current();
            if pred(&state) {
                return state;
            }
            assert!(sub.changed().await, "subscription feed ended early");
        }
    })
    .await
    .expect("timed out waiting for subscription state")
}

fn data<T: Clone>(state: &SubscriptionState<T>) -> Vec<T> {
    match state {
        SubscriptionState::Data(records) => records.clone(),
        other => panic!(
            "expected data, got {}",
            match other {
                SubscriptionState::Loading => "loading",
                SubscriptionState::Error(_) => "error",
                SubscriptionState::Data(_) => unreachable!(),
            }
        ),
    }
}

/// Store wrapper that records deletes into a shared op log and counts
/// queries, for ordering and no-query assertions.
struct RecordingStore {
    inner: MemoryStore,
    ops: Arc<Mutex<Vec<String>>>,
    queries: AtomicUsize,
}

impl RecordingStore {
    fn new(ops: Arc<Mutex<Vec<String>>>) -> Self {
        RecordingStore {
            inner: MemoryStore::new(),
            ops,
            queries: AtomicUsize::new(0),
        }
    }

    fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DocumentStore for RecordingStore {
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, DataError> {
        self.inner.create(collection, fields).await
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), DataError> {
        self.inner.update(collection, id, patch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DataError> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("record.delete {}/{}", collection, id));
        self.inner.delete(collection, id).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Record>, DataError> {
        self.inner.get(collection, id).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Record>, DataError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(query).await
    }

    fn changes(&self, collection: &str) -> broadcast::Receiver<ChangeEvent> {
        self.inner.changes(collection)
    }
}

struct StaticIdentity;

#[async_trait::async_trait]
impl IdentityProvider for StaticIdentity {
    async fn sign_in(&self, email: &str, _password: &str) -> Result<SessionUser, DataError> {
        Ok(SessionUser {
            user_id: format!("uid-{}", email),
            email: email.to_string(),
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SessionUser, DataError> {
        self.sign_in(email, password).await
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<SessionUser, DataError> {
        self.sign_in(token, "").await
    }

    async fn sign_out(&self) -> Result<(), DataError> {
        Ok(())
    }
}

#[tokio::test]
async fn sequential_task_creates_arrive_in_creation_order() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let mut sub = subscribe::<Task>(store.clone(), project_tasks_query("p1"));

    for title in ["first", "second", "third"] {
        create_task(store.as_ref(), "p1", task_payload(title))
            .await
            .unwrap();
    }

    let state = wait_for(&mut sub, |s| matches!(s, SubscriptionState::Data(t) if t.len() == 3)).await;
    let titles: Vec<String> = data(&state).into_iter().map(|t| t.title).collect();
    assert_eq!(titles, ["first", "second", "third"]);
}

#[tokio::test]
async fn resubscribing_after_unsubscribe_is_idempotent() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    create_task(store.as_ref(), "p1", task_payload("a")).await.unwrap();
    create_task(store.as_ref(), "p1", task_payload("b")).await.unwrap();

    let mut first = subscribe::<Task>(store.clone(), project_tasks_query("p1"));
    let before = data(&wait_for(&mut first, |s| matches!(s, SubscriptionState::Data(t) if t.len() == 2)).await);
    drop(first);

    let mut second = subscribe::<Task>(store.clone(), project_tasks_query("p1"));
    let after = data(&wait_for(&mut second, |s| matches!(s, SubscriptionState::Data(t) if t.len() == 2)).await);

    let ids = |tasks: &[Task]| tasks.iter().map(|t| t.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&before), ids(&after));
}

#[tokio::test]
async fn dropping_the_handle_tears_the_feed_down() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let mut sub = subscribe::<Task>(store.clone(), project_tasks_query("p1"));
    wait_for(&mut sub, |s| matches!(s, SubscriptionState::Data(_))).await;

    let mut rx = sub.watch();
    drop(sub);

    // The feed task is cancelled, so the channel closes.
    let closed = timeout(Duration::from_secs(2), async {
        while rx.changed().await.is_ok() {}
    })
    .await;
    assert!(closed.is_ok(), "feed kept running after drop");
}

#[tokio::test]
async fn scope_changes_swap_the_query_and_absent_scope_emits_empty() {
    let ops = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(RecordingStore::new(ops));
    create_task(store.as_ref(), "p1", task_payload("in p1")).await.unwrap();
    create_task(store.as_ref(), "p2", task_payload("in p2")).await.unwrap();

    let (scope_tx, scope_rx) = watch::channel(Some("p1".to_string()));
    let store_dyn: Arc<dyn DocumentStore> = store.clone();
    let mut sub = subscribe_scoped::<Task, String, _>(store_dyn, scope_rx, |project_id| {
        project_tasks_query(project_id)
    });

    let state = wait_for(&mut sub, |s| matches!(s, SubscriptionState::Data(t) if t.len() == 1)).await;
    assert_eq!(data(&state)[0].title, "in p1");

    scope_tx.send_replace(Some("p2".to_string()));
    let state = wait_for(&mut sub, |s| {
        matches!(s, SubscriptionState::Data(t) if t.len() == 1 && t[0].title == "in p2")
    })
    .await;
    assert_eq!(data(&state)[0].project_id, "p2");

    // Without a scope the manager reports empty data and issues no query.
    scope_tx.send_replace(None);
    wait_for(&mut sub, |s| matches!(s, SubscriptionState::Data(t) if t.is_empty())).await;
    let queries_when_unscoped = store.query_count();

    create_task(store.as_ref(), "p1", task_payload("later")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.query_count(), queries_when_unscoped);
}

#[tokio::test]
async fn project_list_rescopes_with_the_session() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let sessions = SessionManager::new(Arc::new(StaticIdentity));

    let mut sub = subscribe_scoped::<Project, SessionUser, _>(
        store.clone(),
        session_scope(sessions.subscribe()),
        user_projects_query,
    );

    // Still initializing: no user, empty list.
    wait_for(&mut sub, |s| matches!(s, SubscriptionState::Data(p) if p.is_empty())).await;

    let user = sessions.sign_in("owner@example.com", "pw").await.unwrap();
    create_project(
        store.as_ref(),
        CreateProjectPayload {
            name: "Website Redesign".to_string(),
            description: None,
        },
        &user,
    )
    .await
    .unwrap();

    let state = wait_for(&mut sub, |s| matches!(s, SubscriptionState::Data(p) if p.len() == 1)).await;
    assert_eq!(data(&state)[0].owner_id, user.user_id);

    sessions.sign_out().await.unwrap();
    wait_for(&mut sub, |s| matches!(s, SubscriptionState::Data(p) if p.is_empty())).await;
}

#[tokio::test]
async fn document_delete_runs_metadata_before_blob() {
    let ops = Arc::new(Mutex::new(Vec::new()));
    let store = RecordingStore::new(ops.clone());
    let blobs = Arc::new(MemoryBlobStore::with_ops(ops.clone()));
    let uploader = session("u1");

    let id = upload_document(
        &store,
        blobs.clone(),
        "p1",
        None,
        FileUpload {
            name: "plan.pdf".to_string(),
            bytes: b"pdf".to_vec(),
        },
        &uploader,
    )
    .await
    .unwrap();

    documents::service::delete_document(&store, blobs.as_ref(), &id, &uploader)
        .await
        .unwrap();

    let log = ops.lock().unwrap().clone();
    let record_delete = log
        .iter()
        .position(|op| op == &format!("record.delete documents/{}", id))
        .expect("metadata delete missing from log");
    let blob_delete = log
        .iter()
        .position(|op| op.starts_with("blob.delete projects/p1/general/"))
        .expect("blob delete missing from log");
    assert!(record_delete < blob_delete, "log: {:?}", log);
}

#[tokio::test]
async fn cross_user_expense_delete_is_denied_and_expense_survives() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let blobs = MemoryBlobStore::new();

    let expense_id = create_expense(store.as_ref(), "p1", expense_payload("taxi"), &session("u2"))
        .await
        .unwrap();

    let mut sub = subscribe::<Expense>(store.clone(), project_expenses_query("p1"));
    wait_for(&mut sub, |s| matches!(s, SubscriptionState::Data(e) if e.len() == 1)).await;

    let err = delete_expense(store.as_ref(), &blobs, &expense_id, &session("u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::PermissionDenied(_)));

    // The next emission still carries the expense.
    create_expense(store.as_ref(), "p1", expense_payload("lunch"), &session("u2"))
        .await
        .unwrap();
    let state = wait_for(&mut sub, |s| matches!(s, SubscriptionState::Data(e) if e.len() == 2)).await;
    assert!(data(&state).iter().any(|e| e.id == expense_id));
}

#[tokio::test]
async fn upload_flow_writes_exactly_one_document_under_the_prefix() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());

    upload_document(
        store.as_ref(),
        blobs.clone(),
        "p1",
        None,
        FileUpload {
            name: "site-survey.pdf".to_string(),
            bytes: vec![1u8; 128 * 1024],
        },
        &session("u1"),
    )
    .await
    .unwrap();

    let records = store.query(&project_documents_query("p1")).await.unwrap();
    assert_eq!(records.len(), 1);

    let document = <Document as taskhub_shared::store::FromRecord>::from_record(&records[0]);
    assert!(document.storage_path.starts_with("projects/p1/general/"));
    assert!(document.storage_path.ends_with("_site-survey.pdf"));
    assert_eq!(document.uploader_id, "u1");
    assert!(document.uploaded_at.is_some());
    assert!(blobs.contains(&document.storage_path));
    assert_eq!(document.download_url, format!("memory://{}", document.storage_path));
}

#[tokio::test]
async fn failed_transfer_writes_no_document_metadata() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    blobs.set_fail_uploads(true);

    let err = upload_document(
        store.as_ref(),
        blobs.clone(),
        "p1",
        None,
        FileUpload {
            name: "plan.pdf".to_string(),
            bytes: b"pdf".to_vec(),
        },
        &session("u1"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DataError::Transport(_)));
    assert!(store
        .query(&project_documents_query("p1"))
        .await
        .unwrap()
        .is_empty());
    assert!(blobs.ops().iter().all(|op| !op.starts_with("blob.put")));
}

#[tokio::test]
async fn failed_receipt_transfer_writes_no_expense() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    blobs.set_fail_uploads(true);

    let err = add_expense(
        store.as_ref(),
        blobs.clone(),
        "p1",
        expense_payload("taxi"),
        Some(FileUpload {
            name: "r.png".to_string(),
            bytes: b"png".to_vec(),
        }),
        &session("u1"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DataError::Transport(_)));
    assert!(store
        .query(&project_expenses_query("p1"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn project_detail_follows_updates_and_deletion() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let owner = session("u1");
    let id = create_project(
        store.as_ref(),
        CreateProjectPayload {
            name: "Fitout".to_string(),
            description: None,
        },
        &owner,
    )
    .await
    .unwrap();

    let mut detail =
        subscribe_record::<Project>(store.clone(), "projects".to_string(), id.clone());

    timeout(Duration::from_secs(2), async {
        loop {
            if let RecordState::Data(project) = detail.current() {
                assert_eq!(project.name, "Fitout");
                break;
            }
            assert!(detail.changed().await);
        }
    })
    .await
    .unwrap();

    let mut patch = Fields::new();
    patch.insert(
        "description".to_string(),
        serde_json::Value::String("ground floor".to_string()),
    );
    store.update("projects", &id, patch).await.unwrap();

    timeout(Duration::from_secs(2), async {
        loop {
            if let RecordState::Data(project) = detail.current() {
                if project.description.as_deref() == Some("ground floor") {
                    break;
                }
            }
            assert!(detail.changed().await);
        }
    })
    .await
    .unwrap();

    store.delete("projects", &id).await.unwrap();
    timeout(Duration::from_secs(2), async {
        loop {
            if detail.current() == RecordState::NotFound {
                break;
            }
            assert!(detail.changed().await);
        }
    })
    .await
    .unwrap();
}
