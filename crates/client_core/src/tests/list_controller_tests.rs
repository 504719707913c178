use super::*;
use std::{collections::VecDeque, time::Duration};

use serde_json::{json, Value};
use shared::{
    domain::Fields,
    error::GatewayError,
    protocol::MutationResult,
};
use tokio::sync::{oneshot, Mutex};

use crate::{gateway::CollectionGateway, memory::InMemoryBackend};

struct ScriptedDialog {
    confirm: bool,
    confirmations: Mutex<Vec<RecordId>>,
    notices: Mutex<Vec<(String, String)>>,
}

impl ScriptedDialog {
    fn answering(confirm: bool) -> Arc<Self> {
        Arc::new(Self {
            confirm,
            confirmations: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl UserDialog for ScriptedDialog {
    async fn confirm_delete(&self, id: &RecordId) -> bool {
        self.confirmations.lock().await.push(id.clone());
        self.confirm
    }

    async fn notify(&self, title: &str, message: &str) {
        self.notices
            .lock()
            .await
            .push((title.to_string(), message.to_string()));
    }
}

/// Gateway whose list responses are released by the test, one receiver per call.
struct ScriptedGateway {
    pending: Mutex<VecDeque<oneshot::Receiver<Vec<Record>>>>,
    started: AtomicUsize,
    delete_calls: Mutex<Vec<RecordId>>,
}

impl ScriptedGateway {
    fn new(responses: Vec<oneshot::Receiver<Vec<Record>>>) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(responses.into()),
            started: AtomicUsize::new(0),
            delete_calls: Mutex::new(Vec::new()),
        })
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryGateway for ScriptedGateway {
    fn collection(&self) -> &str {
        "teams"
    }

    async fn list(&self, _query: Option<&ListQuery>) -> Vec<Record> {
        let next = self.pending.lock().await.pop_front();
        self.started.fetch_add(1, Ordering::SeqCst);
        match next {
            Some(rx) => rx.await.unwrap_or_default(),
            None => Vec::new(),
        }
    }

    async fn get_by_id(&self, _id: &RecordId) -> Option<Record> {
        None
    }

    async fn create(&self, _fields: Fields) -> MutationResult {
        MutationResult::failed("not scripted")
    }

    async fn update(&self, _id: &RecordId, _fields: Fields) -> MutationResult {
        MutationResult::failed("not scripted")
    }

    async fn delete(&self, id: &RecordId) -> MutationResult {
        self.delete_calls.lock().await.push(id.clone());
        MutationResult::ok("Record deleted", None)
    }
}

fn record(value: Value) -> Record {
    Record::try_from(value).expect("record")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

async fn teams_gateway(rows: Vec<Value>) -> (InMemoryBackend, Arc<dyn RepositoryGateway>) {
    let backend = InMemoryBackend::new();
    backend.seed("teams", rows).await;
    let gateway = CollectionGateway::new(Arc::new(backend.clone()), "teams").into_shared();
    (backend, gateway)
}

fn ids(controller: &ListController) -> Vec<RecordId> {
    controller.render(|record| record.id().clone())
}

#[tokio::test]
async fn empty_collection_mounts_ready_without_notices() {
    let (_, gateway) = teams_gateway(Vec::new()).await;
    let dialog = ScriptedDialog::answering(true);

    let controller = ListController::builder(gateway, dialog.clone()).mount().await;

    assert_eq!(controller.snapshot(), ListState::default());
    assert!(controller.is_empty());
    assert!(dialog.notices.lock().await.is_empty());
}

#[tokio::test]
async fn failing_list_shows_empty_items_instead_of_an_error() {
    let (backend, gateway) = teams_gateway(vec![json!({ "id": 1, "name": "Falcons" })]).await;
    backend
        .fail_with(Some(GatewayError::transport("connection reset")))
        .await;
    let dialog = ScriptedDialog::answering(true);

    let controller = ListController::builder(gateway, dialog.clone()).mount().await;

    let state = controller.snapshot();
    assert!(state.items.is_empty());
    assert!(!state.is_loading);
    assert!(!state.is_refreshing);
    assert!(dialog.notices.lock().await.is_empty());
}

#[tokio::test]
async fn confirmed_delete_reloads_without_the_deleted_record() {
    let (_, gateway) = teams_gateway(vec![
        json!({ "id": 1, "name": "Falcons" }),
        json!({ "id": 2, "name": "Hawks" }),
    ])
    .await;
    let dialog = ScriptedDialog::answering(true);
    let controller = ListController::builder(gateway, dialog.clone()).mount().await;
    assert_eq!(controller.len(), 2);

    let outcome = controller.request_delete(&RecordId::Int(1)).await;

    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert_eq!(ids(&controller), vec![RecordId::Int(2)]);
    assert_eq!(*dialog.confirmations.lock().await, vec![RecordId::Int(1)]);
}

#[tokio::test]
async fn failed_delete_keeps_items_and_tells_the_user() {
    let (backend, gateway) = teams_gateway(vec![
        json!({ "id": 1, "name": "Falcons" }),
        json!({ "id": 2, "name": "Hawks" }),
    ])
    .await;
    let dialog = ScriptedDialog::answering(true);
    let controller = ListController::builder(gateway, dialog.clone()).mount().await;
    let before = controller.snapshot();

    backend
        .fail_with(Some(GatewayError::constraint(
            "update or delete on table \"teams\" violates foreign key constraint",
        )))
        .await;
    let outcome = controller.request_delete(&RecordId::Int(1)).await;

    assert!(matches!(outcome, DeleteOutcome::Failed(ref message) if message.contains("foreign key")));
    assert_eq!(controller.snapshot(), before);
    let notices = dialog.notices.lock().await.clone();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, "Delete failed");
}

#[tokio::test]
async fn declined_confirmation_never_reaches_the_gateway() {
    let (tx, rx) = oneshot::channel();
    tx.send(vec![record(json!({ "id": 7, "name": "Falcons" }))])
        .expect("send");
    let gateway = ScriptedGateway::new(vec![rx]);
    let dialog = ScriptedDialog::answering(false);
    let controller = ListController::builder(gateway.clone(), dialog.clone())
        .mount()
        .await;

    let outcome = controller.request_delete(&RecordId::Int(7)).await;

    assert_eq!(outcome, DeleteOutcome::Declined);
    assert!(gateway.delete_calls.lock().await.is_empty());
    assert_eq!(ids(&controller), vec![RecordId::Int(7)]);
    assert_eq!(gateway.started(), 1);
}

#[tokio::test]
async fn concurrent_reloads_keep_the_last_resolved_response() {
    tokio::time::timeout(Duration::from_secs(5), async {
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        let gateway = ScriptedGateway::new(vec![first_rx, second_rx]);
        let controller =
            ListController::builder(gateway.clone(), ScriptedDialog::answering(true)).build();
        let handle = controller.reload_handle();

        let first = tokio::spawn({
            let handle = handle.clone();
            async move { handle.reload().await }
        });
        wait_until(|| gateway.started() == 1).await;
        let second = tokio::spawn(async move { handle.reload().await });
        wait_until(|| gateway.started() == 2).await;
        assert!(controller.snapshot().is_loading);

        let newer = vec![record(json!({ "id": 2, "name": "second response" }))];
        second_tx.send(newer.clone()).expect("send");
        wait_until(|| controller.snapshot().items == newer).await;
        assert!(controller.snapshot().is_loading, "first load still in flight");

        let older = vec![record(json!({ "id": 1, "name": "first response" }))];
        first_tx.send(older.clone()).expect("send");
        assert!(first.await.expect("join"));
        assert!(second.await.expect("join"));

        let state = controller.snapshot();
        assert_eq!(state.items, older);
        assert!(!state.is_loading);
        assert!(!state.is_refreshing);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn refresh_sets_only_the_refreshing_flag_and_keeps_old_items_visible() {
    let (initial_tx, initial_rx) = oneshot::channel();
    let (refresh_tx, refresh_rx) = oneshot::channel();
    let old = vec![record(json!({ "id": 1, "name": "old" }))];
    initial_tx.send(old.clone()).expect("send");
    let gateway = ScriptedGateway::new(vec![initial_rx, refresh_rx]);
    let controller = ListController::builder(gateway.clone(), ScriptedDialog::answering(true))
        .mount()
        .await;
    let fresh = vec![record(json!({ "id": 2, "name": "fresh" }))];

    let observe = async {
        wait_until(|| gateway.started() == 2).await;
        let state = controller.snapshot();
        assert!(state.is_refreshing);
        assert!(!state.is_loading);
        assert_eq!(state.items, old);
        refresh_tx.send(fresh.clone()).expect("send");
    };
    let (applied, ()) = tokio::join!(controller.reload(true), observe);

    assert!(applied);
    let state = controller.snapshot();
    assert_eq!(state.items, fresh);
    assert!(!state.is_refreshing);
}

#[tokio::test]
async fn load_resolving_after_teardown_is_discarded() {
    let (initial_tx, initial_rx) = oneshot::channel();
    let (late_tx, late_rx) = oneshot::channel();
    let initial = vec![record(json!({ "id": 1, "name": "Falcons" }))];
    initial_tx.send(initial.clone()).expect("send");
    let gateway = ScriptedGateway::new(vec![initial_rx, late_rx]);
    let controller = ListController::builder(gateway.clone(), ScriptedDialog::answering(true))
        .mount()
        .await;
    let state = controller.subscribe();
    let handle = controller.reload_handle();

    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.reload().await }
    });
    wait_until(|| gateway.started() == 2).await;
    drop(controller);
    late_tx
        .send(vec![record(json!({ "id": 9, "name": "late" }))])
        .expect("send");

    assert!(!pending.await.expect("join"));
    assert_eq!(state.borrow().items, initial);
    assert!(!handle.reload().await);
    assert_eq!(gateway.started(), 2);
}

#[tokio::test]
async fn edit_invokes_callback_with_the_listed_record() {
    let (_, gateway) = teams_gateway(vec![
        json!({ "id": 1, "name": "Falcons" }),
        json!({ "id": 2, "name": "Hawks" }),
    ])
    .await;
    let edited = Arc::new(std::sync::Mutex::new(Vec::new()));
    let controller = ListController::builder(gateway, ScriptedDialog::answering(true))
        .on_edit({
            let edited = Arc::clone(&edited);
            move |record: &Record| {
                edited
                    .lock()
                    .expect("edited lock")
                    .push(record.get("name").cloned())
            }
        })
        .mount()
        .await;

    let record = controller.edit(&RecordId::Int(2)).expect("listed");
    assert_eq!(record.get("name"), Some(&json!("Hawks")));
    assert!(controller.edit(&RecordId::Int(42)).is_none());
    assert_eq!(
        *edited.lock().expect("edited lock"),
        vec![Some(json!("Hawks"))]
    );
}

#[tokio::test]
async fn subscribers_see_each_applied_state() {
    use tokio_stream::StreamExt;

    let (_, gateway) = teams_gateway(vec![json!({ "id": 1, "name": "Falcons" })]).await;
    let controller = ListController::builder(gateway, ScriptedDialog::answering(true)).build();
    let mut states = controller.state_stream();

    let initial = states.next().await.expect("initial state");
    assert!(initial.items.is_empty());

    controller.reload(false).await;
    let applied = states.next().await.expect("applied state");
    assert_eq!(applied.items.len(), 1);
    assert!(!applied.is_loading);
}

#[tokio::test]
async fn abandoned_reload_does_not_leave_loading_stuck() {
    let (_never_answers, stalled_rx) = oneshot::channel();
    let (ready_tx, ready_rx) = oneshot::channel();
    let fresh = vec![record(json!({ "id": 3, "name": "Falcons" }))];
    ready_tx.send(fresh.clone()).expect("send");
    let gateway = ScriptedGateway::new(vec![stalled_rx, ready_rx]);
    let controller =
        ListController::builder(gateway.clone(), ScriptedDialog::answering(true)).build();

    let abandoned = tokio::time::timeout(Duration::from_millis(20), controller.reload(false)).await;
    assert!(abandoned.is_err());
    assert!(!controller.snapshot().is_loading);

    assert!(controller.reload(false).await);
    let state = controller.snapshot();
    assert_eq!(state.items, fresh);
    assert!(!state.is_loading);
    assert!(!state.is_refreshing);
}

#[tokio::test]
async fn edit_finds_records_whose_id_was_echoed_as_text() {
    let (tx, rx) = oneshot::channel();
    tx.send(vec![record(json!({ "id": "7", "name": "Falcons" }))])
        .expect("send");
    let gateway = ScriptedGateway::new(vec![rx]);
    let controller = ListController::builder(gateway, ScriptedDialog::answering(true))
        .mount()
        .await;

    let record = controller.edit(&RecordId::Int(7)).expect("listed");
    assert_eq!(record.get("name"), Some(&json!("Falcons")));
}
