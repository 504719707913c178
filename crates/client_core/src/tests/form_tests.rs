use super::*;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use crate::{
    gateway::CollectionGateway, list_controller::ListController, memory::InMemoryBackend,
};

#[derive(Default)]
struct RecordingDialog {
    notices: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl UserDialog for RecordingDialog {
    async fn confirm_delete(&self, _id: &RecordId) -> bool {
        true
    }

    async fn notify(&self, title: &str, message: &str) {
        self.notices
            .lock()
            .await
            .push((title.to_string(), message.to_string()));
    }
}

async fn teams_screen(
    rows: Vec<Value>,
) -> (
    InMemoryBackend,
    Arc<RecordingDialog>,
    ListController,
    RecordForm,
) {
    let backend = InMemoryBackend::new();
    backend.seed("teams", rows).await;
    let gateway = CollectionGateway::new(Arc::new(backend.clone()), "teams").into_shared();
    let dialog = Arc::new(RecordingDialog::default());
    let controller = ListController::builder(gateway.clone(), dialog.clone())
        .mount()
        .await;
    let form = RecordForm::new(gateway, dialog.clone())
        .required(required_fields(Collection::Teams).iter().copied())
        .reload_on_save(controller.reload_handle());
    (backend, dialog, controller, form)
}

#[tokio::test]
async fn create_then_reload_lists_the_new_record() {
    let (_, dialog, controller, mut form) = teams_screen(Vec::new()).await;
    form.set("name", "X");

    let result = form.submit().await;

    assert!(result.success);
    let created = result.data.expect("created record");
    let items = controller.snapshot().items;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id(), created.id());
    assert_eq!(items[0].get("name"), Some(&json!("X")));
    assert_eq!(form.mode(), &FormMode::Create);
    assert!(form.fields().is_empty());
    assert_eq!(dialog.notices.lock().await[0].0, "Saved");
}

#[tokio::test]
async fn missing_required_fields_block_the_write() {
    let (backend, dialog, controller, mut form) = teams_screen(Vec::new()).await;
    form.set("name", "   ");
    form.set("coach", "Ana");

    let result = form.submit().await;

    assert!(!result.success);
    assert_eq!(result.message, "please fill in: name");
    assert!(backend.rows("teams").await.is_empty());
    assert!(controller.is_empty());
    assert_eq!(form.get("coach"), Some(&json!("Ana")));
    assert_eq!(dialog.notices.lock().await[0].0, "Missing fields");
}

#[tokio::test]
async fn editing_updates_only_the_submitted_fields() {
    let (backend, _, controller, form) = teams_screen(vec![json!({
        "id": 5,
        "name": "Falcons",
        "coach": "Ana",
        "category": "U19"
    })])
    .await;
    let mut form = form.skip_on_populate(["coach"]);

    let record = controller.edit(&RecordId::Int(5)).expect("listed");
    form.populate(&record);
    assert_eq!(form.mode(), &FormMode::Edit(RecordId::Int(5)));
    assert!(form.get("coach").is_none());
    form.set("name", "Y");

    let result = form.submit().await;

    assert!(result.success);
    let updated = result.data.expect("updated record");
    assert_eq!(updated.id(), &RecordId::Int(5));
    assert_eq!(updated.get("name"), Some(&json!("Y")));
    assert_eq!(updated.get("coach"), Some(&json!("Ana")));
    assert_eq!(updated.get("category"), Some(&json!("U19")));
    assert_eq!(backend.rows("teams").await.len(), 1);
    assert_eq!(
        controller.snapshot().items[0].get("name"),
        Some(&json!("Y"))
    );
}

#[tokio::test]
async fn failed_save_keeps_form_contents_and_list() {
    let (backend, dialog, controller, mut form) =
        teams_screen(vec![json!({ "id": 1, "name": "Falcons" })]).await;
    backend.unique("teams", "name").await;
    form.set("name", "Falcons");

    let result = form.submit().await;

    assert!(!result.success);
    assert_eq!(result.message, "duplicate value for teams.name");
    assert_eq!(form.get("name"), Some(&json!("Falcons")));
    assert_eq!(controller.len(), 1);
    let notices = dialog.notices.lock().await.clone();
    assert_eq!(
        notices,
        vec![("Save failed".to_string(), "duplicate value for teams.name".to_string())]
    );
}

#[tokio::test]
async fn saving_after_the_list_is_gone_still_writes() {
    let (backend, _, controller, mut form) = teams_screen(Vec::new()).await;
    drop(controller);
    form.set("name", "Hawks");

    assert!(form.submit().await.success);
    assert_eq!(backend.rows("teams").await.len(), 1);
}

#[test]
fn every_collection_requires_something() {
    for collection in Collection::ALL {
        assert!(!required_fields(collection).is_empty(), "{collection}");
    }
}
