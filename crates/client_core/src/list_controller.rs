//! Driver behind a list-with-CRUD screen.
//!
//! A controller owns the displayed items of one collection. Loads replace `items` wholesale,
//! deletes go through user confirmation and are followed by a full reload, and a
//! [`ReloadHandle`] lets a sibling form refresh the list after its own writes. Concurrent
//! reloads are not sequenced: whichever gateway call resolves last decides `items`.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Weak,
};

use async_trait::async_trait;
use shared::{
    domain::{Record, RecordId},
    protocol::ListQuery,
};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::gateway::RepositoryGateway;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListState {
    pub items: Vec<Record>,
    pub is_loading: bool,
    pub is_refreshing: bool,
}

/// The user-facing side effects a controller or form needs: asking and telling.
#[async_trait]
pub trait UserDialog: Send + Sync {
    async fn confirm_delete(&self, id: &RecordId) -> bool;
    async fn notify(&self, title: &str, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Declined,
    Deleted,
    Failed(String),
}

pub type EditCallback = Arc<dyn Fn(&Record) + Send + Sync>;

struct Shared {
    gateway: Arc<dyn RepositoryGateway>,
    dialog: Arc<dyn UserDialog>,
    query: Option<ListQuery>,
    on_edit: Option<EditCallback>,
    state: watch::Sender<ListState>,
    in_flight: AtomicUsize,
    mounted: AtomicBool,
}

impl Shared {
    async fn reload(&self, is_refresh: bool) -> bool {
        if !self.mounted.load(Ordering::Acquire) {
            return false;
        }

        self.state.send_modify(|state| {
            self.in_flight.fetch_add(1, Ordering::AcqRel);
            state.is_loading = !is_refresh;
            state.is_refreshing = is_refresh;
        });
        let mut pending = PendingLoad {
            shared: self,
            settled: false,
        };
        debug!(collection = self.gateway.collection(), is_refresh, "list: load started");

        let items = self.gateway.list(self.query.as_ref()).await;

        // Decrement and apply under the same lock so the last resolved load is the last applied.
        self.state.send_if_modified(|state| {
            let remaining = self.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
            if !self.mounted.load(Ordering::Acquire) {
                return false;
            }
            state.items = items;
            if remaining == 0 {
                state.is_loading = false;
                state.is_refreshing = false;
            }
            true
        });
        pending.settled = true;

        if !self.mounted.load(Ordering::Acquire) {
            debug!(
                collection = self.gateway.collection(),
                "list: discarded load that resolved after teardown"
            );
            return false;
        }
        debug!(collection = self.gateway.collection(), "list: reload applied");
        true
    }
}

/// Keeps `in_flight` balanced when a reload future is dropped before its load resolves.
struct PendingLoad<'a> {
    shared: &'a Shared,
    settled: bool,
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let shared = self.shared;
        debug!(
            collection = shared.gateway.collection(),
            "list: load abandoned before it resolved"
        );
        shared.state.send_if_modified(|state| {
            let remaining = shared.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
            if remaining != 0 || !shared.mounted.load(Ordering::Acquire) {
                return false;
            }
            state.is_loading = false;
            state.is_refreshing = false;
            true
        });
    }
}

pub struct ListControllerBuilder {
    gateway: Arc<dyn RepositoryGateway>,
    dialog: Arc<dyn UserDialog>,
    query: Option<ListQuery>,
    on_edit: Option<EditCallback>,
}

impl ListControllerBuilder {
    pub fn query(mut self, query: ListQuery) -> Self {
        self.query = Some(query);
        self
    }

    pub fn on_edit(mut self, callback: impl Fn(&Record) + Send + Sync + 'static) -> Self {
        self.on_edit = Some(Arc::new(callback));
        self
    }

    /// Builds without loading; `items` stays empty until the first `reload`.
    pub fn build(self) -> ListController {
        let (state, _) = watch::channel(ListState::default());
        ListController {
            shared: Arc::new(Shared {
                gateway: self.gateway,
                dialog: self.dialog,
                query: self.query,
                on_edit: self.on_edit,
                state,
                in_flight: AtomicUsize::new(0),
                mounted: AtomicBool::new(true),
            }),
        }
    }

    /// Builds and performs the initial load.
    pub async fn mount(self) -> ListController {
        let controller = self.build();
        controller.reload(false).await;
        controller
    }
}

/// Dropping the controller tears it down: loads still in flight are discarded on arrival.
pub struct ListController {
    shared: Arc<Shared>,
}

impl ListController {
    pub fn builder(
        gateway: Arc<dyn RepositoryGateway>,
        dialog: Arc<dyn UserDialog>,
    ) -> ListControllerBuilder {
        ListControllerBuilder {
            gateway,
            dialog,
            query: None,
            on_edit: None,
        }
    }

    pub async fn reload(&self, is_refresh: bool) -> bool {
        self.shared.reload(is_refresh).await
    }

    /// Deletes only after the dialog confirms. Success reloads; failure leaves `items` alone.
    pub async fn request_delete(&self, id: &RecordId) -> DeleteOutcome {
        let collection = self.shared.gateway.collection();
        if !self.shared.dialog.confirm_delete(id).await {
            debug!(collection, %id, "list: delete declined");
            return DeleteOutcome::Declined;
        }

        let result = self.shared.gateway.delete(id).await;
        if result.success {
            info!(collection, %id, "list: delete confirmed, reloading");
            self.reload(false).await;
            DeleteOutcome::Deleted
        } else {
            warn!(collection, %id, message = %result.message, "list: delete failed");
            self.shared
                .dialog
                .notify("Delete failed", &result.message)
                .await;
            DeleteOutcome::Failed(result.message)
        }
    }

    /// Hands the record with `id` to the edit callback and returns it.
    pub fn edit(&self, id: &RecordId) -> Option<Record> {
        let record = self
            .shared
            .state
            .borrow()
            .items
            .iter()
            .find(|record| id.matches(&record.id().to_value()))
            .cloned()?;
        if let Some(callback) = &self.shared.on_edit {
            callback(&record);
        }
        Some(record)
    }

    pub fn render<R>(&self, mut render_item: impl FnMut(&Record) -> R) -> Vec<R> {
        self.shared
            .state
            .borrow()
            .items
            .iter()
            .map(|record| render_item(record))
            .collect()
    }

    pub fn snapshot(&self) -> ListState {
        self.shared.state.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.shared.state.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState> {
        self.shared.state.subscribe()
    }

    pub fn state_stream(&self) -> WatchStream<ListState> {
        WatchStream::new(self.subscribe())
    }

    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn unmount(&self) {
        self.shared.mounted.store(false, Ordering::Release);
    }
}

impl Drop for ListController {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Lets a form refresh a controller it does not own. A no-op once the controller is gone.
#[derive(Clone)]
pub struct ReloadHandle {
    shared: Weak<Shared>,
}

impl ReloadHandle {
    pub async fn reload(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.reload(false).await,
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "tests/list_controller_tests.rs"]
mod tests;
