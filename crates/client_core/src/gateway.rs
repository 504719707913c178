use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{Fields, Record, RecordId},
    error::GatewayError,
    protocol::{ListQuery, MutationResult, ReadFailure, ReadOperation},
};
use tokio::sync::broadcast;
use tracing::{info, warn};

const DIAGNOSTICS_CAPACITY: usize = 64;

/// Raw access to the remote store. Every failure is reported; policy lives in [`CollectionGateway`].
#[async_trait]
pub trait RecordBackend: Send + Sync {
    async fn select(&self, collection: &str, query: &ListQuery)
        -> Result<Vec<Record>, GatewayError>;
    async fn insert(&self, collection: &str, fields: Fields) -> Result<Record, GatewayError>;
    async fn patch(
        &self,
        collection: &str,
        id: &RecordId,
        fields: Fields,
    ) -> Result<Record, GatewayError>;
    async fn remove(&self, collection: &str, id: &RecordId) -> Result<(), GatewayError>;

    async fn select_one(
        &self,
        collection: &str,
        id: &RecordId,
        query: &ListQuery,
    ) -> Result<Option<Record>, GatewayError> {
        let mut query = query.clone().eq("id", id.to_value()).limit(1);
        query.order = None;
        Ok(self.select(collection, &query).await?.into_iter().next())
    }
}

/// CRUD over one collection. Reads never fail (empty / `None` instead); writes report through
/// [`MutationResult`].
#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    fn collection(&self) -> &str;
    async fn list(&self, query: Option<&ListQuery>) -> Vec<Record>;
    async fn get_by_id(&self, id: &RecordId) -> Option<Record>;
    async fn create(&self, fields: Fields) -> MutationResult;
    async fn update(&self, id: &RecordId, fields: Fields) -> MutationResult;
    async fn delete(&self, id: &RecordId) -> MutationResult;
}

/// Fan-out of read failures a gateway swallowed. Nobody has to listen.
#[derive(Clone)]
pub struct Diagnostics {
    tx: broadcast::Sender<ReadFailure>,
}

impl Diagnostics {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(DIAGNOSTICS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReadFailure> {
        self.tx.subscribe()
    }

    fn report(&self, failure: ReadFailure) {
        let _ = self.tx.send(failure);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`RepositoryGateway`] bound to one collection name on a shared backend.
#[derive(Clone)]
pub struct CollectionGateway {
    backend: Arc<dyn RecordBackend>,
    collection: String,
    diagnostics: Diagnostics,
}

impl CollectionGateway {
    pub fn new(backend: Arc<dyn RecordBackend>, collection: impl Into<String>) -> Self {
        Self::with_diagnostics(backend, collection, Diagnostics::new())
    }

    pub fn with_diagnostics(
        backend: Arc<dyn RecordBackend>,
        collection: impl Into<String>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            backend,
            collection: collection.into(),
            diagnostics,
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_shared(self) -> Arc<dyn RepositoryGateway> {
        Arc::new(self)
    }

    fn absorb_read_failure(&self, operation: ReadOperation, err: GatewayError) {
        warn!(
            collection = %self.collection,
            ?operation,
            kind = ?err.kind(),
            error = %err,
            "gateway: read failed, returning empty result"
        );
        self.diagnostics.report(ReadFailure {
            collection: self.collection.clone(),
            operation,
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    fn write_failed(&self, action: &str, err: GatewayError) -> MutationResult {
        warn!(
            collection = %self.collection,
            action,
            kind = ?err.kind(),
            error = %err,
            "gateway: write failed"
        );
        MutationResult::from(err)
    }
}

#[async_trait]
impl RepositoryGateway for CollectionGateway {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn list(&self, query: Option<&ListQuery>) -> Vec<Record> {
        let default_query = ListQuery::default();
        let query = query.unwrap_or(&default_query);
        match self.backend.select(&self.collection, query).await {
            Ok(records) => records,
            Err(err) => {
                self.absorb_read_failure(ReadOperation::List, err);
                Vec::new()
            }
        }
    }

    async fn get_by_id(&self, id: &RecordId) -> Option<Record> {
        match self
            .backend
            .select_one(&self.collection, id, &ListQuery::default())
            .await
        {
            Ok(record) => record,
            Err(err) => {
                self.absorb_read_failure(ReadOperation::GetById, err);
                None
            }
        }
    }

    async fn create(&self, fields: Fields) -> MutationResult {
        match self.backend.insert(&self.collection, fields).await {
            Ok(record) => {
                info!(collection = %self.collection, id = %record.id(), "gateway: record created");
                MutationResult::ok("Record created", Some(record))
            }
            Err(err) => self.write_failed("create", err),
        }
    }

    async fn update(&self, id: &RecordId, fields: Fields) -> MutationResult {
        match self.backend.patch(&self.collection, id, fields).await {
            Ok(record) => {
                info!(collection = %self.collection, %id, "gateway: record updated");
                MutationResult::ok("Record updated", Some(record))
            }
            Err(err) => self.write_failed("update", err),
        }
    }

    async fn delete(&self, id: &RecordId) -> MutationResult {
        match self.backend.remove(&self.collection, id).await {
            Ok(()) => {
                info!(collection = %self.collection, %id, "gateway: record deleted");
                MutationResult::ok("Record deleted", None)
            }
            Err(err) => self.write_failed("delete", err),
        }
    }
}
