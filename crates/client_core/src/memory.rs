//! Process-local record store with the same filter, join and ordering semantics as the REST
//! binding. Used for offline demos and as the fake backend in tests.

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use shared::{
    domain::{value_text, Fields, Record, RecordId},
    error::GatewayError,
    protocol::{Filter, ListQuery, Order},
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::gateway::RecordBackend;

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, Vec<Fields>>,
    unique_columns: HashSet<(String, String)>,
    fail_with: Option<GatewayError>,
}

#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends rows verbatim. Rows without an `id` get one assigned.
    pub async fn seed(&self, collection: &str, rows: impl IntoIterator<Item = Value>) {
        let mut state = self.state.lock().await;
        let table = state.collections.entry(collection.to_string()).or_default();
        for row in rows {
            let Value::Object(mut fields) = row else {
                continue;
            };
            if !fields.contains_key("id") {
                let Some(id) = next_int_id(table) else {
                    warn!(collection, "memory: id space exhausted, seed row skipped");
                    continue;
                };
                fields.insert("id".into(), Value::from(id));
            }
            table.push(fields);
        }
    }

    /// Rejects inserts and updates that would duplicate `column` within `collection`.
    pub async fn unique(&self, collection: &str, column: &str) {
        self.state
            .lock()
            .await
            .unique_columns
            .insert((collection.to_string(), column.to_string()));
    }

    /// Every operation fails with `err` until cleared with `None`.
    pub async fn fail_with(&self, err: Option<GatewayError>) {
        self.state.lock().await.fail_with = err;
    }

    pub async fn rows(&self, collection: &str) -> Vec<Fields> {
        self.state
            .lock()
            .await
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordBackend for InMemoryBackend {
    async fn select(
        &self,
        collection: &str,
        query: &ListQuery,
    ) -> Result<Vec<Record>, GatewayError> {
        let state = self.state.lock().await;
        state.check_failure()?;

        let mut rows: Vec<Fields> = state
            .collections
            .get(collection)
            .map(|table| {
                table
                    .iter()
                    .filter(|row| query.filters.iter().all(|filter| matches(filter, row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            sort_rows(&mut rows, order);
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        rows.into_iter()
            .map(|mut row| {
                for join in &query.joins {
                    let related = row
                        .get(&join.foreign_key)
                        .and_then(|fk| state.find(&join.collection, fk))
                        .map(|fields| Value::Object(fields.clone()))
                        .unwrap_or(Value::Null);
                    row.insert(join.alias.clone(), related);
                }
                Record::try_from(row).map_err(|err| GatewayError::Decode(err.to_string()))
            })
            .collect()
    }

    async fn insert(&self, collection: &str, mut fields: Fields) -> Result<Record, GatewayError> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        state.check_unique(collection, &fields, None)?;

        let table = state.collections.entry(collection.to_string()).or_default();
        if !fields.contains_key("id") {
            let id = next_int_id(table).ok_or_else(|| {
                GatewayError::constraint(format!("no ids left for {collection}"))
            })?;
            fields.insert("id".into(), Value::from(id));
        }
        if let Some(id) = fields.get("id") {
            if table.iter().any(|row| row.get("id") == Some(id)) {
                return Err(GatewayError::constraint(format!(
                    "duplicate key value violates unique constraint \"{collection}_pkey\""
                )));
            }
        }
        fields
            .entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        let record = Record::try_from(fields.clone())
            .map_err(|err| GatewayError::constraint(err.to_string()))?;
        table.push(fields);
        Ok(record)
    }

    async fn patch(
        &self,
        collection: &str,
        id: &RecordId,
        fields: Fields,
    ) -> Result<Record, GatewayError> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        state.check_unique(collection, &fields, Some(id))?;

        let row = state
            .collections
            .get_mut(collection)
            .and_then(|table| table.iter_mut().find(|row| row_has_id(row, id)))
            .ok_or_else(|| GatewayError::not_found(collection, id))?;
        for (key, value) in fields {
            if key != "id" {
                row.insert(key, value);
            }
        }
        Record::try_from(row.clone()).map_err(|err| GatewayError::Decode(err.to_string()))
    }

    async fn remove(&self, collection: &str, id: &RecordId) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        state.check_failure()?;

        let table = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| GatewayError::not_found(collection, id))?;
        let index = table
            .iter()
            .position(|row| row_has_id(row, id))
            .ok_or_else(|| GatewayError::not_found(collection, id))?;
        table.remove(index);
        Ok(())
    }
}

impl MemoryState {
    fn check_failure(&self) -> Result<(), GatewayError> {
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn find(&self, collection: &str, id: &Value) -> Option<&Fields> {
        let id = RecordId::from_value(id)?;
        self.collections
            .get(collection)?
            .iter()
            .find(|row| row_has_id(row, &id))
    }

    fn check_unique(
        &self,
        collection: &str,
        fields: &Fields,
        exclude: Option<&RecordId>,
    ) -> Result<(), GatewayError> {
        let Some(table) = self.collections.get(collection) else {
            return Ok(());
        };
        for (unique_collection, column) in &self.unique_columns {
            if unique_collection != collection {
                continue;
            }
            let Some(value) = fields.get(column) else {
                continue;
            };
            let clash = table.iter().any(|row| {
                row.get(column) == Some(value) && !exclude.is_some_and(|id| row_has_id(row, id))
            });
            if clash {
                return Err(GatewayError::constraint(format!(
                    "duplicate value for {collection}.{column}"
                )));
            }
        }
        Ok(())
    }
}

fn row_has_id(row: &Fields, id: &RecordId) -> bool {
    row.get("id").is_some_and(|value| id.matches(value))
}

fn next_int_id(table: &[Fields]) -> Option<i64> {
    table
        .iter()
        .filter_map(|row| row.get("id").and_then(Value::as_i64))
        .max()
        .unwrap_or(0)
        .checked_add(1)
}

fn loosely_equal(left: Option<&Value>, right: &Value) -> bool {
    match (left, right) {
        (None, Value::Null) | (Some(Value::Null), Value::Null) => true,
        (Some(left), right) => match (value_text(left), value_text(right)) {
            (Some(l), Some(r)) => l == r,
            _ => left == right,
        },
        (None, _) => false,
    }
}

fn matches(filter: &Filter, row: &Fields) -> bool {
    match filter {
        Filter::Eq { column, value } => loosely_equal(row.get(column), value),
        Filter::Contains { column, needle } => row
            .get(column)
            .and_then(value_text)
            .is_some_and(|text| text.to_lowercase().contains(&needle.to_lowercase())),
        Filter::AnyEq { columns, value } => columns
            .iter()
            .any(|column| loosely_equal(row.get(column), value)),
    }
}

/// Values of different JSON types order by type first, so mixed columns still sort totally.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_present(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l
            .as_f64()
            .partial_cmp(&r.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (Value::String(l), Value::String(r)) => l.cmp(r),
        _ => type_rank(left)
            .cmp(&type_rank(right))
            .then_with(|| left.to_string().cmp(&right.to_string())),
    }
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.filter(|v| is_present(Some(v)));
    let right = right.filter(|v| is_present(Some(v)));
    match (left, right) {
        (Some(l), Some(r)) => compare_present(l, r),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn sort_rows(rows: &mut [Fields], order: &Order) {
    rows.sort_by(|a, b| {
        let (left, right) = (a.get(&order.column), b.get(&order.column));
        let ordering = compare_values(left, right);
        // Nulls stay last in both directions.
        if is_present(left) && is_present(right) && !order.ascending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn is_present(value: Option<&Value>) -> bool {
    value.is_some_and(|v| !v.is_null())
}

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;
