use std::sync::Arc;

use serde_json::Value;
use shared::{
    domain::{Collection, Fields, Record, RecordId},
    protocol::MutationResult,
};
use thiserror::Error;
use tracing::debug;

use crate::{
    gateway::RepositoryGateway,
    list_controller::{ReloadHandle, UserDialog},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(RecordId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("please fill in: {}", missing.join(", "))]
pub struct FormError {
    pub missing: Vec<String>,
}

/// Fields an admin form refuses to submit without.
pub fn required_fields(collection: Collection) -> &'static [&'static str] {
    match collection {
        Collection::Teams => &["name"],
        Collection::Players => &["name", "team_id"],
        Collection::News => &["title", "content"],
        Collection::Matches => &["match_date"],
        Collection::ShopCategories => &["name"],
        Collection::ShopItems => &["name", "price", "category_id"],
    }
}

/// Write side of an admin screen: create or edit one record, then refresh the list.
pub struct RecordForm {
    gateway: Arc<dyn RepositoryGateway>,
    dialog: Arc<dyn UserDialog>,
    required: Vec<String>,
    skip_on_populate: Vec<String>,
    reload: Option<ReloadHandle>,
    fields: Fields,
    mode: FormMode,
}

impl RecordForm {
    pub fn new(gateway: Arc<dyn RepositoryGateway>, dialog: Arc<dyn UserDialog>) -> Self {
        Self {
            gateway,
            dialog,
            required: Vec::new(),
            skip_on_populate: Vec::new(),
            reload: None,
            fields: Fields::new(),
            mode: FormMode::Create,
        }
    }

    pub fn required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Fields copied from a record that must not be sent back, such as joined rows.
    pub fn skip_on_populate<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_on_populate = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn reload_on_save(mut self, handle: ReloadHandle) -> Self {
        self.reload = Some(handle);
        self
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        if field != "id" {
            self.fields.insert(field, value.into());
        }
    }

    pub fn populate(&mut self, record: &Record) {
        self.fields = record
            .fields()
            .iter()
            .filter(|(key, _)| *key != "id" && !self.skip_on_populate.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.mode = FormMode::Edit(record.id().clone());
    }

    pub fn reset(&mut self) {
        self.fields.clear();
        self.mode = FormMode::Create;
    }

    pub fn validate(&self) -> Result<(), FormError> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|field| match self.fields.get(field.as_str()) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            })
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FormError { missing })
        }
    }

    /// Validates, writes, and tells the user how it went. Only a successful write resets the
    /// form and reloads the list.
    pub async fn submit(&mut self) -> MutationResult {
        if let Err(err) = self.validate() {
            let message = err.to_string();
            self.dialog.notify("Missing fields", &message).await;
            return MutationResult::failed(message);
        }

        let result = match &self.mode {
            FormMode::Create => self.gateway.create(self.fields.clone()).await,
            FormMode::Edit(id) => self.gateway.update(id, self.fields.clone()).await,
        };

        if !result.success {
            self.dialog.notify("Save failed", &result.message).await;
            return result;
        }

        self.dialog.notify("Saved", &result.message).await;
        self.reset();
        if let Some(handle) = &self.reload {
            if !handle.reload().await {
                debug!(
                    collection = self.gateway.collection(),
                    "form: list already torn down, skipped reload"
                );
            }
        }
        result
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
