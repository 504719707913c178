//! PostgREST-style HTTP binding: `/rest/v1/<collection>` with `apikey` and bearer auth.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use shared::{
    domain::{value_text, Fields, Record, RecordId},
    error::GatewayError,
    protocol::{Filter, ListQuery},
};
use tracing::debug;
use url::Url;

use crate::{config::ClientSettings, gateway::RecordBackend};

const REST_PREFIX: &str = "rest/v1/";
const RETURN_REPRESENTATION: &str = "return=representation";

#[derive(Clone)]
pub struct RestBackend {
    http: Client,
    rest_url: Url,
    api_key: String,
    access_token: Option<String>,
}

/// Error body the store sends with non-2xx answers.
#[derive(Debug, Deserialize)]
struct StoreErrorBody {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl RestBackend {
    pub fn new(http: Client, settings: &ClientSettings) -> Result<Self> {
        let rest_url = settings
            .backend_base_url()?
            .join(REST_PREFIX)
            .context("failed to derive REST endpoint from backend url")?;
        Ok(Self {
            http,
            rest_url,
            api_key: settings.api_key.clone(),
            access_token: settings.access_token.clone(),
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Self::new(http, settings)
    }

    fn request(&self, method: Method, collection: &str) -> Result<RequestBuilder, GatewayError> {
        let url = self
            .rest_url
            .join(collection)
            .map_err(|err| GatewayError::constraint(format!("invalid collection name: {err}")))?;
        let token = self.access_token.as_deref().unwrap_or(&self.api_key);
        Ok(self
            .http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json"))
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        collection: &str,
        id: Option<&RecordId>,
    ) -> Result<Vec<Record>, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body, collection, id));
        }

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        rows.into_iter()
            .map(|row| Record::try_from(row).map_err(|err| GatewayError::Decode(err.to_string())))
            .collect()
    }
}

#[async_trait]
impl RecordBackend for RestBackend {
    async fn select(
        &self,
        collection: &str,
        query: &ListQuery,
    ) -> Result<Vec<Record>, GatewayError> {
        let params = query_params(query);
        debug!(collection, ?params, "rest: select");
        let request = self.request(Method::GET, collection)?.query(&params);
        self.execute(request, collection, None).await
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<Record, GatewayError> {
        let request = self
            .request(Method::POST, collection)?
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&fields);
        self.execute(request, collection, None)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Decode("insert returned no row".into()))
    }

    async fn patch(
        &self,
        collection: &str,
        id: &RecordId,
        fields: Fields,
    ) -> Result<Record, GatewayError> {
        let request = self
            .request(Method::PATCH, collection)?
            .query(&[id_param(id)])
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&fields);
        self.execute(request, collection, Some(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::not_found(collection, id))
    }

    async fn remove(&self, collection: &str, id: &RecordId) -> Result<(), GatewayError> {
        let request = self
            .request(Method::DELETE, collection)?
            .query(&[id_param(id)])
            .header("Prefer", RETURN_REPRESENTATION);
        let removed = self.execute(request, collection, Some(id)).await?;
        if removed.is_empty() {
            return Err(GatewayError::not_found(collection, id));
        }
        Ok(())
    }
}

fn id_param(id: &RecordId) -> (String, String) {
    ("id".to_string(), format!("eq.{id}"))
}

fn operand(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        other => format!("eq.{}", value_text(other).unwrap_or_else(|| other.to_string())),
    }
}

/// Renders a [`ListQuery`] as PostgREST query parameters.
pub(crate) fn query_params(query: &ListQuery) -> Vec<(String, String)> {
    let mut select = String::from("*");
    for join in &query.joins {
        select.push_str(&format!(
            ",{}:{}!{}(*)",
            join.alias, join.collection, join.foreign_key
        ));
    }

    let mut params = vec![("select".to_string(), select)];
    for filter in &query.filters {
        match filter {
            Filter::Eq { column, value } => params.push((column.clone(), operand(value))),
            Filter::Contains { column, needle } => {
                params.push((column.clone(), format!("ilike.*{needle}*")))
            }
            Filter::AnyEq { columns, value } => {
                let alternatives: Vec<String> = columns
                    .iter()
                    .map(|column| format!("{column}.{}", operand(value)))
                    .collect();
                params.push(("or".to_string(), format!("({})", alternatives.join(","))));
            }
        }
    }
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{direction}", order.column)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn store_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<StoreErrorBody>(body) {
        if let Some(message) = parsed.message.filter(|m| !m.trim().is_empty()) {
            return match parsed.details.or(parsed.hint) {
                Some(extra) if !extra.trim().is_empty() => format!("{message} ({extra})"),
                _ => message,
            };
        }
    }
    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

pub(crate) fn classify_failure(
    status: StatusCode,
    body: &str,
    collection: &str,
    id: Option<&RecordId>,
) -> GatewayError {
    let message = store_message(status, body);
    match (status, id) {
        (StatusCode::NOT_FOUND, Some(id)) => GatewayError::not_found(collection, id),
        (StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS, _) => {
            GatewayError::transport(format!("{status}: {message}"))
        }
        (status, _) if status.is_server_error() => {
            GatewayError::transport(format!("{status}: {message}"))
        }
        _ => GatewayError::constraint(message),
    }
}

#[cfg(test)]
#[path = "tests/rest_tests.rs"]
mod tests;
