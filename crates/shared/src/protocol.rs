use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::Record,
    error::{ErrorKind, GatewayError},
};

/// Read criteria for a gateway `list`. Empty means "every row, store default order".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub joins: Vec<Join>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq { column: String, value: Value },
    /// Case-insensitive substring match on a text column.
    Contains { column: String, needle: String },
    /// At least one of `columns` equals `value`.
    AnyEq { columns: Vec<String>, value: Value },
}

/// Embeds the row of `collection` whose id equals this row's `foreign_key` under `alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub alias: String,
    pub collection: String,
    pub foreign_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn contains(mut self, column: impl Into<String>, needle: impl Into<String>) -> Self {
        self.filters.push(Filter::Contains {
            column: column.into(),
            needle: needle.into(),
        });
        self
    }

    pub fn any_eq<I, S>(mut self, columns: I, value: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.push(Filter::AnyEq {
            columns: columns.into_iter().map(Into::into).collect(),
            value: value.into(),
        });
        self
    }

    pub fn join(
        mut self,
        alias: impl Into<String>,
        collection: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.joins.push(Join {
            alias: alias.into(),
            collection: collection.into(),
            foreign_key: foreign_key.into(),
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Outcome of a write, shaped for direct display: `message` is always user-presentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Record>,
}

impl MutationResult {
    pub fn ok(message: impl Into<String>, data: Option<Record>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

impl From<GatewayError> for MutationResult {
    fn from(err: GatewayError) -> Self {
        Self::failed(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOperation {
    List,
    GetById,
}

/// A read failure the gateway absorbed instead of returning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFailure {
    pub collection: String,
    pub operation: ReadOperation,
    pub kind: ErrorKind,
    pub message: String,
}
