//! Abstract contract of the remote persistence service: filterable row
//! queries, row CRUD returning the written row, and named procedure calls for
//! operations with server-side invariants (group creation, invites, role
//! changes, ownership transfer).

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use rest::{RestConfig, RestStore};

/// The authenticated identity, resolved fresh per operation that needs one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The service rejected the operation; carries its message verbatim.
    #[error("{0}")]
    Service(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    In,
    IsNull,
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn is_null(field: &str) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::IsNull,
            value: Value::Null,
        }
    }

    pub fn any_of(field: &str, values: Vec<String>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::In,
            value: Value::Array(values.into_iter().map(Value::String).collect()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub field: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: true,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub select: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
}

impl Query {
    pub fn select(fields: &[&str]) -> Self {
        Self {
            select: fields.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }
}

/// Table-oriented persistence service consumed by the stores.
///
/// Rows travel as loose JSON values; the mapping layer is the single place
/// they are decoded into typed shapes.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn query(&self, table: &str, query: Query) -> Result<Vec<Value>, RemoteError>;

    /// Inserts one row and returns it as written, including server-assigned
    /// fields. A non-empty `select` shapes the returned row the same way a
    /// query's field list would, embedded joins included.
    async fn insert(
        &self,
        table: &str,
        row: Value,
        select: &[&str],
    ) -> Result<Value, RemoteError>;

    /// Applies a partial patch to the rows matching `filters` and returns the
    /// first written row, shaped by `select` like [`insert`](Self::insert);
    /// an empty match is a service error.
    async fn update(
        &self,
        table: &str,
        patch: Value,
        filters: Vec<Filter>,
        select: &[&str],
    ) -> Result<Value, RemoteError>;

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<(), RemoteError>;

    /// Named procedure call with typed-by-convention named arguments.
    async fn call(&self, procedure: &str, args: Value) -> Result<Value, RemoteError>;

    async fn current_user(&self) -> Result<Option<UserIdentity>, RemoteError>;
}
