//! HTTP implementation of [`RemoteStore`] against a PostgREST-style API.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::remote::{Filter, FilterOp, Query, RemoteError, RemoteStore, UserIdentity};
use crate::session::SessionContext;

#[derive(Clone, Debug)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
}

impl RestConfig {
    pub fn new_from_env() -> Result<Self, RemoteError> {
        let base_url = env::var("TASKDECK_API_URL")
            .map_err(|_| RemoteError::Service("TASKDECK_API_URL is not set".to_string()))?;
        let api_key = env::var("TASKDECK_API_KEY")
            .map_err(|_| RemoteError::Service("TASKDECK_API_KEY is not set".to_string()))?;

        Ok(Self { base_url, api_key })
    }

    /// Like [`new_from_env`](Self::new_from_env), loading `.env` first.
    pub fn new_from_dotenv() -> Result<Self, RemoteError> {
        dotenvy::dotenv().ok();
        Self::new_from_env()
    }
}

pub struct RestStore {
    client: Client,
    config: RestConfig,
    session: Arc<SessionContext>,
}

impl RestStore {
    pub fn new(config: RestConfig, session: Arc<SessionContext>) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .build()
            .map_err(RemoteError::Http)?;
        Ok(Self {
            client,
            config,
            session,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.base_url.trim_end_matches('/'), table)
    }

    fn rpc_url(&self, procedure: &str) -> String {
        format!(
            "{}/rest/v1/rpc/{}",
            self.config.base_url.trim_end_matches('/'),
            procedure
        )
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn read_rows(response: reqwest::Response) -> Result<Vec<Value>, RemoteError> {
        let response = check_status(response).await?;
        let rows: Vec<Value> = response.json().await?;
        Ok(rows)
    }

    async fn read_single_row(response: reqwest::Response) -> Result<Value, RemoteError> {
        let rows = Self::read_rows(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::Service("No rows returned".to_string()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Service(format!("{status}: {body}")))
}

fn filter_pair(filter: &Filter) -> (String, String) {
    let rhs = match filter.op {
        FilterOp::Eq => format!("eq.{}", value_text(&filter.value)),
        FilterOp::IsNull => "is.null".to_string(),
        FilterOp::In => {
            let items = filter
                .value
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .map(value_text)
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_default();
            format!("in.({items})")
        }
    };
    (filter.field.clone(), rhs)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Writes carry a `select` pair too, so the service returns the written row
/// shaped like a query result (embedded joins included).
fn select_pair(select: &[&str]) -> Option<(String, String)> {
    if select.is_empty() {
        None
    } else {
        Some(("select".to_string(), select.join(",")))
    }
}

fn query_pairs(query: &Query) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if !query.select.is_empty() {
        pairs.push(("select".to_string(), query.select.join(",")));
    }
    for filter in &query.filters {
        pairs.push(filter_pair(filter));
    }
    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|o| {
                format!(
                    "{}.{}",
                    o.field,
                    if o.ascending { "asc" } else { "desc" }
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        pairs.push(("order".to_string(), order));
    }
    pairs
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn query(&self, table: &str, query: Query) -> Result<Vec<Value>, RemoteError> {
        let req = self
            .authorized(self.client.get(self.table_url(table)))
            .query(&query_pairs(&query));
        Self::read_rows(req.send().await?).await
    }

    async fn insert(
        &self,
        table: &str,
        row: Value,
        select: &[&str],
    ) -> Result<Value, RemoteError> {
        let pairs: Vec<(String, String)> = select_pair(select).into_iter().collect();
        let req = self
            .authorized(self.client.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(&pairs)
            .json(&Value::Array(vec![row]));
        Self::read_single_row(req.send().await?).await
    }

    async fn update(
        &self,
        table: &str,
        patch: Value,
        filters: Vec<Filter>,
        select: &[&str],
    ) -> Result<Value, RemoteError> {
        let mut pairs: Vec<(String, String)> = filters.iter().map(filter_pair).collect();
        pairs.extend(select_pair(select));
        let req = self
            .authorized(self.client.patch(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(&pairs)
            .json(&patch);
        Self::read_single_row(req.send().await?).await
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<(), RemoteError> {
        let pairs: Vec<(String, String)> = filters.iter().map(filter_pair).collect();
        let req = self
            .authorized(self.client.delete(self.table_url(table)))
            .query(&pairs);
        check_status(req.send().await?).await?;
        Ok(())
    }

    async fn call(&self, procedure: &str, args: Value) -> Result<Value, RemoteError> {
        let req = self
            .authorized(self.client.post(self.rpc_url(procedure)))
            .json(&args);
        let response = check_status(req.send().await?).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn current_user(&self) -> Result<Option<UserIdentity>, RemoteError> {
        Ok(self.session.current())
    }
}
