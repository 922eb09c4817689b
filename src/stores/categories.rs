//! User-defined category taxonomy. Hiding is a soft delete that keeps
//! historical references valid; a bulk reset removes only non-default rows.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, warn};

use crate::error::StoreError;
use crate::models::Category;
use crate::remote::{Filter, Order, Query, RemoteError, RemoteStore};
use crate::stores::InflightGuard;

const CATEGORIES_TABLE: &str = "categories";

pub struct CategoryStore {
    remote: Arc<dyn RemoteStore>,
    categories: Vec<Category>,
    is_loading: bool,
    error: Option<String>,
    inflight: InflightGuard,
}

impl CategoryStore {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            categories: Vec::new(),
            is_loading: false,
            error: None,
            inflight: InflightGuard::default(),
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Categories offered in pickers: hidden ones are filtered out.
    pub fn visible(&self) -> Vec<&Category> {
        self.categories.iter().filter(|c| !c.is_hidden).collect()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Seeded defaults first, then creation order.
    pub async fn fetch(&mut self) -> bool {
        self.error = None;
        self.is_loading = true;

        let query = Query::select(&[
            "id",
            "name",
            "color",
            "icon",
            "is_default",
            "is_hidden",
            "created_at",
        ])
        .order_by(Order::desc("is_default"))
        .order_by(Order::asc("created_at"));

        let outcome = self.remote.query(CATEGORIES_TABLE, query).await;
        self.is_loading = false;

        match outcome {
            Ok(rows) => {
                let mut categories = Vec::with_capacity(rows.len());
                for row in rows {
                    match serde_json::from_value::<Category>(row) {
                        Ok(category) => categories.push(category),
                        Err(e) => warn!("skipping malformed category row: {e}"),
                    }
                }
                self.categories = categories;
                true
            }
            Err(e) => {
                error!("fetch categories failed: {e}");
                self.error = Some(e.to_string());
                self.categories.clear();
                false
            }
        }
    }

    pub async fn create(&mut self, name: &str) -> bool {
        self.error = None;
        let name = name.trim();
        if name.is_empty() {
            self.error = Some(StoreError::Validation("Name is required".to_string()).to_string());
            return false;
        }
        if !self.inflight.begin("category.create") {
            return false;
        }
        let outcome = self
            .remote
            .insert(CATEGORIES_TABLE, json!({ "name": name }), &[])
            .await;
        self.inflight.end("category.create");
        self.settle_and_refresh(outcome.map(|_| ())).await
    }

    pub async fn rename(&mut self, id: &str, name: &str) -> bool {
        self.error = None;
        let name = name.trim();
        if name.is_empty() {
            self.error = Some(StoreError::Validation("Name is required".to_string()).to_string());
            return false;
        }
        let key = format!("category.rename:{id}");
        if !self.inflight.begin(&key) {
            return false;
        }
        let outcome = self
            .remote
            .update(
                CATEGORIES_TABLE,
                json!({ "name": name }),
                vec![Filter::eq("id", id)],
                &[],
            )
            .await;
        self.inflight.end(&key);
        self.settle_and_refresh(outcome.map(|_| ())).await
    }

    pub async fn remove(&mut self, id: &str) -> bool {
        self.error = None;
        let key = format!("category.remove:{id}");
        if !self.inflight.begin(&key) {
            return false;
        }
        let outcome = self
            .remote
            .delete(CATEGORIES_TABLE, vec![Filter::eq("id", id)])
            .await;
        self.inflight.end(&key);
        self.settle_and_refresh(outcome).await
    }

    pub async fn set_hidden(&mut self, id: &str, hidden: bool) -> bool {
        self.error = None;
        let key = format!("category.hide:{id}");
        if !self.inflight.begin(&key) {
            return false;
        }
        let outcome = self
            .remote
            .update(
                CATEGORIES_TABLE,
                json!({ "is_hidden": hidden }),
                vec![Filter::eq("id", id)],
                &[],
            )
            .await;
        self.inflight.end(&key);
        self.settle_and_refresh(outcome.map(|_| ())).await
    }

    /// Deletes every non-default category; the seeded defaults survive.
    pub async fn reset_to_default(&mut self) -> bool {
        self.error = None;
        if !self.inflight.begin("category.reset") {
            return false;
        }
        let outcome = self
            .remote
            .delete(CATEGORIES_TABLE, vec![Filter::eq("is_default", false)])
            .await;
        self.inflight.end("category.reset");
        self.settle_and_refresh(outcome).await
    }

    async fn settle_and_refresh(&mut self, outcome: Result<(), RemoteError>) -> bool {
        match outcome {
            Ok(()) => {
                self.fetch().await;
                true
            }
            Err(e) => {
                error!("category mutation failed: {e}");
                self.error = Some(e.to_string());
                false
            }
        }
    }
}
