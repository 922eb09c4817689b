//! In-memory implementation of [`RemoteStore`] for tests and offline
//! development. Tables are plain JSON rows; the group surface procedures are
//! implemented with the same invariants the real service enforces (atomic
//! ownership transfer, invite consumption, membership cascade on group
//! delete). A single-shot failure can be queued to exercise error paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::remote::{Filter, FilterOp, Order, Query, RemoteError, RemoteStore, UserIdentity};
use crate::session::SessionContext;

pub struct MemoryStore {
    session: Arc<SessionContext>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Value>>,
    fail_next: Option<String>,
    seq: u64,
}

impl MemoryStore {
    pub fn new(session: Arc<SessionContext>) -> Self {
        Self {
            session,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Makes the next operation fail with the given service message.
    pub fn queue_failure(&self, message: &str) {
        self.lock().fail_next = Some(message.to_string());
    }

    /// Preloads rows into a table, assigning ids and creation order where
    /// absent.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut inner = self.lock();
        for row in rows {
            let row = inner.stamp(row);
            inner.tables.entry(table.to_string()).or_default().push(row);
        }
    }

    /// Snapshot of a table's rows, for assertions.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn identity(&self) -> Result<UserIdentity, RemoteError> {
        self.session
            .current()
            .ok_or_else(|| RemoteError::Service("Not authenticated".to_string()))
    }
}

impl Inner {
    fn take_failure(&mut self) -> Result<(), RemoteError> {
        match self.fail_next.take() {
            Some(message) => Err(RemoteError::Service(message)),
            None => Ok(()),
        }
    }

    /// Fills server-assigned fields: identifier and a monotonic creation
    /// stamp (zero-padded so lexicographic order matches insertion order).
    fn stamp(&mut self, row: Value) -> Value {
        let mut obj = match row {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        obj.entry("id".to_string())
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        self.seq += 1;
        obj.entry("created_at".to_string())
            .or_insert_with(|| Value::String(format!("{:016}", self.seq)));
        Value::Object(obj)
    }

    fn table(&mut self, name: &str) -> &mut Vec<Value> {
        self.tables.entry(name.to_string()).or_default()
    }

    fn group_name(&self, group_id: &str) -> Option<String> {
        self.tables.get("groups")?.iter().find_map(|g| {
            if field_str(g, "id") == Some(group_id) {
                field_str(g, "name").map(str::to_string)
            } else {
                None
            }
        })
    }

    /// Resolves the `groups(name)` join a select list can request, on reads
    /// and on written rows alike.
    fn with_group_embed(&self, mut row: Value, embed: bool) -> Value {
        if !embed {
            return row;
        }
        let joined = match field_str(&row, "group_id").and_then(|id| self.group_name(id)) {
            Some(name) => json!({ "name": name }),
            None => Value::Null,
        };
        if let Value::Object(obj) = &mut row {
            obj.insert("groups".to_string(), joined);
        }
        row
    }
}

fn wants_group_embed<S: AsRef<str>>(select: &[S]) -> bool {
    select.iter().any(|f| f.as_ref() == "groups(name)")
}

fn field_str<'a>(row: &'a Value, field: &str) -> Option<&'a str> {
    row.get(field).and_then(Value::as_str)
}

fn matches_filter(row: &Value, filter: &Filter) -> bool {
    let field = row.get(&filter.field).unwrap_or(&Value::Null);
    match filter.op {
        FilterOp::Eq => field == &filter.value,
        FilterOp::IsNull => field.is_null(),
        FilterOp::In => filter
            .value
            .as_array()
            .is_some_and(|arr| arr.contains(field)),
    }
}

fn matches_all(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches_filter(row, f))
}

fn compare_fields(a: &Value, b: &Value, order: &Order) -> std::cmp::Ordering {
    let av = a.get(&order.field).unwrap_or(&Value::Null);
    let bv = b.get(&order.field).unwrap_or(&Value::Null);
    let ord = match (av, bv) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(std::cmp::Ordering::Equal),
        (Value::Null, Value::Null) => std::cmp::Ordering::Equal,
        (Value::Null, _) => std::cmp::Ordering::Less,
        (_, Value::Null) => std::cmp::Ordering::Greater,
        _ => std::cmp::Ordering::Equal,
    };
    if order.ascending { ord } else { ord.reverse() }
}

fn arg_str(args: &Value, key: &str) -> Result<String, RemoteError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::Service(format!("Missing argument: {key}")))
}

fn apply_patch(row: &mut Value, patch: &Value) {
    if let (Value::Object(row), Value::Object(patch)) = (row, patch) {
        for (key, value) in patch {
            row.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn query(&self, table: &str, query: Query) -> Result<Vec<Value>, RemoteError> {
        let mut inner = self.lock();
        inner.take_failure()?;

        let mut rows: Vec<Value> = inner
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for order in query.order.iter().rev() {
            rows.sort_by(|a, b| compare_fields(a, b, order));
        }
        let embed = wants_group_embed(&query.select);
        Ok(rows
            .into_iter()
            .map(|row| inner.with_group_embed(row, embed))
            .collect())
    }

    async fn insert(
        &self,
        table: &str,
        row: Value,
        select: &[&str],
    ) -> Result<Value, RemoteError> {
        let mut inner = self.lock();
        inner.take_failure()?;

        let row = inner.stamp(row);
        inner.table(table).push(row.clone());
        Ok(inner.with_group_embed(row, wants_group_embed(select)))
    }

    async fn update(
        &self,
        table: &str,
        patch: Value,
        filters: Vec<Filter>,
        select: &[&str],
    ) -> Result<Value, RemoteError> {
        let mut inner = self.lock();
        inner.take_failure()?;

        let mut written = None;
        for row in inner.table(table).iter_mut() {
            if matches_all(row, &filters) {
                apply_patch(row, &patch);
                if written.is_none() {
                    written = Some(row.clone());
                }
            }
        }
        written
            .map(|row| inner.with_group_embed(row, wants_group_embed(select)))
            .ok_or_else(|| RemoteError::Service("No rows matched the update".to_string()))
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner.take_failure()?;

        let removed: Vec<Value> = {
            let rows = inner.table(table);
            let (gone, kept): (Vec<Value>, Vec<Value>) =
                rows.drain(..).partition(|row| matches_all(row, &filters));
            *rows = kept;
            gone
        };

        // The real service cascades memberships and invites when a group row
        // goes away.
        if table == "groups" {
            let gone_ids: Vec<Value> = removed
                .iter()
                .filter_map(|g| g.get("id").cloned())
                .collect();
            for dependent in ["group_members", "group_invites"] {
                inner
                    .table(dependent)
                    .retain(|row| match row.get("group_id") {
                        Some(id) => !gone_ids.contains(id),
                        None => true,
                    });
            }
        }
        Ok(())
    }

    async fn call(&self, procedure: &str, args: Value) -> Result<Value, RemoteError> {
        // Every group procedure runs as the caller.
        let user = self.identity()?;
        let mut inner = self.lock();
        inner.take_failure()?;

        match procedure {
            "create_group" => {
                let name = arg_str(&args, "p_name")?;
                let color = args.get("p_color").cloned().unwrap_or(Value::Null);
                let group = inner.stamp(json!({ "name": name, "color": color }));
                let group_id = field_str(&group, "id").unwrap_or_default().to_string();
                inner.table("groups").push(group);
                let membership = inner.stamp(json!({
                    "group_id": group_id,
                    "user_id": user.id,
                    "email": user.email,
                    "name": Value::Null,
                    "role": "owner",
                }));
                inner.table("group_members").push(membership);
                Ok(Value::String(group_id))
            }

            "update_group" => {
                let group_id = arg_str(&args, "p_group_id")?;
                let mut patch = Map::new();
                if let Some(name) = args.get("p_name").and_then(Value::as_str) {
                    patch.insert("name".to_string(), Value::String(name.to_string()));
                }
                if let Some(color) = args.get("p_color").and_then(Value::as_str) {
                    patch.insert("color".to_string(), Value::String(color.to_string()));
                }
                let patch = Value::Object(patch);
                let mut found = false;
                for row in inner.table("groups").iter_mut() {
                    if field_str(row, "id") == Some(group_id.as_str()) {
                        apply_patch(row, &patch);
                        found = true;
                    }
                }
                if !found {
                    return Err(RemoteError::Service("Group not found".to_string()));
                }
                Ok(Value::Null)
            }

            "create_group_invite" => {
                let group_id = arg_str(&args, "p_group_id")?;
                let email = arg_str(&args, "p_email")?;
                let hours = args
                    .get("p_expires_in_hours")
                    .and_then(Value::as_i64)
                    .unwrap_or(168);
                let group_name = inner
                    .group_name(&group_id)
                    .ok_or_else(|| RemoteError::Service("Group not found".to_string()))?;
                let token = Uuid::new_v4().to_string();
                let expires_at = (Utc::now() + Duration::hours(hours)).to_rfc3339();
                let invite = inner.stamp(json!({
                    "token": token,
                    "group_id": group_id,
                    "group_name": group_name,
                    "email": email,
                    "expires_at": expires_at,
                    "inviter_email": user.email,
                    "inviter_name": Value::Null,
                }));
                inner.table("group_invites").push(invite);
                Ok(json!({ "token": token }))
            }

            "get_my_group_invites" => {
                let invites: Vec<Value> = inner
                    .table("group_invites")
                    .iter()
                    .filter(|row| field_str(row, "email") == Some(user.email.as_str()))
                    .cloned()
                    .collect();
                Ok(Value::Array(invites))
            }

            "accept_group_invite" => {
                let token = arg_str(&args, "p_token")?;
                let invites = inner.table("group_invites");
                let position = invites
                    .iter()
                    .position(|row| field_str(row, "token") == Some(token.as_str()))
                    .ok_or_else(|| RemoteError::Service("Invite not found".to_string()))?;
                let invite = invites.remove(position);
                let group_id = field_str(&invite, "group_id").unwrap_or_default().to_string();
                let membership = inner.stamp(json!({
                    "group_id": group_id,
                    "user_id": user.id,
                    "email": user.email,
                    "name": Value::Null,
                    "role": "member",
                }));
                inner.table("group_members").push(membership);
                Ok(Value::Null)
            }

            "decline_group_invite" => {
                let token = arg_str(&args, "p_token")?;
                let invites = inner.table("group_invites");
                let position = invites
                    .iter()
                    .position(|row| field_str(row, "token") == Some(token.as_str()))
                    .ok_or_else(|| RemoteError::Service("Invite not found".to_string()))?;
                invites.remove(position);
                Ok(Value::Null)
            }

            "get_group_members" => {
                let group_id = arg_str(&args, "p_group_id")?;
                let members: Vec<Value> = inner
                    .table("group_members")
                    .iter()
                    .filter(|row| field_str(row, "group_id") == Some(group_id.as_str()))
                    .map(|row| {
                        json!({
                            "user_id": row.get("user_id").cloned().unwrap_or(Value::Null),
                            "email": row.get("email").cloned().unwrap_or(Value::Null),
                            "name": row.get("name").cloned().unwrap_or(Value::Null),
                            "role": row.get("role").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect();
                Ok(Value::Array(members))
            }

            "set_group_member_role" => {
                let group_id = arg_str(&args, "p_group_id")?;
                let user_id = arg_str(&args, "p_user_id")?;
                let role = arg_str(&args, "p_role")?;
                let member = inner
                    .table("group_members")
                    .iter_mut()
                    .find(|row| {
                        field_str(row, "group_id") == Some(group_id.as_str())
                            && field_str(row, "user_id") == Some(user_id.as_str())
                    })
                    .ok_or_else(|| RemoteError::Service("Member not found".to_string()))?;
                apply_patch(member, &json!({ "role": role }));
                Ok(Value::Null)
            }

            "transfer_group_ownership" => {
                let group_id = arg_str(&args, "p_group_id")?;
                let new_owner_id = arg_str(&args, "p_new_owner_id")?;
                let members = inner.table("group_members");
                if !members.iter().any(|row| {
                    field_str(row, "group_id") == Some(group_id.as_str())
                        && field_str(row, "user_id") == Some(new_owner_id.as_str())
                }) {
                    return Err(RemoteError::Service("New owner is not a member".to_string()));
                }
                // Both role changes happen under the same lock: there is
                // never a window with zero or two owners.
                for row in members.iter_mut() {
                    if field_str(row, "group_id") != Some(group_id.as_str()) {
                        continue;
                    }
                    if field_str(row, "user_id") == Some(new_owner_id.as_str()) {
                        apply_patch(row, &json!({ "role": "owner" }));
                    } else if field_str(row, "role") == Some("owner") {
                        apply_patch(row, &json!({ "role": "admin" }));
                    }
                }
                Ok(Value::Null)
            }

            other => Err(RemoteError::Service(format!("Unknown procedure: {other}"))),
        }
    }

    async fn current_user(&self) -> Result<Option<UserIdentity>, RemoteError> {
        Ok(self.session.current())
    }
}
