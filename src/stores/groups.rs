//! Group membership, invitations, and role state. Groups, invites, and
//! members are independent collections joined by identifier lookup; member
//! lists are cached per group and invalidated only by explicit force or
//! group deletion.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{error, warn};

use crate::error::StoreError;
use crate::models::{GroupInvite, GroupMember, GroupRole, GroupSummary};
use crate::remote::{Filter, Order, Query, RemoteError, RemoteStore};
use crate::stores::InflightGuard;

const GROUPS_TABLE: &str = "groups";
const MEMBERS_TABLE: &str = "group_members";

/// Default invite expiry window the service is asked to enforce.
const INVITE_EXPIRES_IN_HOURS: i64 = 168;

#[derive(Debug, Deserialize)]
struct MembershipRow {
    role: String,
    group_id: String,
}

#[derive(Debug, Deserialize)]
struct GroupRow {
    id: String,
    name: String,
    color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InviteRow {
    id: String,
    token: String,
    group_id: String,
    group_name: Option<String>,
    email: String,
    expires_at: String,
    inviter_email: Option<String>,
    inviter_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MemberRow {
    user_id: String,
    email: Option<String>,
    name: Option<String>,
    full_name: Option<String>,
    role: String,
}

pub struct GroupStore {
    remote: Arc<dyn RemoteStore>,
    groups: Vec<GroupSummary>,
    invites: Vec<GroupInvite>,
    members_by_group: HashMap<String, Vec<GroupMember>>,
    is_loading: bool,
    error: Option<String>,
    inflight: InflightGuard,
}

impl GroupStore {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            groups: Vec::new(),
            invites: Vec::new(),
            members_by_group: HashMap::new(),
            is_loading: false,
            error: None,
            inflight: InflightGuard::default(),
        }
    }

    pub fn groups(&self) -> &[GroupSummary] {
        &self.groups
    }

    pub fn invites(&self) -> &[GroupInvite] {
        &self.invites
    }

    pub fn cached_members(&self, group_id: &str) -> Option<&[GroupMember]> {
        self.members_by_group.get(group_id).map(Vec::as_slice)
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Current user's groups with role and display color. Membership rows and
    /// group rows are fetched separately and joined client-side by id.
    pub async fn fetch_groups(&mut self) -> bool {
        self.error = None;
        self.is_loading = true;
        let outcome = self.fetch_groups_inner().await;
        self.is_loading = false;

        match outcome {
            Ok(groups) => {
                self.groups = groups;
                true
            }
            Err(e) => {
                error!("fetch groups failed: {e}");
                self.error = Some(e.to_string());
                self.groups.clear();
                false
            }
        }
    }

    async fn fetch_groups_inner(&self) -> Result<Vec<GroupSummary>, StoreError> {
        let user = self
            .remote
            .current_user()
            .await?
            .ok_or(StoreError::AuthenticationRequired)?;

        let membership_rows = self
            .remote
            .query(
                MEMBERS_TABLE,
                Query::select(&["role", "group_id"])
                    .filter(Filter::eq("user_id", user.id))
                    .order_by(Order::desc("created_at")),
            )
            .await?;

        let mut group_ids: Vec<String> = Vec::new();
        let mut role_by_group: HashMap<String, GroupRole> = HashMap::new();
        for row in membership_rows {
            let row: MembershipRow = match serde_json::from_value(row) {
                Ok(row) => row,
                Err(e) => {
                    warn!("skipping malformed membership row: {e}");
                    continue;
                }
            };
            let Some(role) = GroupRole::parse(&row.role) else {
                warn!("skipping membership with unknown role: {}", row.role);
                continue;
            };
            // First membership per group wins, matching the query order.
            if !role_by_group.contains_key(&row.group_id) {
                group_ids.push(row.group_id.clone());
                role_by_group.insert(row.group_id, role);
            }
        }

        if group_ids.is_empty() {
            return Ok(Vec::new());
        }

        let group_rows = self
            .remote
            .query(
                GROUPS_TABLE,
                Query::select(&["id", "name", "color"])
                    .filter(Filter::any_of("id", group_ids.clone())),
            )
            .await?;

        let mut by_id: HashMap<String, GroupRow> = HashMap::new();
        for row in group_rows {
            match serde_json::from_value::<GroupRow>(row) {
                Ok(row) => {
                    by_id.insert(row.id.clone(), row);
                }
                Err(e) => warn!("skipping malformed group row: {e}"),
            }
        }

        Ok(group_ids
            .into_iter()
            .filter_map(|id| {
                let row = by_id.remove(&id)?;
                let role = role_by_group.get(&id).copied()?;
                Some(GroupSummary {
                    group_id: id,
                    name: row.name,
                    color: row.color,
                    role,
                })
            })
            .collect())
    }

    /// Pending invites addressed to the current user.
    pub async fn fetch_invites(&mut self) -> bool {
        self.error = None;
        self.is_loading = true;
        let outcome = self.remote.call("get_my_group_invites", json!({})).await;
        self.is_loading = false;

        let rows = match outcome {
            Ok(Value::Array(rows)) => rows,
            Ok(_) => Vec::new(),
            Err(e) => {
                error!("fetch invites failed: {e}");
                self.error = Some(e.to_string());
                self.invites.clear();
                return false;
            }
        };

        let mut invites = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<InviteRow>(row) {
                Ok(row) => invites.push(GroupInvite {
                    id: row.id,
                    token: row.token,
                    group_id: row.group_id,
                    group_name: row.group_name.unwrap_or_else(|| "Unknown".to_string()),
                    email: row.email,
                    expires_at: row.expires_at,
                    inviter_name: row.inviter_name.clone().or_else(|| row.inviter_email.clone()),
                    inviter_email: row.inviter_email,
                }),
                Err(e) => warn!("skipping malformed invite row: {e}"),
            }
        }
        self.invites = invites;
        true
    }

    /// Creates a group through the service procedure (which also seeds the
    /// owner membership) and refreshes the groups list. Returns the new
    /// group's identifier.
    pub async fn create_group(&mut self, name: &str, color: Option<&str>) -> Result<String, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return self.fail(StoreError::Validation("Name is required".to_string()));
        }
        if !self.inflight.begin("group.create") {
            return Err(StoreError::InFlight);
        }

        let args = json!({ "p_name": name, "p_color": color });
        let outcome = self.remote.call("create_group", args).await;
        self.inflight.end("group.create");

        let group_id = match outcome {
            Ok(value) => match value.as_str() {
                Some(id) => id.to_string(),
                None => {
                    return self.fail(
                        RemoteError::Service("create_group returned no id".to_string()).into(),
                    );
                }
            },
            Err(e) => return self.fail(e.into()),
        };

        self.fetch_groups().await;
        Ok(group_id)
    }

    /// Issues an invite; the service enforces the expiry window. Returns the
    /// invite token.
    pub async fn create_invite(&mut self, group_id: &str, email: &str) -> Result<String, StoreError> {
        let key = format!("invite.create:{group_id}");
        if !self.inflight.begin(&key) {
            return Err(StoreError::InFlight);
        }

        let args = json!({
            "p_group_id": group_id,
            "p_email": email,
            "p_expires_in_hours": INVITE_EXPIRES_IN_HOURS,
        });
        let outcome = self.remote.call("create_group_invite", args).await;
        self.inflight.end(&key);

        match outcome {
            Ok(value) => match value.get("token").and_then(Value::as_str) {
                Some(token) => Ok(token.to_string()),
                None => self.fail(
                    RemoteError::Service("create_group_invite returned no token".to_string())
                        .into(),
                ),
            },
            Err(e) => self.fail(e.into()),
        }
    }

    /// Accepting consumes the invite server-side; both invites and
    /// memberships are refreshed afterward.
    pub async fn accept_invite(&mut self, token: &str) -> bool {
        self.invite_response("accept_group_invite", token).await
    }

    pub async fn decline_invite(&mut self, token: &str) -> bool {
        self.invite_response("decline_group_invite", token).await
    }

    async fn invite_response(&mut self, procedure: &str, token: &str) -> bool {
        self.error = None;
        let key = format!("invite.respond:{token}");
        if !self.inflight.begin(&key) {
            return false;
        }
        let outcome = self.remote.call(procedure, json!({ "p_token": token })).await;
        self.inflight.end(&key);

        match outcome {
            Ok(_) => {
                self.fetch_groups().await;
                self.fetch_invites().await;
                true
            }
            Err(e) => {
                error!("{procedure} failed: {e}");
                self.error = Some(e.to_string());
                false
            }
        }
    }

    /// Deletes the group remotely; on success drops the group and its cached
    /// member list.
    pub async fn delete_group(&mut self, group_id: &str) -> bool {
        self.error = None;
        let key = format!("group.delete:{group_id}");
        if !self.inflight.begin(&key) {
            return false;
        }
        let outcome = self
            .remote
            .delete(GROUPS_TABLE, vec![Filter::eq("id", group_id)])
            .await;
        self.inflight.end(&key);

        match outcome {
            Ok(()) => {
                self.groups.retain(|g| g.group_id != group_id);
                self.members_by_group.remove(group_id);
                true
            }
            Err(e) => {
                error!("delete group failed: {e}");
                self.error = Some(e.to_string());
                false
            }
        }
    }

    /// Member list for a group, served from the per-group cache unless it is
    /// empty or `force` is set. The cache is never invalidated on a timer.
    pub async fn fetch_members(
        &mut self,
        group_id: &str,
        force: bool,
    ) -> Result<Vec<GroupMember>, StoreError> {
        if !force {
            if let Some(cached) = self.members_by_group.get(group_id) {
                if !cached.is_empty() {
                    return Ok(cached.clone());
                }
            }
        }

        let outcome = self
            .remote
            .call("get_group_members", json!({ "p_group_id": group_id }))
            .await;
        let rows = match outcome {
            Ok(Value::Array(rows)) => rows,
            Ok(_) => Vec::new(),
            Err(e) => return self.fail(e.into()),
        };

        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<MemberRow>(row) {
                Ok(row) => {
                    let Some(role) = GroupRole::parse(&row.role) else {
                        warn!("skipping member with unknown role: {}", row.role);
                        continue;
                    };
                    members.push(GroupMember {
                        user_id: row.user_id,
                        email: row.email,
                        name: row.name.or(row.full_name),
                        role,
                    });
                }
                Err(e) => warn!("skipping malformed member row: {e}"),
            }
        }

        self.members_by_group
            .insert(group_id.to_string(), members.clone());
        Ok(members)
    }

    /// Partial patch: only supplied fields are sent and locally applied.
    pub async fn update_group(
        &mut self,
        group_id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<(), StoreError> {
        let name = name.map(str::trim);
        if name.is_some_and(str::is_empty) {
            return self.fail(StoreError::Validation("Name is required".to_string()));
        }
        if name.is_none() && color.is_none() {
            return Ok(());
        }

        let key = format!("group.update:{group_id}");
        if !self.inflight.begin(&key) {
            return Err(StoreError::InFlight);
        }

        let mut args = Map::new();
        args.insert("p_group_id".to_string(), Value::String(group_id.to_string()));
        if let Some(name) = name {
            args.insert("p_name".to_string(), Value::String(name.to_string()));
        }
        if let Some(color) = color {
            args.insert("p_color".to_string(), Value::String(color.to_string()));
        }
        let outcome = self.remote.call("update_group", Value::Object(args)).await;
        self.inflight.end(&key);

        if let Err(e) = outcome {
            return self.fail(e.into());
        }

        if let Some(group) = self.groups.iter_mut().find(|g| g.group_id == group_id) {
            if let Some(name) = name {
                group.name = name.to_string();
            }
            if let Some(color) = color {
                group.color = Some(color.to_string());
            }
        }
        Ok(())
    }

    pub async fn rename_group(&mut self, group_id: &str, name: &str) -> Result<(), StoreError> {
        self.update_group(group_id, Some(name), None).await
    }

    /// Patches the cached member list in place, then reconciles the groups
    /// list: the current user's own role may have changed.
    pub async fn set_member_role(
        &mut self,
        group_id: &str,
        user_id: &str,
        role: GroupRole,
    ) -> Result<(), StoreError> {
        let key = format!("group.role:{group_id}:{user_id}");
        if !self.inflight.begin(&key) {
            return Err(StoreError::InFlight);
        }
        let args = json!({
            "p_group_id": group_id,
            "p_user_id": user_id,
            "p_role": role,
        });
        let outcome = self.remote.call("set_group_member_role", args).await;
        self.inflight.end(&key);

        if let Err(e) = outcome {
            return self.fail(e.into());
        }

        if let Some(members) = self.members_by_group.get_mut(group_id) {
            if let Some(member) = members.iter_mut().find(|m| m.user_id == user_id) {
                member.role = role;
            }
        }
        self.fetch_groups().await;
        Ok(())
    }

    /// Single atomic remote operation: two roles change server-side with no
    /// window of zero or two owners. Local state is reconciled by refetching
    /// rather than patched optimistically.
    pub async fn transfer_ownership(
        &mut self,
        group_id: &str,
        new_owner_id: &str,
    ) -> Result<(), StoreError> {
        let key = format!("group.transfer:{group_id}");
        if !self.inflight.begin(&key) {
            return Err(StoreError::InFlight);
        }
        let args = json!({
            "p_group_id": group_id,
            "p_new_owner_id": new_owner_id,
        });
        let outcome = self.remote.call("transfer_group_ownership", args).await;
        self.inflight.end(&key);

        if let Err(e) = outcome {
            return self.fail(e.into());
        }

        self.fetch_groups().await;
        let _ = self.fetch_members(group_id, true).await;
        Ok(())
    }

    fn fail<T>(&mut self, e: StoreError) -> Result<T, StoreError> {
        error!("group operation failed: {e}");
        self.error = Some(e.to_string());
        Err(e)
    }
}
