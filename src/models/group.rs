use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Owner,
    Admin,
    Member,
}

impl GroupRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl std::fmt::Display for GroupRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A group the current user belongs to, with their role in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_id: String,
    pub name: String,
    pub color: Option<String>,
    pub role: GroupRole,
}

/// Pending invitation addressed to the current user. The token is the only
/// client-supplied credential when accepting or declining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInvite {
    pub id: String,
    pub token: String,
    pub group_id: String,
    pub group_name: String,
    pub email: String,
    pub expires_at: String,
    pub inviter_email: Option<String>,
    pub inviter_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: GroupRole,
}
