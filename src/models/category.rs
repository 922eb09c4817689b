use serde::{Deserialize, Serialize};

/// User-defined label taxonomy entry tasks may reference.
///
/// Seeded default categories survive a bulk reset; hiding a category removes
/// it from pickers without deleting historical references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_hidden: bool,
    pub created_at: Option<String>,
}
