pub mod category;
pub mod group;
pub mod task;

pub use category::Category;
pub use group::{GroupInvite, GroupMember, GroupRole, GroupSummary};
pub use task::{Task, TaskDraft, TaskPriority, TaskStatus};
