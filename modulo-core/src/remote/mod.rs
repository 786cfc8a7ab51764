pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::patch::Patch;
use crate::types::{Board, Card, Column, Note, Priority, Subtask, Tag, Workspace};

pub use memory::MemoryService;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// The asynchronous persistence backend the engine confirms mutations against.
///
/// Create/update operations that return `()` are fire-and-forget: the
/// speculative entity stays authoritative until the next refresh.
#[async_trait]
pub trait RemoteService: Send + Sync {
    // Bulk loaders
    async fn load_workspaces(&self) -> RemoteResult<Vec<Workspace>>;
    async fn load_boards(&self) -> RemoteResult<Vec<Board>>;
    async fn load_columns(&self, board_id: &str) -> RemoteResult<Vec<Column>>;
    async fn load_cards(&self, board_id: &str) -> RemoteResult<Vec<Card>>;
    async fn load_tags(&self, board_id: &str) -> RemoteResult<Vec<Tag>>;
    async fn load_notes(&self, board_id: &str) -> RemoteResult<Vec<Note>>;

    // Workspaces
    async fn create_workspace(&self, req: CreateWorkspace) -> RemoteResult<Workspace>;
    async fn update_workspace(&self, req: UpdateWorkspace) -> RemoteResult<()>;
    async fn delete_workspace(&self, id: &str) -> RemoteResult<()>;

    // Boards
    async fn create_board(&self, req: CreateBoard) -> RemoteResult<()>;
    async fn update_board(&self, req: UpdateBoard) -> RemoteResult<()>;
    async fn delete_board(&self, id: &str) -> RemoteResult<()>;

    // Columns
    async fn create_column(&self, req: CreateColumn) -> RemoteResult<()>;
    async fn move_column(&self, req: MoveColumn) -> RemoteResult<()>;
    async fn update_column(&self, req: UpdateColumn) -> RemoteResult<()>;
    async fn delete_column(&self, id: &str, board_id: &str) -> RemoteResult<()>;

    // Cards
    async fn create_card(&self, req: CreateCard) -> RemoteResult<()>;
    async fn update_card(&self, req: UpdateCard) -> RemoteResult<()>;
    async fn delete_card(&self, id: &str, board_id: &str) -> RemoteResult<()>;
    async fn move_card(&self, req: MoveCard) -> RemoteResult<()>;

    // Subtasks
    async fn create_subtask(&self, req: CreateSubtask) -> RemoteResult<Subtask>;
    async fn update_subtask(&self, req: UpdateSubtask) -> RemoteResult<Subtask>;
    async fn delete_subtask(&self, req: DeleteSubtask) -> RemoteResult<()>;

    // Tags
    async fn create_tag(&self, req: CreateTag) -> RemoteResult<Tag>;
    async fn update_tag(&self, req: UpdateTag) -> RemoteResult<Tag>;
    async fn delete_tag(&self, id: &str, board_id: &str) -> RemoteResult<()>;
    async fn set_card_tags(&self, req: SetCardTags) -> RemoteResult<Vec<Tag>>;

    // Notes
    async fn create_note(&self, req: CreateNote) -> RemoteResult<Note>;
    async fn update_note(&self, req: UpdateNote) -> RemoteResult<()>;
    async fn delete_note(&self, id: &str, board_id: &str) -> RemoteResult<()>;
    async fn archive_note(&self, id: &str, board_id: &str) -> RemoteResult<()>;
}

// Request payloads. A blank `id` on a create request asks the engine to
// generate one.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkspace {
    pub id: String,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub color: Patch<Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBoard {
    pub id: String,
    pub workspace_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBoard {
    pub id: String,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub title: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub description: Patch<Option<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub icon: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub workspace_id: Patch<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateColumn {
    pub id: String,
    pub board_id: String,
    pub title: String,
    /// Target index; out-of-range values append.
    pub position: i64,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub wip_limit: Option<i64>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveColumn {
    pub board_id: String,
    pub column_id: String,
    pub target_index: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateColumn {
    pub id: String,
    pub board_id: String,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub title: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub color: Patch<Option<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub icon: Patch<Option<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub is_enabled: Patch<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCard {
    pub id: String,
    pub board_id: String,
    pub column_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Target index; out-of-range values append.
    pub position: i64,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCard {
    pub id: String,
    pub board_id: String,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub title: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub description: Patch<Option<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub priority: Patch<Priority>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub due_date: Patch<Option<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub remind_at: Patch<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCard {
    pub board_id: String,
    pub card_id: String,
    pub from_column_id: String,
    pub to_column_id: String,
    pub target_index: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubtask {
    pub id: String,
    pub board_id: String,
    pub card_id: String,
    pub title: String,
    /// Target index; `None` appends.
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubtask {
    pub id: String,
    pub board_id: String,
    pub card_id: String,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub title: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub is_completed: Patch<bool>,
    #[serde(default)]
    pub target_position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSubtask {
    pub id: String,
    pub board_id: String,
    pub card_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTag {
    pub id: String,
    pub board_id: String,
    pub label: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTag {
    pub id: String,
    pub board_id: String,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub label: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub color: Patch<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCardTags {
    pub card_id: String,
    pub board_id: String,
    pub tag_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNote {
    pub id: String,
    pub board_id: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNote {
    pub id: String,
    pub board_id: String,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub title: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub content: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub pinned: Patch<bool>,
}
