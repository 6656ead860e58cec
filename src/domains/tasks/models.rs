use crate::kernel::id::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub struct RequestMarker;
pub type RequestId = Id<RequestMarker>;

/// Status DAG from `spec.md` §3.4: `QUEUED -> {PROCESSING, CANCELLED}`,
/// `PROCESSING -> {COMPLETED, FAILED, CANCELLED}`. Terminal states absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Cancelled)
    }

    /// Whether `self -> next` is a legal edge in the DAG.
    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::*;
        matches!(
            (self, next),
            (Queued, Processing) | (Queued, Cancelled) |
            (Processing, Completed) | (Processing, Failed) | (Processing, Cancelled)
        )
    }
}

/// Tagged job-kind payload. Replaces a loose dictionary with a variant per
/// kind carrying only the fields relevant to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum JobKind {
    EditImage { input_handle: String, prompt: String },
    GenerateImage { prompt: String },
    AnimatePhoto { input_handle: String },
    GenerateVideo { prompt: String, input_handle: Option<String> },
}

impl JobKind {
    /// Video-class jobs get a doubled backend timeout per `spec.md` §5.
    pub fn is_video_class(&self) -> bool {
        matches!(self, JobKind::AnimatePhoto { .. } | JobKind::GenerateVideo { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobKind::EditImage { .. } => "edit_image",
            JobKind::GenerateImage { .. } => "generate_image",
            JobKind::AnimatePhoto { .. } => "animate_photo",
            JobKind::GenerateVideo { .. } => "generate_video",
        }
    }
}

/// The ephemeral task record stored at `task:{request_id}`, TTL 1 hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub request_id: RequestId,
    pub user_external_id: i64,
    pub user_id: uuid::Uuid,
    pub kind: JobKind,
    pub cost: i64,
    pub is_admin: bool,
    pub chat_target_id: i64,
    pub status: Status,
    /// When `status` was last set. Used by the stuck-task reaper to find
    /// `PROCESSING` tasks older than `GENERATION_TIMEOUT * 2`.
    pub status_changed_at: DateTime<Utc>,
}

/// What the front-end submits to the admission controller.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub user_external_id: i64,
    pub user_id: uuid::Uuid,
    pub request_id: RequestId,
    pub kind: JobKind,
    pub cost: i64,
    pub is_admin: bool,
    pub chat_target_id: i64,
}
