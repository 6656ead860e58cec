use crate::kernel::id::Id;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct UserMarker;
pub type UserId = Id<UserMarker>;

/// A user, created on first contact with the front-end and mutated only
/// through the ledger's atomic balance update.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub external_id: i64,
    pub display_name: Option<String>,
    pub is_admin: bool,
    pub is_banned: bool,
    pub balance: i64,
    pub referral_code: String,
    pub referred_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn id(&self) -> UserId {
        UserId::from_uuid(self.id)
    }
}
