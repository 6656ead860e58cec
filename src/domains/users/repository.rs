use super::models::User;
use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

/// Minimal user lookup/creation, mirroring the "created on first contact"
/// lifecycle from the data model: a user row always exists before any
/// admission, ledger, or payment operation touches it.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_external_id(&self, external_id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(self.pool)
            .await
            .context("find_by_external_id")
    }

    /// Returns the existing user, or creates one with a fresh, unique
    /// referral code and zero balance.
    pub async fn find_or_create(
        &self,
        external_id: i64,
        display_name: Option<&str>,
        referred_by: Option<i64>,
    ) -> Result<User> {
        if let Some(existing) = self.find_by_external_id(external_id).await? {
            return Ok(existing);
        }

        let referral_code = new_referral_code();

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (external_id, display_name, is_admin, is_banned, balance, referral_code, referred_by)
            VALUES ($1, $2, false, false, 0, $3, $4)
            ON CONFLICT (external_id) DO UPDATE SET external_id = EXCLUDED.external_id
            RETURNING *
            "#,
        )
        .bind(external_id)
        .bind(display_name)
        .bind(&referral_code)
        .bind(referred_by)
        .fetch_one(self.pool)
        .await
        .context("find_or_create")
    }

    pub async fn set_banned(&self, external_id: i64, banned: bool) -> Result<()> {
        sqlx::query("UPDATE users SET is_banned = $2 WHERE external_id = $1")
            .bind(external_id)
            .bind(banned)
            .execute(self.pool)
            .await
            .context("set_banned")?;
        Ok(())
    }
}

/// Opaque short referral code; uniqueness is enforced by the storage-level
/// constraint, not by this generator, so a collision simply surfaces as a
/// constraint violation the caller can retry.
fn new_referral_code() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
