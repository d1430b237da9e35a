//! OAuth2 access tokens held by bot shadow users.
//!
//! Tokens are only ever written together with the bot that owns them, so
//! the statements here take any [`DatabaseAccessor`] and are composed into
//! the bot transactions in [`super::bot`].

use crate::framework::DatabaseAccessor;
use time::OffsetDateTime;
use uuid::Uuid;

/// A freshly minted access credential, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub access_token: String,
    pub scopes: Vec<String>,
    /// Seconds; `i32::MAX` for bot tokens.
    pub expires_in: i32,
    pub created_at: OffsetDateTime,
}

pub(crate) async fn insert_token(
    db: &mut impl DatabaseAccessor,
    token: &IssuedToken,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO oauth2_tokens (id, user_id, access_token, scopes, expires_in, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(token.id)
    .bind(token.user_id)
    .bind(&token.access_token)
    .bind(token.scopes.join(" "))
    .bind(token.expires_in)
    .bind(token.created_at)
    .execute(db.acquire())
    .await?;
    Ok(())
}

pub(crate) async fn delete_tokens_of_user(
    db: &mut impl DatabaseAccessor,
    user_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE oauth2_tokens SET deleted_at = now()
        WHERE user_id = $1 AND deleted_at IS NULL
        "#,
    )
    .bind(user_id)
    .execute(db.acquire())
    .await?;
    Ok(result.rows_affected())
}
