use actix_web::http::header::Header;
use actix_web::HttpRequest;
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rand_core::OsRng;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::Role;

/// Identity attached to a request after the bearer token resolves.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TokenUserRow {
    id: String,
    email: String,
    name: String,
    role: Role,
}

/// Mints an opaque bearer token for a signed-in user.
pub async fn issue_token(pool: &SqlitePool, user_id: &str) -> Result<String, sqlx::Error> {
    let token = new_id();
    sqlx::query("INSERT INTO auth_tokens (token, user_id, created_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(Utc::now().naive_utc())
        .execute(pool)
        .await?;
    Ok(token)
}

async fn resolve_token(pool: &SqlitePool, token: &str) -> Result<Option<AuthUser>, sqlx::Error> {
    let row = sqlx::query_as::<_, TokenUserRow>(
        r#"SELECT u.id, u.email, u.name, u.role
           FROM auth_tokens t
           JOIN users u ON u.id = t.user_id
           WHERE t.token = ?
           LIMIT 1"#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|user| AuthUser {
        id: user.id,
        email: user.email,
        name: user.name,
        role: user.role,
    }))
}

/// Resolves the caller when a bearer token is present; `None` for anonymous
/// requests. A token that no longer resolves is treated as anonymous rather
/// than rejected, so public endpoints keep working with stale tokens.
pub async fn identify_optional(
    req: &HttpRequest,
    pool: &SqlitePool,
) -> Result<Option<AuthUser>, sqlx::Error> {
    let header = match Authorization::<Bearer>::parse(req) {
        Ok(header) => header,
        Err(_) => return Ok(None),
    };
    resolve_token(pool, header.into_scheme().token()).await
}

/// Resolves the caller or fails with 401.
pub async fn identify(req: &HttpRequest, pool: &SqlitePool) -> ApiResult<AuthUser> {
    identify_optional(req, pool)
        .await?
        .ok_or(ApiError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip_verifies() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[actix_web::test]
    async fn issued_token_resolves_to_its_user() {
        let pool = crate::db::test_pool().await;
        let user_id = crate::db::tests_support::insert_user(&pool, "tok@test.com", Role::Admin).await;

        let token = issue_token(&pool, &user_id).await.unwrap();
        let auth = resolve_token(&pool, &token).await.unwrap().unwrap();
        assert_eq!(auth.id, user_id);
        assert_eq!(auth.role, Role::Admin);

        assert!(resolve_token(&pool, "missing").await.unwrap().is_none());
    }
}
