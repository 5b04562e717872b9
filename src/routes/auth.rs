use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::auth::{hash_password, issue_token, new_id, verify_password};
use crate::db::fetch_user_by_email;
use crate::error::{ApiError, ApiResult};
use crate::models::{Role, UserRow};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub photo_url: Option<String>,
    pub color: Option<String>,
    pub observations: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub id: String,
    pub username: String,
    pub email: String,
    pub roles: Vec<Role>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .service(web::resource("/signin").route(web::post().to(signin)))
            .service(web::resource("/signup").route(web::post().to(signup))),
    );
}

async fn signin(
    state: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    let user = fetch_user_by_email(&state.db, &payload.email)
        .await?
        .filter(|user| verify_password(&payload.password, &user.password_hash))
        .ok_or(ApiError::Unauthorized)?;

    let token = issue_token(&state.db, &user.id).await?;
    Ok(HttpResponse::Ok().json(TokenResponse {
        token,
        id: user.id,
        username: user.name,
        email: user.email,
        roles: vec![user.role],
    }))
}

async fn signup(
    state: web::Data<AppState>,
    payload: web::Json<SignupRequest>,
) -> ApiResult<HttpResponse> {
    let user = register_user(&state.db, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Creates the account and, for barber roles, the linked barber profile.
pub async fn register_user(pool: &SqlitePool, request: SignupRequest) -> ApiResult<UserRow> {
    if request.name.trim().is_empty() || request.email.trim().is_empty() {
        return Err(ApiError::Validation("Name and email are required".into()));
    }
    if fetch_user_by_email(pool, &request.email).await?.is_some() {
        return Err(ApiError::Conflict("Email is already in use".into()));
    }

    let role = Role::parse_or_default(request.role.as_deref());
    let password_hash = hash_password(&request.password)
        .map_err(|_| ApiError::Validation("Password could not be hashed".into()))?;

    let id = new_id();
    let now = Utc::now().naive_utc();
    sqlx::query(
        r#"INSERT INTO users (id, email, password_hash, name, phone, gender, age, role, observations, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(request.email.trim())
    .bind(password_hash)
    .bind(request.name.trim())
    .bind(&request.phone)
    .bind(&request.gender)
    .bind(request.age)
    .bind(role)
    .bind(&request.observations)
    .bind(now)
    .execute(pool)
    .await?;

    if role.owns_barber_profile() {
        sqlx::query(
            "INSERT INTO barbers (id, name, photo_url, active, color, user_id) VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(new_id())
        .bind(request.name.trim())
        .bind(&request.photo_url)
        .bind(&request.color)
        .bind(&id)
        .execute(pool)
        .await?;
    }

    crate::db::fetch_user(pool, &id)
        .await?
        .ok_or(ApiError::NotFound("User"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, tests_support};

    fn signup_req(email: &str, role: Option<&str>) -> SignupRequest {
        SignupRequest {
            name: "Nina".into(),
            email: email.into(),
            password: "secret1".into(),
            role: role.map(String::from),
            phone: None,
            gender: None,
            age: None,
            photo_url: None,
            color: None,
            observations: None,
        }
    }

    #[actix_web::test]
    async fn signup_defaults_to_user_role() {
        let pool = test_pool().await;
        let user = register_user(&pool, signup_req("nina@test.com", None))
            .await
            .unwrap();
        assert_eq!(user.role, Role::User);
    }

    #[actix_web::test]
    async fn duplicate_email_conflicts() {
        let pool = test_pool().await;
        tests_support::insert_user(&pool, "dup@test.com", Role::User).await;
        let err = register_user(&pool, signup_req("dup@test.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[actix_web::test]
    async fn barber_signup_creates_profile() {
        let pool = test_pool().await;
        let user = register_user(&pool, signup_req("cutter@test.com", Some("BARBER")))
            .await
            .unwrap();
        let linked: Option<(String,)> =
            sqlx::query_as("SELECT id FROM barbers WHERE user_id = ?")
                .bind(&user.id)
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert!(linked.is_some());
    }
}
