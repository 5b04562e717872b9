//! Admin dashboard surface: entity counts and staff/client account
//! management, including the unlink rules that keep appointment history
//! intact when an account is removed.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::auth::{hash_password, identify, new_id};
use crate::error::{ApiError, ApiResult};
use crate::models::{BarberRow, Role, UserRow};
use crate::policy::{self, Action, Resource};
use crate::routes::auth::{register_user, SignupRequest};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub role: Option<String>,
    pub photo_url: Option<String>,
    pub color: Option<String>,
    pub observations: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/admin")
            .service(web::resource("/stats").route(web::get().to(stats)))
            .service(
                web::resource("/users")
                    .route(web::get().to(list_users))
                    .route(web::post().to(create_user)),
            )
            .service(
                web::resource("/users/{id}")
                    .route(web::put().to(update_user))
                    .route(web::delete().to(remove_user)),
            ),
    );
}

async fn stats(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Users, Action::Read)?;

    let users = count(&state.db, "users").await?;
    let appointments = count(&state.db, "appointments").await?;
    let barbers = count(&state.db, "barbers").await?;
    let leads = count(&state.db, "leads").await?;
    let opportunities = count(&state.db, "opportunities").await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "users": users,
        "appointments": appointments,
        "barbers": barbers,
        "leads": leads,
        "opportunities": opportunities,
    })))
}

async fn count(pool: &SqlitePool, table: &str) -> Result<i64, sqlx::Error> {
    // Table names come from the fixed list above, never from input.
    let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    Ok(n)
}

async fn list_users(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Users, Action::Read)?;

    let users = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;
    Ok(HttpResponse::Ok().json(users))
}

async fn create_user(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<SignupRequest>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Users, Action::Create)?;

    let user = register_user(&state.db, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

async fn update_user(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UserUpdateRequest>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Users, Action::Update)?;

    let user = apply_user_update(&state.db, &path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

async fn remove_user(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Users, Action::Delete)?;

    delete_user(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "User deleted; associated appointments kept as unlinked"
    })))
}

/// Partial account update. A role change towards a barber role creates or
/// re-syncs the linked profile; a change away from it keeps the profile so
/// past appointments stay attributable.
pub async fn apply_user_update(
    pool: &SqlitePool,
    id: &str,
    request: UserUpdateRequest,
) -> ApiResult<UserRow> {
    let current = crate::db::fetch_user(pool, id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let name = match request.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => current.name.clone(),
    };
    let email = match request.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => email.to_string(),
        _ => current.email.clone(),
    };
    let password_hash = match request.password.as_deref() {
        Some(password) if !password.is_empty() => hash_password(password)
            .map_err(|_| ApiError::Validation("Password could not be hashed".into()))?,
        _ => current.password_hash.clone(),
    };
    let role = match request.role.as_deref() {
        Some(role) => Role::parse_or_default(Some(role)),
        None => current.role,
    };

    sqlx::query(
        r#"UPDATE users
           SET name = ?, email = ?, password_hash = ?, phone = ?, gender = ?, age = ?,
               role = ?, observations = ?
           WHERE id = ?"#,
    )
    .bind(&name)
    .bind(&email)
    .bind(&password_hash)
    .bind(request.phone.as_ref().or(current.phone.as_ref()))
    .bind(request.gender.as_ref().or(current.gender.as_ref()))
    .bind(request.age.or(current.age))
    .bind(role)
    .bind(request.observations.as_ref().or(current.observations.as_ref()))
    .bind(id)
    .execute(pool)
    .await?;

    if role.owns_barber_profile() {
        let existing =
            sqlx::query_as::<_, BarberRow>("SELECT * FROM barbers WHERE user_id = ? LIMIT 1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        match existing {
            Some(barber) => {
                sqlx::query("UPDATE barbers SET name = ?, photo_url = ?, color = ? WHERE id = ?")
                    .bind(&name)
                    .bind(request.photo_url.as_ref().or(barber.photo_url.as_ref()))
                    .bind(request.color.as_ref().or(barber.color.as_ref()))
                    .bind(&barber.id)
                    .execute(pool)
                    .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO barbers (id, name, photo_url, active, color, user_id) VALUES (?, ?, ?, 1, ?, ?)",
                )
                .bind(new_id())
                .bind(&name)
                .bind(&request.photo_url)
                .bind(&request.color)
                .bind(id)
                .execute(pool)
                .await?;
            }
        }
    }

    crate::db::fetch_user(pool, id)
        .await?
        .ok_or(ApiError::NotFound("User"))
}

/// Removes an account without destroying history: appointments, sales, and
/// register records keep their rows with the user link nulled, and if the
/// account owned a barber profile its appointments are detached before the
/// profile is removed.
pub async fn delete_user(pool: &SqlitePool, id: &str) -> ApiResult<()> {
    crate::db::fetch_user(pool, id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE appointments SET user_id = NULL WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE sales SET client_id = NULL WHERE client_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE sales SET created_by_user_id = NULL WHERE created_by_user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE cash_withdrawals SET performed_by_user_id = NULL WHERE performed_by_user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE cash_cuts SET performed_by_user_id = NULL WHERE performed_by_user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let barber: Option<(String,)> = sqlx::query_as("SELECT id FROM barbers WHERE user_id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if let Some((barber_id,)) = barber {
        sqlx::query("UPDATE appointments SET barber_id = NULL WHERE barber_id = ?")
            .bind(&barber_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM barbers WHERE id = ?")
            .bind(&barber_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
