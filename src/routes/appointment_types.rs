use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::{identify, new_id};
use crate::error::{ApiError, ApiResult};
use crate::models::AppointmentTypeRow;
use crate::policy::{self, Action, Resource};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentTypeRequest {
    pub name: String,
    pub price: f64,
    pub duration_minutes: i64,
    pub color: Option<String>,
    pub description: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/appointment-types")
            .service(
                web::resource("")
                    .route(web::get().to(list))
                    .route(web::post().to(create)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::put().to(update))
                    .route(web::delete().to(delete)),
            ),
    );
}

async fn list(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let types = sqlx::query_as::<_, AppointmentTypeRow>(
        "SELECT * FROM appointment_types ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(types))
}

fn validate(payload: &AppointmentTypeRequest) -> ApiResult<()> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }
    if payload.price < 0.0 {
        return Err(ApiError::Validation("price must not be negative".into()));
    }
    if payload.duration_minutes <= 0 {
        return Err(ApiError::Validation("durationMinutes must be positive".into()));
    }
    Ok(())
}

async fn create(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<AppointmentTypeRequest>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::AppointmentTypes, Action::Create)?;

    let payload = payload.into_inner();
    validate(&payload)?;

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM appointment_types WHERE name = ? LIMIT 1")
            .bind(payload.name.trim())
            .fetch_optional(&state.db)
            .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict("Type name already exists".into()));
    }

    let id = new_id();
    sqlx::query(
        r#"INSERT INTO appointment_types (id, name, price, duration_minutes, color, description)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(payload.name.trim())
    .bind(payload.price)
    .bind(payload.duration_minutes)
    .bind(&payload.color)
    .bind(&payload.description)
    .execute(&state.db)
    .await?;

    let row = sqlx::query_as::<_, AppointmentTypeRow>(
        "SELECT * FROM appointment_types WHERE id = ? LIMIT 1",
    )
    .bind(&id)
    .fetch_one(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(row))
}

/// Price/duration changes never rewrite already-booked appointments; they
/// reference the type by id without snapshotting those fields.
async fn update(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<AppointmentTypeRequest>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::AppointmentTypes, Action::Update)?;

    let id = path.into_inner();
    let payload = payload.into_inner();
    validate(&payload)?;

    let taken: Option<(String,)> =
        sqlx::query_as("SELECT id FROM appointment_types WHERE name = ? AND id != ? LIMIT 1")
            .bind(payload.name.trim())
            .bind(&id)
            .fetch_optional(&state.db)
            .await?;
    if taken.is_some() {
        return Err(ApiError::Conflict("Type name already exists".into()));
    }

    let result = sqlx::query(
        r#"UPDATE appointment_types
           SET name = ?, price = ?, duration_minutes = ?, color = ?, description = ?
           WHERE id = ?"#,
    )
    .bind(payload.name.trim())
    .bind(payload.price)
    .bind(payload.duration_minutes)
    .bind(&payload.color)
    .bind(&payload.description)
    .bind(&id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Appointment type"));
    }

    let row = sqlx::query_as::<_, AppointmentTypeRow>(
        "SELECT * FROM appointment_types WHERE id = ? LIMIT 1",
    )
    .bind(&id)
    .fetch_one(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn delete(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::AppointmentTypes, Action::Delete)?;

    let result = sqlx::query("DELETE FROM appointment_types WHERE id = ?")
        .bind(path.into_inner())
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Appointment type"));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Appointment type deleted" })))
}
