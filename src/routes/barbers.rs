use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::{identify, new_id};
use crate::db::fetch_barber;
use crate::error::{ApiError, ApiResult};
use crate::models::BarberRow;
use crate::policy::{self, Action, Resource};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarberRequest {
    pub name: String,
    pub photo_url: Option<String>,
    pub color: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/barbers")
            .service(web::resource("/admin/all").route(web::get().to(list_all)))
            .service(
                web::resource("")
                    .route(web::get().to(list_active))
                    .route(web::post().to(create)),
            )
            .service(web::resource("/{id}/status").route(web::put().to(toggle_status))),
    );
}

async fn list_active(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let barbers = sqlx::query_as::<_, BarberRow>(
        "SELECT id, name, photo_url, active, color, user_id FROM barbers WHERE active = 1 ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(barbers))
}

async fn list_all(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Barbers, Action::Update)?;

    let barbers = sqlx::query_as::<_, BarberRow>(
        "SELECT id, name, photo_url, active, color, user_id FROM barbers ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(barbers))
}

async fn create(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<BarberRequest>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Barbers, Action::Create)?;

    let payload = payload.into_inner();
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".into()));
    }

    let id = new_id();
    sqlx::query("INSERT INTO barbers (id, name, photo_url, active, color) VALUES (?, ?, ?, 1, ?)")
        .bind(&id)
        .bind(payload.name.trim())
        .bind(&payload.photo_url)
        .bind(&payload.color)
        .execute(&state.db)
        .await?;

    let barber = fetch_barber(&state.db, &id)
        .await?
        .ok_or(ApiError::NotFound("Barber"))?;
    Ok(HttpResponse::Ok().json(barber))
}

/// Flips the active flag. Barbers are never deleted; history stays attached.
async fn toggle_status(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Barbers, Action::Update)?;

    let id = path.into_inner();
    let barber = fetch_barber(&state.db, &id)
        .await?
        .ok_or(ApiError::NotFound("Barber"))?;

    sqlx::query("UPDATE barbers SET active = ? WHERE id = ?")
        .bind(!barber.active)
        .bind(&id)
        .execute(&state.db)
        .await?;

    let barber = fetch_barber(&state.db, &id)
        .await?
        .ok_or(ApiError::NotFound("Barber"))?;
    Ok(HttpResponse::Ok().json(barber))
}
