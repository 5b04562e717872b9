use actix_web::{web, HttpRequest, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::auth::{identify, new_id};
use crate::error::{ApiError, ApiResult};
use crate::models::PromotionRow;
use crate::policy::{self, Action, Resource};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionRequest {
    pub name: String,
    pub description: Option<String>,
    pub discount_percentage: Option<f64>,
    pub price: Option<f64>,
    pub valid_until: Option<NaiveDate>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/promotions")
            .service(
                web::resource("")
                    .route(web::get().to(list))
                    .route(web::post().to(create)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(get_by_id))
                    .route(web::put().to(update))
                    .route(web::delete().to(delete)),
            ),
    );
}

async fn list(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let promotions =
        sqlx::query_as::<_, PromotionRow>("SELECT * FROM promotions ORDER BY name")
            .fetch_all(&state.db)
            .await?;
    Ok(HttpResponse::Ok().json(promotions))
}

async fn get_by_id(state: web::Data<AppState>, path: web::Path<String>) -> ApiResult<HttpResponse> {
    let promotion = fetch_promotion(&state, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(promotion))
}

async fn create(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<PromotionRequest>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Promotions, Action::Create)?;

    let payload = payload.into_inner();
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO promotions (id, name, description, discount_percentage, price, valid_until)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.discount_percentage)
    .bind(payload.price)
    .bind(payload.valid_until)
    .execute(&state.db)
    .await?;

    let promotion = fetch_promotion(&state, &id).await?;
    Ok(HttpResponse::Ok().json(promotion))
}

async fn update(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<PromotionRequest>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Promotions, Action::Update)?;

    let id = path.into_inner();
    let payload = payload.into_inner();
    let result = sqlx::query(
        r#"UPDATE promotions
           SET name = ?, description = ?, discount_percentage = ?, price = ?, valid_until = ?
           WHERE id = ?"#,
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.discount_percentage)
    .bind(payload.price)
    .bind(payload.valid_until)
    .bind(&id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Promotion"));
    }

    let promotion = fetch_promotion(&state, &id).await?;
    Ok(HttpResponse::Ok().json(promotion))
}

async fn delete(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Promotions, Action::Delete)?;

    let result = sqlx::query("DELETE FROM promotions WHERE id = ?")
        .bind(path.into_inner())
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Promotion"));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Promotion deleted" })))
}

async fn fetch_promotion(state: &web::Data<AppState>, id: &str) -> ApiResult<PromotionRow> {
    sqlx::query_as::<_, PromotionRow>("SELECT * FROM promotions WHERE id = ? LIMIT 1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Promotion"))
}
