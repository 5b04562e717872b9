use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::auth::{identify, new_id, AuthUser};
use crate::availability::day_bounds;
use crate::error::{ApiError, ApiResult};
use crate::models::{SaleItemRow, SaleRow};
use crate::policy::{self, Action, Resource};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRequest {
    pub date: Option<NaiveDateTime>,
    pub total_amount: Option<f64>,
    pub status: Option<String>,
    pub payment_method: Option<String>,
    pub client_id: Option<String>,
    pub guest_name: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<SaleItemRequest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemRequest {
    pub appointment_type_id: Option<String>,
    pub product_id: Option<String>,
    pub item_name: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<i64>,
    pub subtotal: Option<f64>,
    pub barber_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    #[serde(flatten)]
    pub sale: SaleRow,
    pub items: Vec<SaleItemRow>,
}

/// A line item after defaulting: name snapshot filled, price/quantity
/// defaulted, subtotal derived.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedItem {
    pub appointment_type_id: Option<String>,
    pub product_id: Option<String>,
    pub item_name: String,
    pub price: f64,
    pub quantity: i64,
    pub subtotal: f64,
    pub barber_id: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/pos")
            .service(web::resource("/sales").route(web::post().to(create_sale)))
            .service(web::resource("/sales/today").route(web::get().to(today_sales))),
    );
}

/// Applies the walk-in counter defaults the original register relied on.
pub fn normalize_items(items: &[SaleItemRequest]) -> ApiResult<Vec<NormalizedItem>> {
    if items.is_empty() {
        return Err(ApiError::Validation("La venta no tiene ítems.".into()));
    }

    Ok(items
        .iter()
        .map(|item| {
            let item_name = match item.item_name.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => {
                    if item.appointment_type_id.is_some() {
                        "Servicio".to_string()
                    } else if item.product_id.is_some() {
                        "Producto".to_string()
                    } else {
                        "Ítem Varios".to_string()
                    }
                }
            };
            let price = item.price.unwrap_or(0.0);
            let quantity = item.quantity.unwrap_or(1);
            let subtotal = item.subtotal.unwrap_or(price * quantity as f64);
            NormalizedItem {
                appointment_type_id: item.appointment_type_id.clone(),
                product_id: item.product_id.clone(),
                item_name,
                price,
                quantity,
                subtotal,
                barber_id: item.barber_id.clone(),
            }
        })
        .collect())
}

/// Sale-level total: the request value wins unless it is absent or exactly
/// zero, in which case the item sum replaces it.
pub fn effective_total(requested: Option<f64>, items: &[NormalizedItem]) -> f64 {
    let item_sum: f64 = items.iter().map(|item| item.subtotal).sum();
    match requested {
        Some(total) if total != 0.0 => total,
        _ => item_sum,
    }
}

async fn create_sale(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<SaleRequest>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Sales, Action::Create)?;

    let sale = record_sale(&state.db, payload.into_inner(), &auth).await?;
    Ok(HttpResponse::Ok().json(sale))
}

/// Persists the sale and all of its items in a single transaction. This is
/// the one write path that surfaces the storage cause to the caller.
pub async fn record_sale(
    pool: &SqlitePool,
    request: SaleRequest,
    auth: &AuthUser,
) -> ApiResult<SaleResponse> {
    let items = normalize_items(&request.items)?;
    let total_amount = effective_total(request.total_amount, &items);

    let sale_id = new_id();
    let date = request.date.unwrap_or_else(|| Utc::now().naive_utc());
    let status = request.status.unwrap_or_else(|| "COMPLETED".to_string());
    let payment_method = request.payment_method.unwrap_or_else(|| "CASH".to_string());

    let mut tx = pool.begin().await.map_err(ApiError::Sale)?;

    sqlx::query(
        r#"INSERT INTO sales (id, date, total_amount, status, payment_method, client_id,
                              guest_name, notes, created_by_user_id)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&sale_id)
    .bind(date)
    .bind(total_amount)
    .bind(&status)
    .bind(&payment_method)
    .bind(&request.client_id)
    .bind(&request.guest_name)
    .bind(&request.notes)
    .bind(&auth.id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::Sale)?;

    for item in &items {
        sqlx::query(
            r#"INSERT INTO sale_items (id, sale_id, appointment_type_id, product_id, item_name,
                                       price, quantity, subtotal, barber_id)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(new_id())
        .bind(&sale_id)
        .bind(&item.appointment_type_id)
        .bind(&item.product_id)
        .bind(&item.item_name)
        .bind(item.price)
        .bind(item.quantity)
        .bind(item.subtotal)
        .bind(&item.barber_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::Sale)?;
    }

    tx.commit().await.map_err(ApiError::Sale)?;

    fetch_sale(pool, &sale_id).await
}

async fn fetch_sale(pool: &SqlitePool, id: &str) -> ApiResult<SaleResponse> {
    let sale = sqlx::query_as::<_, SaleRow>("SELECT * FROM sales WHERE id = ? LIMIT 1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Sale"))?;
    let items = sqlx::query_as::<_, SaleItemRow>("SELECT * FROM sale_items WHERE sale_id = ?")
        .bind(id)
        .fetch_all(pool)
        .await?;
    Ok(SaleResponse { sale, items })
}

async fn today_sales(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Sales, Action::Read)?;

    let (start_of_day, end_of_day) = day_bounds(Utc::now().date_naive());
    let sales = sqlx::query_as::<_, SaleRow>(
        "SELECT * FROM sales WHERE date BETWEEN ? AND ? ORDER BY date DESC",
    )
    .bind(start_of_day)
    .bind(end_of_day)
    .fetch_all(&state.db)
    .await?;

    let mut responses = Vec::with_capacity(sales.len());
    for sale in sales {
        let items = sqlx::query_as::<_, SaleItemRow>("SELECT * FROM sale_items WHERE sale_id = ?")
            .bind(&sale.id)
            .fetch_all(&state.db)
            .await?;
        responses.push(SaleResponse { sale, items });
    }
    Ok(HttpResponse::Ok().json(responses))
}
