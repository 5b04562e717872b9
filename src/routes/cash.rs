use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::auth::{identify, new_id, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::ledger::{self, HistoryEntry, LedgerTotals};
use crate::models::{CashCutRow, CashWithdrawalRow, SaleRow};
use crate::policy::{self, Action, Resource};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: f64,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CutRequest {
    pub total_actual_amount: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResponse {
    #[serde(flatten)]
    totals: LedgerTotals,
    last_cut_date: Option<NaiveDateTime>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/cash")
            .service(web::resource("/balance").route(web::get().to(balance)))
            .service(web::resource("/withdraw").route(web::post().to(withdraw)))
            .service(web::resource("/cut").route(web::post().to(cut)))
            .service(web::resource("/history").route(web::get().to(history))),
    );
}

/// Timestamp of the latest cut, or the sentinel when the register has never
/// been cut.
pub async fn period_boundary(
    pool: &SqlitePool,
) -> Result<(NaiveDateTime, Option<NaiveDateTime>), sqlx::Error> {
    let last: Option<(NaiveDateTime,)> =
        sqlx::query_as("SELECT timestamp FROM cash_cuts ORDER BY timestamp DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;
    let last_cut = last.map(|(ts,)| ts);
    Ok((last_cut.unwrap_or_else(ledger::epoch_boundary), last_cut))
}

async fn period_sales(
    pool: &SqlitePool,
    boundary: NaiveDateTime,
) -> Result<Vec<SaleRow>, sqlx::Error> {
    sqlx::query_as::<_, SaleRow>("SELECT * FROM sales WHERE date > ? ORDER BY date DESC")
        .bind(boundary)
        .fetch_all(pool)
        .await
}

async fn period_withdrawals(
    pool: &SqlitePool,
    boundary: NaiveDateTime,
) -> Result<Vec<CashWithdrawalRow>, sqlx::Error> {
    sqlx::query_as::<_, CashWithdrawalRow>(
        "SELECT * FROM cash_withdrawals WHERE timestamp > ? ORDER BY timestamp DESC",
    )
    .bind(boundary)
    .fetch_all(pool)
    .await
}

pub async fn current_totals(
    pool: &SqlitePool,
) -> Result<(LedgerTotals, Option<NaiveDateTime>), sqlx::Error> {
    let (boundary, last_cut) = period_boundary(pool).await?;
    let sales = period_sales(pool, boundary).await?;
    let withdrawals = period_withdrawals(pool, boundary).await?;
    Ok((ledger::totals(&sales, &withdrawals), last_cut))
}

async fn balance(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Cash, Action::Read)?;

    let (totals, last_cut_date) = current_totals(&state.db).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse {
        totals,
        last_cut_date,
    }))
}

async fn withdraw(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<WithdrawRequest>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Cash, Action::Create)?;

    let withdrawal = record_withdrawal(&state.db, payload.into_inner(), &auth).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Withdrawal registered successfully",
        "withdrawal": withdrawal,
    })))
}

/// Persists unconditionally: there is no balance-sufficiency check, the
/// drawer is allowed to go negative.
pub async fn record_withdrawal(
    pool: &SqlitePool,
    request: WithdrawRequest,
    auth: &AuthUser,
) -> ApiResult<CashWithdrawalRow> {
    if request.amount <= 0.0 {
        return Err(ApiError::Validation("amount must be positive".into()));
    }

    let id = new_id();
    sqlx::query(
        r#"INSERT INTO cash_withdrawals (id, amount, description, timestamp, performed_by_user_id)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(request.amount)
    .bind(&request.description)
    .bind(Utc::now().naive_utc())
    .bind(&auth.id)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, CashWithdrawalRow>(
        "SELECT * FROM cash_withdrawals WHERE id = ? LIMIT 1",
    )
    .bind(&id)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

async fn cut(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<CutRequest>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Cash, Action::Create)?;

    let cut = perform_cut(&state.db, payload.into_inner(), &auth).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Cash cut performed successfully",
        "cut": cut,
    })))
}

/// Closes the period: recomputes the expected drawer amount and stores it
/// next to whatever was physically counted. Compute and insert run in one
/// transaction so a concurrent sale cannot land between them. Discrepancy
/// between calculated and counted is informational only.
pub async fn perform_cut(
    pool: &SqlitePool,
    request: CutRequest,
    auth: &AuthUser,
) -> ApiResult<CashCutRow> {
    let mut tx = pool.begin().await?;

    let last: Option<(NaiveDateTime,)> =
        sqlx::query_as("SELECT timestamp FROM cash_cuts ORDER BY timestamp DESC LIMIT 1")
            .fetch_optional(&mut *tx)
            .await?;
    let boundary = last.map(|(ts,)| ts).unwrap_or_else(ledger::epoch_boundary);

    let sales = sqlx::query_as::<_, SaleRow>("SELECT * FROM sales WHERE date > ?")
        .bind(boundary)
        .fetch_all(&mut *tx)
        .await?;
    let withdrawals =
        sqlx::query_as::<_, CashWithdrawalRow>("SELECT * FROM cash_withdrawals WHERE timestamp > ?")
            .bind(boundary)
            .fetch_all(&mut *tx)
            .await?;
    let totals = ledger::totals(&sales, &withdrawals);

    let id = new_id();
    sqlx::query(
        r#"INSERT INTO cash_cuts
           (id, timestamp, total_calculated_amount, total_actual_amount, notes, performed_by_user_id)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(Utc::now().naive_utc())
    .bind(totals.cash_balance)
    .bind(request.total_actual_amount)
    .bind(&request.notes)
    .bind(&auth.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let row = sqlx::query_as::<_, CashCutRow>("SELECT * FROM cash_cuts WHERE id = ? LIMIT 1")
        .bind(&id)
        .fetch_one(pool)
        .await?;
    Ok(row)
}

async fn history(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Cash, Action::Read)?;

    let entries = register_feed(&state.db).await?;
    Ok(HttpResponse::Ok().json(entries))
}

#[derive(Debug, sqlx::FromRow)]
struct ItemLineRow {
    item_name: String,
    barber_name: Option<String>,
}

/// Sales and withdrawals since the last cut merged into one descending feed.
pub async fn register_feed(pool: &SqlitePool) -> ApiResult<Vec<HistoryEntry>> {
    let (boundary, _) = period_boundary(pool).await?;
    let sales = period_sales(pool, boundary).await?;
    let withdrawals = period_withdrawals(pool, boundary).await?;

    let mut entries = Vec::with_capacity(sales.len() + withdrawals.len());

    for sale in &sales {
        let item_lines: Vec<ItemLineRow> = sqlx::query_as(
            r#"SELECT i.item_name, b.name AS barber_name
               FROM sale_items i
               LEFT JOIN barbers b ON b.id = i.barber_id
               WHERE i.sale_id = ?"#,
        )
        .bind(&sale.id)
        .fetch_all(pool)
        .await?;
        let item_lines: Vec<(String, Option<String>)> = item_lines
            .into_iter()
            .map(|line| (line.item_name, line.barber_name))
            .collect();

        let client_name: Option<(String,)> = match sale.client_id.as_deref() {
            Some(client_id) => sqlx::query_as("SELECT name FROM users WHERE id = ?")
                .bind(client_id)
                .fetch_optional(pool)
                .await?,
            None => None,
        };
        let client_name = client_name.map(|(name,)| name);

        let seller: Option<(String,)> = match sale.created_by_user_id.as_deref() {
            Some(user_id) => sqlx::query_as("SELECT name FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(pool)
                .await?,
            None => None,
        };

        entries.push(HistoryEntry {
            kind: "SALE",
            id: sale.id.clone(),
            amount: sale.total_amount,
            date: sale.date,
            description: Some(ledger::sale_description(sale, &item_lines, client_name.as_deref())),
            payment_method: Some(sale.payment_method.clone()),
            user: seller.map(|(name,)| name).unwrap_or_else(|| "Sistema".to_string()),
        });
    }

    for withdrawal in &withdrawals {
        let performer: Option<(String,)> = match withdrawal.performed_by_user_id.as_deref() {
            Some(user_id) => sqlx::query_as("SELECT name FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(pool)
                .await?,
            None => None,
        };

        entries.push(HistoryEntry {
            kind: "WITHDRAWAL",
            id: withdrawal.id.clone(),
            // Negated for display: money leaving the drawer.
            amount: -withdrawal.amount,
            date: withdrawal.timestamp,
            description: withdrawal.description.clone(),
            payment_method: None,
            user: performer.map(|(name,)| name).unwrap_or_else(|| "Sistema".to_string()),
        });
    }

    Ok(ledger::merge_history(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, tests_support};
    use crate::models::Role;

    async fn admin(pool: &SqlitePool) -> AuthUser {
        let id = tests_support::insert_user(pool, "boss@test.com", Role::Admin).await;
        AuthUser {
            id,
            email: "boss@test.com".into(),
            name: "boss".into(),
            role: Role::Admin,
        }
    }

    async fn insert_sale(pool: &SqlitePool, amount: f64, method: &str) {
        sqlx::query(
            r#"INSERT INTO sales (id, date, total_amount, status, payment_method)
               VALUES (?, ?, ?, 'COMPLETED', ?)"#,
        )
        .bind(new_id())
        .bind(Utc::now().naive_utc())
        .bind(amount)
        .bind(method)
        .execute(pool)
        .await
        .unwrap();
    }

    #[actix_web::test]
    async fn balance_tracks_sales_and_withdrawals() {
        let pool = test_pool().await;
        let auth = admin(&pool).await;

        let (totals, last_cut) = current_totals(&pool).await.unwrap();
        assert_eq!(totals.cash_balance, 0.0);
        assert!(last_cut.is_none());

        insert_sale(&pool, 100.0, "CASH").await;
        insert_sale(&pool, 40.0, "CARD").await;
        let (totals, _) = current_totals(&pool).await.unwrap();
        assert_eq!(totals.cash_balance, 100.0);
        assert_eq!(totals.total_revenue, 140.0);

        record_withdrawal(
            &pool,
            WithdrawRequest {
                amount: 130.0,
                description: Some("proveedor".into()),
            },
            &auth,
        )
        .await
        .unwrap();

        // Withdrawals are never rejected, even past zero.
        let (totals, _) = current_totals(&pool).await.unwrap();
        assert_eq!(totals.cash_balance, -30.0);
    }

    #[actix_web::test]
    async fn non_positive_withdrawal_is_rejected() {
        let pool = test_pool().await;
        let auth = admin(&pool).await;
        let err = record_withdrawal(
            &pool,
            WithdrawRequest {
                amount: 0.0,
                description: None,
            },
            &auth,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[actix_web::test]
    async fn cut_resets_the_period() {
        let pool = test_pool().await;
        let auth = admin(&pool).await;

        insert_sale(&pool, 80.0, "CASH").await;
        let cut = perform_cut(&pool, CutRequest::default(), &auth).await.unwrap();
        assert_eq!(cut.total_calculated_amount, 80.0);
        assert!(cut.total_actual_amount.is_none());

        let (totals, last_cut) = current_totals(&pool).await.unwrap();
        assert_eq!(totals.cash_balance, 0.0);
        assert_eq!(last_cut, Some(cut.timestamp));
    }

    #[actix_web::test]
    async fn cut_stores_counted_amount_without_reconciling() {
        let pool = test_pool().await;
        let auth = admin(&pool).await;

        insert_sale(&pool, 50.0, "CASH").await;
        let cut = perform_cut(
            &pool,
            CutRequest {
                total_actual_amount: Some(47.5),
                notes: Some("faltante".into()),
            },
            &auth,
        )
        .await
        .unwrap();
        // Discrepancy is stored, never alerted on.
        assert_eq!(cut.total_calculated_amount, 50.0);
        assert_eq!(cut.total_actual_amount, Some(47.5));
    }

    #[actix_web::test]
    async fn feed_merges_sales_and_withdrawals_descending() {
        let pool = test_pool().await;
        let auth = admin(&pool).await;

        insert_sale(&pool, 25.0, "CASH").await;
        record_withdrawal(
            &pool,
            WithdrawRequest {
                amount: 10.0,
                description: Some("cambio".into()),
            },
            &auth,
        )
        .await
        .unwrap();

        let feed = register_feed(&pool).await.unwrap();
        assert_eq!(feed.len(), 2);
        assert!(feed.windows(2).all(|pair| pair[0].date >= pair[1].date));
        let withdrawal = feed.iter().find(|e| e.kind == "WITHDRAWAL").unwrap();
        assert_eq!(withdrawal.amount, -10.0);
    }
}
