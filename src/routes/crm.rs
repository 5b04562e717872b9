//! Lead capture and the small sales-funnel CRM. Lead creation is public
//! (website/chatbot funnel); everything else is admin-side.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::auth::{hash_password, identify, new_id};
use crate::db::fetch_user_by_email;
use crate::error::{ApiError, ApiResult};
use crate::models::{LeadRow, LeadStatus, OpportunityRow, OpportunityStatus, Role, UserRow};
use crate::policy::{self, Action, Resource};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub interest: Option<String>,
    pub source: Option<String>,
    pub status: Option<LeadStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: LeadStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertQuery {
    pub service_type_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityUpdate {
    pub status: OpportunityStatus,
    pub estimated_value: Option<f64>,
    pub follow_up_notes: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/crm")
            .service(
                web::resource("/leads")
                    .route(web::post().to(capture_lead))
                    .route(web::get().to(list_leads)),
            )
            .service(web::resource("/leads/{id}/status").route(web::put().to(update_lead_status)))
            .service(
                web::resource("/leads/{id}/convert-to-client")
                    .route(web::post().to(convert_to_client)),
            )
            .service(web::resource("/leads/{id}/convert").route(web::post().to(convert_lead)))
            .service(web::resource("/opportunities").route(web::get().to(list_opportunities)))
            .service(web::resource("/opportunities/{id}").route(web::put().to(update_opportunity))),
    );
}

async fn capture_lead(
    state: web::Data<AppState>,
    payload: web::Json<LeadRequest>,
) -> ApiResult<HttpResponse> {
    let lead = create_lead(&state.db, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(lead))
}

async fn list_leads(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Leads, Action::Read)?;

    let leads = sqlx::query_as::<_, LeadRow>("SELECT * FROM leads ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;
    Ok(HttpResponse::Ok().json(leads))
}

async fn update_lead_status(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<StatusQuery>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Leads, Action::Update)?;

    let id = path.into_inner();
    let result = sqlx::query("UPDATE leads SET status = ? WHERE id = ?")
        .bind(query.status)
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Lead"));
    }
    Ok(HttpResponse::Ok().json(fetch_lead(&state.db, &id).await?))
}

async fn convert_to_client(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Crm, Action::Update)?;

    let user = convert_lead_to_client(&state.db, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

async fn convert_lead(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ConvertQuery>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Crm, Action::Update)?;

    let opportunity =
        convert_lead_to_opportunity(&state.db, &path.into_inner(), &query.service_type_id).await?;
    Ok(HttpResponse::Ok().json(opportunity))
}

async fn list_opportunities(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Crm, Action::Read)?;

    let opportunities =
        sqlx::query_as::<_, OpportunityRow>("SELECT * FROM opportunities ORDER BY updated_at DESC")
            .fetch_all(&state.db)
            .await?;
    Ok(HttpResponse::Ok().json(opportunities))
}

async fn update_opportunity(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<OpportunityUpdate>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Crm, Action::Update)?;

    let id = path.into_inner();
    let payload = payload.into_inner();
    let result = sqlx::query(
        r#"UPDATE opportunities
           SET status = ?, estimated_value = ?, follow_up_notes = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(payload.status)
    .bind(payload.estimated_value)
    .bind(&payload.follow_up_notes)
    .bind(Utc::now().naive_utc())
    .bind(&id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Opportunity"));
    }

    let opportunity =
        sqlx::query_as::<_, OpportunityRow>("SELECT * FROM opportunities WHERE id = ? LIMIT 1")
            .bind(&id)
            .fetch_one(&state.db)
            .await?;
    Ok(HttpResponse::Ok().json(opportunity))
}

/// Captured leads default to NEW and a server-side creation time.
pub async fn create_lead(pool: &SqlitePool, request: LeadRequest) -> ApiResult<LeadRow> {
    if request.name.trim().is_empty() {
        return Err(ApiError::Validation("Lead name is required".into()));
    }

    let id = new_id();
    sqlx::query(
        r#"INSERT INTO leads (id, name, email, phone, interest, source, status, created_at, notes)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(request.name.trim())
    .bind(&request.email)
    .bind(&request.phone)
    .bind(&request.interest)
    .bind(&request.source)
    .bind(request.status.unwrap_or(LeadStatus::New))
    .bind(Utc::now().naive_utc())
    .bind(&request.notes)
    .execute(pool)
    .await?;

    fetch_lead(pool, &id).await
}

/// Turns a lead into a CLIENTE account with the fixed default password. The
/// account insert and the lead status change commit together, so a failed
/// conversion leaves the lead untouched.
pub async fn convert_lead_to_client(pool: &SqlitePool, lead_id: &str) -> ApiResult<UserRow> {
    let lead = fetch_lead(pool, lead_id).await?;
    let email = lead
        .email
        .as_deref()
        .filter(|email| !email.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("Lead has no email to register".into()))?;
    if fetch_user_by_email(pool, email).await?.is_some() {
        return Err(ApiError::Conflict(
            "El email ya está registrado como usuario".into(),
        ));
    }

    let password_hash = hash_password("password123")
        .map_err(|_| ApiError::Validation("Password could not be hashed".into()))?;
    let user_id = new_id();

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"INSERT INTO users (id, email, password_hash, name, phone, role, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&user_id)
    .bind(email)
    .bind(password_hash)
    .bind(&lead.name)
    .bind(&lead.phone)
    .bind(Role::Cliente)
    .bind(Utc::now().naive_utc())
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE leads SET status = ? WHERE id = ?")
        .bind(LeadStatus::Converted)
        .bind(lead_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    crate::db::fetch_user(pool, &user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))
}

/// Qualifies the lead and opens an opportunity for the given service type.
pub async fn convert_lead_to_opportunity(
    pool: &SqlitePool,
    lead_id: &str,
    service_type_id: &str,
) -> ApiResult<OpportunityRow> {
    fetch_lead(pool, lead_id).await?;
    let type_exists: Option<(String,)> =
        sqlx::query_as("SELECT id FROM appointment_types WHERE id = ? LIMIT 1")
            .bind(service_type_id)
            .fetch_optional(pool)
            .await?;
    if type_exists.is_none() {
        return Err(ApiError::NotFound("Appointment type"));
    }

    let id = new_id();
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE leads SET status = ? WHERE id = ?")
        .bind(LeadStatus::Qualified)
        .bind(lead_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        r#"INSERT INTO opportunities (id, lead_id, appointment_type_id, estimated_value, status, updated_at, follow_up_notes)
           VALUES (?, ?, ?, NULL, ?, ?, NULL)"#,
    )
    .bind(&id)
    .bind(lead_id)
    .bind(service_type_id)
    .bind(OpportunityStatus::PendingAppointment)
    .bind(Utc::now().naive_utc())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let opportunity =
        sqlx::query_as::<_, OpportunityRow>("SELECT * FROM opportunities WHERE id = ? LIMIT 1")
            .bind(&id)
            .fetch_one(pool)
            .await?;
    Ok(opportunity)
}

async fn fetch_lead(pool: &SqlitePool, id: &str) -> ApiResult<LeadRow> {
    sqlx::query_as::<_, LeadRow>("SELECT * FROM leads WHERE id = ? LIMIT 1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("Lead"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, tests_support};

    fn lead_req(name: &str, email: Option<&str>) -> LeadRequest {
        LeadRequest {
            name: name.into(),
            email: email.map(String::from),
            phone: Some("555-0100".into()),
            interest: Some("Corte".into()),
            source: Some("CHATBOT".into()),
            status: None,
            notes: None,
        }
    }

    async fn insert_type(pool: &sqlx::SqlitePool, name: &str) -> String {
        let id = new_id();
        sqlx::query(
            "INSERT INTO appointment_types (id, name, price, duration_minutes) VALUES (?, ?, 15.0, 60)",
        )
        .bind(&id)
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[actix_web::test]
    async fn captured_lead_defaults_to_new() {
        let pool = test_pool().await;
        let lead = create_lead(&pool, lead_req("Ana", Some("ana@test.com")))
            .await
            .unwrap();
        assert_eq!(lead.status, LeadStatus::New);
    }

    #[actix_web::test]
    async fn conversion_creates_cliente_and_marks_lead() {
        let pool = test_pool().await;
        let lead = create_lead(&pool, lead_req("Ana", Some("ana@test.com")))
            .await
            .unwrap();

        let user = convert_lead_to_client(&pool, &lead.id).await.unwrap();
        assert_eq!(user.role, Role::Cliente);
        assert_eq!(user.email, "ana@test.com");

        let lead = fetch_lead(&pool, &lead.id).await.unwrap();
        assert_eq!(lead.status, LeadStatus::Converted);
    }

    #[actix_web::test]
    async fn conversion_conflicts_on_taken_email_and_keeps_status() {
        let pool = test_pool().await;
        tests_support::insert_user(&pool, "taken@test.com", Role::Cliente).await;
        let lead = create_lead(&pool, lead_req("Ana", Some("taken@test.com")))
            .await
            .unwrap();

        let err = convert_lead_to_client(&pool, &lead.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let lead = fetch_lead(&pool, &lead.id).await.unwrap();
        assert_eq!(lead.status, LeadStatus::New);
    }

    #[actix_web::test]
    async fn opportunity_conversion_qualifies_the_lead() {
        let pool = test_pool().await;
        let type_id = insert_type(&pool, "Corte clásico").await;
        let lead = create_lead(&pool, lead_req("Luis", None)).await.unwrap();

        let opp = convert_lead_to_opportunity(&pool, &lead.id, &type_id)
            .await
            .unwrap();
        assert_eq!(opp.status, OpportunityStatus::PendingAppointment);
        assert_eq!(opp.lead_id, lead.id);

        let lead = fetch_lead(&pool, &lead.id).await.unwrap();
        assert_eq!(lead.status, LeadStatus::Qualified);
    }

    #[actix_web::test]
    async fn opportunity_conversion_requires_known_type() {
        let pool = test_pool().await;
        let lead = create_lead(&pool, lead_req("Luis", None)).await.unwrap();

        let err = convert_lead_to_opportunity(&pool, &lead.id, "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Appointment type")));

        let lead = fetch_lead(&pool, &lead.id).await.unwrap();
        assert_eq!(lead.status, LeadStatus::New);
    }
}
