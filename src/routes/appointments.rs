use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::auth::{identify, identify_optional, new_id, AuthUser};
use crate::availability::{day_bounds, open_slots};
use crate::db::fetch_barber;
use crate::error::{ApiError, ApiResult};
use crate::models::{AppointmentRow, AppointmentStatus};
use crate::policy::{self, Action, Resource};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRequest {
    pub user_id: Option<String>,
    pub barber_id: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub appointment_type_id: Option<String>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub creation_source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotQuery {
    barber_id: String,
    date: String,
}

/// Who the appointment is for. Guest bookings carry full contact info, so a
/// "neither user nor guest" appointment cannot exist past validation.
enum Party {
    Registered(String),
    Guest {
        name: String,
        email: String,
        phone: Option<String>,
    },
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/appointments")
            .service(web::resource("/available-slots").route(web::get().to(available_slots)))
            .service(
                web::resource("/my-barber-appointments")
                    .route(web::get().to(my_barber_appointments)),
            )
            .service(web::resource("/barber/{barber_id}").route(web::get().to(barber_appointments)))
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

async fn available_slots(
    state: web::Data<AppState>,
    query: web::Query<SlotQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    let date: NaiveDate = query
        .date
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid date: {}", query.date)))?;

    let slots = slots_for(&state.db, &query.barber_id, date).await?;
    let slots: Vec<String> = slots
        .into_iter()
        .map(|slot| slot.format("%Y-%m-%dT%H:%M:%S").to_string())
        .collect();
    Ok(HttpResponse::Ok().json(slots))
}

/// Open slots for one barber/date. No barber-existence check here: an
/// unknown id simply has no bookings, so every slot comes back open.
pub async fn slots_for(
    pool: &SqlitePool,
    barber_id: &str,
    date: NaiveDate,
) -> ApiResult<Vec<NaiveDateTime>> {
    let (day_start, day_end) = day_bounds(date);
    let booked: Vec<(NaiveDateTime,)> = sqlx::query_as(
        "SELECT start_time FROM appointments WHERE barber_id = ? AND start_time BETWEEN ? AND ?",
    )
    .bind(barber_id)
    .bind(day_start)
    .bind(day_end)
    .fetch_all(pool)
    .await?;

    let booked: Vec<NaiveDateTime> = booked.into_iter().map(|(start,)| start).collect();
    Ok(open_slots(date, &booked, Utc::now().naive_utc()))
}

async fn create(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<AppointmentRequest>,
) -> ApiResult<HttpResponse> {
    let auth = identify_optional(&req, &state.db).await?;
    policy::authorize(auth.as_ref(), Resource::Appointments, Action::Create)?;
    let appointment = book(&state.db, payload.into_inner(), auth.as_ref()).await?;
    Ok(HttpResponse::Ok().json(appointment))
}

pub async fn book(
    pool: &SqlitePool,
    request: AppointmentRequest,
    auth: Option<&AuthUser>,
) -> ApiResult<AppointmentRow> {
    let barber_id = request
        .barber_id
        .as_deref()
        .ok_or_else(|| ApiError::Validation("barberId is required".into()))?;
    fetch_barber(pool, barber_id)
        .await?
        .ok_or(ApiError::NotFound("Barber"))?;

    let start_time = request
        .start_time
        .ok_or_else(|| ApiError::Validation("startTime is required".into()))?;
    // Explicit end time wins; otherwise the default one-hour slot.
    let end_time = request.end_time.unwrap_or(start_time + Duration::hours(1));
    if end_time <= start_time {
        return Err(ApiError::Validation("endTime must be after startTime".into()));
    }

    let party = match request.user_id.as_deref() {
        Some(user_id) => {
            let user = crate::db::fetch_user(pool, user_id)
                .await?
                .ok_or(ApiError::NotFound("User"))?;
            Party::Registered(user.id)
        }
        None => {
            let name = request.guest_name.clone().filter(|n| !n.trim().is_empty());
            let email = request.guest_email.clone().filter(|e| !e.trim().is_empty());
            match (name, email) {
                (Some(name), Some(email)) => Party::Guest {
                    name,
                    email,
                    phone: request.guest_phone.clone(),
                },
                _ => {
                    return Err(ApiError::Validation(
                        "Guest name and email are required for guest bookings".into(),
                    ))
                }
            }
        }
    };

    // Type attachment is best-effort: an unresolved id leaves it unset.
    let appointment_type_id = match request.appointment_type_id.as_deref() {
        Some(type_id) => sqlx::query_as::<_, (String,)>(
            "SELECT id FROM appointment_types WHERE id = ? LIMIT 1",
        )
        .bind(type_id)
        .fetch_optional(pool)
        .await?
        .map(|(id,)| id),
        None => None,
    };

    let (user_id, guest_name, guest_email, guest_phone) = match party {
        Party::Registered(id) => (Some(id), None, None, None),
        Party::Guest { name, email, phone } => (None, Some(name), Some(email), phone),
    };

    let created_by = auth
        .map(|user| user.email.clone())
        .unwrap_or_else(|| "GUEST".to_string());
    let creation_source = request
        .creation_source
        .clone()
        .filter(|source| !source.trim().is_empty())
        .unwrap_or_else(|| "WEB".to_string());

    let id = new_id();
    let result = sqlx::query(
        r#"INSERT INTO appointments
           (id, user_id, barber_id, start_time, end_time, status, guest_name, guest_email,
            guest_phone, notes, appointment_type_id, created_at, created_by, creation_source)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&user_id)
    .bind(barber_id)
    .bind(start_time)
    .bind(end_time)
    .bind(AppointmentStatus::Booked)
    .bind(&guest_name)
    .bind(&guest_email)
    .bind(&guest_phone)
    .bind(&request.notes)
    .bind(&appointment_type_id)
    .bind(Utc::now().naive_utc())
    .bind(created_by)
    .bind(creation_source)
    .execute(pool)
    .await;

    if let Err(err) = result {
        if is_unique_violation(&err) {
            return Err(ApiError::Conflict(
                "The barber already has a booking at that time".into(),
            ));
        }
        return Err(err.into());
    }

    fetch_appointment(pool, &id)
        .await?
        .ok_or(ApiError::NotFound("Appointment"))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn list(req: HttpRequest, state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Appointments, Action::Read)?;

    let rows = if policy::is_admin(&auth) {
        sqlx::query_as::<_, AppointmentRow>("SELECT * FROM appointments ORDER BY start_time DESC")
            .fetch_all(&state.db)
            .await?
    } else {
        sqlx::query_as::<_, AppointmentRow>(
            "SELECT * FROM appointments WHERE user_id = ? ORDER BY start_time DESC",
        )
        .bind(&auth.id)
        .fetch_all(&state.db)
        .await?
    };
    Ok(HttpResponse::Ok().json(rows))
}

async fn get_by_id(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Appointments, Action::Read)?;

    let appointment = fetch_appointment(&state.db, &path.into_inner())
        .await?
        .ok_or(ApiError::NotFound("Appointment"))?;
    Ok(HttpResponse::Ok().json(appointment))
}

async fn barber_appointments(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Appointments, Action::Read)?;

    let rows = sqlx::query_as::<_, AppointmentRow>(
        "SELECT * FROM appointments WHERE barber_id = ? ORDER BY start_time",
    )
    .bind(path.into_inner())
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn my_barber_appointments(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Appointments, Action::Read)?;

    let barber: Option<(String,)> =
        sqlx::query_as("SELECT id FROM barbers WHERE user_id = ? LIMIT 1")
            .bind(&auth.id)
            .fetch_optional(&state.db)
            .await?;
    let (barber_id,) = barber.ok_or(ApiError::NotFound("Barber profile"))?;

    let rows = sqlx::query_as::<_, AppointmentRow>(
        "SELECT * FROM appointments WHERE barber_id = ? ORDER BY start_time",
    )
    .bind(barber_id)
    .fetch_all(&state.db)
    .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn update(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<AppointmentRequest>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Appointments, Action::Update)?;

    let appointment = patch(&state.db, &path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(appointment))
}

/// Partial patch: each field overwrites only when present. A new start time
/// without an explicit end recomputes the default one-hour slot.
pub async fn patch(
    pool: &SqlitePool,
    id: &str,
    request: AppointmentRequest,
) -> ApiResult<AppointmentRow> {
    let mut appointment = fetch_appointment(pool, id)
        .await?
        .ok_or(ApiError::NotFound("Appointment"))?;

    if let Some(barber_id) = request.barber_id.as_deref() {
        fetch_barber(pool, barber_id)
            .await?
            .ok_or(ApiError::NotFound("Barber"))?;
        appointment.barber_id = Some(barber_id.to_string());
    }

    if let Some(start_time) = request.start_time {
        appointment.start_time = start_time;
        appointment.end_time = request.end_time.unwrap_or(start_time + Duration::hours(1));
    } else if let Some(end_time) = request.end_time {
        appointment.end_time = end_time;
    }
    if appointment.end_time <= appointment.start_time {
        return Err(ApiError::Validation("endTime must be after startTime".into()));
    }

    if let Some(notes) = request.notes {
        appointment.notes = Some(notes);
    }
    if let Some(type_id) = request.appointment_type_id.as_deref() {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM appointment_types WHERE id = ? LIMIT 1")
                .bind(type_id)
                .fetch_optional(pool)
                .await?;
        exists.ok_or(ApiError::NotFound("Appointment type"))?;
        appointment.appointment_type_id = Some(type_id.to_string());
    }

    let result = sqlx::query(
        r#"UPDATE appointments
           SET barber_id = ?, start_time = ?, end_time = ?, notes = ?, appointment_type_id = ?
           WHERE id = ?"#,
    )
    .bind(&appointment.barber_id)
    .bind(appointment.start_time)
    .bind(appointment.end_time)
    .bind(&appointment.notes)
    .bind(&appointment.appointment_type_id)
    .bind(id)
    .execute(pool)
    .await;

    if let Err(err) = result {
        if is_unique_violation(&err) {
            return Err(ApiError::Conflict(
                "The barber already has a booking at that time".into(),
            ));
        }
        return Err(err.into());
    }

    fetch_appointment(pool, id)
        .await?
        .ok_or(ApiError::NotFound("Appointment"))
}

async fn delete(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let auth = identify(&req, &state.db).await?;
    policy::authorize(Some(&auth), Resource::Appointments, Action::Delete)?;

    let id = path.into_inner();
    let appointment = fetch_appointment(&state.db, &id)
        .await?
        .ok_or(ApiError::NotFound("Appointment"))?;

    let is_owner = appointment.user_id.as_deref() == Some(auth.id.as_str());
    if !policy::is_admin(&auth) && !is_owner {
        return Err(ApiError::Permission(
            "You are not authorized to delete this appointment".into(),
        ));
    }

    sqlx::query("DELETE FROM appointments WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Appointment deleted" })))
}

pub async fn fetch_appointment(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<AppointmentRow>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentRow>("SELECT * FROM appointments WHERE id = ? LIMIT 1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, tests_support};
    use crate::models::Role;

    fn booking(barber_id: &str, start: &str) -> AppointmentRequest {
        AppointmentRequest {
            barber_id: Some(barber_id.to_string()),
            start_time: Some(start.parse().unwrap()),
            guest_name: Some("Pedro".into()),
            guest_email: Some("pedro@test.com".into()),
            ..AppointmentRequest::default()
        }
    }

    #[actix_web::test]
    async fn guest_booking_defaults_one_hour_and_booked_status() {
        let pool = test_pool().await;
        let barber = tests_support::insert_barber(&pool, "Luis").await;

        let appt = book(&pool, booking(&barber, "2030-05-05T10:00:00"), None)
            .await
            .unwrap();
        assert_eq!(appt.status, AppointmentStatus::Booked);
        assert_eq!(appt.end_time, "2030-05-05T11:00:00".parse().unwrap());
        assert_eq!(appt.created_by, "GUEST");
        assert_eq!(appt.creation_source, "WEB");
    }

    #[actix_web::test]
    async fn explicit_end_time_wins_over_default() {
        let pool = test_pool().await;
        let barber = tests_support::insert_barber(&pool, "Luis").await;

        let mut request = booking(&barber, "2030-05-05T10:00:00");
        request.end_time = Some("2030-05-05T12:30:00".parse().unwrap());
        let appt = book(&pool, request, None).await.unwrap();
        assert_eq!(appt.end_time, "2030-05-05T12:30:00".parse().unwrap());
    }

    #[actix_web::test]
    async fn missing_guest_info_is_rejected() {
        let pool = test_pool().await;
        let barber = tests_support::insert_barber(&pool, "Luis").await;

        let mut request = booking(&barber, "2030-05-05T10:00:00");
        request.guest_email = None;
        let err = book(&pool, request, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[actix_web::test]
    async fn unknown_barber_is_not_found() {
        let pool = test_pool().await;
        let err = book(&pool, booking("missing", "2030-05-05T10:00:00"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Barber")));
    }

    #[actix_web::test]
    async fn double_booking_same_slot_conflicts() {
        let pool = test_pool().await;
        let barber = tests_support::insert_barber(&pool, "Luis").await;

        book(&pool, booking(&barber, "2030-05-05T10:00:00"), None)
            .await
            .unwrap();
        let err = book(&pool, booking(&barber, "2030-05-05T10:00:00"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[actix_web::test]
    async fn booked_slot_disappears_from_availability() {
        let pool = test_pool().await;
        let barber = tests_support::insert_barber(&pool, "Luis").await;
        let date: NaiveDate = "2030-05-05".parse().unwrap();

        assert_eq!(slots_for(&pool, &barber, date).await.unwrap().len(), 9);

        book(&pool, booking(&barber, "2030-05-05T11:00:00"), None)
            .await
            .unwrap();
        let slots = slots_for(&pool, &barber, date).await.unwrap();
        assert_eq!(slots.len(), 8);
        assert!(!slots.contains(&"2030-05-05T11:00:00".parse().unwrap()));
        // Duration is ignored by the collision rule: neighbours stay open.
        assert!(slots.contains(&"2030-05-05T10:00:00".parse().unwrap()));
        assert!(slots.contains(&"2030-05-05T12:00:00".parse().unwrap()));
    }

    #[actix_web::test]
    async fn unknown_barber_has_all_slots_open() {
        let pool = test_pool().await;
        let date: NaiveDate = "2030-05-05".parse().unwrap();
        assert_eq!(slots_for(&pool, "ghost", date).await.unwrap().len(), 9);
    }

    #[actix_web::test]
    async fn unresolved_type_is_silently_ignored_on_create() {
        let pool = test_pool().await;
        let barber = tests_support::insert_barber(&pool, "Luis").await;

        let mut request = booking(&barber, "2030-05-05T10:00:00");
        request.appointment_type_id = Some("no-such-type".into());
        let appt = book(&pool, request, None).await.unwrap();
        assert!(appt.appointment_type_id.is_none());
    }

    #[actix_web::test]
    async fn registered_booking_requires_existing_user() {
        let pool = test_pool().await;
        let barber = tests_support::insert_barber(&pool, "Luis").await;

        let mut request = booking(&barber, "2030-05-05T10:00:00");
        request.user_id = Some("ghost".into());
        let err = book(&pool, request, None).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("User")));

        let user = tests_support::insert_user(&pool, "ana@test.com", Role::Cliente).await;
        let mut request = booking(&barber, "2030-05-05T12:00:00");
        request.user_id = Some(user.clone());
        let appt = book(&pool, request, None).await.unwrap();
        assert_eq!(appt.user_id.as_deref(), Some(user.as_str()));
        assert!(appt.guest_name.is_none());
    }

    #[actix_web::test]
    async fn patch_recomputes_end_when_start_moves() {
        let pool = test_pool().await;
        let barber = tests_support::insert_barber(&pool, "Luis").await;
        let appt = book(&pool, booking(&barber, "2030-05-05T10:00:00"), None)
            .await
            .unwrap();

        let patched = patch(
            &pool,
            &appt.id,
            AppointmentRequest {
                start_time: Some("2030-05-05T14:00:00".parse().unwrap()),
                ..AppointmentRequest::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(patched.end_time, "2030-05-05T15:00:00".parse().unwrap());

        // Other fields survive the patch untouched.
        assert_eq!(patched.guest_name.as_deref(), Some("Pedro"));
    }

    #[actix_web::test]
    async fn patch_with_unknown_type_is_not_found() {
        let pool = test_pool().await;
        let barber = tests_support::insert_barber(&pool, "Luis").await;
        let appt = book(&pool, booking(&barber, "2030-05-05T10:00:00"), None)
            .await
            .unwrap();

        let err = patch(
            &pool,
            &appt.id,
            AppointmentRequest {
                appointment_type_id: Some("ghost".into()),
                ..AppointmentRequest::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Appointment type")));
    }
}
