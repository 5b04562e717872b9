use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Account roles. One convention everywhere: the SCREAMING_SNAKE_CASE enum
/// name is both the wire value and the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Cliente,
    Admin,
    Barber,
    Reception,
    AdminBarber,
}

impl Role {
    /// Lenient parse used at signup/admin-creation; "CLIENT" is accepted as
    /// an alias for CLIENTE and anything unknown falls back to USER.
    pub fn parse_or_default(value: Option<&str>) -> Role {
        match value.map(|v| v.trim().to_uppercase()) {
            Some(v) => match v.as_str() {
                "CLIENT" | "CLIENTE" => Role::Cliente,
                "ADMIN" => Role::Admin,
                "BARBER" => Role::Barber,
                "RECEPTION" => Role::Reception,
                "ADMIN_BARBER" => Role::AdminBarber,
                _ => Role::User,
            },
            None => Role::User,
        }
    }

    pub fn owns_barber_profile(self) -> bool {
        matches!(self, Role::Barber | Role::AdminBarber)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Booked,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpportunityStatus {
    PendingAppointment,
    Scheduled,
    Won,
    Lost,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub role: Role,
    pub observations: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarberRow {
    pub id: String,
    pub name: String,
    pub photo_url: Option<String>,
    pub active: bool,
    pub color: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentTypeRow {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub duration_minutes: i64,
    pub color: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRow {
    pub id: String,
    pub user_id: Option<String>,
    pub barber_id: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: AppointmentStatus,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub notes: Option<String>,
    pub appointment_type_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub created_by: String,
    pub creation_source: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRow {
    pub id: String,
    pub date: NaiveDateTime,
    pub total_amount: f64,
    pub status: String,
    pub payment_method: String,
    pub client_id: Option<String>,
    pub guest_name: Option<String>,
    pub notes: Option<String>,
    pub created_by_user_id: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemRow {
    pub id: String,
    #[serde(skip_serializing)]
    pub sale_id: String,
    pub appointment_type_id: Option<String>,
    pub product_id: Option<String>,
    pub item_name: String,
    pub price: f64,
    pub quantity: i64,
    pub subtotal: f64,
    pub barber_id: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashWithdrawalRow {
    pub id: String,
    pub amount: f64,
    pub description: Option<String>,
    pub timestamp: NaiveDateTime,
    pub performed_by_user_id: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashCutRow {
    pub id: String,
    pub timestamp: NaiveDateTime,
    pub total_calculated_amount: f64,
    pub total_actual_amount: Option<f64>,
    pub notes: Option<String>,
    pub performed_by_user_id: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRow {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub interest: Option<String>,
    pub source: Option<String>,
    pub status: LeadStatus,
    pub created_at: NaiveDateTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityRow {
    pub id: String,
    pub lead_id: String,
    pub appointment_type_id: String,
    pub estimated_value: Option<f64>,
    pub status: OpportunityStatus,
    pub updated_at: NaiveDateTime,
    pub follow_up_notes: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub discount_percentage: Option<f64>,
    pub price: Option<f64>,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredFileRow {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_accepts_client_alias() {
        assert_eq!(Role::parse_or_default(Some("client")), Role::Cliente);
        assert_eq!(Role::parse_or_default(Some("CLIENTE")), Role::Cliente);
    }

    #[test]
    fn role_parse_falls_back_to_user() {
        assert_eq!(Role::parse_or_default(None), Role::User);
        assert_eq!(Role::parse_or_default(Some("SUPERUSER")), Role::User);
    }

    #[test]
    fn role_serializes_as_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&Role::AdminBarber).unwrap(),
            "\"ADMIN_BARBER\""
        );
    }
}
