use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::mail::Mailer;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub session_ttl_hours: i64,
    pub mailer: Mailer,
}

/* -------------------------
   Response envelope
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiOk<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

/* -------------------------
   Enums (smallint in DB, names on the wire)
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum Role {
    #[serde(rename = "patient")]
    Patient = 0,
    #[serde(rename = "admin")]
    Admin = 1,
    #[serde(rename = "doctor")]
    Doctor = 2,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Admin => "admin",
            Role::Doctor => "doctor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum AppointmentStatus {
    Pending = 0,
    Confirmed = 1,
    Completed = 2,
    Cancelled = 3,
    #[serde(rename = "No-Show")]
    NoShow = 4,
}

impl AppointmentStatus {
    /// Pending/Confirmed appointments still occupy their slot.
    pub fn is_active(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum AppointmentType {
    Consultation = 0,
    #[serde(rename = "Follow-up")]
    FollowUp = 1,
    Emergency = 2,
    #[serde(rename = "Routine Check-up")]
    RoutineCheckup = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum Specialization {
    Cardiology = 0,
    Dermatology = 1,
    Pediatrics = 2,
    Neurology = 3,
    Orthopedics = 4,
    Psychiatry = 5,
    #[serde(rename = "General Medicine")]
    GeneralMedicine = 6,
    Gynecology = 7,
    Dentistry = 8,
    Ophthalmology = 9,
    #[serde(rename = "ENT")]
    Ent = 10,
    Oncology = 11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum Gender {
    Male = 0,
    Female = 1,
    Other = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APositive = 0,
    #[serde(rename = "A-")]
    ANegative = 1,
    #[serde(rename = "B+")]
    BPositive = 2,
    #[serde(rename = "B-")]
    BNegative = 3,
    #[serde(rename = "AB+")]
    AbPositive = 4,
    #[serde(rename = "AB-")]
    AbNegative = 5,
    #[serde(rename = "O+")]
    OPositive = 6,
    #[serde(rename = "O-")]
    ONegative = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum BillingStatus {
    Pending = 0,
    Paid = 1,
    #[serde(rename = "Partially Paid")]
    PartiallyPaid = 2,
    Overdue = 3,
    Cancelled = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum PaymentMethod {
    Cash = 0,
    Card = 1,
    Insurance = 2,
    Online = 3,
    Other = 4,
}

/* -------------------------
   Document-shaped sub-records (jsonb columns)
--------------------------*/

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Qualification {
    pub degree: String,
    pub institution: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allergy {
    pub name: String,
    pub severity: Option<String>,
    pub reaction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChronicCondition {
    pub condition: String,
    pub diagnosed_date: Option<NaiveDate>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: Option<String>,
    pub relationship: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsuranceInfo {
    pub provider: Option<String>,
    pub policy_number: Option<String>,
    pub group_number: Option<String>,
    pub valid_until: Option<NaiveDate>,
}

/// One weekday's bookable windows on a doctor's weekly grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAvailability {
    pub day: String,
    pub slots: Vec<AvailabilitySlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub is_booked: bool,
}

pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/* -------------------------
   Shared DB rows / DTOs
--------------------------*/

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<Json<Address>>,
    pub is_active: bool,
    pub is_email_verified: bool,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub is_email_verified: bool,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            user_id: row.user_id,
            email: row.email,
            role: row.role,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            address: row.address.map(|j| j.0),
            is_email_verified: row.is_email_verified,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/* -------------------------
   Helpers
--------------------------*/

/// Parse a slot boundary as sent by clients ("09:00", seconds optional).
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(
            parse_hhmm("09:00"),
            Some(NaiveTime::from_hms_opt(9, 0, 0).unwrap())
        );
        assert_eq!(
            parse_hhmm(" 14:30:00 "),
            Some(NaiveTime::from_hms_opt(14, 30, 0).unwrap())
        );
        assert!(parse_hhmm("25:00").is_none());
        assert!(parse_hhmm("9am").is_none());
        assert!(parse_hhmm("").is_none());
    }

    #[test]
    fn test_status_wire_names() {
        let s = serde_json::to_string(&AppointmentStatus::NoShow).unwrap();
        assert_eq!(s, "\"No-Show\"");
        let back: AppointmentStatus = serde_json::from_str("\"Confirmed\"").unwrap();
        assert_eq!(back, AppointmentStatus::Confirmed);
    }

    #[test]
    fn test_active_statuses() {
        assert!(AppointmentStatus::Pending.is_active());
        assert!(AppointmentStatus::Confirmed.is_active());
        assert!(!AppointmentStatus::Completed.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
        assert!(!AppointmentStatus::NoShow.is_active());
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Doctor).unwrap(), "\"doctor\"");
        let r: Role = serde_json::from_str("\"patient\"").unwrap();
        assert_eq!(r, Role::Patient);
        assert_eq!(r.as_str(), "patient");
    }

    #[test]
    fn test_specialization_wire_names() {
        assert_eq!(
            serde_json::to_string(&Specialization::GeneralMedicine).unwrap(),
            "\"General Medicine\""
        );
        let s: Specialization = serde_json::from_str("\"ENT\"").unwrap();
        assert_eq!(s, Specialization::Ent);
    }

    #[test]
    fn test_blood_type_wire_names() {
        assert_eq!(serde_json::to_string(&BloodType::ONegative).unwrap(), "\"O-\"");
        let b: BloodType = serde_json::from_str("\"AB+\"").unwrap();
        assert_eq!(b, BloodType::AbPositive);
    }
}
