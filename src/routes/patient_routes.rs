// src/routes/patient_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json as Jsonb;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    middleware::policy::{ensure_role, is_admin},
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients", get(list_patients))
        .route("/patients/{patient_id}", get(get_patient).put(update_patient))
        .route("/patients/{patient_id}/vitals", post(add_vital_sign))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PatientListItem {
    pub patient_id: Uuid,
    pub user_id: Uuid,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub blood_type: Option<BloodType>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct PatientDetailRow {
    patient_id: Uuid,
    user_id: Uuid,
    date_of_birth: NaiveDate,
    gender: Gender,
    blood_type: Option<BloodType>,
    allergies: Jsonb<Vec<Allergy>>,
    chronic_conditions: Jsonb<Vec<ChronicCondition>>,
    emergency_contact: Option<Jsonb<EmergencyContact>>,
    insurance_info: Option<Jsonb<InsuranceInfo>>,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PatientDetail {
    pub patient_id: Uuid,
    pub user_id: Uuid,
    pub date_of_birth: NaiveDate,
    pub age: i32,
    pub gender: Gender,
    pub blood_type: Option<BloodType>,
    pub allergies: Vec<Allergy>,
    pub chronic_conditions: Vec<ChronicCondition>,
    pub emergency_contact: Option<EmergencyContact>,
    pub insurance_info: Option<InsuranceInfo>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PatientDetailRow {
    fn into_detail(self, today: NaiveDate) -> PatientDetail {
        PatientDetail {
            age: age_on(self.date_of_birth, today),
            patient_id: self.patient_id,
            user_id: self.user_id,
            date_of_birth: self.date_of_birth,
            gender: self.gender,
            blood_type: self.blood_type,
            allergies: self.allergies.0,
            chronic_conditions: self.chronic_conditions.0,
            emergency_contact: self.emergency_contact.map(|j| j.0),
            insurance_info: self.insurance_info.map(|j| j.0),
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePatientRequest {
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub blood_type: Option<BloodType>,
    pub allergies: Option<Vec<Allergy>>,
    pub chronic_conditions: Option<Vec<ChronicCondition>>,
    pub emergency_contact: Option<EmergencyContact>,
    pub insurance_info: Option<InsuranceInfo>,
}

#[derive(Debug, Deserialize)]
pub struct AddVitalSignRequest {
    pub systolic: Option<i32>,
    pub diastolic: Option<i32>,
    pub heart_rate: Option<i32>,
    pub temperature: Option<f64>,
    pub respiratory_rate: Option<i32>,
    pub oxygen_saturation: Option<i32>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct VitalSignRow {
    pub vital_sign_id: Uuid,
    pub patient_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub systolic: Option<i32>,
    pub diastolic: Option<i32>,
    pub heart_rate: Option<i32>,
    pub temperature: Option<f64>,
    pub respiratory_rate: Option<i32>,
    pub oxygen_saturation: Option<i32>,
}

const PATIENT_DETAIL_SELECT: &str = r#"
    SELECT
      p.patient_id,
      p.user_id,
      p.date_of_birth,
      p.gender,
      p.blood_type,
      p.allergies,
      p.chronic_conditions,
      p.emergency_contact,
      p.insurance_info,
      u.first_name,
      u.last_name,
      u.email,
      u.phone,
      p.created_at
    FROM patient p
    JOIN hcms_user u ON u.user_id = p.user_id
"#;

/// Completed years between date of birth and `today`.
fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    use chrono::Datelike;

    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age.max(0)
}

async fn fetch_patient_row(state: &AppState, patient_id: Uuid) -> Result<PatientDetailRow, ApiError> {
    sqlx::query_as::<_, PatientDetailRow>(&format!(
        "{PATIENT_DETAIL_SELECT} WHERE p.patient_id = $1"
    ))
    .bind(patient_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::NotFound("PATIENT_NOT_FOUND", "Patient not found".into()))
}

/* ============================================================
   GET /api/patients (doctor/admin)
   ============================================================ */

pub async fn list_patients(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<PatientListItem>>>, ApiError> {
    ensure_role(&auth, &[Role::Doctor, Role::Admin])?;

    let patients: Vec<PatientListItem> = sqlx::query_as::<_, PatientListItem>(
        r#"
        SELECT
          p.patient_id,
          p.user_id,
          p.date_of_birth,
          p.gender,
          p.blood_type,
          u.first_name,
          u.last_name,
          u.email,
          u.phone,
          p.created_at
        FROM patient p
        JOIN hcms_user u ON u.user_id = p.user_id
        ORDER BY p.created_at DESC
        LIMIT 200
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk::new(patients)))
}

/* ============================================================
   GET /api/patients/{patient_id}
   ============================================================ */

pub async fn get_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ApiOk<PatientDetail>>, ApiError> {
    let row = fetch_patient_row(&state, patient_id).await?;

    // Staff may view any patient; a patient only their own record.
    if auth.role == Role::Patient && row.user_id != auth.user_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "You may only view your own patient record".into(),
        ));
    }

    Ok(Json(ApiOk::new(row.into_detail(Utc::now().date_naive()))))
}

/* ============================================================
   PUT /api/patients/{patient_id} (patient-self or admin)
   ============================================================ */

pub async fn update_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<UpdatePatientRequest>,
) -> Result<Json<ApiOk<PatientDetail>>, ApiError> {
    let existing = fetch_patient_row(&state, patient_id).await?;

    if !is_admin(&auth) && existing.user_id != auth.user_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "You may only update your own patient record".into(),
        ));
    }

    sqlx::query(
        r#"
        UPDATE patient
        SET date_of_birth      = COALESCE($2, date_of_birth),
            gender             = COALESCE($3, gender),
            blood_type         = COALESCE($4, blood_type),
            allergies          = COALESCE($5, allergies),
            chronic_conditions = COALESCE($6, chronic_conditions),
            emergency_contact  = COALESCE($7, emergency_contact),
            insurance_info     = COALESCE($8, insurance_info),
            updated_at         = now()
        WHERE patient_id = $1
        "#,
    )
    .bind(patient_id)
    .bind(req.date_of_birth)
    .bind(req.gender)
    .bind(req.blood_type)
    .bind(req.allergies.map(Jsonb))
    .bind(req.chronic_conditions.map(Jsonb))
    .bind(req.emergency_contact.map(Jsonb))
    .bind(req.insurance_info.map(Jsonb))
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let row = fetch_patient_row(&state, patient_id).await?;
    Ok(Json(ApiOk::with_message(
        "Patient updated",
        row.into_detail(Utc::now().date_naive()),
    )))
}

/* ============================================================
   POST /api/patients/{patient_id}/vitals (doctor/admin)
   ============================================================ */

pub async fn add_vital_sign(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<AddVitalSignRequest>,
) -> Result<Json<ApiOk<VitalSignRow>>, ApiError> {
    ensure_role(&auth, &[Role::Doctor, Role::Admin])?;

    if req.systolic.is_none()
        && req.diastolic.is_none()
        && req.heart_rate.is_none()
        && req.temperature.is_none()
        && req.respiratory_rate.is_none()
        && req.oxygen_saturation.is_none()
    {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "at least one measurement is required".into(),
        ));
    }

    // Ensure the patient exists before appending
    let _ = fetch_patient_row(&state, patient_id).await?;

    let row: VitalSignRow = sqlx::query_as::<_, VitalSignRow>(
        r#"
        INSERT INTO patient_vital_sign
            (patient_id, systolic, diastolic, heart_rate, temperature,
             respiratory_rate, oxygen_saturation)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING vital_sign_id, patient_id, recorded_at, systolic, diastolic,
                  heart_rate, temperature, respiratory_rate, oxygen_saturation
        "#,
    )
    .bind(patient_id)
    .bind(req.systolic)
    .bind(req.diastolic)
    .bind(req.heart_rate)
    .bind(req.temperature)
    .bind(req.respiratory_rate)
    .bind(req.oxygen_saturation)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk::with_message("Vital signs recorded", row)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_age_before_and_after_birthday() {
        let dob = d(1990, 6, 15);
        assert_eq!(age_on(dob, d(2025, 6, 14)), 34);
        assert_eq!(age_on(dob, d(2025, 6, 15)), 35);
        assert_eq!(age_on(dob, d(2025, 6, 16)), 35);
    }

    #[test]
    fn test_age_never_negative() {
        assert_eq!(age_on(d(2030, 1, 1), d(2025, 1, 1)), 0);
    }

    #[test]
    fn test_age_leap_day_birthday() {
        let dob = d(2000, 2, 29);
        assert_eq!(age_on(dob, d(2025, 2, 28)), 24);
        assert_eq!(age_on(dob, d(2025, 3, 1)), 25);
    }
}
