// src/routes/doctor_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use chrono::{DateTime, Utc};
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
        .route("/doctors", get(list_doctors))
        .route("/doctors/{doctor_id}", get(get_doctor).put(update_doctor))
        .route(
            "/doctors/{doctor_id}/availability",
            get(get_availability).put(put_availability),
        )
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DoctorListItem {
    pub doctor_id: Uuid,
    pub specialization: Specialization,
    pub experience_years: i32,
    pub consultation_fee_cents: i32,
    pub rating: f64,
    pub total_reviews: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DoctorDetail {
    pub doctor_id: Uuid,
    pub user_id: Uuid,
    pub specialization: Specialization,
    pub experience_years: i32,
    pub consultation_fee_cents: i32,
    pub bio: Option<String>,
    pub qualifications: Jsonb<Vec<Qualification>>,
    pub languages: Jsonb<Vec<String>>,
    pub registration_number: String,
    pub availability: Jsonb<Vec<DayAvailability>>,
    pub rating: f64,
    pub total_reviews: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DoctorsListData {
    pub doctors: Vec<DoctorListItem>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct DoctorsQuery {
    pub specialization: Option<Specialization>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDoctorRequest {
    pub specialization: Option<Specialization>,
    pub experience_years: Option<i32>,
    pub consultation_fee_cents: Option<i32>,
    pub bio: Option<String>,
    pub qualifications: Option<Vec<Qualification>>,
    pub languages: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct PutAvailabilityRequest {
    pub availability: Vec<DayAvailability>,
}

const DOCTOR_DETAIL_SELECT: &str = r#"
    SELECT
      d.doctor_id,
      d.user_id,
      d.specialization,
      d.experience_years,
      d.consultation_fee_cents,
      d.bio,
      d.qualifications,
      d.languages,
      d.registration_number,
      d.availability,
      d.rating,
      d.total_reviews,
      u.first_name,
      u.last_name,
      u.email,
      u.phone,
      d.created_at
    FROM doctor d
    JOIN hcms_user u ON u.user_id = d.user_id
"#;

async fn fetch_doctor_detail(state: &AppState, doctor_id: Uuid) -> Result<DoctorDetail, ApiError> {
    sqlx::query_as::<_, DoctorDetail>(&format!("{DOCTOR_DETAIL_SELECT} WHERE d.doctor_id = $1"))
        .bind(doctor_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
        .ok_or_else(|| ApiError::NotFound("DOCTOR_NOT_FOUND", "Doctor not found".into()))
}

/* ============================================================
   GET /api/doctors (public)
   ============================================================ */

pub async fn list_doctors(
    State(state): State<AppState>,
    Query(q): Query<DoctorsQuery>,
) -> Result<Json<ApiOk<DoctorsListData>>, ApiError> {
    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(10).clamp(1, 100);

    let search_pattern = q
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{s}%"));

    let doctors: Vec<DoctorListItem> = sqlx::query_as::<_, DoctorListItem>(
        r#"
        SELECT
          d.doctor_id,
          d.specialization,
          d.experience_years,
          d.consultation_fee_cents,
          d.rating,
          d.total_reviews,
          u.first_name,
          u.last_name,
          u.email,
          u.phone
        FROM doctor d
        JOIN hcms_user u ON u.user_id = d.user_id
        WHERE u.is_active = true
          AND ($1::smallint IS NULL OR d.specialization = $1)
          AND ($2::text IS NULL OR (u.first_name || ' ' || u.last_name) ILIKE $2)
        ORDER BY d.rating DESC, d.created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(q.specialization)
    .bind(search_pattern.as_deref())
    .bind(limit)
    .bind((page - 1) * limit)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM doctor d
        JOIN hcms_user u ON u.user_id = d.user_id
        WHERE u.is_active = true
          AND ($1::smallint IS NULL OR d.specialization = $1)
          AND ($2::text IS NULL OR (u.first_name || ' ' || u.last_name) ILIKE $2)
        "#,
    )
    .bind(q.specialization)
    .bind(search_pattern.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk::new(DoctorsListData {
        doctors,
        total,
        page,
        limit,
    })))
}

/* ============================================================
   GET /api/doctors/{doctor_id} (public)
   ============================================================ */

pub async fn get_doctor(
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<DoctorDetail>>, ApiError> {
    let doctor = fetch_doctor_detail(&state, doctor_id).await?;
    Ok(Json(ApiOk::new(doctor)))
}

/* ============================================================
   PUT /api/doctors/{doctor_id} (doctor-self or admin)
   ============================================================ */

async fn ensure_doctor_owner_or_admin(
    state: &AppState,
    auth: &AuthContext,
    doctor_id: Uuid,
) -> Result<(), ApiError> {
    ensure_role(auth, &[Role::Doctor, Role::Admin])?;

    let owner: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT user_id
        FROM doctor
        WHERE doctor_id = $1
        "#,
    )
    .bind(doctor_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let owner =
        owner.ok_or_else(|| ApiError::NotFound("DOCTOR_NOT_FOUND", "Doctor not found".into()))?;

    if !is_admin(auth) && owner != auth.user_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "You may only update your own profile".into(),
        ));
    }
    Ok(())
}

pub async fn update_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Json(req): Json<UpdateDoctorRequest>,
) -> Result<Json<ApiOk<DoctorDetail>>, ApiError> {
    ensure_doctor_owner_or_admin(&state, &auth, doctor_id).await?;

    if let Some(exp) = req.experience_years {
        if exp < 0 {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "experience_years must not be negative".into(),
            ));
        }
    }
    if let Some(fee) = req.consultation_fee_cents {
        if fee < 0 {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "consultation_fee_cents must not be negative".into(),
            ));
        }
    }

    sqlx::query(
        r#"
        UPDATE doctor
        SET specialization         = COALESCE($2, specialization),
            experience_years       = COALESCE($3, experience_years),
            consultation_fee_cents = COALESCE($4, consultation_fee_cents),
            bio                    = COALESCE($5, bio),
            qualifications         = COALESCE($6, qualifications),
            languages              = COALESCE($7, languages),
            updated_at             = now()
        WHERE doctor_id = $1
        "#,
    )
    .bind(doctor_id)
    .bind(req.specialization)
    .bind(req.experience_years)
    .bind(req.consultation_fee_cents)
    .bind(req.bio.as_deref())
    .bind(req.qualifications.map(Jsonb))
    .bind(req.languages.map(Jsonb))
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let doctor = fetch_doctor_detail(&state, doctor_id).await?;
    Ok(Json(ApiOk::with_message("Doctor profile updated", doctor)))
}

/* ============================================================
   GET /api/doctors/{doctor_id}/availability (public)
   PUT /api/doctors/{doctor_id}/availability (doctor-self or admin)
   ============================================================ */

pub async fn get_availability(
    State(state): State<AppState>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<DayAvailability>>>, ApiError> {
    let availability: Option<Jsonb<Vec<DayAvailability>>> = sqlx::query_scalar(
        r#"
        SELECT availability
        FROM doctor
        WHERE doctor_id = $1
        "#,
    )
    .bind(doctor_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let availability = availability
        .ok_or_else(|| ApiError::NotFound("DOCTOR_NOT_FOUND", "Doctor not found".into()))?;

    Ok(Json(ApiOk::new(availability.0)))
}

fn validate_availability(availability: &[DayAvailability]) -> Result<(), ApiError> {
    let mut seen_days: Vec<&str> = Vec::new();
    for day in availability {
        if !WEEKDAYS.contains(&day.day.as_str()) {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                format!("unknown weekday: {}", day.day),
            ));
        }
        if seen_days.contains(&day.day.as_str()) {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                format!("duplicate weekday: {}", day.day),
            ));
        }
        seen_days.push(day.day.as_str());

        for slot in &day.slots {
            let start = parse_hhmm(&slot.start_time).ok_or_else(|| {
                ApiError::BadRequest(
                    "VALIDATION_ERROR",
                    format!("invalid slot start_time: {}", slot.start_time),
                )
            })?;
            let end = parse_hhmm(&slot.end_time).ok_or_else(|| {
                ApiError::BadRequest(
                    "VALIDATION_ERROR",
                    format!("invalid slot end_time: {}", slot.end_time),
                )
            })?;
            if end <= start {
                return Err(ApiError::BadRequest(
                    "VALIDATION_ERROR",
                    "slot end_time must be after start_time".into(),
                ));
            }
        }
    }
    Ok(())
}

pub async fn put_availability(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Json(req): Json<PutAvailabilityRequest>,
) -> Result<Json<ApiOk<Vec<DayAvailability>>>, ApiError> {
    ensure_doctor_owner_or_admin(&state, &auth, doctor_id).await?;
    validate_availability(&req.availability)?;

    let stored: Jsonb<Vec<DayAvailability>> = sqlx::query_scalar(
        r#"
        UPDATE doctor
        SET availability = $2,
            updated_at = now()
        WHERE doctor_id = $1
        RETURNING availability
        "#,
    )
    .bind(doctor_id)
    .bind(Jsonb(req.availability))
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk::with_message("Availability updated", stored.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(name: &str, slots: &[(&str, &str)]) -> DayAvailability {
        DayAvailability {
            day: name.to_string(),
            slots: slots
                .iter()
                .map(|(s, e)| AvailabilitySlot {
                    start_time: s.to_string(),
                    end_time: e.to_string(),
                    is_booked: false,
                })
                .collect(),
        }
    }

    #[test]
    fn test_validate_availability_accepts_weekly_grid() {
        let grid = vec![
            day("Monday", &[("09:00", "10:00"), ("10:00", "11:00")]),
            day("Friday", &[("14:00", "15:00")]),
        ];
        assert!(validate_availability(&grid).is_ok());
    }

    #[test]
    fn test_validate_availability_rejects_unknown_day() {
        let grid = vec![day("Funday", &[("09:00", "10:00")])];
        assert!(validate_availability(&grid).is_err());
    }

    #[test]
    fn test_validate_availability_rejects_duplicate_day() {
        let grid = vec![
            day("Monday", &[("09:00", "10:00")]),
            day("Monday", &[("11:00", "12:00")]),
        ];
        assert!(validate_availability(&grid).is_err());
    }

    #[test]
    fn test_validate_availability_rejects_inverted_slot() {
        let grid = vec![day("Tuesday", &[("10:00", "09:00")])];
        assert!(validate_availability(&grid).is_err());
        let grid = vec![day("Tuesday", &[("10:00", "10:00")])];
        assert!(validate_availability(&grid).is_err());
    }

    #[test]
    fn test_validate_availability_rejects_bad_time() {
        let grid = vec![day("Tuesday", &[("25:00", "26:00")])];
        assert!(validate_availability(&grid).is_err());
    }
}
