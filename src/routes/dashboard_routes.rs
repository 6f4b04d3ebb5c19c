// src/routes/dashboard_routes.rs
//
// Read-only aggregate views, one per role. No caching: each load re-runs its
// query set against the live tables, and the doctor counters are derived here
// rather than stored on the doctor row.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    middleware::policy::{ensure_role, require_doctor_profile, require_patient_profile},
    models::*,
};

use super::appointment_routes::{APPOINTMENT_SELECT, AppointmentDto, AppointmentJoinRow};
use super::patient_routes::VitalSignRow;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard/admin/stats", get(admin_stats))
        .route("/dashboard/doctor/stats", get(doctor_stats))
        .route("/dashboard/patient/stats", get(patient_stats))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Default, Serialize)]
pub struct AppointmentsByStatus {
    pub pending: i64,
    pub confirmed: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub no_show: i64,
}

impl AppointmentsByStatus {
    fn total(&self) -> i64 {
        self.pending + self.confirmed + self.completed + self.cancelled + self.no_show
    }
}

fn fold_status_counts(rows: Vec<(AppointmentStatus, i64)>) -> AppointmentsByStatus {
    let mut counts = AppointmentsByStatus::default();
    for (status, n) in rows {
        match status {
            AppointmentStatus::Pending => counts.pending = n,
            AppointmentStatus::Confirmed => counts.confirmed = n,
            AppointmentStatus::Completed => counts.completed = n,
            AppointmentStatus::Cancelled => counts.cancelled = n,
            AppointmentStatus::NoShow => counts.no_show = n,
        }
    }
    counts
}

#[derive(Debug, Serialize)]
pub struct AdminStatsData {
    pub total_patients: i64,
    pub total_doctors: i64,
    pub total_appointments: i64,
    pub appointments_by_status: AppointmentsByStatus,
    pub total_revenue_cents: i64,
    pub new_users_this_month: i64,
    pub recent_appointments: Vec<AppointmentDto>,
}

#[derive(Debug, Serialize)]
pub struct DoctorStatsData {
    pub today_appointments: i64,
    pub pending_appointments: i64,
    pub appointments_this_month: i64,
    pub total_appointments: i64,
    pub total_patients: i64,
    pub rating: f64,
    pub total_reviews: i32,
    pub upcoming_appointments: Vec<AppointmentDto>,
}

#[derive(Debug, Serialize)]
pub struct PatientStatsData {
    pub total_appointments: i64,
    pub upcoming_appointments: Vec<AppointmentDto>,
    pub recent_appointments: Vec<AppointmentDto>,
    pub vital_signs: Vec<VitalSignRow>,
}

/* ============================================================
   GET /api/dashboard/admin/stats
   ============================================================ */

pub async fn admin_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<AdminStatsData>>, ApiError> {
    ensure_role(&auth, &[Role::Admin])?;

    let total_patients: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM patient"#)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let total_doctors: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM doctor"#)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let status_rows: Vec<(AppointmentStatus, i64)> = sqlx::query_as(
        r#"
        SELECT status, COUNT(*)
        FROM appointment
        GROUP BY status
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let appointments_by_status = fold_status_counts(status_rows);
    let total_appointments = appointments_by_status.total();

    let total_revenue_cents: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(total_cents), 0)::bigint
        FROM billing
        WHERE status = 1
        "#,
    )
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let new_users_this_month: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM hcms_user
        WHERE created_at >= date_trunc('month', now())
        "#,
    )
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let recent: Vec<AppointmentJoinRow> = sqlx::query_as::<_, AppointmentJoinRow>(&format!(
        r#"
        {APPOINTMENT_SELECT}
        ORDER BY a.created_at DESC
        LIMIT 10
        "#
    ))
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk::new(AdminStatsData {
        total_patients,
        total_doctors,
        total_appointments,
        appointments_by_status,
        total_revenue_cents,
        new_users_this_month,
        recent_appointments: recent.into_iter().map(|r| r.into_dto()).collect(),
    })))
}

/* ============================================================
   GET /api/dashboard/doctor/stats
   ============================================================ */

pub async fn doctor_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<DoctorStatsData>>, ApiError> {
    ensure_role(&auth, &[Role::Doctor])?;
    let doctor_id = require_doctor_profile(&state, auth.user_id).await?;

    let (rating, total_reviews): (f64, i32) = sqlx::query_as(
        r#"
        SELECT rating, total_reviews
        FROM doctor
        WHERE doctor_id = $1
        "#,
    )
    .bind(doctor_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let today_appointments: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM appointment
        WHERE doctor_id = $1
          AND appointment_date = CURRENT_DATE
        "#,
    )
    .bind(doctor_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let pending_appointments: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM appointment
        WHERE doctor_id = $1
          AND status = 0
        "#,
    )
    .bind(doctor_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let appointments_this_month: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM appointment
        WHERE doctor_id = $1
          AND appointment_date >= date_trunc('month', CURRENT_DATE)::date
        "#,
    )
    .bind(doctor_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    // Derived from the appointment table so the numbers cannot drift.
    let (total_appointments, total_patients): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COUNT(DISTINCT patient_id)
        FROM appointment
        WHERE doctor_id = $1
        "#,
    )
    .bind(doctor_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let upcoming: Vec<AppointmentJoinRow> = sqlx::query_as::<_, AppointmentJoinRow>(&format!(
        r#"
        {APPOINTMENT_SELECT}
        WHERE a.doctor_id = $1
          AND a.appointment_date >= CURRENT_DATE
          AND a.status IN (0, 1)
        ORDER BY a.appointment_date ASC, a.start_time ASC
        LIMIT 10
        "#
    ))
    .bind(doctor_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk::new(DoctorStatsData {
        today_appointments,
        pending_appointments,
        appointments_this_month,
        total_appointments,
        total_patients,
        rating,
        total_reviews,
        upcoming_appointments: upcoming.into_iter().map(|r| r.into_dto()).collect(),
    })))
}

/* ============================================================
   GET /api/dashboard/patient/stats
   ============================================================ */

pub async fn patient_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<PatientStatsData>>, ApiError> {
    ensure_role(&auth, &[Role::Patient])?;
    let patient_id: Uuid = require_patient_profile(&state, auth.user_id).await?;

    let total_appointments: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM appointment
        WHERE patient_id = $1
        "#,
    )
    .bind(patient_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let upcoming: Vec<AppointmentJoinRow> = sqlx::query_as::<_, AppointmentJoinRow>(&format!(
        r#"
        {APPOINTMENT_SELECT}
        WHERE a.patient_id = $1
          AND a.appointment_date >= CURRENT_DATE
          AND a.status IN (0, 1)
        ORDER BY a.appointment_date ASC, a.start_time ASC
        "#
    ))
    .bind(patient_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let recent: Vec<AppointmentJoinRow> = sqlx::query_as::<_, AppointmentJoinRow>(&format!(
        r#"
        {APPOINTMENT_SELECT}
        WHERE a.patient_id = $1
          AND a.status = 2
        ORDER BY a.appointment_date DESC, a.start_time DESC
        LIMIT 5
        "#
    ))
    .bind(patient_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let vital_signs: Vec<VitalSignRow> = sqlx::query_as::<_, VitalSignRow>(
        r#"
        SELECT vital_sign_id, patient_id, recorded_at, systolic, diastolic,
               heart_rate, temperature, respiratory_rate, oxygen_saturation
        FROM patient_vital_sign
        WHERE patient_id = $1
        ORDER BY recorded_at DESC
        LIMIT 5
        "#,
    )
    .bind(patient_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk::new(PatientStatsData {
        total_appointments,
        upcoming_appointments: upcoming.into_iter().map(|r| r.into_dto()).collect(),
        recent_appointments: recent.into_iter().map(|r| r.into_dto()).collect(),
        vital_signs,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_status_counts() {
        let counts = fold_status_counts(vec![
            (AppointmentStatus::Pending, 3),
            (AppointmentStatus::Completed, 7),
            (AppointmentStatus::NoShow, 1),
        ]);
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.confirmed, 0);
        assert_eq!(counts.completed, 7);
        assert_eq!(counts.cancelled, 0);
        assert_eq!(counts.no_show, 1);
        assert_eq!(counts.total(), 11);
    }

    #[test]
    fn test_fold_status_counts_empty() {
        let counts = fold_status_counts(vec![]);
        assert_eq!(counts.total(), 0);
    }
}
