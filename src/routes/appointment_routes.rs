// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, is_unique_violation},
    mail,
    middleware::auth_context::AuthContext,
    middleware::policy::{ensure_role, require_doctor_profile, require_patient_profile},
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment)
                .put(update_appointment)
                .delete(delete_appointment),
        )
        .route("/appointments/{appointment_id}/status", patch(patch_status))
}

/* ============================================================
   Row / DTOs
   ============================================================ */

pub(crate) const APPOINTMENT_SELECT: &str = r#"
    SELECT
      a.appointment_id,
      a.patient_id,
      a.doctor_id,
      a.appointment_date,
      a.start_time,
      a.end_time,
      a.status,
      a.appointment_type,
      a.symptoms,
      a.notes,
      a.cancellation_reason,
      a.created_at,
      pu.first_name AS p_first,
      pu.last_name  AS p_last,
      pu.email      AS p_email,
      pu.phone      AS p_phone,
      du.first_name AS d_first,
      du.last_name  AS d_last,
      du.email      AS d_email,
      d.specialization AS d_specialization
    FROM appointment a
    JOIN patient p     ON p.patient_id = a.patient_id
    JOIN hcms_user pu  ON pu.user_id = p.user_id
    JOIN doctor d      ON d.doctor_id = a.doctor_id
    JOIN hcms_user du  ON du.user_id = d.user_id
"#;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AppointmentJoinRow {
    pub(crate) appointment_id: Uuid,
    pub(crate) patient_id: Uuid,
    pub(crate) doctor_id: Uuid,
    pub(crate) appointment_date: NaiveDate,
    pub(crate) start_time: NaiveTime,
    pub(crate) end_time: NaiveTime,
    pub(crate) status: AppointmentStatus,
    pub(crate) appointment_type: AppointmentType,
    pub(crate) symptoms: Option<String>,
    pub(crate) notes: Option<String>,
    pub(crate) cancellation_reason: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) p_first: String,
    pub(crate) p_last: String,
    pub(crate) p_email: String,
    pub(crate) p_phone: Option<String>,
    pub(crate) d_first: String,
    pub(crate) d_last: String,
    pub(crate) d_email: String,
    pub(crate) d_specialization: Specialization,
}

#[derive(Debug, Serialize)]
pub struct PersonBrief {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DoctorBrief {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub specialization: Specialization,
}

#[derive(Debug, Serialize)]
pub struct AppointmentDto {
    pub appointment_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub patient: PersonBrief,
    pub doctor: DoctorBrief,
    pub created_at: DateTime<Utc>,
}

impl AppointmentJoinRow {
    pub(crate) fn into_dto(self) -> AppointmentDto {
        AppointmentDto {
            appointment_id: self.appointment_id,
            appointment_date: self.appointment_date,
            start_time: self.start_time,
            end_time: self.end_time,
            status: self.status,
            appointment_type: self.appointment_type,
            symptoms: self.symptoms,
            notes: self.notes,
            cancellation_reason: self.cancellation_reason,
            patient: PersonBrief {
                id: self.patient_id,
                name: format!("{} {}", self.p_first, self.p_last),
                email: self.p_email,
                phone: self.p_phone,
            },
            doctor: DoctorBrief {
                id: self.doctor_id,
                name: format!("{} {}", self.d_first, self.d_last),
                email: self.d_email,
                specialization: self.d_specialization,
            },
            created_at: self.created_at,
        }
    }
}

async fn fetch_appointment_row(
    state: &AppState,
    appointment_id: Uuid,
) -> Result<AppointmentJoinRow, ApiError> {
    sqlx::query_as::<_, AppointmentJoinRow>(&format!(
        "{APPOINTMENT_SELECT} WHERE a.appointment_id = $1"
    ))
    .bind(appointment_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(|| ApiError::NotFound("APPOINTMENT_NOT_FOUND", "Appointment not found".into()))
}

/* ============================================================
   Requests
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct TimeSlotRequest {
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub time_slot: TimeSlotRequest,
    pub appointment_type: Option<AppointmentType>,
    pub symptoms: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub appointment_date: Option<NaiveDate>,
    pub time_slot: Option<TimeSlotRequest>,
    pub appointment_type: Option<AppointmentType>,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentsQuery {
    pub status: Option<AppointmentStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/* ============================================================
   Helpers
   ============================================================ */

fn parse_slot(slot: &TimeSlotRequest) -> Result<(NaiveTime, NaiveTime), ApiError> {
    let start = parse_hhmm(&slot.start_time).ok_or_else(|| {
        ApiError::BadRequest(
            "VALIDATION_ERROR",
            format!("invalid start_time: {}", slot.start_time),
        )
    })?;
    let end = parse_hhmm(&slot.end_time).ok_or_else(|| {
        ApiError::BadRequest(
            "VALIDATION_ERROR",
            format!("invalid end_time: {}", slot.end_time),
        )
    })?;
    if end <= start {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "end_time must be after start_time".into(),
        ));
    }
    Ok((start, end))
}

fn slot_is_future(date: NaiveDate, start: NaiveTime, now: DateTime<Utc>) -> bool {
    date.and_time(start) > now.naive_utc()
}

/// Completed and no-show encounters are immutable history; everything else
/// may be hard-deleted by its owner.
fn deletable(status: AppointmentStatus) -> bool {
    !matches!(
        status,
        AppointmentStatus::Completed | AppointmentStatus::NoShow
    )
}

/// Pre-check for a friendly error; the active-slot unique index is the
/// authoritative guard.
async fn slot_already_booked(
    state: &AppState,
    doctor_id: Uuid,
    date: NaiveDate,
    start: NaiveTime,
    exclude: Option<Uuid>,
) -> Result<bool, ApiError> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS(
          SELECT 1
          FROM appointment
          WHERE doctor_id = $1
            AND appointment_date = $2
            AND start_time = $3
            AND status IN (0, 1)
            AND ($4::uuid IS NULL OR appointment_id <> $4)
        )
        "#,
    )
    .bind(doctor_id)
    .bind(date)
    .bind(start)
    .bind(exclude)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))
}

/// Doctors act on their own appointments, admins on any.
async fn ensure_doctor_scope(
    state: &AppState,
    auth: &AuthContext,
    row_doctor_id: Uuid,
) -> Result<(), ApiError> {
    ensure_role(auth, &[Role::Doctor, Role::Admin])?;
    if auth.role == Role::Doctor {
        let my_doctor_id = require_doctor_profile(state, auth.user_id).await?;
        if my_doctor_id != row_doctor_id {
            return Err(ApiError::Forbidden(
                "FORBIDDEN",
                "You may only act on your own appointments".into(),
            ));
        }
    }
    Ok(())
}

/* ============================================================
   GET /api/appointments (role-scoped list)
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<AppointmentsQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentDto>>>, ApiError> {
    let (doctor_scope, patient_scope) = match auth.role {
        Role::Admin => (None, None),
        Role::Doctor => (Some(require_doctor_profile(&state, auth.user_id).await?), None),
        Role::Patient => (None, Some(require_patient_profile(&state, auth.user_id).await?)),
    };

    let rows: Vec<AppointmentJoinRow> = sqlx::query_as::<_, AppointmentJoinRow>(&format!(
        r#"
        {APPOINTMENT_SELECT}
        WHERE ($1::uuid IS NULL OR a.doctor_id = $1)
          AND ($2::uuid IS NULL OR a.patient_id = $2)
          AND ($3::smallint IS NULL OR a.status = $3)
          AND ($4::date IS NULL OR a.appointment_date >= $4)
          AND ($5::date IS NULL OR a.appointment_date <= $5)
        ORDER BY a.appointment_date DESC, a.start_time DESC
        LIMIT 200
        "#
    ))
    .bind(doctor_scope)
    .bind(patient_scope)
    .bind(q.status)
    .bind(q.from)
    .bind(q.to)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let appointments: Vec<AppointmentDto> = rows.into_iter().map(|r| r.into_dto()).collect();
    Ok(Json(ApiOk::new(appointments)))
}

/* ============================================================
   POST /api/appointments (patient booking)
   ============================================================ */

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    ensure_role(&auth, &[Role::Patient])?;
    let patient_id = require_patient_profile(&state, auth.user_id).await?;

    let (start, end) = parse_slot(&req.time_slot)?;

    let doctor: Option<(Uuid, String, String)> = sqlx::query_as(
        r#"
        SELECT d.doctor_id, u.first_name, u.last_name
        FROM doctor d
        JOIN hcms_user u ON u.user_id = d.user_id
        WHERE d.doctor_id = $1
        "#,
    )
    .bind(req.doctor_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let Some((doctor_id, d_first, d_last)) = doctor else {
        return Err(ApiError::NotFound(
            "DOCTOR_NOT_FOUND",
            "Doctor not found".into(),
        ));
    };

    if !slot_is_future(req.appointment_date, start, Utc::now()) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "appointment must be scheduled in the future".into(),
        ));
    }

    if slot_already_booked(&state, doctor_id, req.appointment_date, start, None).await? {
        tracing::info!(
            "rejected booking for doctor {doctor_id} at {} {start}: slot taken",
            req.appointment_date
        );
        return Err(ApiError::slot_taken());
    }

    let appointment_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO appointment
            (patient_id, doctor_id, appointment_date, start_time, end_time,
             status, appointment_type, symptoms)
        VALUES ($1, $2, $3, $4, $5, 0, $6, $7)
        RETURNING appointment_id
        "#,
    )
    .bind(patient_id)
    .bind(doctor_id)
    .bind(req.appointment_date)
    .bind(start)
    .bind(end)
    .bind(req.appointment_type.unwrap_or(AppointmentType::Consultation))
    .bind(req.symptoms.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::slot_taken()
        } else {
            ApiError::BadRequest("APPOINTMENT_CREATE_FAILED", format!("{e}"))
        }
    })?;

    tracing::info!("appointment {appointment_id} booked with doctor {doctor_id}");

    // Confirmation mail (best-effort, never blocks the booking)
    let contact: Option<(String, String)> =
        sqlx::query_as(r#"SELECT email, first_name FROM hcms_user WHERE user_id = $1"#)
            .bind(auth.user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if let Some((email, first_name)) = contact {
        let (subject, html) = mail::booking_email(
            &first_name,
            &format!("{d_first} {d_last}"),
            req.appointment_date,
            &req.time_slot.start_time,
            &req.time_slot.end_time,
            &state.mailer.client_url,
        );
        state.mailer.send_best_effort(&email, &subject, html).await;
    }

    let row = fetch_appointment_row(&state, appointment_id).await?;
    Ok(Json(ApiOk::with_message(
        "Appointment created",
        row.into_dto(),
    )))
}

/* ============================================================
   GET /api/appointments/{appointment_id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let row = fetch_appointment_row(&state, appointment_id).await?;

    match auth.role {
        Role::Admin => {}
        Role::Doctor => {
            let my_doctor_id = require_doctor_profile(&state, auth.user_id).await?;
            if my_doctor_id != row.doctor_id {
                return Err(ApiError::Forbidden(
                    "FORBIDDEN",
                    "You may only view your own appointments".into(),
                ));
            }
        }
        Role::Patient => {
            let my_patient_id = require_patient_profile(&state, auth.user_id).await?;
            if my_patient_id != row.patient_id {
                return Err(ApiError::Forbidden(
                    "FORBIDDEN",
                    "You may only view your own appointments".into(),
                ));
            }
        }
    }

    Ok(Json(ApiOk::new(row.into_dto())))
}

/* ============================================================
   PUT /api/appointments/{appointment_id} (doctor-own or admin)
   ============================================================ */

pub async fn update_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<UpdateAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let existing = fetch_appointment_row(&state, appointment_id).await?;
    ensure_doctor_scope(&state, &auth, existing.doctor_id).await?;

    let new_date = req.appointment_date.unwrap_or(existing.appointment_date);
    let (new_start, new_end) = match &req.time_slot {
        Some(slot) => parse_slot(slot)?,
        None => (existing.start_time, existing.end_time),
    };

    let moved = new_date != existing.appointment_date || new_start != existing.start_time;
    if moved {
        if !slot_is_future(new_date, new_start, Utc::now()) {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "appointment must be rescheduled into the future".into(),
            ));
        }
        if slot_already_booked(&state, existing.doctor_id, new_date, new_start, Some(appointment_id))
            .await?
        {
            return Err(ApiError::slot_taken());
        }
    }

    sqlx::query(
        r#"
        UPDATE appointment
        SET appointment_date = $2,
            start_time       = $3,
            end_time         = $4,
            appointment_type = COALESCE($5, appointment_type),
            symptoms         = COALESCE($6, symptoms),
            notes            = COALESCE($7, notes),
            updated_at       = now()
        WHERE appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .bind(new_date)
    .bind(new_start)
    .bind(new_end)
    .bind(req.appointment_type)
    .bind(req.symptoms.as_deref())
    .bind(req.notes.as_deref())
    .execute(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::slot_taken()
        } else {
            ApiError::BadRequest("APPOINTMENT_UPDATE_FAILED", format!("{e}"))
        }
    })?;

    let row = fetch_appointment_row(&state, appointment_id).await?;
    Ok(Json(ApiOk::with_message(
        "Appointment updated",
        row.into_dto(),
    )))
}

/* ============================================================
   DELETE /api/appointments/{appointment_id} (patient-own or admin)
   ============================================================ */

pub async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    let row = fetch_appointment_row(&state, appointment_id).await?;

    match auth.role {
        Role::Admin => {}
        Role::Patient => {
            let my_patient_id = require_patient_profile(&state, auth.user_id).await?;
            if my_patient_id != row.patient_id {
                return Err(ApiError::Forbidden(
                    "FORBIDDEN",
                    "You may only delete your own appointments".into(),
                ));
            }
        }
        Role::Doctor => {
            return Err(ApiError::Forbidden(
                "FORBIDDEN",
                "Only the booking patient or an admin can delete an appointment".into(),
            ));
        }
    }

    if !deletable(row.status) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "completed or no-show appointments cannot be deleted".into(),
        ));
    }

    sqlx::query(r#"DELETE FROM appointment WHERE appointment_id = $1"#)
        .bind(appointment_id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!("appointment {appointment_id} deleted");

    Ok(Json(ApiOk::with_message(
        "Appointment deleted",
        OkData { ok: true },
    )))
}

/* ============================================================
   PATCH /api/appointments/{appointment_id}/status (doctor-own or admin)
   ============================================================ */

pub async fn patch_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let existing = fetch_appointment_row(&state, appointment_id).await?;
    ensure_doctor_scope(&state, &auth, existing.doctor_id).await?;

    sqlx::query(
        r#"
        UPDATE appointment
        SET status = $2,
            cancellation_reason = COALESCE($3, cancellation_reason),
            updated_at = now()
        WHERE appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .bind(req.status)
    .bind(req.cancellation_reason.as_deref())
    .execute(&state.db)
    .await
    .map_err(|e| {
        // Re-activating into an occupied slot trips the active-slot index.
        if is_unique_violation(&e) {
            ApiError::slot_taken()
        } else {
            ApiError::BadRequest("APPOINTMENT_UPDATE_FAILED", format!("{e}"))
        }
    })?;

    tracing::info!(
        "appointment {appointment_id} status {:?} -> {:?}",
        existing.status,
        req.status
    );

    let row = fetch_appointment_row(&state, appointment_id).await?;
    Ok(Json(ApiOk::with_message(
        "Appointment status updated",
        row.into_dto(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, mo: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, day).unwrap()
    }

    #[test]
    fn test_parse_slot() {
        let slot = TimeSlotRequest {
            start_time: "09:00".into(),
            end_time: "09:30".into(),
        };
        assert_eq!(parse_slot(&slot).unwrap(), (t(9, 0), t(9, 30)));
    }

    #[test]
    fn test_parse_slot_rejects_inverted_or_empty() {
        let slot = TimeSlotRequest {
            start_time: "10:00".into(),
            end_time: "09:30".into(),
        };
        assert!(parse_slot(&slot).is_err());

        let slot = TimeSlotRequest {
            start_time: "10:00".into(),
            end_time: "10:00".into(),
        };
        assert!(parse_slot(&slot).is_err());

        let slot = TimeSlotRequest {
            start_time: "later".into(),
            end_time: "10:00".into(),
        };
        assert!(parse_slot(&slot).is_err());
    }

    #[test]
    fn test_slot_is_future() {
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap();
        // later the same day
        assert!(slot_is_future(d(2025, 6, 10), t(9, 0), now));
        // earlier the same day
        assert!(!slot_is_future(d(2025, 6, 10), t(7, 0), now));
        // exactly now is not strictly in the future
        assert!(!slot_is_future(d(2025, 6, 10), t(8, 0), now));
        // yesterday / tomorrow
        assert!(!slot_is_future(d(2025, 6, 9), t(9, 0), now));
        assert!(slot_is_future(d(2025, 6, 11), t(7, 0), now));
    }

    #[test]
    fn test_deletable_statuses() {
        assert!(deletable(AppointmentStatus::Pending));
        assert!(deletable(AppointmentStatus::Confirmed));
        assert!(deletable(AppointmentStatus::Cancelled));
        assert!(!deletable(AppointmentStatus::Completed));
        assert!(!deletable(AppointmentStatus::NoShow));
    }
}
