// src/routes/auth_routes.rs

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post, put},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json as Jsonb;
use uuid::Uuid;

use crate::{
    auth::{generate_access_token, hash_access_token, hash_password, verify_password},
    error::{ApiError, is_unique_violation},
    mail,
    middleware::auth_context::{AuthContext, SESSION_COOKIE},
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/profile", put(update_profile))
        .route("/change-password", put(change_password))
}

/* ============================================================
   Request / response DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,

    // doctor registration
    pub specialization: Option<Specialization>,
    pub experience_years: Option<i32>,
    pub consultation_fee_cents: Option<i32>,
    pub bio: Option<String>,
    pub qualifications: Option<Vec<Qualification>>,
    pub languages: Option<Vec<String>>,

    // patient registration
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub blood_type: Option<BloodType>,
    pub emergency_contact: Option<EmergencyContact>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthData {
    pub token: String,
    pub expires_at: chrono::DateTime<Utc>,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct MeData {
    pub user: UserProfile,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub session: SessionInfo,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/* ============================================================
   Validation helpers
   ============================================================ */

fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    let ok = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if ok {
        Ok(email)
    } else {
        Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "a valid email is required".into(),
        ))
    }
}

fn validate_password(pw: &str) -> Result<(), ApiError> {
    if pw.len() < 6 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "password must be at least 6 characters".into(),
        ));
    }
    Ok(())
}

const USER_COLUMNS: &str = "user_id, email, password_hash, role, first_name, last_name, \
                            phone, address, is_active, is_email_verified";

fn session_cookie(token: &str, ttl_hours: i64) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token.to_string());
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::hours(ttl_hours));
    cookie
}

fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    cookie
}

async fn issue_session(
    state: &AppState,
    user_id: Uuid,
) -> Result<(String, SessionTokenRow), ApiError> {
    let access_token = generate_access_token();
    let token_hash = hash_access_token(&access_token);
    let expires_at = Utc::now() + Duration::hours(state.session_ttl_hours);

    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        INSERT INTO session_token (user_id, session_token_hash, expires_at)
        VALUES ($1, $2, $3)
        RETURNING session_token_id, expires_at
        "#,
    )
    .bind(user_id)
    .bind(&token_hash)
    .bind(expires_at)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok((access_token, session))
}

/* ============================================================
   POST /api/auth/register
   ============================================================ */

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<ApiOk<AuthData>>), ApiError> {
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    let first_name = req.first_name.trim().to_string();
    let last_name = req.last_name.trim().to_string();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "first_name and last_name are required".into(),
        ));
    }

    // Role-specific requirements are validated before anything is written.
    match req.role {
        Role::Doctor => {
            let (Some(_), Some(experience), Some(fee)) = (
                req.specialization,
                req.experience_years,
                req.consultation_fee_cents,
            ) else {
                return Err(ApiError::BadRequest(
                    "VALIDATION_ERROR",
                    "specialization, experience_years and consultation_fee_cents are required for doctor registration"
                        .into(),
                ));
            };
            if experience < 0 || fee < 0 {
                return Err(ApiError::BadRequest(
                    "VALIDATION_ERROR",
                    "experience_years and consultation_fee_cents must not be negative".into(),
                ));
            }
        }
        Role::Patient => {
            if req.date_of_birth.is_none() || req.gender.is_none() {
                return Err(ApiError::BadRequest(
                    "VALIDATION_ERROR",
                    "date_of_birth and gender are required for patient registration".into(),
                ));
            }
        }
        Role::Admin => {}
    }

    let exists: bool =
        sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM hcms_user WHERE email = $1)"#)
            .bind(&email)
            .fetch_one(&state.db)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;
    if exists {
        return Err(ApiError::Conflict(
            "EMAIL_TAKEN",
            "An account with this email already exists".into(),
        ));
    }

    let password_hash = hash_password(&req.password).map_err(ApiError::Internal)?;

    // The account and its role profile must land together.
    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let user: UserRow = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        INSERT INTO hcms_user (email, password_hash, role, first_name, last_name, phone)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&email)
    .bind(&password_hash)
    .bind(req.role)
    .bind(&first_name)
    .bind(&last_name)
    .bind(req.phone.as_deref().map(str::trim))
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("EMAIL_TAKEN", "An account with this email already exists".into())
        } else {
            ApiError::Internal(format!("db error: {e}"))
        }
    })?;

    match req.role {
        Role::Doctor => {
            let registration_number = format!("DOC-{}", Utc::now().timestamp_millis());
            sqlx::query(
                r#"
                INSERT INTO doctor
                    (user_id, specialization, experience_years, consultation_fee_cents,
                     bio, qualifications, languages, registration_number)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(user.user_id)
            .bind(req.specialization)
            .bind(req.experience_years)
            .bind(req.consultation_fee_cents)
            .bind(req.bio.as_deref())
            .bind(Jsonb(req.qualifications.unwrap_or_default()))
            .bind(Jsonb(
                req.languages.unwrap_or_else(|| vec!["English".to_string()]),
            ))
            .bind(&registration_number)
            .execute(&mut *tx)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;
        }
        Role::Patient => {
            sqlx::query(
                r#"
                INSERT INTO patient
                    (user_id, date_of_birth, gender, blood_type, emergency_contact)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(user.user_id)
            .bind(req.date_of_birth)
            .bind(req.gender)
            .bind(req.blood_type)
            .bind(req.emergency_contact.map(Jsonb))
            .execute(&mut *tx)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;
        }
        Role::Admin => {}
    }

    tx.commit()
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tracing::info!("registered {} account {}", user.role.as_str(), user.user_id);

    let (token, session) = issue_session(&state, user.user_id).await?;

    let (subject, html) =
        mail::welcome_email(&user.first_name, user.role.as_str(), &state.mailer.client_url);
    state.mailer.send_best_effort(&user.email, &subject, html).await;

    let cookie = session_cookie(&token, state.session_ttl_hours);
    Ok((
        jar.add(cookie),
        Json(ApiOk::with_message(
            "Registration successful",
            AuthData {
                token,
                expires_at: session.expires_at,
                user: user.into(),
            },
        )),
    ))
}

/* ============================================================
   POST /api/auth/login
   ============================================================ */

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<ApiOk<AuthData>>), ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "email and password are required".into(),
        ));
    }

    // Unknown email and wrong password take the same exit below.
    let user: UserRow = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM hcms_user
        WHERE email = $1
        "#
    ))
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::invalid_credentials)?;

    if !user.is_active {
        return Err(ApiError::Forbidden(
            "ACCOUNT_DISABLED",
            "Your account has been deactivated".into(),
        ));
    }

    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    // Touch last_login_at (best-effort)
    let _ = sqlx::query(
        r#"
        UPDATE hcms_user
        SET last_login_at = now()
        WHERE user_id = $1
        "#,
    )
    .bind(user.user_id)
    .execute(&state.db)
    .await;

    let (token, session) = issue_session(&state, user.user_id).await?;

    let cookie = session_cookie(&token, state.session_ttl_hours);
    Ok((
        jar.add(cookie),
        Json(ApiOk::with_message(
            "Login successful",
            AuthData {
                token,
                expires_at: session.expires_at,
                user: user.into(),
            },
        )),
    ))
}

/* ============================================================
   POST /api/auth/logout
   ============================================================ */

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiOk<OkData>>), ApiError> {
    let rows = sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE session_token_id = $1
          AND user_id = $2
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if rows.rows_affected() == 0 {
        return Err(ApiError::session_expired());
    }

    Ok((
        jar.remove(removal_cookie()),
        Json(ApiOk::with_message("Logged out", OkData { ok: true })),
    ))
}

/* ============================================================
   GET /api/auth/me
   ============================================================ */

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<MeData>>, ApiError> {
    let user: UserRow = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM hcms_user
        WHERE user_id = $1
        "#
    ))
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::session_expired)?;

    if !user.is_active {
        return Err(ApiError::session_expired());
    }

    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        SELECT session_token_id, expires_at
        FROM session_token
        WHERE session_token_id = $1
          AND user_id = $2
          AND revoked_at IS NULL
          AND expires_at > now()
        "#,
    )
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::session_expired)?;

    let doctor_id: Option<Uuid> =
        sqlx::query_scalar(r#"SELECT doctor_id FROM doctor WHERE user_id = $1"#)
            .bind(auth.user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let patient_id: Option<Uuid> =
        sqlx::query_scalar(r#"SELECT patient_id FROM patient WHERE user_id = $1"#)
            .bind(auth.user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk::new(MeData {
        user: user.into(),
        doctor_id,
        patient_id,
        session: SessionInfo {
            session_token_id: session.session_token_id,
            expires_at: session.expires_at,
        },
    })))
}

/* ============================================================
   PUT /api/auth/profile
   ============================================================ */

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ApiOk<UserProfile>>, ApiError> {
    let first_name = match req.first_name.as_deref().map(str::trim) {
        Some("") => {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "first_name must not be empty".into(),
            ));
        }
        other => other.map(str::to_string),
    };
    let last_name = match req.last_name.as_deref().map(str::trim) {
        Some("") => {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "last_name must not be empty".into(),
            ));
        }
        other => other.map(str::to_string),
    };

    let user: UserRow = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        UPDATE hcms_user
        SET first_name = COALESCE($2, first_name),
            last_name  = COALESCE($3, last_name),
            phone      = COALESCE($4, phone),
            address    = COALESCE($5, address),
            updated_at = now()
        WHERE user_id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(auth.user_id)
    .bind(first_name)
    .bind(last_name)
    .bind(req.phone.as_deref().map(str::trim))
    .bind(req.address.map(Jsonb))
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::session_expired)?;

    Ok(Json(ApiOk::with_message("Profile updated", user.into())))
}

/* ============================================================
   PUT /api/auth/change-password
   ============================================================ */

pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    if req.current_password.is_empty() || req.new_password.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "current_password and new_password are required".into(),
        ));
    }
    validate_password(&req.new_password)?;

    let row: (String,) = sqlx::query_as(
        r#"
        SELECT password_hash
        FROM hcms_user
        WHERE user_id = $1
          AND is_active = true
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?
    .ok_or_else(ApiError::session_expired)?;

    if !verify_password(&req.current_password, &row.0) {
        // Use invalid_credentials to avoid leaking info
        return Err(ApiError::invalid_credentials());
    }

    let new_hash = hash_password(&req.new_password).map_err(ApiError::Internal)?;

    // Do in a transaction so we can revoke sessions consistently
    let mut tx = state
        .db
        .begin()
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    sqlx::query(
        r#"
        UPDATE hcms_user
        SET password_hash = $1,
            updated_at = now()
        WHERE user_id = $2
        "#,
    )
    .bind(new_hash)
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    // Security: revoke all OTHER active sessions (keep current)
    sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE user_id = $1
          AND revoked_at IS NULL
          AND expires_at > now()
          AND session_token_id <> $2
        "#,
    )
    .bind(auth.user_id)
    .bind(auth.session_token_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    tx.commit()
        .await
        .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk::with_message(
        "Password changed",
        OkData { ok: true },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email("Ann@Example.COM").unwrap(), "ann@example.com");
        assert_eq!(validate_email("  a@b.co  ").unwrap(), "a@b.co");
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@missing.local").is_err());
        assert!(validate_email("x@nodot").is_err());
        assert!(validate_email("spa ce@x.co").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret1").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("").is_err());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok", 24);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(24)));
    }
}
