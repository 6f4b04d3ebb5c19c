//! Capability checks shared by every handler: role-set gating plus
//! owning-profile resolution. Handlers combine these instead of repeating
//! inline role comparisons.

use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::auth_context::AuthContext;
use crate::models::{AppState, Role};

pub fn ensure_role(auth: &AuthContext, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&auth.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            format!("This action requires one of: {}", role_list(allowed)),
        ))
    }
}

pub fn is_admin(auth: &AuthContext) -> bool {
    auth.role == Role::Admin
}

fn role_list(roles: &[Role]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve the doctor profile owned by this account.
pub async fn require_doctor_profile(state: &AppState, user_id: Uuid) -> Result<Uuid, ApiError> {
    let doctor_id: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT doctor_id
        FROM doctor
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    doctor_id.ok_or_else(|| {
        ApiError::NotFound(
            "NO_DOCTOR_PROFILE",
            "This account has no doctor profile".into(),
        )
    })
}

/// Resolve the patient profile owned by this account.
pub async fn require_patient_profile(state: &AppState, user_id: Uuid) -> Result<Uuid, ApiError> {
    let patient_id: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT patient_id
        FROM patient
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    patient_id.ok_or_else(|| {
        ApiError::NotFound(
            "NO_PATIENT_PROFILE",
            "This account has no patient profile".into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: Role) -> AuthContext {
        AuthContext {
            user_id: Uuid::nil(),
            role,
            session_token_id: Uuid::nil(),
        }
    }

    #[test]
    fn test_ensure_role_allows_listed_roles() {
        assert!(ensure_role(&ctx(Role::Admin), &[Role::Admin, Role::Doctor]).is_ok());
        assert!(ensure_role(&ctx(Role::Doctor), &[Role::Admin, Role::Doctor]).is_ok());
    }

    #[test]
    fn test_ensure_role_rejects_other_roles() {
        assert!(ensure_role(&ctx(Role::Patient), &[Role::Admin, Role::Doctor]).is_err());
        assert!(ensure_role(&ctx(Role::Doctor), &[Role::Patient]).is_err());
    }

    #[test]
    fn test_is_admin() {
        assert!(is_admin(&ctx(Role::Admin)));
        assert!(!is_admin(&ctx(Role::Patient)));
    }
}
