//! Authentication middleware
//!
//! Bearer JWT verification and permission checks

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, errors::ErrorKind, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::AppState;

/// Permission required for purchase mutations
pub const PURCHASES_WRITE: &str = "purchases:write";

/// Permission required for sale mutations
pub const SALES_WRITE: &str = "sales:write";

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub permissions: Vec<String>,
}

impl AuthUser {
    /// Check if user has a specific `resource:action` permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Validates the bearer token and stores the [`AuthUser`] in request
/// extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized {
            message: "Missing or invalid Authorization header".to_string(),
            message_es: "Falta el encabezado Authorization o no es válido".to_string(),
        })?;

    if state.config.jwt.secret.is_empty() {
        return Err(AppError::Configuration("jwt.secret is not set".to_string()));
    }

    let auth_user = authenticate(token, &state.config.jwt.secret)?;
    tracing::debug!(user_id = %auth_user.user_id, "Authenticated request");

    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}

/// Decode a token into the authenticated user it names
pub fn authenticate(token: &str, secret: &str) -> AppResult<AuthUser> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::InvalidToken,
    })?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;

    Ok(AuthUser {
        user_id,
        permissions: claims.permissions,
    })
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Authentication required".to_string(),
                message_es: "Se requiere autenticación".to_string(),
            })
    }
}

/// Permission guard for use in handlers
pub fn check_permission(user: &AuthUser, permission: &str) -> AppResult<()> {
    if user.has_permission(permission) {
        Ok(())
    } else {
        Err(AppError::InsufficientPermissions(permission.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token(sub: &str, permissions: &[&str], exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            exp: now + exp_offset,
            iat: now,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_user() {
        let id = Uuid::new_v4();
        let user = authenticate(&token(&id.to_string(), &[SALES_WRITE], 3600), SECRET).unwrap();
        assert_eq!(user.user_id, id);
        assert!(user.has_permission(SALES_WRITE));
        assert!(!user.has_permission(PURCHASES_WRITE));
    }

    #[test]
    fn expired_token_is_reported() {
        let id = Uuid::new_v4();
        let err = authenticate(&token(&id.to_string(), &[], -3600), SECRET).unwrap_err();
        assert!(matches!(err, AppError::TokenExpired));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let id = Uuid::new_v4();
        let err = authenticate(&token(&id.to_string(), &[], 3600), "other").unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let err = authenticate(&token("admin", &[], 3600), SECRET).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[test]
    fn permission_guard() {
        let user = AuthUser {
            user_id: Uuid::nil(),
            permissions: vec![PURCHASES_WRITE.to_string()],
        };
        assert!(check_permission(&user, PURCHASES_WRITE).is_ok());
        assert!(matches!(
            check_permission(&user, SALES_WRITE),
            Err(AppError::InsufficientPermissions(_))
        ));
    }
}
