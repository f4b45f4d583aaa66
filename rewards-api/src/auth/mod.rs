use actix_web::{dev::Payload, Error, FromRequest, HttpMessage, HttpRequest};
use chrono::{Duration, Utc};
use futures::future::{err, ok, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

mod middleware;

pub use middleware::AuthenticationMiddleware;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    USER,
    ADMIN,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub role: Role,
    pub exp: usize, // Expiration timestamp
    pub iat: usize, // Issued at timestamp
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
    pub expires_in: u64,
}

pub struct AuthenticatedUser {
    pub user_id: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // Claims are set by the auth middleware
        match req.extensions().get::<Claims>() {
            Some(claims) if claims.role == Role::USER => ok(AuthenticatedUser {
                user_id: claims.sub.clone(),
            }),
            Some(_) => err(ApiError::Unauthorized("User token required".to_string()).into()),
            None => err(ApiError::Unauthorized("User not authenticated".to_string()).into()),
        }
    }
}

pub struct AdminUser {
    pub subject: String,
}

impl FromRequest for AdminUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<Claims>() {
            Some(claims) if claims.role == Role::ADMIN => ok(AdminUser {
                subject: claims.sub.clone(),
            }),
            Some(_) => err(ApiError::Forbidden.into()),
            None => err(ApiError::Unauthorized("User not authenticated".to_string()).into()),
        }
    }
}

pub fn create_token(
    subject: &str,
    role: Role,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let exp = (now + Duration::seconds(expiration_seconds as i64)).timestamp() as usize;
    let iat = now.timestamp() as usize;

    let claims = Claims {
        sub: subject.to_string(),
        role,
        exp,
        iat,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Token creation error: {}", e)))
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            ApiError::Unauthorized("Token expired".to_string())
        }
        _ => ApiError::Unauthorized("Invalid token".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_subject_and_role() {
        let token = create_token("user-1", Role::ADMIN, "test-secret", 60).unwrap();
        let claims = validate_token(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, Role::ADMIN);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = create_token("user-1", Role::USER, "secret-a", 60).unwrap();
        assert!(matches!(
            validate_token(&token, "secret-b"),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
