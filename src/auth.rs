use actix_web::{dev::ServiceRequest, error::ErrorUnauthorized, web, Error, HttpMessage};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    errors::ApiError,
    models::{UserRow, ROLE_ADMIN, ROLE_BARBER, ROLE_SECRETARY},
    state::{AppState, JwtConfig},
};

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub display_name: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn issue_token(config: &JwtConfig, user: &UserRow) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (Utc::now() + Duration::hours(config.ttl_hours)).timestamp() as usize;
    let claims = Claims {
        sub: user.id.clone(),
        role: user.role.clone(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

pub fn decode_token(config: &JwtConfig, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

pub async fn authenticate_credentials(
    state: &AppState,
    username: &str,
    password: &str,
) -> Option<UserRow> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, display_name, role, password_hash, active, created_at
           FROM users
           WHERE username = ? AND active = 1
           LIMIT 1"#,
    )
    .bind(username)
    .fetch_optional(&state.db)
    .await
    .ok()??;

    if !verify_password(password, &user.password_hash) {
        return None;
    }

    Some(user)
}

async fn authenticate(req: &ServiceRequest, credentials: &BearerAuth) -> Result<AuthUser, Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))?;

    let claims = decode_token(&state.jwt, credentials.token())
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))?;

    // Token claims are not trusted for role or active flag; the user row is.
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, display_name, role, password_hash, active, created_at
           FROM users
           WHERE id = ? AND active = 1
           LIMIT 1"#,
    )
    .bind(&claims.sub)
    .fetch_optional(&state.db)
    .await
    .map_err(|_| ErrorUnauthorized("Unauthorized"))?
    .ok_or_else(|| ErrorUnauthorized("Unauthorized"))?;

    Ok(AuthUser {
        id: user.id,
        display_name: user.display_name,
        role: user.role,
    })
}

pub async fn staff_validator(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            if ![ROLE_ADMIN, ROLE_SECRETARY, ROLE_BARBER].contains(&user.role.as_str()) {
                return Err((ApiError::Forbidden.into(), req));
            }
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

pub async fn admin_validator(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            if user.role != ROLE_ADMIN {
                return Err((ApiError::Forbidden.into(), req));
            }
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(role: &str) -> UserRow {
        UserRow {
            id: new_id(),
            username: "tester".to_string(),
            display_name: "Tester".to_string(),
            role: role.to_string(),
            password_hash: String::new(),
            active: 1,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("s3gredo").unwrap();
        assert!(verify_password("s3gredo", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3gredo", "not-a-phc-string"));
    }

    #[test]
    fn token_round_trip_carries_subject_and_role() {
        let config = JwtConfig {
            secret: "test-secret".to_string(),
            ttl_hours: 1,
        };
        let user = test_user(ROLE_SECRETARY);
        let token = issue_token(&config, &user).unwrap();
        let claims = decode_token(&config, &token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, ROLE_SECRETARY);
    }

    #[test]
    fn token_rejected_with_wrong_secret() {
        let config = JwtConfig {
            secret: "test-secret".to_string(),
            ttl_hours: 1,
        };
        let other = JwtConfig {
            secret: "another-secret".to_string(),
            ttl_hours: 1,
        };
        let token = issue_token(&config, &test_user(ROLE_ADMIN)).unwrap();
        assert!(decode_token(&other, &token).is_none());
        assert!(decode_token(&config, "garbage.token.here").is_none());
    }
}
