use anyhow::Result;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    extract::CookieJar,
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::{session, utils, User},
    config::settings::Settings,
    error::AppError,
};

/// Claims of a first-party session; the encoded JWT itself is the stored
/// session value.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

/// Claims of the signed wrapper handed out after a federated login. The
/// stored session value is the provider token carried inside.
#[derive(Debug, Serialize, Deserialize)]
pub struct FederatedClaims {
    pub sub: Uuid,
    pub token: String,
    pub exp: i64,
    pub iat: i64,
}

pub fn create_token(user_id: Uuid, secret: &str, ttl_hours: i64) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        jti: utils::generate_secure_token(),
        exp: (now + Duration::hours(ttl_hours)).timestamp(),
        iat: now.timestamp(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?)
}

pub fn create_federated_token(
    user_id: Uuid,
    provider_token: &str,
    secret: &str,
    ttl_hours: i64,
) -> Result<String> {
    let now = Utc::now();
    let claims = FederatedClaims {
        sub: user_id,
        token: provider_token.to_string(),
        exp: (now + Duration::hours(ttl_hours)).timestamp(),
        iat: now.timestamp(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?)
}

fn decode_claims<T: DeserializeOwned>(token: &str, secret: &str) -> Result<T, AppError> {
    decode::<T>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

/// Shape of the credential presented by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionToken {
    Direct(String),
    Federated(String),
}

impl SessionToken {
    /// The `token` cookie wins over a bearer header; `isOAuth=true` marks the
    /// cookie as a federated wrapper.
    pub fn from_request(jar: &CookieJar, bearer: Option<&str>) -> Option<Self> {
        if let Some(cookie) = jar.get(session::TOKEN_COOKIE) {
            let value = cookie.value().to_string();
            if value.is_empty() {
                return None;
            }
            let federated = jar
                .get(session::OAUTH_COOKIE)
                .map(|c| c.value() == "true")
                .unwrap_or(false);
            return Some(if federated {
                SessionToken::Federated(value)
            } else {
                SessionToken::Direct(value)
            });
        }

        bearer
            .filter(|t| !t.is_empty())
            .map(|t| SessionToken::Direct(t.to_string()))
    }

    /// Verifies the signature and returns `(user id, stored session value)`.
    pub fn verify(&self, secret: &str) -> Result<(Uuid, String), AppError> {
        match self {
            SessionToken::Direct(jwt) => {
                let claims: Claims = decode_claims(jwt, secret)?;
                Ok((claims.sub, jwt.clone()))
            }
            SessionToken::Federated(wrapper) => {
                let claims: FederatedClaims = decode_claims(wrapper, secret)?;
                Ok((claims.sub, claims.token))
            }
        }
    }

    pub fn is_federated(&self) -> bool {
        matches!(self, SessionToken::Federated(_))
    }
}

/// The authenticated caller, resolved against its active session set.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub session: SessionToken,
    /// Value held in `user_sessions` for this request's session.
    pub session_value: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    PgPool: FromRef<S>,
    Settings: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let bearer = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .ok()
            .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string());

        let session =
            SessionToken::from_request(&jar, bearer.as_deref()).ok_or(AppError::Unauthorized)?;

        let settings = Settings::from_ref(state);
        let (user_id, session_value) = session.verify(&settings.jwt_secret)?;

        let pool = PgPool::from_ref(state);
        let user = session::find_session_user(&pool, user_id, &session_value)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthUser {
            user,
            session,
            session_value,
        })
    }
}
