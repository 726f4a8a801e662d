use {
    super::api_errors::ApiError,
    crate::{
        AppState,
        domain::{account::Role, error::PipelineError, id::UserId},
    },
    axum::{extract::FromRequestParts, http::request::Parts},
    chrono::{Duration, Utc},
    jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode},
    serde::{Deserialize, Serialize},
};

/// Token claims issued by the marketplace auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub role: Role,
    pub exp: i64,
}

/// HS256 verifier shared by the REST extractor and the push endpoint.
pub struct JwtVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn issue(&self, user: UserId, role: Role, ttl: Duration) -> Result<String, PipelineError> {
        let claims = Claims {
            id: user.get(),
            role,
            exp: (Utc::now() + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| PipelineError::Unauthorized(format!("cannot sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, PipelineError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            PipelineError::Unauthorized("invalid or expired token".into())
        })?;
        Ok(AuthUser {
            id: UserId::from(data.claims.id),
            role: data.claims.role,
        })
    }
}

/// Caller identity taken from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub role: Role,
}

impl AuthUser {
    pub fn require(&self, role: Role) -> Result<(), PipelineError> {
        if self.role == role {
            Ok(())
        } else {
            Err(PipelineError::Forbidden(format!("requires role {role}")))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .filter(|token| !token.is_empty())
            .ok_or_else(|| PipelineError::Unauthorized("missing bearer token".into()))?;

        Ok(state.auth.verify(token)?)
    }
}
