//! Bearer token verification
//!
//! Tokens are issued by the external identity provider (session handling
//! lives there). This service only checks signature, expiry, issuer and
//! audience, then maps the claims to an [`Actor`].

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::{
    config::{AuthConfig, TokenAlgorithm},
    error::{AppError, AppResult},
    models::{Actor, UserClaims},
};

#[derive(Clone)]
pub struct AuthService {
    key: DecodingKey,
    validation: Validation,
    admin_role: String,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> AppResult<Self> {
        let (algorithm, key) = match config.algorithm {
            TokenAlgorithm::HS256 => {
                let secret = config
                    .secret
                    .as_deref()
                    .ok_or_else(|| AppError::Internal("auth.secret is not configured".to_string()))?;
                (Algorithm::HS256, DecodingKey::from_secret(secret.as_bytes()))
            }
            TokenAlgorithm::RS256 => {
                let pem = config.public_key_pem.as_deref().ok_or_else(|| {
                    AppError::Internal("auth.public_key_pem is not configured".to_string())
                })?;
                let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| AppError::Internal(format!("Invalid RS256 public key: {}", e)))?;
                (Algorithm::RS256, key)
            }
        };

        let mut validation = Validation::new(algorithm);
        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match config.audience {
            Some(ref audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            key,
            validation,
            admin_role: config.admin_role.clone(),
        })
    }

    /// Verify a bearer token and resolve the caller
    pub fn authenticate(&self, token: &str) -> AppResult<Actor> {
        let data = decode::<UserClaims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!("Rejected bearer token: {}", e);
            AppError::Unauthenticated(e.to_string())
        })?;

        Ok(data.claims.into_actor(&self.admin_role))
    }
}
