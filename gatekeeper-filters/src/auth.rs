use async_trait::async_trait;
use gatekeeper_core::GatewayError;
use gatekeeper_core::User;
use gatekeeper_core::config::AuthConfig;
use gatekeeper_filter::{Filter, FilterAction, ProxyContext};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Claims we extract from a verified token. Every field is optional and
/// may arrive as a string or a number.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    username: Option<Value>,
    #[serde(default)]
    userno: Option<Value>,
    #[serde(default)]
    roleno: Option<Value>,
}

/// Authentication extractor.
///
/// Reads the `Authorization` header and, when a token verifies, stores
/// the caller as the context's user. Every outcome continues the
/// pipeline: public endpoints must stay reachable without a token, so a
/// missing or undecodable token leaves the caller anonymous and defers
/// the final decision to the authorization filter.
pub struct AuthenticationFilter {
    decoder: Option<(DecodingKey, Validation)>,
}

impl AuthenticationFilter {
    pub fn new(config: &AuthConfig) -> Result<Self, GatewayError> {
        let Some(secret) = config.jwt_secret.as_deref() else {
            return Ok(Self { decoder: None });
        };

        let algorithm: Algorithm = config
            .jwt_algorithm
            .parse()
            .map_err(|_| GatewayError::Config(format!("unknown JWT algorithm: {}", config.jwt_algorithm)))?;

        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(GatewayError::Config(format!(
                "JWT algorithm {} requires a public key; only HMAC algorithms are supported",
                config.jwt_algorithm
            )));
        }

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;

        Ok(Self {
            decoder: Some((DecodingKey::from_secret(secret.as_bytes()), validation)),
        })
    }
}

#[async_trait(?Send)]
impl Filter for AuthenticationFilter {
    fn name(&self) -> &str {
        "authentication"
    }

    async fn apply(&self, ctx: &mut ProxyContext) -> Result<FilterAction, GatewayError> {
        let Some(raw) = ctx.request.header("Authorization") else {
            return Ok(FilterAction::Continue);
        };
        if raw.is_empty() {
            return Ok(FilterAction::Continue);
        }

        let token = match raw.split_once(' ') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
            _ => raw.trim(),
        };

        let Some((key, validation)) = &self.decoder else {
            debug!("No token secret configured, caller stays anonymous");
            return Ok(FilterAction::Continue);
        };

        match decode::<Claims>(token, key, validation) {
            Ok(data) => {
                let claims = data.claims;
                let user = User::from_claims(
                    claims.id.as_ref(),
                    claims.username.as_ref(),
                    claims.userno.as_ref(),
                    claims.roleno.as_ref(),
                );
                debug!(username = %user.username, "Authenticated caller");
                ctx.set_user(user);
            }
            Err(e) => {
                // Invalid tokens are not rejected here; authorization
                // enforces the final decision for the anonymous caller.
                debug!(error = %e, "Token decode failed, caller stays anonymous");
            }
        }

        Ok(FilterAction::Continue)
    }
}
