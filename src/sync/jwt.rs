//! JWT issuance/verification for the sync protocol (C9/C10). HS256 with the
//! primary's `jwtSecret`; payload exactly as spec.md §6 describes. Token
//! storage on the primary is `sha256(token)` only (spec.md §6).

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};
use crate::types::InstanceId;

/// Token lifetime, per spec.md §6.
pub const TOKEN_TTL: Duration = Duration::hours(24);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "instanceId")]
    pub instance_id: InstanceId,
    #[serde(rename = "instanceName")]
    pub instance_name: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue(jwt_secret: &str, instance_id: InstanceId, instance_name: &str) -> MonitorResult<String> {
    let now = Utc::now();
    let claims = Claims {
        instance_id,
        instance_name: instance_name.to_string(),
        iat: now.timestamp(),
        exp: (now + TOKEN_TTL).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| MonitorError::Auth(format!("jwt encode: {e}")))
}

pub fn verify(jwt_secret: &str, token: &str) -> MonitorResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| MonitorError::Auth(format!("jwt decode: {e}")))
}
