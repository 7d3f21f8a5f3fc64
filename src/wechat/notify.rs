use super::{verify_signature, PlatformCerts};
use crate::config::WechatConfig;
use crate::errors::{PayError, PayResult};
use crate::pipeline::{Next, Plugin};
use crate::rocket::{Collection, Direction, Rocket};
use crate::utils::aes_gcm_decrypt;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Verifies a notification carried on the rocket's response slot and
/// decrypts its `resource`.
pub struct CallbackPlugin {
    cfg: Arc<WechatConfig>,
    certs: Arc<PlatformCerts>,
}

impl CallbackPlugin {
    pub fn new(cfg: Arc<WechatConfig>, certs: Arc<PlatformCerts>) -> Self {
        Self { cfg, certs }
    }

    fn decrypt(&self, resource: &Value) -> PayResult<Value> {
        let field = |k: &str| resource.get(k).and_then(Value::as_str).unwrap_or("");
        let plain = aes_gcm_decrypt(
            &self.cfg.api_v3_key,
            field("associated_data"),
            field("nonce"),
            field("ciphertext"),
        )
        .map_err(|e| PayError::Crypto(format!("decrypt wechat resource: {e}")))?;
        Ok(serde_json::from_str(&plain).unwrap_or(Value::String(plain)))
    }
}

#[async_trait]
impl Plugin for CallbackPlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        rocket.set_direction(Direction::NoRequest);
        let request = rocket.response().cloned().ok_or_else(|| {
            PayError::InvalidParams("wechat callback needs the raw request".into())
        })?;
        verify_signature(&self.certs, &request)?;

        let mut body: Collection =
            serde_json::from_str(&request.body).map_err(|e| PayError::InvalidResponse {
                msg: format!("wechat callback body is not json: {e}"),
                raw: request.body.clone(),
            })?;
        if let Some(resource) = body.get("resource").cloned() {
            let plain = self.decrypt(&resource)?;
            debug!(event_type = ?body.get("event_type"), "wechat callback decrypted");
            body.insert("resource".into(), plain);
        }

        rocket.set_result(body);
        next.call(rocket).await
    }
}
