use super::{public_key, sign_type};
use crate::canonical::{canonicalize, Canonical};
use crate::config::AlipayConfig;
use crate::crypto::verify_base64;
use crate::errors::{PayError, PayResult};
use crate::pipeline::{Next, Plugin};
use crate::rocket::{Direction, Rocket};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Verifies an asynchronous notification; the verified params become the result.
pub struct CallbackPlugin {
    cfg: Arc<AlipayConfig>,
}

impl CallbackPlugin {
    pub fn new(cfg: Arc<AlipayConfig>) -> Self {
        Self { cfg }
    }

    fn reject(&self, rocket: &Rocket, msg: &str) -> PayError {
        let raw = Value::Object(rocket.params().clone());
        warn!(raw = %raw, "{}", msg);
        PayError::SignVerification {
            msg: msg.to_string(),
            raw,
        }
    }
}

#[async_trait]
impl Plugin for CallbackPlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        rocket.set_direction(Direction::NoRequest);
        let public_key = public_key(&self.cfg)?;
        let sign_type = sign_type(&self.cfg)?;

        let Some(sign) = rocket
            .param_str("sign")
            .filter(|s| !s.is_empty())
            .map(str::to_string)
        else {
            return Err(self.reject(&rocket, "Alipay callback is missing sign"));
        };

        let content = canonicalize(rocket.params(), Canonical::Verifying);
        debug!(content = %content, "alipay callback verify content");
        if !verify_base64(&content, &sign, public_key, sign_type)? {
            return Err(self.reject(&rocket, "Alipay Callback Sign Verify FAILED"));
        }

        let verified = rocket.params().clone();
        rocket.set_result(verified);
        next.call(rocket).await
    }
}
