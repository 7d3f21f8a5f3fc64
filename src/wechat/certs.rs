use crate::config::WechatConfig;
use crate::errors::{PayError, PayResult};
use crate::utils::{aes_gcm_decrypt, extract_pubkey_from_cert};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Platform public keys by certificate serial.
pub struct PlatformCerts {
    map: RwLock<HashMap<String, String>>,
    cfg: Arc<WechatConfig>,
}

impl PlatformCerts {
    pub fn new(cfg: Arc<WechatConfig>) -> Self {
        let map = cfg
            .platform_certs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            map: RwLock::new(map),
            cfg,
        }
    }

    pub fn get_by_serial(&self, serial: &str) -> Option<String> {
        let m = self.map.read().unwrap_or_else(PoisonError::into_inner);
        m.get(serial).cloned()
    }

    /// Cached key for `serial`, else the configured fallback key.
    pub fn resolve(&self, serial: &str) -> Option<String> {
        self.get_by_serial(serial).or_else(|| {
            self.cfg
                .platform_public_key
                .clone()
                .filter(|k| !k.trim().is_empty())
        })
    }

    pub fn has_any(&self) -> bool {
        let m = self.map.read().unwrap_or_else(PoisonError::into_inner);
        !m.is_empty()
            || self
                .cfg
                .platform_public_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty())
    }

    pub fn insert(&self, serial: &str, public_key: String) {
        let mut m = self.map.write().unwrap_or_else(PoisonError::into_inner);
        m.insert(serial.to_string(), public_key);
    }

    /// Store every certificate of a `/v3/certificates` body. Returns the serials stored.
    pub fn store_downloaded(&self, body: &Value) -> PayResult<Vec<String>> {
        let Some(arr) = body.get("data").and_then(Value::as_array) else {
            return Err(PayError::InvalidResponse {
                msg: "certificates response has no data".into(),
                raw: body.to_string(),
            });
        };
        let mut stored = Vec::new();
        for cert in arr {
            let (Some(serial), Some(resource)) = (
                cert.get("serial_no").and_then(Value::as_str),
                cert.get("encrypt_certificate"),
            ) else {
                continue;
            };
            let field = |k: &str| resource.get(k).and_then(Value::as_str).unwrap_or("");
            let pem = aes_gcm_decrypt(
                &self.cfg.api_v3_key,
                field("associated_data"),
                field("nonce"),
                field("ciphertext"),
            )
            .map_err(|e| PayError::Crypto(format!("decrypt platform cert {serial}: {e}")))?;
            let pub_pem = extract_pubkey_from_cert(&pem)
                .map_err(|e| PayError::Crypto(format!("platform cert {serial}: {e}")))?;
            debug!(serial, "stored platform cert");
            self.insert(serial, pub_pem);
            stored.push(serial.to_string());
        }
        Ok(stored)
    }
}
