//! WeChat Pay API v3 provider.

pub mod certs;
pub mod client;
pub mod notify;
pub mod plugins;
pub mod shortcuts;

pub use certs::PlatformCerts;
pub use client::Wechat;
pub use notify::CallbackPlugin;

use crate::config::{Mode, WechatConfig};
use crate::crypto::{verify_base64, SignType};
use crate::errors::{PayError, PayResult};
use crate::http::HttpResponse;
use serde_json::Value;
use tracing::warn;

pub const URL_NORMAL: &str = "https://api.mch.weixin.qq.com/";
pub const URL_SANDBOX: &str = "https://api.mch.weixin.qq.com/sandboxnew/";
pub const URL_SERVICE: &str = "https://api.mch.weixin.qq.com/";

pub const AUTH_SCHEMA: &str = "WECHATPAY2-SHA256-RSA2048";

pub fn base_url(mode: Mode) -> &'static str {
    match mode {
        Mode::Normal => URL_NORMAL,
        Mode::Sandbox => URL_SANDBOX,
        Mode::Service => URL_SERVICE,
    }
}

pub(crate) fn private_key(cfg: &WechatConfig) -> PayResult<&str> {
    if cfg.private_key.trim().is_empty() {
        return Err(PayError::Configuration(
            "Missing Wechat Config -- [private_key]".into(),
        ));
    }
    Ok(&cfg.private_key)
}

fn rejected(msg: &str, raw: &HttpResponse) -> PayError {
    let raw = serde_json::from_str(&raw.body).unwrap_or_else(|_| Value::String(raw.body.clone()));
    warn!(raw = %raw, "{}", msg);
    PayError::SignVerification {
        msg: msg.to_string(),
        raw,
    }
}

/// Checks the `Wechatpay-*` signature headers over `timestamp\nnonce\nbody\n`.
/// Used for both API responses and inbound notifications.
pub(crate) fn verify_signature(certs: &PlatformCerts, response: &HttpResponse) -> PayResult<()> {
    let header = |name: &str| response.header(name).unwrap_or("");
    let (timestamp, nonce, signature, serial) = (
        header("Wechatpay-Timestamp"),
        header("Wechatpay-Nonce"),
        header("Wechatpay-Signature"),
        header("Wechatpay-Serial"),
    );
    if timestamp.is_empty() || nonce.is_empty() || signature.is_empty() {
        return Err(rejected("Wechat signature headers missing", response));
    }
    let public_key = certs.resolve(serial).ok_or_else(|| {
        PayError::Configuration(format!("no wechat platform key for serial [{serial}]"))
    })?;
    let message = format!("{}\n{}\n{}\n", timestamp, nonce, response.body);
    if !verify_base64(&message, signature, &public_key, SignType::Rsa2)? {
        return Err(rejected("Wechat Sign Verify FAILED", response));
    }
    Ok(())
}
