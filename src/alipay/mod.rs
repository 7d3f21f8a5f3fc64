//! Alipay open platform (`gateway.do`) provider.

pub mod client;
pub mod notify;
pub mod plugins;
pub mod shortcuts;

pub use client::Alipay;
pub use notify::CallbackPlugin;

use crate::config::{AlipayConfig, Mode};
use crate::crypto::SignType;
use crate::errors::{PayError, PayResult};

pub const URL_NORMAL: &str = "https://openapi.alipay.com/gateway.do?charset=utf-8";
pub const URL_SANDBOX: &str = "https://openapi.alipaydev.com/gateway.do?charset=utf-8";
pub const URL_SERVICE: &str = "https://openapi.alipay.com/gateway.do?charset=utf-8";

/// Business success code inside `*_response`.
pub const SUCCESS_CODE: &str = "10000";

pub fn gateway_url(cfg: &AlipayConfig, mode: Mode) -> String {
    if let Some(gateway) = cfg.gateway.as_ref().filter(|g| !g.is_empty()) {
        return gateway.clone();
    }
    match mode {
        Mode::Normal => URL_NORMAL,
        Mode::Sandbox => URL_SANDBOX,
        Mode::Service => URL_SERVICE,
    }
    .to_string()
}

pub(crate) fn sign_type(cfg: &AlipayConfig) -> PayResult<SignType> {
    SignType::parse(&cfg.sign_type)
}

pub(crate) fn private_key(cfg: &AlipayConfig) -> PayResult<&str> {
    if cfg.private_key.trim().is_empty() {
        return Err(PayError::Configuration(
            "Missing Alipay Config -- [private_key]".into(),
        ));
    }
    Ok(&cfg.private_key)
}

/// Certificate path wins over the bare public key.
pub(crate) fn public_key(cfg: &AlipayConfig) -> PayResult<&str> {
    if let Some(path) = cfg.alipay_public_cert_path.as_deref().filter(|p| !p.is_empty()) {
        return Ok(path);
    }
    match cfg.alipay_public_key.as_deref() {
        Some(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(PayError::Configuration(
            "Missing Alipay Config -- [alipay_public_key]".into(),
        )),
    }
}
