use crate::errors::{PayError, PayResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Service,
    Sandbox,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct WechatConfig {
    pub mchid: String,
    /// Serial number of the merchant API certificate.
    pub serial_no: String,
    /// Merchant private key: file path, PEM text or raw base64 body.
    pub private_key: String,
    pub api_v3_key: String,
    /// Fallback platform public key when no cached certificate matches `Wechatpay-Serial`.
    pub platform_public_key: Option<String>,
    /// Known platform keys by serial number.
    pub platform_certs: BTreeMap<String, String>,
    pub notify_url: Option<String>,
    pub appid_mp: Option<String>,
    pub appid_mini: Option<String>,
    pub appid_app: Option<String>,

    pub sp_appid: Option<String>,
    pub sub_mchid: Option<String>,
    pub sub_appid: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AlipayConfig {
    pub app_id: String,
    /// Overrides the mode-derived gateway URL when set.
    pub gateway: Option<String>,
    /// Application private key: file path, PEM text or raw base64 body.
    pub private_key: String,
    pub alipay_public_key: Option<String>,
    /// Certificate mode: alipayCertPublicKey_RSA2.crt
    pub alipay_public_cert_path: Option<String>,
    /// Certificate mode: appCertPublicKey.crt
    pub app_public_cert_path: Option<String>,
    /// Certificate mode: alipayRootCert.crt
    pub alipay_root_cert_path: Option<String>,
    pub charset: String,
    pub sign_type: String,
    pub notify_url: Option<String>,
    pub return_url: Option<String>,
    /// Service-provider mode only.
    pub app_auth_token: Option<String>,
    pub sys_service_provider_id: Option<String>,
}

impl Default for AlipayConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            gateway: None,
            private_key: String::new(),
            alipay_public_key: None,
            alipay_public_cert_path: None,
            app_public_cert_path: None,
            alipay_root_cert_path: None,
            charset: "utf-8".to_string(),
            sign_type: "RSA2".to_string(),
            notify_url: None,
            return_url: None,
            app_auth_token: None,
            sys_service_provider_id: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    pub timeout_secs: f64,
    pub connect_timeout_secs: f64,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 5.0,
            connect_timeout_secs: 5.0,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PayConfig {
    pub mode: Mode,
    pub wechat: Option<Arc<WechatConfig>>,
    pub alipay: Option<Arc<AlipayConfig>>,
    pub http: HttpOptions,
}

fn required_env(key: &str) -> PayResult<String> {
    std::env::var(key).map_err(|_| PayError::Configuration(format!("{key} must be set")))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl AlipayConfig {
    pub fn from_env() -> PayResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            app_id: required_env("ALIPAY_APP_ID")?,
            gateway: optional_env("ALIPAY_GATEWAY"),
            private_key: required_env("ALIPAY_PRIVATE_KEY")?,
            alipay_public_key: optional_env("ALIPAY_PUBLIC_KEY"),
            alipay_public_cert_path: optional_env("ALIPAY_PUBLIC_CERT_PATH"),
            app_public_cert_path: optional_env("ALIPAY_APP_PUBLIC_CERT_PATH"),
            alipay_root_cert_path: optional_env("ALIPAY_ROOT_CERT_PATH"),
            charset: optional_env("ALIPAY_CHARSET").unwrap_or(defaults.charset),
            sign_type: optional_env("ALIPAY_SIGN_TYPE").unwrap_or(defaults.sign_type),
            notify_url: optional_env("ALIPAY_NOTIFY_URL"),
            return_url: optional_env("ALIPAY_RETURN_URL"),
            app_auth_token: optional_env("ALIPAY_APP_AUTH_TOKEN"),
            sys_service_provider_id: optional_env("ALIPAY_SYS_SERVICE_PROVIDER_ID"),
        })
    }

    pub(crate) fn is_cert_mode(&self) -> bool {
        self.app_public_cert_path.is_some() && self.alipay_root_cert_path.is_some()
    }
}

impl WechatConfig {
    pub fn from_env() -> PayResult<Self> {
        Ok(Self {
            mchid: required_env("WECHAT_MCHID")?,
            serial_no: required_env("WECHAT_SERIAL_NO")?,
            private_key: required_env("WECHAT_PRIVATE_KEY")?,
            api_v3_key: required_env("WECHAT_API_V3_KEY")?,
            platform_public_key: optional_env("WECHAT_PLATFORM_PUBLIC_KEY"),
            platform_certs: BTreeMap::new(),
            notify_url: optional_env("WECHAT_NOTIFY_URL"),
            appid_mp: optional_env("WECHAT_APPID_MP"),
            appid_mini: optional_env("WECHAT_APPID_MINI"),
            appid_app: optional_env("WECHAT_APPID_APP"),
            sp_appid: optional_env("WECHAT_SP_APPID"),
            sub_mchid: optional_env("WECHAT_SUB_MCHID"),
            sub_appid: optional_env("WECHAT_SUB_APPID"),
        })
    }
}
