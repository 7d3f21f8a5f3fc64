use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayError {
    /// Missing or unusable key material / config. Raised before any network call.
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("shortcut not found: {0}")]
    ShortcutNotFound(String),
    /// The gateway answered, but refused the operation.
    #[error("gateway business error: [{code}] {msg}")]
    GatewayBusiness {
        code: String,
        msg: String,
        sub_code: Option<String>,
        sub_msg: Option<String>,
        raw: Value,
    },
    #[error("sign verification failed: {msg}")]
    SignVerification { msg: String, raw: Value },
    #[error("transport: {0}")]
    Transport(String),
    #[error("invalid response: {msg}")]
    InvalidResponse { msg: String, raw: String },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("crypto: {0}")]
    Crypto(String),
}

pub type PayResult<T> = Result<T, PayError>;

impl From<reqwest::Error> for PayError {
    fn from(e: reqwest::Error) -> Self {
        PayError::Transport(e.to_string())
    }
}

impl From<openssl::error::ErrorStack> for PayError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        PayError::Crypto(e.to_string())
    }
}

impl PayError {
    /// Build a business error from an Alipay `*_response` object.
    pub fn from_alipay_response(sub: &Value, raw: Value) -> Self {
        let field = |k: &str| sub.get(k).and_then(Value::as_str).map(str::to_string);
        PayError::GatewayBusiness {
            code: field("code").unwrap_or_default(),
            msg: field("msg").unwrap_or_else(|| "unknown alipay error".to_string()),
            sub_code: field("sub_code"),
            sub_msg: field("sub_msg"),
            raw,
        }
    }

    /// Build a business error from a non-2xx WeChat Pay v3 body.
    pub fn from_wechat_response(status: u16, body: Value) -> Self {
        let code = body
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string());
        let msg = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown wechat error")
            .to_string();
        PayError::GatewayBusiness {
            code,
            msg,
            sub_code: None,
            sub_msg: None,
            raw: body,
        }
    }

    pub fn is_sign_verification(&self) -> bool {
        matches!(self, PayError::SignVerification { .. })
    }

    pub fn is_business(&self) -> bool {
        matches!(self, PayError::GatewayBusiness { .. })
    }
}
