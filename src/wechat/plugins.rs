//! WeChat Pay v3 stages. Business plugins stage an [`Endpoint`]; the common
//! stages sign it, aim it and verify what comes back.

use super::{base_url, private_key, verify_signature, PlatformCerts, AUTH_SCHEMA};
use crate::config::{Mode, WechatConfig};
use crate::crypto::{sign_base64, SignType};
use crate::errors::{PayError, PayResult};
use crate::http::{Radar, USER_AGENT};
use crate::pipeline::{Next, Plugin};
use crate::rocket::{Collection, Direction, Endpoint, Rocket};
use crate::utils::{gen_nonce, now_ts};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use url::Url;
use urlencoding::encode;

/// Payload = caller params minus `_` options.
pub struct PreparePlugin;

#[async_trait]
impl Plugin for PreparePlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let payload = rocket.business_params();
        rocket.merge_payload(payload);
        next.call(rocket).await
    }
}

fn set_default(payload: &mut Collection, key: &str, value: Option<&String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        payload
            .entry(key)
            .or_insert_with(|| Value::String(value.clone()));
    }
}

fn required(rocket: &Rocket, key: &str) -> PayResult<String> {
    rocket
        .param_str(key)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PayError::InvalidParams(format!("wechat: [{key}] is required")))
}

fn notify_url(rocket: &Rocket, cfg: &WechatConfig) -> Option<String> {
    rocket
        .param_str("_notify_url")
        .map(str::to_string)
        .or_else(|| cfg.notify_url.clone())
}

// 服务商模式下 payer.openid 改为 payer.sub_openid
fn build_service_params(cfg: &WechatConfig, payload: &mut Collection, appid: Option<&String>) {
    set_default(payload, "sp_appid", cfg.sp_appid.as_ref().or(appid));
    set_default(payload, "sp_mchid", Some(&cfg.mchid));
    set_default(payload, "sub_mchid", cfg.sub_mchid.as_ref());
    set_default(payload, "sub_appid", cfg.sub_appid.as_ref());
    if let Some(payer) = payload.get_mut("payer").and_then(Value::as_object_mut) {
        if let Some(openid) = payer.remove("openid") {
            payer.insert("sub_openid".into(), openid);
        }
    }
}

fn transactions_path(mode: Mode) -> &'static str {
    match mode {
        Mode::Service => "v3/pay/partner/transactions",
        _ => "v3/pay/transactions",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrepayKind {
    Mp,
    Mini,
    App,
    H5,
    Native,
}

impl PrepayKind {
    fn segment(&self) -> &'static str {
        match self {
            PrepayKind::Mp | PrepayKind::Mini => "jsapi",
            PrepayKind::App => "app",
            PrepayKind::H5 => "h5",
            PrepayKind::Native => "native",
        }
    }

    fn appid<'a>(&self, cfg: &'a WechatConfig) -> Option<&'a String> {
        match self {
            PrepayKind::Mini => cfg.appid_mini.as_ref(),
            PrepayKind::App => cfg.appid_app.as_ref(),
            PrepayKind::Mp | PrepayKind::H5 | PrepayKind::Native => cfg.appid_mp.as_ref(),
        }
    }
}

/// Order placement: `POST .../transactions/{jsapi|app|h5|native}`.
pub struct PrepayPlugin {
    cfg: Arc<WechatConfig>,
    kind: PrepayKind,
}

impl PrepayPlugin {
    pub fn new(cfg: Arc<WechatConfig>, kind: PrepayKind) -> Self {
        Self { cfg, kind }
    }
}

#[async_trait]
impl Plugin for PrepayPlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let mode = rocket.destination().mode;
        let appid = self.kind.appid(&self.cfg);
        let notify = notify_url(&rocket, &self.cfg);

        let payload = rocket.payload_mut();
        set_default(payload, "notify_url", notify.as_ref());
        if mode == Mode::Service {
            build_service_params(&self.cfg, payload, appid);
        } else {
            set_default(payload, "appid", appid);
            set_default(payload, "mchid", Some(&self.cfg.mchid));
        }

        let path = format!("{}/{}", transactions_path(mode), self.kind.segment());
        rocket.set_endpoint(Endpoint::new(Method::POST, path));
        next.call(rocket).await
    }

    fn name(&self) -> &'static str {
        match self.kind {
            PrepayKind::Mp => "wechat.mp",
            PrepayKind::Mini => "wechat.mini",
            PrepayKind::App => "wechat.app",
            PrepayKind::H5 => "wechat.h5",
            PrepayKind::Native => "wechat.scan",
        }
    }
}

fn merchant_query(cfg: &WechatConfig, mode: Mode) -> String {
    match mode {
        Mode::Service => {
            let mut q = format!("sp_mchid={}", encode(&cfg.mchid));
            if let Some(sub) = &cfg.sub_mchid {
                q.push_str(&format!("&sub_mchid={}", encode(sub)));
            }
            q
        }
        _ => format!("mchid={}", encode(&cfg.mchid)),
    }
}

/// Order query by `transaction_id` or `out_trade_no`.
pub struct QueryPlugin {
    cfg: Arc<WechatConfig>,
}

impl QueryPlugin {
    pub fn new(cfg: Arc<WechatConfig>) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Plugin for QueryPlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let mode = rocket.destination().mode;
        let lookup = match rocket.param_str("transaction_id").filter(|v| !v.is_empty()) {
            Some(id) => format!("id/{}", encode(id)),
            None => format!("out-trade-no/{}", encode(&required(&rocket, "out_trade_no")?)),
        };
        let path = format!(
            "{}/{}?{}",
            transactions_path(mode),
            lookup,
            merchant_query(&self.cfg, mode)
        );
        rocket.payload_mut().clear();
        rocket.set_endpoint(Endpoint::new(Method::GET, path));
        next.call(rocket).await
    }
}

pub struct ClosePlugin {
    cfg: Arc<WechatConfig>,
}

impl ClosePlugin {
    pub fn new(cfg: Arc<WechatConfig>) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Plugin for ClosePlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let mode = rocket.destination().mode;
        let out_trade_no = required(&rocket, "out_trade_no")?;
        let mut body = Collection::new();
        if mode == Mode::Service {
            body.insert("sp_mchid".into(), json!(self.cfg.mchid));
            set_default(&mut body, "sub_mchid", self.cfg.sub_mchid.as_ref());
        } else {
            body.insert("mchid".into(), json!(self.cfg.mchid));
        }
        *rocket.payload_mut() = body;

        let path = format!(
            "{}/out-trade-no/{}/close",
            transactions_path(mode),
            encode(&out_trade_no)
        );
        rocket.set_endpoint(Endpoint::new(Method::POST, path));
        next.call(rocket).await
    }
}

pub struct RefundPlugin {
    cfg: Arc<WechatConfig>,
}

impl RefundPlugin {
    pub fn new(cfg: Arc<WechatConfig>) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Plugin for RefundPlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let mode = rocket.destination().mode;
        let notify = notify_url(&rocket, &self.cfg);
        let payload = rocket.payload_mut();
        set_default(payload, "notify_url", notify.as_ref());
        if mode == Mode::Service {
            set_default(payload, "sub_mchid", self.cfg.sub_mchid.as_ref());
        }
        rocket.set_endpoint(Endpoint::new(Method::POST, "v3/refund/domestic/refunds"));
        next.call(rocket).await
    }
}

pub struct QueryRefundPlugin {
    cfg: Arc<WechatConfig>,
}

impl QueryRefundPlugin {
    pub fn new(cfg: Arc<WechatConfig>) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Plugin for QueryRefundPlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let mode = rocket.destination().mode;
        let mut path = format!(
            "v3/refund/domestic/refunds/{}",
            encode(&required(&rocket, "out_refund_no")?)
        );
        if let (Mode::Service, Some(sub)) = (mode, &self.cfg.sub_mchid) {
            path.push_str(&format!("?sub_mchid={}", encode(sub)));
        }
        rocket.payload_mut().clear();
        rocket.set_endpoint(Endpoint::new(Method::GET, path));
        next.call(rocket).await
    }
}

/// Platform certificate download.
pub struct CertificatesPlugin;

#[async_trait]
impl Plugin for CertificatesPlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        rocket.payload_mut().clear();
        rocket.set_endpoint(Endpoint::new(Method::GET, "v3/certificates"));
        next.call(rocket).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeKind {
    /// JSAPI bridge for official accounts and mini programs.
    Jsapi,
    App,
}

/// Turns a `prepay_id` result into the parameters the client SDK invokes with.
pub struct InvokePlugin {
    cfg: Arc<WechatConfig>,
    kind: InvokeKind,
}

impl InvokePlugin {
    pub fn new(cfg: Arc<WechatConfig>, kind: InvokeKind) -> Self {
        Self { cfg, kind }
    }

    fn invoke_params(&self, payload: &Collection, prepay_id: &str) -> PayResult<Collection> {
        let field = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| payload.get(*k).and_then(Value::as_str))
                .unwrap_or("")
                .to_string()
        };
        let appid = field(&["sub_appid", "sp_appid", "appid"]);
        let timestamp = now_ts();
        let nonce = gen_nonce(32);
        let key = private_key(&self.cfg)?;

        let mut out = Collection::new();
        match self.kind {
            InvokeKind::Jsapi => {
                let package = format!("prepay_id={prepay_id}");
                let message = format!("{appid}\n{timestamp}\n{nonce}\n{package}\n");
                let pay_sign = sign_base64(&message, key, SignType::Rsa2)?;
                out.insert("appId".into(), json!(appid));
                out.insert("timeStamp".into(), json!(timestamp));
                out.insert("nonceStr".into(), json!(nonce));
                out.insert("package".into(), json!(package));
                out.insert("signType".into(), json!("RSA"));
                out.insert("paySign".into(), json!(pay_sign));
            }
            InvokeKind::App => {
                let partnerid = field(&["sub_mchid", "mchid", "sp_mchid"]);
                let message = format!("{appid}\n{timestamp}\n{nonce}\n{prepay_id}\n");
                let sign = sign_base64(&message, key, SignType::Rsa2)?;
                out.insert("appid".into(), json!(appid));
                out.insert("partnerid".into(), json!(partnerid));
                out.insert("prepayid".into(), json!(prepay_id));
                out.insert("package".into(), json!("Sign=WXPay"));
                out.insert("noncestr".into(), json!(nonce));
                out.insert("timestamp".into(), json!(timestamp));
                out.insert("sign".into(), json!(sign));
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Plugin for InvokePlugin {
    async fn assembly(&self, rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let mut rocket = next.call(rocket).await?;
        let prepay_id = rocket
            .result()
            .and_then(|r| r.get("prepay_id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(prepay_id) = prepay_id {
            let params = self.invoke_params(rocket.payload(), &prepay_id)?;
            rocket.set_result(params);
        }
        Ok(rocket)
    }
}

/// Path plus query as it appears on the wire, e.g. `/sandboxnew/v3/certificates`.
fn canonical_path(url: &str) -> PayResult<String> {
    let parsed =
        Url::parse(url).map_err(|e| PayError::InvalidParams(format!("bad url {url}: {e}")))?;
    Ok(match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    })
}

/// Adds the `Authorization` header over `METHOD\nPATH\nTS\nNONCE\nBODY\n`.
pub struct SignPlugin {
    cfg: Arc<WechatConfig>,
}

impl SignPlugin {
    pub fn new(cfg: Arc<WechatConfig>) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Plugin for SignPlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let key = private_key(&self.cfg)?;
        let (method, path) = match rocket.endpoint() {
            Some(ep) => (ep.method.clone(), ep.path.clone()),
            None => return Err(PayError::InvalidParams("wechat endpoint not set".into())),
        };
        let body = if method == Method::GET {
            String::new()
        } else {
            serde_json::to_string(rocket.payload())?
        };
        let path = canonical_path(&format!("{}{}", base_url(rocket.destination().mode), path))?;
        let timestamp = now_ts();
        let nonce = gen_nonce(32);
        let message = format!("{method}\n{path}\n{timestamp}\n{nonce}\n{body}\n");
        debug!(content = %message, "wechat sign content");
        let signature = sign_base64(&message, key, SignType::Rsa2)?;
        let authorization = format!(
            r#"{AUTH_SCHEMA} mchid="{}",nonce_str="{}",timestamp="{}",serial_no="{}",signature="{}""#,
            self.cfg.mchid, nonce, timestamp, self.cfg.serial_no, signature
        );

        if let Some(ep) = rocket.endpoint_mut() {
            ep.headers.push(("Authorization".into(), authorization));
            if method != Method::GET {
                ep.body = Some(body);
            }
        }
        next.call(rocket).await
    }
}

pub struct RadarPlugin;

#[async_trait]
impl Plugin for RadarPlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let endpoint = rocket
            .endpoint()
            .cloned()
            .ok_or_else(|| PayError::InvalidParams("wechat endpoint not set".into()))?;
        let url = format!("{}{}", base_url(rocket.destination().mode), endpoint.path);
        let mut radar = Radar::new(endpoint.method, url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT);
        for (name, value) in endpoint.headers {
            radar = radar.header(name, value);
        }
        if let Some(body) = endpoint.body {
            radar = radar.header("Content-Type", "application/json").body(body);
        }
        debug!(method = %radar.method, url = %radar.url, "wechat radar");
        rocket.set_radar(radar)?;
        next.call(rocket).await
    }
}

/// Status check and response signature verification after dispatch.
pub struct LaunchPlugin {
    certs: Arc<PlatformCerts>,
}

impl LaunchPlugin {
    pub fn new(certs: Arc<PlatformCerts>) -> Self {
        Self { certs }
    }
}

#[async_trait]
impl Plugin for LaunchPlugin {
    async fn assembly(&self, rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        if rocket.direction() != Direction::Collection {
            return next.call(rocket).await;
        }
        if !self.certs.has_any() {
            return Err(PayError::Configuration(
                "Missing Wechat Config -- [platform_public_key]".into(),
            ));
        }

        let mut rocket = next.call(rocket).await?;
        let response = rocket
            .response()
            .cloned()
            .ok_or_else(|| PayError::InvalidResponse {
                msg: "no wechat response".into(),
                raw: String::new(),
            })?;
        let decoded = rocket.decoded().cloned().unwrap_or(Value::Null);
        if !response.is_success() {
            return Err(PayError::from_wechat_response(response.status, decoded));
        }
        verify_signature(&self.certs, &response)?;

        rocket.set_result(decoded.as_object().cloned().unwrap_or_default());
        Ok(rocket)
    }
}
