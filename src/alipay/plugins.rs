//! Alipay stages: prepare → business → sign → radar → launch.

use super::{gateway_url, private_key, public_key, sign_type, SUCCESS_CODE};
use crate::canonical::{canonicalize, value_text, Canonical};
use crate::config::{AlipayConfig, Mode};
use crate::crypto::{sign_base64, verify_base64};
use crate::errors::{PayError, PayResult};
use crate::http::Radar;
use crate::pipeline::{Next, Plugin};
use crate::rocket::{Collection, Direction, Rocket};
use crate::utils::{get_cert_sn, get_root_cert_sn};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::value::RawValue;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use urlencoding::encode;

/// Common request fields plus `biz_content` taken from the caller's params.
pub struct PreparePlugin {
    cfg: Arc<AlipayConfig>,
}

impl PreparePlugin {
    pub fn new(cfg: Arc<AlipayConfig>) -> Self {
        Self { cfg }
    }

    fn option(&self, rocket: &Rocket, key: &str, fallback: &Option<String>) -> String {
        rocket
            .param_str(key)
            .map(str::to_string)
            .or_else(|| fallback.clone())
            .unwrap_or_default()
    }

    fn build_service_provider_params(&self, biz: &mut Collection) {
        if let Some(provider_id) = &self.cfg.sys_service_provider_id {
            let extend = biz
                .entry("extend_params")
                .or_insert_with(|| json!({}));
            if let Some(obj) = extend.as_object_mut() {
                obj.entry("sys_service_provider_id")
                    .or_insert_with(|| Value::String(provider_id.clone()));
            }
        }
    }
}

#[async_trait]
impl Plugin for PreparePlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let mode = rocket.destination().mode;
        let sign_type = sign_type(&self.cfg)?;

        let mut payload = Collection::new();
        payload.insert("app_id".into(), json!(self.cfg.app_id));
        payload.insert("method".into(), json!(""));
        payload.insert("format".into(), json!("json"));
        payload.insert(
            "return_url".into(),
            json!(self.option(&rocket, "_return_url", &self.cfg.return_url)),
        );
        payload.insert("charset".into(), json!(self.cfg.charset));
        payload.insert("sign_type".into(), json!(sign_type.as_str()));
        payload.insert("sign".into(), json!(""));
        payload.insert(
            "timestamp".into(),
            json!(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        );
        payload.insert("version".into(), json!("1.0"));
        payload.insert(
            "notify_url".into(),
            json!(self.option(&rocket, "_notify_url", &self.cfg.notify_url)),
        );

        if mode == Mode::Service {
            let token = self.option(&rocket, "_app_auth_token", &self.cfg.app_auth_token);
            if !token.is_empty() {
                payload.insert("app_auth_token".into(), json!(token));
            }
        }

        // 证书模式
        if let (true, Some(app_cert), Some(root_cert)) = (
            self.cfg.is_cert_mode(),
            self.cfg.app_public_cert_path.as_deref(),
            self.cfg.alipay_root_cert_path.as_deref(),
        ) {
            payload.insert("app_cert_sn".into(), json!(get_cert_sn(app_cert)?));
            payload.insert("alipay_root_cert_sn".into(), json!(get_root_cert_sn(root_cert)?));
        }

        let mut biz = rocket.business_params();
        if mode == Mode::Service {
            self.build_service_provider_params(&mut biz);
        }
        payload.insert("biz_content".into(), Value::Object(biz));

        rocket.merge_payload(payload);
        next.call(rocket).await
    }
}

/// Names the API method and fills product-specific biz defaults.
pub struct ApiPlugin {
    method: &'static str,
    defaults: &'static [(&'static str, &'static str)],
}

impl ApiPlugin {
    pub const fn new(method: &'static str) -> Self {
        Self {
            method,
            defaults: &[],
        }
    }

    pub const fn with_defaults(
        method: &'static str,
        defaults: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self { method, defaults }
    }

    pub fn method(&self) -> &'static str {
        self.method
    }
}

#[async_trait]
impl Plugin for ApiPlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let payload = rocket.payload_mut();
        payload.insert("method".into(), json!(self.method));
        if let Some(biz) = payload.get_mut("biz_content").and_then(Value::as_object_mut) {
            for (k, v) in self.defaults {
                biz.entry(*k).or_insert_with(|| json!(v));
            }
        }
        next.call(rocket).await
    }

    fn name(&self) -> &'static str {
        self.method
    }
}

pub struct SignPlugin {
    cfg: Arc<AlipayConfig>,
}

impl SignPlugin {
    pub fn new(cfg: Arc<AlipayConfig>) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Plugin for SignPlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let key = private_key(&self.cfg)?;
        let sign_type = sign_type(&self.cfg)?;

        let payload = rocket.payload_mut();
        if let Some(biz) = payload.get("biz_content").filter(|v| !v.is_string()) {
            let encoded = serde_json::to_string(biz)?;
            payload.insert("biz_content".into(), Value::String(encoded));
        }
        let content = canonicalize(payload, Canonical::Signing);
        debug!(content = %content, "alipay sign content");
        let sign = sign_base64(&content, key, sign_type)?;
        payload.insert("sign".into(), Value::String(sign));

        next.call(rocket).await
    }
}

pub(crate) fn form_encode(payload: &Collection) -> String {
    payload
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(&value_text(v).unwrap_or_default())))
        .collect::<Vec<_>>()
        .join("&")
}

/// POSTs the signed payload as a form to the gateway.
pub struct RadarPlugin {
    cfg: Arc<AlipayConfig>,
}

impl RadarPlugin {
    pub fn new(cfg: Arc<AlipayConfig>) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Plugin for RadarPlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let url = gateway_url(&self.cfg, rocket.destination().mode);
        let radar = Radar::new(Method::POST, url)
            .header(
                "Content-Type",
                "application/x-www-form-urlencoded;charset=utf-8",
            )
            .body(form_encode(rocket.payload()));
        rocket.set_radar(radar)?;
        next.call(rocket).await
    }
}

/// Exact JSON text of `key` in `body`, as signed by the gateway.
fn raw_member(body: &str, key: &str) -> Option<String> {
    let members: HashMap<String, Box<RawValue>> = serde_json::from_str(body).ok()?;
    members.get(key).map(|raw| raw.get().to_string())
}

/// Checks the business code and the response signature after dispatch.
pub struct LaunchPlugin {
    cfg: Arc<AlipayConfig>,
}

impl LaunchPlugin {
    pub fn new(cfg: Arc<AlipayConfig>) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Plugin for LaunchPlugin {
    async fn assembly(&self, rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        if rocket.direction() != Direction::Collection {
            return next.call(rocket).await;
        }
        let public_key = public_key(&self.cfg)?.to_string();
        let sign_type = sign_type(&self.cfg)?;

        let mut rocket = next.call(rocket).await?;
        let body = rocket.response().map(|r| r.body.clone()).unwrap_or_default();
        let decoded = rocket.decoded().cloned().unwrap_or(Value::Null);

        let mut key = rocket.payload_str("method").unwrap_or_default().replace('.', "_");
        key.push_str("_response");
        if decoded.get(&key).is_none() {
            key = "error_response".to_string();
        }
        let sub = decoded.get(&key).ok_or_else(|| PayError::InvalidResponse {
            msg: "missing alipay response object".into(),
            raw: body.clone(),
        })?;

        if sub.get("code").and_then(Value::as_str) != Some(SUCCESS_CODE) {
            return Err(PayError::from_alipay_response(sub, decoded.clone()));
        }

        let sign = decoded.get("sign").and_then(Value::as_str).unwrap_or("");
        let content = raw_member(&body, &key).unwrap_or_default();
        let verified = !sign.is_empty() && verify_base64(&content, sign, &public_key, sign_type)?;
        if !verified {
            warn!(raw = %decoded, "Alipay Sign Verify FAILED");
            return Err(PayError::SignVerification {
                msg: "Alipay Sign Verify FAILED".into(),
                raw: decoded,
            });
        }

        let result = sub.as_object().cloned().unwrap_or_default();
        rocket.set_result(result);
        Ok(rocket)
    }
}

fn no_request(mut rocket: Rocket) -> Rocket {
    rocket.set_direction(Direction::NoRequest);
    rocket
}

fn signed_parts(rocket: &Rocket) -> PayResult<(&Radar, &Collection)> {
    let radar = rocket
        .radar()
        .ok_or_else(|| PayError::InvalidParams("radar not built".into()))?;
    Ok((radar, rocket.payload()))
}

/// App pay: the signed order string handed to the Alipay SDK.
pub struct AppResponsePlugin;

#[async_trait]
impl Plugin for AppResponsePlugin {
    async fn assembly(&self, rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let mut rocket = next.call(no_request(rocket)).await?;
        let (_, payload) = signed_parts(&rocket)?;
        let order_string = form_encode(payload);
        let mut result = Collection::new();
        result.insert("order_string".into(), Value::String(order_string));
        rocket.set_result(result);
        Ok(rocket)
    }
}

/// Wap pay: a redirect URL carrying the signed payload.
pub struct WapResponsePlugin;

#[async_trait]
impl Plugin for WapResponsePlugin {
    async fn assembly(&self, rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let mut rocket = next.call(no_request(rocket)).await?;
        let (radar, payload) = signed_parts(&rocket)?;
        let joiner = if radar.url.contains('?') { '&' } else { '?' };
        let url = format!("{}{}{}", radar.url, joiner, form_encode(payload));
        let mut result = Collection::new();
        result.insert("pay_url".into(), Value::String(url));
        rocket.set_result(result);
        Ok(rocket)
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Page pay: an auto-submitting form.
pub struct WebResponsePlugin;

#[async_trait]
impl Plugin for WebResponsePlugin {
    async fn assembly(&self, rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let mut rocket = next.call(no_request(rocket)).await?;
        let (radar, payload) = signed_parts(&rocket)?;
        let inputs = payload
            .iter()
            .map(|(k, v)| {
                format!(
                    r#"<input type="hidden" name="{}" value="{}"/>"#,
                    escape_html(k),
                    escape_html(&value_text(v).unwrap_or_default())
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let form_html = format!(
            r#"<form id="alipaysubmit" name="alipaysubmit" action="{}" method="POST">
{}<input type="submit" value="ok" style="display:none"></form>
<script>document.forms['alipaysubmit'].submit();</script>"#,
            escape_html(&radar.url),
            inputs
        );
        let mut result = Collection::new();
        result.insert("form_html".into(), Value::String(form_html));
        rocket.set_result(result);
        Ok(rocket)
    }
}
