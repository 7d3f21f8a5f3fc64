use super::certs::PlatformCerts;
use super::notify::CallbackPlugin;
use super::plugins::{CertificatesPlugin, LaunchPlugin, PreparePlugin, RadarPlugin, SignPlugin};
use super::shortcuts::{ShortcutFn, SHORTCUTS};
use crate::config::{Mode, WechatConfig};
use crate::errors::{PayError, PayResult};
use crate::events::{Event, EventDispatcher, EventKind, TracingDispatcher};
use crate::http::{HttpClient, HttpResponse};
use crate::pipeline::{ParserPlugin, Pipeline, Plugin};
use crate::provider::{normalize_shortcut, CallbackInput, Order, Provider};
use crate::rocket::{Collection, Destination, Gateway, Rocket};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const PROVIDER: &str = "wechat";

pub struct Wechat {
    cfg: Arc<WechatConfig>,
    mode: Mode,
    http: Arc<dyn HttpClient>,
    events: Arc<dyn EventDispatcher>,
    certs: Arc<PlatformCerts>,
    shortcuts: BTreeMap<String, ShortcutFn>,
}

impl Wechat {
    pub fn new(cfg: Arc<WechatConfig>, mode: Mode, http: Arc<dyn HttpClient>) -> Self {
        let certs = Arc::new(PlatformCerts::new(cfg.clone()));
        Self {
            cfg,
            mode,
            http,
            events: Arc::new(TracingDispatcher),
            certs,
            shortcuts: SHORTCUTS
                .iter()
                .map(|(name, f)| (name.to_string(), *f))
                .collect(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventDispatcher>) -> Self {
        self.events = events;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn certs(&self) -> &Arc<PlatformCerts> {
        &self.certs
    }

    pub fn register_shortcut(&mut self, name: &str, shortcut: ShortcutFn) {
        self.shortcuts.insert(normalize_shortcut(name), shortcut);
    }

    pub fn merge_common_plugins(&self, plugins: Vec<Arc<dyn Plugin>>) -> Vec<Arc<dyn Plugin>> {
        let mut merged: Vec<Arc<dyn Plugin>> = vec![Arc::new(PreparePlugin)];
        merged.extend(plugins);
        merged.push(Arc::new(SignPlugin::new(self.cfg.clone())));
        merged.push(Arc::new(RadarPlugin));
        merged.push(Arc::new(LaunchPlugin::new(self.certs.clone())));
        merged.push(Arc::new(ParserPlugin));
        merged
    }

    fn rocket(&self, params: Collection) -> Rocket {
        Rocket::new(
            Destination {
                gateway: Gateway::Wechat,
                mode: self.mode,
            },
            params,
        )
    }

    async fn run(&self, plugins: Vec<Arc<dyn Plugin>>, rocket: Rocket) -> PayResult<Rocket> {
        Pipeline::new(plugins)
            .with_http(self.http.clone())
            .with_events(self.events.clone())
            .assemble(rocket)
            .await
    }

    fn method_called(&self, method: &'static str, params: &Collection) {
        self.events.publish(Event::new(
            PROVIDER,
            EventKind::MethodCalled {
                method,
                params: params.clone(),
            },
        ));
    }

    /// Download `/v3/certificates` and cache every platform key by serial.
    /// The download itself is not verified, since it is how keys are obtained.
    pub async fn refresh_platform_certs(&self) -> PayResult<Vec<String>> {
        let plugins: Vec<Arc<dyn Plugin>> = vec![
            Arc::new(PreparePlugin),
            Arc::new(CertificatesPlugin),
            Arc::new(SignPlugin::new(self.cfg.clone())),
            Arc::new(RadarPlugin),
            Arc::new(ParserPlugin),
        ];
        let rocket = self.run(plugins, self.rocket(Collection::new())).await?;
        let status = rocket.response().map(|r| r.status).unwrap_or_default();
        let decoded = rocket.decoded().cloned().unwrap_or(Value::Null);
        if !(200..300).contains(&status) {
            return Err(PayError::from_wechat_response(status, decoded));
        }
        let serials = self.certs.store_downloaded(&decoded)?;
        info!(count = serials.len(), "wechat platform certs refreshed");
        Ok(serials)
    }
}

#[async_trait]
impl Provider for Wechat {
    async fn pay(&self, plugins: Vec<Arc<dyn Plugin>>, params: Collection) -> PayResult<Rocket> {
        self.run(plugins, self.rocket(params)).await
    }

    async fn call(&self, shortcut: &str, params: Collection) -> PayResult<Collection> {
        let name = normalize_shortcut(shortcut);
        let factory = self
            .shortcuts
            .get(&name)
            .ok_or_else(|| PayError::ShortcutNotFound(format!("wechat: {name}")))?;
        let plugins = self.merge_common_plugins(factory(&self.cfg));
        self.pay(plugins, params).await?.into_result()
    }

    async fn query(&self, order: Order) -> PayResult<Collection> {
        let params = order.into_params();
        self.method_called("query", &params);
        self.call("query", params).await
    }

    async fn cancel(&self, _order: Order) -> PayResult<Collection> {
        Err(PayError::InvalidParams(
            "wechat does not support cancel, use close".into(),
        ))
    }

    async fn close(&self, order: Order) -> PayResult<Collection> {
        let params = order.into_params();
        self.method_called("close", &params);
        self.call("close", params).await
    }

    async fn refund(&self, order: Order) -> PayResult<Collection> {
        let params = order.into_params();
        self.method_called("refund", &params);
        self.call("refund", params).await
    }

    async fn callback(
        &self,
        contents: CallbackInput,
        params: Option<Collection>,
    ) -> PayResult<Collection> {
        self.events.publish(Event::new(
            PROVIDER,
            EventKind::CallbackReceived {
                params: params.clone(),
            },
        ));
        let CallbackInput::Request(request) = contents else {
            return Err(PayError::InvalidParams(
                "wechat callback needs headers and raw body".into(),
            ));
        };
        // The signed body is the whole notification; nothing may be layered on top.
        if params.as_ref().is_some_and(|p| !p.is_empty()) {
            return Err(PayError::InvalidParams(
                "wechat callback takes no extra params".into(),
            ));
        }

        let mut rocket = self.rocket(Collection::new());
        rocket.set_response(HttpResponse {
            status: 200,
            headers: request.headers,
            body: request.body,
        });
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(CallbackPlugin::new(
            self.cfg.clone(),
            self.certs.clone(),
        ))];
        self.run(plugins, rocket).await?.into_result()
    }

    fn success(&self) -> HttpResponse {
        HttpResponse::new(200, r#"{"code":"SUCCESS","message":"成功"}"#)
            .with_header("Content-Type", "application/json")
    }
}
