use super::notify::CallbackPlugin;
use super::plugins::{LaunchPlugin, PreparePlugin, RadarPlugin, SignPlugin};
use super::shortcuts::{ShortcutFn, SHORTCUTS};
use crate::config::{AlipayConfig, Mode};
use crate::errors::{PayError, PayResult};
use crate::events::{Event, EventDispatcher, EventKind, TracingDispatcher};
use crate::http::{HttpClient, HttpResponse};
use crate::pipeline::{ParserPlugin, Pipeline, Plugin};
use crate::provider::{normalize_shortcut, CallbackInput, Order, Provider};
use crate::rocket::{Collection, Destination, Gateway, Rocket};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

const PROVIDER: &str = "alipay";

pub struct Alipay {
    cfg: Arc<AlipayConfig>,
    mode: Mode,
    http: Arc<dyn HttpClient>,
    events: Arc<dyn EventDispatcher>,
    shortcuts: BTreeMap<String, ShortcutFn>,
}

impl Alipay {
    pub fn new(cfg: Arc<AlipayConfig>, mode: Mode, http: Arc<dyn HttpClient>) -> Self {
        Self {
            cfg,
            mode,
            http,
            events: Arc::new(TracingDispatcher),
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

    /// Add or replace a shortcut reachable through [`Provider::call`].
    pub fn register_shortcut(&mut self, name: &str, shortcut: ShortcutFn) {
        self.shortcuts.insert(normalize_shortcut(name), shortcut);
    }

    pub fn merge_common_plugins(&self, plugins: Vec<Arc<dyn Plugin>>) -> Vec<Arc<dyn Plugin>> {
        let mut merged: Vec<Arc<dyn Plugin>> =
            vec![Arc::new(PreparePlugin::new(self.cfg.clone()))];
        merged.extend(plugins);
        merged.push(Arc::new(SignPlugin::new(self.cfg.clone())));
        merged.push(Arc::new(RadarPlugin::new(self.cfg.clone())));
        merged.push(Arc::new(LaunchPlugin::new(self.cfg.clone())));
        merged.push(Arc::new(ParserPlugin));
        merged
    }

    fn rocket(&self, params: Collection) -> Rocket {
        Rocket::new(
            Destination {
                gateway: Gateway::Alipay,
                mode: self.mode,
            },
            params,
        )
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

    /// Query string merged with form body (body wins), then `extra` on top.
    fn callback_params(contents: CallbackInput, extra: Option<Collection>) -> Collection {
        let mut params = match contents {
            CallbackInput::Params(params) => params,
            CallbackInput::Request(request) => {
                let mut params = request.query_params();
                params.extend(request.form_params());
                params
            }
        };
        if let Some(extra) = extra {
            params.extend(extra);
        }
        params
    }
}

#[async_trait]
impl Provider for Alipay {
    async fn pay(&self, plugins: Vec<Arc<dyn Plugin>>, params: Collection) -> PayResult<Rocket> {
        Pipeline::new(plugins)
            .with_http(self.http.clone())
            .with_events(self.events.clone())
            .assemble(self.rocket(params))
            .await
    }

    async fn call(&self, shortcut: &str, params: Collection) -> PayResult<Collection> {
        let name = normalize_shortcut(shortcut);
        let factory = self
            .shortcuts
            .get(&name)
            .ok_or_else(|| PayError::ShortcutNotFound(format!("alipay: {name}")))?;
        let plugins = self.merge_common_plugins(factory());
        self.pay(plugins, params).await?.into_result()
    }

    async fn query(&self, order: Order) -> PayResult<Collection> {
        let params = order.into_params();
        self.method_called("query", &params);
        self.call("query", params).await
    }

    async fn cancel(&self, order: Order) -> PayResult<Collection> {
        let params = order.into_params();
        self.method_called("cancel", &params);
        self.call("cancel", params).await
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
        let params = Self::callback_params(contents, params);
        let plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(CallbackPlugin::new(self.cfg.clone()))];
        self.pay(plugins, params).await?.into_result()
    }

    fn success(&self) -> HttpResponse {
        HttpResponse::new(200, "success")
    }
}
