use crate::alipay::Alipay;
use crate::config::PayConfig;
use crate::errors::{PayError, PayResult};
use crate::events::{EventDispatcher, TracingDispatcher};
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::wechat::Wechat;
use std::sync::Arc;

/// Entry point: owns the configuration and the shared collaborators, and
/// hands out providers wired to them.
#[derive(Clone)]
pub struct Pay {
    config: Arc<PayConfig>,
    http: Arc<dyn HttpClient>,
    events: Arc<dyn EventDispatcher>,
}

impl Pay {
    pub fn new(config: PayConfig) -> PayResult<Self> {
        let http = ReqwestHttpClient::new(&config.http)?;
        Ok(Self {
            config: Arc::new(config),
            http: Arc::new(http),
            events: Arc::new(TracingDispatcher),
        })
    }

    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = http;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventDispatcher>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &PayConfig {
        &self.config
    }

    pub fn alipay(&self) -> PayResult<Alipay> {
        let cfg = self
            .config
            .alipay
            .clone()
            .ok_or_else(|| PayError::Configuration("Missing Alipay Config".into()))?;
        Ok(Alipay::new(cfg, self.config.mode, self.http.clone()).with_events(self.events.clone()))
    }

    pub fn wechat(&self) -> PayResult<Wechat> {
        let cfg = self
            .config
            .wechat
            .clone()
            .ok_or_else(|| PayError::Configuration("Missing Wechat Config".into()))?;
        Ok(Wechat::new(cfg, self.config.mode, self.http.clone()).with_events(self.events.clone()))
    }
}
