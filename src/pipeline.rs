//! Middleware chain executed over a [`Rocket`].
//!
//! Plugins run in list order. Each receives the rocket and a [`Next`]
//! continuation; calling `next.call(rocket)` runs the rest of the chain and,
//! once the list is exhausted, the terminal dispatch of the prepared radar.

use crate::errors::{PayError, PayResult};
use crate::events::{Event, EventDispatcher, EventKind, TracingDispatcher};
use crate::http::HttpClient;
use crate::rocket::{Collection, Direction, Rocket};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, trace};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[async_trait]
pub trait Plugin: Send + Sync {
    async fn assembly(&self, rocket: Rocket, next: Next<'_>) -> PayResult<Rocket>;

    fn name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// The remainder of the chain.
pub struct Next<'a> {
    plugins: &'a [Arc<dyn Plugin>],
    launcher: &'a Launcher,
}

impl<'a> Next<'a> {
    pub fn call(self, rocket: Rocket) -> BoxFuture<'a, PayResult<Rocket>> {
        Box::pin(async move {
            match self.plugins.split_first() {
                Some((plugin, rest)) => {
                    trace!(plugin = plugin.name(), "assembling");
                    let next = Next {
                        plugins: rest,
                        launcher: self.launcher,
                    };
                    plugin.assembly(rocket, next).await
                }
                None => self.launcher.launch(rocket).await,
            }
        })
    }
}

struct Launcher {
    http: Option<Arc<dyn HttpClient>>,
    events: Arc<dyn EventDispatcher>,
}

impl Launcher {
    async fn launch(&self, mut rocket: Rocket) -> PayResult<Rocket> {
        let Some(http) = &self.http else {
            return Ok(rocket);
        };
        if !rocket.direction().should_request() {
            return Ok(rocket);
        }
        let provider = rocket.destination().gateway.as_str();
        let response = {
            let radar = rocket.radar().ok_or_else(|| {
                PayError::InvalidParams("chain reached dispatch without a radar".into())
            })?;
            self.events.publish(Event::new(
                provider,
                EventKind::ApiRequesting {
                    method: radar.method.to_string(),
                    url: radar.url.clone(),
                },
            ));
            http.send(radar).await?
        };
        self.events.publish(Event::new(
            provider,
            EventKind::ApiRequested {
                status: response.status,
            },
        ));
        rocket.set_response(response);
        Ok(rocket)
    }
}

pub struct Pipeline {
    plugins: Vec<Arc<dyn Plugin>>,
    launcher: Launcher,
}

impl Pipeline {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self {
            plugins,
            launcher: Launcher {
                http: None,
                events: Arc::new(TracingDispatcher),
            },
        }
    }

    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.launcher.http = Some(http);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventDispatcher>) -> Self {
        self.launcher.events = events;
        self
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub async fn assemble(&self, rocket: Rocket) -> PayResult<Rocket> {
        let provider = rocket.destination().gateway.as_str();
        self.launcher.events.publish(Event::new(
            provider,
            EventKind::PayStarted {
                plugins: self.plugin_names(),
                params: rocket.params().clone(),
            },
        ));
        let next = Next {
            plugins: &self.plugins,
            launcher: &self.launcher,
        };
        let rocket = next.call(rocket).await?;
        self.launcher
            .events
            .publish(Event::new(provider, EventKind::PayFinish));
        Ok(rocket)
    }
}

/// Decodes the response body once dispatch has happened.
pub struct ParserPlugin;

#[async_trait]
impl Plugin for ParserPlugin {
    async fn assembly(&self, rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        let mut rocket = next.call(rocket).await?;
        if rocket.direction() != Direction::Collection {
            return Ok(rocket);
        }
        let response = rocket.response().ok_or_else(|| PayError::InvalidResponse {
            msg: "no response to parse".into(),
            raw: String::new(),
        })?;
        let decoded = if response.body.trim().is_empty() {
            Value::Object(Collection::new())
        } else {
            serde_json::from_str(&response.body).map_err(|e| PayError::InvalidResponse {
                msg: format!("response is not json: {e}"),
                raw: response.body.clone(),
            })?
        };
        debug!(status = response.status, "response decoded");
        rocket.set_decoded(decoded);
        Ok(rocket)
    }
}

/// Hands back the raw gateway response: no decoding, no verification.
/// Place it among the business plugins, ahead of the launch stage.
pub struct ResponsePlugin;

#[async_trait]
impl Plugin for ResponsePlugin {
    async fn assembly(&self, mut rocket: Rocket, next: Next<'_>) -> PayResult<Rocket> {
        rocket.set_direction(Direction::Response);
        next.call(rocket).await
    }
}
