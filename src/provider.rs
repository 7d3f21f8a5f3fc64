use crate::errors::PayResult;
use crate::http::HttpResponse;
use crate::pipeline::Plugin;
use crate::rocket::{Collection, Rocket};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An order reference: a bare `out_trade_no` or a full parameter map.
#[derive(Clone, Debug)]
pub enum Order {
    Id(String),
    Params(Collection),
}

impl Order {
    pub fn into_params(self) -> Collection {
        match self {
            Order::Params(params) => params,
            Order::Id(id) => {
                let mut params = Collection::new();
                params.insert("out_trade_no".into(), Value::String(id));
                params
            }
        }
    }
}

impl From<&str> for Order {
    fn from(id: &str) -> Self {
        Order::Id(id.to_string())
    }
}

impl From<String> for Order {
    fn from(id: String) -> Self {
        Order::Id(id)
    }
}

impl From<u64> for Order {
    fn from(id: u64) -> Self {
        Order::Id(id.to_string())
    }
}

impl From<Collection> for Order {
    fn from(params: Collection) -> Self {
        Order::Params(params)
    }
}

impl From<Value> for Order {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(params) => Order::Params(params),
            Value::String(id) => Order::Id(id),
            other => Order::Id(other.to_string()),
        }
    }
}

/// Inbound notification as received by the caller's web layer.
#[derive(Clone, Debug)]
pub struct CallbackRequest {
    pub method: Method,
    /// Raw query string, without the leading `?`.
    pub query: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl CallbackRequest {
    pub fn new(method: Method, query: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method,
            query: query.into(),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn query_params(&self) -> Collection {
        parse_form(&self.query)
    }

    /// Form-encoded body fields; JSON bodies yield nothing.
    pub fn form_params(&self) -> Collection {
        let body = self.body.trim_start();
        if body.starts_with('{') || body.starts_with('[') {
            return Collection::new();
        }
        parse_form(body)
    }
}

fn parse_form(input: &str) -> Collection {
    url::form_urlencoded::parse(input.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

#[derive(Clone, Debug)]
pub enum CallbackInput {
    Params(Collection),
    Request(CallbackRequest),
}

impl From<Collection> for CallbackInput {
    fn from(params: Collection) -> Self {
        CallbackInput::Params(params)
    }
}

impl From<CallbackRequest> for CallbackInput {
    fn from(request: CallbackRequest) -> Self {
        CallbackInput::Request(request)
    }
}

/// `queryRefund`, `query-refund` and `QueryRefund` all become `query_refund`.
pub fn normalize_shortcut(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.trim().chars().enumerate() {
        match c {
            '-' | ' ' | '.' => out.push('_'),
            c if c.is_ascii_uppercase() => {
                if i > 0 && !out.ends_with('_') {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
            }
            c => out.push(c),
        }
    }
    out
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Run an explicit plugin list as-is.
    async fn pay(&self, plugins: Vec<Arc<dyn Plugin>>, params: Collection) -> PayResult<Rocket>;

    /// Run a registered shortcut wrapped in the gateway's common stages.
    async fn call(&self, shortcut: &str, params: Collection) -> PayResult<Collection>;

    async fn query(&self, order: Order) -> PayResult<Collection>;

    async fn cancel(&self, order: Order) -> PayResult<Collection>;

    async fn close(&self, order: Order) -> PayResult<Collection>;

    async fn refund(&self, order: Order) -> PayResult<Collection>;

    async fn callback(
        &self,
        contents: CallbackInput,
        params: Option<Collection>,
    ) -> PayResult<Collection>;

    /// Acknowledgement expected by the gateway after a verified callback.
    fn success(&self) -> HttpResponse;
}
