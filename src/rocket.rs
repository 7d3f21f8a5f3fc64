//! The per-call envelope threaded through the plugin chain.

use crate::config::Mode;
use crate::errors::{PayError, PayResult};
use crate::http::{HttpResponse, Radar};
use reqwest::Method;
use serde_json::{Map, Value};

pub type Collection = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gateway {
    Alipay,
    Wechat,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gateway::Alipay => "alipay",
            Gateway::Wechat => "wechat",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Destination {
    pub gateway: Gateway,
    pub mode: Mode,
}

/// What the caller gets back, and therefore whether HTTP happens at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    /// Decode and verify the response into a `Collection`.
    #[default]
    Collection,
    /// Hand back the raw response untouched.
    Response,
    /// Never dispatch; stages build the result locally.
    NoRequest,
}

impl Direction {
    pub fn should_request(&self) -> bool {
        !matches!(self, Direction::NoRequest)
    }
}

/// Operation target staged by business plugins for path-addressed gateways.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pub method: Method,
    /// Path relative to the gateway base URL, query included.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Endpoint {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }
}

#[derive(Debug)]
pub struct Rocket {
    destination: Destination,
    direction: Direction,
    params: Collection,
    payload: Collection,
    endpoint: Option<Endpoint>,
    radar: Option<Radar>,
    response: Option<HttpResponse>,
    decoded: Option<Value>,
    result: Option<Collection>,
}

impl Rocket {
    pub fn new(destination: Destination, params: Collection) -> Self {
        Self {
            destination,
            direction: Direction::default(),
            params,
            payload: Collection::new(),
            endpoint: None,
            radar: None,
            response: None,
            decoded: None,
            result: None,
        }
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn params(&self) -> &Collection {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Collection {
        &mut self.params
    }

    /// Params minus the `_`-prefixed SDK options.
    pub fn business_params(&self) -> Collection {
        self.params
            .iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn payload(&self) -> &Collection {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Collection {
        &mut self.payload
    }

    pub fn merge_payload(&mut self, extra: Collection) {
        self.payload.extend(extra);
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn endpoint_mut(&mut self) -> Option<&mut Endpoint> {
        self.endpoint.as_mut()
    }

    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoint = Some(endpoint);
    }

    pub fn radar(&self) -> Option<&Radar> {
        self.radar.as_ref()
    }

    /// The radar is built once; a second build is a chain-ordering defect.
    pub fn set_radar(&mut self, radar: Radar) -> PayResult<()> {
        if self.radar.is_some() {
            return Err(PayError::InvalidParams("radar already built".into()));
        }
        self.radar = Some(radar);
        Ok(())
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    pub fn set_response(&mut self, response: HttpResponse) {
        self.response = Some(response);
    }

    pub fn decoded(&self) -> Option<&Value> {
        self.decoded.as_ref()
    }

    pub fn set_decoded(&mut self, decoded: Value) {
        self.decoded = Some(decoded);
    }

    pub fn result(&self) -> Option<&Collection> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: Collection) {
        self.result = Some(result);
    }

    pub fn into_result(self) -> PayResult<Collection> {
        self.result.ok_or_else(|| PayError::InvalidResponse {
            msg: "pipeline finished without a result".into(),
            raw: self.response.map(|r| r.body).unwrap_or_default(),
        })
    }

    pub fn into_response(self) -> PayResult<HttpResponse> {
        self.response
            .ok_or_else(|| PayError::InvalidParams("no response was dispatched".into()))
    }
}
