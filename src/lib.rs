//! Alipay and WeChat Pay v3 SDK built on a signed request/response plugin chain.
//!
//! ```no_run
//! use rust_pay_rocket::{Order, Pay, PayConfig, Provider};
//!
//! # async fn run(config: PayConfig) -> rust_pay_rocket::PayResult<()> {
//! let pay = Pay::new(config)?;
//! let trade = pay.alipay()?.query(Order::from("2021completed001")).await?;
//! println!("{}", trade["trade_status"]);
//! # Ok(())
//! # }
//! ```

pub mod alipay;
pub mod canonical;
pub mod client;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod events;
pub mod http;
pub mod pipeline;
pub mod provider;
pub mod rocket;
pub mod utils;
pub mod wechat;

pub use alipay::Alipay;
pub use client::Pay;
pub use config::{AlipayConfig, HttpOptions, Mode, PayConfig, WechatConfig};
pub use errors::{PayError, PayResult};
pub use events::{Event, EventDispatcher, EventKind, TracingDispatcher};
pub use http::{HttpClient, HttpResponse, Radar, ReqwestHttpClient};
pub use pipeline::{Next, ParserPlugin, Pipeline, Plugin, ResponsePlugin};
pub use provider::{CallbackInput, CallbackRequest, Order, Provider};
pub use rocket::{Collection, Direction, Rocket};
pub use wechat::Wechat;
