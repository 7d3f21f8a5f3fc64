//! Sandbox walkthrough. Reads credentials from `ALIPAY_*` / `WECHAT_*`
//! environment variables; gateways without credentials are skipped.
//!
//! RUST_LOG=debug cargo run --example usage

use rust_pay_rocket::{AlipayConfig, Mode, Order, Pay, PayConfig, Provider, WechatConfig};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = PayConfig {
        mode: Mode::Sandbox,
        alipay: AlipayConfig::from_env().ok().map(Arc::new),
        wechat: WechatConfig::from_env().ok().map(Arc::new),
        ..Default::default()
    };
    let pay = Pay::new(config)?;

    if let Ok(alipay) = pay.alipay() {
        let page = alipay
            .call(
                "web",
                json!({"out_trade_no": "demo-web-001", "total_amount": "0.01", "subject": "demo"})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            )
            .await?;
        println!("alipay form: {}", page["form_html"]);

        match alipay.query(Order::from("demo-web-001")).await {
            Ok(trade) => println!("alipay trade: {trade:?}"),
            Err(e) if e.is_business() => println!("alipay business error: {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    if let Ok(wechat) = pay.wechat() {
        if let Err(e) = wechat.refresh_platform_certs().await {
            println!("wechat certs not refreshed: {e}");
        }
        let trade = wechat.query(Order::from("demo-mp-001")).await;
        println!("wechat trade: {trade:?}");
    }

    Ok(())
}
