//! Name → business-plugin registry for `Alipay::call`.

use super::plugins::{ApiPlugin, AppResponsePlugin, WapResponsePlugin, WebResponsePlugin};
use crate::pipeline::Plugin;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ShortcutFn = fn() -> Vec<Arc<dyn Plugin>>;

fn api(method: &'static str) -> Arc<dyn Plugin> {
    Arc::new(ApiPlugin::new(method))
}

fn web() -> Vec<Arc<dyn Plugin>> {
    const DEFAULTS: &[(&str, &str)] = &[("product_code", "FAST_INSTANT_TRADE_PAY")];
    vec![
        Arc::new(ApiPlugin::with_defaults("alipay.trade.page.pay", DEFAULTS)),
        Arc::new(WebResponsePlugin),
    ]
}

fn wap() -> Vec<Arc<dyn Plugin>> {
    const DEFAULTS: &[(&str, &str)] = &[("product_code", "QUICK_WAP_WAY")];
    vec![
        Arc::new(ApiPlugin::with_defaults("alipay.trade.wap.pay", DEFAULTS)),
        Arc::new(WapResponsePlugin),
    ]
}

fn app() -> Vec<Arc<dyn Plugin>> {
    const DEFAULTS: &[(&str, &str)] = &[("product_code", "QUICK_MSECURITY_PAY")];
    vec![
        Arc::new(ApiPlugin::with_defaults("alipay.trade.app.pay", DEFAULTS)),
        Arc::new(AppResponsePlugin),
    ]
}

fn pos() -> Vec<Arc<dyn Plugin>> {
    const DEFAULTS: &[(&str, &str)] = &[
        ("product_code", "FACE_TO_FACE_PAYMENT"),
        ("scene", "bar_code"),
    ];
    vec![Arc::new(ApiPlugin::with_defaults("alipay.trade.pay", DEFAULTS))]
}

fn scan() -> Vec<Arc<dyn Plugin>> {
    vec![api("alipay.trade.precreate")]
}

fn mini() -> Vec<Arc<dyn Plugin>> {
    const DEFAULTS: &[(&str, &str)] = &[("product_code", "JSAPI_PAY")];
    vec![Arc::new(ApiPlugin::with_defaults("alipay.trade.create", DEFAULTS))]
}

fn transfer() -> Vec<Arc<dyn Plugin>> {
    const DEFAULTS: &[(&str, &str)] = &[
        ("biz_scene", "DIRECT_TRANSFER"),
        ("product_code", "TRANS_ACCOUNT_NO_PWD"),
    ];
    vec![Arc::new(ApiPlugin::with_defaults(
        "alipay.fund.trans.uni.transfer",
        DEFAULTS,
    ))]
}

fn query() -> Vec<Arc<dyn Plugin>> {
    vec![api("alipay.trade.query")]
}

fn cancel() -> Vec<Arc<dyn Plugin>> {
    vec![api("alipay.trade.cancel")]
}

fn close() -> Vec<Arc<dyn Plugin>> {
    vec![api("alipay.trade.close")]
}

fn refund() -> Vec<Arc<dyn Plugin>> {
    vec![api("alipay.trade.refund")]
}

fn query_refund() -> Vec<Arc<dyn Plugin>> {
    vec![api("alipay.trade.fastpay.refund.query")]
}

pub static SHORTCUTS: Lazy<BTreeMap<&'static str, ShortcutFn>> = Lazy::new(|| {
    let entries: [(&'static str, ShortcutFn); 12] = [
        ("web", web),
        ("wap", wap),
        ("app", app),
        ("pos", pos),
        ("scan", scan),
        ("mini", mini),
        ("transfer", transfer),
        ("query", query),
        ("cancel", cancel),
        ("close", close),
        ("refund", refund),
        ("query_refund", query_refund),
    ];
    BTreeMap::from(entries)
});
