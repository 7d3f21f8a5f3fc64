//! Name → business-plugin registry for `Wechat::call`.

use super::plugins::{
    ClosePlugin, InvokeKind, InvokePlugin, PrepayKind, PrepayPlugin, QueryPlugin,
    QueryRefundPlugin, RefundPlugin,
};
use crate::config::WechatConfig;
use crate::pipeline::Plugin;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ShortcutFn = fn(&Arc<WechatConfig>) -> Vec<Arc<dyn Plugin>>;

fn prepay(cfg: &Arc<WechatConfig>, kind: PrepayKind) -> Arc<dyn Plugin> {
    Arc::new(PrepayPlugin::new(cfg.clone(), kind))
}

fn mp(cfg: &Arc<WechatConfig>) -> Vec<Arc<dyn Plugin>> {
    vec![
        prepay(cfg, PrepayKind::Mp),
        Arc::new(InvokePlugin::new(cfg.clone(), InvokeKind::Jsapi)),
    ]
}

fn mini(cfg: &Arc<WechatConfig>) -> Vec<Arc<dyn Plugin>> {
    vec![
        prepay(cfg, PrepayKind::Mini),
        Arc::new(InvokePlugin::new(cfg.clone(), InvokeKind::Jsapi)),
    ]
}

fn app(cfg: &Arc<WechatConfig>) -> Vec<Arc<dyn Plugin>> {
    vec![
        prepay(cfg, PrepayKind::App),
        Arc::new(InvokePlugin::new(cfg.clone(), InvokeKind::App)),
    ]
}

fn h5(cfg: &Arc<WechatConfig>) -> Vec<Arc<dyn Plugin>> {
    vec![prepay(cfg, PrepayKind::H5)]
}

fn scan(cfg: &Arc<WechatConfig>) -> Vec<Arc<dyn Plugin>> {
    vec![prepay(cfg, PrepayKind::Native)]
}

fn query(cfg: &Arc<WechatConfig>) -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(QueryPlugin::new(cfg.clone()))]
}

fn close(cfg: &Arc<WechatConfig>) -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(ClosePlugin::new(cfg.clone()))]
}

fn refund(cfg: &Arc<WechatConfig>) -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(RefundPlugin::new(cfg.clone()))]
}

fn query_refund(cfg: &Arc<WechatConfig>) -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(QueryRefundPlugin::new(cfg.clone()))]
}

pub static SHORTCUTS: Lazy<BTreeMap<&'static str, ShortcutFn>> = Lazy::new(|| {
    let entries: [(&'static str, ShortcutFn); 9] = [
        ("mp", mp),
        ("mini", mini),
        ("app", app),
        ("h5", h5),
        ("scan", scan),
        ("query", query),
        ("close", close),
        ("refund", refund),
        ("query_refund", query_refund),
    ];
    BTreeMap::from(entries)
});
