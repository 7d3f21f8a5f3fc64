mod common;

use common::{key_pair, params, KeyPair, Recorder, StubHttp};
use reqwest::Method;
use rust_pay_rocket::alipay::plugins::ApiPlugin;
use rust_pay_rocket::canonical::{canonicalize, Canonical};
use rust_pay_rocket::crypto::{sign_base64, SignType};
use rust_pay_rocket::http::OfflineHttpClient;
use rust_pay_rocket::{
    Alipay, AlipayConfig, CallbackRequest, HttpResponse, Mode, Order, PayError, Plugin,
    Provider, ResponsePlugin,
};
use serde_json::{json, Value};
use std::sync::Arc;

struct Fixture {
    app: KeyPair,
    gateway: KeyPair,
}

impl Fixture {
    fn new() -> Self {
        Self {
            app: key_pair(),
            gateway: key_pair(),
        }
    }

    fn config(&self) -> AlipayConfig {
        AlipayConfig {
            app_id: "2016082000295641".into(),
            private_key: self.app.private.clone(),
            alipay_public_key: Some(self.gateway.public.clone()),
            notify_url: Some("https://pay.test/alipay/notify".into()),
            ..Default::default()
        }
    }

    fn provider(&self, http: Arc<StubHttp>) -> Alipay {
        Alipay::new(Arc::new(self.config()), Mode::Normal, http)
    }

    /// Gateway body whose signature covers the exact text of `sub`.
    fn signed_body(&self, key: &str, sub: &str) -> String {
        let sign = sign_base64(sub, &self.gateway.private, SignType::Rsa2).unwrap();
        format!(r#"{{"{key}":{sub},"sign":"{sign}"}}"#)
    }

    fn signed_notification(&self) -> serde_json::Map<String, Value> {
        let mut notification = params(json!({
            "gmt_create": "2021-05-13 20:36:32",
            "charset": "utf-8",
            "notify_type": "trade_status_sync",
            "out_trade_no": "2021completed001",
            "trade_status": "TRADE_SUCCESS",
            "total_amount": "0.01",
            "app_id": "2016082000295641",
            "sign_type": "RSA2"
        }));
        let content = canonicalize(&notification, Canonical::Verifying);
        let sign = sign_base64(&content, &self.gateway.private, SignType::Rsa2).unwrap();
        notification.insert("sign".into(), json!(sign));
        notification
    }
}

const QUERY_OK: &str = r#"{"code":"10000","msg":"Success","buyer_logon_id":"ghd***@sandbox.com","out_trade_no":"2021completed001","total_amount":"0.01","trade_no":"2021051322001495011000000000","trade_status":"TRADE_SUCCESS"}"#;

#[tokio::test]
async fn query_returns_the_verified_response_object() {
    let fx = Fixture::new();
    let http = StubHttp::new(vec![HttpResponse::new(
        200,
        fx.signed_body("alipay_trade_query_response", QUERY_OK),
    )]);
    let events = Recorder::default();
    let alipay = fx.provider(http.clone()).with_events(Arc::new(events.clone()));

    let trade = alipay
        .query(Order::from("2021completed001"))
        .await
        .unwrap();

    assert_eq!(trade["trade_status"], json!("TRADE_SUCCESS"));
    assert_eq!(trade["out_trade_no"], json!("2021completed001"));

    let sent = http.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, Method::POST);
    let body = sent[0].body.as_deref().unwrap();
    assert!(body.contains("method=alipay.trade.query"));
    assert!(body.contains("sign="));
    assert_eq!(
        events.event_types(),
        vec!["MethodCalled", "PayStarted", "ApiRequesting", "ApiRequested", "PayFinish"]
    );
}

#[tokio::test]
async fn response_plugin_returns_the_unverified_body() {
    let fx = Fixture::new();
    let body = r#"{"alipay_trade_query_response":{"code":"10000"},"sign":"not-checked"}"#;
    let http = StubHttp::new(vec![HttpResponse::new(200, body)]);
    let alipay = fx.provider(http.clone());

    let plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(ApiPlugin::new("alipay.trade.query")),
        Arc::new(ResponsePlugin),
    ];
    let rocket = alipay
        .pay(
            alipay.merge_common_plugins(plugins),
            params(json!({"out_trade_no": "2021completed001"})),
        )
        .await
        .unwrap();

    assert!(rocket.decoded().is_none());
    assert_eq!(rocket.into_response().unwrap().body, body);
    assert!(http.sent()[0].body.as_deref().unwrap().contains("sign="));
}

#[tokio::test]
async fn business_failure_carries_gateway_codes() {
    let fx = Fixture::new();
    let sub = r#"{"code":"40004","msg":"Business Failed","sub_code":"ACQ.TRADE_NOT_EXIST","sub_msg":"交易不存在"}"#;
    let http = StubHttp::new(vec![HttpResponse::new(
        200,
        fx.signed_body("alipay_trade_query_response", sub),
    )]);

    let err = fx
        .provider(http)
        .query(Order::from("missing-order"))
        .await
        .unwrap_err();

    assert!(err.is_business());
    match err {
        PayError::GatewayBusiness { code, sub_code, .. } => {
            assert_eq!(code, "40004");
            assert_eq!(sub_code.as_deref(), Some("ACQ.TRADE_NOT_EXIST"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn tampered_response_fails_verification() {
    let fx = Fixture::new();
    let body = fx
        .signed_body("alipay_trade_query_response", QUERY_OK)
        .replace(r#""total_amount":"0.01""#, r#""total_amount":"100.00""#);
    let http = StubHttp::new(vec![HttpResponse::new(200, body)]);

    let err = fx
        .provider(http)
        .query(Order::from("2021completed001"))
        .await
        .unwrap_err();
    assert!(err.is_sign_verification());
}

#[tokio::test]
async fn missing_public_key_fails_before_dispatch() {
    let fx = Fixture::new();
    let mut cfg = fx.config();
    cfg.alipay_public_key = None;
    let http = StubHttp::new(vec![]);
    let alipay = Alipay::new(Arc::new(cfg), Mode::Normal, http.clone());

    let err = alipay.query(Order::from("1")).await.unwrap_err();
    assert!(matches!(err, PayError::Configuration(_)));
    assert!(http.sent().is_empty());
}

#[tokio::test]
async fn callback_params_verify_and_come_back_whole() {
    let fx = Fixture::new();
    let notification = fx.signed_notification();
    let alipay = Alipay::new(Arc::new(fx.config()), Mode::Normal, Arc::new(OfflineHttpClient));

    let verified = alipay
        .callback(notification.clone().into(), None)
        .await
        .unwrap();
    assert_eq!(verified, notification);
}

#[tokio::test]
async fn callback_request_form_body_is_verified() {
    let fx = Fixture::new();
    let notification = fx.signed_notification();
    let form = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(
            notification
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str().unwrap_or_default())),
        )
        .finish();
    let request = CallbackRequest::new(Method::POST, "", form)
        .with_header("Content-Type", "application/x-www-form-urlencoded");
    let alipay = Alipay::new(Arc::new(fx.config()), Mode::Normal, Arc::new(OfflineHttpClient));

    let verified = alipay.callback(request.into(), None).await.unwrap();
    assert_eq!(verified["trade_status"], json!("TRADE_SUCCESS"));
    assert_eq!(verified["sign"], notification["sign"]);
}

#[tokio::test]
async fn callback_body_overrides_query_and_extra_overrides_both() {
    let fx = Fixture::new();
    let mut expected = params(json!({
        "out_trade_no": "2021completed001",
        "trade_status": "TRADE_SUCCESS",
        "notify_id": "from-body",
        "from": "extra"
    }));
    let content = canonicalize(&expected, Canonical::Verifying);
    let sign = sign_base64(&content, &fx.gateway.private, SignType::Rsa2).unwrap();
    expected.insert("sign".into(), json!(sign));

    let query = "out_trade_no=2021completed001&notify_id=from-query&from=query";
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("trade_status", "TRADE_SUCCESS")
        .append_pair("notify_id", "from-body")
        .append_pair("from", "body")
        .append_pair("sign", &sign)
        .finish();
    let request = CallbackRequest::new(Method::POST, query, body);
    let alipay = Alipay::new(Arc::new(fx.config()), Mode::Normal, Arc::new(OfflineHttpClient));

    let verified = alipay
        .callback(request.into(), Some(params(json!({"from": "extra"}))))
        .await
        .unwrap();
    assert_eq!(verified["notify_id"], json!("from-body"));
    assert_eq!(verified["from"], json!("extra"));
    assert_eq!(verified, expected);
}

#[tokio::test]
async fn tampered_callback_is_rejected() {
    let fx = Fixture::new();
    let mut notification = fx.signed_notification();
    notification.insert("total_amount".into(), json!("999.00"));
    let alipay = Alipay::new(Arc::new(fx.config()), Mode::Normal, Arc::new(OfflineHttpClient));

    let err = alipay.callback(notification.into(), None).await.unwrap_err();
    assert!(err.is_sign_verification());
}

#[tokio::test]
async fn app_pay_builds_order_string_without_network() {
    let fx = Fixture::new();
    let http = StubHttp::new(vec![]);
    let result = fx
        .provider(http.clone())
        .call(
            "app",
            params(json!({"out_trade_no": "A-1", "total_amount": "0.01", "subject": "测试"})),
        )
        .await
        .unwrap();

    let order_string = result["order_string"].as_str().unwrap();
    assert!(order_string.contains("method=alipay.trade.app.pay"));
    assert!(order_string.contains("QUICK_MSECURITY_PAY"));
    assert!(order_string.contains("&sign="));
    assert!(http.sent().is_empty());
}

#[tokio::test]
async fn web_pay_renders_a_form() {
    let fx = Fixture::new();
    let result = fx
        .provider(StubHttp::new(vec![]))
        .call("web", params(json!({"out_trade_no": "W-1", "total_amount": "1.00"})))
        .await
        .unwrap();

    let html = result["form_html"].as_str().unwrap();
    assert!(html.contains(r#"action="https://openapi.alipay.com/gateway.do?charset=utf-8""#));
    assert!(html.contains(r#"name="method" value="alipay.trade.page.pay""#));
}

#[tokio::test]
async fn unknown_shortcut_is_reported() {
    let fx = Fixture::new();
    let err = fx
        .provider(StubHttp::new(vec![]))
        .call("teleport", params(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, PayError::ShortcutNotFound(_)));
}

#[test]
fn success_acknowledgement_is_plain_text() {
    let fx = Fixture::new();
    let ack = fx.provider(StubHttp::new(vec![])).success();
    assert_eq!(ack.status, 200);
    assert_eq!(ack.body, "success");
}
