mod common;

use common::{encrypt_resource, key_pair, params, self_signed_cert, wechat_signed, KeyPair, StubHttp};
use reqwest::Method;
use rust_pay_rocket::crypto::{verify_base64, SignType};
use rust_pay_rocket::http::OfflineHttpClient;
use rust_pay_rocket::{
    CallbackRequest, HttpResponse, Mode, Order, PayError, Provider, Wechat, WechatConfig,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

const API_V3_KEY: &str = "a7cde1ZJB1kG2e7VfTs3jQzaWizur8Gb";
const PLATFORM_SERIAL: &str = "5157F09EFDC096DE15EBE81A47057A7232F1B8E1";

struct Fixture {
    merchant: KeyPair,
    platform: KeyPair,
}

impl Fixture {
    fn new() -> Self {
        Self {
            merchant: key_pair(),
            platform: key_pair(),
        }
    }

    fn config(&self) -> WechatConfig {
        WechatConfig {
            mchid: "1600314069".into(),
            serial_no: "25F8AA5452F55B4D2E4E8DEA8E6CAE8DB8B4E4E4".into(),
            private_key: self.merchant.private.clone(),
            api_v3_key: API_V3_KEY.into(),
            platform_certs: BTreeMap::from([(
                PLATFORM_SERIAL.to_string(),
                self.platform.public.clone(),
            )]),
            notify_url: Some("https://pay.test/wechat/notify".into()),
            appid_mp: Some("wx55955316af4ef13".into()),
            appid_app: Some("wx_app_0001".into()),
            ..Default::default()
        }
    }

    fn provider(&self, http: Arc<StubHttp>) -> Wechat {
        Wechat::new(Arc::new(self.config()), Mode::Normal, http)
    }

    fn signed(&self, status: u16, body: &str) -> HttpResponse {
        wechat_signed(status, body, PLATFORM_SERIAL, &self.platform.private)
    }
}

#[tokio::test]
async fn query_sends_signed_get_and_verifies_response() {
    let fx = Fixture::new();
    let body = r#"{"appid":"wx55955316af4ef13","mchid":"1600314069","out_trade_no":"T-100","trade_state":"SUCCESS","amount":{"total":1}}"#;
    let http = StubHttp::new(vec![fx.signed(200, body)]);

    let trade = fx
        .provider(http.clone())
        .query(Order::from("T-100"))
        .await
        .unwrap();
    assert_eq!(trade["trade_state"], json!("SUCCESS"));

    let sent = http.sent();
    assert_eq!(sent[0].method, Method::GET);
    assert_eq!(
        sent[0].url,
        "https://api.mch.weixin.qq.com/v3/pay/transactions/out-trade-no/T-100?mchid=1600314069"
    );
    let auth = sent[0].header_value("Authorization").unwrap();
    assert!(auth.starts_with("WECHATPAY2-SHA256-RSA2048 mchid=\"1600314069\""));
    assert!(sent[0].body.is_none());
}

#[tokio::test]
async fn forged_response_signature_is_rejected() {
    let fx = Fixture::new();
    let forger = key_pair();
    let response = wechat_signed(
        200,
        r#"{"trade_state":"SUCCESS"}"#,
        PLATFORM_SERIAL,
        &forger.private,
    );
    let err = fx
        .provider(StubHttp::new(vec![response]))
        .query(Order::from("T-100"))
        .await
        .unwrap_err();
    assert!(err.is_sign_verification());
}

#[tokio::test]
async fn error_status_becomes_business_error() {
    let fx = Fixture::new();
    let response = HttpResponse::new(400, r#"{"code":"PARAM_ERROR","message":"参数错误"}"#);
    let err = fx
        .provider(StubHttp::new(vec![response]))
        .close(Order::from("T-100"))
        .await
        .unwrap_err();
    match err {
        PayError::GatewayBusiness { code, msg, .. } => {
            assert_eq!(code, "PARAM_ERROR");
            assert_eq!(msg, "参数错误");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn unknown_platform_serial_without_fallback_is_configuration() {
    let fx = Fixture::new();
    let response = wechat_signed(200, "{}", "UNKNOWN", &fx.platform.private);
    let err = fx
        .provider(StubHttp::new(vec![response]))
        .query(Order::from("T-100"))
        .await
        .unwrap_err();
    assert!(matches!(err, PayError::Configuration(_)));
}

#[tokio::test]
async fn mp_returns_jsapi_invoke_parameters() {
    let fx = Fixture::new();
    let http = StubHttp::new(vec![fx.signed(
        200,
        r#"{"prepay_id":"wx201410272009395522657a690389285100"}"#,
    )]);
    let invoke = fx
        .provider(http.clone())
        .call(
            "mp",
            params(json!({
                "out_trade_no": "MP-1",
                "description": "subject",
                "amount": {"total": 1},
                "payer": {"openid": "o4GgauInH_RCEdvrrNGrntXDu6D4"}
            })),
        )
        .await
        .unwrap();

    assert_eq!(invoke["appId"], json!("wx55955316af4ef13"));
    assert_eq!(invoke["package"], json!("prepay_id=wx201410272009395522657a690389285100"));
    assert_eq!(invoke["signType"], json!("RSA"));
    let message = format!(
        "{}\n{}\n{}\n{}\n",
        invoke["appId"].as_str().unwrap(),
        invoke["timeStamp"].as_str().unwrap(),
        invoke["nonceStr"].as_str().unwrap(),
        invoke["package"].as_str().unwrap()
    );
    assert!(verify_base64(
        &message,
        invoke["paySign"].as_str().unwrap(),
        &fx.merchant.public,
        SignType::Rsa2
    )
    .unwrap());

    let body: serde_json::Value =
        serde_json::from_str(http.sent()[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(body["notify_url"], json!("https://pay.test/wechat/notify"));
}

#[tokio::test]
async fn app_returns_sdk_parameters() {
    let fx = Fixture::new();
    let http = StubHttp::new(vec![fx.signed(200, r#"{"prepay_id":"wx_app_prepay"}"#)]);
    let invoke = fx
        .provider(http)
        .call("app", params(json!({"out_trade_no": "APP-1", "amount": {"total": 1}})))
        .await
        .unwrap();
    assert_eq!(invoke["appid"], json!("wx_app_0001"));
    assert_eq!(invoke["partnerid"], json!("1600314069"));
    assert_eq!(invoke["prepayid"], json!("wx_app_prepay"));
    assert_eq!(invoke["package"], json!("Sign=WXPay"));
}

fn notification(fx: &Fixture) -> (CallbackRequest, serde_json::Value) {
    let transaction = json!({"out_trade_no": "MP-1", "trade_state": "SUCCESS", "transaction_id": "4200000985202103031441826014"});
    let body = json!({
        "id": "EV-2018022511223320873",
        "event_type": "TRANSACTION.SUCCESS",
        "resource_type": "encrypt-resource",
        "resource": encrypt_resource(API_V3_KEY, &transaction.to_string()),
    })
    .to_string();
    let signed = fx.signed(200, &body);
    let mut request = CallbackRequest::new(Method::POST, "", body);
    for (name, value) in signed.headers {
        request = request.with_header(&name, value);
    }
    (request, transaction)
}

#[tokio::test]
async fn callback_verifies_and_decrypts_resource() {
    let fx = Fixture::new();
    let (request, transaction) = notification(&fx);
    let wechat = Wechat::new(Arc::new(fx.config()), Mode::Normal, Arc::new(OfflineHttpClient));

    let result = wechat.callback(request.into(), None).await.unwrap();
    assert_eq!(result["event_type"], json!("TRANSACTION.SUCCESS"));
    assert_eq!(result["resource"], transaction);
}

#[tokio::test]
async fn callback_with_altered_body_is_rejected() {
    let fx = Fixture::new();
    let (mut request, _) = notification(&fx);
    request.body = request.body.replace("TRANSACTION.SUCCESS", "REFUND.SUCCESS");
    let wechat = Wechat::new(Arc::new(fx.config()), Mode::Normal, Arc::new(OfflineHttpClient));

    let err = wechat.callback(request.into(), None).await.unwrap_err();
    assert!(err.is_sign_verification());
}

#[tokio::test]
async fn callback_needs_the_raw_request() {
    let fx = Fixture::new();
    let err = fx
        .provider(StubHttp::new(vec![]))
        .callback(params(json!({"id": "EV-1"})).into(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PayError::InvalidParams(_)));
}

#[tokio::test]
async fn callback_rejects_extra_params() {
    let fx = Fixture::new();
    let (request, _) = notification(&fx);
    let wechat = Wechat::new(Arc::new(fx.config()), Mode::Normal, Arc::new(OfflineHttpClient));

    let err = wechat
        .callback(request.clone().into(), Some(params(json!({"k": "v"}))))
        .await
        .unwrap_err();
    assert!(matches!(err, PayError::InvalidParams(_)));

    let decrypted = wechat
        .callback(request.into(), Some(params(json!({}))))
        .await
        .unwrap();
    assert_eq!(decrypted["event_type"], json!("TRANSACTION.SUCCESS"));
}

#[tokio::test]
async fn cancel_is_unsupported() {
    let fx = Fixture::new();
    let http = StubHttp::new(vec![]);
    let err = fx
        .provider(http.clone())
        .cancel(Order::from("T-100"))
        .await
        .unwrap_err();
    assert!(matches!(err, PayError::InvalidParams(_)));
    assert!(http.sent().is_empty());
}

#[tokio::test]
async fn refresh_platform_certs_caches_downloaded_keys() {
    let fx = Fixture::new();
    let (cert_pem, cert_public) = self_signed_cert();
    let body = json!({
        "data": [{
            "serial_no": "NEW-SERIAL-01",
            "effective_time": "2024-01-01T00:00:00+08:00",
            "expire_time": "2029-01-01T00:00:00+08:00",
            "encrypt_certificate": encrypt_resource(API_V3_KEY, &cert_pem),
        }]
    })
    .to_string();
    let http = StubHttp::new(vec![HttpResponse::new(200, body)]);
    let wechat = fx.provider(http.clone());

    let serials = wechat.refresh_platform_certs().await.unwrap();
    assert_eq!(serials, vec!["NEW-SERIAL-01".to_string()]);
    assert_eq!(
        wechat.certs().get_by_serial("NEW-SERIAL-01").as_deref(),
        Some(cert_public.as_str())
    );
    assert!(http.sent()[0].url.ends_with("/v3/certificates"));
}

#[test]
fn success_acknowledgement_is_json() {
    let fx = Fixture::new();
    let ack = fx.provider(StubHttp::new(vec![])).success();
    assert_eq!(ack.status, 200);
    assert_eq!(ack.header("content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_str(&ack.body).unwrap();
    assert_eq!(body, json!({"code": "SUCCESS", "message": "成功"}));
}
