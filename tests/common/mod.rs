#![allow(dead_code)]

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509NameBuilder};
use rust_pay_rocket::crypto::{sign_base64, SignType};
use rust_pay_rocket::utils::base64_encode;
use rust_pay_rocket::{
    Collection, Event, EventDispatcher, HttpClient, HttpResponse, PayError, PayResult, Radar,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub struct KeyPair {
    pub private: String,
    pub public: String,
}

pub fn key_pair() -> KeyPair {
    let rsa = Rsa::generate(2048).unwrap();
    let private = String::from_utf8(rsa.private_key_to_pem().unwrap()).unwrap();
    let public =
        String::from_utf8(PKey::from_rsa(rsa).unwrap().public_key_to_pem().unwrap()).unwrap();
    KeyPair { private, public }
}

/// Self-signed certificate PEM plus the public key PEM inside it.
pub fn self_signed_cert() -> (String, String) {
    let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "Tenpay.com Root CA").unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&pkey).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.sign(&pkey, MessageDigest::sha256()).unwrap();

    let cert = String::from_utf8(builder.build().to_pem().unwrap()).unwrap();
    let public = String::from_utf8(pkey.public_key_to_pem().unwrap()).unwrap();
    (cert, public)
}

pub fn params(value: Value) -> Collection {
    value.as_object().cloned().unwrap()
}

/// Replays canned responses in order and records every radar it was handed.
#[derive(Default)]
pub struct StubHttp {
    responses: Mutex<VecDeque<HttpResponse>>,
    sent: Mutex<Vec<Radar>>,
}

impl StubHttp {
    pub fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            sent: Mutex::default(),
        })
    }

    pub fn sent(&self) -> Vec<Radar> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for StubHttp {
    async fn send(&self, radar: &Radar) -> PayResult<HttpResponse> {
        self.sent.lock().unwrap().push(radar.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PayError::Transport("stub has no more responses".into()))
    }
}

/// Keeps every published event.
#[derive(Default, Clone)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(Event::event_type).collect()
    }
}

impl EventDispatcher for Recorder {
    fn publish(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

/// AEAD_AES_256_GCM resource as WeChat Pay sends it.
pub fn encrypt_resource(api_v3_key: &str, plain: &str) -> Value {
    let (nonce, aad) = ("fdasflkja484", "transaction");
    let cipher = Aes256Gcm::new_from_slice(api_v3_key.as_bytes()).unwrap();
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: plain.as_bytes(),
                aad: aad.as_bytes(),
            },
        )
        .unwrap();
    serde_json::json!({
        "algorithm": "AEAD_AES_256_GCM",
        "ciphertext": base64_encode(ciphertext),
        "associated_data": aad,
        "nonce": nonce,
    })
}

/// Response or notification signed the way the WeChat platform signs it.
pub fn wechat_signed(status: u16, body: &str, serial: &str, platform_private: &str) -> HttpResponse {
    let (timestamp, nonce) = ("1554208460", "c5ac7061fccab6bf3e254dcf98995b8c");
    let message = format!("{timestamp}\n{nonce}\n{body}\n");
    let signature = sign_base64(&message, platform_private, SignType::Rsa2).unwrap();
    HttpResponse::new(status, body)
        .with_header("Wechatpay-Timestamp", timestamp)
        .with_header("Wechatpay-Nonce", nonce)
        .with_header("Wechatpay-Serial", serial)
        .with_header("Wechatpay-Signature", signature)
}
