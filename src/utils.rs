use crate::errors::{PayError, PayResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose, DecodeError, Engine as _};
use gostd::strings;
use openssl::pkey::PKey;
use openssl::x509::X509;
use rand::Rng;
use std::fs;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::debug;
use x509_parser::pem::parse_x509_pem;

const NONCE_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub fn gen_nonce(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| NONCE_CHARS[rng.gen_range(0..NONCE_CHARS.len())] as char)
        .collect()
}

pub fn now_ts() -> String {
    OffsetDateTime::now_utc().unix_timestamp().to_string()
}

pub fn base64_encode<T>(input: T) -> String
where
    T: AsRef<[u8]>,
{
    general_purpose::STANDARD.encode(input)
}

pub fn base64_decode<T>(input: T) -> Result<Vec<u8>, DecodeError>
where
    T: AsRef<[u8]>,
{
    general_purpose::STANDARD.decode(input)
}

/// AEAD_AES_256_GCM, as used by WeChat Pay v3 notifications and certificates.
pub fn aes_gcm_decrypt(
    api_v3_key: &str,
    associated_data: &str,
    nonce: &str,
    ciphertext_b64: &str,
) -> anyhow::Result<String> {
    let key = api_v3_key.as_bytes();
    if key.len() != 32 {
        anyhow::bail!("api_v3_key must be 32 bytes");
    }
    if nonce.len() != 12 {
        anyhow::bail!("nonce must be 12 bytes, got {}", nonce.len());
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let nonce = Nonce::from_slice(nonce.as_bytes());
    let ciphertext = base64_decode(ciphertext_b64)?;
    let plain = cipher
        .decrypt(
            nonce,
            aes_gcm::aead::Payload {
                msg: &ciphertext,
                aad: associated_data.as_bytes(),
            },
        )
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(String::from_utf8(plain)?)
}

/// Caller-level retry with exponential backoff (200ms doubling, capped at 5s).
/// The pipeline itself never retries.
pub async fn retry_async<F, Fut, T, E>(mut attempts: usize, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    let mut delay = 200u64;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts = attempts.saturating_sub(1);
                if attempts == 0 {
                    return Err(e);
                }
                debug!(error = ?e, delay_ms = delay, "retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = std::cmp::min(delay * 2, 5000);
            }
        }
    }
}

pub fn extract_pubkey_from_cert(cert_pem: &str) -> anyhow::Result<String> {
    let cert = X509::from_pem(cert_pem.as_bytes())?;
    let pubkey: PKey<openssl::pkey::Public> = cert.public_key()?;
    let pub_pem = pubkey.public_key_to_pem()?;
    Ok(String::from_utf8(pub_pem)?)
}

fn cert_error(msg: impl Into<String>) -> PayError {
    PayError::Configuration(msg.into())
}

/// app_cert_sn / alipay_cert_sn of the certificate at `cert_path`.
pub fn get_cert_sn(cert_path: &str) -> PayResult<String> {
    debug!(cert_path, "computing cert sn");
    let cert_data = fs::read(cert_path)
        .map_err(|e| cert_error(format!("cannot read {cert_path}: {e}")))?;
    cert_sn_from_utf8(&cert_data)
}

/// md5(issuer + decimal serial). Issuers not starting with `CN` are reversed.
pub fn cert_sn_from_utf8(cert_content: &[u8]) -> PayResult<String> {
    let (_, pem) =
        parse_x509_pem(cert_content).map_err(|e| cert_error(format!("parse_x509_pem: {e}")))?;
    let x509 = pem
        .parse_x509()
        .map_err(|e| cert_error(format!("parse_x509: {e}")))?;
    let mut name = x509.tbs_certificate.issuer().to_string();
    if !strings::HasPrefix(&name, "CN") {
        let mut attributes = strings::Split(&name, ", ");
        attributes.reverse();
        name = strings::Join(attributes, ",");
    }
    let serial_number = x509.serial.to_str_radix(10);
    Ok(format!("{:x}", md5::compute(name + &serial_number)))
}

/// alipay_root_cert_sn of the chain at `root_cert_path`.
pub fn get_root_cert_sn(root_cert_path: &str) -> PayResult<String> {
    debug!(root_cert_path, "computing root cert sn");
    let certs_data = fs::read(root_cert_path)
        .map_err(|e| cert_error(format!("cannot read {root_cert_path}: {e}")))?;
    root_cert_sn_from_utf8(&certs_data)
}

/// Joins the SNs of every RSA certificate in the chain with `_`.
pub fn root_cert_sn_from_utf8(cert_contents: &[u8]) -> PayResult<String> {
    let cert_end = "-----END CERTIFICATE-----";
    let certs_str = String::from_utf8(cert_contents.to_vec())
        .map_err(|_| cert_error("root certificate is not utf-8"))?;
    let mut sns = Vec::new();
    for c in strings::Split(&certs_str, cert_end) {
        if !c.contains("-----BEGIN CERTIFICATE-----") {
            continue;
        }
        let cert_data = c.to_owned() + cert_end;
        let Ok((_, pem)) = parse_x509_pem(cert_data.as_bytes()) else {
            continue;
        };
        let Ok(x509) = pem.parse_x509() else {
            continue;
        };
        if !x509
            .signature_algorithm
            .algorithm
            .to_id_string()
            .starts_with("1.2.840.113549.1.1")
        {
            continue;
        }
        sns.push(cert_sn_from_utf8(cert_data.as_bytes())?);
    }

    if sns.is_empty() {
        return Err(cert_error("failed to get sn, please check your cert"));
    }
    Ok(sns.join("_"))
}
