//! RSA sign / verify and key normalization.
//!
//! Keys are accepted as a file path, PEM text or a raw base64 body and are
//! normalized on every call.

use crate::errors::{PayError, PayResult};
use crate::utils::{base64_decode, base64_encode};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::sign::{Signer, Verifier};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SignType {
    /// SHA256withRSA
    #[default]
    Rsa2,
    /// SHA1withRSA
    Rsa,
}

impl SignType {
    pub fn parse(s: &str) -> PayResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RSA2" | "" => Ok(SignType::Rsa2),
            "RSA" => Ok(SignType::Rsa),
            other => Err(PayError::Configuration(format!(
                "unsupported sign_type: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignType::Rsa2 => "RSA2",
            SignType::Rsa => "RSA",
        }
    }

    fn digest(&self) -> MessageDigest {
        match self {
            SignType::Rsa2 => MessageDigest::sha256(),
            SignType::Rsa => MessageDigest::sha1(),
        }
    }
}

const PRIVATE_LABELS: [&str; 2] = ["RSA PRIVATE KEY", "PRIVATE KEY"];
const PUBLIC_LABEL: &str = "PUBLIC KEY";

fn is_file_reference(source: &str) -> bool {
    source.ends_with(".pem") || source.ends_with(".crt") || Path::new(source).is_file()
}

/// Resolve a key source to its text: file contents for paths, the input otherwise.
fn read_key_source(source: &str) -> PayResult<String> {
    if is_file_reference(source) {
        debug!(path = source, "loading key file");
        return fs::read_to_string(source).map_err(|e| {
            PayError::Configuration(format!("cannot read key file {source}: {e}"))
        });
    }
    Ok(source.to_string())
}

/// Wrap a raw base64 key body in PEM armor, 64 columns per line.
pub fn wrap_key(raw: &str, label: &str) -> String {
    let body: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let mut key = String::with_capacity(body.len() + 2 * label.len() + 40);
    key.push_str("-----BEGIN ");
    key.push_str(label);
    key.push_str("-----\n");
    for line in body.as_bytes().chunks(64) {
        // chunks of an ASCII-filtered base64 body are always valid utf-8
        key.push_str(&String::from_utf8_lossy(line));
        key.push('\n');
    }
    key.push_str("-----END ");
    key.push_str(label);
    key.push_str("-----");
    key
}

pub fn load_private_key(source: &str) -> PayResult<PKey<Private>> {
    if source.trim().is_empty() {
        return Err(PayError::Configuration("missing private key".into()));
    }
    let text = read_key_source(source)?;
    if text.contains("-----BEGIN") {
        return PKey::private_key_from_pem(text.as_bytes())
            .map_err(|e| PayError::Configuration(format!("invalid private key: {e}")));
    }
    // raw bodies are PKCS#1 more often than not, but PKCS#8 is common too
    for label in PRIVATE_LABELS {
        if let Ok(key) = PKey::private_key_from_pem(wrap_key(&text, label).as_bytes()) {
            return Ok(key);
        }
    }
    Err(PayError::Configuration("invalid private key material".into()))
}

pub fn load_public_key(source: &str) -> PayResult<PKey<Public>> {
    if source.trim().is_empty() {
        return Err(PayError::Configuration("missing public key".into()));
    }
    let text = read_key_source(source)?;
    if text.contains("-----BEGIN CERTIFICATE") {
        let cert = openssl::x509::X509::from_pem(text.as_bytes())
            .map_err(|e| PayError::Configuration(format!("invalid certificate: {e}")))?;
        return cert
            .public_key()
            .map_err(|e| PayError::Configuration(format!("invalid certificate key: {e}")));
    }
    let pem = if text.contains("-----BEGIN") {
        text
    } else {
        wrap_key(&text, PUBLIC_LABEL)
    };
    PKey::public_key_from_pem(pem.as_bytes())
        .map_err(|e| PayError::Configuration(format!("invalid public key: {e}")))
}

pub fn sign(content: &[u8], private_key: &str, sign_type: SignType) -> PayResult<Vec<u8>> {
    let pkey = load_private_key(private_key)?;
    let mut signer = Signer::new(sign_type.digest(), &pkey)?;
    signer.update(content)?;
    Ok(signer.sign_to_vec()?)
}

pub fn sign_base64(content: &str, private_key: &str, sign_type: SignType) -> PayResult<String> {
    sign(content.as_bytes(), private_key, sign_type).map(base64_encode)
}

/// `Ok(false)` for any signature that does not check out; `Err` only for key problems.
pub fn verify(
    content: &[u8],
    signature: &[u8],
    public_key: &str,
    sign_type: SignType,
) -> PayResult<bool> {
    let pkey = load_public_key(public_key)?;
    let Ok(mut verifier) = Verifier::new(sign_type.digest(), &pkey) else {
        return Ok(false);
    };
    if verifier.update(content).is_err() {
        return Ok(false);
    }
    Ok(verifier.verify(signature).unwrap_or(false))
}

pub fn verify_base64(
    content: &str,
    signature_base64: &str,
    public_key: &str,
    sign_type: SignType,
) -> PayResult<bool> {
    if public_key.trim().is_empty() {
        return Err(PayError::Configuration("missing public key".into()));
    }
    match base64_decode(signature_base64.trim()) {
        Ok(sig) => verify(content.as_bytes(), &sig, public_key, sign_type),
        Err(_) => Ok(false),
    }
}
