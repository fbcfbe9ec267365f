//! Key generation and response signing for tests.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use openssl::{
    asn1::Asn1Time,
    bn::BigNum,
    hash::MessageDigest,
    pkey::{PKey, Private, Public},
    rsa::Rsa,
    sign::Signer,
    x509::{X509Builder, X509NameBuilder},
};

use super::response::{ISSUE_FORMAT, encode_signature};

/// An RSA key pair standing in for the authentication server.
pub struct TestSigner {
    pub kid: String,
    private_key: PKey<Private>,
}

static TEST_SIGNER: Lazy<TestSigner> = Lazy::new(|| TestSigner::generate("2"));
static OTHER_SIGNER: Lazy<TestSigner> = Lazy::new(|| TestSigner::generate("901"));

/// Shared signer with kid `2`; generated once per test binary.
pub fn test_signer() -> &'static TestSigner {
    &TEST_SIGNER
}

/// A second, unrelated signer with kid `901`.
pub fn other_signer() -> &'static TestSigner {
    &OTHER_SIGNER
}

impl TestSigner {
    pub fn generate(kid: &str) -> Self {
        let rsa = Rsa::generate(2048).unwrap();
        Self {
            kid: kid.to_string(),
            private_key: PKey::from_rsa(rsa).unwrap(),
        }
    }

    /// RSA PKCS#1 v1.5 / SHA-1 signature over `payload`.
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut signer = Signer::new(MessageDigest::sha1(), &self.private_key).unwrap();
        signer.update(payload).unwrap();
        signer.sign_to_vec().unwrap()
    }

    pub fn public_key(&self) -> PKey<Public> {
        PKey::public_key_from_pem(self.public_key_pem().as_bytes()).unwrap()
    }

    pub fn public_key_pem(&self) -> String {
        String::from_utf8(self.private_key.public_key_to_pem().unwrap()).unwrap()
    }

    /// Self-signed certificate wrapping the public key, the form in which
    /// the server publishes its keys.
    pub fn certificate_pem(&self) -> String {
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "raven.test").unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap();
        builder
            .set_serial_number(&serial.to_asn1_integer().unwrap())
            .unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&self.private_key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder
            .sign(&self.private_key, MessageDigest::sha256())
            .unwrap();

        String::from_utf8(builder.build().to_pem().unwrap()).unwrap()
    }
}

/// Field values for a callback response, rendered and signed on demand.
#[derive(Debug, Clone)]
pub struct TestResponse {
    pub status: String,
    pub message: String,
    pub issued_at: DateTime<Utc>,
    pub id: String,
    pub url: String,
    pub principal: String,
    pub ptags: String,
    pub kid: Option<String>,
}

impl TestResponse {
    /// A successful response for `principal` returning to `url`, issued now.
    pub fn success(url: &str, principal: &str) -> Self {
        Self {
            status: "200".into(),
            message: String::new(),
            issued_at: Utc::now(),
            id: "1426431111-25612-5".into(),
            url: url.into(),
            principal: principal.into(),
            ptags: "current".into(),
            kid: None,
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.into();
        if status != "200" {
            self.principal = String::new();
        }
        self
    }

    pub fn issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = issued_at;
        self
    }

    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// The first twelve fields, as they are signed.
    pub fn payload(&self) -> String {
        format!(
            "3!{}!{}!{}!{}!{}!{}!{}!pwd!!36000!",
            self.status,
            self.message,
            self.issued_at.format(ISSUE_FORMAT),
            self.id,
            self.url,
            self.principal,
            self.ptags,
        )
    }

    /// Complete wire value signed by `signer`.
    pub fn signed_by(&self, signer: &TestSigner) -> String {
        let payload = self.payload();
        let signature = encode_signature(&signer.sign(payload.as_bytes()));
        let kid = self.kid.as_deref().unwrap_or(&signer.kid);
        format!("{}!{}!{}", payload, kid, signature)
    }
}
