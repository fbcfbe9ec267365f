//! Parsing of the `WLS-Response` callback value.
//!
//! The value is fourteen `!`-separated fields:
//!
//! ```text
//! ver!status!msg!issue!id!url!principal!ptags!auth!sso!life!params!kid!sig
//! ```
//!
//! The signature covers the first twelve fields exactly as received, so the
//! payload is captured before any field is decoded or converted. Parsing never
//! touches key material; see [`super::ResponseValidator`] for that.

use std::str::FromStr;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDateTime, Utc};

use super::ResponseError;

/// Field names in wire order.
pub const RESPONSE_FIELDS: [&str; 14] = [
    "ver",
    "status",
    "msg",
    "issue",
    "id",
    "url",
    "principal",
    "ptags",
    "auth",
    "sso",
    "life",
    "params",
    "kid",
    "sig",
];

/// Number of leading fields covered by the signature.
const SIGNED_FIELD_COUNT: usize = 12;

/// Format of the `issue` field, always UTC.
pub const ISSUE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// A parsed, not yet trusted, callback response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResponse {
    pub version: u32,
    pub status: u16,
    pub message: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub id: String,
    pub url: String,
    pub principal: Option<String>,
    pub ptags: Vec<String>,
    pub auth: Option<String>,
    pub sso: Vec<String>,
    pub life: Option<u64>,
    pub params: String,
    pub kid: String,
    pub signature: Vec<u8>,
    signed_payload: String,
}

impl AuthenticationResponse {
    /// Parse a raw callback value.
    pub fn parse(raw: &str) -> Result<Self, ResponseError> {
        let fields: Vec<&str> = raw.split('!').collect();
        if fields.len() != RESPONSE_FIELDS.len() {
            return Err(ResponseError::FieldCount {
                expected: RESPONSE_FIELDS.len(),
                actual: fields.len(),
            });
        }

        let signed_payload = fields[..SIGNED_FIELD_COUNT].join("!");

        Ok(Self {
            version: parse_number(fields[0], "ver")?,
            status: parse_status(fields[1])?,
            message: optional(fields[2]),
            issued_at: parse_issue(fields[3])?,
            id: unescape(fields[4]),
            url: unescape(fields[5]),
            principal: optional(fields[6]),
            ptags: list(fields[7]),
            auth: optional(fields[8]),
            sso: list(fields[9]),
            life: if fields[10].is_empty() {
                None
            } else {
                Some(parse_number(fields[10], "life")?)
            },
            params: unescape(fields[11]),
            kid: fields[12].to_string(),
            signature: decode_signature(fields[13])?,
            signed_payload,
        })
    }

    /// The exact bytes the signature was computed over.
    pub fn signed_payload(&self) -> &[u8] {
        self.signed_payload.as_bytes()
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

impl FromStr for AuthenticationResponse {
    type Err = ResponseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Undo the field escaping applied by the server: `%21` for `!`, `%25` for `%`.
fn unescape(value: &str) -> String {
    if !value.contains('%') {
        return value.to_string();
    }
    value.replace("%21", "!").replace("%25", "%")
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(unescape(value))
    }
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter(|item| !item.is_empty())
        .map(unescape)
        .collect()
}

fn parse_number<T: FromStr>(value: &str, field: &'static str) -> Result<T, ResponseError> {
    let malformed = || ResponseError::MalformedField {
        field,
        value: value.to_string(),
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    value.parse().map_err(|_| malformed())
}

fn parse_status(value: &str) -> Result<u16, ResponseError> {
    if value.len() != 3 {
        return Err(ResponseError::MalformedField {
            field: "status",
            value: value.to_string(),
        });
    }
    parse_number(value, "status")
}

fn parse_issue(value: &str) -> Result<DateTime<Utc>, ResponseError> {
    // chrono accepts signed and wider years for %Y; the wire format is fixed-width.
    if value.len() != 16 {
        return Err(ResponseError::MalformedTimestamp(value.to_string()));
    }
    NaiveDateTime::parse_from_str(value, ISSUE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ResponseError::MalformedTimestamp(value.to_string()))
}

/// Decode the URL-safe signature encoding (`-`, `.`, `_` for `+`, `/`, `=`).
///
/// Re-encoding the result must reproduce the input exactly, which rejects
/// non-canonical padding and stray characters.
fn decode_signature(value: &str) -> Result<Vec<u8>, ResponseError> {
    let normalized: String = value
        .chars()
        .map(|c| match c {
            '-' => '+',
            '.' => '/',
            '_' => '=',
            other => other,
        })
        .collect();

    let decoded = STANDARD
        .decode(&normalized)
        .map_err(|_| ResponseError::MalformedSignature)?;

    if STANDARD.encode(&decoded) != normalized {
        return Err(ResponseError::MalformedSignature);
    }

    Ok(decoded)
}

/// Encode a signature the way the server does. Inverse of the decoding above.
pub fn encode_signature(signature: &[u8]) -> String {
    STANDARD
        .encode(signature)
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '.',
            '=' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};
    use rstest::rstest;

    use super::*;

    const SIG: &str = "c2lnbmF0dXJl"; // "signature"

    fn raw_response(status: &str, issue: &str, principal: &str, sig: &str) -> String {
        format!(
            "3!{status}!!{issue}!1426431111-25612-5!http://localhost/page?x=1!{principal}!current!pwd!!36000!!2!{sig}"
        )
    }

    #[test]
    fn test_parse_success_response() {
        let raw = raw_response("200", "20150315T145151Z", "abc123", SIG);
        let response = AuthenticationResponse::parse(&raw).unwrap();

        assert_eq!(response.version, 3);
        assert_eq!(response.status, 200);
        assert_eq!(response.message, None);
        assert_eq!(response.issued_at.year(), 2015);
        assert_eq!(response.issued_at.hour(), 14);
        assert_eq!(response.id, "1426431111-25612-5");
        assert_eq!(response.url, "http://localhost/page?x=1");
        assert_eq!(response.principal.as_deref(), Some("abc123"));
        assert_eq!(response.ptags, vec!["current".to_string()]);
        assert_eq!(response.auth.as_deref(), Some("pwd"));
        assert!(response.sso.is_empty());
        assert_eq!(response.life, Some(36000));
        assert_eq!(response.kid, "2");
        assert_eq!(response.signature, b"signature");
        assert!(response.is_success());
    }

    #[test]
    fn test_signed_payload_is_prefix_before_kid() {
        let raw = raw_response("200", "20150315T145151Z", "abc123", SIG);
        let response = AuthenticationResponse::parse(&raw).unwrap();

        let kid_start = raw.rfind("!2!").unwrap();
        assert_eq!(response.signed_payload(), raw[..kid_start].as_bytes());
    }

    #[test]
    fn test_signed_payload_keeps_escaped_fields() {
        let raw = format!(
            "3!200!!20150315T145151Z!id%21%25!http://localhost/a%21b!abc123!!pwd!!!!2!{SIG}"
        );
        let response = AuthenticationResponse::parse(&raw).unwrap();

        assert_eq!(response.id, "id!%");
        assert_eq!(response.url, "http://localhost/a!b");
        assert!(
            std::str::from_utf8(response.signed_payload())
                .unwrap()
                .contains("id%21%25")
        );
    }

    #[rstest]
    #[case::empty("", 1)]
    #[case::too_few("3!200!!20150315T145151Z", 4)]
    #[case::too_many(
        "3!200!!20150315T145151Z!id!url!p!!pwd!!!!2!c2ln!extra",
        15
    )]
    fn test_wrong_field_count(#[case] raw: &str, #[case] actual: usize) {
        assert_eq!(
            AuthenticationResponse::parse(raw),
            Err(ResponseError::FieldCount {
                expected: 14,
                actual
            })
        );
    }

    #[rstest]
    #[case::date_only("20150315")]
    #[case::no_zulu("20150315T145151")]
    #[case::offset("20150315T145151+0100")]
    #[case::bad_month("20151315T145151Z")]
    #[case::signed_year("+2015031T145151Z")]
    fn test_malformed_timestamp(#[case] issue: &str) {
        let raw = raw_response("200", issue, "abc123", SIG);
        assert!(matches!(
            AuthenticationResponse::parse(&raw),
            Err(ResponseError::MalformedTimestamp(_))
        ));
    }

    #[rstest]
    #[case::word("ok")]
    #[case::two_digits("20")]
    #[case::signed("+20")]
    #[case::empty("")]
    fn test_malformed_status(#[case] status: &str) {
        let raw = raw_response(status, "20150315T145151Z", "abc123", SIG);
        assert!(matches!(
            AuthenticationResponse::parse(&raw),
            Err(ResponseError::MalformedField { field: "status", .. })
        ));
    }

    #[test]
    fn test_malformed_life() {
        let raw = format!("3!200!!20150315T145151Z!id!url!abc123!!pwd!!forever!!2!{SIG}");
        assert!(matches!(
            AuthenticationResponse::parse(&raw),
            Err(ResponseError::MalformedField { field: "life", .. })
        ));
    }

    #[test]
    fn test_cancel_response_without_principal() {
        let raw = raw_response("410", "20150315T145151Z", "", SIG);
        let response = AuthenticationResponse::parse(&raw).unwrap();
        assert_eq!(response.status, 410);
        assert_eq!(response.principal, None);
        assert!(!response.is_success());
    }

    #[rstest]
    #[case::bad_char("c2ln*mF0dXJl")]
    #[case::bad_padding("c2lnbmF0dXJlcw")]
    #[case::non_canonical_bits("c2lnbmF0dXJlcx__")]
    fn test_malformed_signature(#[case] sig: &str) {
        let raw = raw_response("200", "20150315T145151Z", "abc123", sig);
        assert_eq!(
            AuthenticationResponse::parse(&raw),
            Err(ResponseError::MalformedSignature)
        );
    }

    #[test]
    fn test_url_safe_signature_alphabet() {
        let bytes = [0xfbu8, 0xff, 0xfe, 0x01];
        let encoded = encode_signature(&bytes);
        assert!(!encoded.contains('+') && !encoded.contains('/') && !encoded.contains('='));

        let raw = raw_response("200", "20150315T145151Z", "abc123", &encoded);
        let response = AuthenticationResponse::parse(&raw).unwrap();
        assert_eq!(response.signature, bytes);
    }

    #[test]
    fn test_list_fields_split_on_commas() {
        let raw = format!(
            "3!200!!20150315T145151Z!id!url!abc123!current,staff!!pwd,x509!!!2!{SIG}"
        );
        let response = AuthenticationResponse::parse(&raw).unwrap();
        assert_eq!(response.ptags, vec!["current", "staff"]);
        assert_eq!(response.auth, None);
        assert_eq!(response.sso, vec!["pwd", "x509"]);
    }
}
