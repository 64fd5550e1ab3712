//! Namespace and algorithm URIs, actions, and the WS-Security validity window.

use chrono::{DateTime, Duration, Utc};

pub const SOAP12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const WSA_NS: &str = "http://www.w3.org/2005/08/addressing";
pub const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WST_NS: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512";
pub const WSP_NS: &str = "http://schemas.xmlsoap.org/ws/2004/09/policy";
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

pub const EXC_C14N_ALGORITHM: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const HMAC_SHA1_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#hmac-sha1";
pub const SHA1_DIGEST_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#sha1";

pub const RST_ISSUE_ACTION: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/RST/Issue";
pub const ISSUE_REQUEST_TYPE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Issue";
pub const SYMMETRIC_KEY_TYPE: &str =
    "http://docs.oasis-open.org/ws-sx/ws-trust/200512/SymmetricKey";
pub const SAML11_TOKEN_TYPE: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV1.1";
pub const SAML_ASSERTION_ID_VALUE_TYPE: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.0#SAMLAssertionID";
pub const PASSWORD_TEXT_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";

pub const QUERY_BODY_NS: &str = "http://kps.nvi.gov.tr/2025/08/01";
pub const QUERY_ACTION: &str = "http://kps.nvi.gov.tr/2025/08/01/TumKutukDogrulaServis/Sorgula";

/// Id of the signed `wsu:Timestamp` in the query envelope.
pub const TIMESTAMP_ID: &str = "_0";

const VALIDITY_MINUTES: i64 = 5;

/// `Created`/`Expires` pair, UTC, second precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityWindow {
    pub created: String,
    pub expires: String,
}

impl ValidityWindow {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            created: format_instant(now),
            expires: format_instant(now + Duration::minutes(VALIDITY_MINUTES)),
        }
    }

    pub fn now() -> Self {
        Self::starting_at(Utc::now())
    }
}

fn format_instant(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Fresh WS-Addressing message id.
pub fn message_id() -> String {
    format!("urn:uuid:{}", uuid::Uuid::new_v4())
}
