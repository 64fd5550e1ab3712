//! Token negotiation: WS-Trust 1.3 `Issue` against the STS with a username token.
//!
//! The STS answers with a symmetric proof key (`BinarySecret`), the SAML assertion
//! id that names it (`KeyIdentifier`), and the encrypted assertion itself inside
//! `RequestedSecurityToken`. The last one is forwarded to the query service
//! byte-for-byte, so it is captured from the raw response rather than re-serialized.

use crate::config::ClientConfig;
use crate::error::{KpsError, KpsResult};
use crate::protocol::{self, ValidityWindow};
use crate::transport::{Transport, SOAP12_CONTENT_TYPE};
use crate::xml::{escape, XmlDocument, XmlError};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fmt;

/// Markup copied verbatim from the STS response. Only ever embedded as-is; never
/// parse or re-serialize it.
#[derive(Clone, PartialEq, Eq)]
pub struct OpaqueToken(String);

impl OpaqueToken {
    pub fn new(markup: impl Into<String>) -> Self {
        Self(markup.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OpaqueToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueToken({} bytes)", self.0.len())
    }
}

/// Everything the envelope builder needs from one negotiation. Valid for a single query.
#[derive(Clone)]
pub struct TokenArtifacts {
    secret_key: String,
    token: OpaqueToken,
    key_identifier: String,
}

impl TokenArtifacts {
    pub fn new(
        secret_key: impl Into<String>,
        token: OpaqueToken,
        key_identifier: impl Into<String>,
    ) -> Self {
        Self {
            secret_key: secret_key.into(),
            token,
            key_identifier: key_identifier.into(),
        }
    }

    /// Base64 HMAC key.
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn token(&self) -> &OpaqueToken {
        &self.token
    }

    /// SAML assertion id used in the signature's `KeyIdentifier`.
    pub fn key_identifier(&self) -> &str {
        &self.key_identifier
    }
}

impl fmt::Debug for TokenArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenArtifacts")
            .field("secret_key", &"<redacted>")
            .field("token", &self.token)
            .field("key_identifier", &self.key_identifier)
            .finish()
    }
}

/// RequestSecurityToken envelope. `applies_to` is the service the token is issued for.
pub fn build_request(
    config: &ClientConfig,
    message_id: &str,
    window: &ValidityWindow,
) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="{soap}" xmlns:a="{wsa}" xmlns:wst="{wst}" xmlns:wsse="{wsse}" xmlns:wsu="{wsu}" xmlns:wsp="{wsp}">
  <s:Header>
    <a:MessageID>{message_id}</a:MessageID>
    <a:To>{to}</a:To>
    <a:Action>{action}</a:Action>
    <wsse:Security s:mustUnderstand="1">
      <wsu:Timestamp wsu:Id="{ts_id}">
        <wsu:Created>{created}</wsu:Created>
        <wsu:Expires>{expires}</wsu:Expires>
      </wsu:Timestamp>
      <wsse:UsernameToken wsu:Id="Me">
        <wsse:Username>{username}</wsse:Username>
        <wsse:Password Type="{password_type}">{password}</wsse:Password>
      </wsse:UsernameToken>
    </wsse:Security>
  </s:Header>
  <s:Body>
    <wst:RequestSecurityToken>
      <wst:TokenType>{token_type}</wst:TokenType>
      <wst:RequestType>{request_type}</wst:RequestType>
      <wsp:AppliesTo>
        <a:EndpointReference>
          <a:Address>{applies_to}</a:Address>
        </a:EndpointReference>
      </wsp:AppliesTo>
      <wst:KeyType>{key_type}</wst:KeyType>
    </wst:RequestSecurityToken>
  </s:Body>
</s:Envelope>"#,
        soap = protocol::SOAP12_NS,
        wsa = protocol::WSA_NS,
        wst = protocol::WST_NS,
        wsse = protocol::WSSE_NS,
        wsu = protocol::WSU_NS,
        wsp = protocol::WSP_NS,
        message_id = message_id,
        to = escape(&config.sts_url),
        action = protocol::RST_ISSUE_ACTION,
        ts_id = protocol::TIMESTAMP_ID,
        created = window.created,
        expires = window.expires,
        username = escape(&config.username),
        password_type = protocol::PASSWORD_TEXT_TYPE,
        password = escape(&config.password),
        token_type = protocol::SAML11_TOKEN_TYPE,
        request_type = protocol::ISSUE_REQUEST_TYPE,
        applies_to = escape(&config.query_url),
        key_type = protocol::SYMMETRIC_KEY_TYPE,
    )
}

/// Extract the three artifacts from an STS response.
///
/// `BinarySecret` and `KeyIdentifier` are matched by local name at any depth; when
/// several are present the last non-empty one wins.
pub fn parse_response(xml: &str) -> KpsResult<TokenArtifacts> {
    let unusable = |reason: String| KpsError::NegotiationParseError {
        reason,
        body: xml.to_string(),
    };

    let doc = XmlDocument::parse(xml).map_err(|e| unusable(e.to_string()))?;
    let last_text = |local: &str| {
        doc.elements_named(local)
            .map(|e| e.text().trim().to_string())
            .filter(|s| !s.is_empty())
            .last()
    };
    let secret = last_text("BinarySecret");
    let key_id = last_text("KeyIdentifier");
    let token = inner_markup(xml, "RequestedSecurityToken")
        .map_err(|e| unusable(e.to_string()))?
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match (secret, token, key_id) {
        (Some(secret), Some(token), Some(key_id)) => Ok(TokenArtifacts::new(
            secret,
            OpaqueToken::new(token),
            key_id,
        )),
        (secret, token, key_id) => {
            let missing: Vec<&str> = [
                ("BinarySecret", secret.is_none()),
                ("RequestedSecurityToken", token.is_none()),
                ("KeyIdentifier", key_id.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect();
            Err(unusable(format!("missing {}", missing.join(", "))))
        }
    }
}

/// Source bytes between the start and end tag of the first element named `local`.
fn inner_markup<'a>(xml: &'a str, local: &str) -> Result<Option<&'a str>, XmlError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if start.local_name().as_ref() == local.as_bytes() {
                    let end = start.to_end();
                    let span = reader.read_to_end(end.name())?;
                    return Ok(Some(&xml[span.start as usize..span.end as usize]));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Run the exchange. A non-200 status or an incomplete artifact set is fatal; nothing is retried.
pub async fn negotiate(transport: &dyn Transport, config: &ClientConfig) -> KpsResult<TokenArtifacts> {
    let message_id = protocol::message_id();
    let request = build_request(config, &message_id, &ValidityWindow::now());

    let reply = transport
        .post(&config.sts_url, SOAP12_CONTENT_TYPE, request)
        .await?;
    if !reply.is_ok() {
        tracing::warn!(target: "kps::sts", status = reply.status, "STS rejected token request");
        return Err(KpsError::NegotiationFailed {
            status: reply.status,
            body: reply.body,
        });
    }

    let artifacts = parse_response(&reply.body)?;
    tracing::debug!(
        target: "kps::sts",
        %message_id,
        key_identifier = artifacts.key_identifier(),
        "security token issued"
    );
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSTR: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Body>
    <trust:RequestSecurityTokenResponseCollection xmlns:trust="http://docs.oasis-open.org/ws-sx/ws-trust/200512">
      <trust:RequestSecurityTokenResponse>
        <trust:RequestedSecurityToken>
          <xenc:EncryptedData xmlns:xenc="http://www.w3.org/2001/04/xmlenc#" Type="http://www.w3.org/2001/04/xmlenc#Element"><xenc:CipherData><xenc:CipherValue>QUJD</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData>
        </trust:RequestedSecurityToken>
        <trust:RequestedAttachedReference>
          <o:SecurityTokenReference xmlns:o="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">
            <o:KeyIdentifier ValueType="http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.0#SAMLAssertionID">_assertion-42</o:KeyIdentifier>
          </o:SecurityTokenReference>
        </trust:RequestedAttachedReference>
        <trust:RequestedProofToken>
          <trust:BinarySecret> c2VjcmV0LWtleS1tYXRlcmlhbA== </trust:BinarySecret>
        </trust:RequestedProofToken>
      </trust:RequestSecurityTokenResponse>
    </trust:RequestSecurityTokenResponseCollection>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn extracts_all_three_artifacts() {
        let arts = parse_response(RSTR).unwrap();
        assert_eq!(arts.secret_key(), "c2VjcmV0LWtleS1tYXRlcmlhbA==");
        assert_eq!(arts.key_identifier(), "_assertion-42");
        assert_eq!(
            arts.token().as_str(),
            r#"<xenc:EncryptedData xmlns:xenc="http://www.w3.org/2001/04/xmlenc#" Type="http://www.w3.org/2001/04/xmlenc#Element"><xenc:CipherData><xenc:CipherValue>QUJD</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData>"#
        );
    }

    #[test]
    fn token_markup_is_not_reformatted() {
        let xml = r#"<r><RequestedSecurityToken><t a='x'><!-- kept --><u/></t></RequestedSecurityToken><KeyIdentifier>k</KeyIdentifier><BinarySecret>AQ==</BinarySecret></r>"#;
        let arts = parse_response(xml).unwrap();
        assert_eq!(arts.token().as_str(), "<t a='x'><!-- kept --><u/></t>");
    }

    #[test]
    fn missing_artifacts_are_reported_with_body() {
        let xml = "<r><KeyIdentifier>k</KeyIdentifier><BinarySecret>  </BinarySecret></r>";
        match parse_response(xml) {
            Err(KpsError::NegotiationParseError { reason, body }) => {
                assert!(reason.contains("BinarySecret"));
                assert!(reason.contains("RequestedSecurityToken"));
                assert!(!reason.contains("KeyIdentifier"));
                assert_eq!(body, xml);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unparsable_response_is_a_parse_error() {
        assert!(matches!(
            parse_response("<html><body>Service Unavailable"),
            Err(KpsError::NegotiationParseError { .. })
        ));
    }

    #[test]
    fn request_embeds_credentials_escaped_and_target_service() {
        let config = ClientConfig::new("user&co", "p<ss>")
            .with_query_url("https://query.example/svc");
        let window = ValidityWindow {
            created: "2025-01-01T00:00:00Z".into(),
            expires: "2025-01-01T00:05:00Z".into(),
        };
        let rst = build_request(&config, "urn:uuid:1", &window);
        assert!(rst.contains("<wsse:Username>user&amp;co</wsse:Username>"));
        assert!(rst.contains(">p&lt;ss&gt;</wsse:Password>"));
        assert!(rst.contains("<a:Address>https://query.example/svc</a:Address>"));
        assert!(rst.contains(protocol::SYMMETRIC_KEY_TYPE));
        assert!(rst.contains("<wsu:Created>2025-01-01T00:00:00Z</wsu:Created>"));
        XmlDocument::parse(&rst).expect("request must be well-formed");
    }
}
