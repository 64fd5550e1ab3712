//! Signed SOAP 1.2 envelope for the verification query.
//!
//! The `wsu:Timestamp` is the only signed part. Its canonical form is digested,
//! the digest goes into `SignedInfo`, and the canonical `SignedInfo` is signed
//! with HMAC-SHA1 under the STS proof key. The issued token travels next to the
//! signature in the security header so the service can resolve the key.

use crate::error::{KpsError, KpsResult};
use crate::models::QueryRequest;
use crate::protocol::{self, ValidityWindow};
use crate::signer;
use crate::sts::TokenArtifacts;
use crate::xml::{canonicalize, escape};

/// A complete request document plus the values it was signed with.
#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    xml: String,
    message_id: String,
    digest_value: String,
    signature_value: String,
}

impl SignedEnvelope {
    pub fn as_str(&self) -> &str {
        &self.xml
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn digest_value(&self) -> &str {
        &self.digest_value
    }

    pub fn signature_value(&self) -> &str {
        &self.signature_value
    }

    pub fn into_string(self) -> String {
        self.xml
    }
}

/// `Sorgula` body for the all-registries verification call. Blank month or day is sent as `0`.
pub fn build_query_body(request: &QueryRequest) -> String {
    let or_zero = |s: &str| {
        if s.trim().is_empty() {
            "0".to_string()
        } else {
            escape(s).into_owned()
        }
    };

    format!(
        concat!(
            r#"<Sorgula xmlns="{ns}" xmlns:i="{xsi}">"#,
            "<kriterListesi><TumKutukDogrulamaSorguKriteri>",
            "<Ad>{ad}</Ad>",
            "<DogumAy>{ay}</DogumAy>",
            "<DogumGun>{gun}</DogumGun>",
            "<DogumYil>{yil}</DogumYil>",
            "<KimlikNo>{kimlik}</KimlikNo>",
            "<Soyad>{soyad}</Soyad>",
            "</TumKutukDogrulamaSorguKriteri></kriterListesi></Sorgula>",
        ),
        ns = protocol::QUERY_BODY_NS,
        xsi = protocol::XSI_NS,
        ad = escape(&request.first_name),
        ay = or_zero(&request.birth_month),
        gun = or_zero(&request.birth_day),
        yil = escape(&request.birth_year),
        kimlik = escape(&request.national_id),
        soyad = escape(&request.last_name),
    )
}

fn timestamp_fragment(window: &ValidityWindow) -> String {
    format!(
        r#"<wsu:Timestamp xmlns:wsu="{wsu}" wsu:Id="{id}"><wsu:Created>{created}</wsu:Created><wsu:Expires>{expires}</wsu:Expires></wsu:Timestamp>"#,
        wsu = protocol::WSU_NS,
        id = protocol::TIMESTAMP_ID,
        created = window.created,
        expires = window.expires,
    )
}

fn signed_info_fragment(digest_value: &str) -> String {
    format!(
        concat!(
            r#"<dsig:SignedInfo xmlns:dsig="{dsig}">"#,
            r#"<dsig:CanonicalizationMethod Algorithm="{c14n}"/>"#,
            r#"<dsig:SignatureMethod Algorithm="{hmac}"/>"#,
            r##"<dsig:Reference URI="#{id}">"##,
            r#"<dsig:Transforms><dsig:Transform Algorithm="{c14n}"/></dsig:Transforms>"#,
            r#"<dsig:DigestMethod Algorithm="{sha1}"/>"#,
            "<dsig:DigestValue>{digest}</dsig:DigestValue>",
            "</dsig:Reference></dsig:SignedInfo>",
        ),
        dsig = protocol::DSIG_NS,
        c14n = protocol::EXC_C14N_ALGORITHM,
        hmac = protocol::HMAC_SHA1_ALGORITHM,
        id = protocol::TIMESTAMP_ID,
        sha1 = protocol::SHA1_DIGEST_ALGORITHM,
        digest = digest_value,
    )
}

fn signature_fragment(signed_info: &str, signature_value: &str, key_identifier: &str) -> String {
    format!(
        concat!(
            r#"<dsig:Signature xmlns:dsig="{dsig}">"#,
            "{signed_info}",
            "<dsig:SignatureValue>{value}</dsig:SignatureValue>",
            "<dsig:KeyInfo>",
            r#"<wsse:SecurityTokenReference xmlns:wsse="{wsse}">"#,
            r#"<wsse:KeyIdentifier ValueType="{value_type}">{key_id}</wsse:KeyIdentifier>"#,
            "</wsse:SecurityTokenReference>",
            "</dsig:KeyInfo>",
            "</dsig:Signature>",
        ),
        dsig = protocol::DSIG_NS,
        signed_info = signed_info,
        value = signature_value,
        wsse = protocol::WSSE_NS,
        value_type = protocol::SAML_ASSERTION_ID_VALUE_TYPE,
        key_id = escape(key_identifier),
    )
}

/// Sign `body` with the negotiated artifacts and wrap it in the SOAP envelope.
///
/// The artifacts are consumed: a token serves exactly one query.
pub fn build_signed_envelope(
    artifacts: TokenArtifacts,
    body: &str,
    query_url: &str,
    window: &ValidityWindow,
    message_id: &str,
) -> KpsResult<SignedEnvelope> {
    let timestamp = timestamp_fragment(window);
    let ts_canonical =
        canonicalize(&timestamp).map_err(|e| KpsError::signing("timestamp", e))?;
    let digest_value = signer::digest(&ts_canonical);

    let signed_info = signed_info_fragment(&digest_value);
    let si_canonical =
        canonicalize(&signed_info).map_err(|e| KpsError::signing("signed-info", e))?;
    let signature_value = signer::sign(&si_canonical, artifacts.secret_key())
        .map_err(|e| KpsError::signing("signature-value", e))?;

    let signature = signature_fragment(&signed_info, &signature_value, artifacts.key_identifier());

    let xml = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="{soap}">
  <s:Header>
    <a:MessageID xmlns:a="{wsa}">{message_id}</a:MessageID>
    <a:To xmlns:a="{wsa}" s:mustUnderstand="1">{to}</a:To>
    <a:Action xmlns:a="{wsa}" s:mustUnderstand="1">{action}</a:Action>
    <wsse:Security xmlns:wsse="{wsse}" xmlns:wsu="{wsu}" s:mustUnderstand="1">{timestamp}{token}{signature}</wsse:Security>
  </s:Header>
  <s:Body>{body}</s:Body>
</s:Envelope>"#,
        soap = protocol::SOAP12_NS,
        wsa = protocol::WSA_NS,
        message_id = escape(message_id),
        to = escape(query_url),
        action = protocol::QUERY_ACTION,
        wsse = protocol::WSSE_NS,
        wsu = protocol::WSU_NS,
        timestamp = timestamp,
        token = artifacts.token().as_str(),
        signature = signature,
        body = body,
    );

    Ok(SignedEnvelope {
        xml,
        message_id: message_id.to_string(),
        digest_value,
        signature_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sts::OpaqueToken;
    use crate::xml::XmlDocument;

    const TOKEN: &str = r#"<e:EncryptedData xmlns:e="http://www.w3.org/2001/04/xmlenc#"><e:CipherValue>QUJD</e:CipherValue></e:EncryptedData>"#;

    fn artifacts(key: &str) -> TokenArtifacts {
        TokenArtifacts::new(key, OpaqueToken::new(TOKEN), "_a<1>")
    }

    fn window() -> ValidityWindow {
        ValidityWindow {
            created: "2025-03-01T10:00:00Z".into(),
            expires: "2025-03-01T10:05:00Z".into(),
        }
    }

    fn slice<'a>(xml: &'a str, open: &str, close: &str) -> &'a str {
        let start = xml.find(open).expect("open tag");
        let end = xml[start..].find(close).expect("close tag") + start + close.len();
        &xml[start..end]
    }

    fn build(key: &str) -> KpsResult<SignedEnvelope> {
        let body = build_query_body(&QueryRequest::new("99999999999", "JOHN", "DOE", "1990"));
        build_signed_envelope(artifacts(key), &body, "https://q.example/svc", &window(), "urn:uuid:42")
    }

    #[test]
    fn body_fills_blank_date_parts_with_zero() {
        let body = build_query_body(
            &QueryRequest::new("1", "AYŞE & CO", "<X>", "1980").with_birth_day(" "),
        );
        assert!(body.contains("<Ad>AYŞE &amp; CO</Ad>"));
        assert!(body.contains("<DogumAy>0</DogumAy><DogumGun>0</DogumGun><DogumYil>1980</DogumYil>"));
        assert!(body.contains("<Soyad>&lt;X&gt;</Soyad>"));
    }

    #[test]
    fn embedded_values_recompute_from_embedded_fragments() {
        let env = build("c2VjcmV0").unwrap();
        let xml = env.as_str();

        let ts = slice(xml, "<wsu:Timestamp", "</wsu:Timestamp>");
        assert_eq!(signer::digest(&canonicalize(ts).unwrap()), env.digest_value());

        let si = slice(xml, "<dsig:SignedInfo", "</dsig:SignedInfo>");
        assert!(si.contains(&format!("<dsig:DigestValue>{}</dsig:DigestValue>", env.digest_value())));
        let sig = signer::sign(&canonicalize(si).unwrap(), "c2VjcmV0").unwrap();
        assert_eq!(sig, env.signature_value());
        assert!(xml.contains(&format!("<dsig:SignatureValue>{sig}</dsig:SignatureValue>")));
    }

    #[test]
    fn envelope_carries_token_and_addressing_headers() {
        let env = build("c2VjcmV0").unwrap();
        let xml = env.as_str();
        assert!(xml.contains(TOKEN));
        assert!(xml.contains(r#"s:mustUnderstand="1">https://q.example/svc</a:To>"#));
        assert!(xml.contains(protocol::QUERY_ACTION));
        assert!(xml.contains(">_a&lt;1&gt;</wsse:KeyIdentifier>"));
        assert_eq!(env.message_id(), "urn:uuid:42");

        let doc = XmlDocument::parse(xml).unwrap();
        assert_eq!(doc.find(&["Body", "Sorgula", "kriterListesi"]).count(), 1);
        let children: Vec<&str> = doc
            .find(&["Security"])
            .next()
            .unwrap()
            .child_elements()
            .map(|e| e.local_name())
            .collect();
        assert_eq!(children, ["Timestamp", "EncryptedData", "Signature"]);
    }

    #[test]
    fn signature_depends_on_key() {
        let a = build("c2VjcmV0").unwrap();
        let b = build("c2VjcmV1").unwrap();
        assert_eq!(a.digest_value(), b.digest_value());
        assert_ne!(a.signature_value(), b.signature_value());
    }

    #[test]
    fn bad_key_fails_at_signature_stage() {
        match build("***") {
            Err(KpsError::SigningFailed { stage, .. }) => assert_eq!(stage, "signature-value"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
