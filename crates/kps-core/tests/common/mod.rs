//! Canned STS and service responses shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use kps_core::{HttpReply, KpsError, KpsResult, Transport};
use std::collections::HashMap;
use std::sync::Mutex;

/// Base64 of "secret-key-material".
pub const SECRET_KEY: &str = "c2VjcmV0LWtleS1tYXRlcmlhbA==";
pub const ASSERTION_ID: &str = "_9f1c7f0e-assertion";
pub const TOKEN_MARKUP: &str = r#"<xenc:EncryptedData xmlns:xenc="http://www.w3.org/2001/04/xmlenc#" Id="_enc"><xenc:CipherData><xenc:CipherValue>QUJDREVG</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData>"#;

pub const STS_URL: &str = "https://sts.test/Issuer.svc/IWSTrust13";
pub const QUERY_URL: &str = "https://query.test/RoutingService.svc";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn sts_reply() -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://www.w3.org/2005/08/addressing">
  <s:Header><a:Action s:mustUnderstand="1">http://docs.oasis-open.org/ws-sx/ws-trust/200512/RSTRC/IssueFinal</a:Action></s:Header>
  <s:Body>
    <trust:RequestSecurityTokenResponseCollection xmlns:trust="http://docs.oasis-open.org/ws-sx/ws-trust/200512">
      <trust:RequestSecurityTokenResponse>
        <trust:RequestedSecurityToken>{TOKEN_MARKUP}</trust:RequestedSecurityToken>
        <trust:RequestedAttachedReference>
          <o:SecurityTokenReference xmlns:o="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">
            <o:KeyIdentifier ValueType="http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.0#SAMLAssertionID">{ASSERTION_ID}</o:KeyIdentifier>
          </o:SecurityTokenReference>
        </trust:RequestedAttachedReference>
        <trust:RequestedProofToken><trust:BinarySecret>{SECRET_KEY}</trust:BinarySecret></trust:RequestedProofToken>
      </trust:RequestSecurityTokenResponse>
    </trust:RequestSecurityTokenResponseCollection>
  </s:Body>
</s:Envelope>"#
    )
}

pub fn citizen_reply() -> String {
    r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
  <s:Body>
    <SorgulaResponse xmlns="http://kps.nvi.gov.tr/2025/08/01" xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
      <SorgulaResult>
        <HataBilgisi i:nil="true"/>
        <SorguSonucu>
          <TumKutukDogrulaBilgisi>
            <DoluBilesenler><TumKutukDogrulaServisDoluBilesen>TCKisi</TumKutukDogrulaServisDoluBilesen></DoluBilesenler>
            <MaviKartliKisiKutukleri i:nil="true"/>
            <TCVatandasiKisiKutukleri>
              <KisiBilgisi>
                <DurumBilgisi>
                  <Durum><Aciklama>Açık</Aciklama><Kod>1</Kod></Durum>
                  <DogumTarih><Ay>1</Ay><Gun>1</Gun><Yil>1990</Yil></DogumTarih>
                  <OlumTarih><Ay i:nil="true"/><Gun i:nil="true"/><Yil i:nil="true"/></OlumTarih>
                </DurumBilgisi>
                <TCKimlikNo>99999999999</TCKimlikNo>
                <TemelBilgisi><Ad>JOHN</Ad><Soyad>DOE</Soyad></TemelBilgisi>
              </KisiBilgisi>
            </TCVatandasiKisiKutukleri>
            <YabanciKisiKutukleri i:nil="true"/>
          </TumKutukDogrulaBilgisi>
        </SorguSonucu>
      </SorgulaResult>
    </SorgulaResponse>
  </s:Body>
</s:Envelope>"#
        .to_string()
}

/// Transport double answering per URL and recording every request body.
pub struct StubTransport {
    replies: HashMap<String, HttpReply>,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.replies.insert(url.to_string(), HttpReply::new(status, body));
        self
    }

    pub fn sent_to(&self, url: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, body)| body.clone())
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn post(&self, url: &str, content_type: &str, body: String) -> KpsResult<HttpReply> {
        assert_eq!(content_type, "application/soap+xml; charset=utf-8");
        self.sent.lock().unwrap().push((url.to_string(), body));
        self.replies
            .get(url)
            .cloned()
            .ok_or_else(|| KpsError::Transport(format!("connection refused: {url}")))
    }
}

/// Transport that never answers.
pub struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn post(&self, _url: &str, _content_type: &str, _body: String) -> KpsResult<HttpReply> {
        std::future::pending().await
    }
}

/// Text between the first `open` prefix and the following `close` tag, inclusive.
pub fn slice<'a>(xml: &'a str, open: &str, close: &str) -> &'a str {
    let start = xml.find(open).expect("open tag");
    let end = xml[start..].find(close).expect("close tag") + start + close.len();
    &xml[start..end]
}
