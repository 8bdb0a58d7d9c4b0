//! HTTP transport for SOAP messages.
//!
//! [`Transport`] is the boundary the client talks to: one request in, one
//! response out. Redirects and digest challenges are handled above it by
//! [`RetryPolicy`], so in-memory transports get the same behaviour as the
//! ureq-backed [`HttpTransport`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indexmap::IndexMap;
use md5::{Digest, Md5};
use std::time::Duration;
use tracing::{debug, info, warn};
use ureq::Agent;

use crate::config::{AuthType, ConnectionConfig, CredentialsConfig};
use crate::error::SoapError;

/// An outgoing SOAP POST.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    /// Full Content-Type header value, charset included
    pub content_type: String,
    pub soap_action: String,
    /// Additional headers such as Authorization or Accept-Encoding
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            content_type: "text/xml; charset=ISO-8859-1".to_string(),
            soap_action: String::new(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Set or replace a header.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Request-URI used in digest computation.
    pub fn digest_uri(&self) -> String {
        match self.url.parse::<ureq::http::Uri>() {
            Ok(uri) => uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .filter(|pq| !pq.is_empty())
                .unwrap_or_else(|| "/".to_string()),
            Err(_) => "/".to_string(),
        }
    }

    /// Text form of the request, as a wire dump.
    pub fn to_text(&self) -> String {
        let mut text = format!(
            "POST {} HTTP/1.1\r\nContent-Type: {}\r\nSOAPAction: \"{}\"\r\n",
            self.url, self.content_type, self.soap_action
        );
        for (k, v) in &self.headers {
            text.push_str(&format!("{}: {}\r\n", k, v));
        }
        text.push_str(&format!("Content-Length: {}\r\n\r\n", self.body.len()));
        text.push_str(&String::from_utf8_lossy(&self.body));
        text
    }
}

/// A response as received from the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub reason: String,
    /// Header names are lower-case
    pub headers: IndexMap<String, String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            reason: ureq::http::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or_default()
                .to_string(),
            headers: IndexMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn status_line(&self) -> String {
        format!("HTTP/1.1 {} {}", self.status, self.reason)
    }

    /// Validate the content type and extract the charset for parsing.
    ///
    /// Known charsets are upper-cased, unknown ones fall back to
    /// `US-ASCII`, and a missing charset means `ISO-8859-1`.
    pub fn soap_charset(&self, expected_content_type: &str) -> Result<String, SoapError> {
        let Some(content_type) = self.header("content-type") else {
            return Err(SoapError::Protocol(format!(
                "Response not of type {} (no content-type header)",
                expected_content_type
            )));
        };
        if !content_type.contains(expected_content_type) {
            return Err(SoapError::Protocol(format!(
                "Response not of type {}: {}",
                expected_content_type, content_type
            )));
        }
        let Some(pos) = content_type.find('=') else {
            debug!("no charset in content type, assuming ISO-8859-1");
            return Ok("ISO-8859-1".to_string());
        };
        let charset = content_type[pos + 1..].replace('"', "");
        let upper = charset.trim().to_ascii_uppercase();
        Ok(match upper.as_str() {
            "ISO-8859-1" | "US-ASCII" | "UTF-8" => upper,
            _ => {
                debug!(charset = %charset, "unsupported charset, using US-ASCII");
                "US-ASCII".to_string()
            }
        })
    }

    /// Text form of the response, as a wire dump.
    pub fn to_text(&self) -> String {
        let mut text = format!("{}\r\n", self.status_line());
        for (k, v) in &self.headers {
            text.push_str(&format!("{}: {}\r\n", k, v));
        }
        text.push_str("\r\n");
        text.push_str(&String::from_utf8_lossy(&self.body));
        text
    }
}

/// Sends one HTTP exchange.
pub trait Transport {
    fn send(&mut self, request: &HttpRequest) -> Result<TransportResponse, SoapError>;
}

/// [`Transport`] over ureq.
pub struct HttpTransport {
    connect_timeout: Option<Duration>,
    response_timeout: Option<Duration>,
    proxy: Option<String>,
    persistent: bool,
    agent: Option<Agent>,
}

impl HttpTransport {
    pub fn new(connection: &ConnectionConfig) -> Self {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        Self {
            connect_timeout: secs(connection.timeout_secs),
            response_timeout: secs(connection.response_timeout_secs),
            proxy: connection.proxy.as_ref().map(|p| p.uri()),
            persistent: connection.persistent,
            agent: None,
        }
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
        if !persistent {
            self.agent = None;
        }
    }

    fn build_agent(&self) -> Result<Agent, SoapError> {
        let proxy = match &self.proxy {
            Some(uri) => Some(
                ureq::Proxy::new(uri).map_err(|e| SoapError::Transport(format!("invalid proxy: {}", e)))?,
            ),
            None => None,
        };
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .timeout_connect(self.connect_timeout)
            .timeout_recv_response(self.response_timeout)
            .proxy(proxy)
            .build();
        Ok(config.into())
    }

    fn agent(&mut self) -> Result<Agent, SoapError> {
        if !self.persistent {
            return self.build_agent();
        }
        if let Some(agent) = &self.agent {
            return Ok(agent.clone());
        }
        let agent = self.build_agent()?;
        self.agent = Some(agent.clone());
        Ok(agent)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(&ConnectionConfig::default())
    }
}

impl Transport for HttpTransport {
    fn send(&mut self, request: &HttpRequest) -> Result<TransportResponse, SoapError> {
        if !request.url.starts_with("http") {
            return Err(SoapError::Transport(
                "no transport found, or selected transport is not yet supported!".to_string(),
            ));
        }
        debug!(url = %request.url, len = request.body.len(), "sending HTTP request");

        let agent = self.agent()?;
        let mut builder = agent
            .post(&request.url)
            .header("Content-Type", request.content_type.as_str())
            .header("SOAPAction", format!("\"{}\"", request.soap_action));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let mut response = builder
            .send(&request.body[..])
            .map_err(|e| SoapError::Transport(e.to_string()))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_ascii_lowercase(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| SoapError::Transport(format!("reading response body: {}", e)))?;

        debug!(status = status.as_u16(), len = body.len(), "received HTTP response");
        Ok(TransportResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

/// Parameters of a `WWW-Authenticate: Digest` challenge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub qop: String,
    pub opaque: Option<String>,
    /// Nonce count of the last request sent with this challenge
    pub nc: u32,
}

impl DigestChallenge {
    /// Parse a challenge header; `None` unless it is a digest challenge
    /// carrying a nonce.
    pub fn parse(header: &str) -> Option<Self> {
        if !header.contains("Digest ") {
            return None;
        }
        let params = header.replacen("Digest ", "", 1);
        let mut fields: IndexMap<String, String> = IndexMap::new();
        for element in params.split(',') {
            if let Some((k, v)) = element.trim().split_once('=') {
                fields.insert(k.trim().to_string(), v.replace('"', ""));
            }
        }
        let nonce = fields.get("nonce")?.clone();
        Some(Self {
            realm: fields.get("realm").cloned().unwrap_or_default(),
            nonce,
            qop: fields.get("qop").cloned().unwrap_or_default(),
            opaque: fields.get("opaque").cloned(),
            nc: 0,
        })
    }
}

/// HTTP credentials plus any negotiated digest state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub auth_type: AuthType,
    pub digest: Option<DigestChallenge>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>, auth_type: AuthType) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            auth_type,
            digest: None,
        }
    }

    /// Switch to digest authentication for a received challenge.
    pub fn accept_challenge(&mut self, challenge: DigestChallenge) {
        self.auth_type = AuthType::Digest;
        self.digest = Some(challenge);
    }

    /// `Authorization` header value for the next request, if any.
    ///
    /// Each digest authorization increments the nonce count.
    pub fn authorization(&mut self, method: &str, digest_uri: &str) -> Option<String> {
        match self.auth_type {
            AuthType::Basic => {
                let token = format!("{}:{}", self.username.replace(':', ""), self.password);
                Some(format!("Basic {}", STANDARD.encode(token)))
            }
            AuthType::Digest => {
                let challenge = self.digest.as_mut()?;
                challenge.nc += 1;
                Some(digest_authorization(
                    &self.username,
                    &self.password,
                    challenge,
                    method,
                    digest_uri,
                ))
            }
            AuthType::Certificate | AuthType::Ntlm => None,
        }
    }
}

impl From<&CredentialsConfig> for Credentials {
    fn from(config: &CredentialsConfig) -> Self {
        Self::new(config.username.as_str(), config.password.as_str(), config.auth_type)
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// RFC 2617 digest response. The client nonce reuses the server nonce.
fn digest_authorization(
    username: &str,
    password: &str,
    challenge: &DigestChallenge,
    method: &str,
    digest_uri: &str,
) -> String {
    let ha1 = md5_hex(&format!("{}:{}:{}", username, challenge.realm, password));
    let ha2 = md5_hex(&format!("{}:{}", method, digest_uri));
    let nonce = &challenge.nonce;
    let cnonce = nonce;
    let nc = format!("{:08x}", challenge.nc);
    let response = if challenge.qop.is_empty() {
        md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2))
    } else {
        md5_hex(&format!("{}:{}:{}:{}:{}:{}", ha1, nonce, nc, cnonce, challenge.qop, ha2))
    };
    let opaque = challenge
        .opaque
        .as_deref()
        .map(|o| format!(", opaque=\"{}\"", o))
        .unwrap_or_default();

    format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\"{}, cnonce=\"{}\", nc={}, qop=\"{}\", response=\"{}\"",
        username, challenge.realm, nonce, digest_uri, opaque, cnonce, nc, challenge.qop, response
    )
}

/// What to do after one exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Response is final
    Done,
    /// Resend to a new location
    Redirect(String),
    /// Resend with digest credentials
    Authenticate(DigestChallenge),
}

/// Mutable request state carried across attempts.
#[derive(Debug, Clone)]
pub struct RequestState {
    pub request: HttpRequest,
    pub credentials: Option<Credentials>,
}

impl RequestState {
    /// Fold a retry decision into the state for the next attempt.
    pub fn apply(&mut self, decision: RetryDecision) {
        match decision {
            RetryDecision::Done => {}
            RetryDecision::Redirect(location) => {
                info!(location = %location, "following redirect");
                self.request.url = location;
            }
            RetryDecision::Authenticate(challenge) => {
                debug!(realm = %challenge.realm, "server wants digest authentication");
                match &mut self.credentials {
                    Some(credentials) => credentials.accept_challenge(challenge),
                    None => {
                        let mut credentials = Credentials::new("", "", AuthType::Digest);
                        credentials.accept_challenge(challenge);
                        self.credentials = Some(credentials);
                    }
                }
            }
        }
    }

    fn authorize(&mut self) {
        let uri = self.request.digest_uri();
        if let Some(value) = self.credentials.as_mut().and_then(|c| c.authorization("POST", &uri)) {
            self.request.set_header("Authorization", value);
        }
    }
}

/// Bounded resend loop for redirects and digest challenges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Classify a response.
    pub fn evaluate(&self, response: &TransportResponse) -> Result<RetryDecision, SoapError> {
        let status = response.status;

        if matches!(status, 301 | 302) {
            if let Some(location) = response.header("location") {
                debug!(status, location, "got redirect");
                return Ok(RetryDecision::Redirect(location.to_string()));
            }
        }

        if status == 401 {
            if let Some(challenge) = response.header("www-authenticate") {
                debug!(challenge, "got 401 with WWW-Authenticate");
                return match DigestChallenge::parse(challenge) {
                    Some(digest) => Ok(RetryDecision::Authenticate(digest)),
                    None => {
                        warn!("HTTP authentication failed");
                        Err(SoapError::Transport("HTTP authentication failed".to_string()))
                    }
                };
            }
        }

        if (300..=307).contains(&status) || (400..=417).contains(&status) || (501..=505).contains(&status) {
            return Err(SoapError::HttpStatus {
                status,
                reason: response.reason.clone(),
            });
        }

        if response.body.is_empty() {
            return Err(SoapError::Transport("no data present after HTTP headers".to_string()));
        }

        Ok(RetryDecision::Done)
    }

    /// Send until a final response, applying each decision to the state.
    pub fn execute<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        state: &mut RequestState,
    ) -> Result<TransportResponse, SoapError> {
        let mut attempts = 0;
        let mut last_status = String::new();
        loop {
            if attempts >= self.max_attempts {
                return Err(SoapError::TooManyAttempts(last_status));
            }
            attempts += 1;
            state.authorize();
            let response = transport.send(&state.request)?;
            last_status = response.status_line();
            match self.evaluate(&response)? {
                RetryDecision::Done => return Ok(response),
                decision => state.apply(decision),
            }
        }
    }
}
