//! Configuration types for the SOAP client.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::SoapError;
use crate::parser::{ParseOptions, DEFAULT_MAX_DEPTH, DEFAULT_MAX_SIZE};

/// Main configuration for the SOAP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Config version
    pub version: String,

    /// Service endpoint URL
    pub endpoint: String,

    /// Path to a YAML operation catalogue; enables WSDL mode
    pub wsdl: Option<PathBuf>,

    /// Port to select from the catalogue (empty selects the first)
    pub port_name: String,

    /// Endpoint that overrides the one found in the catalogue
    pub force_endpoint: Option<String>,

    /// SOAP version used for fault rendering and WSDL binding selection
    pub soap_version: SoapVersion,

    /// Character encoding settings
    pub encoding: EncodingConfig,

    /// Connection settings
    pub connection: ConnectionConfig,

    /// Limits applied when decoding responses
    pub parser: ParserConfig,

    /// HTTP credentials
    pub credentials: Option<CredentialsConfig>,

    /// Per-call defaults
    pub defaults: CallDefaults,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            endpoint: String::new(),
            wsdl: None,
            port_name: String::new(),
            force_endpoint: None,
            soap_version: SoapVersion::Soap11,
            encoding: EncodingConfig::default(),
            connection: ConnectionConfig::default(),
            parser: ParserConfig::default(),
            credentials: None,
            defaults: CallDefaults::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, SoapError> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Configuration pointing at an endpoint, everything else defaulted.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Parser options for a message in `charset`.
    pub fn parse_options(&self, charset: &str) -> ParseOptions {
        ParseOptions {
            decode_utf8: self.encoding.decode_utf8,
            max_depth: self.parser.max_depth,
            max_size: self.parser.max_size,
            ..ParseOptions::with_encoding(charset)
        }
    }
}

/// Character encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Charset of outgoing messages (XML declaration and Content-Type)
    pub soap_defencoding: String,

    /// Map decoded UTF-8 text to Latin-1 (characters above U+00FF become `?`)
    pub decode_utf8: bool,

    /// Content-Type of outgoing messages and expected in responses
    pub content_type: String,

    /// Accept-Encoding value sent with requests
    pub http_encoding: Option<String>,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            soap_defencoding: "ISO-8859-1".to_string(),
            decode_utf8: false,
            content_type: "text/xml".to_string(),
            http_encoding: None,
        }
    }
}

/// Limits applied when decoding responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum element nesting depth
    pub max_depth: usize,

    /// Maximum message size in bytes
    pub max_size: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Connect timeout in seconds (0 = no limit)
    pub timeout_secs: u64,

    /// Response timeout in seconds (0 = no limit)
    pub response_timeout_secs: u64,

    /// HTTP proxy
    pub proxy: Option<ProxyConfig>,

    /// Maximum number of HTTP exchanges per call (redirects and auth challenges)
    pub max_attempts: u32,

    /// Reuse the underlying connection between calls
    pub persistent: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            response_timeout_secs: 30,
            proxy: None,
            max_attempts: 2,
            persistent: false,
        }
    }
}

/// HTTP proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy host
    pub host: String,

    /// Proxy port
    pub port: u16,

    /// Proxy username
    #[serde(default)]
    pub username: Option<String>,

    /// Proxy password
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Proxy URI in the form accepted by the HTTP agent.
    pub fn uri(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("http://{}:{}@{}:{}", user, pass, self.host, self.port),
            (Some(user), None) => format!("http://{}@{}:{}", user, self.host, self.port),
            _ => format!("http://{}:{}", self.host, self.port),
        }
    }
}

/// HTTP credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialsConfig {
    /// Username
    pub username: String,

    /// Password
    pub password: String,

    /// Authentication scheme
    #[serde(default)]
    pub auth_type: AuthType,
}

/// HTTP authentication schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// RFC 7617 basic
    #[default]
    Basic,
    /// RFC 2617 digest, negotiated from a 401 challenge
    Digest,
    /// Client certificate (handled by the TLS layer)
    Certificate,
    /// NTLM (not negotiated by the built-in transport)
    Ntlm,
}

/// Defaults applied to calls that do not specify their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallDefaults {
    /// Method namespace
    pub namespace: String,

    /// Binding style
    pub style: Style,

    /// Encoding use
    #[serde(rename = "use")]
    pub use_: Use,
}

impl Default for CallDefaults {
    fn default() -> Self {
        Self {
            namespace: "http://tempuri.org".to_string(),
            style: Style::Rpc,
            use_: Use::Encoded,
        }
    }
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    #[default]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

/// Binding style of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// Body wraps the parameters in an operation element
    #[default]
    Rpc,
    /// Body carries the payload as-is
    Document,
}

/// Encoding use of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Use {
    /// SOAP section 5 encoding with xsi:type decoration
    #[default]
    Encoded,
    /// Plain schema-described XML
    Literal,
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Style::Rpc => write!(f, "rpc"),
            Style::Document => write!(f, "document"),
        }
    }
}

impl FromStr for Style {
    type Err = SoapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rpc" => Ok(Style::Rpc),
            "document" => Ok(Style::Document),
            other => Err(SoapError::Config(format!("unknown style '{}'", other))),
        }
    }
}

impl fmt::Display for Use {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Use::Encoded => write!(f, "encoded"),
            Use::Literal => write!(f, "literal"),
        }
    }
}

impl FromStr for Use {
    type Err = SoapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "encoded" => Ok(Use::Encoded),
            "literal" => Ok(Use::Literal),
            other => Err(SoapError::Config(format!("unknown use '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.encoding.soap_defencoding, "ISO-8859-1");
        assert!(!config.encoding.decode_utf8);
        assert_eq!(config.connection.max_attempts, 2);
        assert_eq!(config.connection.response_timeout_secs, 30);
        assert_eq!(config.defaults.style, Style::Rpc);
        assert_eq!(config.defaults.use_, Use::Encoded);
        assert!(config.wsdl.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = ClientConfig::for_endpoint("http://localhost/soap");
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: ClientConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.endpoint, "http://localhost/soap");
        assert_eq!(parsed.defaults.namespace, config.defaults.namespace);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
version: "1"
endpoint: "http://example.com/service"
soap_version: "1.2"
encoding:
  soap_defencoding: UTF-8
  decode_utf8: true
connection:
  timeout_secs: 5
  proxy:
    host: proxy.local
    port: 3128
credentials:
  username: alice
  password: secret
  auth_type: digest
defaults:
  namespace: "urn:Calculator"
  style: document
  use: literal
"#;
        let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.endpoint, "http://example.com/service");
        assert_eq!(config.soap_version, SoapVersion::Soap12);
        assert!(config.encoding.decode_utf8);
        assert_eq!(config.encoding.content_type, "text/xml");
        assert_eq!(config.connection.timeout_secs, 5);
        assert_eq!(config.connection.max_attempts, 2);
        let proxy = config.connection.proxy.as_ref().unwrap();
        assert_eq!(proxy.uri(), "http://proxy.local:3128");
        let creds = config.credentials.as_ref().unwrap();
        assert_eq!(creds.auth_type, AuthType::Digest);
        assert_eq!(config.defaults.style, Style::Document);
        assert_eq!(config.defaults.use_, Use::Literal);
    }

    #[test]
    fn test_parser_limits_from_yaml() {
        let config = ClientConfig::default();
        assert_eq!(config.parser.max_depth, 128);
        assert_eq!(config.parser.max_size, 10 * 1024 * 1024);

        let yaml = r#"
endpoint: "http://example.com/service"
parser:
  max_depth: 16
"#;
        let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        let options = config.parse_options("utf-8");
        assert_eq!(options.max_depth, 16);
        assert_eq!(options.max_size, 10 * 1024 * 1024);
        assert_eq!(options.encoding, "UTF-8");
    }

    #[test]
    fn test_style_and_use_from_str() {
        assert_eq!("RPC".parse::<Style>().unwrap(), Style::Rpc);
        assert_eq!("literal".parse::<Use>().unwrap(), Use::Literal);
        assert!("soap".parse::<Style>().is_err());
    }
}
