//! Error types for the SOAP toolkit.

use thiserror::Error;

/// SOAP toolkit errors.
///
/// A SOAP Fault is deliberately absent: faults are valid responses and are
/// surfaced through [`crate::fault::SoapFault`] on the client.
#[derive(Error, Debug)]
pub enum SoapError {
    #[error("XML error parsing SOAP payload on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Charset from HTTP Content-Type '{http}' does not match encoding from XML declaration '{xml}'")]
    CharsetMismatch { http: String, xml: String },

    #[error("xml was empty, didn't parse!")]
    EmptyInput,

    #[error("HTTP Error: {0}")]
    Transport(String),

    #[error("Unsupported HTTP response status {status} {reason}")]
    HttpStatus { status: u16, reason: String },

    #[error("Too many tries to get an OK response ({0})")]
    TooManyAttempts(String),

    #[error("{0}")]
    Protocol(String),

    #[error("operation {0} not present in WSDL.")]
    OperationNotFound(String),

    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    #[error("wsdl error: {0}")]
    Wsdl(String),

    #[error("cyclic href chain detected at id '{0}'")]
    CyclicReference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SoapError {
    /// Build a parse error, computing the line number from a byte offset.
    pub fn parse_at(input: &str, offset: usize, message: impl Into<String>) -> Self {
        let end = offset.min(input.len());
        let line = input.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1;
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Whether this error belongs to the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::HttpStatus { .. } | Self::TooManyAttempts(_)
        )
    }

    /// Whether this error belongs to the XML layer.
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::CharsetMismatch { .. } | Self::EmptyInput | Self::CyclicReference(_)
        )
    }
}

impl From<serde_yaml::Error> for SoapError {
    fn from(err: serde_yaml::Error) -> Self {
        SoapError::Config(err.to_string())
    }
}
