//! SOAP 1.1/1.2 toolkit for Zentinel
//!
//! Serializes typed values into SOAP envelopes, sends them over HTTP and
//! decodes the responses back into typed values, optionally guided by
//! operation metadata from a service description.
//!
//! # Features
//!
//! - SOAP-encoded and literal serialization with XSD type mapping
//! - Streaming response parser with multiref (`id`/`href`) resolution
//! - Multi-dimensional arrays, Apache Map/Vector, attribute-carrying elements
//! - SOAP Fault detection and rendering
//! - HTTP transport with basic and digest authentication, redirects and proxies
//! - Proxy source generation from operation catalogues
//!
//! # Example
//!
//! ```ignore
//! use zentinel_soap::{CallOptions, ClientConfig, Params, SoapClient};
//!
//! let mut client = SoapClient::new(ClientConfig::for_endpoint("http://localhost:8080/calc"));
//! let sum = client.call(
//!     "add",
//!     Params::values([("a", 1), ("b", 2)]),
//!     CallOptions::new().namespace("urn:Calculator"),
//! )?;
//! ```

pub mod client;
pub mod codegen;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fault;
pub mod namespaces;
pub mod parser;
pub mod serializer;
pub mod trail;
pub mod transport;
pub mod typemap;
pub mod value;
pub mod wsdl;

pub use client::{CallOptions, Params, SoapClient};
pub use config::{ClientConfig, SoapVersion, Style, Use};
pub use envelope::{EnvelopeBuilder, Headers};
pub use error::SoapError;
pub use fault::SoapFault;
pub use parser::{parse, ParseOptions, ParsedMessage};
pub use serializer::{Element, ValueSerializer};
pub use trail::DebugTrail;
pub use value::{Scalar, SoapVal, TypedValue};
