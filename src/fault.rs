//! SOAP Fault detection and rendering.
//!
//! A fault is an ordinary response body whose root struct carries a
//! `faultcode` (SOAP 1.1) or a `Code`/`Reason` pair (SOAP 1.2). It is
//! surfaced as a value, never as a [`crate::SoapError`].

use indexmap::IndexMap;
use serde::Serialize;

use crate::config::{SoapVersion, Use};
use crate::error::SoapError;
use crate::namespaces::{self, SOAP_11_NS, SOAP_12_NS};
use crate::serializer::{expand_entities, ValueSerializer};
use crate::value::TypedValue;

/// A decoded SOAP Fault.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoapFault {
    pub faultcode: String,
    pub faultstring: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faultactor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<TypedValue>,
}

impl SoapFault {
    pub fn new(faultcode: impl Into<String>, faultstring: impl Into<String>) -> Self {
        Self {
            faultcode: faultcode.into(),
            faultstring: faultstring.into(),
            faultactor: None,
            detail: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.faultactor = Some(actor.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<TypedValue>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Recognise a fault in a decoded response body.
    ///
    /// Returns `None` for anything that is not a fault-shaped struct.
    pub fn from_value(value: &TypedValue) -> Option<Self> {
        let fields = value.as_struct()?;

        if let Some(code) = fields.get("faultcode") {
            return Some(Self {
                faultcode: text_of(code),
                faultstring: fields.get("faultstring").map(text_of).unwrap_or_default(),
                faultactor: fields.get("faultactor").map(text_of),
                detail: fields.get("detail").cloned(),
            });
        }

        // SOAP 1.2: <Code><Value/></Code><Reason><Text/></Reason>
        let code = fields.get("Code")?;
        let code = code.get("Value").map(text_of).unwrap_or_else(|| text_of(code));
        let reason = fields
            .get("Reason")
            .map(|r| r.get("Text").map(text_of).unwrap_or_else(|| text_of(r)))
            .unwrap_or_default();
        Some(Self {
            faultcode: code,
            faultstring: reason,
            faultactor: fields.get("Role").map(text_of),
            detail: fields.get("Detail").cloned(),
        })
    }

    /// Struct form, as returned from a call that received this fault.
    pub fn to_value(&self) -> TypedValue {
        let mut fields = IndexMap::new();
        fields.insert("faultcode".to_string(), TypedValue::from(self.faultcode.as_str()));
        fields.insert("faultstring".to_string(), TypedValue::from(self.faultstring.as_str()));
        if let Some(actor) = &self.faultactor {
            fields.insert("faultactor".to_string(), TypedValue::from(actor.as_str()));
        }
        if let Some(detail) = &self.detail {
            fields.insert("detail".to_string(), detail.clone());
        }
        TypedValue::Struct(fields)
    }

    /// Render a complete fault envelope.
    pub fn to_envelope(&self, version: SoapVersion) -> Result<String, SoapError> {
        let detail = match &self.detail {
            Some(detail) => Some(detail_xml(detail)?),
            None => None,
        };
        Ok(match version {
            SoapVersion::Soap11 => self.soap_11_fault(detail.as_deref()),
            SoapVersion::Soap12 => self.soap_12_fault(detail.as_deref()),
        })
    }

    fn soap_11_fault(&self, detail: Option<&str>) -> String {
        let actor = self
            .faultactor
            .as_deref()
            .map(|a| format!("\n      <faultactor>{}</faultactor>", expand_entities(a)))
            .unwrap_or_default();
        let detail = detail
            .map(|d| format!("\n      <detail>{}</detail>", d))
            .unwrap_or_default();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}">
  <soap:Body>
    <soap:Fault>
      <faultcode>{}</faultcode>
      <faultstring>{}</faultstring>{}{}
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
            SOAP_11_NS,
            expand_entities(&qualified_code(&self.faultcode, SoapVersion::Soap11)),
            expand_entities(&self.faultstring),
            actor,
            detail
        )
    }

    fn soap_12_fault(&self, detail: Option<&str>) -> String {
        let role = self
            .faultactor
            .as_deref()
            .map(|a| format!("\n      <soap:Role>{}</soap:Role>", expand_entities(a)))
            .unwrap_or_default();
        let detail = detail
            .map(|d| format!("\n      <soap:Detail>{}</soap:Detail>", d))
            .unwrap_or_default();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}">
  <soap:Body>
    <soap:Fault>
      <soap:Code>
        <soap:Value>{}</soap:Value>
      </soap:Code>
      <soap:Reason>
        <soap:Text xml:lang="en">{}</soap:Text>
      </soap:Reason>{}{}
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
            SOAP_12_NS,
            expand_entities(&qualified_code(&self.faultcode, SoapVersion::Soap12)),
            expand_entities(&self.faultstring),
            role,
            detail
        )
    }
}

impl std::fmt::Display for SoapFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.faultcode, self.faultstring)
    }
}

/// Text of a scalar, or of the `!` simple content of an attributed element.
fn text_of(value: &TypedValue) -> String {
    match value.get("!") {
        Some(inner) => inner.to_text(),
        None => value.to_text(),
    }
}

fn detail_xml(detail: &TypedValue) -> Result<String, SoapError> {
    match detail {
        TypedValue::Struct(fields) => {
            let fields: Vec<(String, TypedValue)> =
                fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            ValueSerializer::new().serialize_fields(&fields, Use::Literal)
        }
        other => Ok(expand_entities(&other.to_text())),
    }
}

/// Map the fault code onto the `soap` prefix and the version's code names.
fn qualified_code(code: &str, version: SoapVersion) -> String {
    let local = namespaces::local_part(code);
    let mapped = match (version, local) {
        (SoapVersion::Soap12, "Client") => "Sender",
        (SoapVersion::Soap12, "Server") => "Receiver",
        (SoapVersion::Soap11, "Sender") => "Client",
        (SoapVersion::Soap11, "Receiver") => "Server",
        (_, other) => other,
    };
    if mapped != local || namespaces::prefix(code).is_none() {
        format!("soap:{}", mapped)
    } else {
        code.to_string()
    }
}
