//! SOAP 1.1 envelope construction.

use indexmap::IndexMap;
use tracing::debug;

use crate::config::{Style, Use};
use crate::error::SoapError;
use crate::namespaces::NamespaceTable;
use crate::serializer::{Element, ValueSerializer};
use crate::value::{SoapVal, TypedValue};

/// SOAP header content.
#[derive(Debug, Clone, PartialEq)]
pub enum Headers {
    /// Pre-serialized header XML.
    Raw(String),
    /// Named values, each serialized under its name.
    Fields(Vec<(String, TypedValue)>),
    /// Typed value wrappers, each serialized with its own name.
    Values(Vec<SoapVal>),
}

impl Headers {
    fn is_empty(&self) -> bool {
        match self {
            Headers::Raw(xml) => xml.is_empty(),
            Headers::Fields(fields) => fields.is_empty(),
            Headers::Values(values) => values.is_empty(),
        }
    }

    fn render(&self, serializer: &mut ValueSerializer, use_: Use) -> Result<String, SoapError> {
        match self {
            Headers::Raw(xml) => Ok(xml.clone()),
            Headers::Fields(fields) => {
                let mut xml = String::new();
                for (name, value) in fields {
                    xml.push_str(&serializer.serialize(value, Element::named(name), use_)?);
                }
                Ok(xml)
            }
            Headers::Values(values) => {
                let mut xml = String::new();
                for value in values {
                    xml.push_str(&serializer.serialize_soapval(value, use_)?);
                }
                Ok(xml)
            }
        }
    }
}

/// Builder for a complete SOAP envelope around a serialized body.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder<'a> {
    body: &'a str,
    headers: Option<&'a Headers>,
    namespaces: Vec<(String, String)>,
    style: Style,
    use_: Use,
    encoding_style: Option<String>,
    charset: String,
}

impl<'a> EnvelopeBuilder<'a> {
    pub fn new(body: &'a str) -> Self {
        Self {
            body,
            headers: None,
            namespaces: Vec::new(),
            style: Style::Rpc,
            use_: Use::Encoded,
            encoding_style: Some(crate::typemap::SOAP_ENC.to_string()),
            charset: "ISO-8859-1".to_string(),
        }
    }

    pub fn headers(mut self, headers: Option<&'a Headers>) -> Self {
        self.headers = headers;
        self
    }

    /// Extra namespace declarations, merged over the defaults.
    pub fn namespaces<I, K, V>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.namespaces
            .extend(namespaces.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn use_(mut self, use_: Use) -> Self {
        self.use_ = use_;
        self
    }

    /// `SOAP-ENV:encodingStyle`; `None` or empty omits the attribute.
    pub fn encoding_style(mut self, encoding_style: Option<&str>) -> Self {
        self.encoding_style = encoding_style.filter(|s| !s.is_empty()).map(str::to_string);
        self
    }

    /// Charset written in the XML declaration.
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Serialize the envelope.
    pub fn build(&self, serializer: &mut ValueSerializer) -> Result<String, SoapError> {
        debug!(
            body_len = self.body.len(),
            style = %self.style,
            use_ = %self.use_,
            encoding_style = self.encoding_style.as_deref().unwrap_or(""),
            "serializing envelope"
        );

        let mut declarations: IndexMap<String, String> = NamespaceTable::with_schema(serializer.xsd_namespace())
            .iter()
            .map(|(p, n)| (p.to_string(), n.to_string()))
            .collect();
        for (prefix, ns) in &self.namespaces {
            declarations.insert(prefix.clone(), ns.clone());
        }

        let mut ns_string = String::new();
        if let Some(es) = &self.encoding_style {
            ns_string.push_str(&format!(" SOAP-ENV:encodingStyle=\"{}\"", es));
        }
        for (prefix, ns) in &declarations {
            ns_string.push_str(&format!(" xmlns:{}=\"{}\"", prefix, ns));
        }

        let header_xml = match self.headers {
            Some(headers) if !headers.is_empty() => format!(
                "<SOAP-ENV:Header>{}</SOAP-ENV:Header>",
                headers.render(serializer, self.use_)?
            ),
            _ => String::new(),
        };

        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"{}\"?><SOAP-ENV:Envelope{}>{}<SOAP-ENV:Body>{}</SOAP-ENV:Body></SOAP-ENV:Envelope>",
            self.charset, ns_string, header_xml, self.body
        ))
    }
}
