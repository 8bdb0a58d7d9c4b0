//! Service description boundary.
//!
//! The client consumes operation metadata through [`WsdlSource`]. The
//! bundled [`StaticWsdl`] reads it from a YAML operation catalogue:
//!
//! ```yaml
//! target_namespace: urn:Calculator
//! namespaces:
//!   tns: urn:Calculator
//! ports:
//!   - name: CalculatorPort
//!     binding: soap
//!     location: http://localhost:8080/calc
//!     operations:
//!       - name: add
//!         soap_action: urn:Calculator#add
//!         input:
//!           namespace: urn:Calculator
//!           parts:
//!             - { name: a, type: xsd:int }
//!             - { name: b, type: xsd:int }
//!         output:
//!           parts:
//!             - { name: return, type: xsd:int }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::{SoapVersion, Style, Use};
use crate::error::SoapError;
use crate::namespaces::{self, NamespaceTable};
use crate::serializer::{Element, ValueSerializer};
use crate::typemap::SOAP_ENC;
use crate::value::TypedValue;

/// SOAP binding flavour of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BindingType {
    #[default]
    Soap,
    Soap12,
}

impl From<SoapVersion> for BindingType {
    fn from(version: SoapVersion) -> Self {
        match version {
            SoapVersion::Soap11 => BindingType::Soap,
            SoapVersion::Soap12 => BindingType::Soap12,
        }
    }
}

/// Message direction within an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// One message part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartDescriptor {
    pub name: String,

    /// Qualified type name, e.g. `xsd:int` or `tns:Order`
    #[serde(rename = "type", default)]
    pub type_name: String,
}

/// Input or output message of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MessageDescriptor {
    /// Namespace of the operation wrapper (rpc) or of the parts (document)
    pub namespace: Option<String>,

    #[serde(rename = "use")]
    pub use_: Use,

    /// Explicit encodingStyle; encoded messages default to SOAP-ENC
    pub encoding_style: Option<String>,

    pub parts: Vec<PartDescriptor>,
}

impl MessageDescriptor {
    /// encodingStyle to announce on the envelope, if any.
    pub fn effective_encoding_style(&self) -> Option<&str> {
        match (&self.encoding_style, self.use_) {
            (Some(es), _) => Some(es.as_str()),
            (None, Use::Encoded) => Some(SOAP_ENC),
            (None, Use::Literal) => None,
        }
    }
}

/// Metadata of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OperationDescriptor {
    pub name: String,

    /// Endpoint URL; empty inherits the port location
    pub endpoint: String,

    pub soap_action: String,

    pub style: Style,

    pub input: MessageDescriptor,

    pub output: MessageDescriptor,

    pub documentation: Option<String>,
}

impl OperationDescriptor {
    pub fn message(&self, direction: Direction) -> &MessageDescriptor {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }
}

/// A port with its binding and operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub name: String,

    #[serde(default)]
    pub binding: BindingType,

    /// Service address
    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub operations: Vec<OperationDescriptor>,
}

/// Root of the YAML operation catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WsdlCatalog {
    pub target_namespace: String,

    /// Prefix declarations used by part types
    pub namespaces: IndexMap<String, String>,

    pub ports: Vec<PortDescriptor>,
}

/// Producer of operation metadata consumed by the client.
pub trait WsdlSource: Send {
    /// Operations of a port (`None` selects the first port) with the given binding.
    fn operations(&self, port_name: Option<&str>, binding: BindingType) -> IndexMap<String, OperationDescriptor>;

    /// Serialize call parameters following the message parts of an operation.
    fn serialize_rpc_parameters(
        &mut self,
        serializer: &mut ValueSerializer,
        operation: &OperationDescriptor,
        direction: Direction,
        params: &[(String, TypedValue)],
    ) -> Result<String, SoapError>;

    /// Prefix declared for a namespace, recorded as used.
    fn prefix_of(&mut self, namespace: &str) -> Option<String>;

    /// Namespaces referenced while serializing, for the envelope.
    fn used_namespaces(&self) -> Vec<(String, String)>;
}

/// [`WsdlSource`] backed by a [`WsdlCatalog`].
#[derive(Debug, Clone)]
pub struct StaticWsdl {
    catalog: WsdlCatalog,
    namespaces: NamespaceTable,
}

impl StaticWsdl {
    pub fn from_catalog(catalog: WsdlCatalog) -> Result<Self, SoapError> {
        if catalog.ports.is_empty() {
            return Err(SoapError::Wsdl("catalogue declares no ports".to_string()));
        }
        let mut namespaces = NamespaceTable::new();
        if !catalog.target_namespace.is_empty() {
            namespaces.register("tns", catalog.target_namespace.as_str());
        }
        for (prefix, uri) in &catalog.namespaces {
            namespaces.register(prefix.as_str(), uri.as_str());
        }
        debug!(
            ports = catalog.ports.len(),
            target_namespace = %catalog.target_namespace,
            "loaded operation catalogue"
        );
        Ok(Self { catalog, namespaces })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, SoapError> {
        let catalog: WsdlCatalog =
            serde_yaml::from_str(yaml).map_err(|e| SoapError::Wsdl(e.to_string()))?;
        Self::from_catalog(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, SoapError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SoapError::Wsdl(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn catalog(&self) -> &WsdlCatalog {
        &self.catalog
    }

    fn find_port(&self, port_name: Option<&str>, binding: BindingType) -> Option<&PortDescriptor> {
        self.catalog.ports.iter().find(|p| {
            p.binding == binding && port_name.map_or(true, |name| name.is_empty() || p.name == name)
        })
    }

    /// Resolve a part type qname to (local name, namespace URI).
    fn resolve_type(&mut self, qname: &str) -> (String, Option<String>) {
        let local = namespaces::local_part(qname).to_string();
        let ns = namespaces::prefix(qname).and_then(|p| {
            let ns = self.namespaces.namespace_of(p).map(str::to_string);
            if ns.is_none() {
                warn!(prefix = p, type_name = qname, "undeclared prefix on part type");
            }
            ns
        });
        if let Some(ns) = &ns {
            self.namespaces.prefix_of(ns);
        }
        (local, ns)
    }
}

impl WsdlSource for StaticWsdl {
    fn operations(&self, port_name: Option<&str>, binding: BindingType) -> IndexMap<String, OperationDescriptor> {
        let Some(port) = self.find_port(port_name, binding) else {
            return IndexMap::new();
        };
        port.operations
            .iter()
            .map(|op| {
                let mut op = op.clone();
                if op.endpoint.is_empty() {
                    op.endpoint = port.location.clone();
                }
                (op.name.clone(), op)
            })
            .collect()
    }

    fn serialize_rpc_parameters(
        &mut self,
        serializer: &mut ValueSerializer,
        operation: &OperationDescriptor,
        direction: Direction,
        params: &[(String, TypedValue)],
    ) -> Result<String, SoapError> {
        let message = operation.message(direction);
        if params.len() != message.parts.len() {
            debug!(
                operation = %operation.name,
                params = params.len(),
                parts = message.parts.len(),
                "parameter count differs from message parts"
            );
        }
        let qualify = operation.style == Style::Document
            && message.use_ == Use::Literal;
        let positional = params.len() == message.parts.len()
            && !message
                .parts
                .iter()
                .any(|part| params.iter().any(|(name, _)| *name == part.name));

        let mut xml = String::new();
        for (index, part) in message.parts.iter().enumerate() {
            let value = if positional {
                params.get(index).map(|(_, v)| v)
            } else {
                params.iter().find(|(name, _)| *name == part.name).map(|(_, v)| v)
            };
            let value = value.cloned().unwrap_or(TypedValue::Null);

            let (type_name, type_ns) = self.resolve_type(&part.type_name);
            let mut element = Element::named(&part.name);
            if !type_name.is_empty() {
                element = element.typed(&type_name, type_ns.as_deref());
            }
            if qualify {
                if let Some(ns) = message.namespace.as_deref() {
                    element = element.in_namespace(ns);
                }
            }
            xml.push_str(&serializer.serialize(&value, element, message.use_)?);
        }
        Ok(xml)
    }

    fn prefix_of(&mut self, namespace: &str) -> Option<String> {
        self.namespaces.prefix_of(namespace)
    }

    fn used_namespaces(&self) -> Vec<(String, String)> {
        self.namespaces
            .used()
            .map(|(p, n)| (p.to_string(), n.to_string()))
            .collect()
    }
}
