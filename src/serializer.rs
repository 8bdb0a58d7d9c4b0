//! Typed value to XML element serialization, SOAP section 5 style.
//!
//! Under [`Use::Encoded`] every element carries `xsi:type` decoration and
//! arrays carry `SOAP-ENC:arrayType`; under [`Use::Literal`] type
//! decoration is omitted.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::config::Use;
use crate::error::SoapError;
use crate::typemap::{self, APACHE_SOAP, XSD_2001};
use crate::value::{classify, Aggregate, Scalar, SoapVal, TypedValue};

/// Element naming and typing for one serialized value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Element<'a> {
    /// Local element name.
    pub name: &'a str,
    /// XSD type local name.
    pub type_name: Option<&'a str>,
    /// Namespace of the element name.
    pub name_ns: Option<&'a str>,
    /// Namespace of the type.
    pub type_ns: Option<&'a str>,
    /// Extra attributes, written in order.
    pub attributes: &'a [(String, String)],
}

impl<'a> Element<'a> {
    pub fn named(name: &'a str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub fn typed(mut self, type_name: &'a str, type_ns: Option<&'a str>) -> Self {
        self.type_name = Some(type_name);
        self.type_ns = type_ns;
        self
    }

    pub fn in_namespace(mut self, ns: &'a str) -> Self {
        self.name_ns = Some(ns);
        self
    }

    pub fn with_attributes(mut self, attributes: &'a [(String, String)]) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Serializes [`TypedValue`]s into XML fragments.
pub struct ValueSerializer {
    xsd: String,
    charencoding: bool,
    rng: StdRng,
}

impl Default for ValueSerializer {
    fn default() -> Self {
        Self {
            xsd: XSD_2001.to_string(),
            charencoding: true,
            rng: StdRng::from_os_rng(),
        }
    }
}

impl ValueSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer with a deterministic prefix generator.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::default()
        }
    }

    /// Use another XML Schema version for type lookups.
    pub fn with_schema(mut self, xsd: &str) -> Self {
        self.xsd = xsd.to_string();
        self
    }

    /// Toggle entity expansion of text and attribute values.
    pub fn with_charencoding(mut self, enabled: bool) -> Self {
        self.charencoding = enabled;
        self
    }

    pub fn xsd_namespace(&self) -> &str {
        &self.xsd
    }

    /// Fresh prefix such as `ns4821`.
    pub fn random_prefix(&mut self, stem: &str) -> String {
        format!("{}{}", stem, self.rng.random_range(1000..10000))
    }

    /// Serialize `value` as the element described by `element`.
    pub fn serialize(
        &mut self,
        value: &TypedValue,
        element: Element<'_>,
        use_: Use,
    ) -> Result<String, SoapError> {
        self.serialize_value(value, element, use_, false)
    }

    /// Serialize a typed value wrapper with its own name and typing.
    pub fn serialize_soapval(&mut self, val: &SoapVal, use_: Use) -> Result<String, SoapError> {
        let element = Element {
            name: &val.name,
            type_name: val.type_name.as_deref(),
            name_ns: val.element_ns.as_deref(),
            type_ns: val.type_ns.as_deref(),
            attributes: &val.attributes,
        };
        self.serialize_value(&val.value, element, use_, true)
    }

    /// Serialize named parameters one after another.
    pub fn serialize_fields(
        &mut self,
        fields: &[(String, TypedValue)],
        use_: Use,
    ) -> Result<String, SoapError> {
        let mut xml = String::new();
        for (name, value) in fields {
            xml.push_str(&self.serialize(value, Element::named(name), use_)?);
        }
        Ok(xml)
    }

    fn serialize_value(
        &mut self,
        value: &TypedValue,
        element: Element<'_>,
        use_: Use,
        already_typed: bool,
    ) -> Result<String, SoapError> {
        if let TypedValue::Named(inner) = value {
            if already_typed {
                return Err(SoapError::UnsupportedValue(format!(
                    "typed value '{}' cannot wrap another typed value",
                    inner.name
                )));
            }
            return self.serialize_soapval(inner, use_);
        }

        let mut type_name = element.type_name.filter(|t| !t.is_empty());
        let mut type_ns = element.type_ns.filter(|t| !t.is_empty());
        if use_ == Use::Encoded && matches!(value, TypedValue::Map(_)) && type_name.is_none() {
            type_name = Some("Map");
            type_ns = Some(APACHE_SOAP);
        }

        let mut name = element_name(element.name);
        let mut xmlns = String::new();
        if let Some(ns) = element.name_ns.filter(|n| !n.is_empty()) {
            let prefix = self.random_prefix("nu");
            name = format!("{}:{}", prefix, name);
            xmlns.push_str(&format!(" xmlns:{}=\"{}\"", prefix, ns));
        }

        let type_prefix = match type_ns {
            Some(ns) if ns == self.xsd => Some("xsd".to_string()),
            Some(ns) => {
                let prefix = self.random_prefix("ns");
                xmlns.push_str(&format!(" xmlns:{}=\"{}\"", prefix, ns));
                Some(prefix)
            }
            None => None,
        };

        let mut atts = String::new();
        for (k, v) in element.attributes {
            atts.push_str(&format!(" {}=\"{}\"", k, self.expand(v)));
        }

        let type_attr = match (type_name, &type_prefix) {
            (Some(t), Some(p)) => format!(" xsi:type=\"{}:{}\"", p, t),
            _ => String::new(),
        };

        let xml = match value {
            TypedValue::Null => match use_ {
                Use::Literal => format!("<{name}{xmlns}{atts}/>"),
                Use::Encoded => format!("<{name}{xmlns}{type_attr}{atts} xsi:nil=\"true\"/>"),
            },
            TypedValue::Scalar(scalar) => {
                let builtin = type_name.filter(|t| typemap::is_builtin(&self.xsd, t));
                let (xsd_type, text) = match builtin {
                    Some(t) => (t, self.scalar_text(scalar, t == "boolean")),
                    None => (runtime_type(scalar), self.scalar_text(scalar, false)),
                };
                match use_ {
                    Use::Literal => format!("<{name}{xmlns}{atts}>{text}</{name}>"),
                    Use::Encoded => format!(
                        "<{name}{xmlns} xsi:type=\"xsd:{xsd_type}\"{atts}>{text}</{name}>"
                    ),
                }
            }
            _ if is_array_like(value, type_name) => {
                let items: Vec<&TypedValue> = match value {
                    TypedValue::Sequence(items) => items.iter().collect(),
                    TypedValue::Struct(fields) => fields.values().collect(),
                    TypedValue::Map(pairs) => pairs.iter().map(|(_, v)| v).collect(),
                    _ => Vec::new(),
                };
                self.serialize_array(&name, xmlns, &type_attr, &atts, &items, use_)?
            }
            _ => self.serialize_struct(value, &name, &xmlns, &type_attr, &atts, type_name, type_ns, use_)?,
        };
        trace!(element = %name, "serialize_val returning {}", xml);
        Ok(xml)
    }

    fn serialize_array(
        &mut self,
        name: &str,
        mut xmlns: String,
        type_attr: &str,
        atts: &str,
        items: &[&TypedValue],
        use_: Use,
    ) -> Result<String, SoapError> {
        let mut body = String::new();
        let mut kinds: Vec<String> = Vec::new();
        let mut last: Option<(String, Option<String>)> = None;

        for item in items {
            let (kind, kind_ns) = item_kind(item);
            if !kinds.contains(&kind) {
                kinds.push(kind.clone());
            }
            body.push_str(&self.serialize_value(item, Element::named("item"), use_, false)?);
            last = Some((kind, kind_ns));
        }

        let type_str = match (use_, last) {
            (Use::Literal, _) => String::new(),
            (Use::Encoded, _) if !type_attr.is_empty() => type_attr.to_string(),
            (Use::Encoded, None) => {
                " xsi:type=\"SOAP-ENC:Array\" SOAP-ENC:arrayType=\"xsd:anyType[0]\"".to_string()
            }
            (Use::Encoded, Some((kind, kind_ns))) => {
                let array_typename = if kinds.len() > 1 {
                    "xsd:anyType".to_string()
                } else if !kind.is_empty() && typemap::is_builtin(&self.xsd, &kind) {
                    let kind = if kind == "integer" { "int" } else { kind.as_str() };
                    format!("xsd:{}", kind)
                } else if kind == "arraySimple" {
                    "SOAP-ENC:Array".to_string()
                } else if kind == "arrayStruct" {
                    "unnamed_struct_use_soapval".to_string()
                } else {
                    match kind_ns.filter(|ns| !ns.is_empty()) {
                        Some(ns) if ns == self.xsd => format!("xsd:{}", kind),
                        Some(ns) => {
                            let prefix = self.random_prefix("ns");
                            xmlns.push_str(&format!(" xmlns:{}=\"{}\"", prefix, ns));
                            format!("{}:{}", prefix, kind)
                        }
                        None => kind,
                    }
                };
                format!(
                    " xsi:type=\"SOAP-ENC:Array\" SOAP-ENC:arrayType=\"{}[{}]\"",
                    array_typename,
                    items.len()
                )
            }
        };

        Ok(format!("<{name}{xmlns}{type_str}{atts}>{body}</{name}>"))
    }

    #[allow(clippy::too_many_arguments)]
    fn serialize_struct(
        &mut self,
        value: &TypedValue,
        name: &str,
        xmlns: &str,
        type_attr: &str,
        atts: &str,
        type_name: Option<&str>,
        type_ns: Option<&str>,
        use_: Use,
    ) -> Result<String, SoapError> {
        let mut xml = match use_ {
            Use::Literal => format!("<{name}{xmlns}{atts}>"),
            Use::Encoded => format!("<{name}{xmlns}{type_attr}{atts}>"),
        };
        let apache_map = type_name == Some("Map") && type_ns == Some(APACHE_SOAP);

        match value {
            TypedValue::Map(pairs) => {
                for (k, v) in pairs {
                    self.push_map_item(&mut xml, k, v, use_)?;
                }
            }
            TypedValue::Struct(fields) if apache_map => {
                for (k, v) in fields {
                    self.push_map_item(&mut xml, &TypedValue::from(k.as_str()), v, use_)?;
                }
            }
            TypedValue::Struct(fields) => {
                for (k, v) in fields {
                    xml.push_str(&self.serialize_value(v, Element::named(k), use_, false)?);
                }
            }
            TypedValue::Sequence(items) => {
                for (i, v) in items.iter().enumerate() {
                    let key = i.to_string();
                    xml.push_str(&self.serialize_value(v, Element::named(&key), use_, false)?);
                }
            }
            _ => {}
        }

        xml.push_str(&format!("</{}>", name));
        Ok(xml)
    }

    fn push_map_item(
        &mut self,
        xml: &mut String,
        key: &TypedValue,
        value: &TypedValue,
        use_: Use,
    ) -> Result<(), SoapError> {
        xml.push_str("<item>");
        xml.push_str(&self.serialize_value(key, Element::named("key"), use_, false)?);
        xml.push_str(&self.serialize_value(value, Element::named("value"), use_, false)?);
        xml.push_str("</item>");
        Ok(())
    }

    fn scalar_text(&self, scalar: &Scalar, boolean_type: bool) -> String {
        match scalar {
            Scalar::Bool(b) if boolean_type => b.to_string(),
            Scalar::Bool(true) => "1".to_string(),
            Scalar::Bool(false) => "0".to_string(),
            Scalar::String(s) => self.expand(s),
            other => other.to_string(),
        }
    }

    fn expand(&self, s: &str) -> String {
        if self.charencoding {
            expand_entities(s)
        } else {
            s.to_string()
        }
    }
}

/// Escape the five XML special characters.
pub fn expand_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

fn element_name(name: &str) -> String {
    if name.is_empty() {
        "noname".to_string()
    } else if is_numeric(name) {
        format!("__numeric_{}", name)
    } else {
        name.to_string()
    }
}

fn is_numeric(s: &str) -> bool {
    s.trim_start().parse::<f64>().is_ok() && s.bytes().any(|b| b.is_ascii_digit())
}

fn runtime_type(scalar: &Scalar) -> &'static str {
    match scalar {
        Scalar::Bool(_) => "boolean",
        Scalar::Int(_) => "int",
        Scalar::Float(_) => "float",
        Scalar::String(_) => "string",
    }
}

fn is_array_like(value: &TypedValue, type_name: Option<&str>) -> bool {
    if type_name.is_some_and(|t| t.starts_with("ArrayOf")) {
        return true;
    }
    match value {
        TypedValue::Sequence(_) => true,
        TypedValue::Struct(fields) => classify(fields.keys()) == Aggregate::Sequence,
        _ => false,
    }
}

fn item_kind(item: &TypedValue) -> (String, Option<String>) {
    let kind = match item {
        TypedValue::Named(sv) => {
            return (sv.type_name.clone().unwrap_or_default(), sv.type_ns.clone());
        }
        TypedValue::Sequence(_) => "arraySimple",
        TypedValue::Struct(fields) => match classify(fields.keys()) {
            Aggregate::Sequence => "arraySimple",
            Aggregate::Struct => "arrayStruct",
        },
        TypedValue::Map(_) => "arrayStruct",
        TypedValue::Scalar(s) => typemap::scalar_kind_name(s),
        TypedValue::Null => "anyType",
    };
    (kind.to_string(), None)
}
