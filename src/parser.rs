//! Streaming SOAP message parser.
//!
//! Element events are recorded into an arena of nodes indexed by document
//! position. Values are built bottom-up as elements close; elements that
//! depend on an `href` are left pending and built after the whole message
//! has been read, once every `id` is known.

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

use crate::error::SoapError;
use crate::namespaces::{self, NamespaceTable};
use crate::serializer::expand_entities;
use crate::typemap::{self, APACHE_SOAP};
use crate::value::TypedValue;

/// Default maximum element nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Default maximum message size in bytes (10 MiB).
pub const DEFAULT_MAX_SIZE: usize = 10 * 1024 * 1024;

/// Parser settings.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Charset announced by the transport, upper case.
    pub encoding: String,
    /// Map decoded text to Latin-1, replacing characters above U+00FF with `?`.
    pub decode_utf8: bool,
    /// Deepest element nesting accepted, the Envelope counting as 1.
    pub max_depth: usize,
    /// Largest message accepted, in bytes.
    pub max_size: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            encoding: "UTF-8".to_string(),
            decode_utf8: false,
            max_depth: DEFAULT_MAX_DEPTH,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl ParseOptions {
    pub fn with_encoding(encoding: &str) -> Self {
        Self {
            encoding: encoding.to_ascii_uppercase(),
            ..Self::default()
        }
    }
}

/// Result of parsing a SOAP message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMessage {
    /// Value of the root struct (first Body child, or `root="1"` element).
    pub body: Option<TypedValue>,
    /// Value of the SOAP Header element.
    pub header: Option<TypedValue>,
    /// Raw markup of the Header entries.
    pub raw_headers: String,
    /// Raw markup of the Body content from the root struct on.
    pub document: String,
    pub root_struct_name: Option<String>,
    pub root_struct_namespace: Option<String>,
    /// Namespace declared on the root struct element.
    pub method_namespace: Option<String>,
    /// Encoding from the XML declaration.
    pub xml_encoding: Option<String>,
}

/// Parse a complete SOAP message.
///
/// A document without an Envelope is treated as a bare value fragment whose
/// root element is the value.
pub fn parse(xml: &[u8], options: &ParseOptions) -> Result<ParsedMessage, SoapError> {
    SoapParser::new(options).run(xml)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Outside,
    Envelope,
    Header,
    Body,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ArrayInfo {
    item_type: String,
    item_ns: Option<String>,
    size: usize,
    cols: Option<usize>,
}

#[derive(Debug, Default)]
struct Node {
    name: String,
    parent: Option<usize>,
    children: Vec<usize>,
    cdata: String,
    namespace: String,
    type_name: Option<String>,
    type_namespace: Option<String>,
    array: Option<ArrayInfo>,
    nil: bool,
    href: Option<String>,
    has_id: bool,
    xattrs: Vec<(String, String)>,
    root_struct: bool,
    result: Option<TypedValue>,
    pending: bool,
}

impl Node {
    fn is_array(&self) -> bool {
        matches!(self.type_name.as_deref(), Some("array") | Some("Array"))
    }

    fn is_apache(&self, type_name: &str) -> bool {
        self.type_name.as_deref() == Some(type_name)
            && self.type_namespace.as_deref() == Some(APACHE_SOAP)
    }
}

struct SoapParser<'o> {
    options: &'o ParseOptions,
    nodes: Vec<Node>,
    open: Vec<usize>,
    status: Status,
    saw_envelope: bool,
    fragment: bool,
    namespaces: NamespaceTable,
    default_namespace: String,
    root_struct: Option<usize>,
    root_struct_name: Option<String>,
    root_header: Option<usize>,
    body_position: Option<usize>,
    method_namespace: Option<String>,
    ids: HashMap<String, usize>,
    multirefs: IndexMap<String, Vec<usize>>,
    resolved: HashMap<String, TypedValue>,
    raw_headers: String,
    document: String,
}

impl<'o> SoapParser<'o> {
    fn new(options: &'o ParseOptions) -> Self {
        Self {
            options,
            nodes: Vec::new(),
            open: Vec::new(),
            status: Status::Outside,
            saw_envelope: false,
            fragment: false,
            namespaces: NamespaceTable::new(),
            default_namespace: String::new(),
            root_struct: None,
            root_struct_name: None,
            root_header: None,
            body_position: None,
            method_namespace: None,
            ids: HashMap::new(),
            multirefs: IndexMap::new(),
            resolved: HashMap::new(),
            raw_headers: String::new(),
            document: String::new(),
        }
    }

    fn run(mut self, bytes: &[u8]) -> Result<ParsedMessage, SoapError> {
        if bytes.is_empty() {
            debug!("xml was empty, didn't parse!");
            return Err(SoapError::EmptyInput);
        }
        if bytes.len() > self.options.max_size {
            return Err(SoapError::Parse {
                line: 1,
                message: format!(
                    "message of {} bytes exceeds maximum size of {}",
                    bytes.len(),
                    self.options.max_size
                ),
            });
        }
        let text = self.decode_input(bytes)?;
        let xml_encoding = check_charset(&text, &self.options.encoding)?;
        debug!(length = text.len(), encoding = %self.options.encoding, "Entering SOAP parser");

        let mut reader = Reader::from_str(&text);
        reader.config_mut().trim_text(false);

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    self.check_open(&text, &reader)?;
                    let (qname, attrs) = element_parts(e, &text, &reader)?;
                    self.start_element(&qname, attrs);
                }
                Ok(Event::Empty(ref e)) => {
                    self.check_open(&text, &reader)?;
                    let (qname, attrs) = element_parts(e, &text, &reader)?;
                    self.start_element(&qname, attrs);
                    self.end_element(&qname);
                }
                Ok(Event::End(ref e)) => {
                    let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    self.end_element(&qname);
                }
                Ok(Event::Text(ref e)) => {
                    let data = e.unescape().map_err(|err| {
                        SoapError::parse_at(&text, reader.buffer_position() as usize, err.to_string())
                    })?;
                    if self.open.is_empty() {
                        if !data.trim().is_empty() {
                            let message = if self.nodes.is_empty() {
                                "syntax error"
                            } else {
                                "junk after document element"
                            };
                            return Err(SoapError::parse_at(&text, reader.buffer_position() as usize, message));
                        }
                        continue;
                    }
                    self.character_data(&data);
                }
                Ok(Event::CData(e)) => {
                    let data = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    self.character_data(&data);
                }
                Ok(Event::DocType(_)) => {
                    return Err(SoapError::parse_at(
                        &text,
                        reader.buffer_position() as usize,
                        "DOCTYPE declarations are not allowed in SOAP messages",
                    ));
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(SoapError::parse_at(&text, reader.error_position() as usize, e.to_string()));
                }
                _ => {}
            }
        }

        if self.nodes.is_empty() || !self.open.is_empty() {
            return Err(SoapError::parse_at(&text, text.len(), "no element found"));
        }

        self.finish(xml_encoding)
    }

    /// Reject a second document element and nesting past `max_depth`.
    fn check_open(&self, text: &str, reader: &Reader<&[u8]>) -> Result<(), SoapError> {
        let offset = reader.buffer_position() as usize;
        if self.open.is_empty() && !self.nodes.is_empty() {
            return Err(SoapError::parse_at(text, offset, "junk after document element"));
        }
        if self.open.len() >= self.options.max_depth {
            warn!(max_depth = self.options.max_depth, "element nesting too deep");
            return Err(SoapError::parse_at(
                text,
                offset,
                format!("element nesting exceeds maximum depth of {}", self.options.max_depth),
            ));
        }
        Ok(())
    }

    fn decode_input<'b>(&self, bytes: &'b [u8]) -> Result<std::borrow::Cow<'b, str>, SoapError> {
        if self.options.encoding == "ISO-8859-1" && !declares_utf8(bytes) {
            trace!("decoding payload as Latin-1");
            return Ok(std::borrow::Cow::Owned(bytes.iter().map(|&b| b as char).collect()));
        }
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(std::borrow::Cow::Borrowed(s)),
            Err(e) if matches!(self.options.encoding.as_str(), "ISO-8859-1" | "US-ASCII") => {
                trace!(valid_up_to = e.valid_up_to(), "transcoding Latin-1 payload");
                Ok(std::borrow::Cow::Owned(bytes.iter().map(|&b| b as char).collect()))
            }
            Err(e) => {
                let line = bytes[..e.valid_up_to()].iter().filter(|&&b| b == b'\n').count() + 1;
                Err(SoapError::Parse {
                    line,
                    message: "not well-formed (invalid token)".to_string(),
                })
            }
        }
    }

    fn start_element(&mut self, qname: &str, attrs: Vec<(String, String)>) {
        let pos = self.nodes.len();
        let parent = self.open.last().copied();
        if let Some(p) = parent {
            self.nodes[p].children.push(pos);
        }
        self.open.push(pos);

        let (prefix, name) = match qname.find(':') {
            Some(i) if i > 0 => (Some(&qname[..i]), &qname[i + 1..]),
            _ => (None, qname),
        };

        let mut node = Node {
            name: name.to_string(),
            parent,
            ..Node::default()
        };

        if pos == 0 && name != "Envelope" {
            self.fragment = true;
        }

        match (name, self.status) {
            ("Envelope", Status::Outside) if !self.fragment => {
                self.status = Status::Envelope;
                self.saw_envelope = true;
            }
            ("Header", Status::Envelope) => {
                self.root_header = Some(pos);
                self.status = Status::Header;
            }
            ("Body", Status::Envelope) => {
                self.status = Status::Body;
                self.body_position = Some(pos);
            }
            (_, Status::Body) if self.body_position.map(|b| b + 1) == Some(pos) => {
                self.set_root_struct(pos, name);
                node.root_struct = true;
            }
            _ => {}
        }

        let mut attstr = String::new();
        for (key, value) in &attrs {
            let key_prefix = namespaces::prefix(key);
            let key_local = namespaces::local_part(key);

            if key_prefix == Some("xmlns") {
                self.namespaces.register(key_local, value.as_str());
                if self.root_struct_name.as_deref() == Some(name) {
                    self.method_namespace = Some(value.clone());
                }
            } else if key_local == "type" {
                if node.type_name.as_deref() != Some("array") {
                    let value_prefix = namespaces::prefix(value);
                    node.type_name = Some(namespaces::local_part(value).to_string());
                    node.type_namespace = value_prefix.and_then(|p| self.lookup_namespace(p, &attrs));
                }
            } else if key_local == "arrayType" {
                node.type_name = Some("array".to_string());
                node.array = parse_array_type(value).map(|(p, item_type, size, cols)| ArrayInfo {
                    item_ns: self.lookup_namespace(p, &attrs),
                    item_type: item_type.to_string(),
                    size,
                    cols,
                });
            } else if key_local == "nil" {
                node.nil = value == "true" || value == "1";
            } else if !matches!(key.as_str(), "href" | "xmlns" | "id")
                && key_local != "encodingStyle"
                && key_local != "root"
            {
                node.xattrs.push((format!("!{}", key), value.clone()));
            }

            match key.as_str() {
                "xmlns" => self.default_namespace = value.clone(),
                "id" => {
                    self.ids.insert(value.clone(), pos);
                    node.has_id = true;
                }
                "href" => node.href = Some(value.strip_prefix('#').unwrap_or(value).to_string()),
                _ => {}
            }
            if key_local == "root" && value == "1" {
                self.set_root_struct(pos, name);
                node.root_struct = true;
            }
            attstr.push_str(&format!(" {}=\"{}\"", key, expand_entities(value)));
        }

        node.namespace = match prefix {
            Some(p) => self.namespaces.namespace_of(p).unwrap_or_default().to_string(),
            None => self.default_namespace.clone(),
        };

        if self.status == Status::Header {
            if self.root_header != Some(pos) {
                self.raw_headers.push_str(&format!("<{}{}>", qname, attstr));
            }
        } else if self.root_struct.is_some() || self.fragment {
            self.document.push_str(&format!("<{}{}>", qname, attstr));
        }

        self.nodes.push(node);
    }

    fn set_root_struct(&mut self, pos: usize, name: &str) {
        self.status = Status::Method;
        self.root_struct = Some(pos);
        self.root_struct_name = Some(name.to_string());
        debug!(name, pos, "found root struct");
    }

    fn lookup_namespace(&self, prefix: &str, attrs: &[(String, String)]) -> Option<String> {
        if let Some(ns) = self.namespaces.namespace_of(prefix) {
            return Some(ns.to_string());
        }
        let decl = format!("xmlns:{}", prefix);
        attrs.iter().find(|(k, _)| *k == decl).map(|(_, v)| v.clone())
    }

    fn end_element(&mut self, qname: &str) {
        let Some(pos) = self.open.pop() else {
            return;
        };
        let name = namespaces::local_part(qname);

        if self.body_position.map_or(pos > 0, |b| pos > b) {
            self.finish_node(pos);
        }

        if self.status == Status::Header {
            if self.root_header != Some(pos) {
                self.raw_headers.push_str(&format!("</{}>", qname));
            }
        } else if self.fragment || self.root_struct.is_some_and(|r| pos >= r) {
            self.document.push_str(&format!("</{}>", qname));
        }

        if Some(pos) == self.root_struct {
            self.status = Status::Body;
        } else if Some(pos) == self.root_header {
            self.status = Status::Envelope;
        } else if Some(pos) == self.body_position {
            self.status = Status::Envelope;
        } else if name == "Envelope" && self.open.is_empty() && self.status == Status::Envelope {
            self.status = Status::Outside;
        }
    }

    fn finish_node(&mut self, pos: usize) {
        let node = &self.nodes[pos];
        if let Some(id) = node.href.clone() {
            trace!(id = %id, pos, "registering multiref placeholder");
            self.multirefs.entry(id).or_default().push(pos);
            self.mark_pending(pos);
        } else if !node.children.is_empty() {
            if node.pending {
                self.mark_pending(pos);
                return;
            }
            let children = std::mem::take(&mut self.nodes[pos].children);
            let values = children
                .iter()
                .map(|&c| {
                    let child = &mut self.nodes[c];
                    let value = if child.has_id || child.root_struct {
                        child.result.clone()
                    } else {
                        child.result.take()
                    };
                    value.unwrap_or(TypedValue::Null)
                })
                .collect();
            self.nodes[pos].children = children;
            let value = self.build_value(pos, values);
            self.nodes[pos].result = Some(value);
        } else {
            let value = self.leaf_value(pos);
            self.nodes[pos].result = Some(value);
        }
    }

    fn mark_pending(&mut self, pos: usize) {
        self.nodes[pos].pending = true;
        if let Some(parent) = self.nodes[pos].parent {
            self.nodes[parent].pending = true;
        }
    }

    fn character_data(&mut self, data: &str) {
        let Some(&pos) = self.open.last() else {
            return;
        };
        let data = if self.options.decode_utf8 && self.options.encoding == "UTF-8" {
            data.chars()
                .map(|c| if (c as u32) > 0xFF { '?' } else { c })
                .collect()
        } else {
            data.to_string()
        };
        self.nodes[pos].cdata.push_str(&data);
        if self.status == Status::Header {
            self.raw_headers.push_str(&expand_entities(&data));
        } else if self.fragment || (self.root_struct.is_some() && matches!(self.status, Status::Body | Status::Method)) {
            self.document.push_str(&expand_entities(&data));
        }
    }

    /// Compound value of a node from its children's values.
    fn build_value(&self, pos: usize, values: Vec<TypedValue>) -> TypedValue {
        let node = &self.nodes[pos];
        trace!(name = %node.name, pos, "building compound value");
        if let Some(array) = node.array.as_ref() {
            let expected = array.size * array.cols.unwrap_or(1);
            if expected != values.len() {
                debug!(name = %node.name, expected, found = values.len(), "array size differs from arrayType");
            }
        }

        let cols = node.array.as_ref().and_then(|a| a.cols).filter(|&c| c > 0);
        let mut value = if let Some(cols) = cols {
            TypedValue::Sequence(
                values
                    .chunks(cols)
                    .map(|row| TypedValue::Sequence(row.to_vec()))
                    .collect(),
            )
        } else if node.is_array() || node.is_apache("Vector") {
            TypedValue::Sequence(values)
        } else if node.is_apache("Map") {
            TypedValue::Map(values.into_iter().map(key_value_pair).collect())
        } else {
            let mut fields: IndexMap<String, TypedValue> = IndexMap::new();
            let mut folded: HashSet<&str> = HashSet::new();
            for (&child, v) in node.children.iter().zip(values) {
                let child_name = self.nodes[child].name.as_str();
                match fields.get_mut(child_name) {
                    Some(existing) => {
                        if folded.insert(child_name) {
                            let first = std::mem::replace(existing, TypedValue::Null);
                            *existing = TypedValue::Sequence(vec![first]);
                        }
                        if let TypedValue::Sequence(items) = existing {
                            items.push(v);
                        }
                    }
                    None => {
                        fields.insert(child_name.to_string(), v);
                    }
                }
            }
            TypedValue::Struct(fields)
        };

        let simple_content = !node.cdata.trim().is_empty();
        if !node.xattrs.is_empty() || simple_content {
            let mut fields = value.into_fields();
            for (k, v) in &node.xattrs {
                fields.insert(k.clone(), TypedValue::from(v.as_str()));
            }
            if simple_content {
                fields.insert("!".to_string(), self.decode_cdata(pos));
            }
            value = TypedValue::Struct(fields);
        }
        value
    }

    /// Value of an element without child elements.
    fn leaf_value(&self, pos: usize) -> TypedValue {
        let node = &self.nodes[pos];
        if !node.xattrs.is_empty() {
            let mut fields: IndexMap<String, TypedValue> = node
                .xattrs
                .iter()
                .map(|(k, v)| (k.clone(), TypedValue::from(v.as_str())))
                .collect();
            if node.nil {
                fields.insert("!".to_string(), TypedValue::Null);
            } else if !node.cdata.trim().is_empty() {
                fields.insert("!".to_string(), self.decode_cdata(pos));
            }
            return TypedValue::Struct(fields);
        }
        if node.nil {
            return TypedValue::Null;
        }
        if node.root_struct && node.type_name.is_none() {
            return if node.cdata.trim().is_empty() {
                TypedValue::empty_struct()
            } else {
                TypedValue::from(node.cdata.as_str())
            };
        }
        self.decode_cdata(pos)
    }

    fn decode_cdata(&self, pos: usize) -> TypedValue {
        let node = &self.nodes[pos];
        if let Some(t) = &node.type_name {
            return typemap::decode_simple(&node.cdata, t, node.type_namespace.as_deref());
        }
        let parent_array = node
            .parent
            .and_then(|p| self.nodes[p].array.as_ref());
        match parent_array {
            Some(array) => typemap::decode_simple(&node.cdata, &array.item_type, array.item_ns.as_deref()),
            None => TypedValue::from(node.cdata.as_str()),
        }
    }

    fn resolve(&mut self, pos: usize, stack: &mut Vec<String>) -> Result<TypedValue, SoapError> {
        if let Some(v) = &self.nodes[pos].result {
            return Ok(v.clone());
        }
        let value = if let Some(id) = self.nodes[pos].href.clone() {
            self.resolve_id(&id, stack)?
        } else if !self.nodes[pos].children.is_empty() {
            let children = self.nodes[pos].children.clone();
            let mut values = Vec::with_capacity(children.len());
            for child in children {
                values.push(self.resolve(child, stack)?);
            }
            self.build_value(pos, values)
        } else {
            self.leaf_value(pos)
        };
        self.nodes[pos].result = Some(value.clone());
        Ok(value)
    }

    fn resolve_id(&mut self, id: &str, stack: &mut Vec<String>) -> Result<TypedValue, SoapError> {
        if let Some(v) = self.resolved.get(id) {
            return Ok(v.clone());
        }
        if stack.iter().any(|s| s == id) {
            return Err(SoapError::CyclicReference(id.to_string()));
        }
        let Some(&target) = self.ids.get(id) else {
            warn!(id, "href points at an unknown id, leaving placeholder");
            return Ok(TypedValue::from("placeholder"));
        };
        stack.push(id.to_string());
        let value = self.resolve(target, stack)?;
        stack.pop();
        self.resolved.insert(id.to_string(), value.clone());
        Ok(value)
    }

    fn finish(mut self, xml_encoding: Option<String>) -> Result<ParsedMessage, SoapError> {
        let multirefs = std::mem::take(&mut self.multirefs);
        for (id, hrefs) in &multirefs {
            debug!(id = %id, count = hrefs.len(), "resolving multirefs");
            let value = self.resolve_id(id, &mut Vec::new())?;
            for &pos in hrefs {
                self.nodes[pos].result = Some(value.clone());
            }
        }

        let root = match self.root_struct {
            Some(r) => Some(r),
            None if !self.saw_envelope && !self.nodes.is_empty() => Some(0),
            None => None,
        };
        let body = root.map(|r| self.resolve(r, &mut Vec::new())).transpose()?;
        let header = self
            .root_header
            .map(|h| self.resolve(h, &mut Vec::new()))
            .transpose()?;

        debug!(
            root_struct = self.root_struct_name.as_deref().unwrap_or(""),
            nodes = self.nodes.len(),
            "parsed successfully"
        );

        let root_struct_namespace = self
            .root_struct
            .map(|r| self.nodes[r].namespace.clone())
            .filter(|ns| !ns.is_empty());

        Ok(ParsedMessage {
            body,
            header,
            raw_headers: self.raw_headers,
            document: self.document,
            root_struct_name: self.root_struct_name,
            root_struct_namespace,
            method_namespace: self.method_namespace,
            xml_encoding,
        })
    }
}

fn element_parts(
    e: &BytesStart<'_>,
    text: &str,
    reader: &Reader<&[u8]>,
) -> Result<(String, Vec<(String, String)>), SoapError> {
    let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| {
            SoapError::parse_at(text, reader.buffer_position() as usize, err.to_string())
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| SoapError::parse_at(text, reader.buffer_position() as usize, err.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok((qname, attrs))
}

fn key_value_pair(item: TypedValue) -> (TypedValue, TypedValue) {
    let mut parts: Vec<TypedValue> = match item {
        TypedValue::Struct(fields) => fields.into_values().collect(),
        TypedValue::Sequence(items) => items,
        other => vec![other],
    };
    parts.resize(2, TypedValue::Null);
    let value = parts.pop().unwrap_or(TypedValue::Null);
    let key = parts.pop().unwrap_or(TypedValue::Null);
    (key, value)
}

/// Split `prefix:type[rows,cols]`.
fn parse_array_type(value: &str) -> Option<(&str, &str, usize, Option<usize>)> {
    let open = value.find('[')?;
    let close = open + value[open..].find(']')?;
    let (qualifier, item_type) = value[..open].rsplit_once(':')?;

    let prefix_start = qualifier
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
        .last()
        .map(|(i, _)| i)?;
    let prefix = &qualifier[prefix_start..];

    let valid_type = item_type.len() >= 2
        && item_type.starts_with(|c: char| c.is_ascii_alphabetic())
        && item_type.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_type {
        return None;
    }

    let dims = &value[open + 1..close];
    let (rows, cols) = match dims.split_once(',') {
        Some((r, c)) => (r, c),
        None => (dims, ""),
    };
    if rows.is_empty() || !rows.bytes().all(|b| b.is_ascii_digit()) || !cols.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let size = rows.parse().ok()?;
    let cols = if cols.is_empty() { None } else { cols.parse().ok() };
    Some((prefix, item_type, size, cols))
}

/// Compare the XML declaration's encoding with the transport charset.
///
/// Returns the declared encoding. A server that says ISO-8859-1 over HTTP
/// and UTF-8 in the declaration is tolerated.
fn check_charset(xml: &str, http_encoding: &str) -> Result<Option<String>, SoapError> {
    let Some(start) = xml.find("<?xml") else {
        debug!("No XML declaration");
        return Ok(None);
    };
    let end = xml[start..].find("?>").map_or(xml.len(), |e| start + e);
    let decl = &xml[start..end];
    let Some(declared) = declared_encoding(decl) else {
        debug!("No encoding specified in XML declaration");
        return Ok(None);
    };

    let declared_upper = declared.to_ascii_uppercase();
    let http_upper = http_encoding.to_ascii_uppercase();
    if declared_upper != http_upper {
        if http_upper != "ISO-8859-1" || declared_upper != "UTF-8" {
            return Err(SoapError::CharsetMismatch {
                http: http_encoding.to_string(),
                xml: declared.to_string(),
            });
        }
        debug!(http = %http_encoding, xml = %declared, "Charset mismatch tolerated");
    }
    Ok(Some(declared.to_string()))
}

/// Whether the XML declaration at the head of `bytes` names UTF-8.
fn declares_utf8(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(256)];
    let head = String::from_utf8_lossy(head);
    let Some(start) = head.find("<?xml") else {
        return false;
    };
    let end = head[start..].find("?>").map_or(head.len(), |e| start + e);
    declared_encoding(&head[start..end]).is_some_and(|enc| enc.eq_ignore_ascii_case("UTF-8"))
}

fn declared_encoding(decl: &str) -> Option<&str> {
    let rest = &decl[decl.find("encoding=")? + "encoding=".len()..];
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &rest[1..];
    let close = rest.find(quote)?;
    Some(&rest[..close])
}

#[cfg(test)]
mod tests {
    use super::*;

    const RPC_RESPONSE: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/"
                   xmlns:xsd="http://www.w3.org/2001/XMLSchema"
                   xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <SOAP-ENV:Body>
    <ns1:addResponse xmlns:ns1="urn:Calculator">
      <return xsi:type="xsd:int">5</return>
    </ns1:addResponse>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"##;

    const MULTIREF_RESPONSE: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"
                  xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <soapenv:Body>
    <ns1:getPairResponse xmlns:ns1="urn:pairs">
      <first href="#id0"/>
      <second href="#id0"/>
    </ns1:getPairResponse>
    <multiRef id="id0" xsi:type="xsd:string">hello</multiRef>
  </soapenv:Body>
</soapenv:Envelope>"##;

    const HEADER_RESPONSE: &str = r##"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
<SOAP-ENV:Header><t:Session xmlns:t="urn:session">abc &amp; def</t:Session></SOAP-ENV:Header>
<SOAP-ENV:Body><m:pingResponse xmlns:m="urn:ping"><ok>yes</ok></m:pingResponse></SOAP-ENV:Body>
</SOAP-ENV:Envelope>"##;

    fn parse_str(xml: &str) -> ParsedMessage {
        parse(xml.as_bytes(), &ParseOptions::default()).unwrap()
    }

    #[test]
    fn test_parse_rpc_response() {
        let msg = parse_str(RPC_RESPONSE);
        assert_eq!(msg.root_struct_name.as_deref(), Some("addResponse"));
        assert_eq!(msg.method_namespace.as_deref(), Some("urn:Calculator"));
        assert_eq!(msg.root_struct_namespace.as_deref(), Some("urn:Calculator"));
        assert_eq!(msg.xml_encoding.as_deref(), Some("UTF-8"));
        let body = msg.body.unwrap();
        assert_eq!(body.get("return"), Some(&TypedValue::from(5)));
    }

    #[test]
    fn test_document_captures_body_markup() {
        let msg = parse_str(RPC_RESPONSE);
        assert!(msg.document.starts_with("<ns1:addResponse xmlns:ns1=\"urn:Calculator\">"));
        assert!(msg.document.contains("<return xsi:type=\"xsd:int\">5</return>"));
        assert!(msg.document.trim_end().ends_with("</ns1:addResponse>"));
        assert!(!msg.document.contains("Body"));
    }

    #[test]
    fn test_multiref_resolved_at_every_href() {
        let msg = parse_str(MULTIREF_RESPONSE);
        let body = msg.body.unwrap();
        assert_eq!(body.get("first"), Some(&TypedValue::from("hello")));
        assert_eq!(body.get("second"), Some(&TypedValue::from("hello")));
    }

    #[test]
    fn test_multiref_compound_target() {
        let xml = r##"<Envelope><Body>
<m:r xmlns:m="urn:x"><item href="#a"/></m:r>
<p id="a"><name>Ann</name><age xsi:type="xsd:int">7</age></p>
</Body></Envelope>"##;
        let body = parse_str(xml).body.unwrap();
        let item = body.get("item").unwrap();
        assert_eq!(item.get("name"), Some(&TypedValue::from("Ann")));
        assert_eq!(item.get("age"), Some(&TypedValue::from(7)));
        assert!(item.get("!id").is_none());
    }

    #[test]
    fn test_cyclic_href_is_an_error() {
        let xml = r##"<Envelope><Body><m:r xmlns:m="urn:x"><a href="#x"/></m:r>
<node id="x"><next href="#x"/></node></Body></Envelope>"##;
        let err = parse(xml.as_bytes(), &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, SoapError::CyclicReference(ref id) if id == "x"));
    }

    #[test]
    fn test_unknown_href_keeps_placeholder() {
        let xml = r##"<Envelope><Body><m:r xmlns:m="urn:x"><a href="#nope"/></m:r></Body></Envelope>"##;
        let body = parse_str(xml).body.unwrap();
        assert_eq!(body.get("a"), Some(&TypedValue::from("placeholder")));
    }

    #[test]
    fn test_header_value_and_raw_markup() {
        let msg = parse_str(HEADER_RESPONSE);
        assert_eq!(
            msg.raw_headers,
            "<t:Session xmlns:t=\"urn:session\">abc &amp; def</t:Session>"
        );
        let header = msg.header.unwrap();
        assert_eq!(header.get("Session"), Some(&TypedValue::from("abc & def")));
        assert_eq!(msg.body.unwrap().get("ok"), Some(&TypedValue::from("yes")));
    }

    #[test]
    fn test_two_dimensional_array() {
        let xml = r##"<Envelope><Body><m:r xmlns:m="urn:x">
<grid xsi:type="SOAP-ENC:Array" SOAP-ENC:arrayType="xsd:int[2,3]"><item>1</item><item>2</item><item>3</item><item>4</item><item>5</item><item>6</item></grid>
</m:r></Body></Envelope>"##;
        let body = parse_str(xml).body.unwrap();
        let grid = body.get("grid").unwrap();
        assert_eq!(grid, &TypedValue::from(vec![vec![1, 2, 3], vec![4, 5, 6]]));
    }

    #[test]
    fn test_array_items_typed_by_array_type() {
        let xml = r##"<nums xsi:type="SOAP-ENC:Array" SOAP-ENC:arrayType="xsd:boolean[2]"><item>true</item><item>0</item></nums>"##;
        let body = parse_str(xml).body.unwrap();
        assert_eq!(body, TypedValue::from(vec![true, false]));
    }

    #[test]
    fn test_empty_array_decodes_to_empty_sequence() {
        let xml = r##"<r><list xsi:type="SOAP-ENC:Array" SOAP-ENC:arrayType="xsd:int[0]"/></r>"##;
        let body = parse_str(xml).body.unwrap();
        assert_eq!(body.get("list"), Some(&TypedValue::Sequence(vec![])));
    }

    #[test]
    fn test_repeated_names_fold_into_sequence() {
        let xml = r##"<r><x>1</x><y>a</y><x>2</x><x>3</x></r>"##;
        let body = parse_str(xml).body.unwrap();
        assert_eq!(body.get("x"), Some(&TypedValue::from(vec!["1", "2", "3"])));
        assert_eq!(body.get("y"), Some(&TypedValue::from("a")));
    }

    #[test]
    fn test_nil_and_attributes() {
        let xml = r##"<r><a xsi:nil="true"/><price currency="EUR" xsi:type="xsd:double">9.5</price><c lang="en" xsi:nil="1"/></r>"##;
        let body = parse_str(xml).body.unwrap();
        assert_eq!(body.get("a"), Some(&TypedValue::Null));
        let price = body.get("price").unwrap();
        assert_eq!(price.get("!currency"), Some(&TypedValue::from("EUR")));
        assert_eq!(price.get("!"), Some(&TypedValue::from(9.5)));
        assert_eq!(body.get("c").unwrap().get("!"), Some(&TypedValue::Null));
    }

    #[test]
    fn test_apache_map_and_vector() {
        let xml = r##"<r xmlns:apache="http://xml.apache.org/xml-soap">
<m xsi:type="apache:Map"><item><key>a</key><value xsi:type="xsd:int">1</value></item><item><key>b</key><value xsi:type="xsd:int">2</value></item></m>
<v xsi:type="apache:Vector"><e>x</e><e>y</e></v>
</r>"##;
        let body = parse_str(xml).body.unwrap();
        assert_eq!(
            body.get("m"),
            Some(&TypedValue::Map(vec![
                (TypedValue::from("a"), TypedValue::from(1)),
                (TypedValue::from("b"), TypedValue::from(2)),
            ]))
        );
        assert_eq!(body.get("v"), Some(&TypedValue::from(vec!["x", "y"])));
    }

    #[test]
    fn test_root_attribute_selects_root_struct() {
        let xml = r##"<Envelope><Body><helper id="h">ignored</helper><m:real xmlns:m="urn:x" root="1"><v>1</v></m:real></Body></Envelope>"##;
        let msg = parse_str(xml);
        assert_eq!(msg.root_struct_name.as_deref(), Some("real"));
        assert_eq!(msg.body.unwrap().get("v"), Some(&TypedValue::from("1")));
    }

    #[test]
    fn test_empty_root_struct() {
        let xml = r##"<Envelope><Body><m:voidResponse xmlns:m="urn:x"/></Body></Envelope>"##;
        assert_eq!(parse_str(xml).body, Some(TypedValue::empty_struct()));
    }

    #[test]
    fn test_older_schema_declaration() {
        let xml = r##"<Envelope xmlns:xsd="http://www.w3.org/1999/XMLSchema"><Body><m:r xmlns:m="urn:x"><n xsi:type="xsd:int">3</n></m:r></Body></Envelope>"##;
        assert_eq!(parse_str(xml).body.unwrap().get("n"), Some(&TypedValue::from(3)));
    }

    #[test]
    fn test_empty_input() {
        let err = parse(b"", &ParseOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "xml was empty, didn't parse!");
    }

    #[test]
    fn test_malformed_xml_reports_line() {
        let xml = "<Envelope>\n<Body>\n<a></b>\n</Body></Envelope>";
        let err = parse(xml.as_bytes(), &ParseOptions::default()).unwrap_err();
        match err {
            SoapError::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_document() {
        let err = parse(b"<Envelope><Body>", &ParseOptions::default()).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_doctype_rejected() {
        let xml = r##"<?xml version="1.0"?><!DOCTYPE foo [<!ENTITY x "y">]><Envelope/>"##;
        assert!(parse(xml.as_bytes(), &ParseOptions::default()).is_err());
    }

    #[test]
    fn test_charset_mismatch() {
        let xml = r##"<?xml version="1.0" encoding="UTF-8"?><r/>"##;
        let err = parse(xml.as_bytes(), &ParseOptions::with_encoding("US-ASCII")).unwrap_err();
        assert!(matches!(err, SoapError::CharsetMismatch { .. }));

        // ISO-8859-1 over HTTP with a UTF-8 declaration is tolerated
        assert!(parse(xml.as_bytes(), &ParseOptions::with_encoding("ISO-8859-1")).is_ok());
    }

    #[test]
    fn test_latin1_bytes() {
        let mut bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r><n>caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"</n></r>");
        let msg = parse(&bytes, &ParseOptions::with_encoding("ISO-8859-1")).unwrap();
        assert_eq!(msg.body.unwrap().get("n"), Some(&TypedValue::from("café")));
    }

    #[test]
    fn test_decode_utf8_maps_wide_chars() {
        let xml = "<r><n>é€</n></r>";
        let options = ParseOptions {
            encoding: "UTF-8".to_string(),
            decode_utf8: true,
            ..ParseOptions::default()
        };
        let msg = parse(xml.as_bytes(), &options).unwrap();
        assert_eq!(msg.body.unwrap().get("n"), Some(&TypedValue::from("é?")));
    }

    #[test]
    fn test_latin1_transport_maps_every_byte() {
        let bytes = b"<r><n>\xC3\xA9</n></r>";
        let msg = parse(bytes, &ParseOptions::with_encoding("ISO-8859-1")).unwrap();
        assert_eq!(msg.body.unwrap().get("n"), Some(&TypedValue::from("\u{C3}\u{A9}")));

        let mut declared = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>".to_vec();
        declared.extend_from_slice(bytes);
        let msg = parse(&declared, &ParseOptions::with_encoding("ISO-8859-1")).unwrap();
        assert_eq!(msg.body.unwrap().get("n"), Some(&TypedValue::from("é")));
    }

    #[test]
    fn test_no_document_element() {
        for input in ["   ", "hello world", r##"<?xml version="1.0"?>"##, "<!-- nothing -->"] {
            let err = parse(input.as_bytes(), &ParseOptions::default()).unwrap_err();
            assert!(err.is_parse(), "{input:?} gave {err:?}");
        }
    }

    #[test]
    fn test_junk_after_document_element() {
        for input in ["<a/><b/>", "<a>1</a>tail", "text<a/>"] {
            let err = parse(input.as_bytes(), &ParseOptions::default()).unwrap_err();
            assert!(err.is_parse(), "{input:?} gave {err:?}");
        }
        assert!(parse(b"<a>1</a>\n  ", &ParseOptions::default()).is_ok());
    }

    #[test]
    fn test_nesting_past_max_depth() {
        let depth = 5000;
        let xml = format!("{}x{}", "<a>".repeat(depth), "</a>".repeat(depth));
        let err = parse(xml.as_bytes(), &ParseOptions::default()).unwrap_err();
        match err {
            SoapError::Parse { message, .. } => {
                assert!(message.contains("maximum depth of 128"), "{message}")
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let options = ParseOptions {
            max_depth: 3,
            ..ParseOptions::default()
        };
        assert!(parse(RPC_RESPONSE.as_bytes(), &options).unwrap_err().is_parse());
        let options = ParseOptions {
            max_depth: 4,
            ..ParseOptions::default()
        };
        assert!(parse(RPC_RESPONSE.as_bytes(), &options).is_ok());
    }

    #[test]
    fn test_nesting_within_max_depth() {
        let depth = 100;
        let xml = format!("{}x{}", "<a>".repeat(depth), "</a>".repeat(depth));
        let mut value = parse_str(&xml).body.unwrap();
        for _ in 1..depth {
            value = value.get("a").cloned().unwrap();
        }
        assert_eq!(value, TypedValue::from("x"));
    }

    #[test]
    fn test_message_past_max_size() {
        let options = ParseOptions {
            max_size: 64,
            ..ParseOptions::default()
        };
        let err = parse(RPC_RESPONSE.as_bytes(), &options).unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("exceeds maximum size of 64"));
    }

    #[test]
    fn test_wide_struct_keeps_every_field() {
        let fields: String = (0..2000).map(|i| format!("<f{i}><v>{i}</v></f{i}>")).collect();
        let xml = format!(r##"<Envelope><Body><m:r xmlns:m="urn:x">{fields}</m:r></Body></Envelope>"##);
        let body = parse_str(&xml).body.unwrap();
        assert_eq!(body.get("f0").and_then(|f| f.get("v")), Some(&TypedValue::from("0")));
        assert_eq!(body.get("f1999").and_then(|f| f.get("v")), Some(&TypedValue::from("1999")));
    }

    #[test]
    fn test_href_to_nested_id() {
        let xml = r##"<Envelope><Body>
<m:r xmlns:m="urn:x"><a href="#inner"/><b href="#outer"/></m:r>
<multiRef id="outer"><holder><item id="inner">deep</item></holder></multiRef>
</Body></Envelope>"##;
        let body = parse_str(xml).body.unwrap();
        assert_eq!(body.get("a"), Some(&TypedValue::from("deep")));
        let holder = body.get("b").and_then(|b| b.get("holder")).unwrap();
        assert_eq!(holder.get("item"), Some(&TypedValue::from("deep")));
    }

    #[test]
    fn test_fragment_document_mirrors_markup() {
        let xml = r##"<wrapper kind="x"><text>a &amp; b</text><n>1</n></wrapper>"##;
        let msg = parse_str(xml);
        assert_eq!(msg.document, xml);
        assert!(msg.root_struct_name.is_none());
    }

    #[test]
    fn test_body_field_inside_multiref() {
        let xml = r##"<Envelope><Body>
<m:r xmlns:m="urn:x"><item href="#id0"/></m:r>
<multiRef id="id0"><Body>inner</Body><note>after</note></multiRef>
</Body></Envelope>"##;
        let msg = parse_str(xml);
        assert!(msg.document.contains("<Body>inner</Body><note>after</note>"), "{}", msg.document);
        let item = msg.body.unwrap().get("item").cloned().unwrap();
        assert_eq!(item.get("Body"), Some(&TypedValue::from("inner")));
        assert_eq!(item.get("note"), Some(&TypedValue::from("after")));
    }

    #[test]
    fn test_parse_array_type() {
        assert_eq!(parse_array_type("xsd:int[3]"), Some(("xsd", "int", 3, None)));
        assert_eq!(parse_array_type("xsd:int[2,3]"), Some(("xsd", "int", 2, Some(3))));
        assert_eq!(parse_array_type("ns1:ArrayOfString[1]"), Some(("ns1", "ArrayOfString", 1, None)));
        assert_eq!(parse_array_type("int[3]"), None);
        assert_eq!(parse_array_type("xsd:int[]"), None);
    }
}
