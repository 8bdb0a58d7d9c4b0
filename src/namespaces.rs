//! Prefix/namespace table and QName helpers.

use indexmap::IndexMap;

use crate::typemap::{self, SOAP_ENC, XSD_2001};

/// SOAP 1.1 envelope namespace.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// SOAP 1.2 envelope namespace.
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// Prefix-to-URI table seeded with the SOAP and XML Schema namespaces.
///
/// Tracks which prefixes were looked up by namespace so callers can emit
/// only the declarations they actually used.
#[derive(Debug, Clone)]
pub struct NamespaceTable {
    entries: IndexMap<String, String>,
    used: IndexMap<String, String>,
    xsd: String,
}

impl Default for NamespaceTable {
    fn default() -> Self {
        Self::with_schema(XSD_2001)
    }
}

impl NamespaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded for a given XML Schema version.
    pub fn with_schema(xsd: &str) -> Self {
        let mut entries = IndexMap::new();
        entries.insert("SOAP-ENV".to_string(), SOAP_11_NS.to_string());
        entries.insert("xsd".to_string(), xsd.to_string());
        entries.insert("xsi".to_string(), format!("{}-instance", xsd));
        entries.insert("SOAP-ENC".to_string(), SOAP_ENC.to_string());
        Self {
            entries,
            used: IndexMap::new(),
            xsd: xsd.to_string(),
        }
    }

    /// Current XML Schema namespace.
    pub fn xsd_namespace(&self) -> &str {
        &self.xsd
    }

    /// Switch the `xsd`/`xsi` entries to another schema version.
    pub fn set_schema_version(&mut self, xsd: &str) {
        self.xsd = xsd.to_string();
        self.entries.insert("xsd".to_string(), xsd.to_string());
        self.entries.insert("xsi".to_string(), format!("{}-instance", xsd));
    }

    /// Register a prefix. A schema URI also switches the schema version.
    pub fn register(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let uri = uri.into();
        if typemap::is_schema_namespace(&uri) {
            self.set_schema_version(&uri);
        }
        self.entries.insert(prefix.into(), uri);
    }

    pub fn namespace_of(&self, prefix: &str) -> Option<&str> {
        self.entries.get(prefix).map(String::as_str)
    }

    /// Prefix bound to `ns`; `ns` may also be a prefix itself.
    pub fn prefix_of(&mut self, ns: &str) -> Option<String> {
        let (prefix, uri) = self
            .entries
            .iter()
            .find(|(p, n)| n.as_str() == ns || p.as_str() == ns)?;
        let (prefix, uri) = (prefix.clone(), uri.clone());
        self.used.insert(prefix.clone(), uri);
        Some(prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, n)| (p.as_str(), n.as_str()))
    }

    /// Namespaces resolved through [`NamespaceTable::prefix_of`].
    pub fn used(&self) -> impl Iterator<Item = (&str, &str)> {
        self.used.iter().map(|(p, n)| (p.as_str(), n.as_str()))
    }

    /// Replace a known prefix with its namespace URI.
    pub fn expand_qname(&self, qname: &str) -> String {
        if qname.starts_with("http://") {
            return qname.to_string();
        }
        match qname.find(':') {
            Some(pos) if pos > 0 => {
                let (prefix, name) = (&qname[..pos], &qname[pos + 1..]);
                match self.entries.get(prefix) {
                    Some(ns) => format!("{}:{}", ns, name),
                    None => qname.to_string(),
                }
            }
            _ => qname.to_string(),
        }
    }

    /// Replace a namespace URI with its registered prefix.
    pub fn contract_qname(&mut self, qname: &str) -> String {
        match qname.rfind(':') {
            Some(pos) if pos > 0 => {
                let (ns, name) = (&qname[..pos], &qname[pos + 1..]);
                match self.prefix_of(ns) {
                    Some(p) => format!("{}:{}", p, name),
                    None => qname.to_string(),
                }
            }
            _ => qname.to_string(),
        }
    }
}

/// Part after the last colon, or the whole string.
pub fn local_part(qname: &str) -> &str {
    match qname.rfind(':') {
        Some(pos) => &qname[pos + 1..],
        None => qname,
    }
}

/// Part before the last colon, if any.
pub fn prefix(qname: &str) -> Option<&str> {
    match qname.rfind(':') {
        Some(pos) if pos > 0 => Some(&qname[..pos]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typemap::XSD_1999;

    #[test]
    fn test_default_table() {
        let table = NamespaceTable::new();
        assert_eq!(table.namespace_of("SOAP-ENV"), Some(SOAP_11_NS));
        assert_eq!(table.namespace_of("xsi"), Some("http://www.w3.org/2001/XMLSchema-instance"));
        assert_eq!(table.xsd_namespace(), XSD_2001);
    }

    #[test]
    fn test_register_older_schema_switches_version() {
        let mut table = NamespaceTable::new();
        table.register("xsd1", XSD_1999);
        assert_eq!(table.xsd_namespace(), XSD_1999);
        assert_eq!(table.namespace_of("xsi"), Some("http://www.w3.org/1999/XMLSchema-instance"));
    }

    #[test]
    fn test_prefix_lookup_records_usage() {
        let mut table = NamespaceTable::new();
        table.register("tns", "urn:Calculator");
        assert_eq!(table.prefix_of("urn:Calculator").as_deref(), Some("tns"));
        assert_eq!(table.prefix_of("xsd").as_deref(), Some("xsd"));
        assert_eq!(table.prefix_of("urn:missing"), None);
        let used: Vec<_> = table.used().map(|(p, _)| p.to_string()).collect();
        assert_eq!(used, vec!["tns", "xsd"]);
    }

    #[test]
    fn test_qname_expand_and_contract() {
        let mut table = NamespaceTable::new();
        assert_eq!(table.expand_qname("xsd:int"), format!("{}:int", XSD_2001));
        assert_eq!(table.expand_qname("foo:int"), "foo:int");
        assert_eq!(table.expand_qname("http://x/y"), "http://x/y");
        assert_eq!(table.contract_qname(&format!("{}:string", XSD_2001)), "xsd:string");
        assert_eq!(table.contract_qname("plain"), "plain");
    }

    #[test]
    fn test_local_part_and_prefix() {
        assert_eq!(local_part("ns1:getQuote"), "getQuote");
        assert_eq!(local_part("getQuote"), "getQuote");
        assert_eq!(prefix("ns1:getQuote"), Some("ns1"));
        assert_eq!(prefix(":x"), None);
        assert_eq!(prefix("x"), None);
    }
}
