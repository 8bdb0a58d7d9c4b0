//! XSD type knowledge: the namespace-keyed type table, scalar decoding and
//! ISO-8601 conversions.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

use crate::value::{Scalar, TypedValue};

/// XML Schema 2001 namespace.
pub const XSD_2001: &str = "http://www.w3.org/2001/XMLSchema";
/// XML Schema 2000/10 namespace.
pub const XSD_2000_10: &str = "http://www.w3.org/2000/10/XMLSchema";
/// XML Schema 1999 namespace.
pub const XSD_1999: &str = "http://www.w3.org/1999/XMLSchema";
/// SOAP 1.1 encoding namespace.
pub const SOAP_ENC: &str = "http://schemas.xmlsoap.org/soap/encoding/";
/// SOAP interop test namespace.
pub const SOAP_INTEROP: &str = "http://soapinterop.org/xsd";
/// Apache SOAP namespace (Map, Vector).
pub const APACHE_SOAP: &str = "http://xml.apache.org/xml-soap";

/// Broad kind a schema type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XsdKind {
    String,
    Boolean,
    Integer,
    Double,
    Array,
    Struct,
    /// Known to the schema but without a native mapping.
    Unmapped,
}

type Table = &'static [(&'static str, XsdKind)];

const XSD_2001_TYPES: Table = &[
    ("string", XsdKind::String),
    ("boolean", XsdKind::Boolean),
    ("float", XsdKind::Double),
    ("double", XsdKind::Double),
    ("decimal", XsdKind::Double),
    ("duration", XsdKind::Unmapped),
    ("dateTime", XsdKind::String),
    ("time", XsdKind::String),
    ("date", XsdKind::String),
    ("gYearMonth", XsdKind::Unmapped),
    ("gYear", XsdKind::Unmapped),
    ("gMonthDay", XsdKind::Unmapped),
    ("gDay", XsdKind::Unmapped),
    ("gMonth", XsdKind::Unmapped),
    ("hexBinary", XsdKind::String),
    ("base64Binary", XsdKind::String),
    ("anyType", XsdKind::String),
    ("anySimpleType", XsdKind::String),
    ("normalizedString", XsdKind::String),
    ("token", XsdKind::String),
    ("language", XsdKind::Unmapped),
    ("NMTOKEN", XsdKind::Unmapped),
    ("NMTOKENS", XsdKind::Unmapped),
    ("Name", XsdKind::Unmapped),
    ("NCName", XsdKind::Unmapped),
    ("ID", XsdKind::Unmapped),
    ("IDREF", XsdKind::Unmapped),
    ("IDREFS", XsdKind::Unmapped),
    ("ENTITY", XsdKind::Unmapped),
    ("ENTITIES", XsdKind::Unmapped),
    ("integer", XsdKind::Integer),
    ("nonPositiveInteger", XsdKind::Integer),
    ("negativeInteger", XsdKind::Integer),
    ("long", XsdKind::Integer),
    ("int", XsdKind::Integer),
    ("short", XsdKind::Integer),
    ("byte", XsdKind::Integer),
    ("nonNegativeInteger", XsdKind::Integer),
    ("unsignedLong", XsdKind::Unmapped),
    ("unsignedInt", XsdKind::Unmapped),
    ("unsignedShort", XsdKind::Unmapped),
    ("unsignedByte", XsdKind::Unmapped),
    ("positiveInteger", XsdKind::Unmapped),
];

// 1999 and 2000/10 drafts share one table.
const XSD_DRAFT_TYPES: Table = &[
    ("i4", XsdKind::Unmapped),
    ("int", XsdKind::Integer),
    ("boolean", XsdKind::Boolean),
    ("string", XsdKind::String),
    ("double", XsdKind::Double),
    ("float", XsdKind::Double),
    ("dateTime", XsdKind::String),
    ("timeInstant", XsdKind::String),
    ("base64Binary", XsdKind::String),
    ("base64", XsdKind::String),
    ("ur-type", XsdKind::Array),
];

const SOAP_INTEROP_TYPES: Table = &[("SOAPStruct", XsdKind::Struct)];

const SOAP_ENC_TYPES: Table = &[
    ("base64", XsdKind::String),
    ("array", XsdKind::Array),
    ("Array", XsdKind::Array),
];

const APACHE_TYPES: Table = &[("Map", XsdKind::Unmapped)];

fn table(namespace: &str) -> Option<Table> {
    match namespace {
        XSD_2001 => Some(XSD_2001_TYPES),
        XSD_2000_10 | XSD_1999 => Some(XSD_DRAFT_TYPES),
        SOAP_INTEROP => Some(SOAP_INTEROP_TYPES),
        SOAP_ENC => Some(SOAP_ENC_TYPES),
        APACHE_SOAP => Some(APACHE_TYPES),
        _ => None,
    }
}

/// Look up the kind of `type_name` in `namespace`.
pub fn lookup(namespace: &str, type_name: &str) -> Option<XsdKind> {
    table(namespace)?
        .iter()
        .find(|(name, _)| *name == type_name)
        .map(|(_, kind)| *kind)
}

/// Whether `type_name` is a type the schema namespace knows about.
pub fn is_builtin(namespace: &str, type_name: &str) -> bool {
    lookup(namespace, type_name).is_some()
}

/// Whether `uri` names one of the XML Schema versions.
pub fn is_schema_namespace(uri: &str) -> bool {
    uri.strip_prefix("http://www.w3.org/")
        .and_then(|rest| rest.split_once('/'))
        .map(|(year, tail)| {
            year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()) && tail == "XMLSchema"
        })
        .unwrap_or(false)
}

/// Decode character data into a scalar according to its schema type.
///
/// `type_name` is the local part of the type; the namespace is accepted
/// for future disambiguation and currently ignored.
pub fn decode_simple(value: &str, type_name: &str, _type_ns: Option<&str>) -> TypedValue {
    match type_name {
        "" | "string" => TypedValue::from(value),
        "long" | "unsignedLong" => match value.trim().parse::<i64>() {
            Ok(n) => TypedValue::from(n),
            Err(_) => TypedValue::from(value),
        },
        "int" | "integer" | "short" | "byte" | "nonPositiveInteger" | "negativeInteger"
        | "nonNegativeInteger" | "positiveInteger" | "unsignedInt" | "unsignedShort"
        | "unsignedByte" => TypedValue::from(lenient_int(value)),
        "float" | "double" | "decimal" => TypedValue::from(lenient_float(value)),
        "boolean" => TypedValue::from(lenient_bool(value)),
        "base64" | "base64Binary" => match STANDARD.decode(strip_whitespace(value)) {
            Ok(bytes) => TypedValue::from(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                warn!(error = %e, "Invalid base64 content, keeping raw text");
                TypedValue::from(value)
            }
        },
        // an array with no items arrives as a simple type
        "array" | "Array" => TypedValue::Sequence(Vec::new()),
        _ => TypedValue::from(value),
    }
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Integer conversion that accepts a numeric prefix and falls back to 0.
pub fn lenient_int(value: &str) -> i64 {
    let trimmed = value.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return n;
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            return f.trunc() as i64;
        }
    }
    let mut end = 0;
    for (i, c) in trimmed.char_indices() {
        if c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    trimmed[..end].parse::<i64>().unwrap_or(0)
}

/// Float conversion that accepts a numeric prefix and falls back to 0.0.
pub fn lenient_float(value: &str) -> f64 {
    let trimmed = value.trim();
    match trimmed {
        "INF" => return f64::INFINITY,
        "-INF" => return f64::NEG_INFINITY,
        "NaN" => return f64::NAN,
        _ => {}
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return f;
    }
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in trimmed.char_indices() {
        let ok = c.is_ascii_digit()
            || (i == 0 && (c == '-' || c == '+'))
            || (c == '.' && !std::mem::replace(&mut seen_dot, true));
        if !ok {
            break;
        }
        end = i + c.len_utf8();
    }
    trimmed[..end].parse::<f64>().unwrap_or(0.0)
}

/// `false` and `f` are false in any case; otherwise empty and `0` are false.
pub fn lenient_bool(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    if lower == "false" || lower == "f" {
        return false;
    }
    !(value.is_empty() || value == "0")
}

/// Format a Unix timestamp as an ISO-8601 dateTime.
///
/// With `utc` the result carries a `Z` designator, otherwise the local
/// offset is written out.
pub fn timestamp_to_iso8601(timestamp: i64, utc: bool) -> Option<String> {
    let dt = Utc.timestamp_opt(timestamp, 0).single()?;
    if utc {
        Some(dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
    } else {
        let local = dt.with_timezone(&chrono::Local);
        Some(local.format("%Y-%m-%dT%H:%M:%S%:z").to_string())
    }
}

/// Parse an ISO-8601 dateTime into a Unix timestamp.
///
/// Accepts `Z`, `+hh:mm` and `+hhmm` offsets, and fractional seconds.
/// A dateTime without offset is taken as UTC.
pub fn iso8601_to_timestamp(datestr: &str) -> Option<i64> {
    let s = datestr.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(s, fmt) {
            return Some(dt.timestamp());
        }
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().timestamp())
}

/// Native scalar kind name used for array item typing.
pub(crate) fn scalar_kind_name(scalar: &Scalar) -> &'static str {
    match scalar {
        Scalar::Bool(_) => "boolean",
        Scalar::Int(_) => "integer",
        Scalar::Float(_) => "double",
        Scalar::String(_) => "string",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_2001() {
        assert_eq!(lookup(XSD_2001, "int"), Some(XsdKind::Integer));
        assert_eq!(lookup(XSD_2001, "float"), Some(XsdKind::Double));
        assert_eq!(lookup(XSD_2001, "positiveInteger"), Some(XsdKind::Unmapped));
        assert!(is_builtin(XSD_2001, "anyType"));
        assert!(!is_builtin(XSD_2001, "SOAPStruct"));
        assert!(!is_builtin("urn:unknown", "int"));
    }

    #[test]
    fn test_lookup_drafts_and_extras() {
        assert_eq!(lookup(XSD_1999, "ur-type"), Some(XsdKind::Array));
        assert_eq!(lookup(XSD_2000_10, "timeInstant"), Some(XsdKind::String));
        assert_eq!(lookup(SOAP_INTEROP, "SOAPStruct"), Some(XsdKind::Struct));
        assert_eq!(lookup(SOAP_ENC, "Array"), Some(XsdKind::Array));
        assert!(is_builtin(APACHE_SOAP, "Map"));
    }

    #[test]
    fn test_schema_namespace_detection() {
        assert!(is_schema_namespace(XSD_2001));
        assert!(is_schema_namespace(XSD_1999));
        assert!(!is_schema_namespace("http://www.w3.org/2001/XMLSchema-instance"));
        assert!(!is_schema_namespace(SOAP_ENC));
    }

    #[test]
    fn test_decode_simple_table() {
        assert_eq!(decode_simple("42", "int", None), TypedValue::from(42));
        assert_eq!(decode_simple("F", "boolean", None), TypedValue::from(false));
        assert_eq!(decode_simple("false", "boolean", None), TypedValue::from(false));
        assert_eq!(decode_simple("yes", "boolean", None), TypedValue::from(true));
        assert_eq!(decode_simple("0", "boolean", None), TypedValue::from(false));
        assert_eq!(decode_simple("aGk=", "base64Binary", None), TypedValue::from("hi"));
        assert_eq!(decode_simple("", "array", None), TypedValue::Sequence(vec![]));
        assert_eq!(decode_simple("3.5", "double", None), TypedValue::from(3.5));
        assert_eq!(decode_simple("007", "string", None), TypedValue::from("007"));
        assert_eq!(decode_simple("12", "unsignedByte", None), TypedValue::from(12));
        assert_eq!(decode_simple("abc", "dateTime", None), TypedValue::from("abc"));
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn test_decode_simple_literals() {
        assert_eq!(decode_simple("true", "boolean", None), TypedValue::from(true));
        assert_eq!(decode_simple("3.14", "float", None), TypedValue::from(3.14));
        assert_eq!(decode_simple("3.14", "float", None).as_f64(), Some(3.14));
        assert_eq!(decode_simple("42", "int", None), TypedValue::from(42));
        assert_eq!(decode_simple("x", "unknownType", None), TypedValue::from("x"));
    }

    #[test]
    fn test_decode_long_keeps_oversized_text() {
        assert_eq!(decode_simple("9000000000", "long", None), TypedValue::from(9_000_000_000i64));
        assert_eq!(
            decode_simple("18446744073709551615", "unsignedLong", None),
            TypedValue::from("18446744073709551615")
        );
    }

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(lenient_int(" 17 "), 17);
        assert_eq!(lenient_int("12abc"), 12);
        assert_eq!(lenient_int("abc"), 0);
        assert_eq!(lenient_int("1e3"), 1000);
        assert_eq!(lenient_float("2.5kg"), 2.5);
        assert_eq!(lenient_float("x"), 0.0);
        assert!(lenient_float("INF").is_infinite());
    }

    #[test]
    fn test_iso8601_roundtrip_utc() {
        let iso = timestamp_to_iso8601(0, true).unwrap();
        assert_eq!(iso, "1970-01-01T00:00:00Z");
        assert_eq!(iso8601_to_timestamp(&iso), Some(0));
    }

    #[test]
    fn test_iso8601_offsets() {
        assert_eq!(iso8601_to_timestamp("2001-10-26T21:32:52+02:00"), Some(1004124772));
        assert_eq!(iso8601_to_timestamp("2001-10-26T19:32:52.25Z"), Some(1004124772));
        assert_eq!(iso8601_to_timestamp("2001-10-26T19:32:52"), Some(1004124772));
        assert_eq!(iso8601_to_timestamp("not a date"), None);
    }
}
