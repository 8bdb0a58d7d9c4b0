//! Source generation from operation metadata.
//!
//! [`proxy_source`] renders a typed Rust wrapper with one method per
//! operation; [`describe_as_text`] renders a plain-text API listing.

use indexmap::IndexMap;
use std::fmt::Write;

use crate::wsdl::{MessageDescriptor, OperationDescriptor};

/// Namespace used by generated calls whose input declares none.
pub const DEFAULT_PROXY_NAMESPACE: &str = "http://testuri.com";

const KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "crate", "else", "enum", "extern", "false", "fn", "for", "if", "impl", "in",
    "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return", "static", "struct", "trait", "true",
    "type", "unsafe", "use", "where", "while", "async", "await", "dyn", "abstract", "become", "box", "do", "final",
    "macro", "override", "priv", "typeof", "unsized", "virtual", "yield", "try",
];

/// Rust source of a proxy struct wrapping `SoapClient::call`.
pub fn proxy_source(operations: &IndexMap<String, OperationDescriptor>, struct_name: &str) -> String {
    let struct_name = type_ident(struct_name);
    let mut out = String::new();

    let _ = writeln!(out, "// Generated by zentinel-soap {}.", env!("CARGO_PKG_VERSION"));
    out.push_str("use zentinel_soap::transport::Transport;\n");
    out.push_str("use zentinel_soap::{CallOptions, Params, SoapClient, SoapError, TypedValue};\n\n");
    let _ = writeln!(out, "pub struct {}<T: Transport> {{", struct_name);
    out.push_str("    pub client: SoapClient<T>,\n}\n\n");
    let _ = writeln!(out, "impl<T: Transport> {}<T> {{", struct_name);
    out.push_str("    pub fn new(client: SoapClient<T>) -> Self {\n        Self { client }\n    }\n");

    for op in operations.values() {
        out.push('\n');
        let _ = writeln!(out, "    /// {}", signature_comment(&op.input));
        if let Some(doc) = op.documentation.as_deref().filter(|d| !d.trim().is_empty()) {
            for line in doc.lines() {
                let _ = writeln!(out, "    /// {}", line.trim());
            }
        }

        let args: Vec<(String, &str)> = op
            .input
            .parts
            .iter()
            .map(|p| (value_ident(&p.name), p.name.as_str()))
            .collect();
        let mut signature = String::from("&mut self");
        for (ident, _) in &args {
            let _ = write!(signature, ", {}: impl Into<TypedValue>", ident);
        }
        let _ = writeln!(
            out,
            "    pub fn {}({}) -> Result<TypedValue, SoapError> {{",
            method_ident(&op.name),
            signature
        );

        if args.is_empty() {
            out.push_str("        let params = Params::none();\n");
        } else {
            out.push_str("        let params = Params::Values(vec![\n");
            for (ident, name) in &args {
                let _ = writeln!(out, "            ({:?}.to_string(), {}.into()),", name, ident);
            }
            out.push_str("        ]);\n");
        }

        let namespace = op.input.namespace.as_deref().unwrap_or(DEFAULT_PROXY_NAMESPACE);
        let _ = writeln!(
            out,
            "        let options = CallOptions::new().namespace({:?}).soap_action({:?});",
            namespace, op.soap_action
        );
        let _ = writeln!(out, "        self.client.call({:?}, params, options)", op.name);
        out.push_str("    }\n");
    }

    out.push_str("}\n");
    out
}

/// Human-readable listing of the operations and their messages.
pub fn describe_as_text(operations: &IndexMap<String, OperationDescriptor>) -> String {
    let mut out = String::new();
    for op in operations.values() {
        let _ = write!(out, "\n-------------------------------\nmethod: {}\n", op.name);
        if let Some(doc) = op.documentation.as_deref().filter(|d| !d.trim().is_empty()) {
            let _ = writeln!(out, "documentation: {}", doc.trim());
        }
        let _ = writeln!(out, "style: {}, use: {}", op.style, op.input.use_);
        if !op.soap_action.is_empty() {
            let _ = writeln!(out, "soapAction: {}", op.soap_action);
        }
        out.push_str("\ninput:\n");
        describe_message(&mut out, &op.input);
        out.push_str("\noutput:\n");
        describe_message(&mut out, &op.output);
        out.push('\n');
    }
    out
}

fn describe_message(out: &mut String, message: &MessageDescriptor) {
    if message.parts.is_empty() {
        out.push_str("  void\n");
        return;
    }
    for part in &message.parts {
        let _ = writeln!(out, "  {} ({})", part.name, display_type(&part.type_name));
    }
}

fn display_type(type_name: &str) -> &str {
    if type_name.is_empty() {
        "anyType"
    } else {
        type_name
    }
}

/// `xsd:int a, xsd:string b`, or `void` without parts.
fn signature_comment(message: &MessageDescriptor) -> String {
    if message.parts.is_empty() {
        return "void".to_string();
    }
    message
        .parts
        .iter()
        .map(|p| format!("{} {}", display_type(&p.type_name), p.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Method name: dots become `__`, then snake case.
fn method_ident(operation: &str) -> String {
    value_ident(&operation.replace('.', "__"))
}

fn value_ident(name: &str) -> String {
    let mut ident = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                ident.push('_');
            }
            ident.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() || c == '_' {
            ident.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            ident.push('_');
            prev_lower = false;
        }
    }
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if ident == "self" || ident == "super" {
        ident.push('_');
    } else if KEYWORDS.contains(&ident.as_str()) {
        ident.insert_str(0, "r#");
    }
    ident
}

fn type_ident(name: &str) -> String {
    let mut ident = String::new();
    let mut upper_next = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if upper_next {
                ident.push(c.to_ascii_uppercase());
            } else {
                ident.push(c);
            }
            upper_next = false;
        } else {
            upper_next = true;
        }
    }
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert_str(0, "Proxy");
    }
    ident
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wsdl::PartDescriptor;

    fn part(name: &str, type_name: &str) -> PartDescriptor {
        PartDescriptor {
            name: name.to_string(),
            type_name: type_name.to_string(),
        }
    }

    fn operations() -> IndexMap<String, OperationDescriptor> {
        let mut ops = IndexMap::new();
        let mut add = OperationDescriptor {
            name: "Calc.addNumbers".to_string(),
            soap_action: "urn:calc#add".to_string(),
            documentation: Some("Adds two numbers".to_string()),
            ..OperationDescriptor::default()
        };
        add.input.namespace = Some("urn:calc".to_string());
        add.input.parts = vec![part("firstValue", "xsd:int"), part("type", "xsd:int")];
        add.output.parts = vec![part("return", "xsd:int")];
        ops.insert(add.name.clone(), add);
        let ping = OperationDescriptor {
            name: "ping".to_string(),
            ..OperationDescriptor::default()
        };
        ops.insert(ping.name.clone(), ping);
        ops
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(method_ident("Calc.addNumbers"), "calc__add_numbers");
        assert_eq!(value_ident("getQuote"), "get_quote");
        assert_eq!(value_ident("type"), "r#type");
        assert_eq!(value_ident("self"), "self_");
        assert_eq!(value_ident("1st"), "_1st");
        assert_eq!(value_ident("item-id"), "item_id");
        assert_eq!(type_ident("calculator service"), "CalculatorService");
        assert_eq!(type_ident(""), "Proxy");
    }

    #[test]
    fn test_proxy_source() {
        let src = proxy_source(&operations(), "CalcProxy");
        assert!(src.contains("pub struct CalcProxy<T: Transport> {"));
        assert!(src.contains("    /// xsd:int firstValue, xsd:int type\n    /// Adds two numbers\n"));
        assert!(src.contains(
            "pub fn calc__add_numbers(&mut self, first_value: impl Into<TypedValue>, r#type: impl Into<TypedValue>)"
        ));
        assert!(src.contains("(\"firstValue\".to_string(), first_value.into()),"));
        assert!(src.contains("CallOptions::new().namespace(\"urn:calc\").soap_action(\"urn:calc#add\")"));
        assert!(src.contains("self.client.call(\"Calc.addNumbers\", params, options)"));
    }

    #[test]
    fn test_proxy_source_void_operation() {
        let src = proxy_source(&operations(), "CalcProxy");
        assert!(src.contains("    /// void\n    pub fn ping(&mut self) -> Result<TypedValue, SoapError> {"));
        assert!(src.contains("let params = Params::none();"));
        assert!(src.contains(".namespace(\"http://testuri.com\").soap_action(\"\")"));
    }

    #[test]
    fn test_describe_as_text() {
        let text = describe_as_text(&operations());
        assert!(text.starts_with("\n-------------------------------\nmethod: Calc.addNumbers\n"));
        assert!(text.contains("documentation: Adds two numbers\n"));
        assert!(text.contains("\ninput:\n  firstValue (xsd:int)\n  type (xsd:int)\n"));
        assert!(text.contains("\noutput:\n  return (xsd:int)\n"));
        assert!(text.contains("method: ping\nstyle: rpc, use: encoded\n\ninput:\n  void\n\noutput:\n  void\n"));
    }
}
