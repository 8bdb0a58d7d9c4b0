//! SOAP client: operation invocation and response mapping.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::config::{AuthType, ClientConfig, Style, Use};
use crate::envelope::{EnvelopeBuilder, Headers};
use crate::error::SoapError;
use crate::fault::SoapFault;
use crate::parser;
use crate::serializer::ValueSerializer;
use crate::transport::{Credentials, HttpRequest, HttpTransport, RequestState, RetryPolicy, Transport};
use crate::typemap::SOAP_ENC;
use crate::value::TypedValue;
use crate::wsdl::{BindingType, Direction, OperationDescriptor, StaticWsdl, WsdlSource};

/// Call parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Pre-serialized XML, sent verbatim
    Xml(String),
    /// Named values
    Values(Vec<(String, TypedValue)>),
}

impl Params {
    pub fn none() -> Self {
        Params::Values(Vec::new())
    }

    pub fn values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<TypedValue>,
    {
        Params::Values(values.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<&str> for Params {
    fn from(xml: &str) -> Self {
        Params::Xml(xml.to_string())
    }
}

impl From<String> for Params {
    fn from(xml: String) -> Self {
        Params::Xml(xml)
    }
}

impl From<Vec<(String, TypedValue)>> for Params {
    fn from(values: Vec<(String, TypedValue)>) -> Self {
        Params::Values(values)
    }
}

/// Per-call overrides of the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub namespace: Option<String>,
    pub soap_action: Option<String>,
    /// Replaces the client's request headers from this call on
    pub headers: Option<Headers>,
    pub style: Option<Style>,
    pub use_: Option<Use>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn soap_action(mut self, soap_action: impl Into<String>) -> Self {
        self.soap_action = Some(soap_action.into());
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    pub fn use_(mut self, use_: Use) -> Self {
        self.use_ = Some(use_);
        self
    }
}

/// Serialized request ready for the transport.
struct PreparedCall {
    envelope: String,
    soap_action: String,
    style: Style,
}

/// SOAP client for one service.
///
/// Works either from per-call namespace/style/use (plain mode) or from
/// operation metadata supplied by a [`WsdlSource`] (WSDL mode). A client
/// keeps the state of its last call and is not meant to be shared between
/// threads without external locking.
pub struct SoapClient<T: Transport = HttpTransport> {
    config: ClientConfig,
    transport: T,
    serializer: ValueSerializer,
    retry: RetryPolicy,
    credentials: Option<Credentials>,
    endpoint: String,
    request_headers: Option<Headers>,

    wsdl_mode: bool,
    wsdl: Option<Box<dyn WsdlSource>>,
    operations: IndexMap<String, OperationDescriptor>,
    binding: BindingType,

    operation: String,
    op_data: Option<OperationDescriptor>,
    fault: Option<SoapFault>,
    error: Option<String>,
    request: String,
    response: String,
    response_headers: String,
    response_header: Option<TypedValue>,
    document: String,
}

impl SoapClient<HttpTransport> {
    /// Client over HTTP, configured from `config`.
    pub fn new(config: ClientConfig) -> Self {
        let transport = HttpTransport::new(&config.connection);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> SoapClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        let credentials = config.credentials.as_ref().map(Credentials::from);
        Self {
            endpoint: config.endpoint.clone(),
            wsdl_mode: config.wsdl.is_some(),
            retry: RetryPolicy::new(config.connection.max_attempts),
            serializer: ValueSerializer::new(),
            credentials,
            request_headers: None,
            wsdl: None,
            operations: IndexMap::new(),
            binding: BindingType::Soap,
            operation: String::new(),
            op_data: None,
            fault: None,
            error: None,
            request: String::new(),
            response: String::new(),
            response_headers: String::new(),
            response_header: None,
            document: String::new(),
            config,
            transport,
        }
    }

    /// Switch to WSDL mode with an already loaded description.
    pub fn with_wsdl(mut self, wsdl: Box<dyn WsdlSource>) -> Self {
        self.wsdl = Some(wsdl);
        self.wsdl_mode = true;
        self.operations.clear();
        self
    }

    /// Use a specific serializer (for example a seeded one).
    pub fn with_serializer(mut self, serializer: ValueSerializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Invoke an operation.
    ///
    /// A SOAP Fault is returned as `Ok` with the fault struct, and
    /// [`SoapClient::fault`] is set. Every error is also kept as text in
    /// [`SoapClient::error`].
    pub fn call(
        &mut self,
        operation: &str,
        params: impl Into<Params>,
        options: CallOptions,
    ) -> Result<TypedValue, SoapError> {
        self.reset(operation);
        let result = self.invoke(operation, params.into(), options);
        if let Err(err) = &result {
            warn!(operation, error = %err, "call failed");
            self.error = Some(err.to_string());
        }
        result
    }

    fn reset(&mut self, operation: &str) {
        self.operation = operation.to_string();
        self.fault = None;
        self.error = None;
        self.request.clear();
        self.response.clear();
        self.response_headers.clear();
        self.response_header = None;
        self.document.clear();
        self.op_data = None;
    }

    fn invoke(&mut self, operation: &str, params: Params, options: CallOptions) -> Result<TypedValue, SoapError> {
        if let Some(headers) = options.headers.clone() {
            self.request_headers = Some(headers);
        }
        info!(
            operation,
            wsdl = self.wsdl_mode,
            endpoint = %self.endpoint,
            "calling operation"
        );

        let prepared = if self.wsdl_mode {
            self.load_wsdl()?;
            let op = self
                .operations
                .get(operation)
                .cloned()
                .ok_or_else(|| SoapError::OperationNotFound(operation.to_string()))?;
            debug!(operation, "found operation");
            let prepared = self.prepare_wsdl_call(&op, params)?;
            self.op_data = Some(op);
            prepared
        } else {
            self.prepare_plain_call(operation, params, &options)?
        };

        let body = self.send(&prepared.envelope, &prepared.soap_action)?;
        let body = body.unwrap_or(TypedValue::Null);

        if let Some(fault) = SoapFault::from_value(&body) {
            info!(faultcode = %fault.faultcode, faultstring = %fault.faultstring, "got fault");
            self.error = Some(fault.to_string());
            self.fault = Some(fault);
            return Ok(body);
        }

        Ok(match prepared.style {
            Style::Document => body,
            Style::Rpc => unwrap_rpc_result(body),
        })
    }

    fn prepare_plain_call(
        &mut self,
        operation: &str,
        params: Params,
        options: &CallOptions,
    ) -> Result<PreparedCall, SoapError> {
        let defaults = &self.config.defaults;
        let namespace = options.namespace.clone().unwrap_or_else(|| defaults.namespace.clone());
        let style = options.style.unwrap_or(defaults.style);
        let use_ = options.use_.unwrap_or(defaults.use_);
        let soap_action = options.soap_action.clone().unwrap_or_default();

        let prefix = self.serializer.random_prefix("ns");
        let payload = match params {
            Params::Xml(xml) => xml,
            Params::Values(values) => self.serializer.serialize_fields(&values, use_)?,
        };
        let encoding_style = (use_ == Use::Encoded).then_some(SOAP_ENC);

        let payload = wrap_payload(operation, &prefix, &namespace, style, payload);
        let envelope = self.build_envelope(&payload, Vec::new(), style, use_, encoding_style)?;
        debug!(operation, namespace = %namespace, %style, %use_, "serialized request");
        Ok(PreparedCall {
            envelope,
            soap_action,
            style,
        })
    }

    fn prepare_wsdl_call(&mut self, op: &OperationDescriptor, params: Params) -> Result<PreparedCall, SoapError> {
        let wsdl = self
            .wsdl
            .as_mut()
            .ok_or_else(|| SoapError::Wsdl("service description not loaded".to_string()))?;

        self.endpoint = match &self.config.force_endpoint {
            Some(forced) => forced.clone(),
            None => op.endpoint.clone(),
        };
        let namespace = op
            .input
            .namespace
            .clone()
            .unwrap_or_else(|| self.config.defaults.namespace.clone());
        let style = op.style;
        let use_ = op.input.use_;

        let prefix = match wsdl.prefix_of(&namespace) {
            Some(prefix) => prefix,
            None => self.serializer.random_prefix("ns"),
        };
        let payload = match params {
            Params::Xml(xml) => xml,
            Params::Values(values) => {
                wsdl.serialize_rpc_parameters(&mut self.serializer, op, Direction::Input, &values)?
            }
        };
        let used = wsdl.used_namespaces();

        let payload = wrap_payload(&op.name, &prefix, &namespace, style, payload);
        let envelope = self.build_envelope(&payload, used, style, use_, op.input.effective_encoding_style())?;
        debug!(
            operation = %op.name,
            endpoint = %self.endpoint,
            soap_action = %op.soap_action,
            %style,
            %use_,
            "serialized request from operation data"
        );
        Ok(PreparedCall {
            envelope,
            soap_action: op.soap_action.clone(),
            style,
        })
    }

    fn build_envelope(
        &mut self,
        payload: &str,
        namespaces: Vec<(String, String)>,
        style: Style,
        use_: Use,
        encoding_style: Option<&str>,
    ) -> Result<String, SoapError> {
        EnvelopeBuilder::new(payload)
            .headers(self.request_headers.as_ref())
            .namespaces(namespaces)
            .style(style)
            .use_(use_)
            .encoding_style(encoding_style)
            .charset(self.config.encoding.soap_defencoding.as_str())
            .build(&mut self.serializer)
    }

    /// Load the service description and its operations on first use.
    fn load_wsdl(&mut self) -> Result<(), SoapError> {
        if self.wsdl.is_none() {
            let path = self
                .config
                .wsdl
                .clone()
                .ok_or_else(|| SoapError::Wsdl("no service description configured".to_string()))?;
            info!(path = %path.display(), "loading service description");
            self.wsdl = Some(Box::new(StaticWsdl::from_file(&path)?));
        }
        if !self.operations.is_empty() {
            return Ok(());
        }
        let Some(wsdl) = self.wsdl.as_ref() else {
            return Ok(());
        };
        let port = Some(self.config.port_name.as_str()).filter(|p| !p.is_empty());
        for binding in [BindingType::Soap, BindingType::Soap12] {
            let operations = wsdl.operations(port, binding);
            if !operations.is_empty() {
                debug!(count = operations.len(), ?binding, "got operations");
                self.operations = operations;
                self.binding = binding;
                return Ok(());
            }
        }
        Err(SoapError::Wsdl("no operations defined in the WSDL document!".to_string()))
    }

    fn send(&mut self, envelope: &str, soap_action: &str) -> Result<Option<TypedValue>, SoapError> {
        let encoding = &self.config.encoding;
        let mut request = HttpRequest::new(self.endpoint.clone(), encode_body(envelope, &encoding.soap_defencoding));
        request.content_type = format!("{}; charset={}", encoding.content_type, encoding.soap_defencoding);
        request.soap_action = soap_action.to_string();
        if let Some(accept) = encoding.http_encoding.as_deref().filter(|e| !e.is_empty()) {
            request.set_header("Accept-Encoding", accept);
        }
        debug!(endpoint = %self.endpoint, len = envelope.len(), soap_action, "sending request");

        let mut state = RequestState {
            request,
            credentials: self.credentials.clone(),
        };
        let outcome = self.retry.execute(&mut self.transport, &mut state);
        self.request = state.request.to_text();
        self.credentials = state.credentials;
        let response = outcome?;
        self.response = response.to_text();

        let charset = response.soap_charset(&self.config.encoding.content_type)?;
        let options = self.config.parse_options(&charset);
        let parsed = parser::parse(&response.body, &options)?;
        self.response_headers = parsed.raw_headers;
        self.response_header = parsed.header;
        self.document = parsed.document;
        Ok(parsed.body)
    }

    /// Operations of the service description, loading it if needed.
    pub fn operations(&mut self) -> Result<&IndexMap<String, OperationDescriptor>, SoapError> {
        self.load_wsdl()?;
        Ok(&self.operations)
    }

    /// Operation metadata, loading the service description if needed.
    pub fn operation_data(&mut self, operation: &str) -> Result<Option<&OperationDescriptor>, SoapError> {
        self.load_wsdl()?;
        Ok(self.operations.get(operation))
    }

    /// Binding the operations were taken from.
    pub fn binding(&self) -> BindingType {
        self.binding
    }

    pub fn fault(&self) -> Option<&SoapFault> {
        self.fault.as_ref()
    }

    pub fn is_fault(&self) -> bool {
        self.fault.is_some()
    }

    /// Error text of the last call, or the `code: string` of its fault.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Name of the last operation called.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Operation metadata used by the last call in WSDL mode.
    pub fn last_operation_data(&self) -> Option<&OperationDescriptor> {
        self.op_data.as_ref()
    }

    /// Wire dump of the last request.
    pub fn request(&self) -> &str {
        &self.request
    }

    /// Wire dump of the last response.
    pub fn response(&self) -> &str {
        &self.response
    }

    /// Raw markup of the response SOAP headers.
    pub fn response_headers(&self) -> &str {
        &self.response_headers
    }

    /// Decoded response SOAP header.
    pub fn response_header(&self) -> Option<&TypedValue> {
        self.response_header.as_ref()
    }

    /// Raw markup of the response body.
    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        if self.wsdl_mode {
            self.config.force_endpoint = Some(endpoint.clone());
        }
        self.endpoint = endpoint;
    }

    pub fn set_headers(&mut self, headers: Option<Headers>) {
        self.request_headers = headers;
    }

    pub fn set_credentials(&mut self, username: impl Into<String>, password: impl Into<String>, auth_type: AuthType) {
        self.credentials = Some(Credentials::new(username, password, auth_type));
    }

    /// `Accept-Encoding` for requests; `None` disables it.
    pub fn set_http_encoding(&mut self, encoding: Option<String>) {
        self.config.encoding.http_encoding = encoding;
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.config.encoding.content_type = content_type.into();
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Wrap an rpc payload in the operation element.
fn wrap_payload(operation: &str, prefix: &str, namespace: &str, style: Style, payload: String) -> String {
    match style {
        Style::Document => payload,
        Style::Rpc if namespace.is_empty() => format!("<{op}>{payload}</{op}>", op = operation),
        Style::Rpc => format!(
            "<{p}:{op} xmlns:{p}=\"{ns}\">{payload}</{p}:{op}>",
            p = prefix,
            op = operation,
            ns = namespace
        ),
    }
}

/// One output part is returned on its own, several as the whole struct.
fn unwrap_rpc_result(body: TypedValue) -> TypedValue {
    match body {
        TypedValue::Struct(fields) if fields.len() <= 1 => {
            fields.into_values().next().unwrap_or(TypedValue::Null)
        }
        TypedValue::Sequence(items) if items.len() <= 1 => items.into_iter().next().unwrap_or(TypedValue::Null),
        TypedValue::Map(pairs) if pairs.len() <= 1 => {
            pairs.into_iter().next().map(|(_, v)| v).unwrap_or(TypedValue::Null)
        }
        v if v.is_aggregate() => v,
        _ => TypedValue::Null,
    }
}

/// Encode the outgoing message in the declared charset.
fn encode_body(xml: &str, charset: &str) -> Vec<u8> {
    let limit = match charset.to_ascii_uppercase().as_str() {
        "ISO-8859-1" => 0xFF,
        "US-ASCII" => 0x7F,
        _ => return xml.as_bytes().to_vec(),
    };
    xml.chars()
        .map(|c| if (c as u32) <= limit { c as u32 as u8 } else { b'?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportResponse;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MockTransport {
        responses: VecDeque<TransportResponse>,
        requests: Vec<HttpRequest>,
    }

    impl MockTransport {
        fn replying(xml: &str) -> Self {
            let mut mock = Self::default();
            mock.push(200, xml);
            mock
        }

        fn push(&mut self, status: u16, xml: &str) {
            self.responses.push_back(
                TransportResponse::new(status, xml).with_header("Content-Type", "text/xml; charset=utf-8"),
            );
        }
    }

    impl Transport for MockTransport {
        fn send(&mut self, request: &HttpRequest) -> Result<TransportResponse, SoapError> {
            self.requests.push(request.clone());
            self.responses
                .pop_front()
                .ok_or_else(|| SoapError::Transport("connection refused".to_string()))
        }
    }

    fn envelope(body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><SOAP-ENV:Envelope xmlns:SOAP-ENV=\"http://schemas.xmlsoap.org/soap/envelope/\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\"><SOAP-ENV:Body>{}</SOAP-ENV:Body></SOAP-ENV:Envelope>",
            body
        )
    }

    fn client(mock: MockTransport) -> SoapClient<MockTransport> {
        SoapClient::with_transport(ClientConfig::for_endpoint("http://svc.test/calc"), mock)
            .with_serializer(ValueSerializer::seeded(42))
    }

    fn sent_body(client: &SoapClient<MockTransport>) -> String {
        String::from_utf8_lossy(&client.transport().requests[0].body).into_owned()
    }

    #[test]
    fn test_rpc_call_unwraps_single_result() {
        let mock = MockTransport::replying(&envelope(
            "<ns1:addResponse xmlns:ns1=\"urn:calc\"><return xsi:type=\"xsd:int\">3</return></ns1:addResponse>",
        ));
        let mut client = client(mock);
        let result = client
            .call("add", Params::values([("a", 1), ("b", 2)]), CallOptions::new().namespace("urn:calc"))
            .unwrap();
        assert_eq!(result, TypedValue::from(3));
        assert!(!client.is_fault());
        assert_eq!(client.error(), None);

        let body = sent_body(&client);
        assert!(body.contains(":add xmlns:ns"));
        assert!(body.contains("=\"urn:calc\"><a xsi:type=\"xsd:int\">1</a><b xsi:type=\"xsd:int\">2</b></ns"));
        assert!(body.contains("SOAP-ENV:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\""));
        let request = &client.transport().requests[0];
        assert_eq!(request.content_type, "text/xml; charset=ISO-8859-1");
        assert_eq!(request.url, "http://svc.test/calc");
        assert!(client.document().starts_with("<ns1:addResponse"));
    }

    #[test]
    fn test_rpc_call_returns_all_outputs() {
        let mock = MockTransport::replying(&envelope(
            "<r:divResponse xmlns:r=\"urn:calc\"><quotient>3</quotient><remainder>1</remainder></r:divResponse>",
        ));
        let mut client = client(mock);
        let result = client.call("div", Params::none(), CallOptions::new()).unwrap();
        assert_eq!(result.get("quotient"), Some(&TypedValue::from("3")));
        assert_eq!(result.get("remainder"), Some(&TypedValue::from("1")));
    }

    #[test]
    fn test_rpc_call_without_outputs_is_null() {
        let mock = MockTransport::replying(&envelope("<r:pingResponse xmlns:r=\"urn:x\"/>"));
        let mut client = client(mock);
        assert_eq!(client.call("ping", Params::none(), CallOptions::new()).unwrap(), TypedValue::Null);
    }

    #[test]
    fn test_document_literal_call() {
        let mock = MockTransport::replying(&envelope("<Order><id>7</id></Order>"));
        let mut client = client(mock);
        let result = client
            .call(
                "submit",
                "<Order><id>7</id></Order>",
                CallOptions::new().style(Style::Document).use_(Use::Literal),
            )
            .unwrap();
        assert_eq!(result.get("id"), Some(&TypedValue::from("7")));
        let body = sent_body(&client);
        assert!(body.contains("<SOAP-ENV:Body><Order><id>7</id></Order></SOAP-ENV:Body>"));
        assert!(!body.contains("encodingStyle"));
    }

    #[test]
    fn test_fault_response() {
        let mut mock = MockTransport::default();
        mock.push(
            500,
            &envelope("<SOAP-ENV:Fault><faultcode>SOAP-ENV:Server</faultcode><faultstring>division by zero</faultstring></SOAP-ENV:Fault>"),
        );
        let mut client = client(mock);
        let result = client.call("div", Params::none(), CallOptions::new()).unwrap();
        assert!(client.is_fault());
        assert_eq!(client.error(), Some("SOAP-ENV:Server: division by zero"));
        assert_eq!(result.get("faultstring"), Some(&TypedValue::from("division by zero")));
        assert_eq!(client.fault().map(|f| f.faultcode.as_str()), Some("SOAP-ENV:Server"));
    }

    #[test]
    fn test_fault_state_resets_between_calls() {
        let mut mock = MockTransport::default();
        mock.push(500, &envelope("<SOAP-ENV:Fault><faultcode>Client</faultcode><faultstring>x</faultstring></SOAP-ENV:Fault>"));
        mock.push(200, &envelope("<r xmlns=\"urn:x\"><v>1</v></r>"));
        let mut client = client(mock);
        client.call("a", Params::none(), CallOptions::new()).unwrap();
        assert!(client.is_fault());
        client.call("b", Params::none(), CallOptions::new()).unwrap();
        assert!(!client.is_fault());
        assert_eq!(client.error(), None);
    }

    #[test]
    fn test_transport_error_is_recorded() {
        let mut client = client(MockTransport::default());
        let err = client.call("a", Params::none(), CallOptions::new()).unwrap_err();
        assert!(err.is_transport());
        assert_eq!(client.error(), Some("HTTP Error: connection refused"));
        assert!(client.request().starts_with("POST http://svc.test/calc HTTP/1.1"));
    }

    #[test]
    fn test_wrong_content_type() {
        let mut mock = MockTransport::default();
        mock.responses
            .push_back(TransportResponse::new(200, "<html/>").with_header("Content-Type", "text/html"));
        let mut client = client(mock);
        let err = client.call("a", Params::none(), CallOptions::new()).unwrap_err();
        assert_eq!(err.to_string(), "Response not of type text/xml: text/html");
    }

    #[test]
    fn test_headers_and_accept_encoding() {
        let mock = MockTransport::replying(&envelope("<r><v>1</v></r>"));
        let mut client = client(mock);
        client.set_http_encoding(Some("gzip, deflate".to_string()));
        client
            .call(
                "a",
                Params::none(),
                CallOptions::new().headers(Headers::Raw("<t:session xmlns:t=\"urn:t\">9</t:session>".to_string())),
            )
            .unwrap();
        let request = &client.transport().requests[0];
        assert_eq!(request.header("Accept-Encoding"), Some("gzip, deflate"));
        assert!(sent_body(&client).contains("<SOAP-ENV:Header><t:session xmlns:t=\"urn:t\">9</t:session></SOAP-ENV:Header>"));
    }

    #[test]
    fn test_basic_credentials_sent() {
        let mock = MockTransport::replying(&envelope("<r><v>1</v></r>"));
        let mut client = client(mock);
        client.set_credentials("alice", "pw", AuthType::Basic);
        client.call("a", Params::none(), CallOptions::new()).unwrap();
        let auth = client.transport().requests[0].header("Authorization").unwrap();
        assert!(auth.starts_with("Basic "));
    }

    #[test]
    fn test_wsdl_mode() {
        let wsdl = StaticWsdl::from_yaml(
            r#"
target_namespace: urn:Calculator
ports:
  - name: CalcPort
    location: http://wsdl.test/calc
    operations:
      - name: add
        soap_action: urn:Calculator#add
        input:
          namespace: urn:Calculator
          parts:
            - { name: a, type: xsd:int }
            - { name: b, type: xsd:int }
"#,
        )
        .unwrap();
        let mock = MockTransport::replying(&envelope("<addResponse><return>5</return></addResponse>"));
        let mut client = client(mock).with_wsdl(Box::new(wsdl));

        assert_eq!(client.operations().unwrap().len(), 1);
        let result = client
            .call("add", Params::values([("a", 2), ("b", 3)]), CallOptions::new())
            .unwrap();
        assert_eq!(result, TypedValue::from("5"));
        let request = &client.transport().requests[0];
        assert_eq!(request.url, "http://wsdl.test/calc");
        assert_eq!(request.soap_action, "urn:Calculator#add");
        let body = sent_body(&client);
        assert!(body.contains("<tns:add xmlns:tns=\"urn:Calculator\"><a xsi:type=\"xsd:int\">2</a>"));
        assert!(body.contains(" xmlns:tns=\"urn:Calculator\">"));
        assert_eq!(client.last_operation_data().map(|o| o.name.as_str()), Some("add"));

        let err = client.call("sub", Params::none(), CallOptions::new()).unwrap_err();
        assert_eq!(err.to_string(), "operation sub not present in WSDL.");
        assert_eq!(client.error(), Some("operation sub not present in WSDL."));
    }

    #[test]
    fn test_forced_endpoint_wins() {
        let wsdl = StaticWsdl::from_yaml(
            "ports:\n  - name: P\n    location: http://wsdl.test/\n    operations:\n      - name: ping\n",
        )
        .unwrap();
        let mock = MockTransport::replying(&envelope("<pingResponse/>"));
        let mut client = client(mock).with_wsdl(Box::new(wsdl));
        client.set_endpoint("http://override.test/");
        client.call("ping", Params::none(), CallOptions::new()).unwrap();
        assert_eq!(client.transport().requests[0].url, "http://override.test/");
    }

    #[test]
    fn test_wsdl_without_operations() {
        let wsdl = StaticWsdl::from_yaml("ports:\n  - name: P\n    location: http://x/\n").unwrap();
        let mut client = client(MockTransport::default()).with_wsdl(Box::new(wsdl));
        let err = client.call("a", Params::none(), CallOptions::new()).unwrap_err();
        assert_eq!(err.to_string(), "wsdl error: no operations defined in the WSDL document!");
    }

    #[test]
    fn test_wrap_payload() {
        assert_eq!(wrap_payload("op", "ns1", "", Style::Rpc, "x".into()), "<op>x</op>");
        assert_eq!(
            wrap_payload("op", "ns1", "urn:a", Style::Rpc, "x".into()),
            "<ns1:op xmlns:ns1=\"urn:a\">x</ns1:op>"
        );
        assert_eq!(wrap_payload("op", "ns1", "urn:a", Style::Document, "x".into()), "x");
    }

    #[test]
    fn test_encode_body_latin1() {
        assert_eq!(encode_body("café", "ISO-8859-1"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(encode_body("café", "US-ASCII"), b"caf?".to_vec());
        assert_eq!(encode_body("café", "UTF-8"), "café".as_bytes().to_vec());
    }
}
