//! Zentinel SOAP client binary.
//!
//! Run with: `zentinel-soap --config client.yaml call add a=1 b=2`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_soap::wsdl::{StaticWsdl, WsdlSource};
use zentinel_soap::{
    codegen, parse, CallOptions, ClientConfig, Params, SoapClient, Style, TypedValue, Use,
};

/// SOAP client for Zentinel.
///
/// Calls SOAP operations, decodes SOAP messages and generates proxies from
/// an operation catalogue.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invoke an operation and print the result as YAML
    Call {
        /// Operation name
        operation: String,

        /// Parameters as name=value
        params: Vec<String>,

        /// Endpoint URL, overriding the configuration
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Method namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// SOAPAction header value
        #[arg(long)]
        soap_action: Option<String>,

        /// Binding style (rpc, document)
        #[arg(long)]
        style: Option<Style>,

        /// Encoding use (encoded, literal)
        #[arg(long = "use")]
        use_: Option<Use>,

        /// Print the request and response wire dumps to stderr
        #[arg(long)]
        dump: bool,
    },

    /// Decode a SOAP message from a file and print its body as YAML
    Decode {
        /// Message file
        file: PathBuf,

        /// Charset announced for the message
        #[arg(long, default_value = "UTF-8")]
        charset: String,

        /// Print the SOAP header instead of the body
        #[arg(long)]
        header: bool,
    },

    /// Generate a Rust proxy for the configured operation catalogue
    Proxy {
        /// Name of the generated struct
        #[arg(long, default_value = "ServiceProxy")]
        name: String,

        /// Output file (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Describe the operations of the configured catalogue
    Describe,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::WARN);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Zentinel SOAP client v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.config.exists() {
        info!("Config file: {}", args.config.display());
        ClientConfig::from_file(&args.config).context("Failed to load config file")?
    } else {
        info!("Config file not found, using defaults");
        ClientConfig::default()
    };

    match args.command {
        Command::Call {
            operation,
            params,
            endpoint,
            namespace,
            soap_action,
            style,
            use_,
            dump,
        } => {
            let params = params
                .iter()
                .map(String::as_str)
                .map(parse_param)
                .collect::<Result<Vec<_>>>()?;
            let mut client = SoapClient::new(config);
            if let Some(endpoint) = endpoint {
                client.set_endpoint(endpoint);
            }
            let options = CallOptions {
                namespace,
                soap_action,
                headers: None,
                style,
                use_,
            };

            let result = client.call(&operation, Params::Values(params), options);
            if dump {
                eprintln!("{}\n\n{}", client.request(), client.response());
            }
            let value = result.with_context(|| format!("Call to {} failed", operation))?;
            if let Some(fault) = client.fault() {
                eprintln!("SOAP Fault: {}", fault);
            }
            print!("{}", serde_yaml::to_string(&value)?);
            if client.is_fault() {
                std::process::exit(2);
            }
        }
        Command::Decode { file, charset, header } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let options = config.parse_options(&charset);
            let message = parse(&bytes, &options).context("Failed to decode message")?;
            let value = if header { message.header } else { message.body };
            print!("{}", serde_yaml::to_string(&value.unwrap_or(TypedValue::Null))?);
        }
        Command::Proxy { name, output } => {
            let wsdl = load_catalogue(&config)?;
            let operations = wsdl.operations(non_empty(&config.port_name), config.soap_version.into());
            let source = codegen::proxy_source(&operations, &name);
            match output {
                Some(path) => std::fs::write(&path, source)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => print!("{}", source),
            }
        }
        Command::Describe => {
            let wsdl = load_catalogue(&config)?;
            let operations = wsdl.operations(non_empty(&config.port_name), config.soap_version.into());
            print!("{}", codegen::describe_as_text(&operations));
        }
    }

    Ok(())
}

fn load_catalogue(config: &ClientConfig) -> Result<StaticWsdl> {
    let path = config
        .wsdl
        .as_ref()
        .context("No operation catalogue configured (set `wsdl` in the config file)")?;
    StaticWsdl::from_file(path).context("Failed to load operation catalogue")
}

fn non_empty(s: &str) -> Option<&str> {
    Some(s).filter(|s| !s.is_empty())
}

/// Parse `name=value`, typing the value as integer, float or boolean when
/// it reads as one.
fn parse_param(param: &str) -> Result<(String, TypedValue)> {
    let (name, raw) = param
        .split_once('=')
        .with_context(|| format!("Parameter '{}' is not of the form name=value", param))?;
    let value = if let Ok(n) = raw.parse::<i64>() {
        TypedValue::from(n)
    } else if let Ok(x) = raw.parse::<f64>() {
        TypedValue::from(x)
    } else if raw == "true" || raw == "false" {
        TypedValue::from(raw == "true")
    } else {
        TypedValue::from(raw)
    };
    Ok((name.to_string(), value))
}
