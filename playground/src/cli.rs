//! # CLI
//!
//! This module defines the command-line interface of `playground` using `clap`.
//!
//! Request bodies and metadata are passed through as text: the execution engine validates
//! them, so malformed JSON is reported the same way an editor would see it.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "playground", version, about = "RPC playground over an HTTP relay")]
pub struct Cli {
    #[command(flatten)]
    pub globals: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by every command. They override the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Base URL of the relay (e.g. http://localhost:7007/api/grpc-playground)
    #[arg(long, global = true, env = "PLAYGROUND_RELAY_URL")]
    pub relay_url: Option<String>,

    /// Application the schemas and certificates belong to
    #[arg(long, global = true, env = "PLAYGROUND_APP_ID")]
    pub app_id: Option<String>,

    /// Bearer token sent to the relay
    #[arg(long, global = true, env = "PLAYGROUND_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to the JSON config file. Defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the compiled descriptor set (.bin)
    #[arg(long, global = true)]
    pub file_descriptor_set: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available services or other resources
    List {
        #[command(subcommand)]
        sub: ListCommands,
    },

    /// Describe a service, a method or a message in detail
    Describe {
        #[command(subcommand)]
        sub: DescribeCommands,
    },

    /// Print an example request payload for a method
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// playground --file-descriptor-set greeter.bin mock helloworld.Greeter/SayHello
    /// ```
    Mock {
        /// Endpoint (package.Service/Method)
        #[arg(value_parser = parse_endpoint)]
        endpoint: (String, String),
    },

    /// Perform a call through the relay
    ///
    /// Events are printed as they arrive. Ctrl-C cancels the call.
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// playground call helloworld.Greeter/SayHello --target localhost:50051 --body '{"name": "Alice"}'
    /// ```
    Call {
        /// Endpoint (package.Service/Method)
        #[arg(value_parser = parse_endpoint)]
        endpoint: (String, String),

        /// Address of the gRPC server the relay should call (e.g. localhost:50051)
        #[arg(long)]
        target: String,

        /// JSON request body. For client streaming, an array of messages.
        #[arg(long, default_value = "")]
        body: String,

        /// JSON metadata object. Takes precedence over `--header`.
        #[arg(long)]
        metadata: Option<String>,

        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Stream client messages from stdin, one JSON document per line; EOF sends them
        #[arg(long)]
        interactive: bool,

        /// Path of the root certificate (as known to the relay) to call the target over TLS
        #[arg(long)]
        root_cert: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ListCommands {
    /// List all services of the loaded schema
    Services,
}

#[derive(Subcommand)]
pub enum DescribeCommands {
    /// Describe a specific service (list its methods)
    Service {
        /// Fully qualified service name (e.g. my.package.Service)
        service: String,
    },
    /// Describe a specific method (Show method definition)
    Method {
        /// Fully qualified method name (e.g. my.package.Service/Method)
        #[arg(value_parser = parse_endpoint)]
        method: (String, String),
    },
    /// Describe a specific message or enum
    Message {
        /// Fully qualified name (e.g. my.package.Message)
        message: String,
    },
}

fn parse_endpoint(value: &str) -> Result<(String, String), String> {
    let (service, method) = value.split_once('/').ok_or_else(|| {
        format!("Invalid endpoint format: '{value}'. Expected 'package.Service/Method'",)
    })?;

    if service.trim().is_empty() || method.trim().is_empty() {
        return Err("Service and Method names cannot be empty".to_string());
    }

    Ok((service.to_string(), method.to_string()))
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}

/// The metadata text for a call: `--metadata` verbatim, or the headers as a JSON object.
pub fn metadata_text(metadata: Option<String>, headers: &[(String, String)]) -> String {
    if let Some(metadata) = metadata {
        return metadata;
    }

    let object: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::from(v.as_str())))
        .collect();

    serde_json::Value::Object(object).to_string()
}
