//! # Playground CLI Entry Point
//!
//! The main executable. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`], merges them over
//!    the config file and installs the log subscriber.
//! 2. **Schema**: Loads the compiled descriptor set every command works against.
//! 3. **Execution**: Prints descriptors and synthesized payloads, or runs a call through the
//!    relay with `playground_core`.
//! 4. **Presentation**: Formats and prints call events as they arrive.

mod cli;
mod config;
mod formatter;

use clap::Parser;
use cli::{Cli, Commands, DescribeCommands, ListCommands};
use config::Config;
use formatter::{FormattedString, GenericError, ServiceList};
use playground_core::{
    call::{CallEvent, CallRequest, CallState, RpcCall},
    mock,
    relay::{Certificate, RelayClient},
    schema::Schema,
};
use std::process;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    let config = match config::load(args.globals.config.as_deref()) {
        Ok(config) => config.merge(&args.globals),
        Err(err) => exit_with(GenericError("Failed to load config", format!("{err:#}"))),
    };

    let schema = load_schema_or_exit(&config);

    match args.command {
        Commands::List { sub } => match sub {
            ListCommands::Services => {
                println!("{}", FormattedString::from(ServiceList(schema.list_services())))
            }
        },
        Commands::Describe { sub } => match sub {
            DescribeCommands::Service { service } => match schema.service(&service) {
                Ok(descriptor) => println!("{}", FormattedString::from(descriptor)),
                Err(err) => exit_with(err),
            },
            DescribeCommands::Method { method } => {
                let (service, method_name) = method;
                match schema.method(&service, &method_name) {
                    Ok(view) => println!("{}", FormattedString::from(view.descriptor().clone())),
                    Err(err) => exit_with(err),
                }
            }
            DescribeCommands::Message { message } => match schema.resolve_symbol(&message) {
                Some(symbol) => println!("{}", FormattedString::from(symbol)),
                None => exit_with(GenericError("Symbol Lookup Failed", message)),
            },
        },
        Commands::Mock { endpoint } => {
            let (service, method) = endpoint;
            match schema.method(&service, &method) {
                Ok(view) => println!("{}", FormattedString::from(mock::mock_request(&view))),
                Err(err) => exit_with(err),
            }
        }
        Commands::Call {
            endpoint,
            target,
            body,
            metadata,
            headers,
            interactive,
            root_cert,
        } => {
            let (service, method) = endpoint;
            let view = match schema.method(&service, &method) {
                Ok(view) => view,
                Err(err) => exit_with(err),
            };

            let mut request = CallRequest::new(target, view)
                .with_inputs(body)
                .with_metadata(cli::metadata_text(metadata, &headers))
                .interactive(interactive);

            if let Some(root_cert) = root_cert {
                request = request.with_certificate(Certificate::from_root_cert(root_cert));
            }

            run_call(&config, request).await;
        }
    }
}

fn exit_with(message: impl Into<FormattedString>) -> ! {
    eprintln!("{}", message.into());
    process::exit(1);
}

fn load_schema_or_exit(config: &Config) -> Schema {
    let Some(path) = &config.file_descriptor_set else {
        exit_with(GenericError(
            "No schema",
            "pass --file-descriptor-set or set fileDescriptorSet in the config file",
        ));
    };

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => exit_with(err),
    };

    match Schema::decode(&bytes) {
        Ok(schema) => schema,
        Err(err) => exit_with(err),
    }
}

async fn run_call(config: &Config, request: CallRequest) {
    let relay_config = match config.relay_config() {
        Ok(relay_config) => relay_config,
        Err(err) => exit_with(GenericError("Invalid relay settings", format!("{err:#}"))),
    };

    let relay = match RelayClient::new(relay_config) {
        Ok(relay) => relay,
        Err(err) => exit_with(err),
    };

    let (mut call, mut events) = RpcCall::new(relay, request);

    // Malformed inputs are reported on the event channel like any other failure.
    if let Err(err) = call.send() {
        debug!(%err, "call rejected before transmission");
    }

    if call.state() == CallState::Armed {
        stream_stdin(&mut call).await;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(CallEvent::Data(frame)) => println!("{}", FormattedString::from(frame)),
                Some(CallEvent::Error(err)) => eprintln!("{}", FormattedString::from(err)),
                Some(CallEvent::MissingDependency(missing)) => {
                    eprintln!("{}", FormattedString::from(missing));
                    call.cancel();
                }
                Some(CallEvent::End) | None => break,
            },
            _ = tokio::signal::ctrl_c() => call.cancel(),
        }
    }

    if !matches!(call.state(), CallState::Completed) {
        process::exit(1);
    }
}

/// Writes every non-empty stdin line to an armed client stream, then commits it on EOF.
async fn stream_stdin(call: &mut RpcCall) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                call.cancel();
                return;
            }
        };

        match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                if let Err(err) = call.write(&line) {
                    eprintln!("{}", FormattedString::from(err));
                }
            }
            Ok(None) => break,
            Err(err) => {
                eprintln!("{}", FormattedString::from(err));
                call.cancel();
                return;
            }
        }
    }

    if let Err(err) = call.commit_stream() {
        eprintln!("{}", FormattedString::from(err));
    }
}
