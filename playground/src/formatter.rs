use colored::*;
use playground_core::{
    call::{CallError, ResponseFrame},
    negotiation::MissingDependency,
    prost_reflect::{EnumDescriptor, Kind, MessageDescriptor, MethodDescriptor, ServiceDescriptor},
    relay::RelayClientError,
    schema::{SchemaError, Symbol},
};
use std::fmt::Display;

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

pub struct ServiceList(pub Vec<String>);

pub struct GenericError<T: Display>(pub &'static str, pub T);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<serde_json::Value> for FormattedString {
    fn from(value: serde_json::Value) -> Self {
        FormattedString(serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
    }
}

impl From<ResponseFrame> for FormattedString {
    fn from(frame: ResponseFrame) -> Self {
        let mut out = FormattedString::from(frame.data).0;

        if let Some(seconds) = frame.meta.response_time_seconds {
            out.push_str(&format!("\n{}", format!("({seconds:.3}s)").dimmed()));
        }

        FormattedString(out)
    }
}

impl From<CallError> for FormattedString {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Application { details, code } => FormattedString(format!(
                "{} code={} message={:?}",
                "gRPC Failed:".red().bold(),
                code.map_or_else(|| "Unknown".to_string(), |code| format!("{code:?}")),
                details
            )),
            err => FormattedString(format!("{}\n\n'{}'", "Call Failed:".red().bold(), err)),
        }
    }
}

impl From<MissingDependency> for FormattedString {
    fn from(missing: MissingDependency) -> Self {
        let (title, paths, message) = match missing {
            MissingDependency::Imports { files, message } => (
                "Missing schema imports:",
                files.into_iter().map(|f| f.file_path).collect::<Vec<_>>(),
                message,
            ),
            MissingDependency::Certificates { files, message, .. } => (
                "Missing certificate files:",
                files.into_iter().map(|f| f.file_path).collect(),
                message,
            ),
        };

        let mut out = format!("{}\n", title.yellow().bold());
        for path in paths {
            out.push_str(&format!("  - {}\n", path.yellow()));
        }
        if let Some(message) = message {
            out.push_str(&format!("\n{message}\n"));
        }
        out.push_str("\nUpload the files to the relay and run the call again.");

        FormattedString(out)
    }
}

impl From<SchemaError> for FormattedString {
    fn from(err: SchemaError) -> Self {
        let title = match &err {
            SchemaError::Descriptor(_) => "Failed to parse file descriptor:",
            SchemaError::ServiceNotFound(_) | SchemaError::MethodNotFound { .. } => {
                "Symbol Lookup Failed:"
            }
        };
        FormattedString(format!("{}\n\n'{}'", title.red().bold(), err))
    }
}

impl From<RelayClientError> for FormattedString {
    fn from(err: RelayClientError) -> Self {
        FormattedString(format!("{}\n\n'{}'", "Relay Error:".red().bold(), err))
    }
}

impl From<std::io::Error> for FormattedString {
    fn from(err: std::io::Error) -> Self {
        FormattedString(format!(
            "{}\n\n'{}'",
            "Failed to read file:".red().bold(),
            err
        ))
    }
}

impl<T: Display> From<GenericError<T>> for FormattedString {
    fn from(GenericError(msg, err): GenericError<T>) -> Self {
        FormattedString(format!("{}:\n\n'{}'", msg.red().bold(), err))
    }
}

impl From<ServiceList> for FormattedString {
    fn from(ServiceList(services): ServiceList) -> Self {
        if services.is_empty() {
            return FormattedString("No services found.".yellow().to_string());
        }

        let mut out = String::new();
        out.push_str("Available Services:\n");
        for svc in services {
            out.push_str(&format!("  - {}\n", svc.green()));
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<Symbol> for FormattedString {
    fn from(symbol: Symbol) -> Self {
        match symbol {
            Symbol::Service(service) => service.into(),
            Symbol::Message(message) => message.into(),
            Symbol::Enum(enum_desc) => enum_desc.into(),
        }
    }
}

impl From<ServiceDescriptor> for FormattedString {
    fn from(service: ServiceDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "service".cyan(),
            service.name().green()
        ));

        for method in service.methods() {
            out.push_str("  ");
            out.push_str(&FormattedString::from(method).0);
            out.push_str("\n\n");
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<MethodDescriptor> for FormattedString {
    fn from(method: MethodDescriptor) -> Self {
        let stream = |streaming: bool| {
            if streaming {
                format!("{} ", "stream".cyan())
            } else {
                String::new()
            }
        };

        FormattedString(format!(
            "{} {}({}{}) {} ({}{});",
            "rpc".cyan(),
            method.name().green(),
            stream(method.is_client_streaming()),
            method.input().full_name().yellow(),
            "returns".cyan(),
            stream(method.is_server_streaming()),
            method.output().full_name().yellow()
        ))
    }
}

fn kind_name(kind: &Kind) -> String {
    match kind {
        Kind::Double => "double".to_string(),
        Kind::Float => "float".to_string(),
        Kind::Int32 => "int32".to_string(),
        Kind::Int64 => "int64".to_string(),
        Kind::Uint32 => "uint32".to_string(),
        Kind::Uint64 => "uint64".to_string(),
        Kind::Sint32 => "sint32".to_string(),
        Kind::Sint64 => "sint64".to_string(),
        Kind::Fixed32 => "fixed32".to_string(),
        Kind::Fixed64 => "fixed64".to_string(),
        Kind::Sfixed32 => "sfixed32".to_string(),
        Kind::Sfixed64 => "sfixed64".to_string(),
        Kind::Bool => "bool".to_string(),
        Kind::String => "string".to_string(),
        Kind::Bytes => "bytes".to_string(),
        Kind::Message(m) => m.full_name().to_string(),
        Kind::Enum(e) => e.full_name().to_string(),
    }
}

impl From<MessageDescriptor> for FormattedString {
    fn from(message: MessageDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "message".cyan(),
            message.name().green()
        ));

        for field in message.fields() {
            let type_name = match field.kind() {
                Kind::Message(entry) if field.is_map() => format!(
                    "map<{}, {}>",
                    kind_name(&entry.map_entry_key_field().kind()),
                    kind_name(&entry.map_entry_value_field().kind())
                ),
                kind => kind_name(&kind),
            };

            let label = if field.is_list() {
                format!("{} ", "repeated".cyan())
            } else {
                String::new()
            };

            out.push_str(&format!(
                "  {}{} {} = {};\n",
                label,
                type_name.yellow(),
                field.name(),
                field.number()
            ));
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<EnumDescriptor> for FormattedString {
    fn from(enum_desc: EnumDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "enum".cyan(),
            enum_desc.name().green()
        ));

        for val in enum_desc.values() {
            out.push_str(&format!(
                "  {} = {};\n",
                val.name(),
                val.number().to_string().purple()
            ));
        }
        out.push('}');

        FormattedString(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_service_list() {
        colored::control::set_override(false);

        let out = FormattedString::from(ServiceList(vec![]));
        assert_eq!(out.0, "No services found.");
    }

    #[test]
    fn test_missing_imports_lists_paths() {
        colored::control::set_override(false);

        let out = FormattedString::from(MissingDependency::Imports {
            files: vec![playground_core::relay::SchemaFile::placeholder(
                "common/types.proto",
            )],
            message: None,
        });

        assert!(out.0.starts_with("Missing schema imports:\n  - common/types.proto\n"));
    }
}
