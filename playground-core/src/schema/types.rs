use prost_reflect::{EnumDescriptor, MessageDescriptor, ServiceDescriptor};
use std::fmt;

/// Any named definition a schema can resolve by its fully qualified name.
///
/// The sidebar/browser side of the playground works in terms of symbols: it lists services,
/// then drills into their methods and the message and enum types those methods reference.
#[derive(Debug, Clone)]
pub enum Symbol {
    Service(ServiceDescriptor),
    Message(MessageDescriptor),
    Enum(EnumDescriptor),
}

/// What kind of definition a [`Symbol`] points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Service,
    Message,
    Enum,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            SymbolKind::Service => "service",
            SymbolKind::Message => "message",
            SymbolKind::Enum => "enum",
        };
        f.write_str(kind)
    }
}

impl Symbol {
    pub fn kind(&self) -> SymbolKind {
        match self {
            Symbol::Service(_) => SymbolKind::Service,
            Symbol::Message(_) => SymbolKind::Message,
            Symbol::Enum(_) => SymbolKind::Enum,
        }
    }

    /// The fully qualified name, e.g. `my.package.v1.MyMessage`.
    pub fn full_name(&self) -> &str {
        match self {
            Symbol::Service(d) => d.full_name(),
            Symbol::Message(d) => d.full_name(),
            Symbol::Enum(d) => d.full_name(),
        }
    }

    /// The schema file that declares this symbol.
    pub fn file_path(&self) -> String {
        match self {
            Symbol::Service(d) => d.parent_file().name().to_string(),
            Symbol::Message(d) => d.parent_file().name().to_string(),
            Symbol::Enum(d) => d.parent_file().name().to_string(),
        }
    }

    pub fn into_message(self) -> Option<MessageDescriptor> {
        match self {
            Symbol::Message(d) => Some(d),
            _ => None,
        }
    }
}
