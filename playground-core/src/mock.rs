//! # Payload Synthesizer
//!
//! Builds an example JSON value for a message schema so that a request editor never starts
//! empty. The walk is depth-first over the message's fields:
//!
//! * **Maps** get a single entry.
//! * **Repeated** fields get a single-element list.
//! * **Enums** use the number of their first declared value.
//! * **One-of groups**: only the first field of the first group is populated.
//! * **Nested messages** recurse, bounded per message type by a [`SynthesisContext`] so that
//!   self-referential schemas terminate.
//! * **Scalars** come from a fixed table; strings whose field name starts or ends with `id`
//!   get a fresh UUID.
use crate::schema::ServiceMethodView;
use base64::{Engine, engine::general_purpose::STANDARD};
use prost_reflect::{EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor, ServiceDescriptor};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// How many times one message type may be expanded within a single synthesis. The next
/// occurrence is emitted as an empty object.
pub const MAX_TYPE_DEPTH: usize = 3;

const MOCK_STRING: &str = "Hello";

/// Per-type visit counters for one synthesis call tree.
#[derive(Debug, Default)]
pub struct SynthesisContext {
    depth_by_type_name: HashMap<String, usize>,
}

impl SynthesisContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `type_name` has been entered so far.
    pub fn depth(&self, type_name: &str) -> usize {
        self.depth_by_type_name.get(type_name).copied().unwrap_or(0)
    }

    /// Counts a visit to `type_name`. Returns `false` once the bound is exceeded.
    fn enter(&mut self, type_name: &str) -> bool {
        let depth = self
            .depth_by_type_name
            .entry(type_name.to_string())
            .or_insert(0);
        *depth += 1;
        *depth <= MAX_TYPE_DEPTH
    }
}

/// Synthesizes the request payload for one method with a fresh context.
pub fn mock_request(method: &ServiceMethodView) -> Value {
    mock_message(&method.request_schema(), &mut SynthesisContext::new())
}

/// Synthesizes request payloads for every method of `service`, keyed by method name.
pub fn mock_service_requests(service: &ServiceDescriptor) -> BTreeMap<String, Value> {
    service
        .methods()
        .map(|method| {
            let value = mock_message(&method.input(), &mut SynthesisContext::new());
            (method.name().to_string(), value)
        })
        .collect()
}

/// Synthesizes an example value for `message`.
///
/// Fields are keyed by their JSON name. Never fails for a well-formed descriptor.
pub fn mock_message(message: &MessageDescriptor, ctx: &mut SynthesisContext) -> Value {
    if !ctx.enter(message.full_name()) {
        return Value::Object(Map::new());
    }

    // Synthetic groups back proto3 `optional` fields and are not real one-ofs.
    let chosen_oneof_field = message
        .oneofs()
        .find(|oneof| !oneof.is_synthetic())
        .and_then(|oneof| oneof.fields().next())
        .map(|field| field.number());

    let mut fields = Map::new();

    for field in message.fields() {
        let in_real_oneof = field
            .containing_oneof()
            .is_some_and(|oneof| !oneof.is_synthetic());

        if in_real_oneof && chosen_oneof_field != Some(field.number()) {
            continue;
        }

        fields.insert(field.json_name().to_string(), mock_field(&field, ctx));
    }

    Value::Object(fields)
}

fn mock_field(field: &FieldDescriptor, ctx: &mut SynthesisContext) -> Value {
    if field.is_map() {
        return mock_map(field, ctx);
    }

    let value = mock_kind(&field.kind(), field.name(), ctx);

    if field.is_list() {
        Value::Array(vec![value])
    } else {
        value
    }
}

fn mock_map(field: &FieldDescriptor, ctx: &mut SynthesisContext) -> Value {
    let Kind::Message(entry) = field.kind() else {
        return Value::Object(Map::new());
    };

    let key = match mock_kind(&entry.map_entry_key_field().kind(), field.name(), ctx) {
        Value::String(key) => key,
        other => other.to_string(),
    };
    let value = mock_kind(&entry.map_entry_value_field().kind(), field.name(), ctx);

    let mut map = Map::new();
    map.insert(key, value);
    Value::Object(map)
}

fn mock_kind(kind: &Kind, field_name: &str, ctx: &mut SynthesisContext) -> Value {
    match kind {
        Kind::Message(message) => mock_message(message, ctx),
        Kind::Enum(enum_type) => mock_enum(enum_type),
        scalar => mock_scalar(scalar, field_name),
    }
}

fn mock_enum(enum_type: &EnumDescriptor) -> Value {
    let number = enum_type.values().next().map_or(0, |value| value.number());
    Value::from(number)
}

fn mock_scalar(kind: &Kind, field_name: &str) -> Value {
    match kind {
        Kind::String => Value::from(mock_string(field_name)),
        Kind::Bool => Value::Bool(true),
        Kind::Int32 => Value::from(10),
        Kind::Int64 => Value::from(20),
        Kind::Uint32 => Value::from(100),
        Kind::Uint64 => Value::from(100),
        Kind::Sint32 => Value::from(100),
        Kind::Sint64 => Value::from(1200),
        Kind::Fixed32 => Value::from(1400),
        Kind::Fixed64 => Value::from(1500),
        Kind::Sfixed32 => Value::from(1600),
        Kind::Sfixed64 => Value::from(1700),
        Kind::Float => Value::from(1.1),
        Kind::Double => Value::from(1.4),
        Kind::Bytes => Value::from(STANDARD.encode(MOCK_STRING)),
        Kind::Message(_) | Kind::Enum(_) => Value::Null,
    }
}

/// Guesses a string value from the field name: identifiers get a fresh UUID.
fn mock_string(field_name: &str) -> String {
    let lower = field_name.to_lowercase();

    if lower.starts_with("id") || lower.ends_with("id") {
        uuid::Uuid::new_v4().to_string()
    } else {
        MOCK_STRING.to_string()
    }
}
