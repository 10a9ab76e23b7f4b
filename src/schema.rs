//! Query-string argument schemas and the typed value store parsed against
//! them.
//!
//! Grounded on `src/config_handler/types.rs`'s struct-of-named-fields shape
//! and on `parser.rs`'s scalar `FromYaml` impls (`String`, `u16`, `usize`,
//! `bool`) for the set of primitive kinds worth supporting. The component
//! design calls for rejecting route registration when "the callback is
//! null" — in safe Rust a `fn` item or function pointer can never be null,
//! so that check has no code here; it's a check the target language gives
//! us for free.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Flag,
    Integer,
    Number,
    String,
    ListInteger,
    ListNumber,
    ListString,
}

#[derive(Debug, Clone)]
pub enum DefaultValue {
    Flag(bool),
    Integer(i64),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone)]
pub struct SlotDescriptor {
    pub name: String,
    pub kind: SlotKind,
    pub required: bool,
    pub default: Option<DefaultValue>,
}

impl SlotDescriptor {
    pub fn new(name: impl Into<String>, kind: SlotKind, required: bool) -> Self {
        Self { name: name.into(), kind, required, default: None }
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// Compiled, immutable argument schema for one route. Slot indices are
/// assigned by descriptor position, so "contiguous 0..N-1" holds by
/// construction rather than by a checked invariant on caller-supplied data.
#[derive(Debug, Clone)]
pub struct Schema {
    slots: Vec<SlotDescriptor>,
    by_name: HashMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaCompileError {
    DuplicateName(String),
}

impl std::fmt::Display for SchemaCompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaCompileError::DuplicateName(name) => write!(f, "duplicate slot name '{name}'"),
        }
    }
}

impl std::error::Error for SchemaCompileError {}

impl Schema {
    pub fn compile(slots: Vec<SlotDescriptor>) -> Result<Self, SchemaCompileError> {
        let mut by_name = HashMap::with_capacity(slots.len());
        for (idx, slot) in slots.iter().enumerate() {
            if by_name.insert(slot.name.clone(), idx).is_some() {
                return Err(SchemaCompileError::DuplicateName(slot.name.clone()));
            }
        }
        Ok(Self { slots, by_name })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn slot(&self, index: usize) -> &SlotDescriptor {
        &self.slots[index]
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Flag(bool),
    Integer(i64),
    Number(f64),
    Str(String),
    ListInteger(Vec<i64>),
    ListNumber(Vec<f64>),
    ListString(Vec<String>),
}

impl Value {
    fn zero_for(kind: SlotKind) -> Self {
        match kind {
            SlotKind::Flag => Value::Flag(false),
            SlotKind::Integer => Value::Integer(0),
            SlotKind::Number => Value::Number(0.0),
            SlotKind::String => Value::Str(String::new()),
            SlotKind::ListInteger => Value::ListInteger(Vec::new()),
            SlotKind::ListNumber => Value::ListNumber(Vec::new()),
            SlotKind::ListString => Value::ListString(Vec::new()),
        }
    }
}

struct Cell {
    exists: bool,
    value: Value,
}

/// Dense, per-request array of parsed argument values, addressed by slot
/// index. Created when a query string is parsed against a `Schema`;
/// destroyed with the request context that owns it. Holds a shared
/// reference to the compiled schema (routes keep schemas behind an `Arc`)
/// rather than borrowing it, so a context can own both its schema handle
/// and its value store without a self-referential struct.
pub struct ValueStore {
    schema: std::sync::Arc<Schema>,
    cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    UnknownKey(String),
    MissingRequired(String),
    ParseFailure { name: String, kind: SlotKind },
    ListAppendIntoNonList(String),
}

impl std::fmt::Display for ArgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgError::UnknownKey(k) => write!(f, "unknown query argument '{k}'"),
            ArgError::MissingRequired(k) => write!(f, "missing required argument '{k}'"),
            ArgError::ParseFailure { name, kind } => {
                write!(f, "argument '{name}' does not parse as {kind:?}")
            }
            ArgError::ListAppendIntoNonList(k) => {
                write!(f, "argument '{k}' repeated but is not list-valued")
            }
        }
    }
}

impl std::error::Error for ArgError {}

impl ValueStore {
    /// Parses a URL-encoded `k=v&k=v` query-string tail (without the
    /// leading `?`) against `schema`.
    pub fn parse(schema: std::sync::Arc<Schema>, query: &str) -> Result<Self, ArgError> {
        let mut cells: Vec<Cell> = schema
            .slots
            .iter()
            .map(|s| Cell { exists: false, value: Value::zero_for(s.kind) })
            .collect();

        if !query.is_empty() {
            for pair in query.split('&') {
                if pair.is_empty() {
                    continue; // tolerated trailing '&'
                }
                let (raw_key, raw_val) = match pair.split_once('=') {
                    Some((k, v)) => (k, v),
                    None => (pair, ""),
                };
                let key = percent_decode(raw_key);
                let val = percent_decode(raw_val);

                let idx = match schema.index_of(&key) {
                    Some(i) => i,
                    None => return Err(ArgError::UnknownKey(key)),
                };
                let descriptor = &schema.slots[idx];
                apply_value(descriptor, &mut cells[idx], &val)?;
            }
        }

        for (idx, slot) in schema.slots.iter().enumerate() {
            if cells[idx].exists {
                continue;
            }
            match &slot.default {
                Some(default) => {
                    cells[idx].value = default_to_value(slot.kind, default);
                    cells[idx].exists = true;
                }
                None if slot.required => {
                    return Err(ArgError::MissingRequired(slot.name.clone()));
                }
                None => {} // optional, absent, no default: stays at zero value, exists = false
            }
        }

        Ok(Self { schema, cells })
    }

    pub fn exists(&self, index: usize) -> bool {
        self.cells[index].exists
    }

    pub fn flag(&self, index: usize) -> bool {
        match self.cells[index].value {
            Value::Flag(b) => b,
            _ => panic!("schema slot {index} is not a flag"),
        }
    }

    pub fn integer(&self, index: usize) -> i64 {
        match self.cells[index].value {
            Value::Integer(n) => n,
            _ => panic!("schema slot {index} is not an integer"),
        }
    }

    pub fn number(&self, index: usize) -> f64 {
        match self.cells[index].value {
            Value::Number(n) => n,
            _ => panic!("schema slot {index} is not a number"),
        }
    }

    pub fn string(&self, index: usize) -> &str {
        match &self.cells[index].value {
            Value::Str(s) => s,
            _ => panic!("schema slot {index} is not a string"),
        }
    }

    pub fn list_len(&self, index: usize) -> usize {
        match &self.cells[index].value {
            Value::ListInteger(v) => v.len(),
            Value::ListNumber(v) => v.len(),
            Value::ListString(v) => v.len(),
            _ => panic!("schema slot {index} is not a list"),
        }
    }

    pub fn list_integer(&self, index: usize, at: usize) -> i64 {
        match &self.cells[index].value {
            Value::ListInteger(v) => v[at],
            _ => panic!("schema slot {index} is not an integer list"),
        }
    }

    pub fn list_number(&self, index: usize, at: usize) -> f64 {
        match &self.cells[index].value {
            Value::ListNumber(v) => v[at],
            _ => panic!("schema slot {index} is not a number list"),
        }
    }

    pub fn list_string(&self, index: usize, at: usize) -> &str {
        match &self.cells[index].value {
            Value::ListString(v) => &v[at],
            _ => panic!("schema slot {index} is not a string list"),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

fn default_to_value(kind: SlotKind, default: &DefaultValue) -> Value {
    match (kind, default) {
        (SlotKind::Flag, DefaultValue::Flag(b)) => Value::Flag(*b),
        (SlotKind::Integer, DefaultValue::Integer(n)) => Value::Integer(*n),
        (SlotKind::Number, DefaultValue::Number(n)) => Value::Number(*n),
        (SlotKind::String, DefaultValue::String(s)) => Value::Str(s.clone()),
        _ => panic!("default value kind does not match slot kind"),
    }
}

fn apply_value(descriptor: &SlotDescriptor, cell: &mut Cell, raw: &str) -> Result<(), ArgError> {
    let is_list = matches!(
        descriptor.kind,
        SlotKind::ListInteger | SlotKind::ListNumber | SlotKind::ListString
    );
    if !is_list && cell.exists {
        return Err(ArgError::ListAppendIntoNonList(descriptor.name.clone()));
    }
    match descriptor.kind {
        SlotKind::Flag => {
            cell.value = Value::Flag(true);
            cell.exists = true;
        }
        SlotKind::Integer => {
            if raw.is_empty() && !descriptor.required {
                return Ok(());
            }
            let n: i64 = raw.parse().map_err(|_| ArgError::ParseFailure {
                name: descriptor.name.clone(),
                kind: descriptor.kind,
            })?;
            cell.value = Value::Integer(n);
            cell.exists = true;
        }
        SlotKind::Number => {
            if raw.is_empty() && !descriptor.required {
                return Ok(());
            }
            let n: f64 = raw.parse().map_err(|_| ArgError::ParseFailure {
                name: descriptor.name.clone(),
                kind: descriptor.kind,
            })?;
            cell.value = Value::Number(n);
            cell.exists = true;
        }
        SlotKind::String => {
            cell.value = Value::Str(raw.to_string());
            cell.exists = true;
        }
        SlotKind::ListInteger => {
            let n: i64 = raw.parse().map_err(|_| ArgError::ParseFailure {
                name: descriptor.name.clone(),
                kind: descriptor.kind,
            })?;
            match &mut cell.value {
                Value::ListInteger(v) => v.push(n),
                _ => unreachable!(),
            }
            cell.exists = true;
        }
        SlotKind::ListNumber => {
            let n: f64 = raw.parse().map_err(|_| ArgError::ParseFailure {
                name: descriptor.name.clone(),
                kind: descriptor.kind,
            })?;
            match &mut cell.value {
                Value::ListNumber(v) => v.push(n),
                _ => unreachable!(),
            }
            cell.exists = true;
        }
        SlotKind::ListString => {
            match &mut cell.value {
                Value::ListString(v) => v.push(raw.to_string()),
                _ => unreachable!(),
            }
            cell.exists = true;
        }
    }
    Ok(())
}

/// Decodes `%XX` escapes only; `+` is left as a literal plus, since nothing
/// in the wire format description calls for space substitution.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            let byte = hex.and_then(|h| u8::from_str_radix(h, 16).ok());
            match byte {
                Some(b) => {
                    out.push(b);
                    i += 3;
                    continue;
                }
                None => {}
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_schema() -> Schema {
        Schema::compile(vec![
            SlotDescriptor::new("name", SlotKind::String, false)
                .with_default(DefaultValue::String("world".into())),
        ])
        .unwrap()
    }

    #[test]
    fn parses_supplied_value() {
        let schema = name_schema();
        let store = ValueStore::parse(std::sync::Arc::new(schema), "name=ada").unwrap();
        assert_eq!(store.string(0), "ada");
        assert!(store.exists(0));
    }

    #[test]
    fn falls_back_to_default_when_absent() {
        let schema = name_schema();
        let store = ValueStore::parse(std::sync::Arc::new(schema), "").unwrap();
        assert_eq!(store.string(0), "world");
    }

    #[test]
    fn unknown_key_is_arg_error() {
        let schema = name_schema();
        assert_eq!(
            ValueStore::parse(std::sync::Arc::new(schema), "bogus=1").unwrap_err(),
            ArgError::UnknownKey("bogus".to_string())
        );
    }

    #[test]
    fn missing_required_is_arg_error() {
        let schema = Schema::compile(vec![SlotDescriptor::new("id", SlotKind::Integer, true)]).unwrap();
        assert_eq!(
            ValueStore::parse(std::sync::Arc::new(schema), "").unwrap_err(),
            ArgError::MissingRequired("id".to_string())
        );
    }

    #[test]
    fn repeated_key_builds_a_list() {
        let schema = Schema::compile(vec![SlotDescriptor::new("tag", SlotKind::ListString, false)]).unwrap();
        let store = ValueStore::parse(std::sync::Arc::new(schema), "tag=a&tag=b&tag=c").unwrap();
        assert_eq!(store.list_len(0), 3);
        assert_eq!(store.list_string(0, 1), "b");
    }

    #[test]
    fn repeated_key_into_scalar_slot_is_an_error() {
        let schema = Schema::compile(vec![SlotDescriptor::new("id", SlotKind::Integer, false)]).unwrap();
        assert_eq!(
            ValueStore::parse(std::sync::Arc::new(schema), "id=1&id=2").unwrap_err(),
            ArgError::ListAppendIntoNonList("id".to_string())
        );
    }

    #[test]
    fn percent_decoding_handles_reserved_bytes() {
        assert_eq!(percent_decode("a%20b%2Fc"), "a b/c");
    }

    #[test]
    fn duplicate_slot_names_fail_compilation() {
        let err = Schema::compile(vec![
            SlotDescriptor::new("x", SlotKind::Integer, false),
            SlotDescriptor::new("x", SlotKind::String, false),
        ])
        .unwrap_err();
        assert_eq!(err, SchemaCompileError::DuplicateName("x".to_string()));
    }
}
