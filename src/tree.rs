//! Generic tree values for fragment payloads.
//!
//! A fragment's payload is parsed into a [`TreeValue`]: an order-preserving tree of
//! nulls, booleans, integers, floats, strings, sequences and string-keyed mappings.
//! The text is read as a stream of YAML events and every plain scalar is typed by
//! [`resolve_plain`], trying each rule in order:
//!
//! | plain scalar                                   | resolves to          |
//! |------------------------------------------------|----------------------|
//! | empty, `~`, `null` in any case                 | `Null`               |
//! | `true`, `false` in any case                    | `Bool`               |
//! | base-10 integer (`0123` is 123, `0x1A` is not) | `Int`                |
//! | finite decimal or exponential literal          | `Float`              |
//! | `.nan`, `.inf`, `+.inf`, `-.inf` in any case   | `Float` (non-finite) |
//! | anything else                                  | `String`             |
//!
//! Integers outside `i64` become floats. Quoted and block scalars are never resolved;
//! they always stay strings. Mapping keys are kept as their raw text. When a key
//! repeats, the last value wins and the key keeps the position of its first
//! occurrence.
//!
//! [`serialize`] writes block-style YAML and quotes every string that
//! [`resolve_plain`] would otherwise type, so `parse(&serialize(v)?)` reproduces `v`
//! for every non-NaN tree.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, DeserializeOwned, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize, Deserializer};
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

use crate::errors::HarnessError;

// ============================================================================
// TREE VALUE
// ============================================================================

/// The generic parsed representation of a fragment payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TreeValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<TreeValue>),
    Mapping(Mapping),
}

impl TreeValue {
    /// Converts any serializable value into a tree. Strings stay strings; numbers
    /// and booleans keep their type.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, HarnessError> {
        serde_yaml::to_value(value)
            .map(from_yaml_value)
            .map_err(|e| HarnessError::parse("value", "", e.to_string(), None))
    }

    /// Deserializes this tree into a concrete type.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, HarnessError> {
        serde_yaml::to_value(self)
            .and_then(serde_yaml::from_value)
            .map_err(|e| HarnessError::parse("value", "", e.to_string(), None))
    }

    /// True for values that carry nothing worth writing back to a document.
    pub fn is_empty(&self) -> bool {
        match self {
            TreeValue::Null => true,
            TreeValue::String(s) => s.is_empty(),
            TreeValue::Sequence(items) => items.is_empty(),
            TreeValue::Mapping(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&TreeValue> {
        match self {
            TreeValue::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TreeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TreeValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TreeValue::Float(n) => Some(*n),
            TreeValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TreeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[TreeValue]> {
        match self {
            TreeValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            TreeValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TreeValue::Null => "null",
            TreeValue::Bool(_) => "bool",
            TreeValue::Int(_) => "int",
            TreeValue::Float(_) => "float",
            TreeValue::String(_) => "string",
            TreeValue::Sequence(_) => "sequence",
            TreeValue::Mapping(_) => "mapping",
        }
    }
}

impl From<&str> for TreeValue {
    fn from(value: &str) -> Self {
        TreeValue::String(value.to_string())
    }
}

impl From<String> for TreeValue {
    fn from(value: String) -> Self {
        TreeValue::String(value)
    }
}

impl From<i64> for TreeValue {
    fn from(value: i64) -> Self {
        TreeValue::Int(value)
    }
}

impl From<f64> for TreeValue {
    fn from(value: f64) -> Self {
        TreeValue::Float(value)
    }
}

impl From<bool> for TreeValue {
    fn from(value: bool) -> Self {
        TreeValue::Bool(value)
    }
}

impl From<Vec<TreeValue>> for TreeValue {
    fn from(items: Vec<TreeValue>) -> Self {
        TreeValue::Sequence(items)
    }
}

impl From<Mapping> for TreeValue {
    fn from(map: Mapping) -> Self {
        TreeValue::Mapping(map)
    }
}

impl fmt::Display for TreeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serialize(self) {
            Ok(text) => f.write_str(text.trim_end_matches('\n')),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}

/// Insertion-ordered mapping with unique string keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping {
    entries: Vec<(String, TreeValue)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `key`. An existing key keeps its position and has its
    /// value replaced; the previous value is returned.
    pub fn insert(&mut self, key: impl Into<String>, value: TreeValue) -> Option<TreeValue> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&TreeValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TreeValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, TreeValue)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, TreeValue)>>(iter: I) -> Self {
        let mut map = Mapping::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

// ============================================================================
// CODEC
// ============================================================================

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-+]?[0-9]+$").unwrap());
static FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?(\.[0-9]+|[0-9]+(\.[0-9]*)?)([eE][-+]?[0-9]+)?$").unwrap()
});

/// Parses fragment text into a tree.
pub fn parse(text: &str) -> Result<TreeValue, HarnessError> {
    parse_named("fragment", text)
}

/// Parses fragment text, naming the source in diagnostics (usually the display name).
pub fn parse_named(name: &str, text: &str) -> Result<TreeValue, HarnessError> {
    if is_blank_document(text) {
        return Ok(TreeValue::Null);
    }
    let mut builder = TreeBuilder::default();
    let loaded = Parser::new(text.chars()).load(&mut builder, false);
    if let Some((message, index)) = builder.error.take() {
        return Err(HarnessError::parse(name, text, message, Some(byte_offset(text, index))));
    }
    if let Err(error) = loaded {
        let offset = byte_offset(text, error.marker().index());
        return Err(HarnessError::parse(name, text, error.to_string(), Some(offset)));
    }
    Ok(builder.root.unwrap_or_default())
}

/// Types a plain (unquoted, non-block) scalar.
pub fn resolve_plain(text: &str) -> TreeValue {
    if text.is_empty() || text == "~" || text.eq_ignore_ascii_case("null") {
        return TreeValue::Null;
    }
    if text.eq_ignore_ascii_case("true") {
        return TreeValue::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return TreeValue::Bool(false);
    }
    if INTEGER.is_match(text) {
        return match text.parse::<i64>() {
            Ok(n) => TreeValue::Int(n),
            Err(_) => finite_float(text),
        };
    }
    if FLOAT.is_match(text) {
        return finite_float(text);
    }
    if text.eq_ignore_ascii_case(".nan") {
        TreeValue::Float(f64::NAN)
    } else if text.eq_ignore_ascii_case(".inf") || text.eq_ignore_ascii_case("+.inf") {
        TreeValue::Float(f64::INFINITY)
    } else if text.eq_ignore_ascii_case("-.inf") {
        TreeValue::Float(f64::NEG_INFINITY)
    } else {
        TreeValue::String(text.to_string())
    }
}

// Literals that overflow to infinity are not numbers.
fn finite_float(text: &str) -> TreeValue {
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() => TreeValue::Float(n),
        _ => TreeValue::String(text.to_string()),
    }
}

fn is_blank_document(text: &str) -> bool {
    text.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    })
}

fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(offset, _)| offset)
}

enum Open {
    Sequence {
        anchor: usize,
        items: Vec<TreeValue>,
    },
    Mapping {
        anchor: usize,
        entries: Mapping,
        key: Option<String>,
    },
}

/// Assembles a tree from parser events. Only the first error is kept.
#[derive(Default)]
struct TreeBuilder {
    open: Vec<Open>,
    anchors: HashMap<usize, TreeValue>,
    root: Option<TreeValue>,
    error: Option<(String, usize)>,
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, event: Event, mark: Marker) {
        if self.error.is_some() {
            return;
        }
        if let Err(message) = self.accept(event) {
            self.error = Some((message, mark.index()));
        }
    }
}

impl TreeBuilder {
    fn accept(&mut self, event: Event) -> Result<(), String> {
        match event {
            Event::Scalar(text, style, anchor, ..) => {
                if let Some(Open::Mapping { key: key @ None, .. }) = self.open.last_mut() {
                    *key = Some(text);
                    return Ok(());
                }
                let value = match style {
                    TScalarStyle::Plain => resolve_plain(&text),
                    _ => TreeValue::String(text),
                };
                self.close(value, anchor)
            }
            Event::SequenceStart(anchor, ..) => {
                self.reject_complex_key()?;
                self.open.push(Open::Sequence {
                    anchor,
                    items: Vec::new(),
                });
                Ok(())
            }
            Event::MappingStart(anchor, ..) => {
                self.reject_complex_key()?;
                self.open.push(Open::Mapping {
                    anchor,
                    entries: Mapping::new(),
                    key: None,
                });
                Ok(())
            }
            Event::SequenceEnd | Event::MappingEnd => match self.open.pop() {
                Some(Open::Sequence { anchor, items }) => {
                    self.close(TreeValue::Sequence(items), anchor)
                }
                Some(Open::Mapping { anchor, entries, .. }) => {
                    self.close(TreeValue::Mapping(entries), anchor)
                }
                None => Err("unbalanced end of collection".to_string()),
            },
            Event::Alias(id) => {
                self.reject_complex_key()?;
                let value = self
                    .anchors
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| "alias refers to an unknown anchor".to_string())?;
                self.close(value, 0)
            }
            _ => Ok(()),
        }
    }

    fn reject_complex_key(&self) -> Result<(), String> {
        match self.open.last() {
            Some(Open::Mapping { key: None, .. }) => {
                Err("mapping keys must be plain text scalars".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Hands a finished value to its parent, or makes it the root.
    fn close(&mut self, value: TreeValue, anchor: usize) -> Result<(), String> {
        if anchor > 0 {
            self.anchors.insert(anchor, value.clone());
        }
        match self.open.last_mut() {
            None => self.root = Some(value),
            Some(Open::Sequence { items, .. }) => items.push(value),
            Some(Open::Mapping { entries, key, .. }) => {
                let key = key
                    .take()
                    .ok_or_else(|| "mapping value without a key".to_string())?;
                entries.insert(key, value);
            }
        }
        Ok(())
    }
}

fn from_yaml_value(value: serde_yaml::Value) -> TreeValue {
    use serde_yaml::Value;

    match value {
        Value::Null => TreeValue::Null,
        Value::Bool(b) => TreeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => TreeValue::Int(i),
            None => TreeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => TreeValue::String(s),
        Value::Sequence(items) => {
            TreeValue::Sequence(items.into_iter().map(from_yaml_value).collect())
        }
        Value::Mapping(map) => TreeValue::Mapping(
            map.into_iter()
                .map(|(key, value)| {
                    let key = match key {
                        Value::String(s) => s,
                        other => from_yaml_value(other).to_string(),
                    };
                    (key, from_yaml_value(value))
                })
                .collect(),
        ),
        // Enum variants carrying data: `{Variant: data}`.
        Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let variant = tag.trim_start_matches('!').to_string();
            TreeValue::Mapping(std::iter::once((variant, from_yaml_value(tagged.value))).collect())
        }
    }
}

// ============================================================================
// EMITTER
// ============================================================================

/// Serializes a tree to block-style YAML text terminated by a newline.
///
/// Never fails; the `Result` matches the rest of the codec surface.
pub fn serialize(value: &TreeValue) -> Result<String, HarnessError> {
    let mut out = String::new();
    match value {
        TreeValue::Mapping(map) if !map.is_empty() => write_mapping(&mut out, map, 0, false),
        TreeValue::Sequence(items) if !items.is_empty() => {
            write_sequence(&mut out, items, 0, false)
        }
        scalar => write_scalar(&mut out, scalar, 2),
    }
    Ok(out)
}

fn pad(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat(' ').take(indent));
}

/// `inline_first` continues the current line (after a `- ` item marker).
fn write_mapping(out: &mut String, map: &Mapping, indent: usize, inline_first: bool) {
    for (position, (key, value)) in map.iter().enumerate() {
        if position > 0 || !inline_first {
            pad(out, indent);
        }
        write_inline_string(out, key);
        out.push(':');
        match value {
            TreeValue::Mapping(child) if !child.is_empty() => {
                out.push('\n');
                write_mapping(out, child, indent + 2, false);
            }
            TreeValue::Sequence(items) if !items.is_empty() => {
                out.push('\n');
                write_sequence(out, items, indent, false);
            }
            scalar => {
                out.push(' ');
                write_scalar(out, scalar, indent + 2);
            }
        }
    }
}

fn write_sequence(out: &mut String, items: &[TreeValue], indent: usize, inline_first: bool) {
    for (position, item) in items.iter().enumerate() {
        if position > 0 || !inline_first {
            pad(out, indent);
        }
        out.push_str("- ");
        match item {
            TreeValue::Mapping(child) if !child.is_empty() => {
                write_mapping(out, child, indent + 2, true)
            }
            TreeValue::Sequence(child) if !child.is_empty() => {
                write_sequence(out, child, indent + 2, true)
            }
            scalar => write_scalar(out, scalar, indent + 2),
        }
    }
}

/// Writes a scalar (or an empty collection) and ends the line. Literal blocks put
/// their content at `block_indent`.
fn write_scalar(out: &mut String, value: &TreeValue, block_indent: usize) {
    match value {
        TreeValue::Null => out.push_str("null"),
        TreeValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        TreeValue::Int(n) => {
            let _ = write!(out, "{}", n);
        }
        TreeValue::Float(n) => out.push_str(&float_text(*n)),
        TreeValue::String(s) if fits_literal_block(s) => {
            write_literal_block(out, s, block_indent);
            return;
        }
        TreeValue::String(s) => write_inline_string(out, s),
        TreeValue::Sequence(_) => out.push_str("[]"),
        TreeValue::Mapping(_) => out.push_str("{}"),
    }
    out.push('\n');
}

fn float_text(n: f64) -> String {
    if n.is_nan() {
        ".nan".to_string()
    } else if n == f64::INFINITY {
        ".inf".to_string()
    } else if n == f64::NEG_INFINITY {
        "-.inf".to_string()
    } else {
        // Debug output always carries a `.` or an exponent, so it reads back as a float.
        format!("{:?}", n)
    }
}

fn write_inline_string(out: &mut String, s: &str) {
    if is_plain_safe(s) {
        out.push_str(s);
    } else {
        write_double_quoted(out, s);
    }
}

/// True when `s` can be written unquoted and reads back as the same string.
fn is_plain_safe(s: &str) -> bool {
    let Some(first) = s.chars().next() else {
        return false;
    };
    matches!(resolve_plain(s), TreeValue::String(_))
        && !"-?:,[]{}#&*!|>'\"%@`+.".contains(first)
        && !first.is_ascii_digit()
        && s.trim() == s
        && !s.chars().any(|c| c.is_control() || is_special_break(c))
        && !s.contains(": ")
        && !s.contains(" #")
        && !s.ends_with(':')
        && !["yes", "no", "on", "off", "y", "n"]
            .iter()
            .any(|word| s.eq_ignore_ascii_case(word))
}

fn is_special_break(c: char) -> bool {
    matches!(c, '\u{85}' | '\u{2028}' | '\u{2029}' | '\u{feff}')
}

/// Multi-line text that a `|` block reproduces exactly.
fn fits_literal_block(s: &str) -> bool {
    let body = s.trim_end_matches('\n');
    s.contains('\n')
        && !body.is_empty()
        && !body.starts_with(|c: char| c == '\n' || c.is_whitespace())
        && !s.chars().any(|c| (c.is_control() && c != '\n') || is_special_break(c))
        && body
            .split('\n')
            .all(|line| line.is_empty() || !line.trim().is_empty())
}

fn write_literal_block(out: &mut String, s: &str, indent: usize) {
    let body = s.trim_end_matches('\n');
    let chomp = match s.len() - body.len() {
        0 => "-",
        1 => "",
        _ => "+",
    };
    out.push('|');
    out.push_str(chomp);
    out.push('\n');
    for line in body.split('\n') {
        if !line.is_empty() {
            pad(out, indent);
            out.push_str(line);
        }
        out.push('\n');
    }
    // Kept trailing newlines beyond the first are written as empty lines.
    for _ in 1..(s.len() - body.len()) {
        out.push('\n');
    }
}

fn write_double_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() || is_special_break(c) => {
                let code = u32::from(c);
                let _ = if code <= 0xffff {
                    write!(out, "\\u{:04x}", code)
                } else {
                    write!(out, "\\U{:08x}", code)
                };
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

impl Serialize for TreeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TreeValue::Null => serializer.serialize_unit(),
            TreeValue::Bool(b) => serializer.serialize_bool(*b),
            TreeValue::Int(n) => serializer.serialize_i64(*n),
            TreeValue::Float(n) => serializer.serialize_f64(*n),
            TreeValue::String(s) => serializer.serialize_str(s),
            TreeValue::Sequence(items) => serializer.collect_seq(items),
            TreeValue::Mapping(map) => serializer.collect_map(map.iter()),
        }
    }
}

impl<'de> Deserialize<'de> for TreeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TreeVisitor)
    }
}

struct TreeVisitor;

impl<'de> Visitor<'de> for TreeVisitor {
    type Value = TreeValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar, sequence or mapping")
    }

    fn visit_unit<E: de::Error>(self) -> Result<TreeValue, E> {
        Ok(TreeValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<TreeValue, E> {
        Ok(TreeValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<TreeValue, D::Error> {
        TreeValue::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<TreeValue, E> {
        Ok(TreeValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<TreeValue, E> {
        Ok(TreeValue::Int(v))
    }

    // Integers that do not fit in i64 fall back to floats.
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<TreeValue, E> {
        Ok(i64::try_from(v)
            .map(TreeValue::Int)
            .unwrap_or(TreeValue::Float(v as f64)))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<TreeValue, E> {
        Ok(i64::try_from(v)
            .map(TreeValue::Int)
            .unwrap_or(TreeValue::Float(v as f64)))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<TreeValue, E> {
        Ok(i64::try_from(v)
            .map(TreeValue::Int)
            .unwrap_or(TreeValue::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<TreeValue, E> {
        Ok(TreeValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<TreeValue, E> {
        Ok(TreeValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<TreeValue, E> {
        Ok(TreeValue::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<TreeValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<TreeValue>()? {
            items.push(item);
        }
        Ok(TreeValue::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TreeValue, A::Error> {
        let mut map = Mapping::new();
        while let Some(key) = access.next_key_seed(RawKey)? {
            let value = access.next_value::<TreeValue>()?;
            map.insert(key, value);
        }
        Ok(TreeValue::Mapping(map))
    }
}

/// Reads a mapping key as its raw scalar text, bypassing type resolution.
struct RawKey;

impl<'de> DeserializeSeed<'de> for RawKey {
    type Value = String;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<String, D::Error> {
        deserializer.deserialize_str(RawKeyVisitor)
    }
}

struct RawKeyVisitor;

impl<'de> Visitor<'de> for RawKeyVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar mapping key")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }
}
