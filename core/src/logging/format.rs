//! Turns arbitrary values into log-friendly strings.
//!
//! # Design
//! Values are rendered through a filtering `serde::Serializer` that builds a
//! `serde_json::Value`. Going through our own serializer instead of
//! `serde_json::to_value` keeps the serde container names visible, which is
//! what the deny-list matches on.
//!
//! - A field whose value type is denied is dropped from its parent.
//! - A denied struct elsewhere (top level, sequence element) renders as `{}`.
//! - A value reached again while it is still being serialized is a
//!   back-edge of a reference cycle and is skipped like a denied field.
//! - Containers nested deeper than `max_depth` are dropped.
//! - [`LoggableMessage`] implementers render as their own string.
//!
//! Only a real string at the top level is returned as-is. Enum variants,
//! newtypes and chars that merely serialize to a JSON string are quoted.

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::sync::{Arc, LazyLock};

use serde::ser::{self, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::error::FormatError;

/// Target of the always-on channel that reports formatter failures.
pub const CRISIS_TARGET: &str = "service_infra::crisis";

/// Newtype name that marks a value produced by a [`LoggableMessage`].
/// Other serializers treat the newtype as transparent.
const LOGGABLE_TOKEN: &str = "$service_infra::Loggable";

const DEFAULT_MAX_DEPTH: usize = 64;

static DEFAULT_FORMATTER: LazyLock<MessageFormatter> = LazyLock::new(MessageFormatter::default);

/// A value that supplies its own log representation.
pub trait LoggableMessage {
    fn to_loggable_string(&self) -> String;
}

/// Serializes a [`LoggableMessage`] as its loggable string.
///
/// Usable as `#[serde(serialize_with = "serialize_loggable")]`.
pub fn serialize_loggable<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: LoggableMessage + ?Sized,
    S: Serializer,
{
    serializer.serialize_newtype_struct(LOGGABLE_TOKEN, &value.to_loggable_string())
}

/// Borrowing wrapper that serializes any [`LoggableMessage`] through
/// [`serialize_loggable`].
#[derive(Debug, Clone, Copy)]
pub struct Loggable<'a, T: ?Sized>(pub &'a T);

impl<T: LoggableMessage + ?Sized> Serialize for Loggable<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_loggable(self.0, serializer)
    }
}

/// Implements `Serialize` for [`LoggableMessage`] types so they render as
/// their loggable string wherever they appear.
#[macro_export]
macro_rules! impl_loggable_serialize {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ::serde::Serialize for $ty {
                fn serialize<S: ::serde::Serializer>(
                    &self,
                    serializer: S,
                ) -> ::core::result::Result<S::Ok, S::Error> {
                    $crate::logging::serialize_loggable(self, serializer)
                }
            }
        )+
    };
}

/// Predicate over serde container names deciding which types are dropped.
#[derive(Clone)]
pub struct TypeFilter {
    denies: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl TypeFilter {
    /// Rich-text wrappers that are too large or too noisy to log.
    pub const RICH_TEXT_TYPES: [&'static str; 4] =
        ["PropertyXhtmlString", "XhtmlString", "PropertyXForm", "XForm"];

    /// Denies exactly the given type names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        Self::from_predicate(move |name| names.iter().any(|denied| denied == name))
    }

    pub fn from_predicate<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            denies: Arc::new(predicate),
        }
    }

    /// Lets every type through.
    pub fn allow_all() -> Self {
        Self::from_predicate(|_| false)
    }

    /// Additionally denies `name`.
    pub fn deny(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let previous = self.denies;
        Self::from_predicate(move |candidate| candidate == name || previous(candidate))
    }

    pub fn denies(&self, type_name: &str) -> bool {
        (self.denies)(type_name)
    }
}

impl Default for TypeFilter {
    fn default() -> Self {
        Self::new(Self::RICH_TEXT_TYPES)
    }
}

impl fmt::Debug for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeFilter").finish_non_exhaustive()
    }
}

/// Renders values for log sinks.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    filter: TypeFilter,
    max_depth: usize,
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self {
            filter: TypeFilter::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl MessageFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: TypeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Containers nested deeper than this are left out, even without a cycle.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Formats `message` for a log sink.
    ///
    /// Returns `None` for absent values (anything serializing to `null`).
    /// On a serialization error the failure is reported on
    /// [`CRISIS_TARGET`] and the `Debug` form is returned instead.
    pub fn format<T>(&self, message: &T) -> Option<String>
    where
        T: Serialize + fmt::Debug + ?Sized,
    {
        match self.render(message) {
            Ok(Node::Value(Value::Null)) | Ok(Node::Skipped) => None,
            Ok(Node::Text(text)) => Some(text),
            Ok(node) => node.into_element().map(|value| value.to_string()),
            Err(error) => {
                tracing::error!(
                    target: CRISIS_TARGET,
                    log_message = ?message,
                    %error,
                    "Error when serializing log message"
                );
                Some(format!("{message:?}"))
            }
        }
    }

    /// The filtered JSON tree for `message`.
    pub fn to_value<T>(&self, message: &T) -> Result<Value, FormatError>
    where
        T: Serialize + ?Sized,
    {
        Ok(self.render(message)?.into_element().unwrap_or(Value::Null))
    }

    fn render<T>(&self, message: &T) -> Result<Node, FormatError>
    where
        T: Serialize + ?Sized,
    {
        let path = Path::default();
        FilterSerializer {
            filter: &self.filter,
            path: &path,
            depth: 0,
            max_depth: self.max_depth,
        }
        .visit(message)
    }
}

/// Formats `message` with the default deny-list.
pub fn format_message<T>(message: &T) -> Option<String>
where
    T: Serialize + fmt::Debug + ?Sized,
{
    DEFAULT_FORMATTER.format(message)
}

/// Result of serializing one value.
#[derive(Debug)]
enum Node {
    Value(Value),
    /// A plain string, the only thing returned unquoted at the top level.
    Text(String),
    /// Output of a `LoggableMessage`.
    Loggable(String),
    /// A value of a denied type.
    Denied,
    /// A container past the depth limit, or a back-edge of a cycle.
    Skipped,
}

impl Node {
    /// Value to store under a field name; denied and skipped fields vanish.
    fn into_field(self) -> Option<Value> {
        match self {
            Node::Value(value) => Some(value),
            Node::Text(text) | Node::Loggable(text) => Some(Value::String(text)),
            Node::Denied | Node::Skipped => None,
        }
    }

    /// Value to store in a sequence; a denied element keeps its slot as `{}`.
    fn into_element(self) -> Option<Value> {
        match self {
            Node::Denied => Some(Value::Object(Map::new())),
            other => other.into_field(),
        }
    }

    /// Wrapped strings are no longer plain strings.
    fn quoted(self) -> Node {
        match self {
            Node::Text(text) => Node::Value(Value::String(text)),
            other => other,
        }
    }
}

fn wrap_variant(variant: Option<&'static str>, value: Value) -> Value {
    match variant {
        Some(variant) => {
            let mut object = Map::new();
            object.insert(variant.to_owned(), value);
            Value::Object(object)
        }
        None => value,
    }
}

/// Address and type of a value being serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Identity {
    address: usize,
    type_name: &'static str,
}

impl Identity {
    /// `None` for zero-sized values, which may share an address.
    fn of<T: ?Sized>(value: &T) -> Option<Self> {
        if mem::size_of_val(value) == 0 {
            return None;
        }
        Some(Self {
            address: (value as *const T).cast::<()>() as usize,
            type_name: type_name::<T>(),
        })
    }
}

/// A struct being serialized, known by its first non-empty field.
///
/// Serde never hands the struct itself to the serializer, but a derived
/// `Serialize` passes `&self.field`, whose address moves with the struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Anchor {
    container: &'static str,
    key: &'static str,
    field: Identity,
}

/// What is open between the root and the value being serialized.
///
/// Entries are live borrows, so meeting one again means a reference cycle.
/// A value reachable twice without a cycle is rendered both times.
#[derive(Default)]
struct Path {
    values: RefCell<Vec<Identity>>,
    structs: RefCell<Vec<Anchor>>,
}

impl Path {
    /// Registers `anchor`, or returns `false` if that struct is already open.
    fn open_struct(&self, anchor: Anchor) -> bool {
        let mut structs = self.structs.borrow_mut();
        if structs.contains(&anchor) {
            return false;
        }
        structs.push(anchor);
        true
    }

    fn close_struct(&self) {
        self.structs.borrow_mut().pop();
    }
}

#[derive(Clone, Copy)]
struct FilterSerializer<'a> {
    filter: &'a TypeFilter,
    path: &'a Path,
    depth: usize,
    max_depth: usize,
}

impl<'a> FilterSerializer<'a> {
    /// Serializes `value` unless it is already open on the path.
    fn visit<T: ?Sized + Serialize>(self, value: &T) -> Result<Node, FormatError> {
        let Some(identity) = Identity::of(value) else {
            return value.serialize(self);
        };
        if self.path.values.borrow().contains(&identity) {
            return Ok(Node::Skipped);
        }
        self.path.values.borrow_mut().push(identity);
        let node = value.serialize(self);
        self.path.values.borrow_mut().pop();
        node
    }

    /// Serializer for the children of a container, or `None` past the limit.
    fn nested(self) -> Option<Self> {
        (self.depth < self.max_depth).then_some(Self {
            depth: self.depth + 1,
            ..self
        })
    }

    fn seq(self, denied: bool, variant: Option<&'static str>, len: Option<usize>) -> SeqCollector<'a> {
        SeqCollector {
            child: self.nested(),
            denied,
            variant,
            items: Vec::with_capacity(len.unwrap_or(0)),
        }
    }

    fn structure(
        self,
        container: &'static str,
        denied: bool,
        variant: Option<&'static str>,
    ) -> StructCollector<'a> {
        StructCollector {
            child: self.nested(),
            container,
            denied,
            variant,
            anchor: AnchorState::Pending,
            fields: Map::new(),
        }
    }
}

fn number_node<N: TryInto<i64> + TryInto<u64> + Copy + fmt::Display>(v: N) -> Result<Node, FormatError> {
    if let Ok(signed) = TryInto::<i64>::try_into(v) {
        return Ok(Node::Value(Value::Number(signed.into())));
    }
    if let Ok(unsigned) = TryInto::<u64>::try_into(v) {
        return Ok(Node::Value(Value::Number(unsigned.into())));
    }
    Err(FormatError::NumberOutOfRange(v.to_string()))
}

impl<'a> Serializer for FilterSerializer<'a> {
    type Ok = Node;
    type Error = FormatError;
    type SerializeSeq = SeqCollector<'a>;
    type SerializeTuple = SeqCollector<'a>;
    type SerializeTupleStruct = SeqCollector<'a>;
    type SerializeTupleVariant = SeqCollector<'a>;
    type SerializeMap = MapCollector<'a>;
    type SerializeStruct = StructCollector<'a>;
    type SerializeStructVariant = StructCollector<'a>;

    fn serialize_bool(self, v: bool) -> Result<Node, FormatError> {
        Ok(Node::Value(Value::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Node, FormatError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Node, FormatError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Node, FormatError> {
        self.serialize_i64(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Node, FormatError> {
        Ok(Node::Value(Value::Number(v.into())))
    }

    fn serialize_i128(self, v: i128) -> Result<Node, FormatError> {
        number_node(v)
    }

    fn serialize_u8(self, v: u8) -> Result<Node, FormatError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Node, FormatError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Node, FormatError> {
        self.serialize_u64(u64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Node, FormatError> {
        Ok(Node::Value(Value::Number(v.into())))
    }

    fn serialize_u128(self, v: u128) -> Result<Node, FormatError> {
        number_node(v)
    }

    fn serialize_f32(self, v: f32) -> Result<Node, FormatError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Node, FormatError> {
        // Non-finite floats become null, as in serde_json.
        Ok(Node::Value(Number::from_f64(v).map_or(Value::Null, Value::Number)))
    }

    fn serialize_char(self, v: char) -> Result<Node, FormatError> {
        Ok(Node::Value(Value::String(v.to_string())))
    }

    fn serialize_str(self, v: &str) -> Result<Node, FormatError> {
        Ok(Node::Text(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Node, FormatError> {
        Ok(Node::Value(Value::Array(v.iter().map(|b| Value::from(*b)).collect())))
    }

    fn serialize_none(self) -> Result<Node, FormatError> {
        Ok(Node::Value(Value::Null))
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Node, FormatError> {
        self.visit(value)
    }

    fn serialize_unit(self) -> Result<Node, FormatError> {
        Ok(Node::Value(Value::Null))
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<Node, FormatError> {
        if self.filter.denies(name) {
            return Ok(Node::Denied);
        }
        Ok(Node::Value(Value::Null))
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Node, FormatError> {
        if self.filter.denies(name) {
            return Ok(Node::Denied);
        }
        Ok(Node::Value(Value::String(variant.to_owned())))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Node, FormatError> {
        if name == LOGGABLE_TOKEN {
            return Ok(match value.serialize(self)? {
                Node::Text(text) | Node::Value(Value::String(text)) => Node::Loggable(text),
                other => other,
            });
        }
        if self.filter.denies(name) {
            return Ok(Node::Denied);
        }
        Ok(self.visit(value)?.quoted())
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Node, FormatError> {
        if self.filter.denies(name) {
            return Ok(Node::Denied);
        }
        let Some(child) = self.nested() else {
            return Ok(Node::Skipped);
        };
        match child.visit(value)? {
            Node::Skipped => Ok(Node::Skipped),
            node => Ok(Node::Value(wrap_variant(Some(variant), node.into_element().unwrap_or_default()))),
        }
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqCollector<'a>, FormatError> {
        Ok(self.seq(false, None, len))
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqCollector<'a>, FormatError> {
        Ok(self.seq(false, None, Some(len)))
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<SeqCollector<'a>, FormatError> {
        Ok(self.seq(self.filter.denies(name), None, Some(len)))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SeqCollector<'a>, FormatError> {
        Ok(self.seq(self.filter.denies(name), Some(variant), Some(len)))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapCollector<'a>, FormatError> {
        Ok(MapCollector {
            child: self.nested(),
            entries: Map::new(),
            pending_key: None,
        })
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<StructCollector<'a>, FormatError> {
        Ok(self.structure(name, self.filter.denies(name), None))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<StructCollector<'a>, FormatError> {
        Ok(self.structure(variant, self.filter.denies(name), Some(variant)))
    }
}

struct SeqCollector<'a> {
    child: Option<FilterSerializer<'a>>,
    denied: bool,
    variant: Option<&'static str>,
    items: Vec<Value>,
}

impl SeqCollector<'_> {
    fn push<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), FormatError> {
        if self.denied {
            return Ok(());
        }
        if let Some(child) = self.child {
            if let Some(item) = child.visit(value)?.into_element() {
                self.items.push(item);
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Node, FormatError> {
        if self.denied {
            return Ok(Node::Denied);
        }
        if self.child.is_none() {
            return Ok(Node::Skipped);
        }
        Ok(Node::Value(wrap_variant(self.variant, Value::Array(self.items))))
    }
}

impl ser::SerializeSeq for SeqCollector<'_> {
    type Ok = Node;
    type Error = FormatError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), FormatError> {
        self.push(value)
    }

    fn end(self) -> Result<Node, FormatError> {
        self.finish()
    }
}

impl ser::SerializeTuple for SeqCollector<'_> {
    type Ok = Node;
    type Error = FormatError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), FormatError> {
        self.push(value)
    }

    fn end(self) -> Result<Node, FormatError> {
        self.finish()
    }
}

impl ser::SerializeTupleStruct for SeqCollector<'_> {
    type Ok = Node;
    type Error = FormatError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), FormatError> {
        self.push(value)
    }

    fn end(self) -> Result<Node, FormatError> {
        self.finish()
    }
}

impl ser::SerializeTupleVariant for SeqCollector<'_> {
    type Ok = Node;
    type Error = FormatError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), FormatError> {
        self.push(value)
    }

    fn end(self) -> Result<Node, FormatError> {
        self.finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum AnchorState {
    /// No non-empty field seen yet.
    Pending,
    /// Registered on the path; released by `finish`.
    Open,
    /// This struct is already open further up.
    Revisit,
}

struct StructCollector<'a> {
    child: Option<FilterSerializer<'a>>,
    container: &'static str,
    denied: bool,
    variant: Option<&'static str>,
    anchor: AnchorState,
    fields: Map<String, Value>,
}

impl StructCollector<'_> {
    fn field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<(), FormatError> {
        if self.denied {
            return Ok(());
        }
        let Some(child) = self.child else {
            return Ok(());
        };
        match self.anchor {
            AnchorState::Revisit => return Ok(()),
            AnchorState::Open => {}
            AnchorState::Pending => {
                if let Some(field) = Identity::of(value) {
                    let anchor = Anchor {
                        container: self.container,
                        key,
                        field,
                    };
                    if !child.path.open_struct(anchor) {
                        self.anchor = AnchorState::Revisit;
                        return Ok(());
                    }
                    self.anchor = AnchorState::Open;
                }
            }
        }
        if let Some(value) = child.visit(value)?.into_field() {
            self.fields.insert(key.to_owned(), value);
        }
        Ok(())
    }

    fn finish(self) -> Result<Node, FormatError> {
        if self.denied {
            return Ok(Node::Denied);
        }
        let Some(child) = self.child else {
            return Ok(Node::Skipped);
        };
        match self.anchor {
            AnchorState::Revisit => return Ok(Node::Skipped),
            AnchorState::Open => child.path.close_struct(),
            AnchorState::Pending => {}
        }
        Ok(Node::Value(wrap_variant(self.variant, Value::Object(self.fields))))
    }
}

impl ser::SerializeStruct for StructCollector<'_> {
    type Ok = Node;
    type Error = FormatError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), FormatError> {
        self.field(key, value)
    }

    fn end(self) -> Result<Node, FormatError> {
        self.finish()
    }
}

impl ser::SerializeStructVariant for StructCollector<'_> {
    type Ok = Node;
    type Error = FormatError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), FormatError> {
        self.field(key, value)
    }

    fn end(self) -> Result<Node, FormatError> {
        self.finish()
    }
}

struct MapCollector<'a> {
    child: Option<FilterSerializer<'a>>,
    entries: Map<String, Value>,
    pending_key: Option<String>,
}

impl ser::SerializeMap for MapCollector<'_> {
    type Ok = Node;
    type Error = FormatError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), FormatError> {
        let Some(child) = self.child else {
            return Ok(());
        };
        let key = match key.serialize(child)? {
            Node::Text(text) | Node::Value(Value::String(text)) | Node::Loggable(text) => text,
            Node::Value(Value::Number(number)) => number.to_string(),
            _ => return Err(FormatError::KeyMustBeString),
        };
        self.pending_key = Some(key);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), FormatError> {
        let Some(child) = self.child else {
            return Ok(());
        };
        let Some(key) = self.pending_key.take() else {
            return Err(FormatError::Custom("map value serialized before its key".to_owned()));
        };
        if let Some(value) = child.visit(value)?.into_field() {
            self.entries.insert(key, value);
        }
        Ok(())
    }

    fn end(self) -> Result<Node, FormatError> {
        if self.child.is_none() {
            return Ok(Node::Skipped);
        }
        Ok(Node::Value(Value::Object(self.entries)))
    }
}
