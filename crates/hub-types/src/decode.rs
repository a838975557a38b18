//! # Decoder Contract
//!
//! A decoder turns an untrusted [`serde_json::Value`] into a typed value or a
//! structured [`DecodeError`]. Decoders are pure and freely shareable; the bus
//! runs one per subscriber against every raw payload, and the API client runs
//! one against every response body.
//!
//! ## Composition
//!
//! ```rust
//! use hub_types::decode::{field, number, string};
//! use hub_types::{DecodeError, Decoder};
//! use serde_json::{json, Value};
//!
//! struct Order {
//!     id: String,
//!     total: f64,
//! }
//!
//! let order = |input: &Value| -> Result<Order, DecodeError> {
//!     Ok(Order {
//!         id: field("id", string()).decode(input)?,
//!         total: field("total", number()).decode(input)?,
//!     })
//! };
//!
//! let err = order.decode(&json!({ "id": "o1" })).err().unwrap();
//! assert_eq!(err.field(), Some("total"));
//! ```

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{kind_of, DecodeError};

/// Validation function from untyped JSON to `T`.
///
/// Implementations must be free of side effects: the same input always yields
/// the same result.
pub trait Decoder<T>: Send + Sync {
    /// Validate `input` and convert it into `T`.
    fn decode(&self, input: &Value) -> Result<T, DecodeError>;
}

/// Shared decoder handle. Two handles are the same decoder when
/// [`Arc::ptr_eq`] holds.
pub type DecoderRef<T> = Arc<dyn Decoder<T>>;

impl<T, F> Decoder<T> for F
where
    F: Fn(&Value) -> Result<T, DecodeError> + Send + Sync,
{
    fn decode(&self, input: &Value) -> Result<T, DecodeError> {
        self(input)
    }
}

/// Combinator methods available on every decoder.
pub trait DecoderExt<T>: Decoder<T> {
    /// Transform the decoded value.
    fn map<U, F>(self, f: F) -> Map<Self, F, T>
    where
        Self: Sized,
        F: Fn(T) -> U + Send + Sync,
    {
        Map {
            inner: self,
            f,
            _marker: PhantomData,
        }
    }

    /// Refine the decoded value with a further check.
    fn and_then<U, F>(self, f: F) -> AndThen<Self, F, T>
    where
        Self: Sized,
        F: Fn(T) -> Result<U, DecodeError> + Send + Sync,
    {
        AndThen {
            inner: self,
            f,
            _marker: PhantomData,
        }
    }

    /// Move the decoder behind an [`Arc`] so it can be shared and compared.
    fn shared(self) -> DecoderRef<T>
    where
        Self: Sized + 'static,
        T: 'static,
    {
        Arc::new(self)
    }
}

impl<T, D: Decoder<T> + ?Sized> DecoderExt<T> for D {}

/// Decoder returned by [`DecoderExt::map`].
pub struct Map<D, F, T> {
    inner: D,
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<D, F, T, U> Decoder<U> for Map<D, F, T>
where
    D: Decoder<T>,
    F: Fn(T) -> U + Send + Sync,
{
    fn decode(&self, input: &Value) -> Result<U, DecodeError> {
        self.inner.decode(input).map(&self.f)
    }
}

/// Decoder returned by [`DecoderExt::and_then`].
pub struct AndThen<D, F, T> {
    inner: D,
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<D, F, T, U> Decoder<U> for AndThen<D, F, T>
where
    D: Decoder<T>,
    F: Fn(T) -> Result<U, DecodeError> + Send + Sync,
{
    fn decode(&self, input: &Value) -> Result<U, DecodeError> {
        self.inner.decode(input).and_then(&self.f)
    }
}

// =============================================================================
// PRIMITIVES
// =============================================================================

/// Accepts any JSON string.
pub fn string() -> impl Decoder<String> {
    |input: &Value| match input {
        Value::String(s) => Ok(s.clone()),
        other => Err(DecodeError::unexpected("string", other)),
    }
}

/// Accepts any JSON number as `f64`.
pub fn number() -> impl Decoder<f64> {
    |input: &Value| {
        input
            .as_f64()
            .ok_or_else(|| DecodeError::unexpected("number", input))
    }
}

/// Accepts JSON numbers that fit in an `i64` without a fractional part.
pub fn integer() -> impl Decoder<i64> {
    |input: &Value| match input {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| DecodeError::new("integer", format!("number {n}"))),
        other => Err(DecodeError::unexpected("integer", other)),
    }
}

/// Accepts `true` or `false`.
pub fn boolean() -> impl Decoder<bool> {
    |input: &Value| {
        input
            .as_bool()
            .ok_or_else(|| DecodeError::unexpected("boolean", input))
    }
}

/// Accepts anything and hands back a copy of the raw value.
pub fn any() -> impl Decoder<Value> {
    |input: &Value| Ok(input.clone())
}

/// Accepts exactly `expected`.
pub fn literal(expected: Value) -> impl Decoder<Value> {
    move |input: &Value| {
        if *input == expected {
            Ok(input.clone())
        } else {
            Err(DecodeError::new(expected.to_string(), input.to_string()))
        }
    }
}

// =============================================================================
// STRUCTURE
// =============================================================================

/// Decodes the member `name` of an object with `decoder`.
///
/// An absent member is run through `decoder` as `null` first, so nullable
/// member decoders accept it; otherwise the failure reports `missing`.
pub fn field<T, D>(name: impl Into<String>, decoder: D) -> impl Decoder<T>
where
    D: Decoder<T>,
{
    let name = name.into();
    move |input: &Value| {
        let Value::Object(members) = input else {
            return Err(DecodeError::unexpected("object", input));
        };
        match members.get(&name) {
            Some(value) => decoder.decode(value).map_err(|e| e.at_field(name.as_str())),
            None => decoder.decode(&Value::Null).map_err(|e| {
                let mut err = e.at_field(name.as_str());
                err.found = DecodeError::MISSING.to_string();
                err
            }),
        }
    }
}

/// Decodes the member `name` if it is present and not `null`.
pub fn optional_field<T, D>(name: impl Into<String>, decoder: D) -> impl Decoder<Option<T>>
where
    D: Decoder<T>,
{
    let name = name.into();
    move |input: &Value| {
        let Value::Object(members) = input else {
            return Err(DecodeError::unexpected("object", input));
        };
        match members.get(&name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => decoder
                .decode(value)
                .map(Some)
                .map_err(|e| e.at_field(name.as_str())),
        }
    }
}

/// Decodes every element of an array with `decoder`.
pub fn array<T, D>(decoder: D) -> impl Decoder<Vec<T>>
where
    D: Decoder<T>,
{
    move |input: &Value| {
        let Value::Array(items) = input else {
            return Err(DecodeError::unexpected("array", input));
        };
        items
            .iter()
            .enumerate()
            .map(|(index, item)| decoder.decode(item).map_err(|e| e.at_index(index)))
            .collect()
    }
}

/// Accepts `null` as `None`, anything else through `decoder`.
pub fn nullable<T, D>(decoder: D) -> impl Decoder<Option<T>>
where
    D: Decoder<T>,
{
    move |input: &Value| match input {
        Value::Null => Ok(None),
        other => decoder.decode(other).map(Some).map_err(|mut e| {
            if e.path.is_empty() {
                e.expected = format!("{} or null", e.expected);
            }
            e
        }),
    }
}

// =============================================================================
// SERDE BRIDGE
// =============================================================================

/// Decodes any `T: DeserializeOwned`.
///
/// serde reports a missing member as ``missing field `name` ``; that case is
/// turned into a path so diagnostics match the hand-built combinators.
pub fn deserialize<T>() -> impl Decoder<T>
where
    T: DeserializeOwned,
{
    |input: &Value| {
        T::deserialize(input).map_err(|e| {
            let expected = short_type_name::<T>();
            let message = e.to_string();
            match missing_field_name(&message) {
                Some(name) => DecodeError::missing(name, expected),
                None if message.starts_with("invalid type") => {
                    DecodeError::new(expected, kind_of(input))
                }
                None => DecodeError::new(expected, message),
            }
        })
    }
}

fn missing_field_name(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("missing field `")?;
    rest.split('`').next()
}

fn short_type_name<T>() -> String {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
