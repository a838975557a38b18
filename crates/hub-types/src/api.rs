//! # API Client Port
//!
//! The HTTP client is an external collaborator. Modules only see this trait;
//! the host injects the concrete client through the service context.
//!
//! [`ApiClient`] is object safe and moves raw JSON. [`ApiClientExt`] adds the
//! typed `get`/`post` calls that run the caller's decoder over the response
//! body before resolving.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::decode::Decoder;
use crate::errors::ApiError;

/// Scalar query parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Ordered list of query parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(Vec<(String, ParamValue)>);

impl QueryParams {
    /// Empty parameter list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.push(key, value);
        self
    }

    /// Append a parameter; repeated keys are kept in order.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.push((key.into(), value.into()));
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Request body for `post`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    /// Plain text body.
    Text(String),
    /// Form-encoded fields.
    Form(QueryParams),
    /// JSON body.
    Json(Value),
    /// Binary body.
    Bytes(Vec<u8>),
}

/// Parameters of a GET request.
#[derive(Debug, Clone)]
pub struct GetQuery {
    pub url: String,
    pub params: QueryParams,
    /// Cancels the in-flight request when triggered.
    pub signal: Option<CancellationToken>,
}

impl GetQuery {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: QueryParams::new(),
            signal: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Parameters of a POST request.
#[derive(Debug, Clone)]
pub struct PostQuery {
    pub url: String,
    pub params: QueryParams,
    pub data: QueryData,
    /// Cancels the in-flight request when triggered.
    pub signal: Option<CancellationToken>,
}

impl PostQuery {
    pub fn new(url: impl Into<String>, data: QueryData) -> Self {
        Self {
            url: url.into(),
            params: QueryParams::new(),
            data,
            signal: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Raw JSON access to the platform API.
///
/// Implementations fail with [`ApiError::Aborted`] once the query's signal is
/// cancelled and never retry on their own.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Perform a GET and return the response body.
    async fn get_json(&self, query: GetQuery) -> Result<Value, ApiError>;

    /// Perform a POST and return the response body.
    async fn post_json(&self, query: PostQuery) -> Result<Value, ApiError>;
}

/// Typed requests on top of any [`ApiClient`].
#[async_trait]
pub trait ApiClientExt: ApiClient {
    /// GET `query.url` and decode the body.
    async fn get<T, D>(&self, decoder: &D, query: GetQuery) -> Result<T, ApiError>
    where
        T: Send + 'static,
        D: Decoder<T> + ?Sized,
    {
        let body = self.get_json(query).await?;
        Ok(decoder.decode(&body)?)
    }

    /// POST to `query.url` and decode the body.
    async fn post<T, D>(&self, decoder: &D, query: PostQuery) -> Result<T, ApiError>
    where
        T: Send + 'static,
        D: Decoder<T> + ?Sized,
    {
        let body = self.post_json(query).await?;
        Ok(decoder.decode(&body)?)
    }
}

impl<C: ApiClient + ?Sized> ApiClientExt for C {}
