//! Built-in filters available to file-configured routes.
//!
//! | name                  | args                               |
//! |-----------------------|------------------------------------|
//! | `respond`             | `status` (200), `body`, `content_type` |
//! | `set-response-header` | `name`, `value`                    |
//! | `strip-prefix`        | `parts` (1)                        |

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::schema::FilterDefinition;
use crate::error::GatewayError;
use crate::filters::FilterRegistry;
use crate::http::{Exchange, Filter, FilterChain, RequestDecorator, ResponseDecorator, ServerResponse};

/// Registry of the built-in filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFilters;

impl FilterRegistry for BuiltinFilters {
    fn create(&self, definition: &FilterDefinition) -> Result<Arc<dyn Filter>, GatewayError> {
        let args = Args {
            filter: &definition.name,
            args: &definition.args,
        };
        let filter: Arc<dyn Filter> = match definition.name.as_str() {
            RespondFilter::NAME => Arc::new(RespondFilter::from_args(&args)?),
            SetResponseHeaderFilter::NAME => Arc::new(SetResponseHeaderFilter::from_args(&args)?),
            StripPrefixFilter::NAME => Arc::new(StripPrefixFilter::from_args(&args)?),
            other => return Err(GatewayError::UnknownFilter(other.to_string())),
        };
        Ok(filter)
    }
}

struct Args<'a> {
    filter: &'a str,
    args: &'a BTreeMap<String, String>,
}

impl Args<'_> {
    fn get(&self, arg: &str) -> Option<&str> {
        self.args.get(arg).map(String::as_str)
    }

    fn required(&self, arg: &str) -> Result<&str, GatewayError> {
        self.get(arg).ok_or_else(|| self.invalid(arg, "missing"))
    }

    fn invalid(&self, arg: &str, reason: impl ToString) -> GatewayError {
        GatewayError::InvalidFilterArgs {
            filter: self.filter.to_string(),
            arg: arg.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Completes the response without calling the rest of the chain.
#[derive(Debug)]
pub struct RespondFilter {
    status: StatusCode,
    body: Bytes,
    content_type: Option<HeaderValue>,
}

impl RespondFilter {
    pub const NAME: &'static str = "respond";

    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
            content_type: None,
        }
    }

    fn from_args(args: &Args<'_>) -> Result<Self, GatewayError> {
        let status = match args.get("status") {
            Some(raw) => raw
                .parse::<u16>()
                .ok()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .ok_or_else(|| args.invalid("status", format!("'{raw}' is not a status code")))?,
            None => StatusCode::OK,
        };
        let content_type = args
            .get("content_type")
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|e| args.invalid("content_type", e))?;

        Ok(Self {
            status,
            body: Bytes::from(args.get("body").unwrap_or_default().to_string()),
            content_type,
        })
    }
}

#[async_trait]
impl Filter for RespondFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn filter(&self, exchange: Exchange, _chain: FilterChain) -> Result<(), GatewayError> {
        let response = exchange.response();
        response.set_status(self.status)?;
        if let Some(content_type) = &self.content_type {
            response.insert_header(header::CONTENT_TYPE, content_type.clone())?;
        }
        response.write(self.body.clone())
    }
}

/// Sets a response header, overriding whatever downstream filters set.
#[derive(Debug)]
pub struct SetResponseHeaderFilter {
    name: HeaderName,
    value: HeaderValue,
}

impl SetResponseHeaderFilter {
    pub const NAME: &'static str = "set-response-header";

    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }

    fn from_args(args: &Args<'_>) -> Result<Self, GatewayError> {
        let name = HeaderName::from_bytes(args.required("name")?.as_bytes())
            .map_err(|e| args.invalid("name", e))?;
        let value = HeaderValue::from_str(args.required("value")?)
            .map_err(|e| args.invalid("value", e))?;
        Ok(Self { name, value })
    }
}

#[async_trait]
impl Filter for SetResponseHeaderFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn filter(&self, exchange: Exchange, chain: FilterChain) -> Result<(), GatewayError> {
        let decorated = Arc::new(
            ResponseDecorator::new(Arc::clone(exchange.response()))
                .with_header(self.name.clone(), self.value.clone()),
        );
        let downstream = exchange
            .mutate()
            .response(Arc::clone(&decorated) as Arc<dyn ServerResponse>)
            .build();

        chain.proceed(downstream).await?;

        // nothing downstream wrote a body; apply the header anyway
        if !exchange.response().is_committed() {
            decorated.flush_headers()?;
        }
        Ok(())
    }
}

/// Removes leading path segments for downstream filters.
#[derive(Debug)]
pub struct StripPrefixFilter {
    parts: usize,
}

impl StripPrefixFilter {
    pub const NAME: &'static str = "strip-prefix";

    /// Attribute holding the path before stripping.
    pub const ORIGINAL_PATH_ATTR: &'static str = "gateway.original_path";

    pub fn new(parts: usize) -> Self {
        Self { parts }
    }

    fn from_args(args: &Args<'_>) -> Result<Self, GatewayError> {
        let parts = match args.get("parts") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|e| args.invalid("parts", e))?,
            None => 1,
        };
        Ok(Self { parts })
    }

    fn strip(&self, path: &str) -> String {
        let rest: Vec<&str> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .skip(self.parts)
            .collect();
        let mut stripped = format!("/{}", rest.join("/"));
        if path.ends_with('/') && !rest.is_empty() {
            stripped.push('/');
        }
        stripped
    }
}

#[async_trait]
impl Filter for StripPrefixFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn filter(&self, exchange: Exchange, chain: FilterChain) -> Result<(), GatewayError> {
        let original = exchange.request().path().to_string();
        let stripped = self.strip(&original);
        exchange.set_attribute(Self::ORIGINAL_PATH_ATTR, &original);

        let request = RequestDecorator::new(Arc::clone(exchange.request())).with_path(&stripped)?;
        let downstream = exchange.mutate().request(Arc::new(request)).build();
        chain.proceed(downstream).await
    }
}
