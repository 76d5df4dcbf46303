//! HTTP endpoint routing for `fetch`.

use crate::error::{CoreError, CoreResult};
use crate::functions::RegisteredFunction;
use crate::types::FunctionKind;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Body of the response returned when no route matches.
pub const NO_MATCHING_ROUTE: &str = "No matching routes found";

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// OPTIONS
    Options,
}

impl Method {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            other => Err(CoreError::invalid_operation(format!(
                "unsupported HTTP method `{other}`"
            ))),
        }
    }
}

/// A request passed to an HTTP action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Path, optionally with a query string.
    pub path: String,
    /// Headers, keyed by lower-case name.
    pub headers: BTreeMap<String, String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a request with no headers or body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    /// A GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// A POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Path without the query string.
    #[must_use]
    pub fn route_path(&self) -> &str {
        self.path.split_once('?').map_or(self.path.as_str(), |(p, _)| p)
    }

    /// Body decoded as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    pub fn json(&self) -> CoreResult<serde_json::Value> {
        serde_json::from_slice(&self.body)
            .map_err(|e| CoreError::handler(format!("request body is not JSON: {e}")))
    }
}

/// A response returned by an HTTP action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Headers.
    pub headers: BTreeMap<String, String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// An empty response with `status`.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    /// A `200` plain text response.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(200)
            .header("content-type", "text/plain")
            .with_body(body.into())
    }

    /// A `200` JSON response.
    #[must_use]
    pub fn json(body: &serde_json::Value) -> Self {
        Self::new(200)
            .header("content-type", "application/json")
            .with_body(body.to_string())
    }

    /// The response for an unmatched route.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(404).with_body(NO_MATCHING_ROUTE)
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Body decoded as UTF-8, lossily.
    #[must_use]
    pub fn text_body(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone)]
enum RoutePath {
    Exact(String),
    Prefix(String),
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    path: RoutePath,
    handler: Arc<RegisteredFunction>,
}

/// Maps `(method, path)` to HTTP actions.
#[derive(Debug, Clone, Default)]
pub struct HttpRouter {
    routes: Vec<Route>,
}

impl HttpRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, method: Method, path: RoutePath, handler: RegisteredFunction) -> CoreResult<Self> {
        if handler.kind() != FunctionKind::HttpAction {
            return Err(CoreError::FunctionKindMismatch {
                path: match &path {
                    RoutePath::Exact(p) | RoutePath::Prefix(p) => p.clone(),
                },
                expected: FunctionKind::HttpAction.to_string(),
                actual: handler.kind().to_string(),
            });
        }
        self.routes.push(Route {
            method,
            path,
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    /// Routes an exact path.
    pub fn route(self, method: Method, path: impl Into<String>, handler: RegisteredFunction) -> CoreResult<Self> {
        self.add(method, RoutePath::Exact(path.into()), handler)
    }

    /// Routes every path starting with `prefix`.
    pub fn route_prefix(
        self,
        method: Method,
        prefix: impl Into<String>,
        handler: RegisteredFunction,
    ) -> CoreResult<Self> {
        self.add(method, RoutePath::Prefix(prefix.into()), handler)
    }

    /// Finds the handler for a request: exact match first, then the longest
    /// matching prefix.
    #[must_use]
    pub fn lookup(&self, method: Method, path: &str) -> Option<Arc<RegisteredFunction>> {
        let candidates = self.routes.iter().filter(|r| r.method == method);
        let exact = candidates.clone().find(|r| matches!(&r.path, RoutePath::Exact(p) if p == path));
        if let Some(route) = exact {
            return Some(Arc::clone(&route.handler));
        }
        candidates
            .filter_map(|r| match &r.path {
                RoutePath::Prefix(p) if path.starts_with(p.as_str()) => Some((p.len(), r)),
                _ => None,
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, r)| Arc::clone(&r.handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{http_action, query};
    use docsim_values::Value;

    fn endpoint(tag: &'static str) -> RegisteredFunction {
        http_action(move |_ctx, _req| async move { Ok(HttpResponse::text(tag)) })
    }

    #[test]
    fn exact_beats_prefix_and_longest_prefix_wins() {
        let router = HttpRouter::new()
            .route_prefix(Method::Get, "/api/", endpoint("short"))
            .unwrap()
            .route_prefix(Method::Get, "/api/users/", endpoint("long"))
            .unwrap()
            .route(Method::Get, "/api/users/me", endpoint("exact"))
            .unwrap();

        assert!(router.lookup(Method::Get, "/api/users/me").is_some());
        assert!(router.lookup(Method::Get, "/api/users/42").is_some());
        assert!(router.lookup(Method::Get, "/api/other").is_some());
        assert!(router.lookup(Method::Post, "/api/other").is_none());
        assert!(router.lookup(Method::Get, "/elsewhere").is_none());
    }

    #[test]
    fn only_http_actions_route() {
        let result = HttpRouter::new().route(
            Method::Get,
            "/x",
            query(|_ctx, _args| async { Ok(Value::Null) }),
        );
        assert!(matches!(result, Err(CoreError::FunctionKindMismatch { .. })));
    }

    #[test]
    fn request_helpers() {
        let request = HttpRequest::post("/send?x=1")
            .header("Content-Type", "application/json")
            .body(r#"{"a": 1}"#);
        assert_eq!(request.route_path(), "/send");
        assert_eq!(request.headers["content-type"], "application/json");
        assert_eq!(request.json().unwrap()["a"], 1);
        assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
    }

    #[test]
    fn not_found_body() {
        let response = HttpResponse::not_found();
        assert_eq!(response.status, 404);
        assert_eq!(response.text_body(), NO_MATCHING_ROUTE);
    }
}
