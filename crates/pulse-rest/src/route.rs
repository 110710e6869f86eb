//! Logical routes
//!
//! A route is a method plus a templated path with named placeholders.
//! Placeholder values are carried structurally, never pre-interpolated by
//! the caller, so the bucket key can be derived from the template and the
//! partitioning parameters alone.

use http::Method;

/// Placeholders that partition rate limits
///
/// Only these parameters contribute to the bucket key; varying values of
/// any other placeholder (a message id, an emoji) share one bucket.
const MAJOR_PARAMS: &[&str] = &["channel_id", "guild_id", "webhook_id"];

/// A logical REST route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Method,
    path: &'static str,
    params: Vec<(&'static str, String)>,
}

impl Route {
    /// Create a route from a method and a templated path
    ///
    /// Placeholders use `{name}` syntax and are filled via [`Route::param`].
    #[must_use]
    pub fn new(method: Method, path: &'static str) -> Self {
        Self {
            method,
            path,
            params: Vec::new(),
        }
    }

    /// Supply a value for a named placeholder
    #[must_use]
    pub fn param(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.push((name, value.to_string()));
        self
    }

    /// HTTP method
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path template with placeholders unfilled
    #[must_use]
    pub fn template(&self) -> &'static str {
        self.path
    }

    /// Render the concrete request path
    #[must_use]
    pub fn path(&self) -> String {
        let mut rendered = self.path.to_string();
        for (name, value) in &self.params {
            rendered = rendered.replace(&format!("{{{name}}}"), value);
        }
        rendered
    }

    /// Derive the local bucket key
    ///
    /// Combines the method, the path template, and the values of the
    /// partitioning parameters only. Two routes differing in a minor
    /// parameter produce the same key.
    #[must_use]
    pub fn bucket_key(&self) -> String {
        let mut key = format!("{}:{}", self.method, self.path);
        for (name, value) in &self.params {
            if MAJOR_PARAMS.contains(name) {
                key.push_str(&format!(";{name}={value}"));
            }
        }
        key
    }

    /// Check if a failed request of this method may have had server-side effects
    #[must_use]
    pub fn is_side_effecting(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path())
    }
}
