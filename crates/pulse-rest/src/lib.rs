//! # pulse-rest
//!
//! Rate-limited request dispatcher. Routes are declared structurally,
//! rate-limit buckets are learned from response headers, and requests
//! sharing a bucket are serialized so quota is never overrun.

pub mod client;
pub mod error;
pub mod executor;
pub mod headers;
pub mod limit;
pub mod route;

pub use client::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, RestClient};
pub use error::{RestError, RestResult};
pub use executor::RequestExecutor;
pub use headers::RateLimitHeaders;
pub use limit::{BucketRegistry, GlobalRateState, Permit};
pub use route::Route;
