//! cel-overlay - CEL-driven request filtering and JSON body rewriting
//!
//! A request passes through an optional filter expression, then each overlay
//! expression is evaluated against the original request and merged into the
//! body at its key.

pub mod cel;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod patch;

pub use config::{ConfigError, ConfigFormat, InterceptorConfig, Overlay};
pub use error::InterceptorError;
pub use interceptor::{CelInterceptor, Interceptor, Request, Response};
pub use patch::{patch, PatchError};
