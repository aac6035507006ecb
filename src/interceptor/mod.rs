//! The request pipeline: build the evaluation context, check the filter,
//! then fold each overlay through evaluate, serialize and patch.

pub mod cel;
pub mod context;
pub mod env;
pub mod evaluate;
pub mod http;
pub mod serialize;
pub mod triggers;

use async_trait::async_trait;

use crate::error::InterceptorError;

pub use self::cel::CelInterceptor;
pub use context::make_eval_context;
pub use env::make_cel_env;
pub use evaluate::evaluate;
pub use http::{canonical_header_key, Headers, Request, Response};
pub use serialize::{serialize, SerializeError};
pub use triggers::{SecretStore, StaticSecretStore, TriggersLibrary};

/// A request transformer. A run either produces a response or fails as a
/// whole; there is no partial output.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response, InterceptorError>;
}
