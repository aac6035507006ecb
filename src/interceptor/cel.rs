use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::context::make_eval_context;
use super::env::make_cel_env;
use super::evaluate::evaluate;
use super::http::{Request, Response};
use super::serialize::serialize;
use super::triggers::SecretStore;
use super::Interceptor;
use crate::cel::{Activation, Env, Value};
use crate::config::{InterceptorConfig, Overlay};
use crate::error::InterceptorError;
use crate::patch::patch;

/// Gates a request on a filter expression and rewrites its body with
/// overlay expressions.
pub struct CelInterceptor {
    config: InterceptorConfig,
    secrets: Arc<dyn SecretStore>,
}

impl CelInterceptor {
    /// Secrets come from the config's static store.
    pub fn new(config: InterceptorConfig) -> Self {
        let secrets = Arc::new(config.secrets.clone());
        Self { config, secrets }
    }

    pub fn with_secret_store(config: InterceptorConfig, secrets: Arc<dyn SecretStore>) -> Self {
        Self { config, secrets }
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    /// Run the pipeline synchronously. Overlays all see the original request;
    /// the first failure discards every patch applied so far.
    pub fn process(&self, request: &Request) -> Result<Response, InterceptorError> {
        let env = make_cel_env(&self.config.namespace, Arc::clone(&self.secrets))?;
        let payload = request.payload();
        let context = make_eval_context(payload, request)?;

        if let Some(filter) = self.config.filter() {
            let out = evaluate(filter, &env, &context)?;
            if !matches!(out, Value::Bool(true)) {
                warn!(filter, result = %out, "filter rejected request");
                return Err(InterceptorError::FilterRejected {
                    expression: filter.to_string(),
                });
            }
            debug!(filter, "filter passed");
        }

        if self.config.overlays.is_empty() {
            return Ok(Response {
                headers: request.headers.clone(),
                body: payload.to_vec(),
            });
        }

        let body = self
            .config
            .overlays
            .iter()
            .try_fold(payload.to_vec(), |document, overlay| {
                apply_overlay(document, overlay, &env, &context)
            })?;

        Ok(Response {
            headers: request.headers.clone(),
            body,
        })
    }
}

fn apply_overlay(
    document: Vec<u8>,
    overlay: &Overlay,
    env: &Env,
    context: &Activation,
) -> Result<Vec<u8>, InterceptorError> {
    let value = evaluate(&overlay.expression, env, context)?;
    let encoded = serialize(&value).map_err(|e| InterceptorError::Serialization {
        key: overlay.key.clone(),
        value_type: value.type_name().to_string(),
        message: e.to_string(),
    })?;
    let patched = patch(&document, &overlay.key, &encoded).map_err(|source| {
        InterceptorError::PatchPath {
            key: overlay.key.clone(),
            source,
        }
    })?;
    debug!(key = %overlay.key, value_type = value.type_name(), "overlay applied");
    Ok(patched)
}

#[async_trait]
impl Interceptor for CelInterceptor {
    async fn execute(&self, request: Request) -> Result<Response, InterceptorError> {
        self.process(&request)
    }
}
