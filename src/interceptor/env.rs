use std::sync::Arc;

use super::context::{BODY, HEADER, REQUEST_URL};
use super::triggers::{SecretStore, TriggersLibrary};
use crate::cel::{Env, StandardLibrary, StringsLibrary, Type, VariableDecl};
use crate::error::InterceptorError;

/// `body` is `dyn` so any JSON shape can be addressed.
pub fn request_variables() -> Vec<VariableDecl> {
    vec![
        VariableDecl {
            name: BODY.to_string(),
            ty: Type::Dyn,
        },
        VariableDecl {
            name: HEADER.to_string(),
            ty: Type::map(Type::String, Type::Dyn),
        },
        VariableDecl {
            name: REQUEST_URL.to_string(),
            ty: Type::String,
        },
    ]
}

/// Build the environment for one run. Request variables are declared before
/// any library, so a library that tries to redeclare one fails.
pub fn make_cel_env(namespace: &str, secrets: Arc<dyn SecretStore>) -> Result<Env, InterceptorError> {
    let mut builder = Env::builder();
    builder.declare(&request_variables())?;
    builder.library(&StandardLibrary)?;
    builder.library(&StringsLibrary)?;
    builder.library(&TriggersLibrary::new(namespace, secrets))?;
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::{EnvBuilder, EnvError, Library};
    use crate::interceptor::triggers::StaticSecretStore;

    struct Shadowing;

    impl Library for Shadowing {
        fn name(&self) -> &str {
            "shadowing"
        }

        fn install(&self, env: &mut EnvBuilder) -> Result<(), EnvError> {
            env.variable(BODY, Type::String)
        }
    }

    #[test]
    fn test_env_declares_request_variables() {
        let env = make_cel_env("default", Arc::new(StaticSecretStore::new())).unwrap();
        assert_eq!(env.variable_type(BODY), Some(&Type::Dyn));
        assert_eq!(env.variable_type(REQUEST_URL), Some(&Type::String));
        assert!(env.function("size").is_some());
        assert!(env.function("lowerAscii").is_some());
        assert!(env.function("compareSecret").is_some());
    }

    #[test]
    fn test_library_cannot_shadow_request_variables() {
        let mut b = Env::builder();
        b.declare(&request_variables()).unwrap();
        let err = b.library(&Shadowing).unwrap_err();
        assert_eq!(err, EnvError::DuplicateVariable(BODY.into()));
    }

    #[test]
    fn test_empty_namespace_fails_construction() {
        let err = make_cel_env("", Arc::new(StaticSecretStore::new())).unwrap_err();
        assert!(matches!(err, InterceptorError::EnvironmentConstruction(_)));
    }
}
