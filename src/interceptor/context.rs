use indexmap::IndexMap;
use std::sync::Arc;

use super::http::Request;
use crate::cel::{Activation, Key, Value};
use crate::error::InterceptorError;

pub const BODY: &str = "body";
pub const HEADER: &str = "header";
pub const REQUEST_URL: &str = "requestURL";

/// Headers as a map from canonical name to the list of values.
pub fn header_value(request: &Request) -> Value {
    let map: IndexMap<Key, Value> = request
        .headers
        .iter()
        .map(|(name, values)| {
            let list = values.iter().map(|v| Value::from(v.as_str())).collect::<Vec<_>>();
            (Key::from(name.as_str()), Value::from(list))
        })
        .collect();
    Value::Map(Arc::new(map))
}

/// Decode `payload` as JSON of any shape and bind the three request
/// variables.
pub fn make_eval_context(payload: &[u8], request: &Request) -> Result<Activation, InterceptorError> {
    let body: serde_json::Value =
        serde_json::from_slice(payload).map_err(InterceptorError::MalformedBody)?;
    Ok(Activation::new()
        .with_var(BODY, Value::from_json(body))
        .with_var(HEADER, header_value(request))
        .with_var(REQUEST_URL, request.url.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_binds_request_variables() {
        let request = Request::new("https://example.com/hook?x=1").with_header("x-event", "push");
        let ctx = make_eval_context(br#"{"a":[1,2]}"#, &request).unwrap();

        let body = ctx.get(BODY).unwrap().as_map().unwrap();
        assert_eq!(
            body.get(&Key::from("a")),
            Some(&Value::from(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(ctx.get(REQUEST_URL), Some(&Value::from("https://example.com/hook?x=1")));

        let header = ctx.get(HEADER).unwrap().as_map().unwrap();
        assert_eq!(
            header.get(&Key::from("X-Event")),
            Some(&Value::from(vec![Value::from("push")]))
        );
    }

    #[test]
    fn test_non_object_bodies_are_addressable() {
        let request = Request::new("/");
        let ctx = make_eval_context(b"[1, 2]", &request).unwrap();
        assert_eq!(ctx.get(BODY).unwrap().as_list().unwrap().len(), 2);
        let ctx = make_eval_context(b"null", &request).unwrap();
        assert_eq!(ctx.get(BODY), Some(&Value::Null));
    }

    #[test]
    fn test_malformed_body() {
        let err = make_eval_context(br#"{"a":"#, &Request::new("/")).unwrap_err();
        assert!(matches!(err, InterceptorError::MalformedBody(_)));
        assert!(err.to_string().starts_with("failed to parse the body as JSON"));
    }
}
