// Request binding
//
// A binder turns request data into a JSON value that `Context::bind`
// deserializes into the caller's type. Values from the path and the query
// string are always strings; only a JSON body carries other types.

use crate::context::Context;
use crate::error::Error;
use crate::method::Method;
use serde_json::{Map, Value};

/// Collects request data for [`Context::bind`].
pub trait Binder: Send + Sync {
    fn bind(&self, ctx: &Context) -> Result<Value, Error>;
}

/// Merges path parameters, the query string (GET, DELETE and HEAD only)
/// and a JSON or form body into one object. Later sources win on key
/// clashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBinder;

impl Binder for DefaultBinder {
    fn bind(&self, ctx: &Context) -> Result<Value, Error> {
        let mut fields = Map::new();
        for (name, value) in ctx.param_names().iter().zip(ctx.param_values()) {
            fields.insert(name.clone(), Value::String(value.clone()));
        }

        let request = ctx.request();
        if matches!(
            Method::parse(&request.method),
            Some(Method::Get | Method::Delete | Method::Head)
        ) {
            for (key, value) in ctx.query_params() {
                fields.insert(key.clone(), Value::String(value.clone()));
            }
        }

        if request.body.is_empty() {
            return Ok(Value::Object(fields));
        }

        match request.content_type() {
            Some(media) if media.eq_ignore_ascii_case("application/json") => {
                let body: Value = serde_json::from_slice(&request.body)
                    .map_err(|e| Error::Deserialization(e.to_string()))?;
                match body {
                    Value::Object(map) => {
                        fields.extend(map);
                        Ok(Value::Object(fields))
                    }
                    other if fields.is_empty() => Ok(other),
                    _ => Err(Error::Deserialization(
                        "expected a JSON object body".to_string(),
                    )),
                }
            }
            Some(media) if media.eq_ignore_ascii_case("application/x-www-form-urlencoded") => {
                let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&request.body)
                    .map_err(|e| Error::Deserialization(e.to_string()))?;
                for (key, value) in pairs {
                    fields.insert(key, Value::String(value));
                }
                Ok(Value::Object(fields))
            }
            Some(media) => Err(Error::UnsupportedMediaType(media.to_string())),
            None => Err(Error::UnsupportedMediaType(
                "missing Content-Type".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use serde_json::json;

    #[test]
    fn test_query_for_get() {
        let ctx = Context::standalone(HttpRequest::new("GET", "/search?q=rust&page=2"));
        assert_eq!(
            DefaultBinder.bind(&ctx).unwrap(),
            json!({"q": "rust", "page": "2"})
        );
    }

    #[test]
    fn test_query_ignored_for_post() {
        let request = HttpRequest::new("POST", "/users?admin=true")
            .with_header("Content-Type", "application/json")
            .with_body(br#"{"name":"Jon"}"#.to_vec());
        let ctx = Context::standalone(request);
        assert_eq!(DefaultBinder.bind(&ctx).unwrap(), json!({"name": "Jon"}));
    }

    #[test]
    fn test_form_body() {
        let request = HttpRequest::new("POST", "/login")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body(b"user=jon&pass=s%20cret".to_vec());
        let ctx = Context::standalone(request);
        assert_eq!(
            DefaultBinder.bind(&ctx).unwrap(),
            json!({"user": "jon", "pass": "s cret"})
        );
    }

    #[test]
    fn test_json_array_body() {
        let request = HttpRequest::new("PUT", "/ids")
            .with_header("Content-Type", "application/json")
            .with_body(b"[1,2,3]".to_vec());
        let ctx = Context::standalone(request);
        assert_eq!(DefaultBinder.bind(&ctx).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_malformed_json_is_bad_request() {
        let request = HttpRequest::new("POST", "/")
            .with_header("Content-Type", "application/json")
            .with_body(b"{nope".to_vec());
        let err = DefaultBinder.bind(&Context::standalone(request)).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_unknown_media_type() {
        let request = HttpRequest::new("POST", "/")
            .with_header("Content-Type", "application/xml")
            .with_body(b"<a/>".to_vec());
        let err = DefaultBinder.bind(&Context::standalone(request)).unwrap_err();
        assert_eq!(err.status_code(), 415);
    }
}
