// View rendering
//
// The router ships no template engine. Applications plug one in through
// `MuxBuilder::renderer` and call `Context::render`.

use crate::context::Context;
use crate::error::Error;
use serde_json::Value;

/// Renders a named view into `out`.
///
/// `data` is the caller's value already converted to JSON, so engines only
/// need to understand one data model.
pub trait Renderer: Send + Sync {
    fn render(&self, out: &mut Vec<u8>, name: &str, data: &Value, ctx: &Context)
    -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use crate::mux::Mux;
    use serde_json::json;

    /// Replaces `{{key}}` with top-level string fields of `data`.
    struct Placeholders;

    impl Renderer for Placeholders {
        fn render(
            &self,
            out: &mut Vec<u8>,
            name: &str,
            data: &Value,
            _ctx: &Context,
        ) -> Result<(), Error> {
            let mut page = match name {
                "hello" => "<h1>Hello, {{name}}!</h1>".to_string(),
                other => return Err(Error::Internal(format!("no template `{other}`"))),
            };
            if let Value::Object(fields) = data {
                for (key, value) in fields {
                    if let Value::String(text) = value {
                        page = page.replace(&format!("{{{{{key}}}}}"), text);
                    }
                }
            }
            out.extend_from_slice(page.as_bytes());
            Ok(())
        }
    }

    #[test]
    fn test_render_through_context() {
        let mux = Mux::builder().renderer(Placeholders).build();
        let mut ctx = mux.new_context(HttpRequest::new("GET", "/"));
        ctx.render(200, "hello", &json!({"name": "Jon"})).unwrap();
        assert_eq!(ctx.response().body(), b"<h1>Hello, Jon!</h1>");
        assert_eq!(
            ctx.response().header("Content-Type"),
            Some(crate::http::MIME_HTML)
        );
    }

    #[test]
    fn test_render_error_propagates() {
        let mux = Mux::builder().renderer(Placeholders).build();
        let mut ctx = mux.new_context(HttpRequest::new("GET", "/"));
        assert!(ctx.render(200, "missing", &json!({})).is_err());
        assert!(!ctx.response().committed());
    }
}
