// Per-request context
//
// One `Context` travels through the whole middleware chain of a request. It
// holds the request, the response being built, the route lookup results and a
// request-scoped store. Contexts are pooled by the mux and reset between
// requests, so nothing here may assume it starts fresh.

use crate::error::Error;
use crate::handler::{HandlerFn, HandlerResult, not_found_handler};
use crate::http::{
    HEADER_CONTENT_TYPE, HEADER_LOCATION, HttpRequest, HttpResponse, MIME_HTML, MIME_JSON,
    MIME_TEXT, find_header,
};
use crate::logging::warn;
use crate::mux::Settings;
use crate::tree::Endpoint;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// Response under construction.
///
/// The status is fixed by the first `write_header`; later attempts are logged
/// and ignored.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    committed: bool,
    size: usize,
}

impl Response {
    fn new() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: Vec::new(),
            committed: false,
            size: 0,
        }
    }

    /// Status code, 200 until written.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// All response headers.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Header lookup ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    /// Body bytes written so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the status line has been written.
    pub fn committed(&self) -> bool {
        self.committed
    }

    /// Bytes written to the body so far.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Commit the status code. Later calls are logged and ignored.
    pub fn write_header(&mut self, code: u16) {
        if self.committed {
            warn!(
                status = self.status,
                attempted = code,
                "response already committed"
            );
            return;
        }
        self.status = code;
        self.committed = true;
    }

    /// Append to the body, committing a 200 first if needed.
    pub fn write(&mut self, bytes: &[u8]) {
        if !self.committed {
            self.write_header(200);
        }
        self.body.extend_from_slice(bytes);
        self.size += bytes.len();
    }

    fn reset(&mut self) {
        self.status = 200;
        self.headers.clear();
        self.body.clear();
        self.committed = false;
        self.size = 0;
    }

    fn take(&mut self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: std::mem::take(&mut self.headers),
            body: std::mem::take(&mut self.body),
        }
    }
}

/// Lookup results written by the router.
///
/// `values` is sized for the largest parameter count of any route and reused
/// across requests. Only the first `count` slots belong to the current route.
pub(crate) struct RouteBinding {
    handler: HandlerFn,
    template: String,
    names: Option<Arc<[String]>>,
    values: Vec<String>,
    count: usize,
}

impl RouteBinding {
    fn new(max_params: usize) -> Self {
        Self {
            handler: not_found_handler(),
            template: String::new(),
            names: None,
            values: vec![String::new(); max_params],
            count: 0,
        }
    }

    /// Record a successful lookup. Captured values are percent-decoded here;
    /// a value that does not decode to UTF-8 is kept as captured.
    pub(crate) fn bind(&mut self, endpoint: &Endpoint, captured: &[&str]) {
        self.handler = Arc::clone(&endpoint.handler);
        self.template.clear();
        self.template.push_str(&endpoint.template);
        self.names = Some(Arc::clone(&endpoint.param_names));
        self.count = 0;
        for &raw in captured {
            let decoded = urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw));
            self.push_value(&decoded);
        }
    }

    pub(crate) fn miss(&mut self, handler: HandlerFn) {
        self.handler = handler;
        self.template.clear();
        self.names = None;
        self.count = 0;
    }

    fn push_value(&mut self, value: &str) {
        match self.values.get_mut(self.count) {
            Some(slot) => {
                slot.clear();
                slot.push_str(value);
            }
            None => self.values.push(value.to_string()),
        }
        self.count += 1;
    }

    fn names(&self) -> &[String] {
        self.names.as_deref().unwrap_or(&[])
    }

    fn reset(&mut self) {
        self.miss(not_found_handler());
    }
}

/// Per-request state handed to handlers and middleware.
pub struct Context {
    request: HttpRequest,
    response: Response,
    binding: RouteBinding,
    query: OnceCell<Vec<(String, String)>>,
    store: HashMap<String, Box<dyn Any + Send + Sync>>,
    settings: Arc<Settings>,
}

impl Context {
    pub(crate) fn new(settings: Arc<Settings>, max_params: usize) -> Self {
        Self {
            request: HttpRequest::default(),
            response: Response::new(),
            binding: RouteBinding::new(max_params),
            query: OnceCell::new(),
            store: HashMap::new(),
            settings,
        }
    }

    /// A context outside any mux, using the default binder and error handler.
    /// Handy for exercising handlers directly.
    pub fn standalone(request: HttpRequest) -> Self {
        let mut ctx = Self::new(Arc::new(Settings::default()), 0);
        ctx.attach(request);
        ctx
    }

    pub(crate) fn attach(&mut self, request: HttpRequest) {
        self.request = request;
    }

    /// Clear everything a previous request left behind. Parameter slots keep
    /// their allocations; only the occupancy is dropped.
    pub(crate) fn reset(&mut self) {
        self.request = HttpRequest::default();
        self.response.reset();
        self.binding.reset();
        self.query.take();
        self.store.clear();
    }

    pub(crate) fn ensure_param_capacity(&mut self, max_params: usize) {
        if self.binding.values.len() < max_params {
            self.binding.values.resize(max_params, String::new());
        }
    }

    #[cfg(test)]
    pub(crate) fn param_capacity(&self) -> usize {
        self.binding.values.len()
    }

    /// Split borrow used by the router: read the request while writing the
    /// lookup results.
    pub(crate) fn routing_parts(&mut self) -> (&HttpRequest, &mut RouteBinding) {
        (&self.request, &mut self.binding)
    }

    pub(crate) fn binding_mut(&mut self) -> &mut RouteBinding {
        &mut self.binding
    }

    pub(crate) fn finish(&mut self) -> HttpResponse {
        self.response.take()
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut HttpRequest {
        self.query.take();
        &mut self.request
    }

    pub fn set_request(&mut self, request: HttpRequest) {
        self.query.take();
        self.request = request;
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Whether the mux runs in debug mode.
    pub fn debug(&self) -> bool {
        self.settings.debug
    }

    // ========== Route ==========

    /// Template of the matched route, empty before routing or on a miss.
    pub fn path(&self) -> &str {
        &self.binding.template
    }

    pub fn set_path(&mut self, template: impl Into<String>) {
        self.binding.template = template.into();
    }

    /// Decoded value of a path parameter of the matched route.
    pub fn param(&self, name: &str) -> Option<&str> {
        let names = self.binding.names();
        let valid = names.len().min(self.binding.count);
        names[..valid]
            .iter()
            .position(|candidate| candidate == name)
            .map(|idx| self.binding.values[idx].as_str())
    }

    pub fn param_names(&self) -> &[String] {
        self.binding.names()
    }

    pub fn set_param_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.binding.names = Some(Arc::from(names));
    }

    /// Values of the current route, in template order.
    pub fn param_values(&self) -> &[String] {
        &self.binding.values[..self.binding.count]
    }

    pub fn set_param_values<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.binding.count = 0;
        for value in values {
            self.binding.push_value(value.as_ref());
        }
    }

    /// Handler lookup resolved for this request.
    pub fn handler(&self) -> HandlerFn {
        Arc::clone(&self.binding.handler)
    }

    pub fn set_handler(&mut self, handler: HandlerFn) {
        self.binding.handler = handler;
    }

    // ========== Query ==========

    pub fn query_string(&self) -> &str {
        self.request.query_string()
    }

    /// Decoded query pairs in request order. Parsed on first use.
    pub fn query_params(&self) -> &[(String, String)] {
        self.query.get_or_init(|| {
            serde_urlencoded::from_str(self.request.query_string()).unwrap_or_default()
        })
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    // ========== Store ==========

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.store.insert(key.into(), Box::new(value));
    }

    /// Stored value, if present and of type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.store.get(key).and_then(|value| value.downcast_ref())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.store.get_mut(key).and_then(|value| value.downcast_mut())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.store.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    // ========== Collaborators ==========

    /// Deserialize request data through the configured binder.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let value = self.settings.binder.bind(self)?;
        serde_json::from_value(value).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Render a named template through the configured renderer.
    pub fn render<T: Serialize>(&mut self, code: u16, name: &str, data: &T) -> HandlerResult {
        let renderer = self
            .settings
            .renderer
            .clone()
            .ok_or(Error::RendererNotRegistered)?;
        let data = serde_json::to_value(data).map_err(|e| Error::Serialization(e.to_string()))?;
        let mut out = Vec::new();
        renderer.render(&mut out, name, &data, self)?;
        self.blob(code, MIME_HTML, &out)
    }

    /// Hand an error to the configured error handler.
    pub fn error(&mut self, err: Error) {
        let handler = Arc::clone(&self.settings.error_handler);
        handler.handle(err, self);
    }

    // ========== Response writers ==========

    pub fn blob(&mut self, code: u16, content_type: &str, body: &[u8]) -> HandlerResult {
        self.response.set_header(HEADER_CONTENT_TYPE, content_type);
        self.response.write_header(code);
        self.response.write(body);
        Ok(())
    }

    pub fn string(&mut self, code: u16, body: impl AsRef<str>) -> HandlerResult {
        self.blob(code, MIME_TEXT, body.as_ref().as_bytes())
    }

    pub fn html(&mut self, code: u16, body: impl AsRef<str>) -> HandlerResult {
        self.blob(code, MIME_HTML, body.as_ref().as_bytes())
    }

    /// Serialize `value` as JSON. A `pretty` query parameter switches to
    /// indented output.
    pub fn json<T: Serialize + ?Sized>(&mut self, code: u16, value: &T) -> HandlerResult {
        if self.query_param("pretty").is_some() {
            return self.json_pretty(code, value);
        }
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.blob(code, MIME_JSON, &body)
    }

    pub fn json_pretty<T: Serialize + ?Sized>(&mut self, code: u16, value: &T) -> HandlerResult {
        let body =
            serde_json::to_vec_pretty(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.blob(code, MIME_JSON, &body)
    }

    pub fn no_content(&mut self, code: u16) -> HandlerResult {
        self.response.write_header(code);
        Ok(())
    }

    /// Redirect with a 3xx code between 300 and 308.
    pub fn redirect(&mut self, code: u16, location: impl Into<String>) -> HandlerResult {
        if !(300..=308).contains(&code) {
            return Err(Error::InvalidRedirectCode(code));
        }
        self.response.set_header(HEADER_LOCATION, location);
        self.response.write_header(code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn ctx(path: &str) -> Context {
        Context::standalone(HttpRequest::new("GET", path))
    }

    #[test]
    fn test_params_follow_names() {
        let mut ctx = ctx("/users/1/files/2");
        ctx.set_param_names(["uid", "fid"]);
        ctx.set_param_values(["1", "2"]);
        assert_eq!(ctx.param("uid"), Some("1"));
        assert_eq!(ctx.param("fid"), Some("2"));
        assert_eq!(ctx.param("nope"), None);
        assert_eq!(ctx.param_values(), &["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_params_bounded_by_value_count() {
        let mut ctx = ctx("/");
        ctx.set_param_names(["a", "b"]);
        ctx.set_param_values(["x"]);
        assert_eq!(ctx.param("a"), Some("x"));
        assert_eq!(ctx.param("b"), None);
    }

    #[test]
    fn test_reset_clears_request_state() {
        let mut ctx = ctx("/?q=1");
        ctx.set("user", 42u32);
        ctx.set_path("/users/:id");
        ctx.set_param_names(["id"]);
        ctx.set_param_values(["9"]);
        ctx.string(201, "x").unwrap();
        assert_eq!(ctx.query_param("q"), Some("1"));

        ctx.reset();
        assert!(!ctx.contains("user"));
        assert_eq!(ctx.path(), "");
        assert_eq!(ctx.param("id"), None);
        assert!(ctx.param_values().is_empty());
        assert!(!ctx.response().committed());
        assert_eq!(ctx.response().status(), 200);
        assert_eq!(ctx.query_param("q"), None);
        // slots survive for the next request
        assert_eq!(ctx.param_capacity(), 1);
    }

    #[test]
    fn test_store_is_typed() {
        let mut ctx = ctx("/");
        ctx.set("count", 3usize);
        assert_eq!(ctx.get::<usize>("count"), Some(&3));
        assert_eq!(ctx.get::<String>("count"), None);
        *ctx.get_mut::<usize>("count").unwrap() += 1;
        assert_eq!(ctx.get::<usize>("count"), Some(&4));
        assert!(ctx.remove("count"));
        assert!(!ctx.remove("count"));
    }

    #[test]
    fn test_query_params() {
        let ctx = ctx("/search?q=rust+lang&tag=a&tag=b&empty=");
        assert_eq!(ctx.query_string(), "q=rust+lang&tag=a&tag=b&empty=");
        assert_eq!(ctx.query_param("q"), Some("rust lang"));
        assert_eq!(ctx.query_param("tag"), Some("a"));
        assert_eq!(ctx.query_param("empty"), Some(""));
        assert_eq!(ctx.query_params().len(), 4);
    }

    #[test]
    fn test_string_and_json_writers() {
        let mut ctx = ctx("/");
        ctx.json(200, &json!({"name": "Jon Snow"})).unwrap();
        assert_eq!(ctx.response().status(), 200);
        assert_eq!(ctx.response().header("Content-Type"), Some(MIME_JSON));
        assert_eq!(ctx.response().body(), br#"{"name":"Jon Snow"}"#);
        assert!(ctx.response().committed());
    }

    #[test]
    fn test_json_pretty_via_query() {
        let mut ctx = ctx("/?pretty");
        ctx.json(200, &json!({"a": 1})).unwrap();
        assert_eq!(ctx.response().body(), b"{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_second_write_header_keeps_first_status() {
        let mut ctx = ctx("/");
        ctx.no_content(204).unwrap();
        ctx.response_mut().write_header(500);
        assert_eq!(ctx.response().status(), 204);
    }

    #[test]
    fn test_redirect_validates_code() {
        let mut ctx = ctx("/");
        assert!(matches!(
            ctx.redirect(310, "/elsewhere"),
            Err(Error::InvalidRedirectCode(310))
        ));
        assert!(!ctx.response().committed());

        ctx.redirect(301, "/elsewhere").unwrap();
        assert_eq!(ctx.response().status(), 301);
        assert_eq!(ctx.response().header("Location"), Some("/elsewhere"));
    }

    #[test]
    fn test_render_without_renderer() {
        let mut ctx = ctx("/");
        assert!(matches!(
            ctx.render(200, "index", &json!({})),
            Err(Error::RendererNotRegistered)
        ));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: String,
        name: String,
    }

    #[test]
    fn test_bind_json_body_with_path_params() {
        let request = HttpRequest::new("POST", "/users/7")
            .with_header("Content-Type", "application/json")
            .with_body(br#"{"name":"Jon"}"#.to_vec());
        let mut ctx = Context::standalone(request);
        ctx.set_param_names(["id"]);
        ctx.set_param_values(["7"]);

        let user: User = ctx.bind().unwrap();
        assert_eq!(
            user,
            User {
                id: "7".into(),
                name: "Jon".into()
            }
        );
    }

    #[test]
    fn test_error_uses_configured_handler() {
        let mut ctx = ctx("/");
        ctx.error(crate::HttpError::bad_request().into());
        assert_eq!(ctx.response().status(), 400);
        assert_eq!(ctx.response().body(), br#"{"message":"Bad Request"}"#);
    }
}
