// HTTP methods and allow lists

use serde::{Deserialize, Serialize};
use std::fmt;

/// Request methods the router keeps a tree for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Propfind,
    Put,
    Trace,
}

impl Method {
    /// Every supported method, in the order `any()` registers them.
    pub const ALL: [Method; 10] = [
        Method::Connect,
        Method::Delete,
        Method::Get,
        Method::Head,
        Method::Options,
        Method::Patch,
        Method::Post,
        Method::Propfind,
        Method::Put,
        Method::Trace,
    ];

    /// Parse a request method name, ignoring ASCII case.
    ///
    /// Returns `None` for methods without a tree; such requests can only end
    /// in 404 or 405.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Connect => "CONNECT",
            Method::Delete => "DELETE",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Post => "POST",
            Method::Propfind => "PROPFIND",
            Method::Put => "PUT",
            Method::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::InvalidMethod(s.to_string()))
    }
}

/// Methods that would have matched a path that missed under the request's
/// own method. Carried by 405 responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedMethods {
    methods: Vec<Method>,
}

impl AllowedMethods {
    /// Sorted, de-duplicated allow list.
    pub fn new(mut methods: Vec<Method>) -> Self {
        methods.sort();
        methods.dedup();
        Self { methods }
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn contains(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Value for the `Allow` response header.
    pub fn header_value(&self) -> String {
        let mut out = String::new();
        for (idx, method) in self.methods.iter().enumerate() {
            if idx > 0 {
                out.push_str(", ");
            }
            out.push_str(method.as_str());
        }
        out
    }
}
