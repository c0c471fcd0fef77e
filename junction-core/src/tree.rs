// Radix tree for one method's routes
//
// Nodes live in an arena (`Vec<Node>`) and refer to each other by index. A
// node has at most one parameter child and at most one wildcard child next to
// any number of static children whose labels never share a leading character.
// Static labels are compressed: a single node may span several path segments
// and is split when a later route diverges inside it.

use crate::error::Error;
use crate::handler::HandlerFn;
use crate::method::Method;
use memchr::memchr;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

type NodeId = usize;

const ROOT: NodeId = 0;

/// Parameter captures kept inline before spilling to the heap.
pub const INLINE_PARAM_COUNT: usize = 8;

/// Raw (still percent-encoded) values captured during a lookup, in template
/// order.
pub type Captures<'p> = SmallVec<[&'p str; INLINE_PARAM_COUNT]>;

/// What a route resolves to once matched.
pub struct Endpoint {
    pub(crate) handler: HandlerFn,
    pub(crate) template: String,
    pub(crate) param_names: Arc<[String]>,
}

impl Endpoint {
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("template", &self.template)
            .field("param_names", &self.param_names)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Static,
    Param,
    Wildcard,
}

#[derive(Clone)]
struct Node {
    kind: Kind,
    // static text, or the parameter / wildcard name
    label: String,
    statics: Vec<NodeId>,
    param: Option<NodeId>,
    wildcard: Option<NodeId>,
    endpoint: Option<Arc<Endpoint>>,
}

impl Node {
    fn new(kind: Kind, label: &str) -> Self {
        Self {
            kind,
            label: label.to_string(),
            statics: Vec::new(),
            param: None,
            wildcard: None,
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'t> {
    Static(&'t str),
    Param(&'t str),
    Wildcard(&'t str),
}

/// Split a template into static runs, `:name` parameters and a trailing
/// `*` / `*name` wildcard.
fn parse_template(template: &str) -> Result<Vec<Segment<'_>>, String> {
    let bytes = template.as_bytes();
    let mut segments = Vec::new();
    let mut names: SmallVec<[&str; INLINE_PARAM_COUNT]> = SmallVec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b':' => {
                if start < i {
                    segments.push(Segment::Static(&template[start..i]));
                }
                let end = memchr(b'/', &bytes[i + 1..]).map_or(bytes.len(), |n| i + 1 + n);
                let name = &template[i + 1..end];
                if name.is_empty() {
                    return Err("empty parameter name".to_string());
                }
                if name.contains([':', '*']) {
                    return Err(format!("malformed parameter name `{name}`"));
                }
                claim_name(&mut names, name)?;
                segments.push(Segment::Param(name));
                i = end;
                start = end;
            }
            b'*' => {
                if start < i {
                    segments.push(Segment::Static(&template[start..i]));
                }
                let name = &template[i + 1..];
                if name.contains(['/', ':', '*']) {
                    return Err("wildcard must be the last segment".to_string());
                }
                let name = if name.is_empty() { "*" } else { name };
                claim_name(&mut names, name)?;
                segments.push(Segment::Wildcard(name));
                return Ok(segments);
            }
            _ => i += 1,
        }
    }

    if start < bytes.len() {
        segments.push(Segment::Static(&template[start..]));
    }
    Ok(segments)
}

fn claim_name<'t>(
    names: &mut SmallVec<[&'t str; INLINE_PARAM_COUNT]>,
    name: &'t str,
) -> Result<(), String> {
    if names.contains(&name) {
        return Err(format!("duplicate parameter name `{name}`"));
    }
    names.push(name);
    Ok(())
}

/// Length of the shared prefix of `a` and `b`, on a char boundary of both.
fn common_prefix(a: &str, b: &str) -> usize {
    let mut n = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    while !a.is_char_boundary(n) || !b.is_char_boundary(n) {
        n -= 1;
    }
    n
}

fn wildcard_label(name: &str) -> String {
    if name == "*" {
        name.to_string()
    } else {
        format!("*{name}")
    }
}

/// Route tree for a single HTTP method.
#[derive(Clone)]
pub struct PathTree {
    method: Method,
    nodes: Vec<Node>,
    max_params: usize,
}

impl PathTree {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            nodes: vec![Node::new(Kind::Static, "")],
            max_params: 0,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Largest parameter count of any route in this tree.
    pub fn max_params(&self) -> usize {
        self.max_params
    }

    /// Attach `handler` to `template`.
    ///
    /// Returns `true` when an existing route with the same template was
    /// replaced. Malformed templates and parameter or wildcard name clashes
    /// at an occupied position are rejected before the tree is touched.
    pub fn insert(&mut self, template: &str, handler: HandlerFn) -> Result<bool, Error> {
        let segments = parse_template(template).map_err(|reason| Error::InvalidRoute {
            path: template.to_string(),
            reason,
        })?;
        self.check_conflicts(&segments)
            .map_err(|reason| Error::RouteConflict {
                method: self.method,
                path: template.to_string(),
                reason,
            })?;

        let mut at = ROOT;
        let mut names = Vec::new();
        for segment in segments {
            at = match segment {
                Segment::Static(text) => self.insert_static(at, text),
                Segment::Param(name) => {
                    names.push(name.to_string());
                    self.insert_param(at, name)
                }
                Segment::Wildcard(name) => {
                    names.push(name.to_string());
                    self.insert_wildcard(at, name)
                }
            };
        }

        self.max_params = self.max_params.max(names.len());
        let endpoint = Endpoint {
            handler,
            template: template.to_string(),
            param_names: Arc::from(names),
        };
        Ok(self.nodes[at].endpoint.replace(Arc::new(endpoint)).is_some())
    }

    /// Walk the existing structure the way `insert` would and report a clash
    /// with an already registered parameter or wildcard name.
    fn check_conflicts(&self, segments: &[Segment<'_>]) -> Result<(), String> {
        let mut at = ROOT;
        for segment in segments {
            match *segment {
                Segment::Static(text) => match self.walk_static(at, text) {
                    Some(id) => at = id,
                    None => return Ok(()),
                },
                Segment::Param(name) => match self.nodes[at].param {
                    Some(id) if self.nodes[id].label != name => {
                        return Err(format!(
                            "parameter `:{name}` conflicts with existing `:{}`",
                            self.nodes[id].label
                        ));
                    }
                    Some(id) => at = id,
                    None => return Ok(()),
                },
                Segment::Wildcard(name) => {
                    if let Some(id) = self.nodes[at].wildcard {
                        if self.nodes[id].label != name {
                            return Err(format!(
                                "wildcard `{}` conflicts with existing `{}`",
                                wildcard_label(name),
                                wildcard_label(&self.nodes[id].label)
                            ));
                        }
                    }
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Follow `text` through existing static nodes without splitting.
    /// `None` when the text leaves the current structure.
    fn walk_static(&self, mut at: NodeId, mut text: &str) -> Option<NodeId> {
        while !text.is_empty() {
            let child = self.nodes[at]
                .statics
                .iter()
                .copied()
                .find(|&child| text.starts_with(self.nodes[child].label.as_str()))?;
            text = &text[self.nodes[child].label.len()..];
            at = child;
        }
        Some(at)
    }

    fn insert_static(&mut self, mut at: NodeId, mut text: &str) -> NodeId {
        while !text.is_empty() {
            let shared = self.nodes[at].statics.iter().copied().find_map(|child| {
                let n = common_prefix(&self.nodes[child].label, text);
                (n > 0).then_some((child, n))
            });

            match shared {
                Some((child, n)) => {
                    if n < self.nodes[child].label.len() {
                        self.split(child, n);
                    }
                    text = &text[n..];
                    at = child;
                }
                None => {
                    let id = self.push(Node::new(Kind::Static, text));
                    self.nodes[at].statics.push(id);
                    return id;
                }
            }
        }
        at
    }

    /// Cut a static node's label at `at`. The node keeps its id and the
    /// prefix; everything it owned moves to a new child holding the rest.
    fn split(&mut self, id: NodeId, at: usize) {
        debug_assert_eq!(self.nodes[id].kind, Kind::Static);
        let node = &mut self.nodes[id];
        let tail = Node {
            kind: Kind::Static,
            label: node.label[at..].to_string(),
            statics: std::mem::take(&mut node.statics),
            param: node.param.take(),
            wildcard: node.wildcard.take(),
            endpoint: node.endpoint.take(),
        };
        node.label.truncate(at);

        let tail_id = self.push(tail);
        self.nodes[id].statics.push(tail_id);
    }

    fn insert_param(&mut self, at: NodeId, name: &str) -> NodeId {
        if let Some(id) = self.nodes[at].param {
            debug_assert_eq!(self.nodes[id].kind, Kind::Param);
            return id;
        }
        let id = self.push(Node::new(Kind::Param, name));
        self.nodes[at].param = Some(id);
        id
    }

    fn insert_wildcard(&mut self, at: NodeId, name: &str) -> NodeId {
        if let Some(id) = self.nodes[at].wildcard {
            debug_assert_eq!(self.nodes[id].kind, Kind::Wildcard);
            return id;
        }
        let id = self.push(Node::new(Kind::Wildcard, name));
        self.nodes[at].wildcard = Some(id);
        id
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Find the endpoint for `path` together with its raw captures.
    pub fn lookup<'t, 'p>(&'t self, path: &'p str) -> Option<(&'t Endpoint, Captures<'p>)> {
        let mut captures = Captures::new();
        let id = self.search(ROOT, path, &mut captures)?;
        let endpoint = self.nodes[id].endpoint.as_deref()?;
        Some((endpoint, captures))
    }

    /// Whether any route in this tree matches `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.search(ROOT, path, &mut Captures::new()).is_some()
    }

    /// Depth-first match trying static, then parameter, then wildcard
    /// children. A branch that dead-ends gives way to the next kind.
    fn search<'p>(&self, id: NodeId, path: &'p str, captures: &mut Captures<'p>) -> Option<NodeId> {
        let node = &self.nodes[id];
        if path.is_empty() && node.endpoint.is_some() {
            return Some(id);
        }

        for &child in &node.statics {
            if let Some(rest) = path.strip_prefix(self.nodes[child].label.as_str()) {
                if let Some(found) = self.search(child, rest, captures) {
                    return Some(found);
                }
            }
        }

        if let Some(param) = node.param {
            let end = memchr(b'/', path.as_bytes()).unwrap_or(path.len());
            if end > 0 {
                captures.push(&path[..end]);
                if let Some(found) = self.search(param, &path[end..], captures) {
                    return Some(found);
                }
                captures.pop();
            }
        }

        if let Some(wildcard) = node.wildcard {
            if self.nodes[wildcard].endpoint.is_some() {
                captures.push(path);
                return Some(wildcard);
            }
        }

        None
    }
}

impl fmt::Debug for PathTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathTree")
            .field("method", &self.method)
            .field("nodes", &self.nodes.len())
            .field("max_params", &self.max_params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;

    fn noop() -> HandlerFn {
        handler_fn(|_ctx| Box::pin(async { Ok(()) }))
    }

    fn tree(templates: &[&str]) -> PathTree {
        let mut tree = PathTree::new(Method::Get);
        for template in templates {
            tree.insert(template, noop()).unwrap();
        }
        tree
    }

    fn find<'p>(tree: &PathTree, path: &'p str) -> Option<(String, Vec<&'p str>)> {
        tree.lookup(path)
            .map(|(endpoint, captures)| (endpoint.template.clone(), captures.to_vec()))
    }

    fn static_labels(tree: &PathTree, id: NodeId) -> Vec<&str> {
        let mut labels: Vec<&str> = tree.nodes[id]
            .statics
            .iter()
            .map(|&child| tree.nodes[child].label.as_str())
            .collect();
        labels.sort();
        labels
    }

    #[test]
    fn test_parse_template() {
        assert_eq!(
            parse_template("/users/:uid/files/:fid").unwrap(),
            vec![
                Segment::Static("/users/"),
                Segment::Param("uid"),
                Segment::Static("/files/"),
                Segment::Param("fid"),
            ]
        );
        assert_eq!(
            parse_template("/static/*path").unwrap(),
            vec![Segment::Static("/static/"), Segment::Wildcard("path")]
        );
        assert_eq!(
            parse_template("/*").unwrap(),
            vec![Segment::Static("/"), Segment::Wildcard("*")]
        );
    }

    #[test]
    fn test_parse_template_rejects_malformed() {
        assert!(parse_template("/users/:").is_err());
        assert!(parse_template("/users/:/x").is_err());
        assert!(parse_template("/files/*/more").is_err());
        assert!(parse_template("/:id/:id").is_err());
    }

    #[test]
    fn test_split_on_partial_overlap() {
        let tree = tree(&["/users", "/us"]);
        // root -> "/us" -> "ers"
        assert_eq!(static_labels(&tree, ROOT), vec!["/us"]);
        let us = tree.nodes[ROOT].statics[0];
        assert_eq!(static_labels(&tree, us), vec!["ers"]);
        assert_eq!(find(&tree, "/us").unwrap().0, "/us");
        assert_eq!(find(&tree, "/users").unwrap().0, "/users");
        assert!(find(&tree, "/use").is_none());
    }

    #[test]
    fn test_split_keeps_children_of_original() {
        let tree = tree(&["/users/:id", "/uploads"]);
        assert_eq!(find(&tree, "/users/42").unwrap(), ("/users/:id".into(), vec!["42"]));
        assert_eq!(find(&tree, "/uploads").unwrap().0, "/uploads");
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let tree = tree(&["/café", "/cafè"]);
        assert_eq!(find(&tree, "/café").unwrap().0, "/café");
        assert_eq!(find(&tree, "/cafè").unwrap().0, "/cafè");
    }

    #[test]
    fn test_static_beats_param_beats_wildcard() {
        let tree = tree(&["/users/static", "/users/:id", "/users/*"]);
        assert_eq!(find(&tree, "/users/static").unwrap().0, "/users/static");
        assert_eq!(find(&tree, "/users/7").unwrap(), ("/users/:id".into(), vec!["7"]));
        assert_eq!(
            find(&tree, "/users/7/more").unwrap(),
            ("/users/*".into(), vec!["7/more"])
        );
    }

    #[test]
    fn test_backtracks_out_of_dead_static_branch() {
        let tree = tree(&["/users/new/edit", "/users/:id/photos"]);
        assert_eq!(
            find(&tree, "/users/new/photos").unwrap(),
            ("/users/:id/photos".into(), vec!["new"])
        );
        assert_eq!(find(&tree, "/users/new/edit").unwrap().0, "/users/new/edit");
    }

    #[test]
    fn test_backtracks_out_of_dead_param_branch() {
        let tree = tree(&["/a/:x/c", "/a/*"]);
        assert_eq!(find(&tree, "/a/b/d").unwrap(), ("/a/*".into(), vec!["b/d"]));
        assert_eq!(find(&tree, "/a/b/c").unwrap(), ("/a/:x/c".into(), vec!["b"]));
    }

    #[test]
    fn test_static_prefix_of_segment_falls_back_to_param() {
        let tree = tree(&["/abc", "/:x"]);
        assert_eq!(find(&tree, "/ab").unwrap(), ("/:x".into(), vec!["ab"]));
        assert_eq!(find(&tree, "/abc").unwrap().0, "/abc");
    }

    #[test]
    fn test_param_requires_a_value() {
        let tree = tree(&["/users/:id"]);
        assert!(find(&tree, "/users/").is_none());
    }

    #[test]
    fn test_wildcard_matches_empty_remainder() {
        let tree = tree(&["/images/*"]);
        assert_eq!(find(&tree, "/images/").unwrap().1, vec![""]);
        assert!(find(&tree, "/images").is_none());
    }

    #[test]
    fn test_encoded_slash_is_opaque() {
        let tree = tree(&["/:id", "/images/*"]);
        assert_eq!(find(&tree, "/with%2Fslash").unwrap(), ("/:id".into(), vec!["with%2Fslash"]));
        assert_eq!(
            find(&tree, "/images/with%2Fslash").unwrap(),
            ("/images/*".into(), vec!["with%2Fslash"])
        );
    }

    #[test]
    fn test_multiple_params_in_order() {
        let tree = tree(&["/users/:uid/files/:fid"]);
        assert_eq!(find(&tree, "/users/1/files/2").unwrap().1, vec!["1", "2"]);
        assert_eq!(tree.max_params(), 2);
    }

    #[test]
    fn test_param_conflict_is_rejected() {
        let mut tree = tree(&["/users/:id"]);
        let err = tree.insert("/users/:name/posts", noop()).unwrap_err();
        assert!(matches!(err, Error::RouteConflict { method: Method::Get, .. }));
    }

    #[test]
    fn test_wildcard_conflict_is_rejected() {
        let mut tree = tree(&["/files/*path"]);
        assert!(tree.insert("/files/*", noop()).is_err());
        assert!(tree.insert("/files/*path", noop()).is_ok());
    }

    #[test]
    fn test_conflict_leaves_tree_untouched() {
        let mut tree = tree(&["/a/:x"]);
        let before = tree.nodes.len();
        assert!(tree.insert("/a/:y/b/:z", noop()).is_err());
        assert_eq!(tree.nodes.len(), before);
        // the same name is still free to extend
        assert!(tree.insert("/a/:x/b", noop()).is_ok());
    }

    #[test]
    fn test_reinsert_replaces() {
        let mut tree = tree(&["/users"]);
        assert!(tree.insert("/users", noop()).unwrap());
        assert!(!tree.insert("/posts", noop()).unwrap());
    }

    #[test]
    fn test_matches() {
        let tree = tree(&["/users/:id"]);
        assert!(tree.matches("/users/1"));
        assert!(!tree.matches("/posts/1"));
    }

    #[test]
    fn test_child_slots_hold_matching_kinds() {
        let tree = tree(&["/users/:id", "/users/:id/files/*path", "/user", "/users/:id/edit"]);
        for node in &tree.nodes {
            for &child in &node.statics {
                assert_eq!(tree.nodes[child].kind, Kind::Static);
            }
            if let Some(param) = node.param {
                assert_eq!(tree.nodes[param].kind, Kind::Param);
            }
            if let Some(wildcard) = node.wildcard {
                assert_eq!(tree.nodes[wildcard].kind, Kind::Wildcard);
            }
        }
    }
}
