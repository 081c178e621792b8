use crate::WILDCARD;
use serde::Serialize;
use std::collections::BTreeMap;

/// The regular expression matching every path.
pub const MATCH_ALL_PATH: &str = ".*";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum PathMatchKind {
    #[default]
    Regex,
    Prefix,
    Exact,
}

/// Matches an HTTP request by path, method and headers.
///
/// Equality is structural; two matches that compare equal select the same
/// requests.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMatch {
    pub path: String,
    pub path_kind: PathMatchKind,
    pub methods: Vec<String>,
    pub headers: BTreeMap<String, String>,
}

// === impl HttpMatch ===

impl HttpMatch {
    /// Matches every request.
    pub fn wildcard() -> Self {
        Self {
            path: MATCH_ALL_PATH.to_string(),
            path_kind: PathMatchKind::Regex,
            methods: vec![WILDCARD.to_string()],
            headers: BTreeMap::new(),
        }
    }

    /// Builds a regex path match, treating an empty path or method list as
    /// matching everything.
    pub fn regex(
        path: impl Into<String>,
        methods: impl IntoIterator<Item = String>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        let mut path = path.into();
        if path.is_empty() {
            path = MATCH_ALL_PATH.to_string();
        }
        let mut methods = methods.into_iter().collect::<Vec<_>>();
        if methods.is_empty() {
            methods.push(WILDCARD.to_string());
        }
        Self {
            path,
            path_kind: PathMatchKind::Regex,
            methods,
            headers,
        }
    }

    pub fn is_wildcard_path(&self) -> bool {
        self.path_kind == PathMatchKind::Regex && self.path == MATCH_ALL_PATH
    }
}
