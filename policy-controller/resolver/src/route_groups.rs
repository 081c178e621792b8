use crate::Resolver;
use mesh_policy_controller_core::{http_route::HttpMatch, split::RouteGroupRef};
use regex::Regex;

impl Resolver {
    /// Resolves route group references into request matches.
    ///
    /// Unknown groups, unknown match names and invalid path expressions are
    /// skipped; the remaining matches are still returned.
    pub(crate) fn route_group_matches(
        &self,
        namespace: &str,
        refs: &[RouteGroupRef],
    ) -> Vec<HttpMatch> {
        let mut matches = Vec::new();
        for group_ref in refs {
            let Some(group) = self.directory.http_route_group(namespace, &group_ref.name) else {
                tracing::warn!(%namespace, group = %group_ref.name, "Skipping unknown HTTP route group");
                continue;
            };

            for name in &group_ref.matches {
                if !group.matches.iter().any(|m| m.name == *name) {
                    tracing::warn!(%namespace, group = %group.name, match_name = %name, "Skipping unknown route group match");
                }
            }

            let selected = group
                .matches
                .iter()
                .filter(|m| group_ref.matches.is_empty() || group_ref.matches.contains(&m.name));
            for m in selected {
                if let Err(error) = Regex::new(&m.path_regex) {
                    tracing::warn!(%namespace, group = %group.name, match_name = %m.name, %error, "Skipping invalid path expression");
                    continue;
                }
                matches.push(HttpMatch::regex(
                    m.path_regex.clone(),
                    m.methods.clone(),
                    m.headers.clone(),
                ));
            }
        }
        matches
    }
}
