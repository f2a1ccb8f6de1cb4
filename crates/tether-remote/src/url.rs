//! Resource URL construction.
//!
//! URLs compose an optional host, an optional namespace, the pluralized
//! resource type, and optional id and relationship segments.

/// Naive English pluralization, sufficient for resource path segments.
pub fn pluralize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }
    format!("{word}s")
}

/// Inverse of [`pluralize`] for resource types coming off the wire.
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    if let Some(stem) = word.strip_suffix("es") {
        if stem.ends_with('s')
            || stem.ends_with('x')
            || stem.ends_with('z')
            || stem.ends_with("ch")
            || stem.ends_with("sh")
        {
            return stem.to_string();
        }
    }
    word.strip_suffix('s').unwrap_or(word).to_string()
}

/// Builds resource and relationship URLs for one API.
#[derive(Debug, Clone, Default)]
pub struct UrlBuilder {
    host: Option<String>,
    namespace: Option<String>,
}

impl UrlBuilder {
    /// Create a builder. Host and namespace are both optional; trailing
    /// and leading slashes are normalized away.
    pub fn new(host: Option<String>, namespace: Option<String>) -> Self {
        Self {
            host: host.map(|h| h.trim_end_matches('/').to_string()),
            namespace: namespace.map(|n| n.trim_matches('/').to_string()),
        }
    }

    fn base(&self) -> String {
        let mut url = self.host.clone().unwrap_or_default();
        if let Some(namespace) = &self.namespace {
            url.push('/');
            url.push_str(namespace);
        }
        url
    }

    /// `{host}/{namespace}/{type}` or `.../{type}/{id}`.
    pub fn resource(&self, resource_kind: &str, id: Option<&str>) -> String {
        let mut url = format!("{}/{resource_kind}", self.base());
        if let Some(id) = id {
            url.push('/');
            url.push_str(id);
        }
        url
    }

    /// `.../{type}/{id}/relationships/{relationship}`.
    pub fn relationship(&self, resource_kind: &str, id: &str, relationship: &str) -> String {
        format!(
            "{}/relationships/{relationship}",
            self.resource(resource_kind, Some(id))
        )
    }

    /// `.../{type}/{id}/{relationship}` for fetching related resources.
    pub fn related(&self, resource_kind: &str, id: &str, relationship: &str) -> String {
        format!("{}/{relationship}", self.resource(resource_kind, Some(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralization_rules() {
        assert_eq!(pluralize("planet"), "planets");
        assert_eq!(pluralize("galaxy"), "galaxies");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("box"), "boxes");
    }

    #[test]
    fn singularization_inverts() {
        for word in ["planet", "galaxy", "day", "box", "moon"] {
            assert_eq!(singularize(&pluralize(word)), word);
        }
    }

    #[test]
    fn urls_compose_host_and_namespace() {
        let urls = UrlBuilder::new(
            Some("http://example.com/".to_string()),
            Some("api/v1".to_string()),
        );
        assert_eq!(urls.resource("planets", None), "http://example.com/api/v1/planets");
        assert_eq!(
            urls.resource("planets", Some("12345")),
            "http://example.com/api/v1/planets/12345"
        );
        assert_eq!(
            urls.relationship("planets", "12345", "moons"),
            "http://example.com/api/v1/planets/12345/relationships/moons"
        );
        assert_eq!(
            urls.related("planets", "12345", "moons"),
            "http://example.com/api/v1/planets/12345/moons"
        );
    }

    #[test]
    fn urls_without_host_are_paths() {
        let urls = UrlBuilder::new(None, None);
        assert_eq!(urls.resource("planets", None), "/planets");

        let urls = UrlBuilder::new(None, Some("api".to_string()));
        assert_eq!(urls.resource("planets", Some("1")), "/api/planets/1");
    }
}
