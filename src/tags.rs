//! Resolve service/component labels from stack tags.

use serde::{Deserialize, Serialize};

/// A key/value tag attached to a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

type Lookup = Box<dyn Fn(&[Tag]) -> Option<String> + Send + Sync>;

/// Ordered list of tag lookups. The first lookup producing a value wins.
pub struct TagResolver {
    lookups: Vec<Lookup>,
}

impl TagResolver {
    /// Build a resolver that tries each tag key in order.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lookups = keys
            .into_iter()
            .map(|key| {
                let key: String = key.into();
                Box::new(move |tags: &[Tag]| {
                    tags.iter()
                        .find(|t| t.key == key)
                        .map(|t| t.value.clone())
                }) as Lookup
            })
            .collect();
        Self { lookups }
    }

    pub fn resolve(&self, tags: &[Tag]) -> Option<String> {
        self.lookups.iter().find_map(|lookup| lookup(tags))
    }
}

impl std::fmt::Debug for TagResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagResolver")
            .field("lookups", &self.lookups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Vec<Tag> {
        pairs
            .iter()
            .map(|(k, v)| Tag {
                key: k.to_string(),
                value: v.to_string(),
            })
            .collect()
    }

    #[rstest]
    #[case::first_key(&[("ServiceName", "api"), ("Service", "other")], Some("api"))]
    #[case::fallback_key(&[("Service", "etl")], Some("etl"))]
    #[case::order_of_keys_not_tags(&[("Service", "late"), ("ServiceName", "early")], Some("early"))]
    #[case::no_match(&[("Owner", "me")], None)]
    #[case::no_tags(&[], None)]
    fn test_resolve_first_match(#[case] pairs: &[(&str, &str)], #[case] expected: Option<&str>) {
        let resolver = TagResolver::from_keys(["ServiceName", "Service"]);
        assert_eq!(resolver.resolve(&tags(pairs)).as_deref(), expected);
    }

    #[test]
    fn test_empty_resolver_resolves_nothing() {
        let resolver = TagResolver::from_keys(Vec::<String>::new());
        assert_eq!(resolver.resolve(&tags(&[("ServiceName", "api")])), None);
    }
}
