//! Case-preserving multi-value header storage.
//!
//! `http::HeaderMap` lowercases names, but the gateway format echoes header
//! names back exactly as the application wrote them, so names are kept as
//! given and compared ASCII case-insensitively.

use std::collections::BTreeMap;

/// Ordered mapping of header name to its values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderBag {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Replace every value of `name` with `value`. The new spelling of the
    /// name wins.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.insert_all(name, vec![value.into()]);
    }

    /// Replace every value of `name` with `values`.
    pub fn insert_all(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx] = (name, values),
            None => self.entries.push((name, values)),
        }
    }

    /// Add a value to `name`, keeping the values already present.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1.push(value.into()),
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|idx| self.entries[idx].1.as_slice())
    }

    /// First value of `name`, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|idx| self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Multi-value view keyed by the stored spelling of each name.
    pub fn to_multi_value_map(&self) -> BTreeMap<String, Vec<String>> {
        self.entries
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Single-value view; the last value of each name is kept.
    pub fn to_single_value_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.last().map(|last| (k.clone(), last.clone())))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderBag
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = HeaderBag::new();
        for (k, v) in iter {
            bag.append(k, v);
        }
        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive_but_names_are_preserved() {
        let mut headers = HeaderBag::new();
        headers.insert("Foo", "Bar");

        assert_eq!(headers.first("foo"), Some("Bar"));
        assert_eq!(headers.first("FOO"), Some("Bar"));
        assert_eq!(headers.iter().next().map(|(k, _)| k), Some("Foo"));
    }

    #[test]
    fn test_insert_replaces_and_append_accumulates() {
        let mut headers = HeaderBag::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("set-cookie", "b=2");
        assert_eq!(
            headers.get("Set-Cookie"),
            Some(&["a=1".to_string(), "b=2".to_string()][..])
        );

        headers.insert("SET-COOKIE", "c=3");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("set-cookie"), Some(&["c=3".to_string()][..]));
        assert!(headers.contains("SET-COOKIE"));
    }

    #[test]
    fn test_map_views() {
        let headers: HeaderBag = vec![("Foo", "1"), ("Foo", "2"), ("Bar", "x")]
            .into_iter()
            .collect();

        let multi = headers.to_multi_value_map();
        assert_eq!(multi["Foo"], vec!["1".to_string(), "2".to_string()]);

        let single = headers.to_single_value_map();
        assert_eq!(single["Foo"], "2");
        assert_eq!(single["Bar"], "x");
    }

    #[test]
    fn test_remove() {
        let mut headers = HeaderBag::new();
        headers.insert("Foo", "Bar");
        assert_eq!(headers.remove("foo"), Some(vec!["Bar".to_string()]));
        assert!(headers.is_empty());
        assert_eq!(headers.remove("foo"), None);
    }
}
