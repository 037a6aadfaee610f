use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::ApiError;

/// Ordered header list with case-insensitive names.
///
/// Inserting a name that already exists (in any casing) replaces its value in
/// place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .map(|idx| self.entries[idx].1.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|idx| self.entries.remove(idx).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Overwrites entries of `self` with those of `other`, matching names
    /// case-insensitively.
    pub fn merge(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converts into a transport header map.
    pub fn to_header_map(&self) -> Result<HeaderMap, ApiError> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| ApiError::Encode(format!("invalid header name '{name}': {err}")))?;
            let header_value = HeaderValue::from_str(value).map_err(|err| {
                ApiError::Encode(format!("invalid value for header '{name}': {err}"))
            })?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::{ApiError, Headers};

    #[test]
    fn insert_overwrites_case_insensitively() {
        let mut headers = Headers::from([("Content-Type", "text/plain"), ("X-Trace", "1")]);
        headers.insert("content-type", "application/json");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["Content-Type", "X-Trace"]);
    }

    #[test]
    fn merge_new_values_win() {
        let mut base = Headers::from([("Accept", "text/html"), ("X-Keep", "yes")]);
        base.merge(&Headers::from([("accept", "application/json"), ("X-New", "1")]));

        assert_eq!(base.get("Accept"), Some("application/json"));
        assert_eq!(base.get("x-keep"), Some("yes"));
        assert_eq!(base.get("X-New"), Some("1"));
    }

    #[test]
    fn remove_by_any_casing() {
        let mut headers = Headers::from([("Authorization", "Bearer x")]);
        assert_eq!(headers.remove("authorization").as_deref(), Some("Bearer x"));
        assert!(headers.is_empty());
    }

    #[test]
    fn header_map_rejects_invalid_values() {
        let headers = Headers::from([("X-Bad", "line\nbreak")]);
        let err = headers.to_header_map().expect_err("must reject newline");
        assert!(matches!(err, ApiError::Encode(_)));

        let map = Headers::from([("X-Ok", "1")])
            .to_header_map()
            .expect("must convert");
        assert_eq!(map.get("x-ok").and_then(|v| v.to_str().ok()), Some("1"));
    }
}
