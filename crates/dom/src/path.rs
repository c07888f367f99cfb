use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomError;

const ROOT: &str = "root";

/// Slash-separated child-index address of an element, e.g. `root/1/2/0`.
///
/// `root` is the document element itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomPath(Vec<usize>);

impl DomPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_indices(indices: impl Into<Vec<usize>>) -> Self {
        Self(indices.into())
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Number of steps below the document element.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    /// True if `self` equals `other` or is one of its ancestors.
    pub fn contains(&self, other: &DomPath) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for DomPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(ROOT)?;
        for i in &self.0 {
            write!(f, "/{i}")?;
        }
        Ok(())
    }
}

impl FromStr for DomPath {
    type Err = DomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().trim_end_matches('/').split('/');
        if parts.next() != Some(ROOT) {
            return Err(DomError::InvalidPath(s.to_string()));
        }
        parts
            .map(|p| p.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
            .map_err(|_| DomError::InvalidPath(s.to_string()))
    }
}

impl Serialize for DomPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DomPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("root", &[])]
    #[case("root/1/2/0", &[1, 2, 0])]
    #[case("root/3/", &[3])]
    fn parses(#[case] raw: &str, #[case] expected: &[usize]) {
        let path: DomPath = raw.parse().unwrap();
        assert_eq!(path.indices(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("1/2")]
    #[case("root/a")]
    #[case("root//1")]
    #[case("body/1")]
    fn rejects(#[case] raw: &str) {
        assert!(raw.parse::<DomPath>().is_err());
    }

    #[test]
    fn display_and_navigation() {
        let path = DomPath::root().child(1).child(2);
        assert_eq!(path.to_string(), "root/1/2");
        assert_eq!(path.parent().unwrap().to_string(), "root/1");
        assert!(DomPath::root().parent().is_none());
        assert!(DomPath::root().contains(&path));
        assert!(path.contains(&path));
        assert!(!path.contains(&DomPath::root()));
    }

    #[test]
    fn serde_as_string() {
        let path = DomPath::from_indices(vec![0, 4]);
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"root/0/4\"");
        let back: DomPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
