//! Topic patterns compiled once at registration time.

use std::{fmt, str::FromStr};

use crate::error::{EventError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Any,
    Literal(String),
}

/// A compiled topic pattern.
///
/// A pattern matches a topic iff both have the same number of `:` segments
/// and every pattern segment is `*` or equal to the topic segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.trim().is_empty() {
            return Err(EventError::invalid_pattern(pattern, "pattern is empty"));
        }
        let segments = pattern
            .split(':')
            .map(|seg| match seg {
                "" => Err(EventError::invalid_pattern(pattern, "empty segment")),
                "*" => Ok(Segment::Any),
                lit => Ok(Segment::Literal(lit.to_string())),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn matches(&self, topic: &str) -> bool {
        let mut parts = topic.split(':');
        for segment in &self.segments {
            match (segment, parts.next()) {
                (_, None) => return false,
                (Segment::Any, Some(_)) => {},
                (Segment::Literal(lit), Some(part)) => {
                    if lit != part {
                        return false;
                    }
                },
            }
        }
        parts.next().is_none()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern contains no wildcard.
    pub fn is_exact(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for TopicPattern {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("container:*:discovered", "container:feed_list:discovered", true)]
    #[case("container:*:discovered", "container:feed_post:discovered", true)]
    #[case("container:*:discovered", "container:feed_list:children_discovered", false)]
    #[case("container:*:discovered", "container:a:b:discovered", false)]
    #[case("container:*", "container:a:discovered", false)]
    #[case("*:*", "a:b", true)]
    #[case("page:loaded", "page:loaded", true)]
    #[case("page:loaded", "page:load", false)]
    #[case("error", "error", true)]
    fn pattern_matching(#[case] pattern: &str, #[case] topic: &str, #[case] expected: bool) {
        let p = TopicPattern::parse(pattern).unwrap();
        assert_eq!(p.matches(topic), expected, "{pattern} vs {topic}");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("container::discovered")]
    #[case("container:")]
    fn rejects_malformed(#[case] pattern: &str) {
        assert!(TopicPattern::parse(pattern).is_err());
    }

    #[test]
    fn exactness() {
        assert!(TopicPattern::parse("a:b").unwrap().is_exact());
        assert!(!TopicPattern::parse("a:*").unwrap().is_exact());
    }
}
