use {
    cartograph_common::now_ms,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// Topic under which handler failures are recorded.
pub const ERROR_TOPIC: &str = "error";

/// An immutable event value. The bus only stores and forwards these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
    pub timestamp_ms: u64,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp_ms: now_ms(),
        }
    }

    /// The `index`-th colon-delimited segment of the topic.
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.topic.split(':').nth(index)
    }

    pub fn is_error(&self) -> bool {
        self.topic == ERROR_TOPIC
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn segments() {
        let ev = Event::new("container:feed_list:discovered", Value::Null);
        assert_eq!(ev.segment(0), Some("container"));
        assert_eq!(ev.segment(1), Some("feed_list"));
        assert_eq!(ev.segment(3), None);
    }

    #[test]
    fn serializes_camel_case() {
        let ev = Event::new("a:b", json!({"x": 1}));
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["topic"], "a:b");
        assert!(v["timestampMs"].as_u64().unwrap() > 0);
    }
}
