use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker that opens a parseable block: a plain substring or a regex.
#[derive(Debug, Clone)]
pub enum Trigger {
    Text(String),
    Pattern(Regex),
}

impl Trigger {
    pub fn pattern(pattern: &str) -> crate::Result<Self> {
        Ok(Trigger::Pattern(Regex::new(pattern)?))
    }

    pub fn matches(&self, line: &str) -> bool {
        match self {
            Trigger::Text(text) => line.contains(text.as_str()),
            Trigger::Pattern(re) => re.is_match(line),
        }
    }

    /// Text following the first occurrence of the trigger in `line`.
    pub fn split_after<'a>(&self, line: &'a str) -> Option<&'a str> {
        match self {
            Trigger::Text(text) => line
                .find(text.as_str())
                .map(|start| &line[start + text.len()..]),
            Trigger::Pattern(re) => re.find(line).map(|m| &line[m.end()..]),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Trigger::Text(text) => text,
            Trigger::Pattern(re) => re.as_str(),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Trigger {
    fn from(text: &str) -> Self {
        Trigger::Text(text.to_string())
    }
}

/// Serializable form of a [`Trigger`], used by the declarative config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSpec {
    Text(String),
    Pattern(String),
}

impl TriggerSpec {
    pub fn compile(&self) -> crate::Result<Trigger> {
        match self {
            TriggerSpec::Text(text) => Ok(Trigger::Text(text.clone())),
            TriggerSpec::Pattern(pattern) => Trigger::pattern(pattern),
        }
    }

    /// The trigger as a regex; plain text is matched literally.
    pub fn regex(&self) -> crate::Result<Regex> {
        let re = match self {
            TriggerSpec::Text(text) => Regex::new(&regex::escape(text))?,
            TriggerSpec::Pattern(pattern) => Regex::new(pattern)?,
        };
        Ok(re)
    }

    /// Timed readers derive their label line from the literal trigger text,
    /// so they only accept plain text.
    pub fn timed_text(&self) -> crate::Result<&str> {
        match self {
            TriggerSpec::Text(text) => Ok(text),
            TriggerSpec::Pattern(pattern) => Err(crate::ParseError::InvalidConfig(format!(
                "timed readers need a text trigger, got pattern {:?}",
                pattern
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TriggerSpec::Text(s) | TriggerSpec::Pattern(s) => s,
        }
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for TriggerSpec {
    fn from(text: &str) -> Self {
        TriggerSpec::Text(text.to_string())
    }
}

impl From<String> for TriggerSpec {
    fn from(text: String) -> Self {
        TriggerSpec::Text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_trigger() {
        let t = Trigger::from("POS:");
        assert!(t.matches("robot POS: 1 2 3"));
        assert!(!t.matches("pos: 1 2 3"));
        assert_eq!(t.split_after("robot POS: 1 2 3"), Some(" 1 2 3"));
        assert_eq!(t.split_after("nothing"), None);
    }

    #[test]
    fn test_pattern_trigger() {
        let t = Trigger::pattern(r"step \d+:").unwrap();
        assert!(t.matches("step 12: 0.5"));
        assert!(!t.matches("step x: 0.5"));
        assert_eq!(t.split_after("step 12: 0.5"), Some(" 0.5"));
        assert_eq!(t.to_string(), r"step \d+:");
    }

    #[test]
    fn test_trigger_spec_json() {
        let spec: TriggerSpec = serde_json::from_str(r#"{"pattern":"^V\\d"}"#).unwrap();
        assert!(spec.compile().unwrap().matches("V1 foo"));

        let bad = TriggerSpec::Pattern("(".to_string());
        assert!(matches!(bad.compile(), Err(crate::ParseError::Regex(_))));
    }
}
