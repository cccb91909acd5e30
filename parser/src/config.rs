//! Declarative parser configuration.
//!
//! A [`ParserConfig`] is a JSON-friendly list of reader specs that builds a
//! ready-to-run [`TriggerDispatcher`]. The same [`ReaderSpec`] type backs the
//! programmatic `add_*` registration calls.

use crate::dispatcher::{SequenceDispatcher, TriggerDispatcher};
use crate::trigger::TriggerSpec;
use crate::vector::{ModePolicy, Separator};
use crate::{ParseError, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::info;

/// Which reader variant a spec builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderKind {
    /// Trigger line, vector on the next line
    #[default]
    Block,
    /// Vector after the trigger on the same line
    Inline,
    /// `... time_stamp: <t>` header, label line, vector line
    TimedBlock,
    /// Every regex match on the first matching line
    Regex,
    /// Entry trigger followed by repeated records of `fields`
    Sequence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderSpec {
    pub trigger: TriggerSpec,
    /// Collector name; for sequences, the reader name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims: Option<Vec<String>>,
    #[serde(default)]
    pub kind: ReaderKind,
    #[serde(default)]
    pub separator: Separator,
    #[serde(default)]
    pub mode: ModePolicy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ReaderSpec>,
}

impl ReaderSpec {
    pub fn new(kind: ReaderKind, trigger: impl Into<TriggerSpec>, name: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            name: name.into(),
            dims: None,
            kind,
            separator: Separator::default(),
            mode: ModePolicy::default(),
            fields: Vec::new(),
        }
    }

    pub fn block(trigger: impl Into<TriggerSpec>, name: impl Into<String>) -> Self {
        Self::new(ReaderKind::Block, trigger, name)
    }

    pub fn inline(trigger: impl Into<TriggerSpec>, name: impl Into<String>) -> Self {
        Self::new(ReaderKind::Inline, trigger, name)
    }

    pub fn timed(trigger: impl Into<TriggerSpec>, name: impl Into<String>) -> Self {
        Self::new(ReaderKind::TimedBlock, trigger, name)
    }

    pub fn regex(pattern: &str, name: impl Into<String>) -> Self {
        Self::new(ReaderKind::Regex, TriggerSpec::Pattern(pattern.to_string()), name)
    }

    pub fn sequence(entry: impl Into<TriggerSpec>, name: impl Into<String>, fields: Vec<ReaderSpec>) -> Self {
        Self {
            fields,
            ..Self::new(ReaderKind::Sequence, entry, name)
        }
    }

    pub fn with_dims(mut self, dims: Option<Vec<String>>) -> Self {
        self.dims = dims;
        self
    }

    pub fn with_separator(mut self, separator: Separator) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_mode(mut self, mode: ModePolicy) -> Self {
        self.mode = mode;
        self
    }
}

/// Trigger-driven configuration. Reader order is trigger priority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(default)]
    pub readers: Vec<ReaderSpec>,
}

impl ParserConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn build(&self) -> Result<TriggerDispatcher> {
        let mut dispatcher = TriggerDispatcher::new();
        for spec in &self.readers {
            match spec.kind {
                ReaderKind::Sequence => {
                    dispatcher.add_sequence_parser(spec.trigger.clone(), &spec.name, &spec.fields)?;
                }
                _ => {
                    dispatcher.add_reader(spec)?;
                }
            }
        }
        info!(
            "Built trigger dispatcher with {} readers and {} collectors",
            self.readers.len(),
            dispatcher.collectors().len()
        );
        Ok(dispatcher)
    }
}

/// Sequence-driven configuration: optional entry trigger, then the record
/// fields in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<TriggerSpec>,
    pub fields: Vec<ReaderSpec>,
}

impl SequenceConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn build(&self) -> Result<SequenceDispatcher> {
        if self.fields.is_empty() {
            return Err(ParseError::InvalidConfig(
                "a sequence needs at least one field reader".to_string(),
            ));
        }
        let entry = self.entry.as_ref().map(TriggerSpec::compile).transpose()?;
        let mut dispatcher = SequenceDispatcher::new(entry);
        for spec in &self.fields {
            dispatcher.add_field(spec)?;
        }
        Ok(dispatcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorRef;
    use crate::VectorMode;
    use std::io::Cursor;

    const CONFIG: &str = r#"{
        "readers": [
            {"trigger": {"text": "HL_PID_PositionError"}, "name": "pos error"},
            {"trigger": {"text": "vel:"}, "name": "vel", "kind": "inline",
             "dims": ["vx", "vy"], "mode": {"fixed": "unbracketed"}},
            {"trigger": {"text": "Joint state time_stamp:"}, "name": "q", "kind": "timed_block"},
            {"trigger": {"pattern": "err=(\\d+)"}, "name": "errors", "kind": "regex"},
            {"trigger": {"text": "BEGIN"}, "name": "records", "kind": "sequence",
             "fields": [
                {"trigger": {"text": "F:"}, "name": "f", "kind": "inline", "separator": {"char": ","}}
             ]}
        ]
    }"#;

    #[test]
    fn test_config_from_json() {
        let config = ParserConfig::from_json(CONFIG).unwrap();
        assert_eq!(config.readers.len(), 5);
        assert_eq!(config.readers[0].kind, ReaderKind::Block);
        assert_eq!(config.readers[1].mode, ModePolicy::Fixed(VectorMode::Unbracketed));
        assert_eq!(config.readers[4].fields[0].separator, Separator::Char(','));

        let back: ParserConfig =
            serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_config_build_and_run() {
        let mut dispatcher = ParserConfig::from_json(CONFIG).unwrap().build().unwrap();
        let log = "\
boot
HL_PID_PositionError
0.1 0.2 0.3
vel: 1 2
Joint state time_stamp: 100
Joint state
[5 6]
err=42 err=43
BEGIN
F: 1, 2
F: 3, 4
vel: 3 4
";
        dispatcher.parse(Cursor::new(log)).unwrap();

        let lens: Vec<(String, usize)> = dispatcher
            .collectors()
            .iter()
            .map(|c| (c.name().to_string(), c.len()))
            .collect();
        assert_eq!(
            lens,
            vec![
                ("pos error".to_string(), 1),
                ("vel".to_string(), 2),
                ("q".to_string(), 1),
                ("errors".to_string(), 1),
                ("f".to_string(), 2),
            ]
        );

        match dispatcher.collector("errors") {
            Some(CollectorRef::Plain(c)) => assert_eq!(c.items()[0], serde_json::json!(["42", "43"])),
            other => panic!("unexpected collector: {:?}", other),
        }
        match dispatcher.collector("vel") {
            Some(CollectorRef::Vector(c)) => assert_eq!(c.dim_names, vec!["vx", "vy"]),
            other => panic!("unexpected collector: {:?}", other),
        }
    }

    #[test]
    fn test_config_rejects_bad_specs() {
        let bad_timed = r#"{"readers": [{"trigger": {"pattern": "t\\d time_stamp:"}, "name": "t", "kind": "timed_block"}]}"#;
        assert!(matches!(
            ParserConfig::from_json(bad_timed).unwrap().build(),
            Err(ParseError::InvalidConfig(_))
        ));

        let dup = r#"{"readers": [
            {"trigger": {"text": "A"}, "name": "x"},
            {"trigger": {"text": "B"}, "name": "x"}
        ]}"#;
        assert!(ParserConfig::from_json(dup).unwrap().build().is_err());

        let bad_regex = r#"{"readers": [{"trigger": {"pattern": "("}, "name": "r", "kind": "regex"}]}"#;
        assert!(matches!(
            ParserConfig::from_json(bad_regex).unwrap().build(),
            Err(ParseError::Regex(_))
        ));

        assert!(matches!(
            ParserConfig::from_json("{\"readers\": 3}"),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn test_programmatic_config() {
        let config = ParserConfig {
            readers: vec![
                ReaderSpec::sequence(
                    "frame",
                    "frames",
                    vec![
                        ReaderSpec::inline("p=", "p").with_separator(Separator::Char(';')),
                        ReaderSpec::regex(r"ok|fail", "status"),
                    ],
                ),
                ReaderSpec::block("summary", "summary")
                    .with_dims(Some(vec!["mean".into()]))
                    .with_mode(ModePolicy::Fixed(VectorMode::Bracketed)),
            ],
        };
        let mut dispatcher = config.build().unwrap();
        assert_eq!(dispatcher.triggers(), vec!["frame", "summary"]);

        let log = "frame 1\np=1;2\nok\np=3;4\nfail fail\nsummary\n[2.5]\n";
        dispatcher.parse(Cursor::new(log)).unwrap();

        assert_eq!(dispatcher.collector("p").map(|c| c.len()), Some(2));
        match dispatcher.collector("status") {
            Some(CollectorRef::Plain(c)) => {
                assert_eq!(c.items(), &[serde_json::json!(["ok"]), serde_json::json!(["fail", "fail"])])
            }
            other => panic!("unexpected collector: {:?}", other),
        }
        assert_eq!(dispatcher.collector("summary").map(|c| c.len()), Some(1));
    }

    #[test]
    fn test_sequence_config() {
        let json = r#"{
            "entry": {"text": "START"},
            "fields": [
                {"trigger": {"text": "A"}, "name": "a"},
                {"trigger": {"text": "B"}, "name": "b"}
            ]
        }"#;
        let mut dispatcher = SequenceConfig::from_json(json).unwrap().build().unwrap();
        let residual = dispatcher
            .parse(Cursor::new("START\nA\n1\nB\n2\ndone\n"))
            .unwrap();
        assert_eq!(residual.as_deref(), Some("done"));

        let empty = SequenceConfig {
            entry: None,
            fields: Vec::new(),
        };
        assert!(matches!(empty.build(), Err(ParseError::InvalidConfig(_))));
    }
}
