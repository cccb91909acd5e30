//! State readers of the log FSM.
//!
//! Each reader consumes one logical block from a [`LineSource`], writes what it
//! extracted into its collector, and names the reader to run next. Readers are
//! a closed set of kinds living in a dispatcher-owned arena and refer to each
//! other by [`ReaderId`].

use crate::collector::{CollectorHandle, CollectorSet, PlainCollector, PlainHandle, TimedHandle,
    TimedVectorCollector, VectorCollector, VectorHandle};
use crate::config::{ReaderKind, ReaderSpec};
use crate::stream::LineSource;
use crate::trigger::Trigger;
use crate::vector::VectorDecoder;
use crate::{ParseError, Result};
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Header suffix of timestamped blocks, e.g. `Joint state time_stamp: 1700`.
pub const TIME_STAMP_SUFFIX: &str = "time_stamp:";

/// Stable index of a reader inside its dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderId(pub(crate) usize);

/// Outcome of one reader invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Reader to run next; `None` ends the dispatch.
    pub next: Option<ReaderId>,
    /// Line already read that the next reader should start from.
    pub carried: Option<String>,
}

impl Transition {
    pub fn finish() -> Self {
        Self {
            next: None,
            carried: None,
        }
    }
}

/// Common contract of every reader kind.
pub trait StateReader {
    fn name(&self) -> &str;

    /// Consume one block. `carried` is a line a previous step already read;
    /// when `None` the reader pulls its first line from `source`.
    fn invoke(
        &mut self,
        source: &mut dyn LineSource,
        carried: Option<String>,
        collectors: &mut CollectorSet,
    ) -> Result<Transition>;
}

fn take_line(source: &mut dyn LineSource, carried: Option<String>, reader: &str) -> Result<String> {
    match carried {
        Some(line) => Ok(line),
        None => next_line(source, reader),
    }
}

fn next_line(source: &mut dyn LineSource, reader: &str) -> Result<String> {
    source.read_line()?.ok_or_else(|| ParseError::StreamExhausted {
        reader: reader.to_string(),
    })
}

fn expect_trigger(reader: &str, trigger: &Trigger, line: &str) -> Result<()> {
    if trigger.matches(line) {
        Ok(())
    } else {
        Err(ParseError::ContractViolation {
            reader: reader.to_string(),
            trigger: trigger.to_string(),
            line: line.to_string(),
        })
    }
}

/// Root of a trigger-driven dispatch: scans forward until a registered
/// trigger shows up and hands the matching line to its reader.
#[derive(Debug, Clone, Default)]
pub struct PassInit {
    table: Vec<(Trigger, ReaderId)>,
}

impl PassInit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration order is match priority.
    pub fn add(&mut self, trigger: Trigger, reader: ReaderId) {
        self.table.push((trigger, reader));
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.table.iter().map(|(t, _)| t)
    }
}

impl StateReader for PassInit {
    fn name(&self) -> &str {
        "pass_init"
    }

    fn invoke(
        &mut self,
        source: &mut dyn LineSource,
        carried: Option<String>,
        _collectors: &mut CollectorSet,
    ) -> Result<Transition> {
        let mut line = carried;
        loop {
            let Some(current) = line.take().map_or_else(|| source.read_line(), |l| Ok(Some(l)))? else {
                trace!("End of stream reached at line {}", source.line_number());
                return Ok(Transition::finish());
            };

            if let Some((trigger, id)) = self.table.iter().find(|(t, _)| t.matches(&current)) {
                trace!("Trigger '{}' matched line {}", trigger, source.line_number());
                return Ok(Transition {
                    next: Some(*id),
                    carried: Some(current),
                });
            }
        }
    }
}

/// Header line with the trigger, vector on the following line:
///
/// ```text
/// HL_PID_PositionError
/// -0.577775   0.223376  -0.315034
/// ```
#[derive(Debug, Clone)]
pub struct BlockVectorReader {
    name: String,
    trigger: Trigger,
    collector: VectorHandle,
    decoder: VectorDecoder,
    pass: Option<ReaderId>,
}

impl BlockVectorReader {
    pub fn new(
        name: impl Into<String>,
        trigger: Trigger,
        collector: VectorHandle,
        decoder: VectorDecoder,
        pass: Option<ReaderId>,
    ) -> Self {
        Self {
            name: name.into(),
            trigger,
            collector,
            decoder,
            pass,
        }
    }
}

impl StateReader for BlockVectorReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(
        &mut self,
        source: &mut dyn LineSource,
        carried: Option<String>,
        collectors: &mut CollectorSet,
    ) -> Result<Transition> {
        let header = take_line(source, carried, &self.name)?;
        expect_trigger(&self.name, &self.trigger, &header)?;

        let line = next_line(source, &self.name)?;
        let values = self.decoder.decode(&line, source)?;
        trace!("{}: decoded {} values", self.name, values.len());
        collectors.vector_mut(self.collector).push(values);

        Ok(Transition {
            next: self.pass,
            carried: None,
        })
    }
}

/// Vector on the same line, right after the trigger: `POS: 0.1 0.2 0.3`.
#[derive(Debug, Clone)]
pub struct InlineVectorReader {
    name: String,
    trigger: Trigger,
    collector: VectorHandle,
    decoder: VectorDecoder,
    pass: Option<ReaderId>,
}

impl InlineVectorReader {
    pub fn new(
        name: impl Into<String>,
        trigger: Trigger,
        collector: VectorHandle,
        decoder: VectorDecoder,
        pass: Option<ReaderId>,
    ) -> Self {
        Self {
            name: name.into(),
            trigger,
            collector,
            decoder,
            pass,
        }
    }
}

impl StateReader for InlineVectorReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(
        &mut self,
        source: &mut dyn LineSource,
        carried: Option<String>,
        collectors: &mut CollectorSet,
    ) -> Result<Transition> {
        let header = take_line(source, carried, &self.name)?;
        let Some(rest) = self.trigger.split_after(&header) else {
            return Err(ParseError::ContractViolation {
                reader: self.name.clone(),
                trigger: self.trigger.to_string(),
                line: header.clone(),
            });
        };

        let values = self.decoder.decode(rest, source)?;
        collectors.vector_mut(self.collector).push(values);

        Ok(Transition {
            next: self.pass,
            carried: None,
        })
    }
}

/// Timestamped block:
///
/// ```text
/// Joint state time_stamp: 234567678
/// Joint state
/// -0.577775   0.223376  -0.315034
/// ```
///
/// The label line must contain the trigger with its `time_stamp:` suffix
/// (the last 11 characters) cut off.
#[derive(Debug, Clone)]
pub struct TimedBlockVectorReader {
    name: String,
    trigger: Trigger,
    label: String,
    collector: TimedHandle,
    decoder: VectorDecoder,
    pass: Option<ReaderId>,
}

impl TimedBlockVectorReader {
    pub fn new(
        name: impl Into<String>,
        trigger: &str,
        collector: TimedHandle,
        decoder: VectorDecoder,
        pass: Option<ReaderId>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            label: timed_label(trigger)?,
            trigger: Trigger::Text(trigger.to_string()),
            collector,
            decoder,
            pass,
        })
    }
}

/// `trigger` minus its trailing `time_stamp:`-sized suffix, with trailing
/// whitespace dropped since label lines are newline-normalized.
pub fn timed_label(trigger: &str) -> Result<String> {
    let suffix_len = TIME_STAMP_SUFFIX.chars().count();
    let Some((cut, _)) = trigger.char_indices().rev().nth(suffix_len - 1) else {
        return Err(ParseError::InvalidConfig(format!(
            "timed trigger {:?} is shorter than the '{}' suffix",
            trigger, TIME_STAMP_SUFFIX
        )));
    };
    Ok(trigger[..cut].trim_end().to_string())
}

impl StateReader for TimedBlockVectorReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(
        &mut self,
        source: &mut dyn LineSource,
        carried: Option<String>,
        collectors: &mut CollectorSet,
    ) -> Result<Transition> {
        let header = take_line(source, carried, &self.name)?;
        expect_trigger(&self.name, &self.trigger, &header)?;

        let timestamp = header
            .split_whitespace()
            .last()
            .and_then(|token| token.parse::<i64>().ok())
            .ok_or_else(|| ParseError::InvalidTimestamp(header.clone()))?;

        let label = next_line(source, &self.name)?;
        if !label.contains(self.label.as_str()) {
            return Err(ParseError::ContractViolation {
                reader: self.name.clone(),
                trigger: self.label.clone(),
                line: label,
            });
        }

        let line = next_line(source, &self.name)?;
        let values = self.decoder.decode(&line, source)?;
        trace!("{}: t={} decoded {} values", self.name, timestamp, values.len());
        collectors.timed_mut(self.collector).push(timestamp, values);

        Ok(Transition {
            next: self.pass,
            carried: None,
        })
    }
}

/// Collects every non-overlapping match of a regex. Lines without a match
/// are skipped until one matches; running out of lines first is an error.
#[derive(Debug, Clone)]
pub struct RegexReader {
    name: String,
    trigger: Trigger,
    regex: Regex,
    collector: PlainHandle,
    pass: Option<ReaderId>,
}

impl RegexReader {
    pub fn new(name: impl Into<String>, regex: Regex, collector: PlainHandle, pass: Option<ReaderId>) -> Self {
        Self {
            name: name.into(),
            trigger: Trigger::Pattern(regex.clone()),
            regex,
            collector,
            pass,
        }
    }

    /// Strings for pattern-wide matches or a single group, arrays of groups
    /// otherwise. Groups that did not participate become `""`.
    fn find_all(&self, line: &str) -> Vec<serde_json::Value> {
        use serde_json::Value;

        match self.regex.captures_len() {
            1 => self
                .regex
                .find_iter(line)
                .map(|m| Value::String(m.as_str().to_string()))
                .collect(),
            2 => self
                .regex
                .captures_iter(line)
                .map(|c| Value::String(c.get(1).map_or("", |m| m.as_str()).to_string()))
                .collect(),
            _ => self
                .regex
                .captures_iter(line)
                .map(|c| {
                    Value::Array(
                        c.iter()
                            .skip(1)
                            .map(|g| Value::String(g.map_or("", |m| m.as_str()).to_string()))
                            .collect(),
                    )
                })
                .collect(),
        }
    }
}

impl StateReader for RegexReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(
        &mut self,
        source: &mut dyn LineSource,
        carried: Option<String>,
        collectors: &mut CollectorSet,
    ) -> Result<Transition> {
        let mut line = take_line(source, carried, &self.name)?;
        let matches = loop {
            let found = self.find_all(&line);
            if !found.is_empty() {
                break found;
            }
            line = next_line(source, &self.name)?;
        };

        trace!("{}: {} matches", self.name, matches.len());
        collectors
            .plain_mut(self.collector)
            .push(serde_json::Value::Array(matches));

        Ok(Transition {
            next: self.pass,
            carried: None,
        })
    }
}

/// A fixed, ordered list of field readers repeated while the first field's
/// trigger keeps appearing.
#[derive(Debug, Clone)]
pub struct SequenceBlock {
    fields: Vec<Reader>,
}

impl SequenceBlock {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn push(&mut self, field: Reader) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[Reader] {
        &self.fields
    }

    pub fn reset(&mut self) {
        self.fields.iter_mut().for_each(Reader::reset);
    }

    /// Run records until a line lacks the leading marker. Returns that line,
    /// or `None` when the stream ended between records.
    pub fn run_records(
        &mut self,
        source: &mut dyn LineSource,
        carried: Option<String>,
        collectors: &mut CollectorSet,
    ) -> Result<(usize, Option<String>)> {
        let mut carried = carried;
        let mut records = 0;

        loop {
            let Some(line) = carried.take().map_or_else(|| source.read_line(), |l| Ok(Some(l)))? else {
                return Ok((records, None));
            };

            let leads = self
                .fields
                .first()
                .and_then(Reader::trigger)
                .is_some_and(|marker| marker.matches(&line));
            if !leads {
                return Ok((records, Some(line)));
            }

            let mut residual = Some(line);
            for field in &mut self.fields {
                residual = field.invoke(source, residual, collectors)?.carried;
            }
            carried = residual;
            records += 1;
        }
    }
}

impl Default for SequenceBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands an entry-triggered region of the log to a [`SequenceBlock`], then
/// returns to its pass-through reader with the first line past the region.
#[derive(Debug, Clone)]
pub struct SequenceReader {
    name: String,
    entry: Trigger,
    block: SequenceBlock,
    pass: Option<ReaderId>,
}

impl SequenceReader {
    pub fn new(name: impl Into<String>, entry: Trigger, block: SequenceBlock, pass: Option<ReaderId>) -> Self {
        Self {
            name: name.into(),
            entry,
            block,
            pass,
        }
    }
}

impl StateReader for SequenceReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(
        &mut self,
        source: &mut dyn LineSource,
        carried: Option<String>,
        collectors: &mut CollectorSet,
    ) -> Result<Transition> {
        let header = take_line(source, carried, &self.name)?;
        expect_trigger(&self.name, &self.entry, &header)?;

        let (records, residual) = self.block.run_records(source, None, collectors)?;
        debug!("{}: read {} records", self.name, records);

        Ok(Transition {
            next: self.pass,
            carried: residual,
        })
    }
}

/// Every reader kind the FSM knows about.
#[derive(Debug, Clone)]
pub enum Reader {
    PassInit(PassInit),
    Block(BlockVectorReader),
    Inline(InlineVectorReader),
    TimedBlock(TimedBlockVectorReader),
    Regex(RegexReader),
    Sequence(SequenceReader),
}

impl Reader {
    /// The trigger this reader owns. The root scanner owns none.
    pub fn trigger(&self) -> Option<&Trigger> {
        match self {
            Reader::PassInit(_) => None,
            Reader::Block(r) => Some(&r.trigger),
            Reader::Inline(r) => Some(&r.trigger),
            Reader::TimedBlock(r) => Some(&r.trigger),
            Reader::Regex(r) => Some(&r.trigger),
            Reader::Sequence(r) => Some(&r.entry),
        }
    }

    /// Drop any locked vector mode.
    pub fn reset(&mut self) {
        match self {
            Reader::PassInit(_) | Reader::Regex(_) => {}
            Reader::Block(r) => r.decoder.reset(),
            Reader::Inline(r) => r.decoder.reset(),
            Reader::TimedBlock(r) => r.decoder.reset(),
            Reader::Sequence(r) => r.block.reset(),
        }
    }
}

impl StateReader for Reader {
    fn name(&self) -> &str {
        match self {
            Reader::PassInit(r) => r.name(),
            Reader::Block(r) => r.name(),
            Reader::Inline(r) => r.name(),
            Reader::TimedBlock(r) => r.name(),
            Reader::Regex(r) => r.name(),
            Reader::Sequence(r) => r.name(),
        }
    }

    fn invoke(
        &mut self,
        source: &mut dyn LineSource,
        carried: Option<String>,
        collectors: &mut CollectorSet,
    ) -> Result<Transition> {
        match self {
            Reader::PassInit(r) => r.invoke(source, carried, collectors),
            Reader::Block(r) => r.invoke(source, carried, collectors),
            Reader::Inline(r) => r.invoke(source, carried, collectors),
            Reader::TimedBlock(r) => r.invoke(source, carried, collectors),
            Reader::Regex(r) => r.invoke(source, carried, collectors),
            Reader::Sequence(r) => r.invoke(source, carried, collectors),
        }
    }
}

/// Check a field reader spec without touching any collector.
pub(crate) fn validate_spec(spec: &ReaderSpec, collectors: &CollectorSet) -> Result<()> {
    if collectors.find(&spec.name).is_some() {
        return Err(ParseError::InvalidConfig(format!(
            "duplicate collector name '{}'",
            spec.name
        )));
    }
    if !spec.fields.is_empty() {
        return Err(ParseError::InvalidConfig(format!(
            "reader '{}' is not a sequence but lists fields",
            spec.name
        )));
    }

    match spec.kind {
        ReaderKind::Block | ReaderKind::Inline => {
            spec.trigger.compile()?;
        }
        ReaderKind::TimedBlock => {
            timed_label(spec.trigger.timed_text()?)?;
        }
        ReaderKind::Regex => {
            spec.trigger.regex()?;
        }
        ReaderKind::Sequence => {
            return Err(ParseError::InvalidConfig(format!(
                "sequence '{}' cannot be used as a field reader",
                spec.name
            )));
        }
    }
    Ok(())
}

/// Build the reader and its collector for one field spec.
pub(crate) fn build_reader(
    spec: &ReaderSpec,
    pass: Option<ReaderId>,
    collectors: &mut CollectorSet,
) -> Result<(Reader, CollectorHandle)> {
    validate_spec(spec, collectors)?;

    let decoder = VectorDecoder::new(spec.separator, spec.mode);
    let dims = spec.dims.clone();
    let name = spec.name.as_str();

    let built = match spec.kind {
        ReaderKind::Block => {
            let trigger = spec.trigger.compile()?;
            let handle = collectors.add_vector(VectorCollector::new(name, dims));
            let reader = BlockVectorReader::new(name, trigger, handle, decoder, pass);
            (Reader::Block(reader), CollectorHandle::Vector(handle))
        }
        ReaderKind::Inline => {
            let trigger = spec.trigger.compile()?;
            let handle = collectors.add_vector(VectorCollector::new(name, dims));
            let reader = InlineVectorReader::new(name, trigger, handle, decoder, pass);
            (Reader::Inline(reader), CollectorHandle::Vector(handle))
        }
        ReaderKind::TimedBlock => {
            let trigger = spec.trigger.timed_text()?;
            let handle = collectors.add_timed(TimedVectorCollector::new(name, dims));
            let reader = TimedBlockVectorReader::new(name, trigger, handle, decoder, pass)?;
            (Reader::TimedBlock(reader), CollectorHandle::Timed(handle))
        }
        ReaderKind::Regex => {
            let regex = spec.trigger.regex()?;
            let handle = collectors.add_plain(PlainCollector::new(name));
            let reader = RegexReader::new(name, regex, handle, pass);
            (Reader::Regex(reader), CollectorHandle::Plain(handle))
        }
        ReaderKind::Sequence => {
            return Err(ParseError::InvalidConfig(format!(
                "sequence '{}' cannot be used as a field reader",
                spec.name
            )))
        }
    };

    debug!("Built {:?} reader '{}' on trigger '{}'", spec.kind, name, spec.trigger);
    Ok(built)
}

/// Build a sequence block from its field specs. Every spec is validated
/// before any collector is created, so a rejected sequence leaves
/// `collectors` untouched.
pub(crate) fn build_sequence(
    fields: &[ReaderSpec],
    collectors: &mut CollectorSet,
) -> Result<(SequenceBlock, Vec<CollectorHandle>)> {
    if fields.is_empty() {
        return Err(ParseError::InvalidConfig(
            "a sequence needs at least one field reader".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for spec in fields {
        validate_spec(spec, collectors)?;
        if !names.insert(spec.name.as_str()) {
            return Err(ParseError::InvalidConfig(format!(
                "duplicate collector name '{}'",
                spec.name
            )));
        }
    }

    let mut block = SequenceBlock::new();
    let mut handles = Vec::with_capacity(fields.len());
    for spec in fields {
        let (reader, handle) = build_reader(spec, None, collectors)?;
        block.push(reader);
        handles.push(handle);
    }
    Ok((block, handles))
}
