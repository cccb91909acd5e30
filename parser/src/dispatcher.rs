use crate::collector::{CollectorHandle, CollectorRef, CollectorSet, PlainCollector, PlainHandle,
    TimedHandle, TimedVectorCollector, VectorCollector, VectorHandle};
use crate::config::ReaderSpec;
use crate::reader::{build_reader, build_sequence, PassInit, Reader, ReaderId, SequenceBlock,
    SequenceReader, StateReader};
use crate::stream::{LineReader, LineSource};
use crate::trigger::{Trigger, TriggerSpec};
use crate::{ParseError, Result};
use std::io::BufRead;
use tracing::{debug, error, info, trace};

const ROOT: ReaderId = ReaderId(0);

fn mismatch(name: &str) -> ParseError {
    ParseError::Custom(format!("collector '{}' was built with an unexpected kind", name))
}

fn log_summary(collectors: &CollectorSet) {
    for c in collectors.iter() {
        debug!("Collector '{}': {} items", c.name(), c.len());
    }
}

/// Trigger-driven dispatch.
///
/// Every registered reader passes back to a shared [`PassInit`] root once it
/// has consumed its block, so the log is scanned for any trigger again.
///
/// ## Example
///
/// ```
/// use logparser::TriggerDispatcher;
/// use std::io::Cursor;
///
/// let mut parser = TriggerDispatcher::new();
/// let pos = parser.add_vec_parser("POS", "position", None).unwrap();
/// parser.parse(Cursor::new("noise\nPOS\n1 2 3\n")).unwrap();
/// assert_eq!(parser.vector(pos).values(), &[vec![1.0, 2.0, 3.0]]);
/// ```
#[derive(Debug)]
pub struct TriggerDispatcher {
    readers: Vec<Reader>,
    collectors: CollectorSet,
}

impl TriggerDispatcher {
    pub fn new() -> Self {
        Self {
            readers: vec![Reader::PassInit(PassInit::new())],
            collectors: CollectorSet::new(),
        }
    }

    fn push(&mut self, trigger: Trigger, reader: Reader) -> ReaderId {
        let id = ReaderId(self.readers.len());
        info!("Registering reader '{}' on trigger '{}'", reader.name(), trigger);
        self.readers.push(reader);
        if let Some(Reader::PassInit(root)) = self.readers.get_mut(ROOT.0) {
            root.add(trigger, id);
        }
        id
    }

    /// Register any non-sequence reader. It resumes global scanning after
    /// its block. Sequences go through [`Self::add_sequence_parser`].
    pub fn add_reader(&mut self, spec: &ReaderSpec) -> Result<CollectorHandle> {
        let (reader, handle) = build_reader(spec, Some(ROOT), &mut self.collectors)?;
        let trigger = reader.trigger().cloned().ok_or_else(|| mismatch(&spec.name))?;
        self.push(trigger, reader);
        Ok(handle)
    }

    /// Trigger line followed by a vector line.
    pub fn add_vec_parser(
        &mut self,
        trigger: impl Into<TriggerSpec>,
        name: &str,
        dims: Option<Vec<String>>,
    ) -> Result<VectorHandle> {
        let spec = ReaderSpec::block(trigger, name).with_dims(dims);
        match self.add_reader(&spec)? {
            CollectorHandle::Vector(h) => Ok(h),
            _ => Err(mismatch(name)),
        }
    }

    /// Vector on the trigger line itself.
    pub fn add_inline_vec_parser(
        &mut self,
        trigger: impl Into<TriggerSpec>,
        name: &str,
        dims: Option<Vec<String>>,
    ) -> Result<VectorHandle> {
        let spec = ReaderSpec::inline(trigger, name).with_dims(dims);
        match self.add_reader(&spec)? {
            CollectorHandle::Vector(h) => Ok(h),
            _ => Err(mismatch(name)),
        }
    }

    /// `... time_stamp: <t>` header, label line, vector line.
    pub fn add_timed_vec_parser(
        &mut self,
        trigger: &str,
        name: &str,
        dims: Option<Vec<String>>,
    ) -> Result<TimedHandle> {
        let spec = ReaderSpec::timed(trigger, name).with_dims(dims);
        match self.add_reader(&spec)? {
            CollectorHandle::Timed(h) => Ok(h),
            _ => Err(mismatch(name)),
        }
    }

    pub fn add_regex_parser(&mut self, pattern: &str, name: &str) -> Result<PlainHandle> {
        match self.add_reader(&ReaderSpec::regex(pattern, name))? {
            CollectorHandle::Plain(h) => Ok(h),
            _ => Err(mismatch(name)),
        }
    }

    /// Nested sub-parse: when `entry` shows up, read records of `fields`
    /// until the first field's trigger stops appearing, then resume scanning
    /// from the line that ended the records.
    pub fn add_sequence_parser(
        &mut self,
        entry: impl Into<TriggerSpec>,
        name: &str,
        fields: &[ReaderSpec],
    ) -> Result<Vec<CollectorHandle>> {
        let entry = entry.into().compile()?;
        if self.readers.iter().any(|r| r.name() == name) {
            return Err(ParseError::InvalidConfig(format!(
                "duplicate reader name '{}'",
                name
            )));
        }

        let (block, handles) = build_sequence(fields, &mut self.collectors)?;
        let reader = SequenceReader::new(name, entry.clone(), block, Some(ROOT));
        self.push(entry, Reader::Sequence(reader));
        Ok(handles)
    }

    /// Run over a buffered reader.
    pub fn parse<R: BufRead>(&mut self, reader: R) -> Result<Option<String>> {
        self.run(&mut LineReader::new(reader))
    }

    pub fn run(&mut self, source: &mut dyn LineSource) -> Result<Option<String>> {
        self.run_from(source, None)
    }

    /// Drive the reader chain from the root until a reader returns no
    /// successor. Returns the last residual line. Errors stop the run as-is;
    /// items collected before the failing block stay in their collectors.
    pub fn run_from(
        &mut self,
        source: &mut dyn LineSource,
        carried: Option<String>,
    ) -> Result<Option<String>> {
        info!(
            "Starting trigger dispatch over {} triggers",
            self.readers.len() - 1
        );

        let mut current = Some(ROOT);
        let mut carried = carried;
        let mut transitions = 0usize;

        while let Some(id) = current {
            let reader = &mut self.readers[id.0];
            let step = match reader.invoke(source, carried, &mut self.collectors) {
                Ok(step) => step,
                Err(e) => {
                    error!(
                        "Reader '{}' failed near line {}: {}",
                        reader.name(),
                        source.line_number(),
                        e
                    );
                    return Err(e);
                }
            };
            trace!("{} -> {:?}", reader.name(), step.next);

            current = step.next;
            carried = step.carried;
            transitions += 1;
        }

        info!(
            "Dispatch complete: {} lines, {} transitions",
            source.line_number(),
            transitions
        );
        log_summary(&self.collectors);
        Ok(carried)
    }

    /// Triggers in match priority order.
    pub fn triggers(&self) -> Vec<&str> {
        match &self.readers[ROOT.0] {
            Reader::PassInit(root) => root.triggers().map(Trigger::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn collectors(&self) -> &CollectorSet {
        &self.collectors
    }

    pub fn collector(&self, name: &str) -> Option<CollectorRef<'_>> {
        self.collectors.find(name).map(|h| self.collectors.get(h))
    }

    pub fn plain(&self, handle: PlainHandle) -> &PlainCollector {
        self.collectors.plain(handle)
    }

    pub fn vector(&self, handle: VectorHandle) -> &VectorCollector {
        self.collectors.vector(handle)
    }

    pub fn timed(&self, handle: TimedHandle) -> &TimedVectorCollector {
        self.collectors.timed(handle)
    }

    /// Empty every collector, keeping locked vector modes.
    pub fn clear_collectors(&mut self) {
        self.collectors.clear();
    }

    /// Start over for a new log: empty collectors and unlock vector modes.
    pub fn reset(&mut self) {
        self.collectors.clear();
        self.readers.iter_mut().for_each(Reader::reset);
    }
}

impl Default for TriggerDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequence-driven dispatch.
///
/// After an optional entry trigger, a fixed ordered list of field readers is
/// run again and again while the first field's trigger keeps appearing.
/// Field readers have no pass-through; the dispatcher calls them in order.
#[derive(Debug)]
pub struct SequenceDispatcher {
    entry: Option<Trigger>,
    block: SequenceBlock,
    collectors: CollectorSet,
}

impl SequenceDispatcher {
    pub fn new(entry: Option<Trigger>) -> Self {
        Self {
            entry,
            block: SequenceBlock::new(),
            collectors: CollectorSet::new(),
        }
    }

    /// Append a field reader. The first field's trigger marks each record.
    pub fn add_field(&mut self, spec: &ReaderSpec) -> Result<CollectorHandle> {
        let (reader, handle) = build_reader(spec, None, &mut self.collectors)?;
        info!("Registering field '{}' on trigger '{}'", spec.name, spec.trigger);
        self.block.push(reader);
        Ok(handle)
    }

    pub fn add_vec_field(
        &mut self,
        trigger: impl Into<TriggerSpec>,
        name: &str,
        dims: Option<Vec<String>>,
    ) -> Result<VectorHandle> {
        match self.add_field(&ReaderSpec::block(trigger, name).with_dims(dims))? {
            CollectorHandle::Vector(h) => Ok(h),
            _ => Err(mismatch(name)),
        }
    }

    pub fn add_inline_vec_field(
        &mut self,
        trigger: impl Into<TriggerSpec>,
        name: &str,
        dims: Option<Vec<String>>,
    ) -> Result<VectorHandle> {
        match self.add_field(&ReaderSpec::inline(trigger, name).with_dims(dims))? {
            CollectorHandle::Vector(h) => Ok(h),
            _ => Err(mismatch(name)),
        }
    }

    pub fn add_timed_vec_field(
        &mut self,
        trigger: &str,
        name: &str,
        dims: Option<Vec<String>>,
    ) -> Result<TimedHandle> {
        match self.add_field(&ReaderSpec::timed(trigger, name).with_dims(dims))? {
            CollectorHandle::Timed(h) => Ok(h),
            _ => Err(mismatch(name)),
        }
    }

    pub fn add_regex_field(&mut self, pattern: &str, name: &str) -> Result<PlainHandle> {
        match self.add_field(&ReaderSpec::regex(pattern, name))? {
            CollectorHandle::Plain(h) => Ok(h),
            _ => Err(mismatch(name)),
        }
    }

    pub fn parse<R: BufRead>(&mut self, reader: R) -> Result<Option<String>> {
        self.run(&mut LineReader::new(reader))
    }

    pub fn run(&mut self, source: &mut dyn LineSource) -> Result<Option<String>> {
        self.run_from(source, None)
    }

    /// Skip to the entry trigger (if any), then read records until a line
    /// lacks the leading marker. That line is returned; `None` means the
    /// stream ended.
    pub fn run_from(
        &mut self,
        source: &mut dyn LineSource,
        carried: Option<String>,
    ) -> Result<Option<String>> {
        if self.block.fields().is_empty() {
            return Err(ParseError::InvalidConfig(
                "a sequence needs at least one field reader".to_string(),
            ));
        }

        let mut carried = carried;
        if let Some(entry) = &self.entry {
            loop {
                let Some(line) = carried.take().map_or_else(|| source.read_line(), |l| Ok(Some(l)))? else {
                    info!("Entry trigger '{}' never seen", entry);
                    return Ok(None);
                };
                if entry.matches(&line) {
                    debug!("Entry trigger '{}' at line {}", entry, source.line_number());
                    break;
                }
            }
        }

        let (records, residual) = match self.block.run_records(source, carried, &mut self.collectors) {
            Ok(done) => done,
            Err(e) => {
                error!("Sequence failed near line {}: {}", source.line_number(), e);
                return Err(e);
            }
        };

        info!(
            "Sequence complete: {} records over {} lines",
            records,
            source.line_number()
        );
        log_summary(&self.collectors);
        Ok(residual)
    }

    pub fn collectors(&self) -> &CollectorSet {
        &self.collectors
    }

    pub fn collector(&self, name: &str) -> Option<CollectorRef<'_>> {
        self.collectors.find(name).map(|h| self.collectors.get(h))
    }

    pub fn plain(&self, handle: PlainHandle) -> &PlainCollector {
        self.collectors.plain(handle)
    }

    pub fn vector(&self, handle: VectorHandle) -> &VectorCollector {
        self.collectors.vector(handle)
    }

    pub fn timed(&self, handle: TimedHandle) -> &TimedVectorCollector {
        self.collectors.timed(handle)
    }

    pub fn clear_collectors(&mut self) {
        self.collectors.clear();
    }

    pub fn reset(&mut self) {
        self.collectors.clear();
        self.block.reset();
    }
}
