// Log parsing FSM: triggers hand blocks of a text log to readers, readers
// decode them into collectors.

pub mod types;
pub mod stream;
pub mod trigger;
pub mod vector;
pub mod collector;
pub mod reader;
pub mod dispatcher;
pub mod config;

// Re-export main types
pub use types::*;
pub use stream::{LineReader, LineSource};
pub use trigger::{Trigger, TriggerSpec};
pub use vector::{ModePolicy, Separator, VectorDecoder};
pub use collector::{CollectorHandle, CollectorRef, CollectorSet, PlainCollector, PlainHandle,
    TimedHandle, TimedVectorCollector, VectorCollector, VectorHandle, MICROS_PER_SECOND};
pub use reader::{Reader, ReaderId, StateReader, Transition};
pub use dispatcher::{SequenceDispatcher, TriggerDispatcher};
pub use config::{ParserConfig, ReaderKind, ReaderSpec, SequenceConfig};
