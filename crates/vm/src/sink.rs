//! Debug sink: the diagnostic channel a machine reports to.
//!
//! A sink is injected at construction and never affects control flow.

use regvm_common::{DecodeError, Instruction};
use tracing::{debug, error, trace, warn};

use crate::error::RuntimeError;
use crate::machine::Outcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    /// An instruction was decoded and is about to execute.
    Executed { at: u64, instruction: Instruction },
    /// A decode fault was skipped under lenient decoding.
    Recovered { at: u64, error: DecodeError },
    /// A fault ended the run.
    Fault { error: RuntimeError },
    /// The run ended normally.
    Finished { outcome: Outcome },
}

pub trait DebugSink {
    fn event(&mut self, event: &DebugEvent);

    /// `false` lets the machine skip building per-instruction events.
    fn enabled(&self) -> bool {
        true
    }
}

impl<S: DebugSink + ?Sized> DebugSink for &mut S {
    fn event(&mut self, event: &DebugEvent) {
        (**self).event(event)
    }

    fn enabled(&self) -> bool {
        (**self).enabled()
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DebugSink for NullSink {
    fn event(&mut self, _event: &DebugEvent) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DebugSink for TracingSink {
    fn event(&mut self, event: &DebugEvent) {
        match event {
            DebugEvent::Executed { at, instruction } => {
                trace!(at = %format_args!("{at:#x}"), %instruction, "executed");
            }
            DebugEvent::Recovered { at, error } => {
                warn!(at = %format_args!("{at:#x}"), %error, "skipped undecodable bytes");
            }
            DebugEvent::Fault { error } => {
                error!(%error, "fault");
            }
            DebugEvent::Finished { outcome } => {
                debug!(
                    status = ?outcome.status,
                    value = outcome.value.value(),
                    at = %format_args!("{:#x}", outcome.position),
                    steps = outcome.steps,
                    "finished"
                );
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Vec<DebugEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[DebugEvent] {
        &self.events
    }

    /// Disassembly of every executed instruction, as `address: text`.
    pub fn trace(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DebugEvent::Executed { at, instruction } => Some(format!("{at:#06x}: {instruction}")),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl DebugSink for RecordingSink {
    fn event(&mut self, event: &DebugEvent) {
        self.events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_is_disabled() {
        assert!(!NullSink.enabled());
        assert!(TracingSink.enabled());
    }

    #[test]
    fn recording_sink_keeps_order() {
        let mut sink = RecordingSink::new();
        sink.event(&DebugEvent::Executed {
            at: 0x10,
            instruction: Instruction::Nop,
        });
        sink.event(&DebugEvent::Recovered {
            at: 0x11,
            error: DecodeError::IllegalOpcode,
        });
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.trace(), vec!["0x0010: nop".to_string()]);
        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn tracing_sink_accepts_every_event() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let mut sink = TracingSink;
            sink.event(&DebugEvent::Executed {
                at: 0,
                instruction: Instruction::Exit,
            });
            sink.event(&DebugEvent::Fault {
                error: RuntimeError::CursorOverflow { at: 4 },
            });
        });
    }
}
