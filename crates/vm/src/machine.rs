//! Machine state: one frame, one operand stack and a debug sink bound to
//! a loaded image.

use std::sync::atomic::{AtomicU64, Ordering};

use regvm_common::{RegId, ReturnValue};

use crate::config::VmConfig;
use crate::error::RuntimeError;
use crate::frame::Frame;
use crate::image::BinaryImage;
use crate::registers::RegisterFile;
use crate::sink::{DebugSink, NullSink};
use crate::stack::Stack;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a machine, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    fn next() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `exit` was executed.
    Exited,
    /// `ret` with no live call returned control to the host.
    Returned,
    /// The cursor reached the end of the image.
    EndOfStream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    /// Contents of the configured return register.
    pub value: ReturnValue,
    /// Cursor address when the run ended.
    pub position: u64,
    /// Instructions executed.
    pub steps: u64,
}

/// Result of a single [`Machine::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    Finished(Outcome),
}

pub struct Machine<'img, S: DebugSink = NullSink> {
    pub(crate) frame: Frame<'img>,
    pub(crate) stack: Stack,
    pub(crate) sink: S,
    pub(crate) config: VmConfig,
    pub(crate) thread_id: ThreadId,
    pub(crate) entry: u64,
    pub(crate) steps: u64,
    /// Set once the run has ended; further steps report it again.
    pub(crate) finished: Option<Outcome>,
    /// Set by the first fault; the machine stays stopped until `reset`.
    pub(crate) faulted: Option<RuntimeError>,
}

impl<'img> Machine<'img, NullSink> {
    pub fn new(image: &'img mut BinaryImage, config: VmConfig) -> Result<Self, RuntimeError> {
        Self::with_sink(image, config, NullSink)
    }
}

impl<'img, S: DebugSink> Machine<'img, S> {
    /// Bind a machine to `image`, positioned at its entry point.
    pub fn with_sink(
        image: &'img mut BinaryImage,
        config: VmConfig,
        sink: S,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        if !image.is_allocated() {
            return Err(RuntimeError::InvalidImage {
                at: image.base_address(),
                reason: "image is not allocated",
            });
        }
        let base = image.base_address();
        let entry = image.entry_address();
        let mut frame = Frame::new(&config);
        frame.setting(image.bytes_mut(), base, entry);
        let stack = Stack::create(config.stack_capacity, config.stack_growth, config.profile);
        Ok(Self {
            frame,
            stack,
            sink,
            config,
            thread_id: ThreadId::next(),
            entry,
            steps: 0,
            finished: None,
            faulted: None,
        })
    }

    /// Rewind to the entry point with fresh registers and an empty stack.
    pub fn reset(&mut self) {
        self.frame.reset_state();
        self.frame.set_position(self.entry);
        self.stack.reset();
        self.steps = 0;
        self.finished = None;
        self.faulted = None;
    }

    pub fn frame(&self) -> &Frame<'img> {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut Frame<'img> {
        &mut self.frame
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    pub fn registers(&self) -> &RegisterFile {
        self.frame.registers()
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        self.frame.registers_mut()
    }

    /// Shorthand for reading one register.
    pub fn register(&self, reg: RegId) -> u64 {
        self.frame.registers().get(reg)
    }

    /// Shorthand used by hosts that pass arguments in registers.
    pub fn set_register(&mut self, reg: RegId, value: u64) {
        self.frame.registers_mut().set(reg, value);
    }

    /// The configured return register, read the way an outcome reports it.
    pub fn return_value(&self) -> ReturnValue {
        ReturnValue::basic(
            self.frame.registers().get(self.config.return_register),
            self.config.profile,
        )
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The outcome of a run that has ended.
    pub fn outcome(&self) -> Option<&Outcome> {
        self.finished.as_ref()
    }

    /// The fault that stopped the machine, if any.
    pub fn fault(&self) -> Option<&RuntimeError> {
        self.faulted.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::RegisterFill;

    #[test]
    fn thread_ids_are_unique() {
        let mut a = BinaryImage::allocate(16);
        let mut b = BinaryImage::allocate(16);
        let ma = Machine::new(&mut a, VmConfig::default()).unwrap();
        let mb = Machine::new(&mut b, VmConfig::default()).unwrap();
        assert_ne!(ma.thread_id(), mb.thread_id());
    }

    #[test]
    fn starts_at_entry_with_fill() {
        let mut image = BinaryImage::allocate(64)
            .with_base_address(0x1000)
            .unwrap();
        image.set_entry_offset(0x20).unwrap();
        let config = VmConfig::default().with_register_fill(RegisterFill::Sentinel);
        let machine = Machine::new(&mut image, config).unwrap();
        assert_eq!(machine.frame().position(), 0x1020);
        assert_eq!(machine.frame().start(), 0x1000);
        assert_eq!(machine.frame().limit(), 0x1040);
        assert_eq!(machine.register(RegId::EAX), 0x2072_6178);
        assert!(machine.stack().is_empty());
        assert_eq!(machine.steps(), 0);
        assert!(machine.outcome().is_none());
        assert!(machine.fault().is_none());
    }

    #[test]
    fn register_shorthands() {
        let mut image = BinaryImage::allocate(16);
        let config = VmConfig::default().with_return_register(RegId::AX);
        let mut machine = Machine::new(&mut image, config).unwrap();
        machine.set_register(RegId::EAX, 0x1234_5678);
        assert_eq!(machine.register(RegId::RAX), 0x1234_5678);
        assert_eq!(machine.return_value().value(), 0x5678);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut image = BinaryImage::allocate(16);
        let config = VmConfig::default()
            .with_profile(regvm_common::TargetProfile::Bits32)
            .with_return_register(RegId::RAX);
        assert!(matches!(
            Machine::new(&mut image, config),
            Err(RuntimeError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_deallocated_image() {
        let mut image = BinaryImage::allocate(16);
        image.deallocate();
        assert!(matches!(
            Machine::new(&mut image, VmConfig::default()),
            Err(RuntimeError::InvalidImage { .. })
        ));
    }
}
