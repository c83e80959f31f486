use core::task::Poll;

use embedded_hal::i2c::NoAcknowledgeSource;
use heapless::Vec;

use crate::{
    backend::{Backend, Completion, CompletionMode, RawTransfer},
    error::BusError,
    i2c::I2cFrame,
};

/// Maximum number of targets on a [`SimI2c`] bus.
const MAX_TARGETS: usize = 4;

/// 256 byte serial EEPROM in the style of a 24xx02.
///
/// The first byte written after the address sets the cell pointer; further
/// bytes are stored at the pointer, which wraps within its 8 byte page.
/// Reads start at the pointer and wrap around the whole array.
#[derive(Clone)]
pub struct Eeprom {
    address: u8,
    memory: [u8; 256],
    pointer: u8,
    addressed: bool,
}

impl Eeprom {
    /// Page size of the write buffer.
    pub const PAGE: u8 = 8;

    /// Blank (all 0xFF) EEPROM answering to 7-bit `address`.
    pub fn new(address: u8) -> Self {
        Self {
            address,
            memory: [0xFF; 256],
            pointer: 0,
            addressed: false,
        }
    }

    /// 7-bit address of this target.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Cell contents.
    pub fn memory(&self) -> &[u8; 256] {
        &self.memory
    }

    /// Mutable cell contents, e.g. for preloading.
    pub fn memory_mut(&mut self) -> &mut [u8; 256] {
        &mut self.memory
    }

    /// Called when the target acknowledges its address.
    fn select(&mut self) {
        self.addressed = true;
    }

    fn write(&mut self, byte: u8) {
        if core::mem::take(&mut self.addressed) {
            self.pointer = byte;
        } else {
            self.memory[usize::from(self.pointer)] = byte;
            let page = self.pointer & !(Self::PAGE - 1);
            self.pointer = page | (self.pointer.wrapping_add(1) & (Self::PAGE - 1));
        }
    }

    fn read(&mut self) -> u8 {
        self.addressed = false;
        let byte = self.memory[usize::from(self.pointer)];
        self.pointer = self.pointer.wrapping_add(1);
        byte
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Address,
    Data,
}

struct Running {
    frame: I2cFrame,
    transfer: RawTransfer,
    target: Option<usize>,
    phase: Phase,
    moved: usize,
}

impl Running {
    fn total(&self) -> usize {
        self.transfer.tx_words() + self.transfer.rx_words()
    }
}

/// I2C controller connected to a handful of simulated targets.
///
/// Addresses with no target are not acknowledged. The address phase takes
/// one interrupt, then each data byte takes one interrupt in
/// [`CompletionMode::Interrupt`]; in [`CompletionMode::Dma`] the data bytes
/// move together on the interrupt after the address phase.
///
/// A [continued](I2cFrame::continuing) frame skips the address phase and
/// carries on with the target that holds the bus. Without such a target it
/// fails at once with [`BusError::Other`].
///
/// Word counts in completions are bytes on the wire, written bytes first,
/// so the number of received bytes is `words - tx_words`.
pub struct SimI2c {
    mode: CompletionMode,
    targets: Vec<Eeprom, MAX_TARGETS>,
    reject_empty: bool,
    held: Option<usize>,
    running: Option<Running>,
}

impl SimI2c {
    /// A bus with no targets.
    pub fn new(mode: CompletionMode) -> Self {
        Self {
            mode,
            targets: Vec::new(),
            reject_empty: false,
            held: None,
            running: None,
        }
    }

    /// Attaches `target`. Targets beyond the fourth are ignored.
    pub fn with_target(mut self, target: Eeprom) -> Self {
        let _ = self.targets.push(target);
        self
    }

    /// Refuses transfers without data, like controllers that cannot send
    /// an address on its own.
    pub fn reject_empty(mut self) -> Self {
        self.reject_empty = true;
        self
    }

    /// The target at 7-bit `address`.
    pub fn target(&self, address: u8) -> Option<&Eeprom> {
        self.targets.iter().find(|t| t.address == address)
    }

    /// Mutable access to the target at 7-bit `address`.
    pub fn target_mut(&mut self, address: u8) -> Option<&mut Eeprom> {
        self.targets.iter_mut().find(|t| t.address == address)
    }

    /// Whether the last transfer ended without STOP, leaving the bus
    /// claimed for a repeated START.
    pub fn bus_held(&self) -> bool {
        self.held.is_some()
    }

    /// Bytes moved and total bytes of the running transfer.
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.running.as_ref().map(|r| (r.moved, r.total()))
    }

    fn finish(&mut self, completion: Completion) -> Poll<Completion> {
        if let Some(running) = self.running.take() {
            self.held = running
                .target
                .filter(|_| completion.result.is_ok() && !running.frame.stop);
        }
        Poll::Ready(completion)
    }

    fn shift(&mut self) -> bool {
        let Some(running) = self.running.as_mut() else {
            return false;
        };
        let Some(target) = running.target.and_then(|i| self.targets.get_mut(i)) else {
            return false;
        };
        let tx_words = running.transfer.tx_words();
        let index = running.moved;
        if index < tx_words {
            let byte = running.transfer.tx_word(index) as u8;
            target.write(byte);
        } else if index < running.total() {
            let byte = target.read();
            running.transfer.set_rx_word(index - tx_words, u32::from(byte));
        } else {
            return false;
        }
        running.moved += 1;
        true
    }
}

// SAFETY: the transfer is dropped when it completes or is aborted. Tx and
// rx bytes are processed in order, tx first.
unsafe impl Backend for SimI2c {
    type Frame = I2cFrame;

    fn mode(&self) -> CompletionMode {
        self.mode
    }

    fn requires_data(&self) -> bool {
        self.reject_empty
    }

    fn start(&mut self, frame: I2cFrame, transfer: RawTransfer) -> Poll<Completion> {
        let target = if frame.ten_bit {
            None
        } else {
            self.targets
                .iter()
                .position(|t| u16::from(t.address) == frame.address)
        };
        let held = self.held.take();
        let phase = if frame.continued {
            if target.is_none() || held != target {
                return Poll::Ready(Completion::failed(0, BusError::Other));
            }
            Phase::Data
        } else {
            Phase::Address
        };
        let running = Running {
            frame,
            transfer,
            target,
            phase,
            moved: 0,
        };
        let empty = running.total() == 0;
        self.running = Some(running);
        if phase == Phase::Data && empty {
            return self.finish(Completion::done(0));
        }
        Poll::Pending
    }

    fn on_interrupt(&mut self) -> Poll<Completion> {
        let Some(running) = self.running.as_mut() else {
            return Poll::Pending;
        };
        if running.phase == Phase::Address {
            if running.target.is_none() {
                return self.finish(Completion::failed(
                    0,
                    BusError::NoAcknowledge(NoAcknowledgeSource::Address),
                ));
            }
            running.phase = Phase::Data;
            if let Some(target) = running.target.and_then(|i| self.targets.get_mut(i)) {
                target.select();
            }
            if running.total() > 0 {
                return Poll::Pending;
            }
        } else {
            match self.mode {
                CompletionMode::Interrupt => {
                    self.shift();
                }
                CompletionMode::Dma => while self.shift() {},
            }
        }
        let finished = self
            .running
            .as_ref()
            .filter(|r| r.moved >= r.total())
            .map(|r| r.moved);
        match finished {
            Some(moved) => self.finish(Completion::done(moved)),
            None => Poll::Pending,
        }
    }

    fn abort(&mut self) -> usize {
        self.held = None;
        self.running.take().map_or(0, |r| r.moved)
    }
}
