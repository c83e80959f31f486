//! Bus backend interface
//!
//! A backend wraps one physical peripheral (or a simulation of it). The
//! engine hands it one [`RawTransfer`] at a time and forwards the
//! peripheral's interrupt to [`Backend::on_interrupt`] until the backend
//! reports a [`Completion`].
//!
//! Backends come in two flavours, told apart by [`Backend::mode`]:
//! * interrupt driven backends move one word per interrupt and complete on
//!   the interrupt that moves the last word,
//! * DMA driven backends hand the spans (see [`RawTransfer::tx_span`] and
//!   [`RawTransfer::rx_span`]) to a DMA channel and complete on the single
//!   DMA-done interrupt.
//!
//! The engine behaves the same way for both.

use core::task::Poll;

use embedded_dma::{ReadBuffer, WriteBuffer};

use crate::{
    error::BusError,
    word::{self, WordSize},
};

/// How a backend signals progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CompletionMode {
    /// One interrupt per word.
    Interrupt,
    /// One interrupt per buffer.
    Dma,
}

/// Result of one raw transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Completion {
    /// Number of words moved before the transfer ended.
    ///
    /// Buses that send and receive one after the other, such as I2C,
    /// count written words first and received words after them.
    pub words: usize,
    /// Whether the bus reported a failure.
    pub result: Result<(), BusError>,
}

impl Completion {
    /// A transfer that moved `words` words without error.
    pub const fn done(words: usize) -> Self {
        Self {
            words,
            result: Ok(()),
        }
    }

    /// A transfer that failed after moving `words` words.
    pub const fn failed(words: usize, error: BusError) -> Self {
        Self {
            words,
            result: Err(error),
        }
    }
}

/// Peripheral driver the engine runs raw transfers on.
///
/// # Safety
///
/// The [`RawTransfer`] passed to [`start`](Backend::start) refers to memory
/// borrowed by the engine's caller. An implementation must stop touching
/// that memory (directly or through DMA) as soon as it returns
/// `Poll::Ready` from `start` or `on_interrupt`, or returns from `abort`.
/// In-place transfers alias their tx and rx spans, so tx word `i` must be
/// read before rx word `i` is written.
pub unsafe trait Backend {
    /// Per-transfer framing handed to the backend with each raw transfer,
    /// e.g. the target address on an I2C bus. `()` for buses without one.
    type Frame: Copy + Send;

    /// How this backend signals progress.
    fn mode(&self) -> CompletionMode;

    /// Whether words of `size` can be clocked.
    fn supports(&self, size: WordSize) -> bool {
        size == WordSize::Bits8
    }

    /// Whether a raw transfer must move at least one word.
    fn requires_data(&self) -> bool {
        false
    }

    /// Starts a raw transfer.
    ///
    /// Returns `Poll::Ready` if the transfer finished (or failed) without
    /// waiting for an interrupt, for example when it has no words to move.
    fn start(&mut self, frame: Self::Frame, transfer: RawTransfer) -> Poll<Completion>;

    /// Services the peripheral interrupt.
    ///
    /// Called by the engine from interrupt context, also when no transfer
    /// is active so that stale flags can be cleared.
    fn on_interrupt(&mut self) -> Poll<Completion>;

    /// Stops the active raw transfer immediately and returns how many words
    /// were moved. Words beyond that count are left untouched.
    fn abort(&mut self) -> usize;
}

/// Read-only span of a transmit buffer.
pub struct TxSpan {
    ptr: *const u8,
    len: usize,
}

unsafe impl ReadBuffer for TxSpan {
    type Word = u8;
    unsafe fn read_buffer(&self) -> (*const Self::Word, usize) {
        (self.ptr, self.len)
    }
}

/// Writable span of a receive buffer.
pub struct RxSpan {
    ptr: *mut u8,
    len: usize,
}

unsafe impl WriteBuffer for RxSpan {
    type Word = u8;
    unsafe fn write_buffer(&mut self) -> (*mut Self::Word, usize) {
        (self.ptr, self.len)
    }
}

/// One raw transfer as seen by a backend.
///
/// Transmit words past the end of the tx span (or all of them if there is
/// none) are the fill word. Received words past the end of the rx span are
/// discarded.
pub struct RawTransfer {
    tx: Option<TxSpan>,
    rx: Option<RxSpan>,
    size: WordSize,
    fill: u32,
}

// SAFETY: the spans are only dereferenced by whoever holds the transfer, and
// the engine moves it between contexts inside critical sections.
unsafe impl Send for RawTransfer {}

impl RawTransfer {
    pub(crate) fn new(
        tx: Option<(*const u8, usize)>,
        rx: Option<(*mut u8, usize)>,
        size: WordSize,
        fill: u32,
    ) -> Self {
        Self {
            tx: tx.map(|(ptr, len)| TxSpan { ptr, len }),
            rx: rx.map(|(ptr, len)| RxSpan { ptr, len }),
            size,
            fill: fill & size.mask(),
        }
    }

    /// Word size of this transfer.
    pub fn word_size(&self) -> WordSize {
        self.size
    }

    /// Word clocked out when there is no data to send.
    pub fn fill(&self) -> u32 {
        self.fill
    }

    /// Number of words in the transmit span.
    pub fn tx_words(&self) -> usize {
        self.tx.as_ref().map_or(0, |s| s.len / self.size.bytes())
    }

    /// Number of words in the receive span.
    pub fn rx_words(&self) -> usize {
        self.rx.as_ref().map_or(0, |s| s.len / self.size.bytes())
    }

    /// Length of the raw transfer in words, for buses that clock both
    /// directions at once.
    pub fn words(&self) -> usize {
        self.tx_words().max(self.rx_words())
    }

    /// The transmit span, for handing to a DMA channel.
    pub fn tx_span(&self) -> Option<&TxSpan> {
        self.tx.as_ref()
    }

    /// The receive span, for handing to a DMA channel.
    pub fn rx_span(&mut self) -> Option<&mut RxSpan> {
        self.rx.as_mut()
    }

    /// Word `index` of the transmit data.
    pub fn tx_word(&self, index: usize) -> u32 {
        let n = self.size.bytes();
        match &self.tx {
            Some(span) if index < self.tx_words() => {
                // SAFETY: `index` is in bounds and the span outlives the
                // transfer (see `Backend`).
                let bytes = unsafe { core::slice::from_raw_parts(span.ptr.add(index * n), n) };
                word::decode(bytes)
            }
            _ => self.fill,
        }
    }

    /// Stores received word `index`. Returns `false` if it was discarded.
    pub fn set_rx_word(&mut self, index: usize, value: u32) -> bool {
        let n = self.size.bytes();
        let in_bounds = index < self.rx_words();
        match &mut self.rx {
            Some(span) if in_bounds => {
                // SAFETY: as for `tx_word`; the slice is dropped before
                // anything else reads this memory.
                let bytes = unsafe { core::slice::from_raw_parts_mut(span.ptr.add(index * n), n) };
                word::encode(value & self.size.mask(), bytes);
                true
            }
            _ => false,
        }
    }
}
