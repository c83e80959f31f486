use core::{ptr, task::Poll};

use embedded_dma::{ReadBuffer, WriteBuffer};
use fugit::{HertzU32, MicrosDurationU32};
use heapless::Vec;

use crate::{
    backend::{Backend, Completion, CompletionMode, RawTransfer},
    word::{self, WordSize},
};

/// Number of MOSI bytes [`LoopbackSpi`] keeps.
pub const CAPTURE_LEN: usize = 256;

struct Running {
    transfer: RawTransfer,
    moved: usize,
}

/// SPI controller with MISO wired to MOSI.
///
/// Every word clocked out is received back and recorded in a capture
/// buffer, the way a logic analyser on the bus would see it.
///
/// In [`CompletionMode::Dma`] the words are copied straight between the
/// transfer's DMA spans, as a memory-to-peripheral and a
/// peripheral-to-memory channel pair would.
pub struct LoopbackSpi {
    mode: CompletionMode,
    frequency: HertzU32,
    running: Option<Running>,
    capture: Vec<u8, CAPTURE_LEN>,
}

impl LoopbackSpi {
    /// Moves one word per interrupt.
    pub fn interrupt(frequency: HertzU32) -> Self {
        Self::new(CompletionMode::Interrupt, frequency)
    }

    /// Moves words in the background, one interrupt per buffer.
    pub fn dma(frequency: HertzU32) -> Self {
        Self::new(CompletionMode::Dma, frequency)
    }

    fn new(mode: CompletionMode, frequency: HertzU32) -> Self {
        Self {
            mode,
            frequency,
            running: None,
            capture: Vec::new(),
        }
    }

    /// Configured SCK frequency.
    pub fn frequency(&self) -> HertzU32 {
        self.frequency
    }

    /// Shortest possible time to clock `words` words of `size`.
    pub fn transfer_time(&self, words: u32, size: WordSize) -> MicrosDurationU32 {
        let bits = u64::from(words) * u64::from(size.bits());
        let us = bits * 1_000_000 / u64::from(self.frequency.to_Hz().max(1));
        MicrosDurationU32::from_ticks(us.min(u64::from(u32::MAX)) as u32)
    }

    /// Bytes seen on MOSI so far, oldest first. Stops recording when full.
    pub fn captured(&self) -> &[u8] {
        &self.capture
    }

    /// Forgets the captured bytes.
    pub fn clear_capture(&mut self) {
        self.capture.clear();
    }

    /// Whether a raw transfer is in progress.
    pub fn is_busy(&self) -> bool {
        self.running.is_some()
    }

    /// Words moved and total words of the running transfer.
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.running
            .as_ref()
            .map(|r| (r.moved, r.transfer.words()))
    }

    /// Moves up to `words` words without raising the interrupt and returns
    /// how many were moved.
    pub fn clock(&mut self, words: usize) -> usize {
        if self.mode == CompletionMode::Dma {
            return self.dma_copy(words);
        }
        let mut moved = 0;
        while moved < words && self.shift() {
            moved += 1;
        }
        moved
    }

    fn dma_copy(&mut self, words: usize) -> usize {
        let Some(running) = self.running.as_mut() else {
            return 0;
        };
        let n = running.transfer.word_size().bytes();
        let mut fill = [0u8; 4];
        word::encode(running.transfer.fill(), &mut fill[..n]);

        // SAFETY: the spans stay valid until the transfer is dropped (see
        // `Backend`).
        let (tx, tx_len) = running
            .transfer
            .tx_span()
            .map_or((ptr::null(), 0), |span| unsafe { span.read_buffer() });
        let (rx, rx_len) = running
            .transfer
            .rx_span()
            .map_or((ptr::null_mut(), 0), |span| unsafe { span.write_buffer() });

        let first = running.moved;
        let end = running.transfer.words().min(first.saturating_add(words));
        for index in first..end {
            let whole_tx = (index + 1) * n <= tx_len;
            let whole_rx = (index + 1) * n <= rx_len;
            for (j, fill) in fill[..n].iter().enumerate() {
                let offset = index * n + j;
                // SAFETY: `offset` lies inside the span it is used with. In
                // place transfers read each byte before writing it.
                let byte = if whole_tx {
                    unsafe { tx.add(offset).read() }
                } else {
                    *fill
                };
                if whole_rx {
                    unsafe { rx.add(offset).write(byte) };
                }
                let _ = self.capture.push(byte);
            }
        }
        running.moved = end;
        end - first
    }

    fn shift(&mut self) -> bool {
        let Some(running) = self.running.as_mut() else {
            return false;
        };
        if running.moved >= running.transfer.words() {
            return false;
        }
        let index = running.moved;
        let size = running.transfer.word_size();
        let mosi = running.transfer.tx_word(index);

        let mut bytes = [0u8; 4];
        let bytes = &mut bytes[..size.bytes()];
        word::encode(mosi, bytes);
        for b in bytes.iter() {
            let _ = self.capture.push(*b);
        }

        running.transfer.set_rx_word(index, mosi);
        running.moved += 1;
        true
    }
}

// SAFETY: the transfer is dropped when it completes or is aborted, and each
// word is read from tx before it is written to rx.
unsafe impl Backend for LoopbackSpi {
    type Frame = ();

    fn mode(&self) -> CompletionMode {
        self.mode
    }

    fn supports(&self, _size: WordSize) -> bool {
        true
    }

    fn start(&mut self, _frame: (), transfer: RawTransfer) -> Poll<Completion> {
        if transfer.words() == 0 {
            return Poll::Ready(Completion::done(0));
        }
        self.running = Some(Running { transfer, moved: 0 });
        Poll::Pending
    }

    fn on_interrupt(&mut self) -> Poll<Completion> {
        match self.mode {
            CompletionMode::Interrupt => {
                self.shift();
            }
            CompletionMode::Dma => {
                self.dma_copy(usize::MAX);
            }
        }
        let finished = self
            .running
            .as_ref()
            .filter(|r| r.moved >= r.transfer.words())
            .map(|r| r.moved);
        match finished {
            Some(words) => {
                self.running = None;
                Poll::Ready(Completion::done(words))
            }
            None => Poll::Pending,
        }
    }

    fn abort(&mut self) -> usize {
        self.running.take().map_or(0, |r| r.moved)
    }
}
