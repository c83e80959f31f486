//! Transfer requests and the events they resolve to

use core::marker::PhantomData;

use crate::{
    backend::RawTransfer,
    error::{BusError, Error},
    notify::Notify,
    word::WordSize,
};

/// Handle of a submitted request, unique per bus instance until the
/// counter wraps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferId(pub(crate) u32);

impl TransferId {
    /// The raw counter value.
    pub fn value(self) -> u32 {
        self.0
    }
}

/// Where a request is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferState {
    /// Waiting in the queue.
    Queued,
    /// Bound to the backend.
    Active,
    /// Finished, successfully or with a bus error.
    Completed,
    /// Aborted before it finished.
    Aborted,
}

/// How a request ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// All words were moved.
    Complete,
    /// The request was aborted or cancelled.
    Aborted,
    /// The backend reported a failure.
    Error(BusError),
}

/// Delivered exactly once for every accepted request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event {
    /// The request this event belongs to.
    pub id: TransferId,
    /// How it ended.
    pub outcome: Outcome,
    /// Words moved before it ended. On I2C this is written bytes plus
    /// received bytes.
    pub words: usize,
}

impl Event {
    /// The state this event leaves its request in.
    pub fn state(&self) -> TransferState {
        match self.outcome {
            Outcome::Aborted => TransferState::Aborted,
            Outcome::Complete | Outcome::Error(_) => TransferState::Completed,
        }
    }

    /// Converts the event into the number of words moved, or an error.
    pub fn into_result(self) -> Result<usize, Error> {
        match self.outcome {
            Outcome::Complete => Ok(self.words),
            Outcome::Aborted => Err(Error::Aborted),
            Outcome::Error(e) => Err(Error::Bus(e)),
        }
    }
}

/// The buffers of one request.
///
/// Lengths are in bytes and must be whole multiples of the word size. A
/// missing tx buffer sends the fill word; a missing rx buffer discards the
/// received words. If both are present with different lengths the transfer
/// runs for the longer one, as [`embedded_hal::spi::SpiBus::transfer`]
/// does.
pub struct Buffers<'a> {
    tx: Option<(*const u8, usize)>,
    rx: Option<(*mut u8, usize)>,
    size: WordSize,
    _borrow: PhantomData<&'a mut [u8]>,
}

impl<'a> Buffers<'a> {
    /// No data at all, e.g. an I2C address probe.
    pub fn empty() -> Self {
        Self {
            tx: None,
            rx: None,
            size: WordSize::Bits8,
            _borrow: PhantomData,
        }
    }

    /// Transmit only.
    pub fn write(tx: &'a [u8]) -> Self {
        Self {
            tx: Some((tx.as_ptr(), tx.len())),
            ..Self::empty()
        }
    }

    /// Receive only.
    pub fn read(rx: &'a mut [u8]) -> Self {
        Self {
            rx: Some((rx.as_mut_ptr(), rx.len())),
            ..Self::empty()
        }
    }

    /// Transmit `tx` while receiving into `rx`.
    pub fn transfer(tx: &'a [u8], rx: &'a mut [u8]) -> Self {
        Self {
            tx: Some((tx.as_ptr(), tx.len())),
            rx: Some((rx.as_mut_ptr(), rx.len())),
            ..Self::empty()
        }
    }

    /// Transmit `buf` and overwrite it with the received words.
    pub fn in_place(buf: &'a mut [u8]) -> Self {
        let ptr = buf.as_mut_ptr();
        Self {
            tx: Some((ptr as *const u8, buf.len())),
            rx: Some((ptr, buf.len())),
            ..Self::empty()
        }
    }

    /// Sets the word size. Defaults to [`WordSize::Bits8`].
    pub fn word_size(mut self, size: WordSize) -> Self {
        self.size = size;
        self
    }

    /// Transfer length in words, or [`Error::BufferLength`] if a buffer is
    /// not a whole number of words.
    pub fn words(&self) -> Result<usize, Error> {
        let tx = self.tx.map_or(Some(0), |(_, len)| self.size.words_in(len));
        let rx = self.rx.map_or(Some(0), |(_, len)| self.size.words_in(len));
        match (tx, rx) {
            (Some(tx), Some(rx)) => Ok(tx.max(rx)),
            _ => Err(Error::BufferLength),
        }
    }

    /// The configured word size.
    pub fn size(&self) -> WordSize {
        self.size
    }

    pub(crate) fn into_raw(self, fill: u32) -> RawTransfer {
        RawTransfer::new(self.tx, self.rx, self.size, fill)
    }
}

/// A transfer handed to [`Bus::submit`](crate::Bus::submit).
pub struct TransferRequest<'a, F> {
    pub(crate) frame: F,
    pub(crate) buffers: Buffers<'a>,
    pub(crate) notify: &'a dyn Notify,
}

impl<'a, F> TransferRequest<'a, F> {
    /// Creates a request. `notify` receives the request's [`Event`].
    pub fn new(frame: F, buffers: Buffers<'a>, notify: &'a dyn Notify) -> Self {
        Self {
            frame,
            buffers,
            notify,
        }
    }
}
