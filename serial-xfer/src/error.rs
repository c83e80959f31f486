//! Error types

use embedded_hal::i2c::NoAcknowledgeSource;

use crate::word::WordSize;

/// Failure reported by a backend for one raw transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum BusError {
    /// The target did not acknowledge its address or a data byte.
    NoAcknowledge(NoAcknowledgeSource),
    /// Another controller won arbitration.
    ArbitrationLoss,
    /// Received data was lost because it was not read in time.
    Overrun,
    /// The peripheral was selected as a target while acting as controller.
    ModeFault,
    /// The backend's own watchdog expired (e.g. clock stretched too long).
    Timeout,
    /// Any other backend specific failure.
    Other,
}

/// Errors returned by the engine and its front ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// A buffer length is not a whole number of words.
    BufferLength,
    /// The backend cannot clock words of this size.
    UnsupportedWordSize(WordSize),
    /// The backend needs at least one word to move.
    EmptyTransfer,
    /// Every queue slot is taken; the request was not accepted.
    QueueFull,
    /// The transfer did not finish within the allotted time and was aborted.
    Timeout,
    /// The transfer was aborted by another caller.
    Aborted,
    /// The backend reported a failure.
    Bus(BusError),
    /// Target i2c address is out of range
    AddressOutOfRange(u16),
    /// Target i2c address is reserved
    AddressReserved(u16),
}

impl From<BusError> for Error {
    fn from(value: BusError) -> Self {
        Error::Bus(value)
    }
}

impl embedded_hal::i2c::Error for BusError {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::ErrorKind;
        match self {
            BusError::NoAcknowledge(source) => ErrorKind::NoAcknowledge(*source),
            BusError::ArbitrationLoss => ErrorKind::ArbitrationLoss,
            BusError::Overrun => ErrorKind::Overrun,
            BusError::ModeFault | BusError::Timeout => ErrorKind::Bus,
            BusError::Other => ErrorKind::Other,
        }
    }
}

impl embedded_hal::spi::Error for BusError {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        use embedded_hal::spi::ErrorKind;
        match self {
            BusError::Overrun => ErrorKind::Overrun,
            BusError::ModeFault => ErrorKind::ModeFault,
            _ => ErrorKind::Other,
        }
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        match self {
            Error::Bus(e) => embedded_hal::i2c::Error::kind(e),
            _ => embedded_hal::i2c::ErrorKind::Other,
        }
    }
}

impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        match self {
            Error::Bus(e) => embedded_hal::spi::Error::kind(e),
            _ => embedded_hal::spi::ErrorKind::Other,
        }
    }
}
