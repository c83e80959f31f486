//! Inter-Integrated Circuit (I2C) front end
//!
//! Each raw transfer on an I2C backend is framed by an [`I2cFrame`]: a
//! START, the target address, the tx bytes, a repeated START and the rx
//! bytes if there are any, and finally either a STOP or, for
//! `repeated` transfers, nothing, so the next transfer begins with a
//! repeated START.
//!
//! Addresses are 7-bit (`u8`) or 10-bit (`u16`) as in `embedded-hal`; the
//! R/W bit is added by the backend.
//!
//! A target that does not acknowledge is an ordinary outcome here:
//! [`I2c::transfer_and_wait`] returns [`Ack::Nack`] rather than an error.
//! Only the [`embedded_hal::i2c::I2c`] implementation turns it into
//! [`ErrorKind::NoAcknowledge`](embedded_hal::i2c::ErrorKind::NoAcknowledge),
//! because that trait requires it.
//!
//! ## Usage
//! ```
//! use fugit::ExtU32;
//! use serial_xfer::{
//!     i2c::{Ack, I2c},
//!     sim::{Eeprom, SimI2c},
//!     Bus, Config, CompletionMode,
//! };
//!
//! // Fires the bus interrupt every time the caller sleeps.
//! struct Tick<'a, B: serial_xfer::Backend>(&'a Bus<B>);
//! impl<B: serial_xfer::Backend> embedded_hal::delay::DelayNs for Tick<'_, B> {
//!     fn delay_ns(&mut self, _ns: u32) {
//!         self.0.on_interrupt();
//!     }
//! }
//!
//! let backend = SimI2c::new(CompletionMode::Interrupt).with_target(Eeprom::new(0x50));
//! let bus: Bus<_, 4> = Bus::new(backend, Config::new());
//! let mut i2c = I2c::new(&bus, Tick(&bus));
//!
//! // write 0x42 to cell 1, then read it back
//! assert_eq!(i2c.write(0x50u8, &[0x01, 0x42], false), Ok(Ack::Ack));
//! let mut cell = [0u8; 1];
//! let ack = i2c.transfer_and_wait(0x50u8, &[0x01], &mut cell, 1.secs(), false);
//! assert_eq!((ack, cell[0]), (Ok(Ack::Ack), 0x42));
//!
//! // nobody home
//! assert_eq!(i2c.write(0x20u8, &[], false), Ok(Ack::Nack));
//! ```

use embedded_hal::{delay::DelayNs, i2c as eh1};
use fugit::MicrosDurationU32;

use crate::{
    backend::Backend,
    bus::{Bus, DEFAULT_TIMEOUT},
    error::{BusError, Error},
    request::{Buffers, Outcome},
    typelevel::Sealed,
};

/// Framing of one I2C raw transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cFrame {
    /// Target address, without the R/W bit.
    pub address: u16,
    /// Whether `address` is a 10-bit address.
    pub ten_bit: bool,
    /// Whether to send STOP at the end. Without it the bus stays claimed
    /// and the next transfer starts with a repeated START.
    pub stop: bool,
    /// Whether this transfer continues the data phase of the previous one
    /// on a held bus. No START and no address are sent, so the bytes
    /// follow the previous transfer's bytes directly.
    pub continued: bool,
}

impl I2cFrame {
    /// Validates `address` and builds a frame for it.
    pub fn new<A: ValidAddress>(address: A, stop: bool) -> Result<Self, Error> {
        address.is_valid()?;
        let address: u16 = address.into();
        if !A::TEN_BIT && i2c_reserved_addr(address) {
            return Err(Error::AddressReserved(address));
        }
        Ok(Self {
            address,
            ten_bit: A::TEN_BIT,
            stop,
            continued: false,
        })
    }

    /// Marks the frame as a continuation of the previous transfer.
    ///
    /// The previous transfer must have gone to the same target in the same
    /// direction and ended without STOP.
    pub fn continuing(mut self) -> Self {
        self.continued = true;
        self
    }
}

/// Marks valid/supported address types
pub trait ValidAddress: Into<u16> + eh1::AddressMode + Copy + Sealed {
    /// Whether this is a 10-bit address type.
    const TEN_BIT: bool;

    /// Validates the address against the address range of its type.
    fn is_valid(self) -> Result<(), Error>;
}

impl Sealed for u8 {}
impl ValidAddress for u8 {
    const TEN_BIT: bool = false;

    fn is_valid(self) -> Result<(), Error> {
        if self >= 0x80 {
            Err(Error::AddressOutOfRange(self.into()))
        } else {
            Ok(())
        }
    }
}

impl Sealed for u16 {}
impl ValidAddress for u16 {
    const TEN_BIT: bool = true;

    fn is_valid(self) -> Result<(), Error> {
        if self >= 0x400 {
            Err(Error::AddressOutOfRange(self))
        } else {
            Ok(())
        }
    }
}

/// 7-bit addresses 0b0000xxx and 0b1111xxx are reserved.
fn i2c_reserved_addr(addr: u16) -> bool {
    (addr & 0x78) == 0 || (addr & 0x78) == 0x78
}

/// Acknowledge state of a finished transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ack {
    /// The target acknowledged every byte.
    Ack,
    /// The target did not acknowledge its address or a data byte.
    Nack,
}

/// Blocking I2C controller on top of a [`Bus`].
///
/// `D` is slept on while a transfer is in flight.
pub struct I2c<'a, B: Backend<Frame = I2cFrame>, D: DelayNs, const N: usize = 4> {
    bus: &'a Bus<B, N>,
    delay: D,
    timeout: MicrosDurationU32,
}

impl<'a, B: Backend<Frame = I2cFrame>, D: DelayNs, const N: usize> I2c<'a, B, D, N> {
    /// Uses `bus` with a one second timeout.
    pub fn new(bus: &'a Bus<B, N>, delay: D) -> Self {
        Self {
            bus,
            delay,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Timeout of [`write`](Self::write), [`read`](Self::read) and the
    /// `embedded-hal` methods.
    pub fn with_timeout(mut self, timeout: MicrosDurationU32) -> Self {
        self.timeout = timeout;
        self
    }

    /// Releases the delay.
    pub fn free(self) -> D {
        self.delay
    }

    /// Writes `tx`, then reads `rx` after a repeated START, in one raw
    /// transfer. Either may be empty; with both empty only the address is
    /// sent.
    ///
    /// With `repeated` set no STOP is sent, so the next transfer on the bus
    /// begins with a repeated START.
    pub fn transfer_and_wait<A: ValidAddress>(
        &mut self,
        address: A,
        tx: &[u8],
        rx: &mut [u8],
        timeout: MicrosDurationU32,
        repeated: bool,
    ) -> Result<Ack, Error> {
        let frame = I2cFrame::new(address, !repeated)?;
        self.run(frame, tx, rx, timeout)
    }

    fn run(
        &mut self,
        frame: I2cFrame,
        tx: &[u8],
        rx: &mut [u8],
        timeout: MicrosDurationU32,
    ) -> Result<Ack, Error> {
        let buffers = match (tx.is_empty(), rx.is_empty()) {
            (true, true) => Buffers::empty(),
            (false, true) => Buffers::write(tx),
            (true, false) => Buffers::read(rx),
            (false, false) => Buffers::transfer(tx, rx),
        };
        let event = self
            .bus
            .transfer_and_wait(frame, buffers, timeout, &mut self.delay)?;
        match event.outcome {
            Outcome::Complete => Ok(Ack::Ack),
            Outcome::Error(BusError::NoAcknowledge(_)) => Ok(Ack::Nack),
            Outcome::Error(e) => Err(Error::Bus(e)),
            Outcome::Aborted => Err(Error::Aborted),
        }
    }

    /// Writes `data` to `address`.
    pub fn write<A: ValidAddress>(
        &mut self,
        address: A,
        data: &[u8],
        repeated: bool,
    ) -> Result<Ack, Error> {
        self.transfer_and_wait(address, data, &mut [], self.timeout, repeated)
    }

    /// Reads `buffer.len()` bytes from `address`.
    pub fn read<A: ValidAddress>(
        &mut self,
        address: A,
        buffer: &mut [u8],
        repeated: bool,
    ) -> Result<Ack, Error> {
        self.transfer_and_wait(address, &[], buffer, self.timeout, repeated)
    }

    fn acked(ack: Ack, source: eh1::NoAcknowledgeSource) -> Result<(), Error> {
        match ack {
            Ack::Ack => Ok(()),
            Ack::Nack => Err(Error::Bus(BusError::NoAcknowledge(source))),
        }
    }
}

impl<B: Backend<Frame = I2cFrame>, D: DelayNs, const N: usize> eh1::ErrorType
    for I2c<'_, B, D, N>
{
    type Error = Error;
}

impl<A, B, D, const N: usize> eh1::I2c<A> for I2c<'_, B, D, N>
where
    A: ValidAddress,
    B: Backend<Frame = I2cFrame>,
    D: DelayNs,
{
    /// Runs every operation as its own transfer, holding the bus between
    /// them and sending STOP after the last. A repeated START and the
    /// address are only sent where the direction changes; adjacent
    /// operations of the same kind continue one another.
    fn transaction(
        &mut self,
        address: A,
        operations: &mut [eh1::Operation<'_>],
    ) -> Result<(), Self::Error> {
        let count = operations.len();
        let mut reading = None;
        for (i, operation) in operations.iter_mut().enumerate() {
            let read = matches!(operation, eh1::Operation::Read(_));
            let mut frame = I2cFrame::new(address, i + 1 == count)?;
            if reading == Some(read) {
                frame = frame.continuing();
            }
            reading = Some(read);
            let ack = match operation {
                eh1::Operation::Write(buf) => self.run(frame, *buf, &mut [], self.timeout)?,
                eh1::Operation::Read(buf) => self.run(frame, &[], &mut **buf, self.timeout)?,
            };
            Self::acked(ack, eh1::NoAcknowledgeSource::Unknown)?;
        }
        Ok(())
    }

    fn write_read(&mut self, address: A, write: &[u8], read: &mut [u8]) -> Result<(), Error> {
        let ack = self.transfer_and_wait(address, write, read, self.timeout, false)?;
        Self::acked(ack, eh1::NoAcknowledgeSource::Unknown)
    }
}
