//! Serial Peripheral Interface (SPI) front end
//!
//! [`BlockingSpi`] implements [`embedded_hal::spi::SpiBus`] by running each
//! call as one request on a shared [`Bus`] and sleeping on a delay until it
//! finishes, so it can sit next to asynchronous users of the same bus.
//! Requests from both kinds of users are served in submission order.

use embedded_hal::{delay::DelayNs, spi};
use fugit::MicrosDurationU32;

use crate::{
    backend::Backend,
    bus::{Bus, DEFAULT_TIMEOUT},
    error::Error,
    request::Buffers,
    word::{self, WordSize},
};

/// Blocking SPI controller on top of a [`Bus`].
pub struct BlockingSpi<'a, B: Backend<Frame = ()>, D: DelayNs, const N: usize = 4> {
    bus: &'a Bus<B, N>,
    delay: D,
    timeout: MicrosDurationU32,
}

impl<'a, B: Backend<Frame = ()>, D: DelayNs, const N: usize> BlockingSpi<'a, B, D, N> {
    /// Uses `bus` with a one second timeout per call.
    pub fn new(bus: &'a Bus<B, N>, delay: D) -> Self {
        Self {
            bus,
            delay,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: MicrosDurationU32) -> Self {
        self.timeout = timeout;
        self
    }

    /// Releases the delay.
    pub fn free(self) -> D {
        self.delay
    }

    fn run(&mut self, buffers: Buffers<'_>) -> Result<(), Error> {
        self.bus
            .transfer_and_wait((), buffers, self.timeout, &mut self.delay)?
            .into_result()
            .map(|_| ())
    }

    /// Sends one word of `size` and returns the word received meanwhile.
    pub fn transfer_word(&mut self, size: WordSize, value: u32) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        let buf = &mut buf[..size.bytes()];
        word::encode(value, buf);
        self.run(Buffers::in_place(buf).word_size(size))?;
        Ok(word::decode(buf))
    }
}

impl<B: Backend<Frame = ()>, D: DelayNs, const N: usize> spi::ErrorType
    for BlockingSpi<'_, B, D, N>
{
    type Error = Error;
}

impl<B: Backend<Frame = ()>, D: DelayNs, const N: usize> spi::SpiBus<u8>
    for BlockingSpi<'_, B, D, N>
{
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.run(Buffers::read(words))
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.run(Buffers::write(words))
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        self.run(Buffers::transfer(write, read))
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.run(Buffers::in_place(words))
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        // every call waits for its own request
        Ok(())
    }
}
