#![allow(dead_code)]

use embedded_hal::delay::DelayNs;
use fugit::RateExtU32;
use serial_xfer::{
    sim::{Eeprom, LoopbackSpi, SimI2c},
    Backend, Bus, CompletionMode, Config, Event, EventQueue,
};

pub mod spi;

pub const EEPROM_ADDR: u8 = 0x50;
pub const MISSING_ADDR: u8 = 0x20;

pub type SpiBus = Bus<LoopbackSpi, 4>;
pub type I2cBus = Bus<SimI2c, 4>;

pub fn spi_bus(mode: CompletionMode) -> SpiBus {
    let spi = match mode {
        CompletionMode::Interrupt => LoopbackSpi::interrupt(1.MHz()),
        CompletionMode::Dma => LoopbackSpi::dma(1.MHz()),
    };
    Bus::new(spi, Config::new())
}

pub fn i2c_bus(mode: CompletionMode) -> I2cBus {
    Bus::new(
        SimI2c::new(mode).with_target(Eeprom::new(EEPROM_ADDR)),
        Config::new(),
    )
}

pub fn leak<T>(value: T) -> &'static mut T {
    Box::leak(Box::new(value))
}

pub fn drain<const N: usize>(events: &EventQueue<N>) -> Vec<Event> {
    std::iter::from_fn(|| events.pop()).collect()
}

/// Raises the bus interrupt once per sleep, standing in for the peripheral
/// making progress while the caller is parked.
pub struct IrqDelay<'a, B: Backend, const N: usize> {
    bus: &'a Bus<B, N>,
    pub naps: u32,
}

impl<'a, B: Backend, const N: usize> IrqDelay<'a, B, N> {
    pub fn new(bus: &'a Bus<B, N>) -> Self {
        Self { bus, naps: 0 }
    }
}

impl<B: Backend, const N: usize> DelayNs for IrqDelay<'_, B, N> {
    fn delay_ns(&mut self, _ns: u32) {
        self.naps += 1;
        self.bus.on_interrupt();
    }
}

/// A peripheral that never makes progress: sleeping only counts time.
#[derive(Default)]
pub struct Stalled {
    pub naps: u32,
    pub slept_ns: u64,
}

impl DelayNs for Stalled {
    fn delay_ns(&mut self, ns: u32) {
        self.naps += 1;
        self.slept_ns += u64::from(ns);
    }
}

/// Really sleeps, yielding the thread.
pub struct Sleep;

impl DelayNs for Sleep {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Generator {
    Sequence(u8),
    Fibonacci(u8, u8),
}
impl Generator {
    pub const fn fib() -> Generator {
        Generator::Fibonacci(0, 1)
    }
    pub const fn seq() -> Generator {
        Generator::Sequence(0)
    }
}
impl Iterator for Generator {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        let out;
        match self {
            Generator::Sequence(i) => {
                (out, *i) = (*i, i.wrapping_add(1));
            }
            Generator::Fibonacci(a, b) => {
                (out, *a, *b) = (*a, *b, a.wrapping_add(*b));
            }
        }
        Some(out)
    }
}

pub mod testdata {
    /// 4 byte SPI message.
    pub const MESSAGE: [u8; 4] = [0x01, 0x02, 0x04, 0x08];

    /// 32 byte SPI message.
    pub fn long_message() -> [u8; 32] {
        let mut out = [0u8; 32];
        for (slot, v) in out.iter_mut().zip(super::Generator::fib()) {
            *slot = v;
        }
        out
    }

    /// Written into rx buffers before a transfer to spot untouched slots.
    pub const UNTOUCHED: u8 = 0xEE;
}
