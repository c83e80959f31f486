//! Software backends
//!
//! These backends run raw transfers against in-memory models instead of a
//! peripheral. The interrupt is whatever calls [`Bus::on_interrupt`], e.g. a
//! thread standing in for the interrupt controller. Both completion modes
//! are modelled:
//!
//! * [`CompletionMode::Interrupt`]: every interrupt moves one word,
//! * [`CompletionMode::Dma`]: words move in the background (see
//!   [`LoopbackSpi::clock`]) and one interrupt finishes the buffer.
//!
//! [`Bus::on_interrupt`]: crate::Bus::on_interrupt
//! [`CompletionMode::Interrupt`]: crate::CompletionMode::Interrupt
//! [`CompletionMode::Dma`]: crate::CompletionMode::Dma

mod i2c;
mod spi;

pub use i2c::{Eeprom, SimI2c};
pub use spi::{LoopbackSpi, CAPTURE_LEN};
