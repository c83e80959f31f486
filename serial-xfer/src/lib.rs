//! Queued transfer engine for SPI and I2C buses
//!
//! A [`Bus`] owns one bus [`Backend`] and a FIFO of pending transfer
//! requests. At most one request is bound to the backend at a time; when
//! the backend signals completion (from its interrupt handler, per word or
//! per DMA buffer) the engine notifies the request's [`Notify`] target and
//! starts the next queued request before returning.
//!
//! On top of the engine sit:
//! * [`Bus::transfer_and_wait`], a blocking submit-and-wait with timeout,
//! * [`Bus::transfer`], a future resolving to the transfer's [`Event`],
//! * [`spi::BlockingSpi`] and [`i2c::I2c`], `embedded-hal` front ends.
//!
//! The [`sim`] module provides software backends (loopback SPI and an I2C
//! bus with an EEPROM-style target) for host testing and bring-up.
//!
//! # Crate features
//!
//! * **defmt** -
//!   Implement `defmt::Format` for several types and log engine state
//!   transitions.

#![warn(missing_docs)]
#![no_std]

pub mod backend;
pub mod bus;
mod error;
pub mod i2c;
pub mod notify;
pub mod queue;
pub mod request;
pub mod sim;
pub mod spi;
pub(crate) mod typelevel;
pub mod word;

pub use backend::{Backend, Completion, CompletionMode, RawTransfer};
pub use bus::{Bus, Config};
pub use error::{BusError, Error};
pub use notify::{EventQueue, Notify, Signal};
pub use request::{Buffers, Event, Outcome, TransferId, TransferRequest, TransferState};
pub use word::WordSize;
