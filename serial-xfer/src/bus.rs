//! Transfer engine
//!
//! [`Bus`] owns a [`Backend`] and a queue of up to `N` pending requests.
//! The engine is either idle or has exactly one active request bound to the
//! backend:
//!
//! * [`Bus::submit`] appends to the queue and, if the bus is idle, starts the
//!   request right away.
//! * [`Bus::on_interrupt`] must be called from the backend's interrupt
//!   handler. When the backend reports completion the active request's
//!   [`Event`] is delivered and the next queued request is started before
//!   the call returns.
//! * [`Bus::abort_current`] stops the active request. It receives an
//!   [`Outcome::Aborted`] event and the next queued request is started.
//!
//! Every transition happens inside one critical section, so a submitter
//! never observes an idle bus with a non-empty queue. Events are delivered
//! inside that critical section but with the engine state released, so a
//! [`Notify`] implementation may submit follow-up requests.
//!
//! ## Usage
//! ```
//! use fugit::RateExtU32;
//! use serial_xfer::{sim::LoopbackSpi, Buffers, Bus, Config, EventQueue, Outcome, TransferRequest};
//!
//! static MESSAGE: [u8; 4] = [0x01, 0x02, 0x04, 0x08];
//! static EVENTS: EventQueue<4> = EventQueue::new();
//!
//! let bus: Bus<_, 4> = Bus::new(LoopbackSpi::dma(1.MHz()), Config::new());
//! let id = bus
//!     .submit(TransferRequest::new((), Buffers::write(&MESSAGE), &EVENTS))
//!     .unwrap();
//!
//! // from the DMA-done interrupt handler
//! bus.on_interrupt();
//!
//! let event = EVENTS.pop().unwrap();
//! assert_eq!((event.id, event.outcome), (id, Outcome::Complete));
//! ```

use core::{cell::RefCell, task::Poll};

use critical_section::{CriticalSection, Mutex};
use fugit::MicrosDurationU32;

use crate::{
    backend::{Backend, Completion, RawTransfer},
    error::Error,
    notify::Notify,
    queue::TransferQueue,
    request::{Event, Outcome, TransferId, TransferRequest, TransferState},
};

mod blocking;
mod non_blocking;

pub use non_blocking::TransferFuture;

/// Engine configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    fill: u32,
    poll_interval: MicrosDurationU32,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// All-ones fill word, 10µs poll interval.
    pub const fn new() -> Self {
        Self {
            fill: 0xFFFF_FFFF,
            poll_interval: MicrosDurationU32::from_ticks(10),
        }
    }

    /// Word transmitted where a request has no tx data.
    ///
    /// Truncated to the word size of each transfer.
    pub const fn fill(mut self, word: u32) -> Self {
        self.fill = word;
        self
    }

    /// How long [`Bus::transfer_and_wait`] sleeps between checks.
    pub const fn poll_interval(mut self, interval: MicrosDurationU32) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The configured fill word.
    pub const fn fill_word(&self) -> u32 {
        self.fill
    }

    /// The configured poll interval.
    pub const fn poll_interval_us(&self) -> u32 {
        self.poll_interval.to_micros()
    }
}

struct Queued<F> {
    id: TransferId,
    frame: F,
    transfer: RawTransfer,
    notify: &'static dyn Notify,
}

struct Active {
    id: TransferId,
    notify: &'static dyn Notify,
}

/// An event waiting to be handed to its notifier.
struct Delivery {
    notify: &'static dyn Notify,
    event: Event,
}

impl Delivery {
    fn finished(id: TransferId, notify: &'static dyn Notify, completion: Completion) -> Self {
        let outcome = match completion.result {
            Ok(()) => Outcome::Complete,
            Err(e) => Outcome::Error(e),
        };
        Self {
            notify,
            event: Event {
                id,
                outcome,
                words: completion.words,
            },
        }
    }

    fn aborted(id: TransferId, notify: &'static dyn Notify, words: usize) -> Self {
        Self {
            notify,
            event: Event {
                id,
                outcome: Outcome::Aborted,
                words,
            },
        }
    }

    fn deliver(self) {
        #[cfg(feature = "defmt")]
        match self.event.outcome {
            Outcome::Error(e) => {
                defmt::warn!("{} failed after {} words: {}", self.event.id, self.event.words, e)
            }
            outcome => defmt::debug!("{} finished: {}", self.event.id, outcome),
        }
        self.notify.notify(self.event)
    }
}

struct Inner<B: Backend, const N: usize> {
    backend: B,
    config: Config,
    active: Option<Active>,
    queue: TransferQueue<Queued<B::Frame>, N>,
    next_id: u32,
}

impl<B: Backend, const N: usize> Inner<B, N> {
    fn allocate_id(&mut self) -> TransferId {
        let id = TransferId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Starts the queue head if the backend is idle.
    ///
    /// Returns the head's event if the backend finished it on the spot.
    fn promote(&mut self) -> Option<Delivery> {
        if self.active.is_some() {
            return None;
        }
        let next = self.queue.dequeue_next()?;
        #[cfg(feature = "defmt")]
        defmt::debug!("{} active, {} queued", next.id, self.queue.len());
        match self.backend.start(next.frame, next.transfer) {
            Poll::Pending => {
                self.active = Some(Active {
                    id: next.id,
                    notify: next.notify,
                });
                None
            }
            Poll::Ready(completion) => Some(Delivery::finished(next.id, next.notify, completion)),
        }
    }

    fn service(&mut self) -> Option<Delivery> {
        match self.backend.on_interrupt() {
            Poll::Pending => None,
            Poll::Ready(completion) => match self.active.take() {
                Some(active) => Some(Delivery::finished(active.id, active.notify, completion)),
                None => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("completion without an active transfer");
                    None
                }
            },
        }
    }

    fn abort_active(&mut self) -> Option<Delivery> {
        let active = self.active.take()?;
        let words = self.backend.abort();
        Some(Delivery::aborted(active.id, active.notify, words))
    }
}

/// A bus instance: one backend and its request queue.
///
/// `N` is the number of requests that can wait behind the active one.
pub struct Bus<B: Backend, const N: usize = 4> {
    inner: Mutex<RefCell<Inner<B, N>>>,
}

impl<B: Backend, const N: usize> Bus<B, N> {
    /// Takes ownership of `backend`.
    pub fn new(backend: B, config: Config) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                backend,
                config,
                active: None,
                queue: TransferQueue::new(),
                next_id: 0,
            })),
        }
    }

    /// Queues a request.
    ///
    /// The request is checked against the backend before it is accepted; a
    /// request that is rejected here never produces an event. An accepted
    /// request produces exactly one.
    pub fn submit(&self, request: TransferRequest<'static, B::Frame>) -> Result<TransferId, Error> {
        // SAFETY: everything the request borrows lives forever.
        unsafe { self.submit_unchecked(request) }
    }

    /// Queues a request with non-`'static` buffers and notifier.
    ///
    /// # Safety
    ///
    /// The buffers and the notifier must stay valid, and the buffers must
    /// not be accessed, until the request's event has been delivered or
    /// [`Bus::cancel`] has returned for it.
    pub unsafe fn submit_unchecked<'a>(
        &self,
        request: TransferRequest<'a, B::Frame>,
    ) -> Result<TransferId, Error> {
        let TransferRequest {
            frame,
            buffers,
            notify,
        } = request;
        // SAFETY: lifetime extension only, upheld by the caller.
        let notify = unsafe {
            core::mem::transmute::<&'a (dyn Notify + 'a), &'static (dyn Notify + 'static)>(notify)
        };
        let words = buffers.words()?;
        critical_section::with(|cs| {
            let id = {
                let mut inner = self.inner.borrow_ref_mut(cs);
                if !inner.backend.supports(buffers.size()) {
                    return Err(Error::UnsupportedWordSize(buffers.size()));
                }
                if words == 0 && inner.backend.requires_data() {
                    return Err(Error::EmptyTransfer);
                }
                if inner.queue.is_full() {
                    return Err(Error::QueueFull);
                }
                let id = inner.allocate_id();
                let transfer = buffers.into_raw(inner.config.fill);
                #[cfg(feature = "defmt")]
                defmt::debug!("{} queued, {} words", id, words);
                let queued = Queued {
                    id,
                    frame,
                    transfer,
                    notify,
                };
                if inner.queue.enqueue(queued).is_err() {
                    return Err(Error::QueueFull);
                }
                id
            };
            self.settle(cs, None);
            Ok(id)
        })
    }

    /// Delivers `done` and keeps starting queued requests until one is left
    /// running on the backend or the queue is empty.
    fn settle(&self, cs: CriticalSection<'_>, mut done: Option<Delivery>) {
        loop {
            if let Some(delivery) = done.take() {
                delivery.deliver();
            }
            done = self.inner.borrow_ref_mut(cs).promote();
            if done.is_none() {
                break;
            }
        }
    }

    /// Services the backend interrupt. Call this from the interrupt handler.
    pub fn on_interrupt(&self) {
        critical_section::with(|cs| {
            let done = self.inner.borrow_ref_mut(cs).service();
            if done.is_some() {
                self.settle(cs, done);
            }
        })
    }

    /// Aborts the active request, if there is one, and starts the next.
    ///
    /// Data received before the abort stays in the rx buffer; nothing past
    /// it is written.
    pub fn abort_current(&self) -> Option<TransferId> {
        critical_section::with(|cs| {
            let done = self.inner.borrow_ref_mut(cs).abort_active();
            let id = done.as_ref().map(|d| d.event.id);
            self.settle(cs, done);
            id
        })
    }

    /// Withdraws request `id`, aborting it if it is active.
    ///
    /// Returns `false` if the request already finished. Once this returns
    /// the engine no longer refers to the request's buffers or notifier.
    pub fn cancel(&self, id: TransferId) -> bool {
        critical_section::with(|cs| {
            let done = {
                let mut inner = self.inner.borrow_ref_mut(cs);
                if inner.active.as_ref().is_some_and(|a| a.id == id) {
                    inner.abort_active()
                } else {
                    inner
                        .queue
                        .remove_first(|q| q.id == id)
                        .map(|q| Delivery::aborted(q.id, q.notify, 0))
                }
            };
            let found = done.is_some();
            self.settle(cs, done);
            found
        })
    }

    /// Aborts the active request and every queued one, in submission order.
    ///
    /// Returns the number of requests aborted.
    pub fn abort_all(&self) -> usize {
        critical_section::with(|cs| {
            let (active, mut queued) = {
                let mut inner = self.inner.borrow_ref_mut(cs);
                let active = inner.abort_active();
                let queued = core::mem::take(&mut inner.queue);
                (active, queued)
            };
            let mut count = 0;
            if let Some(delivery) = active {
                delivery.deliver();
                count += 1;
            }
            while let Some(q) = queued.dequeue_next() {
                Delivery::aborted(q.id, q.notify, 0).deliver();
                count += 1;
            }
            count
        })
    }

    /// Where request `id` is, or `None` if it already finished.
    pub fn state(&self, id: TransferId) -> Option<TransferState> {
        critical_section::with(|cs| {
            let inner = self.inner.borrow_ref(cs);
            if inner.active.as_ref().is_some_and(|a| a.id == id) {
                Some(TransferState::Active)
            } else if inner.queue.find(|q| q.id == id).is_some() {
                Some(TransferState::Queued)
            } else {
                None
            }
        })
    }

    /// Whether no request is active.
    pub fn is_idle(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).active.is_none())
    }

    /// Number of requests not yet finished, the active one included.
    pub fn pending(&self) -> usize {
        critical_section::with(|cs| {
            let inner = self.inner.borrow_ref(cs);
            inner.queue.len() + usize::from(inner.active.is_some())
        })
    }

    /// The engine configuration.
    pub fn config(&self) -> Config {
        critical_section::with(|cs| self.inner.borrow_ref(cs).config)
    }

    /// Runs `f` on the backend inside a critical section.
    ///
    /// `f` must not call back into this bus.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs).backend))
    }

    /// Aborts everything outstanding and returns the backend.
    pub fn free(self) -> B {
        self.abort_all();
        let this = core::mem::ManuallyDrop::new(self);
        // SAFETY: `this` is never used again and its destructor does not run.
        let inner = unsafe { core::ptr::read(&this.inner) };
        inner.into_inner().into_inner().backend
    }
}

impl<B: Backend, const N: usize> Drop for Bus<B, N> {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Cancels a request when dropped, unless disarmed.
pub(crate) struct CancelGuard<'a, B: Backend, const N: usize> {
    bus: &'a Bus<B, N>,
    id: Option<TransferId>,
}

impl<'a, B: Backend, const N: usize> CancelGuard<'a, B, N> {
    pub(crate) fn new(bus: &'a Bus<B, N>, id: TransferId) -> Self {
        Self { bus, id: Some(id) }
    }

    /// Cancels now. Returns `true` if the request was still pending.
    pub(crate) fn cancel(&mut self) -> bool {
        self.id.take().is_some_and(|id| self.bus.cancel(id))
    }

    pub(crate) fn disarm(&mut self) {
        self.id = None;
    }
}

impl<B: Backend, const N: usize> Drop for CancelGuard<'_, B, N> {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Default timeout of the blocking front ends.
pub(crate) const DEFAULT_TIMEOUT: MicrosDurationU32 = MicrosDurationU32::from_ticks(1_000_000);
