//! Completion notification
//!
//! Every request the engine accepts produces exactly one [`Event`], handed
//! to the request's [`Notify`] target. Delivery happens in whatever context
//! finished the request. For completions that is the backend's interrupt
//! handler; for aborts it is the caller of
//! [`Bus::abort_current`](crate::Bus::abort_current) or
//! [`Bus::cancel`](crate::Bus::cancel).
//!
//! Two ready-made targets are provided: [`Signal`], a single slot with an
//! async waker, and [`EventQueue`], a bounded channel.

use core::{
    cell::{Cell, RefCell},
    future::poll_fn,
    task::{Context, Poll, Waker},
};

use critical_section::Mutex;
use heapless::Deque;

use crate::request::Event;

/// Receiver of transfer events.
///
/// `notify` may run in interrupt context, inside a critical section. It
/// must not block or wait on the bus it is called from; setting a flag or
/// waking a task is about as much as it should do. The compiler cannot
/// check this.
///
/// `notify` may submit new requests to the bus that called it.
pub trait Notify: Sync {
    /// Called once per request with its final event.
    fn notify(&self, event: Event);
}

impl<F> Notify for F
where
    F: Fn(Event) + Sync,
{
    fn notify(&self, event: Event) {
        self(event)
    }
}

/// This type wraps a `Waker` in a `Mutex<Cell<Option<_>>>`.
///
/// While `critical_section::Mutex` integrates nicely with RefCell, RefCell
/// adds a borrow counter that is not necessary for this usecase.
pub(crate) struct WakerSlot {
    waker: Mutex<Cell<Option<Waker>>>,
}

impl WakerSlot {
    pub(crate) const fn new() -> Self {
        Self {
            waker: Mutex::new(Cell::new(None)),
        }
    }
    pub(crate) fn wake(&self) {
        critical_section::with(|cs| {
            if let Some(waker) = self.waker.borrow(cs).take() {
                waker.wake();
            }
        });
    }
    pub(crate) fn register(&self, waker: &Waker) {
        critical_section::with(|cs| {
            self.waker.borrow(cs).replace(Some(waker.clone()));
        });
    }
    pub(crate) fn clear(&self) {
        critical_section::with(|cs| {
            self.waker.borrow(cs).take();
        });
    }
}

/// Single event slot.
///
/// Holds the last event delivered to it until taken. Suited to waiting on
/// one request at a time, from a polling loop ([`Signal::take`]) or a task
/// ([`Signal::wait`]).
pub struct Signal {
    event: Mutex<Cell<Option<Event>>>,
    waker: WakerSlot,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    /// An empty signal.
    pub const fn new() -> Self {
        Self {
            event: Mutex::new(Cell::new(None)),
            waker: WakerSlot::new(),
        }
    }

    /// Takes the stored event, if any.
    pub fn take(&self) -> Option<Event> {
        critical_section::with(|cs| self.event.borrow(cs).take())
    }

    /// Whether an event is waiting to be taken.
    pub fn is_set(&self) -> bool {
        critical_section::with(|cs| self.event.borrow(cs).get().is_some())
    }

    /// Drops any stored event and registered waker.
    pub fn reset(&self) {
        self.take();
        self.waker.clear();
    }

    /// Takes the event or registers `cx` to be woken when it arrives.
    pub fn poll_take(&self, cx: &mut Context<'_>) -> Poll<Event> {
        if let Some(event) = self.take() {
            return Poll::Ready(event);
        }
        self.waker.register(cx.waker());
        // the event may have landed between the take and the register
        match self.take() {
            Some(event) => {
                self.waker.clear();
                Poll::Ready(event)
            }
            None => Poll::Pending,
        }
    }

    /// Waits for the next event.
    pub async fn wait(&self) -> Event {
        poll_fn(|cx| self.poll_take(cx)).await
    }
}

impl Notify for Signal {
    fn notify(&self, event: Event) {
        critical_section::with(|cs| self.event.borrow(cs).set(Some(event)));
        self.waker.wake();
    }
}

/// Bounded queue of events, filled in interrupt context and drained by
/// the application.
///
/// Events arriving while the queue is full are counted and dropped.
pub struct EventQueue<const N: usize> {
    events: Mutex<RefCell<Deque<Event, N>>>,
    dropped: Mutex<Cell<usize>>,
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EventQueue<N> {
    /// An empty queue.
    pub const fn new() -> Self {
        Self {
            events: Mutex::new(RefCell::new(Deque::new())),
            dropped: Mutex::new(Cell::new(0)),
        }
    }

    /// Removes the oldest event.
    pub fn pop(&self) -> Option<Event> {
        critical_section::with(|cs| self.events.borrow_ref_mut(cs).pop_front())
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.events.borrow_ref(cs).len())
    }

    /// Whether no event is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events lost to a full queue.
    pub fn dropped(&self) -> usize {
        critical_section::with(|cs| self.dropped.borrow(cs).get())
    }
}

impl<const N: usize> Notify for EventQueue<N> {
    fn notify(&self, event: Event) {
        critical_section::with(|cs| {
            if self.events.borrow_ref_mut(cs).push_back(event).is_err() {
                #[cfg(feature = "defmt")]
                defmt::warn!("event queue full, dropping {}", event);
                let dropped = self.dropped.borrow(cs);
                dropped.set(dropped.get() + 1);
            }
        });
    }
}
