use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use super::{Bus, CancelGuard};
use crate::{
    backend::Backend,
    error::Error,
    notify::Signal,
    request::{Buffers, Event, TransferId, TransferRequest},
};

impl<B: Backend, const N: usize> Bus<B, N> {
    /// Submits one transfer and returns a future resolving to its event.
    ///
    /// `signal` is reset and then used as the request's notifier, so it must
    /// not be shared with another pending request. Dropping the future
    /// before it resolves cancels the request.
    pub fn transfer(
        &self,
        frame: B::Frame,
        buffers: Buffers<'static>,
        signal: &'static Signal,
    ) -> Result<TransferFuture<'_, B, N>, Error> {
        signal.reset();
        let id = self.submit(TransferRequest::new(frame, buffers, signal))?;
        Ok(TransferFuture {
            guard: CancelGuard::new(self, id),
            id,
            signal,
        })
    }
}

/// Future returned by [`Bus::transfer`].
#[must_use = "Future do nothing unless they are polled on."]
pub struct TransferFuture<'a, B: Backend, const N: usize> {
    guard: CancelGuard<'a, B, N>,
    id: TransferId,
    signal: &'static Signal,
}

impl<B: Backend, const N: usize> TransferFuture<'_, B, N> {
    /// The submitted request.
    pub fn id(&self) -> TransferId {
        self.id
    }
}

impl<B: Backend, const N: usize> Future for TransferFuture<'_, B, N> {
    type Output = Event;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Event> {
        let this = self.get_mut();
        let r = this.signal.poll_take(cx);
        if r.is_ready() {
            this.guard.disarm();
        }
        r
    }
}
