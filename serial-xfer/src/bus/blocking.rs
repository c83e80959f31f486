//! Blocking submit-and-wait

use embedded_hal::delay::DelayNs;
use fugit::MicrosDurationU32;

use super::{Bus, CancelGuard};
use crate::{
    backend::Backend,
    error::Error,
    notify::Signal,
    request::{Buffers, Event, TransferRequest},
};

impl<B: Backend, const N: usize> Bus<B, N> {
    /// Submits one transfer and waits for its event.
    ///
    /// Between checks the caller sleeps on `delay` for the configured poll
    /// interval, so on an RTOS other tasks (and the bus interrupt) keep
    /// running. If `timeout` elapses first the request is withdrawn, aborting
    /// it if the backend already started it, and [`Error::Timeout`] is
    /// returned; the bus is then free for the next request.
    ///
    /// Returns the event for any other outcome, including
    /// [`Outcome::Aborted`](crate::Outcome::Aborted) when another context
    /// aborted the transfer. [`Event::into_result`] folds those into errors.
    pub fn transfer_and_wait<D: DelayNs>(
        &self,
        frame: B::Frame,
        buffers: Buffers<'_>,
        timeout: MicrosDurationU32,
        delay: &mut D,
    ) -> Result<Event, Error> {
        let signal = Signal::new();
        // SAFETY: `guard` withdraws the request before `signal` and the
        // buffers go out of scope, also when unwinding.
        let id = unsafe { self.submit_unchecked(TransferRequest::new(frame, buffers, &signal))? };
        let mut guard = CancelGuard::new(self, id);

        let step = self.config().poll_interval_us().max(1);
        let limit = timeout.to_micros();
        let mut waited = 0u32;
        loop {
            if let Some(event) = signal.take() {
                guard.disarm();
                return Ok(event);
            }
            if waited >= limit {
                break;
            }
            let nap = step.min(limit - waited);
            delay.delay_us(nap);
            waited = waited.saturating_add(nap);
        }

        let cancelled = guard.cancel();
        #[cfg(feature = "defmt")]
        if cancelled {
            defmt::warn!("{} timed out after {}us", id, limit);
        }
        match signal.take() {
            // finished between the last check and the cancel
            Some(event) if !cancelled => Ok(event),
            _ => Err(Error::Timeout),
        }
    }
}
