// ── Reactive phase streams ──
//
// Subscription type for following an ad unit's phase, e.g. to drive a
// loading indicator while a navigation waits on an ad.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{AdPhase, AdUnitState};

/// `Stream` of distinct [`AdPhase`] values backed by a unit's state
/// channel.
///
/// Yields the current phase first, then every phase change. Consecutive
/// state updates that keep the phase (a retry count bump, a flag change)
/// are skipped. Ends when the unit's actor stops.
pub struct PhaseStream {
    inner: WatchStream<AdUnitState>,
    last: Option<AdPhase>,
}

impl PhaseStream {
    pub(crate) fn new(receiver: watch::Receiver<AdUnitState>) -> Self {
        Self {
            inner: WatchStream::new(receiver),
            last: None,
        }
    }
}

impl Stream for PhaseStream {
    type Item = AdPhase;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(state) = ready!(Pin::new(&mut self.inner).poll_next(cx)) else {
                return Poll::Ready(None);
            };
            if self.last != Some(state.phase) {
                self.last = Some(state.phase);
                return Poll::Ready(Some(state.phase));
            }
        }
    }
}
