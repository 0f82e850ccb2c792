//! Concurrent, failure-isolated pinging of many servers.

use std::{
    future::Future,
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures_util::{stream::FuturesUnordered, Stream, StreamExt};
use log::{debug, warn};
use tokio::{
    sync::{watch, Semaphore},
    task::{JoinError, JoinHandle},
};

use crate::{
    error::PingError,
    pinging::{Pinger, ServerAddress},
};

/// The outcome for one server of a batch.
pub type ProbeOutcome<K, T> = (K, Result<T, PingError>);

/// Pings many servers at once, one task per server.
///
/// Each ping carries its own connection and timeout, so a server that hangs
/// or errors never holds up the others. Results come back in completion
/// order.
#[derive(Debug, Clone)]
pub struct BatchProber<P> {
    pinger: P,
    max_in_flight: Option<usize>,
}

impl<P> BatchProber<P>
where
    P: Pinger + Clone + Send + Sync + 'static,
    P::Data: Send + 'static,
{
    pub fn new(pinger: P) -> Self {
        Self {
            pinger,
            max_in_flight: None,
        }
    }

    /// Caps how many pings may have a socket open at the same time.
    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = Some(limit.max(1));
        self
    }

    /// Pings every address and waits for all of them to settle.
    pub async fn probe(
        &self,
        addresses: Vec<ServerAddress>,
    ) -> Vec<ProbeOutcome<ServerAddress, P::Data>> {
        let keyed = addresses
            .into_iter()
            .map(|address| (address.clone(), address))
            .collect();
        self.probe_keyed(keyed, None).collect().await
    }

    /// Pings every `(id, address)` pair, yielding each result as soon as its
    /// ping finishes.
    ///
    /// Flipping `cancel` to `true` makes every unfinished ping report
    /// [`PingError::Cancelled`] right away and close its socket. Dropping the
    /// stream aborts every unfinished ping as well.
    pub fn probe_keyed<K>(
        &self,
        targets: Vec<(K, ServerAddress)>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> impl Stream<Item = ProbeOutcome<K, P::Data>>
    where
        K: Send + 'static,
    {
        debug!("probing {} servers", targets.len());
        let permits = self.max_in_flight.map(|limit| Arc::new(Semaphore::new(limit)));

        targets
            .into_iter()
            .map(|(key, address)| {
                let pinger = self.pinger.clone();
                let permits = permits.clone();
                let cancel = cancel.clone();

                let task = AbortOnDrop(tokio::spawn(async move {
                    let ping = async {
                        let _permit = match &permits {
                            Some(permits) => match permits.acquire().await {
                                Ok(permit) => Some(permit),
                                Err(_) => return Err(PingError::Cancelled),
                            },
                            None => None,
                        };
                        pinger.ping(&address).await
                    };

                    match cancel {
                        Some(cancel) => tokio::select! {
                            result = ping => result,
                            _ = cancelled(cancel) => Err(PingError::Cancelled),
                        },
                        None => ping.await,
                    }
                }));

                async move {
                    let result = task.await.unwrap_or_else(|e| {
                        warn!("ping task failed: {e}");
                        if e.is_cancelled() {
                            Err(PingError::Cancelled)
                        } else {
                            Err(PingError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
                        }
                    });
                    (key, result)
                }
            })
            .collect::<FuturesUnordered<_>>()
    }
}

/// A spawned ping that is aborted, socket and all, when its handle goes away.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Resolves once `cancel` reads `true`. A dropped sender never cancels.
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        let is_cancelled = *cancel.borrow_and_update();
        if is_cancelled {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
