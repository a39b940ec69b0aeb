//! Single-shot asynchronous results.
//!
//! Every asynchronous operation in the client resolves through a
//! [`ResultFuture`]. The producing side holds a [`ResultSender`] which can be
//! used at most once; if it is dropped unused the future resolves with the
//! fallback chosen at creation, so a caller never waits forever.

use crate::error::Result;
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Producing half of a [`ResultFuture`].
#[derive(Debug)]
pub struct ResultSender<T> {
    sender: oneshot::Sender<Result<T>>,
}

impl<T> ResultSender<T> {
    /// Resolve the paired future. Returns false if nobody is waiting anymore.
    pub fn send(self, result: Result<T>) -> bool {
        self.sender.send(result).is_ok()
    }

    pub fn is_abandoned(&self) -> bool {
        self.sender.is_canceled()
    }
}

/// A result that resolves exactly once.
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct ResultFuture<T> {
    receiver: oneshot::Receiver<Result<T>>,
    on_abandoned: fn() -> Result<T>,
}

/// Create a sender/future pair. `on_abandoned` produces the outcome seen by
/// the future when the sender is dropped without sending.
pub(crate) fn channel<T>(on_abandoned: fn() -> Result<T>) -> (ResultSender<T>, ResultFuture<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        ResultSender { sender },
        ResultFuture {
            receiver,
            on_abandoned,
        },
    )
}

impl<T> ResultFuture<T> {
    /// A future that is already resolved.
    pub(crate) fn ready(result: Result<T>, on_abandoned: fn() -> Result<T>) -> Self {
        let (sender, future) = channel(on_abandoned);
        sender.send(result);
        future
    }

    /// Block the current thread until the result is available.
    pub fn wait(self) -> Result<T> {
        futures::executor::block_on(self)
    }
}

impl<T> Future for ResultFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready((self.on_abandoned)()),
            Poll::Pending => Poll::Pending,
        }
    }
}
