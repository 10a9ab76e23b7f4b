//! Cooperative task support: a no-op waker and a one-shot signaling
//! channel, driven by explicit re-polling rather than a real cross-thread
//! wake.
//!
//! Grounded on the executor prototype in the teacher's original
//! `src/main.rs` (`RawWaker`/`RawWakerVTable` built over
//! `Arc<Mutex<Vec<Pin<Box<dyn Future<Output = ()>>>>>>` plus a `Condvar`
//! and a background `thread::spawn` per timer). That machinery solved a
//! harder problem than this engine has: here, at most one handler task
//! runs per connection, and it can only ever block on a body-read channel
//! fed by that same connection's own byte-feeding code path. There is
//! nothing for a waker to do except be called — re-polling happens
//! synchronously, in the same reactor tick, exactly at the points where
//! the blocking condition could have changed (task spawn, body bytes
//! appended, body marked done, connection marked closed). The prototype's
//! `Condvar`/background-thread wake path, and the `DelayedPrinter` demo
//! that exercised it, have no counterpart here and are gone.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

/// A value delivered over a body-read channel: either more bytes are
/// available, the body is fully read, or the connection died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    More,
    Done,
    Closed,
}

struct ChannelInner {
    pending: Option<Signal>,
    send_open: bool,
    recv_open: bool,
}

/// The send half of a one-shot body-read channel.
#[derive(Clone)]
pub struct Sender {
    inner: Rc<RefCell<ChannelInner>>,
}

/// The receive half of a one-shot body-read channel.
#[derive(Clone)]
pub struct Receiver {
    inner: Rc<RefCell<ChannelInner>>,
}

pub fn channel() -> (Sender, Receiver) {
    let inner = Rc::new(RefCell::new(ChannelInner { pending: None, send_open: true, recv_open: true }));
    (Sender { inner: inner.clone() }, Receiver { inner })
}

impl Sender {
    /// Non-blocking push. A later send before the prior signal is observed
    /// overwrites it — only the most recent condition matters to a task
    /// that hasn't looked yet.
    pub fn send(&self, signal: Signal) {
        self.inner.borrow_mut().pending = Some(signal);
    }

    pub fn is_good(&self) -> bool {
        let inner = self.inner.borrow();
        inner.send_open && inner.recv_open
    }

    pub fn close(&self) {
        self.inner.borrow_mut().send_open = false;
    }
}

impl Receiver {
    pub fn recv(&self) -> Recv {
        Recv { inner: self.inner.clone() }
    }

    pub fn is_good(&self) -> bool {
        let inner = self.inner.borrow();
        inner.send_open && inner.recv_open
    }

    pub fn close(&self) {
        self.inner.borrow_mut().recv_open = false;
    }
}

/// Future returned by `Receiver::recv`. Resolves to `Some(signal)` once one
/// has been sent, or `None` once the send half has closed with nothing
/// pending (the channel is "freed").
pub struct Recv {
    inner: Rc<RefCell<ChannelInner>>,
}

impl Future for Recv {
    type Output = Option<Signal>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        match inner.pending.take() {
            Some(s) => Poll::Ready(Some(s)),
            None if !inner.send_open => Poll::Ready(None),
            None => Poll::Pending,
        }
    }
}

fn noop_clone(data: *const ()) -> RawWaker {
    RawWaker::new(data, &NOOP_VTABLE)
}
fn noop_wake(_data: *const ()) {}
fn noop_wake_by_ref(_data: *const ()) {}
fn noop_drop(_data: *const ()) {}

static NOOP_VTABLE: RawWakerVTable = RawWakerVTable::new(noop_clone, noop_wake, noop_wake_by_ref, noop_drop);

/// A `Waker` that does nothing when woken. Correct here because nobody
/// calls `wake()` across a suspension boundary that the reactor doesn't
/// already know about by other means (see module doc).
pub fn noop_waker() -> Waker {
    let raw = RawWaker::new(std::ptr::null(), &NOOP_VTABLE);
    unsafe { Waker::from_raw(raw) }
}

/// Polls a boxed handler future exactly once with the no-op waker,
/// returning its status if it has completed.
pub fn poll_once<T>(fut: &mut Pin<Box<dyn Future<Output = T>>>) -> Poll<T> {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    fut.as_mut().poll(&mut cx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_pending_until_send() {
        let (tx, rx) = channel();
        let mut fut = Box::pin(rx.recv());
        assert_eq!(poll_once(&mut fut), Poll::Pending);
        tx.send(Signal::More);
        let mut fut2 = Box::pin(rx.recv());
        assert_eq!(poll_once(&mut fut2), Poll::Ready(Some(Signal::More)));
    }

    #[test]
    fn recv_resolves_none_once_sender_closed_with_nothing_pending() {
        let (tx, rx) = channel();
        tx.close();
        let mut fut = Box::pin(rx.recv());
        assert_eq!(poll_once(&mut fut), Poll::Ready(None));
    }

    #[test]
    fn is_good_reflects_both_endpoints() {
        let (tx, rx) = channel();
        assert!(tx.is_good());
        assert!(rx.is_good());
        rx.close();
        assert!(!tx.is_good());
    }
}
