//! Blocking multi-producer/multi-consumer work queue.
//!
//! Producers push from any thread; executor threads block in [`WorkQueue::pop`]
//! until an item arrives or the queue is cancelled. Cancellation wakes every
//! waiter at once. Closing lets consumers drain what is left before they stop.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Outcome of a blocking pop.
#[derive(Debug, PartialEq, Eq)]
pub enum Pop<T> {
    Item(T),
    /// The queue was cancelled; remaining items are abandoned.
    Cancelled,
    /// The queue was closed and every item has been handed out.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Closed,
    Cancelled,
}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    state: State,
}

#[derive(Debug)]
pub struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                state: State::Open,
            }),
            available: Condvar::new(),
        }
    }

    /// Append an item. Hands it back if the queue no longer accepts work.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut inner = self.inner.lock();
        if inner.state != State::Open {
            return Err(item);
        }
        inner.items.push_back(item);
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    /// Like [`push`](Self::push), but runs `on_accept` under the queue lock
    /// once the item is accepted and before any consumer can see it.
    pub(crate) fn push_with<F>(&self, item: T, on_accept: F) -> Result<(), T>
    where
        F: FnOnce(),
    {
        let mut inner = self.inner.lock();
        if inner.state != State::Open {
            return Err(item);
        }
        on_accept();
        inner.items.push_back(item);
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    /// Block until an item is available, the queue is cancelled, or the
    /// queue is closed and empty.
    pub fn pop(&self) -> Pop<T> {
        let mut inner = self.inner.lock();
        loop {
            match inner.state {
                State::Cancelled => return Pop::Cancelled,
                State::Open | State::Closed => {
                    if let Some(item) = inner.items.pop_front() {
                        return Pop::Item(item);
                    }
                    if inner.state == State::Closed {
                        return Pop::Closed;
                    }
                }
            }
            self.available.wait(&mut inner);
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.state == State::Cancelled {
            return None;
        }
        inner.items.pop_front()
    }

    /// Stop handing out items and release every blocked consumer.
    pub fn cancel(&self) {
        self.inner.lock().state = State::Cancelled;
        self.available.notify_all();
    }

    /// Refuse new items; consumers drain the rest and then see [`Pop::Closed`].
    /// Has no effect on a cancelled queue.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.state == State::Open {
            inner.state = State::Closed;
        }
        drop(inner);
        self.available.notify_all();
    }

    /// Remove and return every queued item.
    pub fn clear(&self) -> Vec<T> {
        self.inner.lock().items.drain(..).collect()
    }

    /// Back to an open, empty queue. Returns whatever was still queued.
    pub fn reset(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        inner.state = State::Open;
        inner.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().state == State::Cancelled
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().state == State::Closed
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
