//! Cursors as caller-driven streams.
//!
//! A [`CursorResult`] wraps one cursor-open request. Turning it into a
//! [`CursorStream`] delivers one [`Cursor`] per position; the stream only
//! moves on after the caller asks for it with [`Cursor::continue_`],
//! [`Cursor::continue_to`] or [`Cursor::advance`]. Until then it is stalled.
//!
//! ```rust,ignore
//! let mut stream = store.open_cursor(None, CursorDirection::Next).as_stream();
//! while let Some(event) = stream.poll_next() {
//!     match event {
//!         StreamEvent::Next(cursor) => {
//!             if cursor.value().age < 30 {
//!                 cursor.continue_()?;
//!             }
//!         }
//!         StreamEvent::Error(error) => return Err(error),
//!         StreamEvent::Complete => break,
//!     }
//! }
//! ```

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use recordb_codec::from_value;
use recordb_engine::{CursorDirection, EngineCursor, EngineError, Key};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

/// A requested move of the underlying cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Advance {
    Continue(Option<Key>),
    Skip(u32),
}

type Pending = Arc<Mutex<Option<Advance>>>;

/// One notification of a [`CursorStream`].
#[derive(Debug)]
pub enum StreamEvent<T> {
    /// A record is available.
    Next(Cursor<T>),
    /// The cursor request failed. Terminal.
    Error(CoreError),
    /// The traversal reached its end. Terminal.
    Complete,
}

/// The result of opening a cursor.
pub struct CursorResult<T> {
    request: CoreResult<Box<dyn EngineCursor>>,
    direction: CursorDirection,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> CursorResult<T> {
    pub(crate) fn new(
        request: CoreResult<Box<dyn EngineCursor>>,
        direction: CursorDirection,
    ) -> Self {
        Self {
            request,
            direction,
            _marker: PhantomData,
        }
    }

    /// Turns the cursor into a caller-driven stream.
    #[must_use]
    pub fn as_stream(self) -> CursorStream<T> {
        let state = match self.request {
            Ok(cursor) => StreamState::Live {
                cursor,
                delivered: false,
            },
            Err(error) => StreamState::Failed(error),
        };
        CursorStream {
            state,
            direction: self.direction,
            pending: Arc::new(Mutex::new(None)),
            _marker: PhantomData,
        }
    }

    /// Collects every record in traversal order.
    ///
    /// # Errors
    ///
    /// Returns the first error the stream reports.
    pub fn as_list(self) -> CoreResult<Vec<T>> {
        let mut stream = self.as_stream();
        let mut items = Vec::new();
        loop {
            match stream.poll_next() {
                Some(StreamEvent::Next(cursor)) => {
                    cursor.continue_()?;
                    items.push(cursor.into_value());
                }
                Some(StreamEvent::Error(error)) => return Err(error),
                Some(StreamEvent::Complete) | None => return Ok(items),
            }
        }
    }
}

impl<T> fmt::Debug for CursorResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorResult")
            .field("opened", &self.request.is_ok())
            .field("direction", &self.direction)
            .finish()
    }
}

enum StreamState {
    Live {
        cursor: Box<dyn EngineCursor>,
        delivered: bool,
    },
    Failed(CoreError),
    Finished,
}

/// A single-pass, caller-driven stream of cursor positions.
///
/// The stream is also an [`Iterator`]. Iteration yields `None` both at the
/// end and while stalled; calling `next` again after a
/// [`Cursor::continue_`] resumes it.
pub struct CursorStream<T> {
    state: StreamState,
    direction: CursorDirection,
    pending: Pending,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> CursorStream<T> {
    /// Produces the next notification.
    ///
    /// Returns `None` when the stream is stalled waiting for the caller to
    /// move the last delivered cursor, or after a terminal notification.
    pub fn poll_next(&mut self) -> Option<StreamEvent<T>> {
        match std::mem::replace(&mut self.state, StreamState::Finished) {
            StreamState::Finished => None,
            StreamState::Failed(error) => Some(StreamEvent::Error(error)),
            StreamState::Live {
                mut cursor,
                delivered,
            } => {
                if delivered {
                    let Some(advance) = self.pending.lock().take() else {
                        self.state = StreamState::Live {
                            cursor,
                            delivered,
                        };
                        return None;
                    };
                    let moved = match &advance {
                        Advance::Continue(key) => cursor.continue_key(key.as_ref()),
                        Advance::Skip(count) => cursor.advance(*count),
                    };
                    trace!(?advance, ok = moved.is_ok(), "cursor moved");
                    if let Err(error) = moved {
                        return Some(StreamEvent::Error(error.into()));
                    }
                }
                let Some(record) = cursor.record() else {
                    return Some(StreamEvent::Complete);
                };
                let value = match from_value::<T>(&record.value) {
                    Ok(value) => value,
                    Err(error) => return Some(StreamEvent::Error(error.into())),
                };
                let delivered = Cursor {
                    key: record.key.clone(),
                    primary_key: record.primary_key.clone(),
                    value,
                    direction: self.direction,
                    pending: Arc::clone(&self.pending),
                };
                self.state = StreamState::Live {
                    cursor,
                    delivered: true,
                };
                Some(StreamEvent::Next(delivered))
            }
        }
    }

    /// Whether the stream waits for the caller to move the cursor.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        matches!(self.state, StreamState::Live { delivered: true, .. })
            && self.pending.lock().is_none()
    }

    /// Whether a terminal notification was delivered.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, StreamState::Finished)
    }

    /// Pushes notifications to the callbacks until the stream stalls or
    /// finishes. Returns whether it finished.
    ///
    /// `on_next` decides whether to continue; if it does not, the call
    /// returns and a later `subscribe` picks up where this one stopped.
    pub fn subscribe(
        &mut self,
        mut on_next: impl FnMut(Cursor<T>),
        on_error: impl FnOnce(CoreError),
        on_complete: impl FnOnce(),
    ) -> bool {
        loop {
            match self.poll_next() {
                Some(StreamEvent::Next(cursor)) => on_next(cursor),
                Some(StreamEvent::Error(error)) => {
                    on_error(error);
                    return true;
                }
                Some(StreamEvent::Complete) => {
                    on_complete();
                    return true;
                }
                None => return self.is_finished(),
            }
        }
    }
}

impl<T: DeserializeOwned> Iterator for CursorStream<T> {
    type Item = CoreResult<Cursor<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.poll_next()? {
            StreamEvent::Next(cursor) => Some(Ok(cursor)),
            StreamEvent::Error(error) => Some(Err(error)),
            StreamEvent::Complete => None,
        }
    }
}

impl<T> fmt::Debug for CursorStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            StreamState::Live {
                delivered: false, ..
            } => "opened",
            StreamState::Live { .. } => "delivered",
            StreamState::Failed(_) => "failed",
            StreamState::Finished => "finished",
        };
        f.debug_struct("CursorStream")
            .field("state", &state)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

/// A delivered cursor position.
///
/// Moving the cursor does not return the next record; the stream that
/// delivered this cursor produces it on its next poll.
pub struct Cursor<T> {
    key: Key,
    primary_key: Key,
    value: T,
    direction: CursorDirection,
    pending: Pending,
}

impl<T> Cursor<T> {
    /// The current record.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Takes the current record.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Key in traversal order (the index key for index cursors).
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Primary key of the current record.
    pub fn primary_key(&self) -> &Key {
        &self.primary_key
    }

    /// Moves to the next position.
    ///
    /// # Errors
    ///
    /// Fails with an engine `InvalidState` error while a previous move is
    /// still pending.
    pub fn continue_(&self) -> CoreResult<()> {
        self.request(Advance::Continue(None))
    }

    /// Moves to the first position at or past `key` in traversal order.
    ///
    /// # Errors
    ///
    /// Fails with an engine `Data` error if `key` is not ahead of the current
    /// key, and with `InvalidState` while a previous move is pending.
    pub fn continue_to(&self, key: impl Into<Key>) -> CoreResult<()> {
        let key = key.into();
        let ahead = if self.direction.is_reverse() {
            key < self.key
        } else {
            key > self.key
        };
        if !ahead {
            return Err(EngineError::data(format!(
                "continue key {key} is not past the current key {}",
                self.key
            ))
            .into());
        }
        self.request(Advance::Continue(Some(key)))
    }

    /// Skips `count` positions.
    ///
    /// # Errors
    ///
    /// Fails with an engine `Data` error for a zero count, and with
    /// `InvalidState` while a previous move is pending.
    pub fn advance(&self, count: u32) -> CoreResult<()> {
        if count == 0 {
            return Err(EngineError::data("advance count must be greater than zero").into());
        }
        self.request(Advance::Skip(count))
    }

    fn request(&self, advance: Advance) -> CoreResult<()> {
        let mut pending = self.pending.lock();
        if pending.is_some() {
            return Err(EngineError::invalid_state("cursor is already moving").into());
        }
        *pending = Some(advance);
        Ok(())
    }
}

impl<T: fmt::Debug> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("key", &self.key)
            .field("primary_key", &self.primary_key)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
