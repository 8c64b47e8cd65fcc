//! Live counter shared by both sequence implementations.

use std::sync::{Mutex, MutexGuard};

use crate::sequence::Implementation;

#[derive(Debug)]
struct State {
    implementation: Implementation,
    next: i64,
}

/// Live counter of a sequence or date range.
///
/// One counter lives as long as its sequence or range. Switching the
/// implementation or resetting the value happens under the same lock as the
/// draws, so a draw can never act on a stale copy.
#[derive(Debug)]
pub struct Counter {
    state: Mutex<State>,
}

impl Counter {
    pub fn new(implementation: Implementation, next: i64) -> Self {
        Counter {
            state: Mutex::new(State {
                implementation,
                next,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn implementation(&self) -> Implementation {
        self.lock().implementation
    }

    /// Next value that will be handed out.
    pub fn peek(&self) -> i64 {
        self.lock().next
    }

    pub fn reset(&self, next: i64) {
        self.lock().next = next;
    }

    /// Change the implementation in place; the current value carries over.
    ///
    /// Waits for an in-flight `NoGap` draw to finish.
    pub fn switch_to(&self, implementation: Implementation) {
        self.lock().implementation = implementation;
    }

    /// Draw one value and advance by `increment`.
    pub fn draw(&self, increment: i64) -> i64 {
        match self.draw_with(increment, Ok::<i64, std::convert::Infallible>) {
            Ok(n) => n,
            Err(never) => match never {},
        }
    }

    /// Draw one value and hand it to `use_number`.
    ///
    /// `Standard` advances and releases the lock before calling
    /// `use_number`, so a failing caller leaves a gap. `NoGap` holds the lock
    /// for the duration of the call and only advances when it succeeds.
    pub fn draw_with<T, E, F>(&self, increment: i64, use_number: F) -> Result<T, E>
    where
        F: FnOnce(i64) -> Result<T, E>,
    {
        let mut state = self.lock();
        let value = state.next;
        match state.implementation {
            Implementation::Standard => {
                state.next = value + increment;
                drop(state);
                use_number(value)
            }
            Implementation::NoGap => {
                let out = use_number(value)?;
                state.next = value + increment;
                Ok(out)
            }
        }
    }
}
