// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Type-erased callbacks that can be handed to another thread.

use std::fmt;

/// Boxed invocable taking `A` and returning `R`.
///
/// The callback owns its target and any bound state; nothing it captures is
/// borrowed from the constructing scope, so it can move to a background
/// thread freely. Multiple call-time arguments are passed as a tuple.
///
/// `invoke` forwards to the target and hands back its result unchanged,
/// including `Result` values and panics.
pub struct ErasedCallback<A, R = ()> {
    target: Box<dyn FnMut(A) -> R + Send + 'static>,
}

impl<A, R> ErasedCallback<A, R> {
    /// Wrap a closure or function.
    pub fn new<F>(target: F) -> Self
    where
        F: FnMut(A) -> R + Send + 'static,
    {
        Self {
            target: Box::new(target),
        }
    }

    /// Wrap `target` together with pre-bound state. The state is moved into
    /// the callback and passed by mutable reference on every invocation.
    pub fn bind<B, F>(mut bound: B, mut target: F) -> Self
    where
        B: Send + 'static,
        F: FnMut(&mut B, A) -> R + Send + 'static,
    {
        Self::new(move |args| target(&mut bound, args))
    }

    /// Call the wrapped target.
    pub fn invoke(&mut self, args: A) -> R {
        (self.target)(args)
    }
}

impl<A, R, F> From<F> for ErasedCallback<A, R>
where
    F: FnMut(A) -> R + Send + 'static,
{
    fn from(target: F) -> Self {
        Self::new(target)
    }
}

impl<A, R> fmt::Debug for ErasedCallback<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedCallback").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn double(x: u32) -> u32 {
        x * 2
    }

    struct Counter {
        hits: u32,
    }

    impl Counter {
        fn record(&mut self, step: u32) -> u32 {
            self.hits += step;
            self.hits
        }
    }

    #[test]
    fn wraps_free_functions() {
        let mut cb = ErasedCallback::new(double);
        assert_eq!(cb.invoke(21), 42);
    }

    #[test]
    fn bound_state_is_owned_by_the_callback() {
        let mut cb = ErasedCallback::bind(Counter { hits: 0 }, Counter::record);
        assert_eq!(cb.invoke(2), 2);
        assert_eq!(cb.invoke(3), 5);
    }

    #[test]
    fn tuple_arguments_and_bound_prefix() {
        let mut cb: ErasedCallback<(i32, i32), i32> =
            ErasedCallback::bind(100, |base: &mut i32, (a, b)| *base + a * b);
        assert_eq!(cb.invoke((3, 4)), 112);
    }

    #[test]
    fn errors_pass_through_untouched() {
        let mut cb: ErasedCallback<u8, Result<u8, String>> = ErasedCallback::new(|x: u8| {
            x.checked_add(250).ok_or_else(|| "overflow".to_string())
        });
        assert_eq!(cb.invoke(5), Ok(255));
        assert_eq!(cb.invoke(6), Err("overflow".to_string()));
    }

    #[test]
    fn crosses_thread_boundaries() {
        let (tx, rx) = mpsc::channel();
        let mut cb: ErasedCallback<&'static str> = ErasedCallback::from(move |s: &'static str| {
            let _ = tx.send(s.len());
        });
        thread::spawn(move || cb.invoke("hello")).join().unwrap();
        assert_eq!(rx.recv().unwrap(), 5);
    }
}
