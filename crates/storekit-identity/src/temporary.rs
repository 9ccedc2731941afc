//! Placeholder keys for unsaved entities.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};

use storekit_core::{GenerationError, GenerationErrorKind, Result};

use crate::generator::IdentityGenerator;

/// Integer key types that can carry a temporary value.
pub trait TemporaryValue: Copy + Send + Sync + 'static {
    /// Convert the generator's counter, failing if it does not fit.
    fn from_counter(counter: i64) -> Option<Self>;
}

impl TemporaryValue for i64 {
    fn from_counter(counter: i64) -> Option<Self> {
        Some(counter)
    }
}

impl TemporaryValue for i32 {
    fn from_counter(counter: i64) -> Option<Self> {
        i32::try_from(counter).ok()
    }
}

impl TemporaryValue for i16 {
    fn from_counter(counter: i64) -> Option<Self> {
        i16::try_from(counter).ok()
    }
}

/// Hands out `-1, -2, -3, ...` as placeholder keys.
///
/// Real keys are positive, so placeholders never collide with saved rows.
/// The counter is process-local and shared by every caller of one instance.
pub struct TemporaryIdentityGenerator<T> {
    last: AtomicI64,
    _value: PhantomData<fn() -> T>,
}

impl<T> TemporaryIdentityGenerator<T> {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
            _value: PhantomData,
        }
    }
}

impl<T> Default for TemporaryIdentityGenerator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TemporaryIdentityGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryIdentityGenerator")
            .field("last", &self.last.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: TemporaryValue> IdentityGenerator for TemporaryIdentityGenerator<T> {
    type Value = T;

    fn generates_temporary_values(&self) -> bool {
        true
    }

    fn next(&self) -> Result<T> {
        let exhausted = || {
            GenerationError::new(
                GenerationErrorKind::Exhausted,
                format!(
                    "temporary values for {} are exhausted",
                    std::any::type_name::<T>()
                ),
            )
        };

        // Never decrement past what T can hold, so an exhausted generator
        // keeps failing instead of wrapping.
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                let next = last.checked_sub(1)?;
                T::from_counter(next).map(|_| next)
            })
            .map_err(|_| exhausted())?;

        T::from_counter(previous - 1).ok_or_else(|| exhausted().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storekit_core::Error;

    #[test]
    fn test_counts_down_from_minus_one() {
        let generator = TemporaryIdentityGenerator::<i64>::new();
        assert_eq!(generator.next().unwrap(), -1);
        assert_eq!(generator.next().unwrap(), -2);
        assert_eq!(generator.next().unwrap(), -3);
        assert!(generator.generates_temporary_values());
    }

    #[test]
    fn test_instances_are_independent() {
        let a = TemporaryIdentityGenerator::<i32>::new();
        let b = TemporaryIdentityGenerator::<i32>::new();
        assert_eq!(a.next().unwrap(), -1);
        assert_eq!(a.next().unwrap(), -2);
        assert_eq!(b.next().unwrap(), -1);
    }

    #[test]
    fn test_exhaustion_is_sticky() {
        let generator = TemporaryIdentityGenerator::<i16>::new();
        generator
            .last
            .store(i64::from(i16::MIN) + 1, Ordering::SeqCst);

        assert_eq!(generator.next().unwrap(), i16::MIN);
        for _ in 0..2 {
            let err = generator.next().unwrap_err();
            assert!(matches!(
                err,
                Error::Generation(GenerationError {
                    kind: GenerationErrorKind::Exhausted,
                    ..
                })
            ));
        }
    }
}
