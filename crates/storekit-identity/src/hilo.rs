//! Hi-lo key allocation.
//!
//! A [`HiLoIdentityGenerator`] reserves a block of `block_size` consecutive
//! keys from a shared [`BlockSource`] (typically a database sequence that is
//! incremented by `block_size`) and hands them out locally, so only one round
//! trip is needed per block.
//!
//! ```text
//! source: 1 ──► block [1, 11)    hands out 1, 2, ... 10
//! source: 11 ─► block [11, 21)   hands out 11, 12, ... 20
//! ```

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::num::NonZeroU32;
use std::sync::{Mutex, MutexGuard, PoisonError};

use asupersync::{Cx, Outcome};
use storekit_core::{Error, GenerationError, GenerationErrorKind, Result};

use crate::generator::IdentityGenerator;

/// The shared source of key blocks.
pub trait BlockSource: Send + Sync {
    /// Reserve a new block and return its first value.
    fn next_block_start(&self) -> Result<i64>;

    /// Reserve a new block asynchronously.
    fn next_block_start_async(&self, cx: &Cx) -> impl Future<Output = Outcome<i64, Error>> + Send;
}

#[derive(Debug)]
struct Block {
    next: i64,
    end: i64,
}

impl Block {
    fn take(&mut self) -> Option<i64> {
        if self.next < self.end {
            let value = self.next;
            self.next += 1;
            Some(value)
        } else {
            None
        }
    }
}

/// Hands out keys from blocks reserved through a [`BlockSource`].
pub struct HiLoIdentityGenerator<S, T = i64> {
    source: S,
    block_size: NonZeroU32,
    block: Mutex<Block>,
    _value: PhantomData<fn() -> T>,
}

impl<S: BlockSource, T> HiLoIdentityGenerator<S, T> {
    /// Create a generator. No block is reserved until the first value is
    /// requested.
    pub fn new(source: S, block_size: NonZeroU32) -> Self {
        Self {
            source,
            block_size,
            block: Mutex::new(Block { next: 0, end: 0 }),
            _value: PhantomData,
        }
    }

    pub fn block_size(&self) -> NonZeroU32 {
        self.block_size
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn lock(&self) -> MutexGuard<'_, Block> {
        self.block.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a freshly reserved block, unless a concurrent caller already
    /// refilled the current one. In that case the new block is discarded;
    /// hi-lo tolerates gaps.
    fn install(&self, start: i64) -> Result<()> {
        let end = start
            .checked_add(i64::from(self.block_size.get()))
            .ok_or_else(|| {
                GenerationError::new(
                    GenerationErrorKind::Exhausted,
                    format!("hi-lo block starting at {start} overflows i64"),
                )
            })?;
        tracing::trace!(start, end, "Reserved hi-lo block");

        let mut block = self.lock();
        if block.next >= block.end {
            *block = Block { next: start, end };
        }
        Ok(())
    }
}

impl<S, T> HiLoIdentityGenerator<S, T>
where
    T: TryFrom<i64> + Send + 'static,
{
    fn convert(value: i64) -> Result<T> {
        T::try_from(value).map_err(|_| {
            GenerationError::new(
                GenerationErrorKind::Exhausted,
                format!(
                    "hi-lo value {value} does not fit in {}",
                    std::any::type_name::<T>()
                ),
            )
            .into()
        })
    }
}

impl<S, T> IdentityGenerator for HiLoIdentityGenerator<S, T>
where
    S: BlockSource,
    T: TryFrom<i64> + Send + 'static,
{
    type Value = T;

    fn next(&self) -> Result<T> {
        loop {
            if let Some(value) = self.lock().take() {
                return Self::convert(value);
            }
            tracing::trace!(block_size = self.block_size.get(), "Hi-lo block exhausted");
            let start = self.source.next_block_start()?;
            self.install(start)?;
        }
    }

    async fn next_async(&self, cx: &Cx) -> Outcome<T, Error> {
        loop {
            let taken = self.lock().take();
            if let Some(value) = taken {
                return match Self::convert(value) {
                    Ok(v) => Outcome::Ok(v),
                    Err(e) => Outcome::Err(e),
                };
            }

            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            tracing::trace!(block_size = self.block_size.get(), "Hi-lo block exhausted");

            let start = match self.source.next_block_start_async(cx).await {
                Outcome::Ok(start) => start,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            if let Err(e) = self.install(start) {
                return Outcome::Err(e);
            }
        }
    }
}

impl<S: fmt::Debug, T> fmt::Debug for HiLoIdentityGenerator<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HiLoIdentityGenerator")
            .field("source", &self.source)
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    /// A sequence incremented by `step` on every reservation.
    struct Sequence {
        next: AtomicI64,
        step: i64,
        fetches: AtomicUsize,
    }

    impl Sequence {
        fn new(start: i64, step: i64) -> Self {
            Self {
                next: AtomicI64::new(start),
                step,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl BlockSource for Sequence {
        fn next_block_start(&self) -> Result<i64> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.next.fetch_add(self.step, Ordering::SeqCst))
        }

        async fn next_block_start_async(&self, _cx: &Cx) -> Outcome<i64, Error> {
            match self.next_block_start() {
                Ok(v) => Outcome::Ok(v),
                Err(e) => Outcome::Err(e),
            }
        }
    }

    fn block(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn test_consecutive_values_within_block() {
        let generator: HiLoIdentityGenerator<_> =
            HiLoIdentityGenerator::new(Sequence::new(1, 3), block(3));

        let values: Vec<i64> = (0..7).map(|_| generator.next().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(generator.source().fetches.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gaps_when_source_is_shared() {
        let generator: HiLoIdentityGenerator<_> =
            HiLoIdentityGenerator::new(Sequence::new(100, 10), block(2));
        assert_eq!(generator.next().unwrap(), 100);
        assert_eq!(generator.next().unwrap(), 101);
        // Next block starts where the sequence is, not where the block ended.
        assert_eq!(generator.next().unwrap(), 110);
    }

    #[test]
    fn test_narrow_value_type() {
        let generator: HiLoIdentityGenerator<_, i32> =
            HiLoIdentityGenerator::new(Sequence::new(i64::from(i32::MAX), 1), block(1));
        assert_eq!(generator.next().unwrap(), i32::MAX);
        assert!(generator.next().is_err());
    }

    #[test]
    fn test_block_overflow_is_exhausted() {
        let generator: HiLoIdentityGenerator<_> =
            HiLoIdentityGenerator::new(Sequence::new(i64::MAX - 1, 0), block(5));
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
