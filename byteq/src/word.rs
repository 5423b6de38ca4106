//! Machine-word abstraction for cursors and slot metadata.
//!
//! The queue packs all of its shared state into single atomic words so that
//! every transition is one aligned load, store, or CAS. The word width is a
//! type parameter: `u64` gives the most headroom for the packed bit-fields,
//! `u8` is enough for toy configurations and exercises every field boundary.

#[cfg(loom)]
use loom::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, AtomicU8};
#[cfg(not(loom))]
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, AtomicU8};

use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::sync::atomic::Ordering;

/// One atomic cell holding a [`Word`].
pub trait AtomicWord<W>: Send + Sync {
    fn new(value: W) -> Self;
    fn load(&self, order: Ordering) -> W;
    fn store(&self, value: W, order: Ordering);
    fn compare_exchange(
        &self,
        current: W,
        new: W,
        success: Ordering,
        failure: Ordering,
    ) -> Result<W, W>;
}

/// Unsigned integer usable as the queue's cursor/metadata word.
///
/// Implemented for `u8`, `u16`, `u32` and `u64`. All cursor arithmetic wraps
/// at `BITS`; the bit-field codec masks values down to their field widths, so
/// intermediate overflow is harmless.
pub trait Word:
    Copy
    + Eq
    + fmt::Debug
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + Send
    + Sync
    + 'static
{
    const BITS: u32;
    const ZERO: Self;
    const ONE: Self;
    const MAX: Self;

    type Atomic: AtomicWord<Self>;

    /// Truncating conversion; callers mask to the relevant field width.
    fn from_usize(value: usize) -> Self;
    fn as_usize(self) -> usize;
    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn shl(self, shift: u32) -> Self;
    fn shr(self, shift: u32) -> Self;
}

macro_rules! impl_word {
    ($($word:ty => $atomic:ident),+ $(,)?) => {$(
        impl AtomicWord<$word> for $atomic {
            fn new(value: $word) -> Self {
                $atomic::new(value)
            }

            #[inline]
            fn load(&self, order: Ordering) -> $word {
                $atomic::load(self, order)
            }

            #[inline]
            fn store(&self, value: $word, order: Ordering) {
                $atomic::store(self, value, order)
            }

            #[inline]
            fn compare_exchange(
                &self,
                current: $word,
                new: $word,
                success: Ordering,
                failure: Ordering,
            ) -> Result<$word, $word> {
                $atomic::compare_exchange(self, current, new, success, failure)
            }
        }

        impl Word for $word {
            const BITS: u32 = <$word>::BITS;
            const ZERO: Self = 0;
            const ONE: Self = 1;
            const MAX: Self = <$word>::MAX;

            type Atomic = $atomic;

            #[inline]
            fn from_usize(value: usize) -> Self {
                value as $word
            }

            #[inline]
            fn as_usize(self) -> usize {
                self as usize
            }

            #[inline]
            fn wrapping_add(self, rhs: Self) -> Self {
                <$word>::wrapping_add(self, rhs)
            }

            #[inline]
            fn wrapping_sub(self, rhs: Self) -> Self {
                <$word>::wrapping_sub(self, rhs)
            }

            #[inline]
            fn shl(self, shift: u32) -> Self {
                self << shift
            }

            #[inline]
            fn shr(self, shift: u32) -> Self {
                self >> shift
            }
        }
    )+}
}

impl_word! {
    u8 => AtomicU8,
    u16 => AtomicU16,
    u32 => AtomicU32,
    u64 => AtomicU64,
}
