//! The queue: two rings coordinated by four atomic cursors.
//!
//! Layout:
//! - `meta`: `N` atomic words, one per slot, packing `(begin, size, state,
//!   round)`.
//! - `data`: `B` payload bytes, written and read with wrap-around.
//! - Cursor quartet: `nil_begin`/`nil_end` bound the producers' free window,
//!   `val_begin`/`val_end` the consumers' published window. Each cursor is a
//!   packed slider position; the producer-side sliders track the byte axis
//!   alongside the slot axis.
//!
//! Protocol:
//! - A winning CAS on `nil_begin` (resp. `val_begin`) transfers exclusive
//!   write rights for one slot plus its byte range to the winner. Slot words
//!   themselves are never CASed; owners publish with a release store.
//! - `nil_end` and `val_end` are advisory bounds maintained collaboratively:
//!   before each reservation attempt a thread runs slide-forward, which walks
//!   slots that have completed their half-transition (matching state and
//!   round parity) and CASes the end cursor past them. Losing that CAS means
//!   another thread already published newer progress; no retry is needed.
//! - Producers publish `state = VAL` with the slot's round bit flipped;
//!   consumers release with `state = NIL` keeping `begin`/`size`/`round`
//!   intact, which is exactly what the producer-side slide needs to recover
//!   the freed byte extent.

use std::cell::UnsafeCell;
use std::ops::Deref;
use std::ptr;
use std::sync::atomic::Ordering;

use crate::meta::{MetaInfo, NilSlider, Slider, State, ValSlider};
use crate::word::{AtomicWord, Word};
use crate::{PopError, PushError};

// ============================================================================
// Cache-line padding
// ============================================================================

/// Cache-line padded wrapper for avoiding false sharing.
#[repr(C, align(64))]
struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Bounded lock-free MPMC queue of variable-length byte payloads.
///
/// `N` is the slot capacity and `B` the payload byte capacity; both must be
/// powers of two. `W` is the atomic word carrying cursors and slot metadata;
/// a configuration whose bit-fields do not fit `W` fails to compile.
pub struct Queue<W: Word, const N: usize, const B: usize> {
    /// Cap on helper iterations per slide-forward call.
    slide_limit: usize,
    /// Slot metadata ring.
    meta: Box<[W::Atomic]>,
    /// Payload byte ring. Ranges are handed out by `nil_begin` CAS wins, so
    /// concurrent accesses never overlap.
    data: Box<[UnsafeCell<u8>]>,

    nil_begin: CachePadded<W::Atomic>,
    nil_end: CachePadded<W::Atomic>,
    val_begin: CachePadded<W::Atomic>,
    val_end: CachePadded<W::Atomic>,
}

// SAFETY: all shared state is either atomic or handed out exclusively via
// cursor CAS wins; the payload ring is only touched by the owner of the
// corresponding reservation or claim.
unsafe impl<W: Word, const N: usize, const B: usize> Send for Queue<W, N, B> {}
unsafe impl<W: Word, const N: usize, const B: usize> Sync for Queue<W, N, B> {}

impl<W: Word, const N: usize, const B: usize> Queue<W, N, B> {
    const LAYOUT_OK: () = {
        assert!(
            N != 0 && (N & (N - 1)) == 0,
            "slot capacity must be a power of two"
        );
        assert!(
            B != 0 && (B & (B - 1)) == 0,
            "payload capacity must be a power of two"
        );
        assert!(
            W::BITS <= usize::BITS,
            "atomic word is wider than the platform word"
        );
        let data_bits = B.trailing_zeros() + 1;
        let meta_bits = N.trailing_zeros() + 1;
        // begin/size/state/round must share one word...
        assert!(
            data_bits + 2 < W::BITS,
            "payload capacity leaves no room for a size field"
        );
        // ...and the producer cursor needs both indices with wrap bits.
        assert!(
            meta_bits <= W::BITS - data_bits,
            "cursor fields do not fit the atomic word"
        );
    };

    /// Largest payload size accepted by [`Self::try_push`]: `B` or the
    /// maximum the metadata size field can carry, whichever is smaller.
    pub const MAX_SIZE: usize = {
        // Standalone uses of MAX_SIZE must also trip the layout checks.
        let _ = Self::LAYOUT_OK;
        let size_bits = MetaInfo::<W, B>::SIZE_BITS;
        if size_bits as usize >= usize::BITS as usize {
            B
        } else {
            let bitwise = (1usize << size_bits) - 1;
            if B < bitwise {
                B
            } else {
                bitwise
            }
        }
    };

    /// Creates a queue with unbounded slide-forward helping.
    pub fn new() -> Self {
        Self::with_slide_limit(usize::MAX)
    }

    /// Creates a queue capping each slide-forward call at `slide_limit`
    /// helper steps, bounding worst-case per-operation latency.
    pub fn with_slide_limit(slide_limit: usize) -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::LAYOUT_OK;

        let meta = (0..N)
            .map(|_| W::Atomic::new(W::ZERO))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let data = (0..B)
            .map(|_| UnsafeCell::new(0u8))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        // Producers may roam one full lap ahead of the (empty) consumer
        // window: the free extent starts as all N slots and all B bytes.
        let free_end = NilSlider::<W, N, B> {
            meta_idx: W::from_usize(N),
            data_idx: W::from_usize(B),
        };

        Self {
            slide_limit,
            meta,
            data,
            nil_begin: CachePadded::new(W::Atomic::new(W::ZERO)),
            nil_end: CachePadded::new(W::Atomic::new(free_end.pack())),
            val_begin: CachePadded::new(W::Atomic::new(W::ZERO)),
            val_end: CachePadded::new(W::Atomic::new(W::ZERO)),
        }
    }

    /// Number of element slots (`N`).
    pub const fn slot_capacity(&self) -> usize {
        N
    }

    /// Payload ring size in bytes (`B`).
    pub const fn data_capacity(&self) -> usize {
        B
    }

    // ------------------------------------------------------------------------
    // Cursor plumbing
    // ------------------------------------------------------------------------

    fn load_cursor<S: Slider<W, B>>(cursor: &W::Atomic) -> S {
        S::unpack(cursor.load(Ordering::Acquire))
    }

    /// On failure returns the observed value; the caller continues from
    /// what it saw.
    fn cas_cursor<S: Slider<W, B>>(cursor: &W::Atomic, expected: S, desired: S) -> Result<(), S> {
        match cursor.compare_exchange(
            expected.pack(),
            desired.pack(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(observed) => Err(S::unpack(observed)),
        }
    }

    fn load_meta(&self, meta_idx: W) -> MetaInfo<W, B> {
        MetaInfo::unpack(self.meta[meta_idx.as_usize() & (N - 1)].load(Ordering::Acquire))
    }

    fn store_meta(&self, meta_idx: W, meta: MetaInfo<W, B>) {
        self.meta[meta_idx.as_usize() & (N - 1)].store(meta.pack(), Ordering::Release)
    }

    /// Advances an end cursor past slots that have completed their
    /// half-transition: state matches the side's target and the round parity
    /// matches the lap the cursor is on. Any thread may publish this
    /// progress; a lost CAS just means someone else already did.
    fn slide_forward<S: Slider<W, B>>(&self, cursor: &W::Atomic) -> S {
        let expected: S = Self::load_cursor(cursor);
        let mut desired = expected;

        for _ in 0..self.slide_limit {
            let first_lap = desired.meta_idx() & W::from_usize(N) == W::ZERO;
            let want_round = (S::TARGET == State::Val) == first_lap;
            let m = self.load_meta(desired.meta_idx());
            if m.state != S::TARGET || m.round != want_round {
                break;
            }
            desired.shift(m);
        }

        if desired == expected {
            return desired;
        }
        match Self::cas_cursor(cursor, expected, desired) {
            Ok(()) => desired,
            Err(observed) => observed,
        }
    }

    // ------------------------------------------------------------------------
    // Producer
    // ------------------------------------------------------------------------

    /// Publishes one element, copying `src` into the payload ring.
    ///
    /// Fails with [`PushError::Full`] when fewer than `src.len()` bytes (or
    /// no slot) are free; that is benign back-pressure, retry later. Fails
    /// with [`PushError::BadSize`] when `src` is empty or longer than
    /// [`Self::MAX_SIZE`].
    pub fn try_push(&self, src: &[u8]) -> Result<(), PushError> {
        let size = src.len();
        if size == 0 || size > Self::MAX_SIZE {
            return Err(PushError::BadSize {
                size,
                max: Self::MAX_SIZE,
            });
        }
        let size_w = W::from_usize(size);

        let mut cur: NilSlider<W, N, B> = Self::load_cursor(&self.nil_begin);
        let mut end: NilSlider<W, N, B> = self.slide_forward(&self.nil_end);
        loop {
            // The last byte of the element must still be inside the free
            // window on both axes.
            let last = NilSlider::<W, N, B> {
                meta_idx: cur.meta_idx,
                data_idx: cur.data_idx.wrapping_add(size_w).wrapping_sub(W::ONE),
            };
            if !last.less_than(end) {
                return Err(PushError::Full);
            }
            let next = NilSlider::<W, N, B> {
                meta_idx: cur.meta_idx.wrapping_add(W::ONE),
                data_idx: cur.data_idx.wrapping_add(size_w),
            };
            match Self::cas_cursor(&self.nil_begin, cur, next) {
                Ok(()) => break,
                Err(observed) => {
                    cur = observed;
                    end = Self::load_cursor(&self.nil_end);
                }
            }
        }

        // The CAS win makes this thread the sole owner of the slot and of
        // the byte range [cur.data_idx, cur.data_idx + size).
        let m = self.load_meta(cur.meta_idx);
        assert!(
            m.state == State::Nil,
            "reserved slot {} still occupied",
            cur.meta_idx.as_usize() & (N - 1)
        );

        self.write_payload(cur.data_idx.as_usize() & (B - 1), src);

        // Publishing flips the slot's round bit: on even laps of the slot
        // ring the high wrap bit of meta_idx is clear, so the round is set,
        // and vice versa. Slide-forward uses this to ignore stale VAL
        // entries from the previous generation.
        self.store_meta(
            cur.meta_idx,
            MetaInfo {
                begin: cur.data_idx,
                size: size_w,
                state: State::Val,
                round: cur.meta_idx & W::from_usize(N) == W::ZERO,
            },
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Consumer
    // ------------------------------------------------------------------------

    /// Consumes one element into `dst`, returning its size.
    ///
    /// Fails with [`PopError::Empty`] when nothing is ready. Fails with
    /// [`PopError::Undersized`] when `dst` cannot hold the element at the
    /// head; the capacity check happens before the claim, so the element
    /// stays in the queue and the call may be retried with a larger buffer.
    pub fn try_pop(&self, dst: &mut [u8]) -> Result<usize, PopError> {
        let mut cur: ValSlider<W, N> = Self::load_cursor(&self.val_begin);
        let mut end: ValSlider<W, N> = self.slide_forward(&self.val_end);
        loop {
            if !cur.less_than(end) {
                return Err(PopError::Empty);
            }

            // Peek the candidate's size before claiming it. While
            // `val_begin` still points at the slot no consumer has claimed
            // it, so its published metadata cannot change; a successful
            // claim CAS below proves the peek was current.
            let m = self.load_meta(cur.meta_idx);
            if m.state == State::Val && m.size.as_usize() > dst.len() {
                if Self::load_cursor::<ValSlider<W, N>>(&self.val_begin) == cur {
                    return Err(PopError::Undersized {
                        size: m.size.as_usize(),
                        capacity: dst.len(),
                    });
                }
                // Someone claimed it first; the head is a different element.
                cur = Self::load_cursor(&self.val_begin);
                end = Self::load_cursor(&self.val_end);
                continue;
            }

            let next = ValSlider::<W, N> {
                meta_idx: cur.meta_idx.wrapping_add(W::ONE),
            };
            match Self::cas_cursor(&self.val_begin, cur, next) {
                Ok(()) => return Ok(self.consume(cur.meta_idx, dst)),
                Err(observed) => {
                    cur = observed;
                    end = Self::load_cursor(&self.val_end);
                }
            }
        }
    }

    /// Claims every currently-ready element in one CAS.
    ///
    /// The returned handle is owned by this consumer and must not be shared
    /// across threads. An empty handle is returned when nothing is ready.
    pub fn pop_bulk(&self) -> Bulk<'_, W, N, B> {
        let mut cur: ValSlider<W, N> = Self::load_cursor(&self.val_begin);
        let mut end: ValSlider<W, N> = self.slide_forward(&self.val_end);
        loop {
            if !cur.less_than(end) {
                return Bulk {
                    queue: self,
                    cur: cur.meta_idx,
                    end: cur.meta_idx,
                };
            }
            match Self::cas_cursor(&self.val_begin, cur, end) {
                Ok(()) => {
                    return Bulk {
                        queue: self,
                        cur: cur.meta_idx,
                        end: end.meta_idx,
                    }
                }
                Err(observed) => {
                    cur = observed;
                    end = Self::load_cursor(&self.val_end);
                }
            }
        }
    }

    /// Reads out a claimed slot and releases it. The release keeps
    /// `begin`/`size`/`round` so the producer-side slide can recover the
    /// freed byte extent; only the state flips.
    fn consume(&self, meta_idx: W, dst: &mut [u8]) -> usize {
        let mut m = self.load_meta(meta_idx);
        assert!(
            m.state == State::Val,
            "claimed slot {} holds no element",
            meta_idx.as_usize() & (N - 1)
        );
        let size = m.size.as_usize();
        debug_assert!(size <= dst.len());

        self.read_payload(m.begin.as_usize() & (B - 1), &mut dst[..size]);

        m.state = State::Nil;
        self.store_meta(meta_idx, m);
        size
    }

    // ------------------------------------------------------------------------
    // Wrap-aware payload copy
    // ------------------------------------------------------------------------

    fn write_payload(&self, at: usize, src: &[u8]) {
        let head = src.len().min(B - at);
        let base = self.data.as_ptr() as *mut u8;
        // SAFETY: the `nil_begin` CAS granted this producer exclusive access
        // to `src.len()` bytes starting at `at` (modulo B); no other thread
        // touches them until the slot metadata is published.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), base.add(at), head);
            ptr::copy_nonoverlapping(src.as_ptr().add(head), base, src.len() - head);
        }
    }

    fn read_payload(&self, at: usize, dst: &mut [u8]) {
        let head = dst.len().min(B - at);
        let base = self.data.as_ptr() as *const u8;
        // SAFETY: the `val_begin` CAS granted this consumer exclusive access
        // to the claimed element's bytes; producers cannot reuse them until
        // the slot is released.
        unsafe {
            ptr::copy_nonoverlapping(base.add(at), dst.as_mut_ptr(), head);
            ptr::copy_nonoverlapping(base, dst.as_mut_ptr().add(head), dst.len() - head);
        }
    }
}

impl<W: Word, const N: usize, const B: usize> Default for Queue<W, N, B> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Bulk handle
// ============================================================================

/// A batch of elements claimed from the queue by [`Queue::pop_bulk`].
///
/// Elements are drained one at a time with [`Bulk::pop`]. Dropping a handle
/// that still holds elements releases their slots back to the queue and
/// discards the payloads, so an abandoned handle cannot wedge producers.
pub struct Bulk<'a, W: Word, const N: usize, const B: usize> {
    queue: &'a Queue<W, N, B>,
    cur: W,
    end: W,
}

impl<W: Word, const N: usize, const B: usize> Bulk<'_, W, N, B> {
    pub fn is_empty(&self) -> bool {
        self.cur == self.end
    }

    /// Elements left in the batch.
    pub fn len(&self) -> usize {
        self.end.wrapping_sub(self.cur).as_usize() & (2 * N - 1)
    }

    /// Drains one element from the batch into `dst`, returning its size.
    ///
    /// Fails with [`PopError::Empty`] once the batch is drained, and with
    /// [`PopError::Undersized`] when `dst` is too small for the next
    /// element. The handle does not advance, so the call may be retried
    /// with a larger buffer.
    pub fn pop(&mut self, dst: &mut [u8]) -> Result<usize, PopError> {
        if self.cur == self.end {
            return Err(PopError::Empty);
        }
        let m = self.queue.load_meta(self.cur);
        if m.size.as_usize() > dst.len() {
            return Err(PopError::Undersized {
                size: m.size.as_usize(),
                capacity: dst.len(),
            });
        }
        let size = self.queue.consume(self.cur, dst);
        self.cur = self.cur.wrapping_add(W::ONE);
        Ok(size)
    }
}

impl<W: Word, const N: usize, const B: usize> Drop for Bulk<'_, W, N, B> {
    fn drop(&mut self) {
        // Release whatever was claimed but never drained, keeping each
        // slot's begin/size/round for the producer-side slide.
        while self.cur != self.end {
            let mut m = self.queue.load_meta(self.cur);
            m.state = State::Nil;
            self.queue.store_meta(self.cur, m);
            self.cur = self.cur.wrapping_add(W::ONE);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn empty_pop() {
        let queue: Queue<u64, 4, 64> = Queue::new();
        let mut buf = [0u8; 64];
        assert_eq!(queue.try_pop(&mut buf), Err(PopError::Empty));
    }

    #[test]
    fn reports_capacities() {
        let queue: Queue<u64, 4, 64> = Queue::new();
        assert_eq!(queue.slot_capacity(), 4);
        assert_eq!(queue.data_capacity(), 64);

        let tiny: Queue<u8, 4, 8> = Queue::new();
        assert_eq!(tiny.slot_capacity(), 4);
        assert_eq!(tiny.data_capacity(), 8);
    }

    #[test]
    fn push_pop_round_trip() {
        let queue: Queue<u64, 4, 64> = Queue::new();
        queue.try_push(b"hello").unwrap();
        queue.try_push(b"world!").unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(queue.try_pop(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(queue.try_pop(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"world!");
        assert_eq!(queue.try_pop(&mut buf), Err(PopError::Empty));
    }

    #[test]
    fn rejects_zero_and_oversize() {
        let queue: Queue<u64, 4, 64> = Queue::new();
        assert_eq!(
            queue.try_push(b""),
            Err(PushError::BadSize { size: 0, max: 64 })
        );
        let big = [0u8; 65];
        assert_eq!(
            queue.try_push(&big),
            Err(PushError::BadSize { size: 65, max: 64 })
        );
    }

    #[test]
    fn fills_slot_ring_then_full() {
        let queue: Queue<u64, 4, 64> = Queue::new();
        for _ in 0..4 {
            queue.try_push(b"x").unwrap();
        }
        assert_eq!(queue.try_push(b"x"), Err(PushError::Full));

        let mut buf = [0u8; 64];
        queue.try_pop(&mut buf).unwrap();
        queue.try_push(b"x").unwrap();
    }

    #[test]
    fn fills_byte_ring_then_full() {
        let queue: Queue<u64, 8, 8> = Queue::new();
        assert_eq!(Queue::<u64, 8, 8>::MAX_SIZE, 8);
        queue.try_push(b"12345678").unwrap();
        assert_eq!(queue.try_push(b"x"), Err(PushError::Full));

        let mut buf = [0u8; 8];
        assert_eq!(queue.try_pop(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"12345678");
        queue.try_push(b"x").unwrap();
    }

    #[test]
    fn wrap_split_recovered() {
        let queue: Queue<u64, 4, 8> = Queue::new();
        let mut buf = [0u8; 8];

        queue.try_push(b"abcde").unwrap();
        assert_eq!(queue.try_pop(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"abcde");

        // bytes 5..11 straddle the end of the 8-byte ring
        queue.try_push(b"fghijk").unwrap();
        assert_eq!(queue.try_pop(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"fghijk");
    }

    #[test]
    fn round_parity_across_laps() {
        let queue: Queue<u64, 4, 16> = Queue::new();
        let mut buf = [0u8; 16];
        // 16 single-byte elements cross the slot ring four times
        for lap in 0u8..16 {
            queue.try_push(&[lap]).unwrap();
            assert_eq!(queue.try_pop(&mut buf).unwrap(), 1);
            assert_eq!(buf[0], lap);
        }
    }

    #[test]
    fn max_size_then_min_size() {
        let queue: Queue<u64, 4, 64> = Queue::new();
        let pattern: Vec<u8> = (0..64).map(|i| i as u8).collect();
        queue.try_push(&pattern).unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(queue.try_pop(&mut buf).unwrap(), 64);
        assert_eq!(&buf[..], &pattern[..]);

        queue.try_push(b"z").unwrap();
        assert_eq!(queue.try_pop(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'z');
    }

    #[test]
    fn undersized_pop_leaves_element() {
        let queue: Queue<u64, 4, 64> = Queue::new();
        queue.try_push(b"hello").unwrap();

        let mut small = [0u8; 3];
        assert_eq!(
            queue.try_pop(&mut small),
            Err(PopError::Undersized {
                size: 5,
                capacity: 3
            })
        );

        let mut buf = [0u8; 64];
        assert_eq!(queue.try_pop(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn bulk_claims_batch() {
        let queue: Queue<u64, 8, 64> = Queue::new();
        for word in [&b"one"[..], &b"two"[..], &b"three"[..]] {
            queue.try_push(word).unwrap();
        }

        let mut bulk = queue.pop_bulk();
        assert_eq!(bulk.len(), 3);

        let mut buf = [0u8; 64];
        assert_eq!(bulk.pop(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"one");
        assert_eq!(bulk.pop(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"two");
        assert_eq!(bulk.pop(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"three");
        assert!(bulk.is_empty());
        assert_eq!(bulk.pop(&mut buf), Err(PopError::Empty));
        drop(bulk);

        assert!(queue.pop_bulk().is_empty());
    }

    #[test]
    fn bulk_undersized_is_retryable() {
        let queue: Queue<u64, 4, 64> = Queue::new();
        queue.try_push(b"hello").unwrap();

        let mut bulk = queue.pop_bulk();
        let mut small = [0u8; 3];
        assert_eq!(
            bulk.pop(&mut small),
            Err(PopError::Undersized {
                size: 5,
                capacity: 3
            })
        );
        let mut buf = [0u8; 64];
        assert_eq!(bulk.pop(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn dropped_bulk_releases_slots() {
        let queue: Queue<u64, 4, 64> = Queue::new();
        for _ in 0..4 {
            queue.try_push(b"abcd").unwrap();
        }
        assert_eq!(queue.try_push(b"x"), Err(PushError::Full));

        let bulk = queue.pop_bulk();
        assert_eq!(bulk.len(), 4);
        drop(bulk);

        // All four slots and their bytes are free again.
        for _ in 0..4 {
            queue.try_push(b"efgh").unwrap();
        }
        let mut buf = [0u8; 64];
        assert_eq!(queue.try_pop(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"efgh");
    }

    #[test]
    fn minimum_width_word() {
        // (N, B, W) = (4, 8, u8): size field is 2 bits, MAX_SIZE = 3
        let queue: Queue<u8, 4, 8> = Queue::new();
        assert_eq!(Queue::<u8, 4, 8>::MAX_SIZE, 3);
        assert_eq!(
            queue.try_push(b"abcd"),
            Err(PushError::BadSize { size: 4, max: 3 })
        );

        let mut buf = [0u8; 3];
        for round in 0..32u8 {
            queue.try_push(&[round, round ^ 0xFF]).unwrap();
            queue.try_push(&[round]).unwrap();
            assert_eq!(queue.try_pop(&mut buf).unwrap(), 2);
            assert_eq!(&buf[..2], &[round, round ^ 0xFF]);
            assert_eq!(queue.try_pop(&mut buf).unwrap(), 1);
            assert_eq!(buf[0], round);
        }
    }

    #[test]
    fn bounded_slide_still_progresses() {
        let queue: Queue<u64, 4, 32> = Queue::with_slide_limit(1);
        let mut buf = [0u8; 32];
        for i in 0..64u8 {
            let payload = [i, i, i];
            loop {
                match queue.try_push(&payload) {
                    Ok(()) => break,
                    Err(PushError::Full) => continue,
                    Err(e) => panic!("unexpected push error: {e}"),
                }
            }
            loop {
                match queue.try_pop(&mut buf) {
                    Ok(n) => {
                        assert_eq!(&buf[..n], &payload);
                        break;
                    }
                    Err(PopError::Empty) => continue,
                    Err(e) => panic!("unexpected pop error: {e}"),
                }
            }
        }
    }
}

#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn loom_two_producers_conserve() {
        loom::model(|| {
            let queue: Arc<Queue<u8, 2, 4>> = Arc::new(Queue::new());
            let handles: Vec<_> = [1u8, 2]
                .into_iter()
                .map(|tag| {
                    let q = Arc::clone(&queue);
                    thread::spawn(move || {
                        while q.try_push(&[tag]).is_err() {
                            thread::yield_now();
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            let mut seen = Vec::new();
            let mut buf = [0u8; 4];
            while let Ok(n) = queue.try_pop(&mut buf) {
                assert_eq!(n, 1);
                seen.push(buf[0]);
            }
            seen.sort_unstable();
            assert_eq!(seen, vec![1, 2]);
        });
    }

    #[test]
    fn loom_concurrent_push_pop_no_tearing() {
        loom::model(|| {
            let queue: Arc<Queue<u8, 2, 4>> = Arc::new(Queue::new());

            let q = Arc::clone(&queue);
            let producer = thread::spawn(move || {
                for payload in [[0xA5u8, 0x5A], [0x3C, 0xC3]] {
                    while q.try_push(&payload).is_err() {
                        thread::yield_now();
                    }
                }
            });

            let q = Arc::clone(&queue);
            let consumer = thread::spawn(move || {
                let mut got = Vec::new();
                let mut buf = [0u8; 4];
                for _ in 0..2 {
                    if let Ok(n) = q.try_pop(&mut buf) {
                        got.push(buf[..n].to_vec());
                    }
                }
                got
            });

            producer.join().unwrap();
            let mut got = consumer.join().unwrap();

            let mut buf = [0u8; 4];
            while let Ok(n) = queue.try_pop(&mut buf) {
                got.push(buf[..n].to_vec());
            }
            // FIFO and intact payloads regardless of interleaving
            assert_eq!(got, vec![vec![0xA5, 0x5A], vec![0x3C, 0xC3]]);
        });
    }

    #[test]
    fn loom_pop_races_push() {
        loom::model(|| {
            let queue: Arc<Queue<u8, 2, 4>> = Arc::new(Queue::new());

            let q = Arc::clone(&queue);
            let consumer = thread::spawn(move || {
                let mut buf = [0u8; 4];
                q.try_pop(&mut buf).ok().map(|n| buf[..n].to_vec())
            });

            queue.try_push(&[7]).unwrap();

            let popped = consumer.join().unwrap();
            match popped {
                Some(bytes) => assert_eq!(bytes, vec![7]),
                None => {
                    let mut buf = [0u8; 4];
                    assert_eq!(queue.try_pop(&mut buf).unwrap(), 1);
                    assert_eq!(buf[0], 7);
                }
            }
        });
    }
}
