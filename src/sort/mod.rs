//! External sort - buffered k-way merge over sorted runs
//!
//! Design: An engine moves through three phases.
//! 1. Feeding: items are appended to an in-memory buffer, which can be
//!    sorted in place or spilled to a child run.
//! 2. Flipped: the buffer has been flushed; no more feeding.
//! 3. Draining: `fetch`/`peek` hand out the globally least item, refilling
//!    the lookahead buffer from the child runs as it empties.
//!
//! Refill only ever takes, from each run, the buffered items that sort at
//! or below the smallest buffered tail across all runs (the endpost).
//! Nothing still unread in any run can sort below that.

mod reader;


pub use reader::{RunReader, VecRunReader};

use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::config::SortConfig;
use crate::errors::{fatal, ErrorKind};
use crate::logging::log_refill;
use crate::object::Obj;
use crate::runtime;

/// Shared total order over items
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

type SliceSizes = SmallVec<[usize; 8]>;

/// External sort engine over items of type `T`
pub struct SortExternal<T> {
    compare: Comparator<T>,
    buffer: Vec<Option<T>>,
    tick: usize,
    scratch: Vec<Option<T>>,
    runs: Vec<SortExternal<T>>,
    reader: Option<Box<dyn RunReader<T>>>,
    slice_sizes: SliceSizes,
    mem_thresh: usize,
    mem_consumed: usize,
    item_cost: fn(&T) -> usize,
    fetched: usize,
    flipped: bool,
    /// Set by the first peek, fetch or refill
    draining: bool,
}

fn inline_size<T>(_item: &T) -> usize {
    mem::size_of::<T>().max(1)
}

impl<T> SortExternal<T> {
    pub fn new<F>(compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        Self::with_comparator(Arc::new(compare))
    }

    /// Engine with the spill threshold of the initialized runtime, if any
    pub fn with_comparator(compare: Comparator<T>) -> Self {
        Self {
            compare,
            buffer: Vec::new(),
            tick: 0,
            scratch: Vec::new(),
            runs: Vec::new(),
            reader: None,
            slice_sizes: SliceSizes::new(),
            mem_thresh: runtime::config()
                .map_or_else(|| SortConfig::default().mem_thresh, |config| config.sort.mem_thresh),
            mem_consumed: 0,
            item_cost: inline_size::<T>,
            fetched: 0,
            flipped: false,
            draining: false,
        }
    }

    /// Leaf run over items already sorted by `compare`
    pub fn from_sorted(compare: Comparator<T>, items: Vec<T>) -> Self {
        debug_assert!(
            items.windows(2).all(|w| compare(&w[0], &w[1]) != Ordering::Greater),
            "from_sorted given unsorted items"
        );
        let mut run = Self::with_comparator(compare);
        run.buffer = items.into_iter().map(Some).collect();
        run.flipped = true;
        run
    }

    /// Leaf run that pulls its sorted items from `reader`
    pub fn from_reader<R>(compare: Comparator<T>, reader: R) -> Self
    where
        R: RunReader<T> + 'static,
    {
        let mut run = Self::with_comparator(compare);
        run.reader = Some(Box::new(reader));
        run.flipped = true;
        run
    }

    pub fn with_config(mut self, config: &SortConfig) -> Self {
        self.mem_thresh = config.mem_thresh;
        self
    }

    pub fn comparator(&self) -> Comparator<T> {
        Arc::clone(&self.compare)
    }

    /// Spill to a run once fed items account for `bytes`
    pub fn set_mem_thresh(&mut self, bytes: usize) {
        self.mem_thresh = bytes;
    }

    pub fn mem_thresh(&self) -> usize {
        self.mem_thresh
    }

    /// Per-item memory estimate used against the threshold
    pub fn set_item_cost(&mut self, cost: fn(&T) -> usize) {
        self.item_cost = cost;
    }

    /// Items buffered but not yet fetched
    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffer.len().saturating_sub(self.tick)
    }

    #[inline]
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    #[inline]
    pub fn num_runs(&self) -> usize {
        self.runs.len()
    }

    #[inline]
    pub fn is_flipped(&self) -> bool {
        self.flipped
    }

    #[inline]
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    // ========================================================================
    // Feeding
    // ========================================================================

    /// Append an item to the buffer
    pub fn feed(&mut self, item: T) {
        if self.fetched > 0 {
            fatal(ErrorKind::FeedAfterFetch {
                fetched: self.fetched,
            });
        }
        if self.flipped {
            fatal(ErrorKind::FeedAfterFlip);
        }

        if self.buffer.len() == self.buffer.capacity() {
            self.grow_buffer(oversize(self.buffer.len() + 1, mem::size_of::<Option<T>>()));
        }
        self.mem_consumed += (self.item_cost)(&item);
        self.buffer.push(Some(item));

        if self.mem_consumed >= self.mem_thresh {
            self.flush();
        }
    }

    /// Stable in-place sort of the buffer
    pub fn sort_buffer(&mut self) {
        if self.fetched > 0 || self.tick != 0 {
            fatal(ErrorKind::SortAfterFetch {
                fetched: self.fetched,
            });
        }
        let compare = &self.compare;
        self.buffer.sort_by(|a, b| compare_slots(compare, a, b));
    }

    /// Sort the buffer and move it into a new child run
    pub fn flush(&mut self) {
        if self.buffer_count() == 0 {
            self.clear_buffer();
            return;
        }
        self.sort_buffer();

        let mut run = Self::with_comparator(Arc::clone(&self.compare));
        run.buffer = mem::take(&mut self.buffer);
        run.item_cost = self.item_cost;
        run.flipped = true;
        self.clear_buffer();
        self.runs.push(run);
    }

    /// End the feeding phase
    pub fn flip(&mut self) {
        if self.flipped {
            return;
        }
        self.flush();
        self.flipped = true;
    }

    /// Register a child whose output is sorted by the same order
    pub fn add_run(&mut self, mut run: SortExternal<T>) {
        if self.draining {
            fatal(ErrorKind::AddRunAfterFetch {
                fetched: self.fetched,
            });
        }
        run.seal();
        self.runs.push(run);
    }

    /// Freeze a run about to be adopted by a parent
    fn seal(&mut self) {
        if self.flipped || self.fetched > 0 {
            return;
        }
        if self.runs.is_empty() && self.reader.is_none() {
            self.sort_buffer();
            self.flipped = true;
        } else {
            self.flip();
        }
    }

    // ========================================================================
    // Draining
    // ========================================================================

    /// Remove and return the least remaining item
    pub fn fetch(&mut self) -> Option<T> {
        self.prepare_read();
        if self.tick >= self.buffer.len() && self.refill() == 0 {
            return None;
        }
        let item = self.buffer[self.tick].take();
        self.tick += 1;
        self.fetched += 1;
        item
    }

    /// The least remaining item, without removing it
    pub fn peek(&mut self) -> Option<&T> {
        self.prepare_read();
        if self.tick >= self.buffer.len() && self.refill() == 0 {
            return None;
        }
        self.buffer[self.tick].as_ref()
    }

    /// Reading with child runs implies the feeding phase is over
    fn prepare_read(&mut self) {
        self.draining = true;
        if !self.flipped && !self.runs.is_empty() {
            self.flip();
        }
    }

    /// Replace the exhausted buffer with the next sorted batch
    ///
    /// Leaf runs ask their reader; engines with children merge them.
    /// Returns the number of items now buffered.
    pub fn refill(&mut self) -> usize {
        let remaining = self.buffer_count();
        if remaining > 0 {
            fatal(ErrorKind::RefillNotEmpty { remaining });
        }
        self.draining = true;
        self.clear_buffer();

        if let Some(reader) = self.reader.as_mut() {
            let mut batch = Vec::new();
            reader.refill(&mut batch);
            self.buffer.reserve(batch.len());
            self.buffer.extend(batch.into_iter().map(Some));
        } else if !self.runs.is_empty() {
            self.refill_buffer();
        }

        self.buffer_count()
    }

    /// Drop everything buffered
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.tick = 0;
        self.mem_consumed = 0;
    }

    /// Ensure room for at least `capacity` buffered items
    pub fn grow_buffer(&mut self, capacity: usize) {
        if capacity > self.buffer.capacity() {
            self.buffer.reserve_exact(capacity - self.buffer.len());
        }
    }

    /// Release spare memory here and in every child run
    pub fn shrink(&mut self) {
        if self.buffer_count() > 0 {
            self.buffer.drain(..self.tick);
            self.buffer.shrink_to_fit();
        } else {
            self.buffer = Vec::new();
        }
        self.tick = 0;
        self.scratch = Vec::new();
        self.slice_sizes = SliceSizes::new();

        for run in &mut self.runs {
            run.shrink();
        }
    }

    fn refill_buffer(&mut self) {
        // Drop runs with nothing left; order of the survivors is kept
        let mut i = 0;
        while i < self.runs.len() {
            let run = &mut self.runs[i];
            if run.buffer_count() > 0 || run.refill() > 0 {
                i += 1;
            } else {
                self.runs.remove(i);
            }
        }

        if self.runs.is_empty() {
            return;
        }
        let endpost = self.find_endpost();
        self.absorb_slices(endpost);
    }

    /// Index of the run whose last buffered item is smallest
    fn find_endpost(&self) -> usize {
        let mut endpost: Option<(usize, &T)> = None;
        for (i, run) in self.runs.iter().enumerate() {
            let candidate = run.last_buffered();
            match endpost {
                Some((_, current)) if (self.compare)(candidate, current) != Ordering::Less => {}
                _ => endpost = Some((i, candidate)),
            }
        }
        endpost.map_or(0, |(i, _)| i)
    }

    fn last_buffered(&self) -> &T {
        let max = self.buffer.len();
        if max < 1 || self.tick >= max {
            fatal(ErrorKind::InvalidRunBuffer {
                tick: self.tick,
                max,
                cap: self.buffer.capacity(),
            });
        }
        match &self.buffer[max - 1] {
            Some(item) => item,
            None => fatal(ErrorKind::InvalidRunBuffer {
                tick: self.tick,
                max,
                cap: self.buffer.capacity(),
            }),
        }
    }

    /// Count of buffered items at or below `endpost`
    fn slice_size(&self, endpost: &T, compare: &Comparator<T>) -> usize {
        self.buffer[self.tick..].partition_point(|slot| match slot {
            Some(item) => compare(item, endpost) != Ordering::Greater,
            None => true,
        })
    }

    /// Hand over the first `count` buffered items
    fn take_front(&mut self, count: usize) -> impl Iterator<Item = Option<T>> + '_ {
        let start = self.tick;
        self.tick += count;
        self.buffer[start..start + count]
            .iter_mut()
            .map(Option::take)
    }

    /// Move every run's slice into the buffer and merge them into one
    fn absorb_slices(&mut self, endpost_run: usize) {
        let mut sizes = mem::take(&mut self.slice_sizes);
        sizes.clear();
        {
            let endpost = self.runs[endpost_run].last_buffered();
            for run in &self.runs {
                sizes.push(run.slice_size(endpost, &self.compare));
            }
        }

        let total: usize = sizes.iter().sum();
        if self.buffer.capacity() < total {
            self.grow_buffer(oversize(total, mem::size_of::<Option<T>>()));
        }
        for (run, &size) in self.runs.iter_mut().zip(sizes.iter()) {
            if size > 0 {
                self.buffer.extend(run.take_front(size));
            }
        }
        sizes.retain(|size| *size > 0);
        let num_slices = sizes.len();

        if sizes.len() > 1 && self.scratch.capacity() < total {
            self.scratch.reserve_exact(total);
        }

        // Pairwise merge rounds, ping-ponging between buffer and scratch
        while sizes.len() > 1 {
            self.scratch.clear();
            let mut merged = SliceSizes::new();
            let mut start = 0;

            for pair in sizes.chunks(2) {
                match *pair {
                    [left, right] => {
                        merge_slices(
                            &self.compare,
                            &mut self.buffer[start..start + left + right],
                            left,
                            &mut self.scratch,
                        );
                        merged.push(left + right);
                        start += left + right;
                    }
                    [odd] => {
                        self.scratch
                            .extend(self.buffer[start..start + odd].iter_mut().map(Option::take));
                        merged.push(odd);
                        start += odd;
                    }
                    _ => {}
                }
            }

            sizes = merged;
            mem::swap(&mut self.buffer, &mut self.scratch);
        }
        self.scratch.clear();

        log_refill(self.runs.len(), num_slices, total);
        self.slice_sizes = sizes;
    }
}

/// Stable two-way merge of `region[..left_len]` and `region[left_len..]`
fn merge_slices<T>(
    compare: &Comparator<T>,
    region: &mut [Option<T>],
    left_len: usize,
    dest: &mut Vec<Option<T>>,
) {
    let (left, right) = region.split_at_mut(left_len);
    let (mut l, mut r) = (0, 0);

    while l < left.len() && r < right.len() {
        // Ties go left
        if compare_slots(compare, &left[l], &right[r]) != Ordering::Greater {
            dest.push(left[l].take());
            l += 1;
        } else {
            dest.push(right[r].take());
            r += 1;
        }
    }
    dest.extend(left[l..].iter_mut().map(Option::take));
    dest.extend(right[r..].iter_mut().map(Option::take));
}

/// Order live slots by the comparator; consumed slots sort last
#[inline]
fn compare_slots<T>(compare: &Comparator<T>, a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare(a, b),
        _ => a.is_none().cmp(&b.is_none()),
    }
}

/// Growth policy for item arrays: about 1/8 extra (at least 3), rounded
/// so small element widths fill whole words
pub fn oversize(minimum: usize, width: usize) -> usize {
    let extra = (minimum >> 3).max(3);
    let amount = match minimum.checked_add(extra + 7) {
        Some(_) => minimum + extra,
        None => return usize::MAX,
    };

    if mem::size_of::<usize>() == 8 {
        match width {
            1 => (amount + 7) & !7,
            2 => (amount + 3) & !3,
            4 => (amount + 1) & !1,
            _ => amount,
        }
    } else {
        match width {
            1 => (amount + 3) & !3,
            2 => (amount + 1) & !1,
            _ => amount,
        }
    }
}

impl<T> Iterator for SortExternal<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.fetch()
    }
}

impl<T> fmt::Debug for SortExternal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortExternal")
            .field("buffered", &self.buffer_count())
            .field("runs", &self.runs.len())
            .field("has_reader", &self.reader.is_some())
            .field("fetched", &self.fetched)
            .field("flipped", &self.flipped)
            .finish()
    }
}

/// Order objects through their class's Compare_To
pub fn compare_objs(a: &Obj, b: &Obj) -> Ordering {
    a.compare_to(b)
}

impl SortExternal<Obj> {
    /// Engine ordering runtime objects by Compare_To
    pub fn for_objects() -> Self {
        Self::new(compare_objs)
    }
}
