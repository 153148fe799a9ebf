//! Sources of pre-sorted items for leaf runs

/// Supplies a sorted run in batches
///
/// Batches must continue the run's order: nothing returned later may sort
/// before anything returned earlier.
pub trait RunReader<T> {
    /// Append the next batch to `out`; returns how many items were added.
    /// Zero means the run is exhausted.
    fn refill(&mut self, out: &mut Vec<T>) -> usize;
}

impl<T, F> RunReader<T> for F
where
    F: FnMut(&mut Vec<T>) -> usize,
{
    fn refill(&mut self, out: &mut Vec<T>) -> usize {
        self(out)
    }
}

/// Serves a sorted vector a bounded batch at a time
#[derive(Debug)]
pub struct VecRunReader<T> {
    items: std::vec::IntoIter<T>,
    batch_size: usize,
}

impl<T> VecRunReader<T> {
    pub fn new(items: Vec<T>, batch_size: usize) -> Self {
        Self {
            items: items.into_iter(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

impl<T> RunReader<T> for VecRunReader<T> {
    fn refill(&mut self, out: &mut Vec<T>) -> usize {
        let before = out.len();
        out.extend(self.items.by_ref().take(self.batch_size));
        out.len() - before
    }
}
