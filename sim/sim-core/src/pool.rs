//! Generation-counted arena of reusable calculators.
//!
//! The pool keeps every object it ever created. [`CalculatorPool::clear`]
//! starts a new generation: the objects stay allocated but are handed out
//! again from the front, and handles from the previous generation no longer
//! resolve.

/// Handle to an object checked out of a [`CalculatorPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: usize,
    generation: u64,
}

impl PoolHandle {
    /// Slot index in the pool.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Fixed-growth arena with a per-generation cursor.
#[derive(Debug, Clone)]
pub struct CalculatorPool<T> {
    items: Vec<T>,
    in_use: usize,
    generation: u64,
}

impl<T> Default for CalculatorPool<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            in_use: 0,
            generation: 0,
        }
    }
}

impl<T> CalculatorPool<T> {
    /// Empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Release every object and invalidate outstanding handles.
    pub fn clear(&mut self) {
        self.in_use = 0;
        self.generation += 1;
    }

    /// Check out the next free object, creating one with `create` when the
    /// pool is exhausted.
    ///
    /// Reused objects keep their previous state; the caller resets them.
    pub fn next_available(&mut self, create: impl FnOnce() -> T) -> (PoolHandle, &mut T) {
        if self.in_use == self.items.len() {
            self.items.push(create());
        }
        let index = self.in_use;
        self.in_use += 1;
        let handle = PoolHandle {
            index,
            generation: self.generation,
        };
        (handle, &mut self.items[index])
    }

    /// Resolve a handle from the current generation.
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        if self.is_live(handle) {
            self.items.get(handle.index)
        } else {
            None
        }
    }

    /// Resolve a handle from the current generation, mutably.
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        if self.is_live(handle) {
            self.items.get_mut(handle.index)
        } else {
            None
        }
    }

    fn is_live(&self, handle: PoolHandle) -> bool {
        handle.generation == self.generation && handle.index < self.in_use
    }

    /// Number of objects checked out this generation.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Number of objects ever allocated.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    /// Objects checked out this generation, in checkout order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items[..self.in_use].iter()
    }

    /// Objects checked out this generation, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items[..self.in_use].iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse_after_clear() {
        let mut pool = CalculatorPool::new();
        let (first, value) = pool.next_available(|| 1);
        *value = 10;
        pool.next_available(|| 2);
        assert_eq!(pool.in_use(), 2);

        pool.clear();
        let (handle, value) = pool.next_available(|| 99);
        // Reused object, not a new one.
        assert_eq!(*value, 10);
        assert_eq!(handle.index(), 0);
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.in_use(), 1);

        assert!(pool.get(first).is_none());
        assert_eq!(pool.get(handle), Some(&10));
    }

    #[test]
    fn test_iter_only_in_use() {
        let mut pool = CalculatorPool::new();
        for i in 0..3 {
            pool.next_available(|| i);
        }
        pool.clear();
        pool.next_available(|| 7);
        assert_eq!(pool.iter().count(), 1);
    }
}
