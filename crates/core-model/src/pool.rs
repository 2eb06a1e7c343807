//! Free-list pooling for the allocations churned during rapid keystrokes:
//! span vectors, chunk line buffers, batch done-signals.
//!
//! Invariant: release clears the payload before it re-enters the free list,
//! so a pooled buffer never retains stale `Arc<Line>` references.

use std::sync::Mutex;

/// Values that can be recycled through a [`Pool`].
pub trait Poolable: Default {
    /// Drop all contents, keeping capacity where that is cheap.
    fn reset(&mut self);
}

impl<T> Poolable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// A bounded free list. Acquire takes from the list or makes a fresh value;
/// release resets the value and returns it unless the list is full.
#[derive(Debug)]
pub struct Pool<T: Poolable> {
    items: Mutex<Vec<T>>,
    cap: usize,
}

impl<T: Poolable> Pool<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            cap,
        }
    }

    pub fn acquire(&self) -> T {
        self.items
            .lock()
            .ok()
            .and_then(|mut items| items.pop())
            .unwrap_or_default()
    }

    pub fn release(&self, mut value: T) {
        value.reset();
        if let Ok(mut items) = self.items.lock() {
            if items.len() < self.cap {
                items.push(value);
            }
        }
    }

    #[cfg(test)]
    fn idle(&self) -> usize {
        self.items.lock().map(|i| i.len()).unwrap_or(0)
    }
}

impl<T: Poolable> Default for Pool<T> {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::Span;

    #[test]
    fn release_clears_contents() {
        let pool: Pool<Vec<Span>> = Pool::new(4);
        let mut v = pool.acquire();
        v.push(Span::new(0, 3));
        pool.release(v);
        let v = pool.acquire();
        assert!(v.is_empty());
    }

    #[test]
    fn pool_is_bounded() {
        let pool: Pool<Vec<Span>> = Pool::new(2);
        for _ in 0..5 {
            pool.release(Vec::new());
        }
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn acquire_reuses_released_buffers() {
        let pool: Pool<Vec<Span>> = Pool::new(4);
        let mut v = pool.acquire();
        v.reserve(128);
        let cap = v.capacity();
        pool.release(v);
        let v = pool.acquire();
        assert!(v.capacity() >= cap);
    }
}
