//! Reuse of request and response objects across exchanges.

use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// An object that can be put back into a clean state and handed out again.
pub trait Reusable: Default {
    fn reset(&mut self);
}

/// A free list of reusable objects. Cloning shares the list.
pub struct ObjectPool<T: Reusable> {
    free: Arc<Mutex<Vec<T>>>,
    max_idle: usize,
}

impl<T: Reusable> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self { free: Arc::clone(&self.free), max_idle: self.max_idle }
    }
}

impl<T: Reusable> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool").field("idle", &self.idle_count()).field("max_idle", &self.max_idle).finish()
    }
}

impl<T: Reusable> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl<T: Reusable> ObjectPool<T> {
    /// A pool keeping at most `max_idle` returned objects.
    pub fn new(max_idle: usize) -> Self {
        Self { free: Arc::new(Mutex::new(Vec::new())), max_idle }
    }

    /// Hands out a pooled object or a fresh one; it goes back on drop.
    pub fn get(&self) -> PoolGuard<T> {
        let value = self.free.lock().pop().unwrap_or_default();
        PoolGuard { value: Some(value), pool: self.clone() }
    }

    /// Resets `value` and keeps it for the next [`ObjectPool::get`].
    pub fn put(&self, mut value: T) {
        value.reset();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(value);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.free.lock().len()
    }
}

/// A checked out object, returned to its pool when dropped.
pub struct PoolGuard<T: Reusable> {
    value: Option<T>,
    pool: ObjectPool<T>,
}

impl<T: Reusable + fmt::Debug> fmt::Debug for PoolGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PoolGuard").field(&self.value).finish()
    }
}

impl<T: Reusable> PoolGuard<T> {
    /// Takes the object out of the pool for good.
    pub fn detach(mut self) -> T {
        self.value.take().unwrap_or_default()
    }
}

impl<T: Reusable> Deref for PoolGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // only `detach` and `drop` empty the slot, both consume the guard
        self.value.as_ref().unwrap_or_else(|| unreachable!("pool guard emptied"))
    }
}

impl<T: Reusable> DerefMut for PoolGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().unwrap_or_else(|| unreachable!("pool guard emptied"))
    }
}

impl<T: Reusable> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.put(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Scratch {
        data: Vec<u8>,
        resets: usize,
    }

    impl Reusable for Scratch {
        fn reset(&mut self) {
            self.data.clear();
            self.resets += 1;
        }
    }

    #[test]
    fn returned_objects_are_reset_and_reused() {
        let pool = ObjectPool::<Scratch>::new(4);
        {
            let mut s = pool.get();
            s.data.extend_from_slice(b"dirty");
        }
        assert_eq!(pool.idle_count(), 1);

        let s = pool.get();
        assert!(s.data.is_empty());
        assert_eq!(s.resets, 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn max_idle_bounds_free_list() {
        let pool = ObjectPool::<Scratch>::new(1);
        let a = pool.get();
        let b = pool.get();
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn detach_keeps_object_out() {
        let pool = ObjectPool::<Scratch>::new(4);
        let s = pool.get().detach();
        assert_eq!(s.resets, 0);
        assert_eq!(pool.idle_count(), 0);
    }
}
