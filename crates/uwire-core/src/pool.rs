//! Bounded object pool for reusable scratch buffers and DTOs.
//!
//! `get` returns a reset object or allocates a fresh one; `release` stores
//! the object only while the pool is below its cap. Neither operation blocks.

use crossbeam_queue::ArrayQueue;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;
type Reset<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// A bounded, never-blocking pool of reusable objects.
pub struct ObjectPool<T> {
    items: ArrayQueue<T>,
    factory: Factory<T>,
    reset: Reset<T>,
}

impl<T> ObjectPool<T> {
    /// Create a pool holding at most `cap` idle objects.
    pub fn new(
        cap: usize,
        factory: impl Fn() -> T + Send + Sync + 'static,
        reset: impl Fn(&mut T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            items: ArrayQueue::new(cap),
            factory: Box::new(factory),
            reset: Box::new(reset),
        }
    }

    /// Take an object from the pool, or allocate one if none are idle.
    pub fn get(&self) -> T {
        self.items.pop().unwrap_or_else(|| (self.factory)())
    }

    /// Return an object. Dropped silently when the pool is full.
    pub fn release(&self, mut item: T) {
        (self.reset)(&mut item);
        let _ = self.items.push(item);
    }

    /// Number of idle objects currently stored.
    pub fn idle_count(&self) -> usize {
        self.items.len()
    }
}

impl ObjectPool<Vec<u8>> {
    /// Pool of zeroed byte buffers of a fixed size.
    pub fn byte_buffers(cap: usize, buffer_size: usize) -> Self {
        Self::new(
            cap,
            move || vec![0u8; buffer_size],
            |_| {},
        )
    }
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("idle_count", &self.idle_count())
            .field("cap", &self.items.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_allocates_when_empty() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(2, Vec::new, Vec::clear);
        assert_eq!(pool.idle_count(), 0);
        let v = pool.get();
        assert!(v.is_empty());
    }

    #[test]
    fn release_resets_and_stores() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(2, Vec::new, Vec::clear);
        let mut v = pool.get();
        v.extend_from_slice(b"dirty");
        pool.release(v);
        assert_eq!(pool.idle_count(), 1);
        let v = pool.get();
        assert!(v.is_empty());
    }

    #[test]
    fn release_drops_past_cap() {
        let pool: ObjectPool<u32> = ObjectPool::new(2, || 0, |_| {});
        pool.release(1);
        pool.release(2);
        pool.release(3);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn byte_buffers_are_fixed_size() {
        let pool = ObjectPool::byte_buffers(4, 1024);
        let buf = pool.get();
        assert_eq!(buf.len(), 1024);
        pool.release(buf);
        assert_eq!(pool.get().len(), 1024);
    }
}
