use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A bounded queue that never blocks on `put` and never rejects a `put` with
/// "full": when full, it atomically drops the oldest element before
/// enqueuing the new one. `get` blocks, optionally with a timeout.
pub struct DroppingQueue<T> {
    capacity: usize,
    state: Mutex<VecDeque<T>>,
    not_empty: Condvar,
}

impl<T> DroppingQueue<T> {
    pub fn new(capacity: usize) -> DroppingQueue<T> {
        assert!(capacity > 0, "queue capacity must be positive");
        DroppingQueue {
            capacity,
            state: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
        }
    }

    pub fn put(&self, item: T) {
        let mut q = self.state.lock().expect("queue lock poisoned");
        if q.len() >= self.capacity {
            q.pop_front();
        }
        q.push_back(item);
        self.not_empty.notify_one();
    }

    pub fn get(&self) -> T {
        let mut q = self.state.lock().expect("queue lock poisoned");
        loop {
            if let Some(item) = q.pop_front() {
                return item;
            }
            q = self.not_empty.wait(q).expect("queue lock poisoned");
        }
    }

    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let mut q = self.state.lock().expect("queue lock poisoned");
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = q.pop_front() {
                return Some(item);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = self
                .not_empty
                .wait_timeout(q, deadline - now)
                .expect("queue lock poisoned");
            q = guard;
            if result.timed_out() && q.is_empty() {
                return None;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_when_full() {
        let q: DroppingQueue<i32> = DroppingQueue::new(2);
        q.put(1);
        q.put(2);
        q.put(3);
        assert_eq!(q.len(), 2);
        assert_eq!(q.get(), 2);
        assert_eq!(q.get(), 3);
    }

    #[test]
    fn get_timeout_returns_none_when_empty() {
        let q: DroppingQueue<i32> = DroppingQueue::new(2);
        assert_eq!(q.get_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn rapid_puts_preserve_last_capacity_order() {
        let q: DroppingQueue<i32> = DroppingQueue::new(3);
        for i in 0..10 {
            q.put(i);
        }
        assert_eq!(q.get(), 7);
        assert_eq!(q.get(), 8);
        assert_eq!(q.get(), 9);
    }
}
