//! Lock helpers
//!
//! Sync state is guarded by short-lived `std::sync::RwLock`s that are never
//! held across an await. A panic while holding one leaves the data intact,
//! so poisoning is recovered rather than propagated.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read guard, recovering from poisoning
pub fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Acquire a write guard, recovering from poisoning
pub fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_write_then_read() {
        let lock = RwLock::new(42);
        *write_lock(&lock) = 100;
        assert_eq!(*read_lock(&lock), 100);
    }

    #[test]
    fn test_recovers_from_poison() {
        let lock = Arc::new(RwLock::new(1));
        let poisoner = Arc::clone(&lock);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.write().unwrap();
            panic!("poison");
        })
        .join();

        assert!(lock.is_poisoned());
        *write_lock(&lock) = 2;
        assert_eq!(*read_lock(&lock), 2);
    }
}
