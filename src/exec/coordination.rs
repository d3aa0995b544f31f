// src/exec/coordination.rs

//! Resource lock coordination service.
//!
//! One mutex guards every piece of scheduler state. Callers run
//! transactions against it; a transaction either finishes, or asks to be
//! retried, in which case the locks it tentatively took are released and
//! the caller waits until some other transaction changes the state.

use parking_lot::{Condvar, Mutex};

use crate::exec::locks::{HoldsResourceLocks, ResourceLockState};

/// Outcome of one transaction attempt.
#[derive(Debug)]
pub enum Disposition<T> {
    Finished(T),
    Retry,
}

pub struct CoordinationService<S> {
    state: Mutex<S>,
    changed: Condvar,
}

impl<S: HoldsResourceLocks> CoordinationService<S> {
    pub fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
            changed: Condvar::new(),
        }
    }

    /// Run `transaction` under the state lock until it finishes.
    pub fn with_state_lock<T>(
        &self,
        mut transaction: impl FnMut(&mut S, &mut ResourceLockState) -> Disposition<T>,
    ) -> T {
        let mut guard = self.state.lock();
        loop {
            let mut lock_state = ResourceLockState::default();
            match transaction(&mut *guard, &mut lock_state) {
                Disposition::Finished(value) => {
                    self.changed.notify_all();
                    return value;
                }
                Disposition::Retry => {
                    lock_state.release_locks(guard.resource_locks());
                    self.changed.wait(&mut guard);
                }
            }
        }
    }

    /// Run `f` once under the state lock and wake up waiting transactions.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut S) -> T) -> T {
        let mut guard = self.state.lock();
        let value = f(&mut *guard);
        self.changed.notify_all();
        value
    }

    /// Wake up waiting transactions after an outside change (e.g. cancellation).
    pub fn notify_state_change(&self) {
        let _guard = self.state.lock();
        self.changed.notify_all();
    }

    pub fn into_inner(self) -> S {
        self.state.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::exec::locks::{LeaseId, ResourceLocks};

    struct Counter {
        locks: ResourceLocks,
        value: usize,
    }

    impl HoldsResourceLocks for Counter {
        fn resource_locks(&mut self) -> &mut ResourceLocks {
            &mut self.locks
        }
    }

    #[test]
    fn retry_waits_for_a_state_change() {
        let service = CoordinationService::new(Counter {
            locks: ResourceLocks::new(1),
            value: 0,
        });

        thread::scope(|scope| {
            let waiter = scope.spawn(|| {
                service.with_state_lock(|state, _| {
                    if state.value == 3 {
                        Disposition::Finished(state.value)
                    } else {
                        Disposition::Retry
                    }
                })
            });
            for _ in 0..3 {
                thread::sleep(Duration::from_millis(10));
                service.with_state(|state| state.value += 1);
            }
            assert_eq!(waiter.join().unwrap(), 3);
        });
    }

    #[test]
    fn retry_releases_tentative_locks() {
        let service = CoordinationService::new(Counter {
            locks: ResourceLocks::new(1),
            value: 0,
        });
        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                service.with_state(|state| state.value = 1);
            });
            service.with_state_lock(|state, lock_state| {
                // whatever an earlier attempt took has been rolled back
                assert!(!state.locks.leases.is_held(LeaseId(0)));
                assert!(lock_state.try_lock_lease(&mut state.locks.leases, LeaseId(0)));
                if state.value == 1 {
                    Disposition::Finished(())
                } else {
                    Disposition::Retry
                }
            });
        });

        let state = service.into_inner();
        assert!(state.locks.leases.is_held(LeaseId(0)));
    }
}
