// src/exec/locks.rs

//! Project locks and worker leases.
//!
//! Neither type synchronises on its own: they are plain state that is only
//! touched inside a [`CoordinationService`](super::coordination::CoordinationService)
//! transaction.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::types::ProjectPath;

/// Identity of one worker: the "current operation" locks are reentrant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseId(pub usize);

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ProjectLock {
    owner: Option<LeaseId>,
    holds: usize,
}

/// One mutual-exclusion lock per project, reentrant per owner.
#[derive(Debug, Default)]
pub struct ProjectLocks {
    locks: HashMap<ProjectPath, ProjectLock>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take (or re-enter) the lock of `project` for `owner`.
    pub fn try_lock(&mut self, project: &ProjectPath, owner: LeaseId) -> bool {
        let lock = self.locks.entry(project.clone()).or_default();
        match lock.owner {
            Some(current) if current != owner => false,
            _ => {
                lock.owner = Some(owner);
                lock.holds += 1;
                trace!(project = %project, owner = %owner, holds = lock.holds, "project lock acquired");
                true
            }
        }
    }

    /// Give up one hold. Unlocking a lock not held by `owner` does nothing.
    pub fn unlock(&mut self, project: &ProjectPath, owner: LeaseId) {
        if let Some(lock) = self.locks.get_mut(project) {
            if lock.owner == Some(owner) {
                lock.holds -= 1;
                if lock.holds == 0 {
                    lock.owner = None;
                }
                trace!(project = %project, owner = %owner, holds = lock.holds, "project lock released");
            }
        }
    }

    /// Drop every hold `owner` has on `project`, returning how many there were.
    pub fn release_all(&mut self, project: &ProjectPath, owner: LeaseId) -> usize {
        match self.locks.get_mut(project) {
            Some(lock) if lock.owner == Some(owner) => {
                let holds = lock.holds;
                *lock = ProjectLock::default();
                holds
            }
            _ => 0,
        }
    }

    /// Take the lock back with the given number of holds, if it is free.
    pub fn reacquire(&mut self, project: &ProjectPath, owner: LeaseId, holds: usize) -> bool {
        if holds == 0 {
            return true;
        }
        let lock = self.locks.entry(project.clone()).or_default();
        match lock.owner {
            Some(current) if current != owner => false,
            _ => {
                lock.owner = Some(owner);
                lock.holds += holds;
                true
            }
        }
    }

    pub fn is_locked(&self, project: &ProjectPath) -> bool {
        self.locks
            .get(project)
            .is_some_and(|lock| lock.owner.is_some())
    }

    pub fn holds(&self, project: &ProjectPath, owner: LeaseId) -> usize {
        match self.locks.get(project) {
            Some(lock) if lock.owner == Some(owner) => lock.holds,
            _ => 0,
        }
    }
}

/// Global cap on how many workers may be running work at once.
#[derive(Debug)]
pub struct WorkerLeases {
    max: usize,
    held: Vec<LeaseId>,
}

impl WorkerLeases {
    pub fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            held: Vec::new(),
        }
    }

    /// Take a slot for `lease`; a lease that already holds one keeps it.
    pub fn try_lock(&mut self, lease: LeaseId) -> bool {
        if self.held.contains(&lease) {
            return true;
        }
        if self.held.len() >= self.max {
            return false;
        }
        self.held.push(lease);
        true
    }

    pub fn unlock(&mut self, lease: LeaseId) {
        self.held.retain(|held| *held != lease);
    }

    pub fn is_held(&self, lease: LeaseId) -> bool {
        self.held.contains(&lease)
    }

    pub fn in_use(&self) -> usize {
        self.held.len()
    }
}

/// All lock state guarded by the coordination service.
#[derive(Debug)]
pub struct ResourceLocks {
    pub projects: ProjectLocks,
    pub leases: WorkerLeases,
}

impl ResourceLocks {
    pub fn new(max_workers: usize) -> Self {
        Self {
            projects: ProjectLocks::new(),
            leases: WorkerLeases::new(max_workers),
        }
    }
}

/// Something that holds the resource locks inside a coordination transaction.
pub trait HoldsResourceLocks {
    fn resource_locks(&mut self) -> &mut ResourceLocks;
}

impl HoldsResourceLocks for ResourceLocks {
    fn resource_locks(&mut self) -> &mut ResourceLocks {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AcquiredLock {
    Project(ProjectPath, LeaseId),
    Lease(LeaseId),
}

/// Locks taken during one transaction, so they can be rolled back when the
/// transaction cannot complete.
#[derive(Debug, Default)]
pub struct ResourceLockState {
    acquired: Vec<AcquiredLock>,
}

impl ResourceLockState {
    pub fn try_lock_project(
        &mut self,
        locks: &mut ProjectLocks,
        project: &ProjectPath,
        owner: LeaseId,
    ) -> bool {
        let taken = locks.try_lock(project, owner);
        if taken {
            self.acquired
                .push(AcquiredLock::Project(project.clone(), owner));
        }
        taken
    }

    pub fn try_lock_lease(&mut self, leases: &mut WorkerLeases, lease: LeaseId) -> bool {
        if leases.is_held(lease) {
            return true;
        }
        let taken = leases.try_lock(lease);
        if taken {
            self.acquired.push(AcquiredLock::Lease(lease));
        }
        taken
    }

    /// Undo every lock taken through this state, newest first.
    pub fn release_locks(&mut self, locks: &mut ResourceLocks) {
        while let Some(acquired) = self.acquired.pop() {
            match acquired {
                AcquiredLock::Project(project, owner) => locks.projects.unlock(&project, owner),
                AcquiredLock::Lease(lease) => locks.leases.unlock(lease),
            }
        }
    }
}
