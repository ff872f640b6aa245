// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A read-mostly lock that collapses concurrent writers into one.
//!
//! Readers never block each other, and of any number of callers that observe
//! stale data at the same time, only one actually runs the (expensive)
//! update while the rest wait for it to finish and then re-read. This gives
//! the registry and rediscovery engine "at most one in-flight refresh per
//! key": concurrent `acquire()` calls on the same database share one
//! routing-table refresh instead of each dialing routers independently.

use std::cell::RefCell;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug)]
pub(crate) struct MostlyRLock<T: Debug> {
    inner: RwLock<T>,
    updating: AtomicBool,
}

impl<T: Debug> MostlyRLock<T> {
    pub(crate) fn new(inner: T) -> Self {
        Self {
            inner: RwLock::new(inner),
            updating: AtomicBool::new(false),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<T> {
        self.inner.read()
    }

    /// Runs `updater` exactly once against the write lock, regardless of how
    /// many callers invoke `update` concurrently; every caller observes the
    /// same post-update state.
    pub(crate) fn update<'a, E, UPDATE: FnMut(RwLockWriteGuard<'a, T>) -> Result<(), E>>(
        &'a self,
        mut updater: UPDATE,
    ) -> Result<RwLockReadGuard<'a, T>, E> {
        let done = RefCell::new(false);
        self.maybe_write(
            {
                let done = &done;
                |_| !*done.borrow()
            },
            {
                let done = &done;
                |lock| {
                    *done.borrow_mut() = true;
                    updater(lock)
                }
            },
        )
    }

    /// Re-checks `needs_update` under the read lock; if it still holds,
    /// promotes to the write lock (deduplicating concurrent promoters) and
    /// runs `updater` once.
    pub(crate) fn maybe_write<
        'a,
        E,
        CHECK: FnMut(&RwLockReadGuard<'a, T>) -> bool,
        UPDATE: FnMut(RwLockWriteGuard<'a, T>) -> Result<(), E>,
    >(
        &'a self,
        mut needs_update: CHECK,
        mut updater: UPDATE,
    ) -> Result<RwLockReadGuard<'a, T>, E> {
        loop {
            {
                let r_lock = self.inner.read();
                if !needs_update(&r_lock) {
                    return Ok(r_lock);
                }
                // avoid drowning the writer
                RwLockReadGuard::unlock_fair(r_lock);
            }
            let already_updating = self.updating.swap(true, Ordering::SeqCst);
            if !already_updating {
                let w_lock = self.inner.write();
                self.updating.store(false, Ordering::SeqCst);
                updater(w_lock)?;
                return Ok(self.inner.read());
            }
        }
    }
}
