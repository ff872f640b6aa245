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

//! The immutable routing-table snapshot and the access-mode distinction its
//! staleness predicate and role selection are keyed on.
//!
//! A table is never mutated in place: every transformation below
//! (`without_router`, `without_reader_and_writer`, `without_writer`) returns
//! a fresh value. The only interior mutability is the pair of round-robin
//! cursors, which belong to one table instance for its whole lifetime and
//! are advanced atomically.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::address::Address;
use crate::time::Instant;

/// Read or write intent, used both by the registry's staleness predicate
/// and by round-robin selection over a table's role lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// An immutable `database -> {routers, readers, writers}` snapshot with a
/// TTL-derived expiry.
#[derive(Debug)]
pub struct RoutingTable {
    database: Option<Arc<String>>,
    routers: Vec<Address>,
    readers: Vec<Address>,
    writers: Vec<Address>,
    ttl: Duration,
    expires_at: Instant,
    reader_cursor: AtomicUsize,
    writer_cursor: AtomicUsize,
}

impl RoutingTable {
    pub fn new(
        database: Option<Arc<String>>,
        routers: Vec<Address>,
        readers: Vec<Address>,
        writers: Vec<Address>,
        ttl: Duration,
        now: Instant,
    ) -> Self {
        Self {
            database,
            routers,
            readers,
            writers,
            ttl,
            expires_at: now.saturating_add(ttl),
            reader_cursor: AtomicUsize::new(0),
            writer_cursor: AtomicUsize::new(0),
        }
    }

    /// An empty, already-expired table: the only state a database can be in
    /// after every candidate router has been forgotten (scenario 4).
    pub(crate) fn empty(database: Option<Arc<String>>, now: Instant) -> Self {
        Self::new(database, Vec::new(), Vec::new(), Vec::new(), Duration::ZERO, now)
    }

    pub fn database(&self) -> Option<&Arc<String>> {
        self.database.as_ref()
    }

    pub fn routers(&self) -> &[Address] {
        &self.routers
    }

    pub fn readers(&self) -> &[Address] {
        &self.readers
    }

    pub fn writers(&self) -> &[Address] {
        &self.writers
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Whether this table can no longer serve `mode` without a refresh.
    pub fn is_stale(&self, mode: AccessMode, now: Instant) -> bool {
        now >= self.expires_at
            || self.routers.is_empty()
            || match mode {
                AccessMode::Read => self.readers.is_empty(),
                AccessMode::Write => self.writers.is_empty(),
            }
    }

    /// A table whose refresh produced no writers asks the next refresh to
    /// try the seed router first, since this happens in exactly the
    /// partitioned-cluster case where known routers can no longer see a
    /// leader.
    pub fn prefer_seed_router(&self) -> bool {
        self.writers.is_empty()
    }

    /// The union of every address this table references, used to decide
    /// which pool slots are still needed after a refresh.
    pub fn addresses(&self) -> HashSet<Address> {
        self.routers
            .iter()
            .chain(self.readers.iter())
            .chain(self.writers.iter())
            .cloned()
            .collect()
    }

    /// Round-robins over `mode`'s role list, returning `None` if it is
    /// empty. Two concurrent callers advance the same cursor atomically, so
    /// they observe adjacent, non-duplicate entries.
    pub fn select(&self, mode: AccessMode) -> Option<Address> {
        let (list, cursor) = match mode {
            AccessMode::Read => (&self.readers, &self.reader_cursor),
            AccessMode::Write => (&self.writers, &self.writer_cursor),
        };
        if list.is_empty() {
            return None;
        }
        let index = cursor.fetch_add(1, Ordering::Relaxed) % list.len();
        Some(list[index].clone())
    }

    fn rebuilt(
        &self,
        routers: Vec<Address>,
        readers: Vec<Address>,
        writers: Vec<Address>,
    ) -> Self {
        Self {
            database: self.database.clone(),
            routers,
            readers,
            writers,
            ttl: self.ttl,
            expires_at: self.expires_at,
            reader_cursor: AtomicUsize::new(0),
            writer_cursor: AtomicUsize::new(0),
        }
    }

    /// Drops `address` from the router list: the refresh discipline's
    /// per-candidate `forget(router)`.
    pub(crate) fn without_router(&self, address: &Address) -> Self {
        self.without_routers(std::slice::from_ref(address))
    }

    pub(crate) fn without_routers(&self, addresses: &[Address]) -> Self {
        let routers = self
            .routers
            .iter()
            .filter(|a| !addresses.contains(*a))
            .cloned()
            .collect();
        self.rebuilt(routers, self.readers.clone(), self.writers.clone())
    }

    /// Drops `address` from readers and writers, leaving routers untouched.
    /// This is the public `forget(address)` operation's per-database effect
    /// — see DESIGN.md for why routers are left alone here.
    pub(crate) fn without_reader_and_writer(&self, address: &Address) -> Self {
        let readers = self.readers.iter().filter(|a| *a != address).cloned().collect();
        let writers = self.writers.iter().filter(|a| *a != address).cloned().collect();
        self.rebuilt(self.routers.clone(), readers, writers)
    }

    /// Drops `address` from writers only: `forgetWriter`.
    pub(crate) fn without_writer(&self, address: &Address) -> Self {
        let writers = self.writers.iter().filter(|a| *a != address).cloned().collect();
        self.rebuilt(self.routers.clone(), self.readers.clone(), writers)
    }
}
