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

//! The routing-table registry: one [`RoutingTable`] per database, refreshed
//! at most once per stale observation regardless of how many callers
//! observe the staleness concurrently.
//!
//! A single [`MostlyRLock`] guards the whole map rather than one lock per
//! database: concurrent refreshes of *different* databases end up
//! serialized too, a coarser dedup than strictly necessary but simpler than
//! a lock-per-key scheme this crate has no evidence it needs in practice.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::address::Address;
use crate::error::Result;
use crate::routing_table::{AccessMode, RoutingTable};
use crate::sync::MostlyRLock;
use crate::time::Instant;

type Database = Option<Arc<String>>;
type Tables = HashMap<Database, RoutingTable>;

/// What a refresh attempt produced: the table to install regardless of
/// outcome (a freshly accepted table on success, or the prior table with
/// every failed candidate forgotten on total failure — see
/// `provider::RoutingConnectionProvider::refresh`) plus the result to
/// surface to the caller.
pub(crate) struct RefreshOutcome {
    pub(crate) table: RoutingTable,
    pub(crate) result: Result<()>,
}

#[derive(Debug)]
pub(crate) struct RoutingTableRegistry {
    tables: MostlyRLock<Tables>,
    purge_delay: Duration,
}

impl RoutingTableRegistry {
    pub(crate) fn new(purge_delay: Duration) -> Self {
        Self {
            tables: MostlyRLock::new(HashMap::new()),
            purge_delay,
        }
    }

    /// Ensures `database`'s table satisfies `mode`'s staleness predicate,
    /// running `refresh` at most once even under concurrent callers.
    /// `on_installed` runs, still under the write lock, only when the
    /// refresh succeeded — this is where the provider prunes pool slots for
    /// addresses no longer referenced by any table's union.
    pub(crate) fn ensure_fresh(
        &self,
        database: &Database,
        mode: AccessMode,
        now: Instant,
        mut refresh: impl FnMut(Option<&RoutingTable>) -> RefreshOutcome,
        mut on_installed: impl FnMut(&Tables),
    ) -> Result<()> {
        let database = database.clone();
        self.tables.maybe_write(
            |tables| tables.get(&database).map_or(true, |t| t.is_stale(mode, now)),
            |mut tables| {
                let outcome = refresh(tables.get(&database));
                let succeeded = outcome.result.is_ok();
                tables.insert(database.clone(), outcome.table);
                sweep(&mut tables, &database, self.purge_delay, now);
                if succeeded {
                    on_installed(&tables);
                }
                outcome.result
            },
        )?;
        Ok(())
    }

    /// Round-robins an address for `mode` out of `database`'s currently
    /// stored table, if any.
    pub(crate) fn select(&self, database: &Database, mode: AccessMode) -> Option<Address> {
        self.tables.read().get(database).and_then(|t| t.select(mode))
    }

    /// The union of every address referenced by every stored table, used to
    /// decide which pool slots are still needed.
    pub(crate) fn pooled_addresses(&self) -> std::collections::HashSet<Address> {
        self.tables.read().values().flat_map(|t| t.addresses()).collect()
    }

    /// Seeds or replaces `database`'s table directly, bypassing refresh
    /// dedup. Used by the provider to install a table it already obtained
    /// through some other means (tests; a caller priming the registry).
    pub(crate) fn insert(&self, database: Database, table: RoutingTable) {
        let mut table = Some(table);
        let _ = self.tables.update::<Infallible, _>(|mut tables| {
            tables.insert(
                database.clone(),
                table.take().expect("MostlyRLock::update runs its closure exactly once"),
            );
            Ok(())
        });
    }

    /// `forget(address)` scoped to `database` — drops `address` from that
    /// table's readers and writers, leaving routers untouched (see
    /// `RoutingTable::without_reader_and_writer` and DESIGN.md for the
    /// rationale).
    pub(crate) fn forget(&self, database: &Database, address: &Address) {
        let _ = self.tables.update::<Infallible, _>(|mut tables| {
            if let Some(table) = tables.get(database) {
                let updated = table.without_reader_and_writer(address);
                tables.insert(database.clone(), updated);
            }
            Ok(())
        });
    }

    /// `forgetWriter(address)`, scoped to `database`.
    pub(crate) fn forget_writer(&self, database: &Database, address: &Address) {
        let _ = self.tables.update::<Infallible, _>(|mut tables| {
            if let Some(table) = tables.get(database) {
                let updated = table.without_writer(address);
                tables.insert(database.clone(), updated);
            }
            Ok(())
        });
    }
}

/// Drops every table other than `just_refreshed` whose grace period has
/// elapsed: `table.expires_at() + purge_delay < now`.
fn sweep(tables: &mut Tables, just_refreshed: &Database, purge_delay: Duration, now: Instant) {
    tables.retain(|database, table| {
        database == just_refreshed || table.expires_at().saturating_add(purge_delay) >= now
    });
}
