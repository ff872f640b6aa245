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

//! The routing connection provider: the public façade owning the pool, the
//! registry, the host-name resolver and the rediscovery engine.
//!
//! Ties together seed-first-vs-routers-first refresh ordering, a
//! prefer-seed-router flag that flips once a table's refresh comes back
//! without writers, a router-candidate probing loop, and the
//! forget/pool-pruning side effects that keep the pool's slots in sync
//! with whichever addresses the registry's tables still reference.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::collections::HashSet;

use itertools::Itertools;
use log::{debug, warn};

use crate::address::{Address, HostResolver};
use crate::bookmarks::Bookmarks;
use crate::config::{PoolConfig, RoutingConfig};
use crate::connection::{AcquireContext, ConnectionFactory};
use crate::error::{Result, RoutingError};
use crate::pool::{Pool, PooledConnection};
use crate::rediscovery::{DiscoverOutcome, Rediscovery, RoutingContext, RoutingProcedure, SessionContext};
use crate::registry::{RefreshOutcome, RoutingTableRegistry};
use crate::routing_table::{AccessMode, RoutingTable};
use crate::time::{Clock, Instant};

/// Parameters of one `acquire` call.
#[derive(Debug, Clone)]
pub struct AcquireRequestArgs {
    pub access_mode: AccessMode,
    pub database: Option<Arc<String>>,
    pub bookmarks: Bookmarks,
    pub impersonated_user: Option<String>,
}

impl AcquireRequestArgs {
    pub fn new(access_mode: AccessMode, database: Option<Arc<String>>) -> Self {
        Self {
            access_mode,
            database,
            bookmarks: Bookmarks::new(),
            impersonated_user: None,
        }
    }
}

/// The public façade: given `{accessMode, database, impersonatedUser,
/// bookmarks}`, ensures a fresh routing table, selects an address, acquires
/// a pooled connection and wraps it with an error-mapping delegate.
#[derive(Debug)]
pub struct RoutingConnectionProvider<F: ConnectionFactory, R: HostResolver, P: RoutingProcedure> {
    seed: Address,
    pool: Arc<Pool<F>>,
    registry: RoutingTableRegistry,
    resolver: R,
    rediscovery: Rediscovery<P>,
    routing_context: RoutingContext,
    use_seed_router_first: bool,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

impl<F: ConnectionFactory, R: HostResolver, P: RoutingProcedure> RoutingConnectionProvider<F, R, P> {
    pub fn new(
        seed: Address,
        factory: F,
        pool_config: PoolConfig,
        routing_config: RoutingConfig,
        resolver: R,
        procedure: P,
        routing_context: RoutingContext,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            seed,
            pool: Arc::new(Pool::new(factory, pool_config, Arc::clone(&clock))),
            registry: RoutingTableRegistry::new(routing_config.routing_table_purge_delay),
            resolver,
            rediscovery: Rediscovery::new(procedure),
            routing_context,
            use_seed_router_first: routing_config.use_seed_router_first,
            clock,
            closed: AtomicBool::new(false),
        }
    }

    /// Ensures a fresh table for `args.database`, selects an address via
    /// round robin, acquires a pooled connection, and wraps it in a
    /// [`DelegatingConnection`].
    pub fn acquire(self: &Arc<Self>, args: AcquireRequestArgs) -> Result<DelegatingConnection<F, R, P>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RoutingError::PoolClosed);
        }
        let now = self.clock.now();
        let database = args.database.clone();

        self.registry.ensure_fresh(
            &database,
            args.access_mode,
            now,
            |current| self.refresh(current, &database, &args.bookmarks, &args.impersonated_user, now),
            |tables| {
                let union: Vec<Address> = tables.values().flat_map(|t| t.addresses()).collect();
                self.pool.keep_all(&union);
            },
        )?;

        let address = self.registry.select(&database, args.access_mode).ok_or_else(|| {
            RoutingError::session_expired(format!(
                "no server of the requested role is available for database {database:?}"
            ))
        })?;

        let context = AcquireContext {
            impersonated_user: args.impersonated_user.clone(),
        };
        let connection = self.pool.acquire(&address, &context, false)?;
        Ok(DelegatingConnection::new(connection, Arc::clone(self), database, address))
    }

    /// Probes candidate routers in order, accepting the first
    /// structurally-usable table, falling back to the resolved seed once
    /// the starting candidate list is exhausted.
    fn refresh(
        &self,
        current: Option<&RoutingTable>,
        database: &Option<Arc<String>>,
        bookmarks: &Bookmarks,
        impersonated_user: &Option<String>,
        now: Instant,
    ) -> RefreshOutcome {
        let prefer_seed = self.use_seed_router_first
            || current.map_or(true, |t| t.routers().is_empty() || t.prefer_seed_router());
        let known_routers: Vec<Address> = current.map(|t| t.routers().to_vec()).unwrap_or_default();

        let mut queue: VecDeque<Address> = VecDeque::new();
        let mut tried: HashSet<Address> = HashSet::new();
        let mut forgotten: Vec<Address> = Vec::new();

        if prefer_seed {
            enqueue_new(&mut queue, &mut tried, self.resolver.resolve(&self.seed));
        }
        enqueue_new(&mut queue, &mut tried, known_routers);
        let mut seed_fallback_tried = prefer_seed;

        let session_context = SessionContext {
            bookmarks: bookmarks.clone(),
            impersonated_user: impersonated_user.clone(),
        };

        let mut fatal: Option<RoutingError> = None;

        loop {
            let Some(address) = queue.pop_front() else {
                if seed_fallback_tried {
                    break;
                }
                seed_fallback_tried = true;
                enqueue_new(&mut queue, &mut tried, self.resolver.resolve(&self.seed));
                if queue.is_empty() {
                    break;
                }
                continue;
            };

            let mut connection = match self.pool.acquire(&address, &AcquireContext::default(), false) {
                Ok(connection) => connection,
                Err(err) => {
                    debug!("could not reach candidate router {address}: {err}");
                    self.pool.purge(&address);
                    forgotten.push(address);
                    continue;
                }
            };

            match self.rediscovery.discover(
                &mut *connection,
                &self.routing_context,
                database.as_ref(),
                &session_context,
                now,
            ) {
                DiscoverOutcome::Accepted(table) if !table.routers().is_empty() && !table.readers().is_empty() => {
                    // Pruning stale pool slots happens once, in
                    // `ensure_fresh`'s `on_installed` callback, over the
                    // union of every registered database's table — not
                    // here, which would purge every other database's
                    // connections on each unrelated refresh.
                    drop(connection);
                    return RefreshOutcome {
                        table,
                        result: Ok(()),
                    };
                }
                DiscoverOutcome::Accepted(_) => {
                    // Open Question 1: a table missing routers or readers
                    // is discarded just like a recoverable router failure.
                    drop(connection);
                    self.pool.purge(&address);
                    forgotten.push(address);
                }
                DiscoverOutcome::Recoverable => {
                    drop(connection);
                    self.pool.purge(&address);
                    forgotten.push(address);
                }
                DiscoverOutcome::Fatal(err) => {
                    drop(connection);
                    fatal = Some(err);
                    break;
                }
            }
        }

        let depleted = match current {
            Some(table) => table.without_routers(&forgotten),
            None => RoutingTable::empty(database.clone(), now),
        };
        let result = Err(fatal.unwrap_or_else(|| {
            // A failed acquire always names the reason and, for
            // ServiceUnavailable, a summary of what was tried.
            let tried_summary = tried.iter().join(", ");
            RoutingError::service_unavailable(format!(
                "unable to retrieve routing table for database {database:?} from any known \
                 router (tried: {tried_summary})"
            ))
        }));
        warn!("routing table refresh for database {database:?} failed: {result:?}");
        RefreshOutcome {
            table: depleted,
            result,
        }
    }

    /// `forget(address)` — drops `address` from `database`'s routing table
    /// readers/writers and purges the pool.
    pub fn forget(&self, database: &Option<Arc<String>>, address: &Address) {
        self.registry.forget(database, address);
        self.pool.purge(address);
    }

    /// `forgetWriter(address)` — drops from writers only, pool untouched
    /// since the connection may still serve as a reader.
    pub fn forget_writer(&self, database: &Option<Arc<String>>, address: &Address) {
        self.registry.forget_writer(database, address);
    }

    pub(crate) fn purge_pool(&self, address: &Address) {
        self.pool.purge(address);
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.pool.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn enqueue_new(queue: &mut VecDeque<Address>, tried: &mut HashSet<Address>, addresses: impl IntoIterator<Item = Address>) {
    for address in addresses {
        if tried.insert(address.clone()) {
            queue.push_back(address);
        }
    }
}

/// A connection on loan from the provider, wrapping a pooled connection
/// with an error-mapping delegate: per-connection errors drive
/// `forget`/`forgetWriter`/pool-purge side effects before the caller ever
/// sees them.
pub struct DelegatingConnection<F: ConnectionFactory, R: HostResolver, P: RoutingProcedure> {
    inner: PooledConnection<F>,
    provider: Arc<RoutingConnectionProvider<F, R, P>>,
    database: Option<Arc<String>>,
    address: Address,
}

impl<F: ConnectionFactory, R: HostResolver, P: RoutingProcedure> DelegatingConnection<F, R, P> {
    fn new(
        inner: PooledConnection<F>,
        provider: Arc<RoutingConnectionProvider<F, R, P>>,
        database: Option<Arc<String>>,
        address: Address,
    ) -> Self {
        Self {
            inner,
            provider,
            database,
            address,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Intercepts a per-connection error, applies its routing/pool side
    /// effect, and returns the error the caller should see (possibly
    /// transformed, for not-a-leader-style errors already folded into
    /// `SessionExpired` by `ServerError::classify`).
    pub fn handle_error(&self, err: RoutingError) -> RoutingError {
        match &err {
            RoutingError::ServiceUnavailable { .. } => {
                self.provider.forget(&self.database, &self.address);
            }
            RoutingError::SessionExpired { writer_invalidated, .. } => {
                if *writer_invalidated {
                    self.provider.forget_writer(&self.database, &self.address);
                } else {
                    self.provider.forget(&self.database, &self.address);
                }
            }
            RoutingError::AuthorizationExpired { .. } => {
                self.provider.purge_pool(&self.address);
            }
            _ => {}
        }
        err
    }
}

impl<F: ConnectionFactory, R: HostResolver, P: RoutingProcedure> Deref for DelegatingConnection<F, R, P> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<F: ConnectionFactory, R: HostResolver, P: RoutingProcedure> DerefMut for DelegatingConnection<F, R, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<F: ConnectionFactory, R: HostResolver, P: RoutingProcedure> Debug for DelegatingConnection<F, R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatingConnection")
            .field("address", &self.address)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::IdentityResolver;
    use crate::connection::Connection;
    use crate::rediscovery::{RawRoutingTable, Role, ServerRole};
    use crate::time::ManualClock;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug)]
    struct TestConnection {
        address: Address,
    }

    impl Connection for TestConnection {
        fn address(&self) -> &Address {
            &self.address
        }

        fn auth_scheme(&self) -> &str {
            "basic"
        }

        fn protocol_version(&self) -> (u8, u8) {
            (5, 0)
        }

        fn reset_and_flush(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct TestFactory {
        unreachable: Mutex<HashSet<Address>>,
    }

    impl TestFactory {
        fn new(unreachable: &[&str]) -> Self {
            Self {
                unreachable: Mutex::new(unreachable.iter().map(|a| Address::from(*a)).collect()),
            }
        }
    }

    impl ConnectionFactory for TestFactory {
        type Connection = TestConnection;

        fn create(&self, address: &Address, _context: &AcquireContext) -> Result<TestConnection> {
            if self.unreachable.lock().unwrap().contains(address) {
                return Err(RoutingError::service_unavailable(format!("{address} unreachable")));
            }
            Ok(TestConnection {
                address: address.clone(),
            })
        }

        fn validate_on_acquire(&self, _context: &AcquireContext, _connection: &mut TestConnection) -> bool {
            true
        }

        fn validate_on_release(&self, _connection: &mut TestConnection) -> bool {
            true
        }
    }

    #[derive(Debug)]
    struct ScriptedProcedure {
        responses: Mutex<StdHashMap<Address, VecDeque<std::result::Result<RawRoutingTable, RoutingError>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProcedure {
        fn new() -> Self {
            Self {
                responses: Mutex::new(StdHashMap::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn on(self, address: &str, reply: std::result::Result<RawRoutingTable, RoutingError>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(Address::from(address))
                .or_default()
                .push_back(reply);
            self
        }
    }

    impl RoutingProcedure for ScriptedProcedure {
        fn request_routing_table(
            &self,
            connection: &mut dyn Connection,
            _routing_context: &RoutingContext,
            _database: Option<&str>,
            _session_context: &SessionContext,
        ) -> Result<RawRoutingTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let address = connection.address().clone();
            self.responses
                .lock()
                .unwrap()
                .get_mut(&address)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| Err(RoutingError::service_unavailable("no scripted reply")))
        }
    }

    fn raw(ttl_secs: u64, routers: &[&str], readers: &[&str], writers: &[&str]) -> RawRoutingTable {
        RawRoutingTable {
            ttl: Duration::from_secs(ttl_secs),
            servers: vec![
                ServerRole {
                    role: Role::Route,
                    addresses: routers.iter().map(|a| Address::from(*a)).collect(),
                },
                ServerRole {
                    role: Role::Read,
                    addresses: readers.iter().map(|a| Address::from(*a)).collect(),
                },
                ServerRole {
                    role: Role::Write,
                    addresses: writers.iter().map(|a| Address::from(*a)).collect(),
                },
            ],
        }
    }

    fn provider(
        factory: TestFactory,
        procedure: ScriptedProcedure,
        clock: Arc<ManualClock>,
    ) -> Arc<RoutingConnectionProvider<TestFactory, IdentityResolver, ScriptedProcedure>> {
        Arc::new(RoutingConnectionProvider::new(
            Address::from("s0:7687"),
            factory,
            PoolConfig::new().with_connection_acquisition_timeout(Duration::from_millis(500)),
            RoutingConfig::new(),
            IdentityResolver,
            procedure,
            RoutingContext::new(),
            clock,
        ))
    }

    fn seed_initial_table(
        provider: &RoutingConnectionProvider<TestFactory, IdentityResolver, ScriptedProcedure>,
        now: crate::time::Instant,
    ) {
        provider.registry.insert(
            None,
            RoutingTable::new(
                None,
                vec![Address::from("s1:7687"), Address::from("s2:7687")],
                vec![Address::from("s3:7687"), Address::from("s4:7687")],
                vec![Address::from("s5:7687"), Address::from("s6:7687")],
                Duration::ZERO,
                now,
            ),
        );
    }

    #[test]
    fn scenario_1_stale_table_refresh_via_first_router() {
        let clock = ManualClock::new();
        let factory = TestFactory::new(&[]);
        let procedure =
            ScriptedProcedure::new().on("s1:7687", Ok(raw(300, &["A:7687", "B:7687"], &["C:7687", "D:7687"], &["E:7687", "F:7687"])));
        let provider = provider(factory, procedure, Arc::clone(&clock));
        seed_initial_table(&provider, clock.now());

        let c1 = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Read, None))
            .unwrap();
        let c2 = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Read, None))
            .unwrap();
        assert_eq!(c1.address(), &Address::from("C:7687"));
        assert_eq!(c2.address(), &Address::from("D:7687"));
        assert!(!provider.pool.has(&Address::from("s1:7687")));
        assert!(!provider.pool.has(&Address::from("s3:7687")));
    }

    #[test]
    fn scenario_2_first_router_fails_second_succeeds() {
        let clock = ManualClock::new();
        let factory = TestFactory::new(&["s1:7687"]);
        let procedure =
            ScriptedProcedure::new().on("s2:7687", Ok(raw(300, &["A:7687", "B:7687"], &["C:7687", "D:7687"], &["E:7687", "F:7687"])));
        let provider = provider(factory, procedure, Arc::clone(&clock));
        seed_initial_table(&provider, clock.now());

        let c1 = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Write, None))
            .unwrap();
        let c2 = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Write, None))
            .unwrap();
        assert_eq!(c1.address(), &Address::from("E:7687"));
        assert_eq!(c2.address(), &Address::from("F:7687"));
    }

    #[test]
    fn scenario_3_all_routers_fail_seed_resolves_to_distinct_address() {
        let clock = ManualClock::new();
        let factory = TestFactory::new(&["s1:7687", "s2:7687", "s3:7687"]);
        let procedure =
            ScriptedProcedure::new().on("s01:7687", Ok(raw(300, &["A:7687", "B:7687"], &["C:7687", "D:7687"], &["E:7687", "F:7687"])));
        let provider = Arc::new(RoutingConnectionProvider::new(
            Address::from("s0:7687"),
            factory,
            PoolConfig::new().with_connection_acquisition_timeout(Duration::from_millis(500)),
            RoutingConfig::new(),
            ScriptedResolver {
                resolved: vec![Address::from("s01:7687")],
            },
            procedure,
            RoutingContext::new(),
            Arc::clone(&clock),
        ));
        provider.registry.insert(
            None,
            RoutingTable::new(
                None,
                vec![Address::from("s1:7687"), Address::from("s2:7687"), Address::from("s3:7687")],
                vec![],
                vec![],
                Duration::ZERO,
                clock.now(),
            ),
        );

        let write = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Write, None))
            .unwrap();
        assert_eq!(write.address(), &Address::from("E:7687"));
        let read = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Read, None))
            .unwrap();
        assert_eq!(read.address(), &Address::from("C:7687"));
    }

    #[test]
    fn scenario_4_all_everything_fails() {
        let clock = ManualClock::new();
        let factory = TestFactory::new(&["s1:7687", "s2:7687", "s3:7687", "s0:7687"]);
        let procedure = ScriptedProcedure::new();
        let provider = Arc::new(RoutingConnectionProvider::new(
            Address::from("s0:7687"),
            factory,
            PoolConfig::new().with_connection_acquisition_timeout(Duration::from_millis(500)),
            RoutingConfig::new(),
            ScriptedResolver {
                resolved: vec![Address::from("s0:7687")],
            },
            procedure,
            RoutingContext::new(),
            Arc::clone(&clock),
        ));
        provider.registry.insert(
            None,
            RoutingTable::new(
                None,
                vec![Address::from("s1:7687"), Address::from("s2:7687"), Address::from("s3:7687")],
                vec![],
                vec![],
                Duration::ZERO,
                clock.now(),
            ),
        );

        let err = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Read, None))
            .unwrap_err();
        assert!(matches!(err, RoutingError::ServiceUnavailable { .. }));
        let err2 = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Write, None))
            .unwrap_err();
        assert!(matches!(err2, RoutingError::ServiceUnavailable { .. }));
        assert!(provider.registry.select(&None, AccessMode::Read).is_none());
    }

    #[derive(Debug)]
    struct ScriptedResolver {
        resolved: Vec<Address>,
    }

    impl HostResolver for ScriptedResolver {
        fn resolve(&self, _seed: &Address) -> Vec<Address> {
            self.resolved.clone()
        }
    }

    #[test]
    fn scenario_5_multi_database_isolation_via_delegating_connection() {
        let clock = ManualClock::new();
        let factory = TestFactory::new(&[]);
        let procedure = ScriptedProcedure::new();
        let provider = provider(factory, procedure, Arc::clone(&clock));

        let db_a = Some(Arc::new("databaseA".to_string()));
        let db_b = Some(Arc::new("databaseB".to_string()));
        provider.registry.insert(
            db_a.clone(),
            RoutingTable::new(
                db_a.clone(),
                vec![Address::from("s1:7687"), Address::from("s2:7687"), Address::from("s3:7687")],
                vec![Address::from("s1:7687"), Address::from("s2:7687")],
                vec![Address::from("s3:7687")],
                Duration::from_secs(300),
                clock.now(),
            ),
        );
        provider.registry.insert(
            db_b.clone(),
            RoutingTable::new(
                db_b.clone(),
                vec![Address::from("sA:7687"), Address::from("sB:7687"), Address::from("sC:7687")],
                vec![Address::from("sA:7687"), Address::from("sB:7687")],
                vec![Address::from("sA:7687"), Address::from("sC:7687")],
                Duration::from_secs(300),
                clock.now(),
            ),
        );

        let conn = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Read, db_b.clone()))
            .unwrap();
        conn.handle_error(RoutingError::service_unavailable("connection reset"));

        let tables_a = provider.registry.select(&db_a, AccessMode::Read);
        assert!(tables_a.is_some());
    }

    #[test]
    fn scenario_6_pool_at_capacity_third_acquire_times_out() {
        let clock = ManualClock::new();
        let factory = TestFactory::new(&[]);
        let procedure = ScriptedProcedure::new();
        let config = PoolConfig::new()
            .with_max_connection_pool_size(2)
            .with_connection_acquisition_timeout(Duration::from_millis(50));
        let provider = Arc::new(RoutingConnectionProvider::new(
            Address::from("s0:7687"),
            factory,
            config,
            RoutingConfig::new(),
            IdentityResolver,
            procedure,
            RoutingContext::new(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        provider.registry.insert(
            None,
            RoutingTable::new(
                None,
                vec![Address::from("r1:7687")],
                vec![Address::from("a:7687")],
                vec![],
                Duration::from_secs(300),
                clock.now(),
            ),
        );

        let _c1 = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Read, None))
            .unwrap();
        let _c2 = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Read, None))
            .unwrap();
        let err = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Read, None))
            .unwrap_err();
        assert!(matches!(err, RoutingError::AcquisitionTimeout { .. }));
    }

    #[test]
    fn use_seed_router_first_config_tries_the_seed_before_known_routers_that_have_a_writer() {
        let clock = ManualClock::new();
        // s1 is reachable and would answer if tried, but the config says
        // to try the (distinct) resolved seed first regardless of the
        // existing table already having a writer.
        let factory = TestFactory::new(&[]);
        let procedure = ScriptedProcedure::new()
            .on("s01:7687", Ok(raw(300, &["A:7687"], &["C:7687"], &["E:7687"])))
            .on("s1:7687", Ok(raw(300, &["Z:7687"], &["Y:7687"], &["X:7687"])));
        let provider = Arc::new(RoutingConnectionProvider::new(
            Address::from("s0:7687"),
            factory,
            PoolConfig::new().with_connection_acquisition_timeout(Duration::from_millis(500)),
            RoutingConfig::new().with_use_seed_router_first(true),
            ScriptedResolver {
                resolved: vec![Address::from("s01:7687")],
            },
            procedure,
            RoutingContext::new(),
            Arc::clone(&clock),
        ));
        provider.registry.insert(
            None,
            RoutingTable::new(
                None,
                vec![Address::from("s1:7687")],
                vec![Address::from("s1:7687")],
                vec![Address::from("s1:7687")],
                Duration::ZERO,
                clock.now(),
            ),
        );

        let conn = provider
            .acquire(AcquireRequestArgs::new(AccessMode::Read, None))
            .unwrap();
        assert_eq!(conn.address(), &Address::from("C:7687"));
    }
}
