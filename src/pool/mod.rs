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

//! The per-address connection pool.
//!
//! A `Mutex` + `Condvar` guards a `VecDeque` of idle connections per
//! address, with in-flight creations counted as reservations so
//! `max_connection_pool_size` is respected even before a connection
//! materializes, sharded across every known server by a top-level
//! `HashMap<Address, _>`. FIFO ticketing per address serves concurrent
//! acquirers in arrival order; idle entries are revalidated on acquire
//! through the liveness check before being handed back out.

use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use log::{debug, warn};
use parking_lot::RwLock;

use crate::address::Address;
use crate::config::PoolConfig;
use crate::connection::{AcquireContext, Connection, ConnectionFactory};
use crate::error::{Result, RoutingError};
use crate::liveness::LivenessCheck;
use crate::time::{Clock, Instant};

/// The poll granularity used while a waiter blocks on a slot's `Condvar`:
/// short enough that the acquisition deadline and `close()`/`purge()`
/// wake-ups are noticed promptly without busy-waiting.
const WAIT_SLICE: Duration = Duration::from_millis(50);

struct IdleEntry<C> {
    connection: C,
    idle_since: Instant,
    broken: Arc<AtomicBool>,
}

struct SlotState<C> {
    idle: VecDeque<IdleEntry<C>>,
    in_use: usize,
    creating: usize,
    next_ticket: u64,
    now_serving: u64,
    retired: bool,
}

impl<C> SlotState<C> {
    fn occupancy(&self) -> usize {
        self.idle.len() + self.in_use + self.creating
    }
}

struct Slot<C> {
    state: Mutex<SlotState<C>>,
    condvar: Condvar,
}

impl<C> Slot<C> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                idle: VecDeque::new(),
                in_use: 0,
                creating: 0,
                next_ticket: 0,
                now_serving: 0,
                retired: false,
            }),
            condvar: Condvar::new(),
        }
    }
}

enum PopResult<C> {
    Idle(IdleEntry<C>),
    Create,
}

/// The connection pool: one [`Slot`] per address, sharing a single
/// [`ConnectionFactory`] and [`PoolConfig`].
#[derive(Debug)]
pub struct Pool<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    clock: Arc<dyn Clock>,
    liveness: LivenessCheck,
    slots: RwLock<HashMap<Address, Arc<Slot<F::Connection>>>>,
    closed: AtomicBool,
}

impl<F: ConnectionFactory> Debug for Slot<F::Connection>
where
    F::Connection: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot").finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> Pool<F> {
    pub fn new(factory: F, config: PoolConfig, clock: Arc<dyn Clock>) -> Self {
        let liveness = LivenessCheck::new(config.idle_time_before_connection_test);
        Self {
            factory,
            config,
            clock,
            liveness,
            slots: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn max_pool_size(&self) -> usize {
        self.config.max_connection_pool_size
    }

    fn slot_for(&self, address: &Address) -> Arc<Slot<F::Connection>> {
        if let Some(slot) = self.slots.read().get(address) {
            return Arc::clone(slot);
        }
        Arc::clone(
            self.slots
                .write()
                .entry(address.clone())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    /// Acquires a connection to `address`, creating one if the pool has
    /// room and no idle entry validates.
    pub fn acquire(
        self: &Arc<Self>,
        address: &Address,
        context: &AcquireContext,
        require_new: bool,
    ) -> Result<PooledConnection<F>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RoutingError::PoolClosed);
        }
        let slot = self.slot_for(address);
        let enqueued_at = self.clock.now();
        let deadline = enqueued_at + self.config.connection_acquisition_timeout;
        let ticket = {
            let mut state = slot.state.lock().unwrap();
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            ticket
        };

        loop {
            let popped = {
                let mut state = slot.state.lock().unwrap();
                loop {
                    if state.retired {
                        return Err(RoutingError::service_unavailable(format!(
                            "{address} was removed from the pool"
                        )));
                    }
                    if state.now_serving == ticket {
                        if require_new {
                            if let Some(stale) = state.idle.pop_front() {
                                drop(stale);
                            }
                        } else if let Some(entry) = state.idle.pop_front() {
                            break PopResult::Idle(entry);
                        }
                        let unbounded = self.max_pool_size() == 0;
                        if unbounded || state.occupancy() < self.max_pool_size() {
                            state.creating += 1;
                            break PopResult::Create;
                        }
                    }
                    // An unbounded pool never blocks on capacity, but a
                    // waiter can still briefly sit here waiting for its
                    // ticket's turn under FIFO ordering (spec §5); it is
                    // never capacity-blocked, so the acquisition timeout
                    // below still applies only in the bounded case in
                    // practice, since unbounded turns resolve immediately.
                    let now = self.clock.now();
                    if now >= deadline {
                        // A waiter whose ticket was already being served
                        // must hand the turn off before leaving, or
                        // `now_serving` never reaches later tickets again.
                        if state.now_serving == ticket {
                            state.now_serving += 1;
                            drop(state);
                            slot.condvar.notify_all();
                        }
                        return Err(RoutingError::acquisition_timeout(
                            address.clone(),
                            now.saturating_duration_since(enqueued_at).as_millis() as u64,
                        ));
                    }
                    let remaining = deadline.saturating_duration_since(now);
                    let (guard, _timeout) = self
                        .condvar_wait(&slot, state, remaining.min(WAIT_SLICE))
                        .unwrap();
                    state = guard;
                }
            };

            match popped {
                PopResult::Idle(mut entry) => {
                    entry.connection.remove_idle_observer();
                    if entry.broken.load(Ordering::Acquire) {
                        debug!("idle connection to {address} reported an error while idle, destroying");
                        drop(entry);
                        continue;
                    }
                    if self
                        .liveness
                        .applies_to(&entry.connection, entry.idle_since, self.clock.as_ref())
                        && entry.connection.reset_and_flush().is_err()
                    {
                        debug!("idle connection to {address} failed liveness check, destroying");
                        drop(entry);
                        continue;
                    }
                    if !self.factory.validate_on_acquire(context, &mut entry.connection) {
                        debug!("idle connection to {address} failed validation, destroying");
                        drop(entry);
                        continue;
                    }
                    let mut state = slot.state.lock().unwrap();
                    state.in_use += 1;
                    state.now_serving += 1;
                    drop(state);
                    slot.condvar.notify_all();
                    return Ok(PooledConnection::new(entry.connection, Arc::clone(self), slot));
                }
                PopResult::Create => {
                    let created = self.factory.create(address, context);
                    let mut state = slot.state.lock().unwrap();
                    state.creating -= 1;
                    match created {
                        Ok(connection) => {
                            state.in_use += 1;
                            state.now_serving += 1;
                            drop(state);
                            slot.condvar.notify_all();
                            return Ok(PooledConnection::new(connection, Arc::clone(self), slot));
                        }
                        Err(err) => {
                            state.now_serving += 1;
                            drop(state);
                            slot.condvar.notify_all();
                            warn!("failed to create connection to {address}: {err}");
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    fn condvar_wait<'a>(
        &self,
        slot: &'a Slot<F::Connection>,
        state: std::sync::MutexGuard<'a, SlotState<F::Connection>>,
        wait: Duration,
    ) -> std::sync::LockResult<(std::sync::MutexGuard<'a, SlotState<F::Connection>>, bool)> {
        slot.condvar
            .wait_timeout(state, wait)
            .map(|(guard, timeout)| (guard, timeout.timed_out()))
    }

    fn release(&self, address: &Address, slot: &Arc<Slot<F::Connection>>, mut connection: F::Connection) {
        let mut state = slot.state.lock().unwrap();
        state.in_use -= 1;
        if !state.retired && self.factory.validate_on_release(&mut connection) {
            let broken = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&broken);
            connection.install_idle_observer(Arc::new(move || flag.store(true, Ordering::Release)));
            state.idle.push_back(IdleEntry {
                connection,
                idle_since: self.clock.now(),
                broken,
            });
        } else {
            drop(connection);
        }
        drop(state);
        slot.condvar.notify_all();
        let _ = address;
    }

    /// Destroys every idle entry for `address`, marks in-use entries for
    /// destruction on release, and fails every waiter currently queued for
    /// it. A later `acquire` for the same address starts a fresh slot.
    pub fn purge(&self, address: &Address) {
        let removed = self.slots.write().remove(address);
        let Some(slot) = removed else { return };
        let mut state = slot.state.lock().unwrap();
        state.retired = true;
        let idle = std::mem::take(&mut state.idle);
        drop(state);
        drop(idle);
        slot.condvar.notify_all();
    }

    /// Purges every address not present in `addresses`.
    pub fn keep_all(&self, addresses: &[Address]) {
        let keep: std::collections::HashSet<&Address> = addresses.iter().collect();
        let stale: Vec<Address> = self
            .slots
            .read()
            .keys()
            .filter(|addr| !keep.contains(addr))
            .cloned()
            .collect();
        for address in stale {
            self.purge(&address);
        }
    }

    /// Whether the pool currently has a slot tracking `address`.
    pub fn has(&self, address: &Address) -> bool {
        self.slots.read().contains_key(address)
    }

    /// `|in-use| + |creation-in-flight|` for `address`; zero if unknown.
    pub fn active_resource_count(&self, address: &Address) -> usize {
        self.slots
            .read()
            .get(address)
            .map(|slot| {
                let state = slot.state.lock().unwrap();
                state.in_use + state.creating
            })
            .unwrap_or(0)
    }

    /// Purges every address and marks the pool closed; subsequent
    /// `acquire` calls fail with [`RoutingError::PoolClosed`]. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let addresses: Vec<Address> = self.slots.read().keys().cloned().collect();
        for address in addresses {
            self.purge(&address);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A connection on loan from a [`Pool`]. Releases back to the pool's idle
/// list (or destroys itself) when dropped, mirroring `PooledBolt`'s
/// `ManuallyDrop` + `Drop` pattern in `single_pool.rs`.
pub struct PooledConnection<F: ConnectionFactory> {
    pool: Arc<Pool<F>>,
    slot: Arc<Slot<F::Connection>>,
    address: Address,
    connection: ManuallyDrop<F::Connection>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    fn new(connection: F::Connection, pool: Arc<Pool<F>>, slot: Arc<Slot<F::Connection>>) -> Self {
        let address = connection.address().clone();
        Self {
            pool,
            slot,
            address,
            connection: ManuallyDrop::new(connection),
        }
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        // safety: `connection` is never accessed again after this point.
        let connection = unsafe { ManuallyDrop::take(&mut self.connection) };
        self.pool.release(&self.address, &self.slot, connection);
    }
}

impl<F: ConnectionFactory> Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::IdleObserver;
    use crate::time::SystemClock;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Barrier;
    use std::thread;

    #[derive(Debug, Clone, Default)]
    struct ObserverSlot(Arc<Mutex<Option<IdleObserver>>>);

    impl ObserverSlot {
        fn fire(&self) {
            if let Some(cb) = self.0.lock().unwrap().as_ref() {
                cb();
            }
        }
    }

    #[derive(Debug)]
    struct TestConnection {
        address: Address,
        healthy: bool,
        observer: ObserverSlot,
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
            if self.healthy {
                Ok(())
            } else {
                Err(RoutingError::service_unavailable("unhealthy"))
            }
        }

        fn install_idle_observer(&mut self, observer: IdleObserver) {
            *self.observer.0.lock().unwrap() = Some(observer);
        }

        fn remove_idle_observer(&mut self) {
            *self.observer.0.lock().unwrap() = None;
        }
    }

    #[derive(Debug)]
    struct TestFactory {
        created: AtomicUsize,
        fail_create: AtomicBool,
    }

    impl TestFactory {
        fn new() -> Self {
            Self {
                created: AtomicUsize::new(0),
                fail_create: AtomicBool::new(false),
            }
        }
    }

    impl ConnectionFactory for TestFactory {
        type Connection = TestConnection;

        fn create(&self, address: &Address, _context: &AcquireContext) -> Result<TestConnection> {
            if self.fail_create.load(AtomicOrdering::SeqCst) {
                return Err(RoutingError::service_unavailable("refused"));
            }
            self.created.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(TestConnection {
                address: address.clone(),
                healthy: true,
                observer: ObserverSlot::default(),
            })
        }

        fn validate_on_acquire(&self, _context: &AcquireContext, connection: &mut TestConnection) -> bool {
            connection.healthy
        }

        fn validate_on_release(&self, connection: &mut TestConnection) -> bool {
            connection.healthy
        }
    }

    fn test_pool(max_size: usize) -> Arc<Pool<TestFactory>> {
        let config = PoolConfig::new()
            .with_max_connection_pool_size(max_size.max(1))
            .with_connection_acquisition_timeout(Duration::from_millis(200));
        Arc::new(Pool::new(TestFactory::new(), config, Arc::new(SystemClock)))
    }

    #[test]
    fn acquire_creates_new_connection_when_pool_empty() {
        let pool = test_pool(2);
        let addr = Address::new("s1", 7687);
        let conn = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        assert_eq!(conn.address(), &addr);
        assert_eq!(pool.active_resource_count(&addr), 1);
    }

    #[test]
    fn released_connection_is_reused() {
        let pool = test_pool(1);
        let addr = Address::new("s1", 7687);
        {
            let _conn = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        }
        assert_eq!(pool.factory.created.load(AtomicOrdering::SeqCst), 1);
        let _conn = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        assert_eq!(pool.factory.created.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn active_resource_count_never_exceeds_max_pool_size() {
        let pool = test_pool(2);
        let addr = Address::new("s1", 7687);
        let _c1 = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        let _c2 = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        assert_eq!(pool.active_resource_count(&addr), 2);
        let err = pool
            .acquire(&addr, &AcquireContext::default(), false)
            .unwrap_err();
        assert!(matches!(err, RoutingError::AcquisitionTimeout { .. }));
    }

    #[test]
    fn unbounded_pool_never_blocks_and_never_times_out() {
        let config = PoolConfig::new()
            .with_max_connection_pool_size(0)
            .with_connection_acquisition_timeout(Duration::from_millis(1));
        let pool = Arc::new(Pool::new(TestFactory::new(), config, Arc::new(SystemClock)));
        let addr = Address::new("s1", 7687);
        let conns: Vec<_> = (0..50)
            .map(|_| pool.acquire(&addr, &AcquireContext::default(), false).unwrap())
            .collect();
        assert_eq!(pool.active_resource_count(&addr), 50);
        drop(conns);
    }

    #[test]
    fn timed_out_waiter_does_not_wedge_the_slot_for_later_acquirers() {
        let pool = test_pool(1);
        let addr = Address::new("s1", 7687);
        let c1 = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        let timed_out = pool
            .acquire(&addr, &AcquireContext::default(), false)
            .unwrap_err();
        assert!(matches!(timed_out, RoutingError::AcquisitionTimeout { .. }));
        drop(c1);
        let c3 = pool.acquire(&addr, &AcquireContext::default(), false);
        assert!(c3.is_ok(), "later acquirer must not inherit a permanent wedge");
    }

    #[test]
    fn third_waiter_gets_connection_released_by_second() {
        let pool = test_pool(2);
        let addr = Address::new("s1", 7687);
        let c1 = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        let c2 = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let pool2 = Arc::clone(&pool);
        let addr2 = addr.clone();
        let barrier2 = Arc::clone(&barrier);
        let waiter = thread::spawn(move || {
            barrier2.wait();
            pool2.acquire(&addr2, &AcquireContext::default(), false)
        });
        barrier.wait();
        thread::sleep(Duration::from_millis(20));
        drop(c2);
        let result = waiter.join().unwrap();
        assert!(result.is_ok());
        drop(c1);
    }

    #[test]
    fn purge_destroys_idle_entries_and_rejects_new_acquire_on_old_slot() {
        let pool = test_pool(2);
        let addr = Address::new("s1", 7687);
        {
            let _conn = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        }
        assert!(pool.has(&addr));
        pool.purge(&addr);
        assert!(!pool.has(&addr));
    }

    #[test]
    fn purge_is_idempotent() {
        let pool = test_pool(1);
        let addr = Address::new("s1", 7687);
        pool.purge(&addr);
        pool.purge(&addr);
        assert!(!pool.has(&addr));
    }

    #[test]
    fn keep_all_purges_everything_else() {
        let pool = test_pool(1);
        let a = Address::new("a", 7687);
        let b = Address::new("b", 7687);
        pool.acquire(&a, &AcquireContext::default(), false).unwrap();
        pool.acquire(&b, &AcquireContext::default(), false).unwrap();
        pool.keep_all(&[a.clone()]);
        assert!(pool.has(&a));
        assert!(!pool.has(&b));
    }

    #[test]
    fn close_purges_all_and_rejects_new_acquires() {
        let pool = test_pool(1);
        let addr = Address::new("s1", 7687);
        pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        pool.close();
        assert!(pool.is_closed());
        let err = pool
            .acquire(&addr, &AcquireContext::default(), false)
            .unwrap_err();
        assert!(matches!(err, RoutingError::PoolClosed));
        // idempotent
        pool.close();
    }

    #[test]
    fn invalid_idle_entry_is_skipped_and_destroyed() {
        let pool = test_pool(1);
        let addr = Address::new("s1", 7687);
        {
            let mut conn = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
            conn.healthy = false;
        }
        // the released entry failed validate_on_release and was dropped,
        // so this acquire must create a brand new (healthy) connection.
        let conn = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        assert!(conn.healthy);
        assert_eq!(pool.factory.created.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn idle_observer_reporting_an_error_destroys_the_entry_on_next_acquire() {
        let pool = test_pool(1);
        let addr = Address::new("s1", 7687);
        let observer = {
            let conn = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
            conn.observer.clone()
        };
        assert_eq!(pool.factory.created.load(AtomicOrdering::SeqCst), 1);
        observer.fire();
        let conn = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        assert!(conn.healthy);
        assert_eq!(pool.factory.created.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn idle_observer_is_removed_once_the_entry_is_popped_back_out() {
        let pool = test_pool(1);
        let addr = Address::new("s1", 7687);
        let observer = {
            let conn = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
            conn.observer.clone()
        };
        // re-acquiring the now-idle entry pops it and removes its observer.
        let _conn = pool.acquire(&addr, &AcquireContext::default(), false).unwrap();
        assert!(observer.0.lock().unwrap().is_none());
    }
}
