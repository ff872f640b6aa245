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

//! The rediscovery engine: invokes the cluster routing procedure on one
//! router connection and converts its reply into a [`RoutingTable`].
//!
//! The wire call itself — encoding the `ROUTE` message (or whatever a given
//! protocol version uses) and decoding its reply into role-tagged address
//! lists — is an opaque, out-of-scope concern; this module only consumes
//! it through [`RoutingProcedure`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::address::Address;
use crate::bookmarks::Bookmarks;
use crate::connection::Connection;
use crate::error::{Result, RoutingError};
use crate::routing_table::RoutingTable;
use crate::time::Instant;

/// Custom routing parameters threaded through to the routing procedure
/// (e.g. client-side routing policies attached to the connection URI).
/// Opaque to this crate: carried verbatim, never inspected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingContext {
    values: HashMap<String, String>,
}

impl RoutingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Session-scoped context the routing procedure call carries alongside the
/// database name.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub bookmarks: Bookmarks,
    pub impersonated_user: Option<String>,
}

/// A role a server can advertise in a routing-table reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Route,
    Read,
    Write,
}

/// One `{role, addresses}` entry of a raw routing-table reply.
#[derive(Debug, Clone)]
pub struct ServerRole {
    pub role: Role,
    pub addresses: Vec<Address>,
}

/// The not-yet-validated wire reply: `{ttl, servers: [{role,
/// addresses[]}]}`. Decoding the raw protocol message into this shape is the
/// connection factory's job; this crate starts from here.
#[derive(Debug, Clone)]
pub struct RawRoutingTable {
    pub ttl: Duration,
    pub servers: Vec<ServerRole>,
}

/// The cluster routing procedure capability.
pub trait RoutingProcedure: Debug + Send + Sync {
    /// Runs the routing procedure against `connection`. Errors flow through
    /// the usual [`RoutingError`] taxonomy; [`Rediscovery::discover`]
    /// applies its own error-mapping table on top of whatever this returns.
    fn request_routing_table(
        &self,
        connection: &mut dyn Connection,
        routing_context: &RoutingContext,
        database: Option<&str>,
        session_context: &SessionContext,
    ) -> Result<RawRoutingTable>;
}

/// The outcome of probing one router, already folded through this engine's
/// error mapping table.
#[derive(Debug)]
pub(crate) enum DiscoverOutcome {
    /// A structurally valid table. The refresh discipline still decides
    /// whether an empty role list makes it unusable.
    Accepted(RoutingTable),
    /// `null`/a recognized routing-not-supported or otherwise non-fatal
    /// error: the caller should forget this router and try the next one.
    Recoverable,
    /// A fatal error (protocol violation, authentication failure, or a
    /// database-level error such as `DatabaseNotFound`): abort the refresh
    /// outright rather than trying another router.
    Fatal(RoutingError),
}

#[derive(Debug)]
pub(crate) struct Rediscovery<P: RoutingProcedure> {
    procedure: P,
}

impl<P: RoutingProcedure> Rediscovery<P> {
    pub(crate) fn new(procedure: P) -> Self {
        Self { procedure }
    }

    /// Calls the routing procedure on `connection` and materializes a
    /// [`RoutingTable`], or classifies the failure per the error-mapping
    /// table.
    pub(crate) fn discover(
        &self,
        connection: &mut dyn Connection,
        routing_context: &RoutingContext,
        database: Option<&Arc<String>>,
        session_context: &SessionContext,
        now: Instant,
    ) -> DiscoverOutcome {
        let database_name = database.map(|d| d.as_str());
        match self
            .procedure
            .request_routing_table(connection, routing_context, database_name, session_context)
        {
            Ok(raw) => match build_table(database.cloned(), raw, now) {
                Ok(table) => DiscoverOutcome::Accepted(table),
                Err(err) => DiscoverOutcome::Fatal(err),
            },
            Err(err) if err.fatal_during_discovery() => DiscoverOutcome::Fatal(err),
            // DatabaseNotFound-style failures are fatal for this specific
            // database, propagated unchanged rather than tried against the
            // next router.
            Err(err @ RoutingError::DatabaseError(_)) => DiscoverOutcome::Fatal(err),
            Err(_) => DiscoverOutcome::Recoverable,
        }
    }
}

/// Validates and converts a raw reply into a [`RoutingTable`], failing with
/// `ProtocolError` when the server-role list is absent or malformed. A
/// role list being legitimately *empty* is not malformation — that is a
/// refresh-discipline-level acceptance decision, see DESIGN.md — this only
/// rejects a structurally broken reply.
fn build_table(database: Option<Arc<String>>, raw: RawRoutingTable, now: Instant) -> Result<RoutingTable> {
    if raw.servers.is_empty() {
        return Err(RoutingError::protocol_error(
            "routing table reply named no server roles",
        ));
    }
    let mut routers = None;
    let mut readers = None;
    let mut writers = None;
    for entry in raw.servers {
        let slot = match entry.role {
            Role::Route => &mut routers,
            Role::Read => &mut readers,
            Role::Write => &mut writers,
        };
        if slot.is_some() {
            return Err(RoutingError::protocol_error(format!(
                "routing table reply named role {:?} more than once",
                entry.role
            )));
        }
        *slot = Some(entry.addresses);
    }
    Ok(RoutingTable::new(
        database,
        routers.unwrap_or_default(),
        readers.unwrap_or_default(),
        writers.unwrap_or_default(),
        raw.ttl,
        now,
    ))
}
