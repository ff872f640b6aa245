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

//! # Graph Routing Core
//!
//! Cluster routing and connection-pool core for a graph-database driver:
//! given a logical database reference and an access intent, it returns a
//! live, protocol-ready connection to an appropriate server, keeps the
//! database-to-server mapping fresh as cluster topology changes, pools and
//! recycles connections, and drives retry of higher-level work across
//! transient faults, topology changes and leader step-downs.
//!
//! Wire framing, the message codec, and the application-facing
//! session/transaction API are out of scope: this crate consumes a
//! connection only through the [`connection::ConnectionFactory`] and
//! [`rediscovery::RoutingProcedure`] capabilities, and a host through
//! [`address::HostResolver`]. An embedding driver implements those against
//! its own protocol stack and wires them into [`provider::RoutingConnectionProvider`].
//!
//! ## Basic example
//!
//! ```
//! use std::sync::Arc;
//!
//! use graph_routing_core::address::{Address, IdentityResolver};
//! use graph_routing_core::config::{PoolConfig, RoutingConfig};
//! use graph_routing_core::provider::{AcquireRequestArgs, RoutingConnectionProvider};
//! use graph_routing_core::rediscovery::RoutingContext;
//! use graph_routing_core::routing_table::AccessMode;
//! use graph_routing_core::time::SystemClock;
//!
//! # use graph_routing_core::connection::{AcquireContext, Connection, ConnectionFactory};
//! # use graph_routing_core::error::Result;
//! # use graph_routing_core::rediscovery::{RawRoutingTable, RoutingProcedure, SessionContext};
//! #
//! # #[derive(Debug)]
//! # struct DemoConnection(Address);
//! # impl Connection for DemoConnection {
//! #     fn address(&self) -> &Address { &self.0 }
//! #     fn auth_scheme(&self) -> &str { "none" }
//! #     fn protocol_version(&self) -> (u8, u8) { (5, 4) }
//! #     fn reset_and_flush(&mut self) -> Result<()> { Ok(()) }
//! # }
//! # #[derive(Debug)]
//! # struct DemoFactory;
//! # impl ConnectionFactory for DemoFactory {
//! #     type Connection = DemoConnection;
//! #     fn create(&self, address: &Address, _cx: &AcquireContext) -> Result<DemoConnection> {
//! #         Ok(DemoConnection(address.clone()))
//! #     }
//! #     fn validate_on_acquire(&self, _cx: &AcquireContext, _c: &mut DemoConnection) -> bool { true }
//! #     fn validate_on_release(&self, _c: &mut DemoConnection) -> bool { true }
//! # }
//! # #[derive(Debug)]
//! # struct DemoProcedure;
//! # impl RoutingProcedure for DemoProcedure {
//! #     fn request_routing_table(
//! #         &self,
//! #         connection: &mut dyn Connection,
//! #         _routing_context: &RoutingContext,
//! #         _database: Option<&str>,
//! #         _session_context: &SessionContext,
//! #     ) -> Result<RawRoutingTable> {
//! #         use graph_routing_core::rediscovery::{Role, ServerRole};
//! #         use std::time::Duration;
//! #         let addr = connection.address().clone();
//! #         Ok(RawRoutingTable {
//! #             ttl: Duration::from_secs(300),
//! #             servers: vec![
//! #                 ServerRole { role: Role::Route, addresses: vec![addr.clone()] },
//! #                 ServerRole { role: Role::Read, addresses: vec![addr.clone()] },
//! #                 ServerRole { role: Role::Write, addresses: vec![addr] },
//! #             ],
//! #         })
//! #     }
//! # }
//!
//! let seed = Address::new("localhost", 7687);
//! let provider = Arc::new(RoutingConnectionProvider::new(
//!     seed,
//!     DemoFactory,
//!     PoolConfig::new(),
//!     RoutingConfig::new(),
//!     IdentityResolver,
//!     DemoProcedure,
//!     RoutingContext::new(),
//!     Arc::new(SystemClock),
//! ));
//!
//! let connection = provider
//!     .acquire(AcquireRequestArgs::new(AccessMode::Read, None))
//!     .unwrap();
//! println!("acquired connection to {}", connection.address());
//! ```

pub mod address;
pub mod bookmarks;
pub mod config;
pub mod connection;
pub mod error;
mod liveness;
pub mod pool;
pub mod provider;
pub mod rediscovery;
mod registry;
pub mod retry;
pub mod routing_table;
mod sync;
pub mod time;

pub use address::Address;
pub use error::{Result, RoutingError};
