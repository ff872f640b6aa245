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

//! The connection factory capability and the pooled-connection wrapper
//! every acquired connection is handed out through.
//!
//! Wire framing, handshake and the message codec are explicitly out of
//! scope; this crate only consumes a connection through the capability set
//! below, treating it as an opaque thing the pool creates, validates and
//! destroys without knowing its protocol internals.

use std::fmt::Debug;
use std::sync::Arc;

use crate::address::Address;
use crate::error::Result;

/// A hook a connection invokes to report an asynchronous error (e.g. a
/// server-pushed `GOAWAY`, a socket error noticed by a background reader)
/// while sitting idle in the pool. The pool installs one on every entry it
/// pushes onto the idle list and removes it the moment the entry is popped
/// back out, so the observer only ever fires for entries genuinely idle.
pub type IdleObserver = Arc<dyn Fn() + Send + Sync>;

/// The per-connection capability set the core consumes.
pub trait Connection: Debug + Send {
    fn address(&self) -> &Address;

    /// The authentication scheme name (e.g. `"basic"`, `"none"`). The
    /// liveness check skips connections on the `"none"` scheme since
    /// nothing about their credentials can go stale.
    fn auth_scheme(&self) -> &str;

    fn protocol_version(&self) -> (u8, u8);

    /// Revalidates an idle connection before handing it back out.
    fn reset_and_flush(&mut self) -> Result<()>;

    /// Installs the hook that marks this entry broken while idle.
    /// Connections with no background error channel can leave this a
    /// no-op: the pool still re-validates every idle entry at acquire
    /// time via [`Connection::reset_and_flush`], which alone already
    /// retires a connection that went bad while idle.
    fn install_idle_observer(&mut self, _observer: IdleObserver) {}

    fn remove_idle_observer(&mut self) {}
}

/// Context carried alongside an acquisition: the impersonated user (if
/// any) a connection must be authenticated as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquireContext {
    pub impersonated_user: Option<String>,
}

/// Creates, validates and destroys connections for a single address. Every
/// hand-out is preceded by a health probe on the popped idle entry. There
/// is no `destroy`: a connection is destroyed by dropping it.
pub trait ConnectionFactory: Debug + Send + Sync {
    type Connection: Connection;

    fn create(&self, address: &Address, context: &AcquireContext) -> Result<Self::Connection>;

    /// Runs before a freshly-popped idle entry is handed to a caller.
    /// Returning `false` causes the entry to be destroyed and the next
    /// idle entry (or a fresh creation) to be tried instead.
    fn validate_on_acquire(
        &self,
        context: &AcquireContext,
        connection: &mut Self::Connection,
    ) -> bool;

    /// Runs when a connection is released back to the pool. Returning
    /// `false` destroys it instead of returning it to the idle list.
    fn validate_on_release(&self, connection: &mut Self::Connection) -> bool;
}
