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

//! Bookmarks exchanged with the rediscovery wire call's session context.
//!
//! No `BookmarkManager` supply/consume-callback machinery here: managing
//! bookmarks across multiple databases is an application-facing session
//! concern out of scope for this crate, which only needs an immutable set
//! to carry through to the routing procedure untouched.

use std::collections::HashSet;
use std::sync::Arc;

/// An immutable set of bookmark strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bookmarks {
    values: HashSet<Arc<String>>,
}

impl Bookmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|s| s.as_str())
    }

    /// The union of `self` and `other`, used when a transaction accumulates
    /// bookmarks across several prior results.
    pub fn merge(&self, other: &Bookmarks) -> Bookmarks {
        Bookmarks {
            values: self.values.union(&other.values).cloned().collect(),
        }
    }
}

impl FromIterator<String> for Bookmarks {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(Arc::new).collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for Bookmarks {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(String::from).collect()
    }
}
