//! Query keys.

use crate::client::platform::Filter;
use std::fmt;
use uuid::Uuid;

/// What part of a resource a query covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A list, optionally narrowed by equality filters (kept sorted)
    List(Vec<Filter>),
    /// One row
    Detail(Uuid),
    /// A value computed from one or more tables
    Aggregate,
}

/// Identifies one cached query: resource, owner and scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    /// Table name, or aggregate name for [`Scope::Aggregate`]
    pub resource: &'static str,
    /// Owner the data belongs to
    pub owner: Uuid,
    /// Which slice of the resource this key covers
    pub scope: Scope,
}

impl QueryKey {
    /// Full list of the owner's rows.
    #[must_use]
    pub const fn list(resource: &'static str, owner: Uuid) -> Self {
        Self {
            resource,
            owner,
            scope: Scope::List(Vec::new()),
        }
    }

    /// Filtered list; filter order does not matter.
    #[must_use]
    pub fn filtered(resource: &'static str, owner: Uuid, mut filters: Vec<Filter>) -> Self {
        filters.sort();
        filters.dedup();
        Self {
            resource,
            owner,
            scope: Scope::List(filters),
        }
    }

    /// A single row.
    #[must_use]
    pub const fn detail(resource: &'static str, owner: Uuid, id: Uuid) -> Self {
        Self {
            resource,
            owner,
            scope: Scope::Detail(id),
        }
    }

    /// A computed value.
    #[must_use]
    pub const fn aggregate(resource: &'static str, owner: Uuid) -> Self {
        Self {
            resource,
            owner,
            scope: Scope::Aggregate,
        }
    }

    /// Whether the key belongs to `resource` for `owner`.
    #[must_use]
    pub fn covers(&self, resource: &str, owner: Uuid) -> bool {
        self.resource == resource && self.owner == owner
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::List(filters) if filters.is_empty() => write!(f, "{}/list", self.resource),
            Scope::List(filters) => {
                write!(f, "{}/list?", self.resource)?;
                for (i, filter) in filters.iter().enumerate() {
                    if i > 0 {
                        f.write_str("&")?;
                    }
                    write!(f, "{}={}", filter.column, filter.value)?;
                }
                Ok(())
            }
            Scope::Detail(id) => write!(f, "{}/{id}", self.resource),
            Scope::Aggregate => f.write_str(self.resource),
        }
    }
}
