//! Contact storage
//!
//! The session layer only sees the [`ContactStore`] trait. Two backends:
//! - [`MemoryStore`]: ephemeral, insertion-ordered, used by tests and by a
//!   server started without a database file
//! - [`SqliteStore`]: a single `phonebook` table keyed by `number`

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::model::{Contact, FieldQuery};

/// Outcome of an insert. A duplicate number is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another contact already uses this number; the store is unchanged
    Conflict,
}

/// Shared contact store.
///
/// Send + Sync required: one instance is shared by every session thread
/// behind an `Arc<dyn ContactStore>`. Each call is atomic and self-contained;
/// there are no cross-call transactions.
pub trait ContactStore: Send + Sync {
    /// Insert a contact unless its number is taken
    fn insert(&self, contact: &Contact) -> Result<InsertOutcome>;

    /// Delete the record equal to `contact` on all five fields.
    /// Returns the number of removed rows (0 or 1).
    fn delete(&self, contact: &Contact) -> Result<usize>;

    /// All contacts matching `query` (all contacts for `None`), in the
    /// store's stable scan order
    fn scan(&self, query: Option<&FieldQuery>) -> Result<Vec<Contact>>;

    /// Number of stored contacts
    fn len(&self) -> Result<usize> {
        Ok(self.scan(None)?.len())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
