//! In-memory contact store

use std::sync::RwLock;

use crate::error::{PhonebookError, Result};
use crate::model::{Contact, FieldQuery};
use crate::store::{ContactStore, InsertOutcome};

/// Ephemeral store backed by an insertion-ordered `Vec`.
///
/// Writers hold the write lock for the whole check-and-insert, so readers
/// never observe a partially applied change.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contacts: RwLock<Vec<Contact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContactStore for MemoryStore {
    fn insert(&self, contact: &Contact) -> Result<InsertOutcome> {
        let mut contacts = self.contacts.write().map_err(|_| PhonebookError::LockPoisoned)?;
        if contacts.iter().any(|c| c.number == contact.number) {
            return Ok(InsertOutcome::Conflict);
        }
        contacts.push(contact.clone());
        Ok(InsertOutcome::Inserted)
    }

    fn delete(&self, contact: &Contact) -> Result<usize> {
        let mut contacts = self.contacts.write().map_err(|_| PhonebookError::LockPoisoned)?;
        // Numbers are unique, so at most one record can be equal
        match contacts.iter().position(|c| c == contact) {
            Some(index) => {
                contacts.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn scan(&self, query: Option<&FieldQuery>) -> Result<Vec<Contact>> {
        let contacts = self.contacts.read().map_err(|_| PhonebookError::LockPoisoned)?;
        Ok(contacts
            .iter()
            .filter(|c| query.map_or(true, |q| q.matches(c)))
            .cloned()
            .collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.contacts.read().map_err(|_| PhonebookError::LockPoisoned)?.len())
    }
}
