//! Command dispatch: maps a decoded [`Request`] onto the store and builds
//! the [`Response`]. No I/O beyond the store calls.

use tracing::{debug, error, warn};

use crate::model::{Command, Contact, FailureReason, Filter, Request, Response};
use crate::store::{ContactStore, InsertOutcome};

/// What an ADD reports when the number is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// `success: false` with `DUPLICATE_NUMBER`
    #[default]
    Report,
    /// `success: true`, the conflict is only logged (legacy clients)
    Swallow,
}

/// Handle one request against the store.
pub fn handle_request(store: &dyn ContactStore, request: Request, policy: ConflictPolicy) -> Response {
    match request {
        Request::Add { contact } => handle_add(store, &contact, policy),
        Request::Delete { contact } => handle_delete(store, &contact),
        Request::Update { filter } => handle_update(store, filter.as_ref()),
    }
}

fn handle_add(store: &dyn ContactStore, contact: &Contact, policy: ConflictPolicy) -> Response {
    match store.insert(contact) {
        Ok(InsertOutcome::Inserted) => Response::ok(Command::Add),
        Ok(InsertOutcome::Conflict) => {
            debug!(number = %contact.number, ?policy, "Insert rejected: number already present");
            match policy {
                ConflictPolicy::Report => Response::failed(Command::Add, FailureReason::DuplicateNumber),
                ConflictPolicy::Swallow => Response::ok(Command::Add),
            }
        }
        Err(e) => {
            error!(error = %e, "Insert failed");
            Response::failed(Command::Add, FailureReason::StoreError)
        }
    }
}

fn handle_delete(store: &dyn ContactStore, contact: &Contact) -> Response {
    match store.delete(contact) {
        Ok(1) => Response::ok(Command::Delete),
        Ok(0) => Response::failed(Command::Delete, FailureReason::NotFound),
        Ok(n) => {
            // Unreachable with a number-keyed store, but never report success for it
            warn!(removed = n, number = %contact.number, "Delete removed more than one row");
            Response::failed(Command::Delete, FailureReason::StoreError)
        }
        Err(e) => {
            error!(error = %e, "Delete failed");
            Response::failed(Command::Delete, FailureReason::StoreError)
        }
    }
}

fn handle_update(store: &dyn ContactStore, filter: Option<&Filter>) -> Response {
    let query = match filter.map(Filter::resolve).transpose() {
        Ok(query) => query.flatten(),
        Err(e) => {
            debug!(error = %e, "Rejecting filter");
            return Response::failed(Command::Update, FailureReason::InvalidField);
        }
    };

    match store.scan(query.as_ref()) {
        Ok(contacts) => Response::contacts(contacts),
        Err(e) => {
            error!(error = %e, "Scan failed");
            Response::failed(Command::Update, FailureReason::StoreError)
        }
    }
}
