//! Phonebook - multi-client contact directory service
//!
//! A central contact store served over TCP. Clients send framed MessagePack
//! requests (ADD, DELETE, UPDATE) and get exactly one response per request.
//!
//! Layers, leaves first:
//! - [`model`]: contacts, filters, requests and responses
//! - [`protocol`]: MessagePack codec and length-prefixed framing
//! - [`store`]: the [`ContactStore`] trait with in-memory and SQLite backends
//! - [`dispatch`]: request to store operation to response
//! - [`session`]: per-connection receive/dispatch/respond loop
//! - [`server`]: accept loop, one thread per connection
//! - [`client`]: blocking one-request-at-a-time client

pub mod client;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod model;
pub mod protocol;
pub mod server;
pub mod session;
pub mod store;

pub use client::{ClientConfig, ContactClient};
pub use dispatch::{handle_request, ConflictPolicy};
pub use error::{ErrorClass, PhonebookError, Result};
pub use model::{Command, Contact, ContactField, FailureReason, FieldQuery, Filter, Request, Response};
pub use server::{Server, ServerConfig, ShutdownHandle};
pub use store::{ContactStore, InsertOutcome, MemoryStore, SqliteStore};
