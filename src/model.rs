//! Contact records and the request/response messages exchanged over the wire.
//!
//! Every type here is a short-lived value: built per call, encoded by
//! [`crate::protocol`], and dropped once the round trip completes. The
//! store is the only long-lived state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PhonebookError, Result};

/// A directory record keyed by phone number.
///
/// Two contacts are equal only when all five fields match, not just `number`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub surname: String,
    pub patronymic: String,
    /// Identity key, unique within a store
    pub number: String,
    #[serde(default)]
    pub note: Option<String>,
}

impl Contact {
    pub fn new(
        name: impl Into<String>,
        surname: impl Into<String>,
        patronymic: impl Into<String>,
        number: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            surname: surname.into(),
            patronymic: patronymic.into(),
            number: number.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Value of one attribute. `None` only for an absent note.
    pub fn field(&self, field: ContactField) -> Option<&str> {
        match field {
            ContactField::Name => Some(&self.name),
            ContactField::Surname => Some(&self.surname),
            ContactField::Patronymic => Some(&self.patronymic),
            ContactField::Number => Some(&self.number),
            ContactField::Note => self.note.as_deref(),
        }
    }
}

/// `"<name> <patronymic> <surname> <number>"`, followed by `" Note: <note>"`
/// only when the note is present and non-empty.
impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.name, self.patronymic, self.surname, self.number)?;
        if let Some(note) = self.note.as_deref().filter(|n| !n.is_empty()) {
            write!(f, " Note: {}", note)?;
        }
        Ok(())
    }
}

/// The five searchable contact attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactField {
    Name,
    Surname,
    Patronymic,
    Number,
    Note,
}

impl ContactField {
    pub const ALL: [ContactField; 5] = [
        ContactField::Name,
        ContactField::Surname,
        ContactField::Patronymic,
        ContactField::Number,
        ContactField::Note,
    ];

    /// Wire name, also the store column name
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactField::Name => "name",
            ContactField::Surname => "surname",
            ContactField::Patronymic => "patronymic",
            ContactField::Number => "number",
            ContactField::Note => "note",
        }
    }
}

impl FromStr for ContactField {
    type Err = PhonebookError;

    fn from_str(s: &str) -> Result<Self> {
        ContactField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| PhonebookError::InvalidField(s.to_string()))
    }
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional (field, text) predicate sent with UPDATE.
///
/// The field travels as a plain string so that an unknown name reaches the
/// dispatcher and gets an `INVALID_FIELD` answer instead of a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl Filter {
    pub fn new(field: ContactField, text: impl Into<String>) -> Self {
        Self {
            field: Some(field.as_str().to_string()),
            text: Some(text.into()),
        }
    }

    /// Resolve into a store query.
    ///
    /// Returns `Ok(None)` ("match all") when either component is missing.
    pub fn resolve(&self) -> Result<Option<FieldQuery>> {
        match (&self.field, &self.text) {
            (Some(field), Some(text)) => Ok(Some(FieldQuery {
                field: field.parse()?,
                text: text.clone(),
            })),
            _ => Ok(None),
        }
    }
}

/// A validated substring match on one contact attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldQuery {
    pub field: ContactField,
    pub text: String,
}

impl FieldQuery {
    pub fn new(field: ContactField, text: impl Into<String>) -> Self {
        Self { field, text: text.into() }
    }

    /// Case-sensitive substring match. An absent note never matches.
    pub fn matches(&self, contact: &Contact) -> bool {
        contact
            .field(self.field)
            .map_or(false, |value| value.contains(self.text.as_str()))
    }
}

/// Protocol command. `Update` fetches the (optionally filtered) list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Add,
    Delete,
    Update,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::Add => "ADD",
            Command::Delete => "DELETE",
            Command::Update => "UPDATE",
        })
    }
}

/// Request from client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum Request {
    Add { contact: Contact },
    /// Exact match on all five fields
    Delete { contact: Contact },
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Filter>,
    },
}

impl Request {
    pub fn command(&self) -> Command {
        match self {
            Request::Add { .. } => Command::Add,
            Request::Delete { .. } => Command::Delete,
            Request::Update { .. } => Command::Update,
        }
    }
}

/// Why a request reported `success: false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    DuplicateNumber,
    NotFound,
    InvalidField,
    StoreError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::DuplicateNumber => "DUPLICATE_NUMBER",
            FailureReason::NotFound => "NOT_FOUND",
            FailureReason::InvalidField => "INVALID_FIELD",
            FailureReason::StoreError => "STORE_ERROR",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response to client. `command` echoes the request's command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub command: Command,
    pub success: bool,
    /// Matching contacts, present only for a successful UPDATE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<Contact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl Response {
    pub fn ok(command: Command) -> Self {
        Self { command, success: true, contacts: None, reason: None }
    }

    pub fn failed(command: Command, reason: FailureReason) -> Self {
        Self { command, success: false, contacts: None, reason: Some(reason) }
    }

    pub fn contacts(contacts: Vec<Contact>) -> Self {
        Self {
            command: Command::Update,
            success: true,
            contacts: Some(contacts),
            reason: None,
        }
    }
}
