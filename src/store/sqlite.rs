//! SQLite-backed contact store
//!
//! Schema: one `phonebook` table keyed by `number`, created on open if it
//! does not exist. Filter columns come from [`ContactField::as_str`], never
//! from client text; the search text is always a bound parameter.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, Row};
use tracing::debug;

use crate::error::{PhonebookError, Result};
use crate::model::{Contact, ContactField, FieldQuery};
use crate::store::{ContactStore, InsertOutcome};

const TABLE: &str = "phonebook";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Opening SQLite contact store");
        Self::from_connection(Connection::open(path)?)
    }

    /// Private in-memory database, lost when the store is dropped
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (
                name TEXT NOT NULL,
                surname TEXT NOT NULL,
                patronymic TEXT NOT NULL,
                number TEXT NOT NULL,
                note TEXT,
                PRIMARY KEY (number)
            );"
        ))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().map_err(|_| PhonebookError::LockPoisoned)?;
        f(&conn)
    }
}

fn row_to_contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        name: row.get(0)?,
        surname: row.get(1)?,
        patronymic: row.get(2)?,
        number: row.get(3)?,
        note: row.get(4)?,
    })
}

fn column(field: ContactField) -> &'static str {
    field.as_str()
}

impl ContactStore for SqliteStore {
    fn insert(&self, contact: &Contact) -> Result<InsertOutcome> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {TABLE} (name, surname, patronymic, number, note)
                     VALUES (?1, ?2, ?3, ?4, ?5)"
                ),
                params![
                    contact.name,
                    contact.surname,
                    contact.patronymic,
                    contact.number,
                    contact.note
                ],
            )?;
            Ok(if inserted == 1 { InsertOutcome::Inserted } else { InsertOutcome::Conflict })
        })
    }

    fn delete(&self, contact: &Contact) -> Result<usize> {
        self.with_conn(|conn| {
            // `IS` so that an absent note matches an absent note
            let removed = conn.execute(
                &format!(
                    "DELETE FROM {TABLE}
                     WHERE name = ?1 AND surname = ?2 AND patronymic = ?3
                       AND number = ?4 AND note IS ?5"
                ),
                params![
                    contact.name,
                    contact.surname,
                    contact.patronymic,
                    contact.number,
                    contact.note
                ],
            )?;
            Ok(removed)
        })
    }

    fn scan(&self, query: Option<&FieldQuery>) -> Result<Vec<Contact>> {
        self.with_conn(|conn| {
            let select = format!("SELECT name, surname, patronymic, number, note FROM {TABLE}");
            let contacts = match query {
                Some(q) => {
                    // instr() is a case-sensitive literal substring test
                    let sql = format!(
                        "{select} WHERE instr({}, ?1) > 0 ORDER BY rowid",
                        column(q.field)
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(params![q.text], row_to_contact)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!("{select} ORDER BY rowid"))?;
                    let rows = stmt.query_map([], row_to_contact)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(contacts)
        })
    }

    fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}
