//! Integration test: MemoryStore and SqliteStore behavioral equivalence.
//!
//! Both backends sit behind the ContactStore trait; the same operation
//! sequence must produce the same outcomes and the same scan results.
//! Properties are checked with proptest over small random directories.

use phonebook::{Contact, ContactField, ContactStore, FieldQuery, InsertOutcome, MemoryStore, SqliteStore};
use proptest::prelude::*;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn create_stores() -> (MemoryStore, TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let sqlite = SqliteStore::open(dir.path().join("phonebook.db")).unwrap();
    (MemoryStore::new(), dir, sqlite)
}

/// Small alphabet so that numbers collide and substrings hit often
fn short_text() -> impl Strategy<Value = String> {
    "[abcAB+1]{0,4}"
}

fn contact_strategy() -> impl Strategy<Value = Contact> {
    (
        short_text(),
        short_text(),
        short_text(),
        "[+12]{1,3}",
        proptest::option::of(short_text()),
    )
        .prop_map(|(name, surname, patronymic, number, note)| Contact {
            name,
            surname,
            patronymic,
            number,
            note,
        })
}

fn field_strategy() -> impl Strategy<Value = ContactField> {
    prop::sample::select(ContactField::ALL.to_vec())
}

#[derive(Debug, Clone)]
enum Op {
    Insert(Contact),
    Delete(Contact),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => contact_strategy().prop_map(Op::Insert),
        1 => contact_strategy().prop_map(Op::Delete),
    ]
}

// ---------------------------------------------------------------------------
// Tests: Basic Operations
// ---------------------------------------------------------------------------

#[test]
fn insert_delete_scan_equivalent() {
    let (memory, _dir, sqlite) = create_stores();
    let stores: [&dyn ContactStore; 2] = [&memory, &sqlite];

    let ivan = Contact::new("Ivan", "Petrov", "Sergeevich", "+1000").with_note("");
    let petr = Contact::new("Petr", "Ivanov", "Olegovich", "+2000");

    for store in stores {
        assert_eq!(store.insert(&ivan).unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert(&petr).unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert(&ivan).unwrap(), InsertOutcome::Conflict);
        assert_eq!(store.scan(None).unwrap(), vec![ivan.clone(), petr.clone()]);

        let q = FieldQuery::new(ContactField::Surname, "etr");
        assert_eq!(store.scan(Some(&q)).unwrap(), vec![ivan.clone()]);

        assert_eq!(store.delete(&ivan).unwrap(), 1);
        assert_eq!(store.delete(&ivan).unwrap(), 0);
        assert_eq!(store.len().unwrap(), 1);
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn backends_agree_on_random_operations(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let (memory, _dir, sqlite) = create_stores();

        for op in &ops {
            match op {
                Op::Insert(c) => {
                    prop_assert_eq!(memory.insert(c).unwrap(), sqlite.insert(c).unwrap());
                }
                Op::Delete(c) => {
                    prop_assert_eq!(memory.delete(c).unwrap(), sqlite.delete(c).unwrap());
                }
            }
        }

        prop_assert_eq!(memory.scan(None).unwrap(), sqlite.scan(None).unwrap());
    }

    #[test]
    fn filtered_scan_is_substring_subset(
        contacts in prop::collection::vec(contact_strategy(), 0..30),
        field in field_strategy(),
        text in short_text(),
    ) {
        let (memory, _dir, sqlite) = create_stores();
        for c in &contacts {
            memory.insert(c).unwrap();
            sqlite.insert(c).unwrap();
        }

        let query = FieldQuery::new(field, text.clone());
        for store in [&memory as &dyn ContactStore, &sqlite] {
            let all = store.scan(None).unwrap();
            let expected: Vec<Contact> = all
                .iter()
                .filter(|c| c.field(field).map_or(false, |v| v.contains(text.as_str())))
                .cloned()
                .collect();
            prop_assert_eq!(store.scan(Some(&query)).unwrap(), expected);
        }
    }

    #[test]
    fn inserted_unique_contact_scans_back_once(contact in contact_strategy()) {
        let (memory, _dir, sqlite) = create_stores();
        for store in [&memory as &dyn ContactStore, &sqlite] {
            prop_assert_eq!(store.insert(&contact).unwrap(), InsertOutcome::Inserted);
            let all = store.scan(None).unwrap();
            prop_assert_eq!(all.iter().filter(|c| **c == contact).count(), 1);

            prop_assert_eq!(store.delete(&contact).unwrap(), 1);
            prop_assert_eq!(store.delete(&contact).unwrap(), 0);
        }
    }
}
