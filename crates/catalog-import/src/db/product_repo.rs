//! Product catalog repository.
//!
//! Products are matched on `identifier_key`, the lower-cased identifier
//! (see [`natural_key`]). The surrogate `id` is only used as a pagination
//! cursor.

use rusqlite::{params, Row};
use serde::Serialize;

use super::{natural_key, Database, DatabaseError};

/// A normalized product ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    pub identifier: String,
    pub name: String,
    pub description: String,
}

/// A product as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    pub identifier: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

impl Product {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            identifier: row.get("identifier")?,
            name: row.get("name")?,
            description: row.get("description")?,
            active: row.get("active")?,
        })
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub next_cursor: Option<i64>,
    pub has_more: bool,
}

const UPSERT_SQL: &str = "INSERT INTO products (identifier, identifier_key, name, description)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(identifier_key) DO UPDATE SET
         name = excluded.name,
         description = excluded.description";

/// Applies `batch` inside a single transaction and returns the number of
/// rows applied.
///
/// Any statement failure drops the transaction, which rolls the whole
/// batch back. On conflict only `name` and `description` change; the
/// stored key spelling and `active` are left as they were.
pub fn upsert_batch(db: &Database, batch: &[ProductRecord]) -> Result<usize, DatabaseError> {
    if batch.is_empty() {
        return Ok(0);
    }

    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            for record in batch {
                stmt.execute(params![
                    record.identifier,
                    natural_key(&record.identifier),
                    record.name,
                    record.description
                ])?;
            }
        }
        tx.commit()?;
        Ok(batch.len())
    })
}

/// Looks up a product by identifier, ignoring case.
pub fn find_by_identifier(
    db: &Database,
    identifier: &str,
) -> Result<Option<Product>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM products WHERE identifier_key = ?1")?;
        let mut rows = stmt.query_map(params![natural_key(identifier)], Product::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists products with an id greater than `cursor`, at most `count` of them.
pub fn list(db: &Database, cursor: i64, count: u32) -> Result<ProductPage, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM products WHERE id > ?1 ORDER BY id LIMIT ?2")?;
        let mut products: Vec<Product> = stmt
            .query_map(params![cursor, count as i64 + 1], Product::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let has_more = products.len() > count as usize;
        products.truncate(count as usize);
        let next_cursor = products.last().map(|p| p.id);

        Ok(ProductPage {
            products,
            next_cursor,
            has_more,
        })
    })
}

/// Total number of products in the catalog.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn record(identifier: &str, name: &str, description: &str) -> ProductRecord {
        ProductRecord {
            identifier: identifier.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_upsert_inserts_new_products() {
        let db = test_db();
        let applied = upsert_batch(
            &db,
            &[record("A1", "Widget", "x"), record("A2", "Gadget", "z")],
        )
        .unwrap();

        assert_eq!(applied, 2);
        assert_eq!(count(&db).unwrap(), 2);
        let a1 = find_by_identifier(&db, "A1").unwrap().unwrap();
        assert_eq!(a1.name, "Widget");
        assert!(a1.active);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = test_db();
        let batch = [record("A1", "Widget", "x")];
        upsert_batch(&db, &batch).unwrap();
        let first = find_by_identifier(&db, "A1").unwrap().unwrap();

        upsert_batch(&db, &batch).unwrap();
        let second = find_by_identifier(&db, "A1").unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(count(&db).unwrap(), 1);
    }

    #[test]
    fn test_upsert_overwrites_name_and_description() {
        let db = test_db();
        upsert_batch(&db, &[record("A1", "Widget", "x")]).unwrap();
        upsert_batch(&db, &[record("A1", "Widget2", "y")]).unwrap();

        assert_eq!(count(&db).unwrap(), 1);
        let a1 = find_by_identifier(&db, "A1").unwrap().unwrap();
        assert_eq!(a1.name, "Widget2");
        assert_eq!(a1.description.as_deref(), Some("y"));
    }

    #[test]
    fn test_upsert_matches_case_insensitively_and_keeps_key() {
        let db = test_db();
        upsert_batch(&db, &[record("abc-1", "Lower", "x")]).unwrap();
        upsert_batch(&db, &[record("ABC-1", "Upper", "y")]).unwrap();

        assert_eq!(count(&db).unwrap(), 1);
        let product = find_by_identifier(&db, "Abc-1").unwrap().unwrap();
        assert_eq!(product.identifier, "abc-1");
        assert_eq!(product.name, "Upper");
    }

    #[test]
    fn test_upsert_matches_non_ascii_identifiers() {
        let db = test_db();
        upsert_batch(&db, &[record("Ä1", "Apfel", "x")]).unwrap();
        upsert_batch(&db, &[record("ä1", "Apfel grün", "y")]).unwrap();

        assert_eq!(count(&db).unwrap(), 1);
        let product = find_by_identifier(&db, "ä1").unwrap().unwrap();
        assert_eq!(product.identifier, "Ä1");
        assert_eq!(product.name, "Apfel grün");
    }

    #[test]
    fn test_upsert_leaves_active_flag_alone() {
        let db = test_db();
        upsert_batch(&db, &[record("A1", "Widget", "x")]).unwrap();
        db.with_conn(|conn| {
            conn.execute("UPDATE products SET active = 0 WHERE identifier_key = 'a1'", [])?;
            Ok(())
        })
        .unwrap();

        upsert_batch(&db, &[record("a1", "Widget", "new")]).unwrap();

        let a1 = find_by_identifier(&db, "A1").unwrap().unwrap();
        assert!(!a1.active);
        assert_eq!(a1.description.as_deref(), Some("new"));
    }

    #[test]
    fn test_failed_batch_is_rolled_back() {
        let db = test_db();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_boom BEFORE INSERT ON products
                 WHEN NEW.identifier = 'BOOM'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let result = upsert_batch(
            &db,
            &[record("A1", "Widget", "x"), record("BOOM", "Bad", "y")],
        );

        assert!(result.is_err());
        assert_eq!(count(&db).unwrap(), 0);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let db = test_db();
        assert_eq!(upsert_batch(&db, &[]).unwrap(), 0);
    }

    #[test]
    fn test_list_paginates_by_cursor() {
        let db = test_db();
        let batch: Vec<ProductRecord> = (0..5)
            .map(|i| record(&format!("SKU-{}", i), "Item", ""))
            .collect();
        upsert_batch(&db, &batch).unwrap();

        let first = list(&db, 0, 3).unwrap();
        assert_eq!(first.products.len(), 3);
        assert!(first.has_more);

        let second = list(&db, first.next_cursor.unwrap(), 3).unwrap();
        assert_eq!(second.products.len(), 2);
        assert!(!second.has_more);
        assert_eq!(second.products[0].identifier, "SKU-3");
    }
}
