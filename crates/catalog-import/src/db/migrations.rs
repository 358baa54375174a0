//! Schema setup for the job and catalog tables.
//!
//! The applied step is stored in SQLite's `user_version` header field.
//! Each step runs in its own transaction together with the version bump.

use rusqlite::Connection;

use super::error::DatabaseError;

/// Schema steps, applied in order. Step `n` brings the file to version `n + 1`.
const STEPS: &[&str] = &[
    include_str!("sql/001_create_ingest_jobs.sql"),
    include_str!("sql/002_create_products.sql"),
];

/// The version a fully set-up database reports.
pub const SCHEMA_VERSION: u32 = STEPS.len() as u32;

pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.pragma_query_value(None, "user_version", |r| r.get(0))?)
}

/// Brings the schema up to [`SCHEMA_VERSION`].
pub fn apply(conn: &mut Connection) -> Result<(), DatabaseError> {
    let current = schema_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(DatabaseError::SchemaTooNew {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    for (version, sql) in (1u32..).zip(STEPS).skip(current as usize) {
        let step = |source: rusqlite::Error| DatabaseError::Migration { version, source };
        let tx = conn.transaction().map_err(step)?;
        tx.execute_batch(sql).map_err(step)?;
        tx.pragma_update(None, "user_version", version).map_err(step)?;
        tx.commit().map_err(step)?;
        log::info!("Catalog schema upgraded to version {}", version);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        apply(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_fresh_database_reaches_latest_version() {
        let mut conn = fresh();
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);

        // A second pass finds nothing to do.
        apply(&mut conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();

        let err = apply(&mut conn).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::SchemaTooNew { found, supported }
                if found == SCHEMA_VERSION + 1 && supported == SCHEMA_VERSION
        ));
    }

    #[test]
    fn test_partial_database_gets_remaining_steps() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(STEPS[0]).unwrap();
        conn.pragma_update(None, "user_version", 1u32).unwrap();

        apply(&mut conn).unwrap();

        let products: u32 = conn
            .query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))
            .unwrap();
        assert_eq!(products, 0);
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_natural_keys_are_unique() {
        let conn = fresh();

        conn.execute(
            "INSERT INTO ingest_jobs (id, file_name, file_name_key, created_at, updated_at)
             VALUES ('j1', 'Äpfel.csv', 'äpfel.csv', '2026-01-01', '2026-01-01')",
            [],
        )
        .unwrap();
        let dup_job = conn.execute(
            "INSERT INTO ingest_jobs (id, file_name, file_name_key, created_at, updated_at)
             VALUES ('j2', 'äpfel.csv', 'äpfel.csv', '2026-01-01', '2026-01-01')",
            [],
        );
        assert!(dup_job.is_err());

        conn.execute(
            "INSERT INTO products (identifier, identifier_key, name) VALUES ('Ä1', 'ä1', 'First')",
            [],
        )
        .unwrap();
        let dup_product = conn.execute(
            "INSERT INTO products (identifier, identifier_key, name) VALUES ('ä1', 'ä1', 'Second')",
            [],
        );
        assert!(dup_product.is_err());
    }
}
