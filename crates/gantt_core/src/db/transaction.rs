//! Scoped write transaction helper.
//!
//! # Invariants
//! - Writers take the SQLite reserved lock up front (`BEGIN IMMEDIATE`), so
//!   concurrent mutations are serialized by the database.
//! - A transaction that is not committed is rolled back when dropped.
//! - Nested calls run under a savepoint of the open transaction: a failed
//!   nested call undoes its own writes and nothing else.

use log::warn;
use rusqlite::{Connection, Transaction, TransactionBehavior};

const SAVEPOINT_NAME: &str = "gantt_write";

/// Runs `work` inside one immediate write transaction.
///
/// When `conn` is already inside a transaction, `work` runs under a
/// savepoint: on `Err` its writes are rolled back to the savepoint and the
/// outer owner still decides whether to commit the rest. Otherwise a new
/// transaction is opened, committed on `Ok` and rolled back on `Err`.
pub fn with_write_transaction<T, E, F>(conn: &Connection, work: F) -> Result<T, E>
where
    F: FnOnce(&Connection) -> Result<T, E>,
    E: From<rusqlite::Error>,
{
    if !conn.is_autocommit() {
        return with_savepoint(conn, work);
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = work(&*tx)?;
    tx.commit()?;
    Ok(value)
}

fn with_savepoint<T, E, F>(conn: &Connection, work: F) -> Result<T, E>
where
    F: FnOnce(&Connection) -> Result<T, E>,
    E: From<rusqlite::Error>,
{
    conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT_NAME};"))?;
    let guard = SavepointGuard {
        conn,
        released: false,
    };
    let value = work(conn)?;
    guard.release()?;
    Ok(value)
}

/// Rolls the innermost savepoint back unless it was released.
struct SavepointGuard<'conn> {
    conn: &'conn Connection,
    released: bool,
}

impl SavepointGuard<'_> {
    fn release(mut self) -> rusqlite::Result<()> {
        self.released = true;
        self.conn.execute_batch(&format!("RELEASE {SAVEPOINT_NAME};"))
    }
}

impl Drop for SavepointGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let sql = format!("ROLLBACK TO {SAVEPOINT_NAME}; RELEASE {SAVEPOINT_NAME};");
        if let Err(err) = self.conn.execute_batch(&sql) {
            warn!("event=savepoint_rollback module=db status=error error={err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::with_write_transaction;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE items (value INTEGER NOT NULL);")
            .unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM items;", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn commits_on_success() {
        let conn = setup();
        with_write_transaction::<_, rusqlite::Error, _>(&conn, |tx| {
            tx.execute("INSERT INTO items (value) VALUES (1);", [])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(count(&conn), 1);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn rolls_back_every_write_on_error() {
        let conn = setup();
        let result = with_write_transaction::<(), rusqlite::Error, _>(&conn, |tx| {
            tx.execute("INSERT INTO items (value) VALUES (1);", [])?;
            tx.execute("INSERT INTO missing_table (value) VALUES (2);", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(count(&conn), 0);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn nested_call_joins_outer_transaction() {
        let conn = setup();
        let result = with_write_transaction::<(), rusqlite::Error, _>(&conn, |outer| {
            with_write_transaction::<_, rusqlite::Error, _>(outer, |inner| {
                inner.execute("INSERT INTO items (value) VALUES (1);", [])?;
                Ok(())
            })?;
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert!(result.is_err());
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn failed_nested_call_keeps_outer_writes() {
        let conn = setup();
        with_write_transaction::<(), rusqlite::Error, _>(&conn, |outer| {
            outer.execute("INSERT INTO items (value) VALUES (1);", [])?;
            let nested = with_write_transaction::<(), rusqlite::Error, _>(outer, |inner| {
                inner.execute("INSERT INTO items (value) VALUES (2);", [])?;
                inner.execute("INSERT INTO missing_table (value) VALUES (3);", [])?;
                Ok(())
            });
            assert!(nested.is_err());
            outer.execute("INSERT INTO items (value) VALUES (4);", [])?;
            Ok(())
        })
        .unwrap();

        let mut stmt = conn.prepare("SELECT value FROM items ORDER BY value;").unwrap();
        let values: Vec<i64> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(values, vec![1, 4]);
        assert!(conn.is_autocommit());
    }
}
