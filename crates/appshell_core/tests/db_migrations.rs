use appshell_core::db::migrations::{latest_version, schema_version, upgrade_schema, SchemaUpgrade};
use appshell_core::db::{open_db, open_db_in_memory, DbError};
use appshell_core::{KeyValueStore, SqliteKeyValueStore};
use rusqlite::Connection;

const DISMISSED_KEY: &str = "pwa-install-dismissed";

fn local_kv_columns(conn: &Connection) -> Vec<String> {
    let mut stmt = conn.prepare("PRAGMA table_info(local_kv);").unwrap();
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    columns
}

#[test]
fn fresh_state_file_gets_the_local_kv_layout() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    assert_eq!(local_kv_columns(&conn), vec!["key", "value", "updated_at"]);
}

#[test]
fn upgrading_a_current_file_changes_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    let version = latest_version();

    let upgrade = upgrade_schema(&mut conn).unwrap();
    assert_eq!(
        upgrade,
        SchemaUpgrade {
            from: version,
            to: version
        }
    );
    assert!(upgrade.is_noop());
}

#[test]
fn upgrade_from_empty_file_reports_both_versions() {
    let mut conn = Connection::open_in_memory().unwrap();

    let upgrade = upgrade_schema(&mut conn).unwrap();
    assert_eq!(upgrade.from, 0);
    assert_eq!(upgrade.to, latest_version());
    assert!(!upgrade.is_noop());
}

#[test]
fn dismissal_anchor_survives_reopening_the_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("client_state.db");

    {
        let store = SqliteKeyValueStore::open(&path).unwrap();
        store.set(DISMISSED_KEY, "1700000000000").unwrap();
    }

    let store = SqliteKeyValueStore::open(&path).unwrap();
    assert_eq!(
        store.get(DISMISSED_KEY).unwrap().as_deref(),
        Some("1700000000000")
    );

    let conn = open_db(&path).unwrap();
    let (stored, updated_at): (String, i64) = conn
        .query_row(
            "SELECT value, updated_at FROM local_kv WHERE key = ?1;",
            [DISMISSED_KEY],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(stored, "1700000000000");
    assert!(updated_at > 0);
}

#[test]
fn state_file_from_a_newer_build_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    Connection::open(&path)
        .unwrap()
        .pragma_update(None, "user_version", 999_u32)
        .unwrap();

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(SqliteKeyValueStore::open(&path).is_err());
}
