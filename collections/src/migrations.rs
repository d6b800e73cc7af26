//! Schema migrations.
//!
//! Migrations are additive and named. Each one runs at most once, inside a
//! transaction, and is recorded in `_embeddb_migrations`; applying the set to
//! an up-to-date database is a no-op.

use std::collections::HashSet;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::Result;

/// A named group of schema statements.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

/// Every migration, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "m001_create_tables",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                model TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
                id TEXT NOT NULL,
                embedding BLOB NOT NULL,
                content TEXT,
                content_hash BLOB NOT NULL,
                metadata TEXT,
                updated INTEGER NOT NULL,
                PRIMARY KEY (collection_id, id)
            )
            "#,
        ],
    },
    Migration {
        name: "m002_content_blob",
        statements: &["ALTER TABLE embeddings ADD COLUMN content_blob BLOB"],
    },
    // Collection ids must never be handed out twice, or a handle holding the
    // id of a deleted collection would write into its successor. SQLite
    // cannot add AUTOINCREMENT in place, so both tables are rebuilt. The
    // embeddings table goes first so dropping the old collections table
    // cascades into nothing.
    Migration {
        name: "m003_collection_ids_autoincrement",
        statements: &[
            r#"
            CREATE TABLE collections_new (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                model TEXT NOT NULL
            )
            "#,
            "INSERT INTO collections_new (id, name, model) SELECT id, name, model FROM collections",
            r#"
            CREATE TABLE embeddings_new (
                collection_id INTEGER NOT NULL REFERENCES collections_new(id) ON DELETE CASCADE,
                id TEXT NOT NULL,
                embedding BLOB NOT NULL,
                content TEXT,
                content_hash BLOB NOT NULL,
                metadata TEXT,
                updated INTEGER NOT NULL,
                content_blob BLOB,
                PRIMARY KEY (collection_id, id)
            )
            "#,
            r#"
            INSERT INTO embeddings_new
                (collection_id, id, embedding, content, content_hash, metadata, updated, content_blob)
            SELECT collection_id, id, embedding, content, content_hash, metadata, updated, content_blob
            FROM embeddings
            "#,
            "DROP TABLE embeddings",
            "DROP TABLE collections",
            "ALTER TABLE collections_new RENAME TO collections",
            "ALTER TABLE embeddings_new RENAME TO embeddings",
        ],
    },
];

/// Apply every pending migration. Returns the names applied by this call.
pub async fn migrate(pool: &SqlitePool) -> Result<Vec<&'static str>> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _embeddb_migrations (
            name TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied: HashSet<String> =
        sqlx::query_scalar::<_, String>("SELECT name FROM _embeddb_migrations")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();

    let mut newly_applied = Vec::new();
    for migration in MIGRATIONS {
        if applied.contains(migration.name) {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO _embeddb_migrations (name, applied_at) VALUES (?, ?)")
            .bind(migration.name)
            .bind(Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!("Applied migration {}", migration.name);
        newly_applied.push(migration.name);
    }

    if !newly_applied.is_empty() {
        info!("Applied {} schema migrations", newly_applied.len());
    }
    Ok(newly_applied)
}
