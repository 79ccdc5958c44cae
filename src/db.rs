use sqlx::SqlitePool;
use time::OffsetDateTime;
use time::macros::{format_description, offset};

/// Creates every table the engine relies on. Idempotent, so it also backs
/// the in-memory databases the tests run against.
pub async fn init_schema(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS parties (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            accommodation_id INTEGER,
            party_date TEXT,
            party_on BOOLEAN NOT NULL DEFAULT 0,
            match_start_at TEXT
        );
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            party_id INTEGER,
            name TEXT,
            phone TEXT,
            gender BOOLEAN NOT NULL DEFAULT 1,
            team INTEGER,
            role TEXT
        );
        CREATE TABLE IF NOT EXISTS chat_rooms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            party_id INTEGER NOT NULL,
            user_low INTEGER NOT NULL,
            user_high INTEGER NOT NULL,
            UNIQUE(party_id, user_low, user_high)
        );
        CREATE TABLE IF NOT EXISTS chats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_room_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            contents TEXT NOT NULL,
            date TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS chat_read_status (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_room_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            last_read_chat_id INTEGER,
            date TEXT NOT NULL,
            UNIQUE(chat_room_id, user_id)
        );
        CREATE TABLE IF NOT EXISTS match_selects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            party_id INTEGER NOT NULL,
            user_from INTEGER NOT NULL,
            user_to INTEGER NOT NULL,
            date TEXT NOT NULL,
            UNIQUE(party_id, user_from)
        );",
    )
    .execute(db_pool)
    .await?;

    Ok(())
}

/// Timestamps are stored and served as KST wall-clock strings, the format
/// the rest of the system (and its frontend) already speaks.
pub fn kst_now() -> Result<String, time::error::Format> {
    OffsetDateTime::now_utc()
        .to_offset(offset!(+9))
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    use sqlx::sqlite::SqlitePoolOptions;

    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&db_pool).await.unwrap();
    db_pool
}
