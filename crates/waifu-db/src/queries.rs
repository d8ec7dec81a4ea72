use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, ToSql, TransactionBehavior};
use tracing::debug;

use waifu_types::models::{Acquisition, Character, CharacterId, Profile, User, UserId};

use crate::error::{is_duplicate_owner, is_missing_parent};
use crate::models::{NewCharacter, UserUpdate};
use crate::{Database, Result, StoreError};

/// Page size of prefix lookups.
pub const PREFIX_PAGE_SIZE: u32 = 50;

const CHARACTER_COLUMNS: &str = "id, user_id, name, image, type, acquired_at";

impl Database {
    // -- Characters --

    /// Attribute a character to a user, creating the user row on first use.
    ///
    /// The insert is tried once; if it fails only because the owner row is
    /// missing, the user is created (idempotently) and the insert is retried
    /// exactly once. Any other failure, or a failing retry, is returned.
    pub fn put_character(&self, user_id: UserId, character: &NewCharacter) -> Result<Character> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let stored = attribute_character(&tx, user_id, character)?;
            tx.commit()?;
            Ok(stored)
        })
    }

    /// Attribute a rolled character and stamp the roll time in one
    /// transaction: either both are written or neither is.
    pub fn record_roll(&self, user_id: UserId, character: &NewCharacter, at: DateTime<Utc>) -> Result<Character> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let stored = attribute_character(&tx, user_id, character)?;
            apply_user_updates(&tx, user_id, &[UserUpdate::LastRoll(at)])?;
            tx.commit()?;
            Ok(stored)
        })
    }

    /// All characters owned by a user, in acquisition order.
    pub fn list_characters(&self, user_id: UserId) -> Result<Vec<Character>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHARACTER_COLUMNS} FROM characters WHERE user_id = ?1 ORDER BY rowid"
            ))?;

            let rows = stmt
                .query_map([sql_id(user_id)], character_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn list_character_ids(&self, user_id: UserId) -> Result<Vec<CharacterId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM characters WHERE user_id = ?1 ORDER BY rowid")?;

            let ids = stmt
                .query_map([sql_id(user_id)], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(ids)
        })
    }

    /// Up to [`PREFIX_PAGE_SIZE`] characters whose name starts with `prefix`,
    /// compared case-insensitively for ASCII letters.
    pub fn list_characters_with_prefix(&self, user_id: UserId, prefix: &str) -> Result<Vec<Character>> {
        let pattern = format!("{}%", escape_like(prefix));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHARACTER_COLUMNS} FROM characters
                 WHERE user_id = ?1 AND name LIKE ?2 ESCAPE '\\'
                 ORDER BY name, rowid
                 LIMIT ?3"
            ))?;

            let rows = stmt
                .query_map(
                    rusqlite::params![sql_id(user_id), pattern, PREFIX_PAGE_SIZE],
                    character_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn get_character(&self, user_id: UserId, character_id: CharacterId) -> Result<Option<Character>> {
        self.with_conn(|conn| query_character(conn, user_id, character_id))
    }

    pub fn owns_character(&self, user_id: UserId, character_id: CharacterId) -> Result<bool> {
        Ok(self.get_character(user_id, character_id)?.is_some())
    }

    /// Move one owned instance from `from` to `to`.
    ///
    /// The ownership check and the reassignment are a single conditional
    /// update inside one transaction, so two racing transfers of the same
    /// instance cannot both succeed. The recipient is bootstrapped if needed
    /// and the giver's favorite is cleared when it pointed at the character.
    pub fn transfer_character(&self, from: UserId, to: UserId, character_id: CharacterId) -> Result<Character> {
        if from == to {
            return self.get_character(from, character_id)?.ok_or(StoreError::NotOwned);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            create_user(&tx, to)?;

            let changed = tx
                .execute(
                    "UPDATE characters SET user_id = ?1 WHERE user_id = ?2 AND id = ?3",
                    rusqlite::params![sql_id(to), sql_id(from), character_id],
                )
                .map_err(map_insert_error)?;

            if changed == 0 {
                return Err(StoreError::NotOwned);
            }

            tx.execute(
                "UPDATE users SET favorite = NULL WHERE user_id = ?1 AND favorite = ?2",
                rusqlite::params![sql_id(from), character_id],
            )?;

            let moved = query_character(&tx, to, character_id)?.ok_or(StoreError::NotFound)?;
            tx.commit()?;

            debug!("Character {} moved from {} to {}", character_id, from, to);
            Ok(moved)
        })
    }

    // -- Users --

    pub fn get_user(&self, user_id: UserId) -> Result<User> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, last_roll, quote, favorite FROM users WHERE user_id = ?1",
                [sql_id(user_id)],
                user_from_row,
            )
            .map_err(not_found)
        })
    }

    pub fn get_profile(&self, user_id: UserId) -> Result<Profile> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT u.user_id, u.last_roll, u.quote, u.favorite,
                        (SELECT COUNT(*) FROM characters WHERE user_id = u.user_id),
                        c.id, c.user_id, c.name, c.image, c.type, c.acquired_at
                 FROM users u
                 LEFT JOIN characters c ON c.user_id = u.user_id AND c.id = u.favorite
                 WHERE u.user_id = ?1",
                [sql_id(user_id)],
                |row| {
                    let user = user_from_row(row)?;
                    let character_count: i64 = row.get(4)?;
                    let favorite = match row.get::<_, Option<CharacterId>>(5)? {
                        Some(_) => Some(character_from_row_at(row, 5)?),
                        None => None,
                    };

                    Ok(Profile {
                        user,
                        character_count: character_count as u64,
                        favorite,
                    })
                },
            )
            .map_err(not_found)
        })
    }

    pub fn set_last_roll(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()> {
        self.update_user(user_id, &[UserUpdate::LastRoll(at)])
    }

    pub fn set_quote(&self, user_id: UserId, quote: &str) -> Result<()> {
        self.update_user(user_id, &[UserUpdate::Quote(quote.to_string())])
    }

    /// Set the favorite character; the user must own it.
    pub fn set_favorite(&self, user_id: UserId, character_id: CharacterId) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if query_character(&tx, user_id, character_id)?.is_none() {
                return Err(match user_exists(&tx, user_id)? {
                    true => StoreError::NotOwned,
                    false => StoreError::NotFound,
                });
            }

            apply_user_updates(&tx, user_id, &[UserUpdate::Favorite(Some(character_id))])?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Apply a set of independent column updates to one user row.
    pub fn update_user(&self, user_id: UserId, updates: &[UserUpdate]) -> Result<()> {
        self.with_conn(|conn| apply_user_updates(conn, user_id, updates))
    }
}

/// Insert, and on a missing owner row bootstrap the user and retry once.
fn attribute_character(conn: &Connection, user_id: UserId, character: &NewCharacter) -> Result<Character> {
    match insert_character(conn, user_id, character) {
        Ok(()) => {}
        Err(e) if is_missing_parent(&e) => {
            debug!("Bootstrapping user {} on first character", user_id);
            create_user(conn, user_id)?;
            insert_character(conn, user_id, character).map_err(map_insert_error)?;
        }
        Err(e) => return Err(map_insert_error(e)),
    }

    query_character(conn, user_id, character.id)?.ok_or(StoreError::NotFound)
}

/// Idempotent: creating an existing user is a no-op.
fn create_user(conn: &Connection, user_id: UserId) -> rusqlite::Result<()> {
    conn.execute("INSERT OR IGNORE INTO users (user_id) VALUES (?1)", [sql_id(user_id)])?;
    Ok(())
}

fn user_exists(conn: &Connection, user_id: UserId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM users WHERE user_id = ?1)",
        [sql_id(user_id)],
        |row| row.get(0),
    )
}

fn insert_character(conn: &Connection, user_id: UserId, c: &NewCharacter) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO characters (id, user_id, name, image, type, acquired_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            c.id,
            sql_id(user_id),
            normalize_name(&c.name),
            c.image,
            c.kind.as_str(),
            c.acquired_at,
        ],
    )?;
    Ok(())
}

fn apply_user_updates(conn: &Connection, user_id: UserId, updates: &[UserUpdate]) -> Result<()> {
    if updates.is_empty() {
        return Ok(());
    }

    let clauses: Vec<String> = updates
        .iter()
        .enumerate()
        .map(|(i, u)| format!("{} = ?{}", u.column(), i + 1))
        .collect();
    let sql = format!(
        "UPDATE users SET {} WHERE user_id = ?{}",
        clauses.join(", "),
        updates.len() + 1
    );

    let id = sql_id(user_id);
    let mut params: Vec<&dyn ToSql> = updates.iter().map(UserUpdate::value).collect();
    params.push(&id);

    match conn.execute(&sql, params.as_slice())? {
        0 => Err(StoreError::NotFound),
        _ => Ok(()),
    }
}

fn query_character(conn: &Connection, user_id: UserId, character_id: CharacterId) -> Result<Option<Character>> {
    let row = conn
        .query_row(
            &format!("SELECT {CHARACTER_COLUMNS} FROM characters WHERE user_id = ?1 AND id = ?2"),
            rusqlite::params![sql_id(user_id), character_id],
            character_from_row,
        )
        .optional()?;

    Ok(row)
}

fn character_from_row(row: &Row<'_>) -> rusqlite::Result<Character> {
    character_from_row_at(row, 0)
}

fn character_from_row_at(row: &Row<'_>, at: usize) -> rusqlite::Result<Character> {
    let kind: String = row.get(at + 4)?;
    let kind = Acquisition::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(at + 4, Type::Text, format!("unknown character type '{}'", kind).into())
    })?;

    Ok(Character {
        id: row.get(at)?,
        user_id: row.get::<_, i64>(at + 1)? as UserId,
        name: row.get(at + 2)?,
        image: row.get(at + 3)?,
        kind,
        acquired_at: row.get(at + 5)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get::<_, i64>(0)? as UserId,
        last_roll: row.get(1)?,
        quote: row.get(2)?,
        favorite: row.get(3)?,
    })
}

/// Snowflakes fit in 63 bits; SQLite integers are signed.
fn sql_id(id: UserId) -> i64 {
    id as i64
}

fn map_insert_error(e: rusqlite::Error) -> StoreError {
    if is_duplicate_owner(&e) {
        StoreError::AlreadyOwned
    } else {
        StoreError::Sqlite(e)
    }
}

fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        e => StoreError::Sqlite(e),
    }
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
