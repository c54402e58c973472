use rusqlite::{params_from_iter, Connection, OptionalExtension, ToSql};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::engine::criteria::Criteria;
use crate::error::StoreError;
use crate::state::data::{Photo, PhotoId, PhotoStatus, SortOrder};
use crate::store::PhotoStore;

/// The Library manages the SQLite catalog database.
///
/// It stores photo metadata, classification status and engine settings,
/// and is the crate's sqlite-backed [`PhotoStore`] implementation.
pub struct Library {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Library {
    /// Create a new Library instance and initialize the database.
    ///
    /// The database file is created in the user's data directory:
    /// - Linux: ~/.local/share/photo-triage/triage.db
    /// - macOS: ~/Library/Application Support/photo-triage/triage.db
    /// - Windows: %APPDATA%\photo-triage\triage.db
    pub fn new() -> Result<Self, StoreError> {
        Self::open(Self::default_db_path())
    }

    /// Open (or create) the catalog at an explicit path.
    pub fn open(db_path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::DataDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&db_path)?;
        info!(path = %db_path.display(), "catalog database opened");

        let library = Library {
            conn: Mutex::new(conn),
            db_path,
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Open a throwaway in-memory catalog. Used by tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let library = Library {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: PathBuf::from(":memory:"),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Get the path where the database should be stored
    fn default_db_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .expect("Could not determine user data directory");

        path.push("photo-triage");
        path.push("triage.db");
        path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("catalog connection lock poisoned")
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn();

        // Photo metadata and classification status
        conn.execute(
            "CREATE TABLE IF NOT EXISTS photos (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                path            TEXT NOT NULL UNIQUE,
                album_id        INTEGER NOT NULL DEFAULT 0,
                taken_at        INTEGER NOT NULL,
                status          TEXT NOT NULL DEFAULT 'unclassified'
            )",
            [],
        )?;

        // Engine settings (filter mode, sort order, session filter) as JSON
        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL
            )",
            [],
        )?;

        // Indexes for the hot triage queries
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_photos_taken_at
             ON photos(taken_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_photos_status
             ON photos(status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_photos_album
             ON photos(album_id)",
            [],
        )?;

        debug!("catalog schema initialized");
        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Import a photo into the catalog. Returns the new photo ID.
    pub fn add_photo(&self, path: &str, album_id: i64, taken_at: i64) -> Result<PhotoId, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO photos (path, album_id, taken_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![path, album_id, taken_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ---- settings helpers (used by the SettingsStore impl) ----

    pub(crate) fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub(crate) fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            [key, value],
        )?;
        Ok(())
    }

    pub(crate) fn delete_setting(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }
}

/// `?, ?, ...` for an IN list of `n` values.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Translate [`Criteria`] into a WHERE clause plus its parameters.
///
/// Criteria arrive normalized (empty lists collapsed to `None`), so an
/// IN list here is never empty.
fn criteria_where(criteria: &Criteria) -> (String, Vec<i64>) {
    let mut clauses = vec!["status = 'unclassified'".to_string()];
    let mut params: Vec<i64> = Vec::new();

    if let Some(ids) = &criteria.allow_ids {
        clauses.push(format!("id IN ({})", placeholders(ids.len())));
        params.extend_from_slice(ids);
    }
    if let Some(albums) = &criteria.include_albums {
        clauses.push(format!("album_id IN ({})", placeholders(albums.len())));
        params.extend_from_slice(albums);
    }
    if let Some(albums) = &criteria.exclude_albums {
        clauses.push(format!("album_id NOT IN ({})", placeholders(albums.len())));
        params.extend_from_slice(albums);
    }
    if let Some(range) = &criteria.date_range {
        clauses.push("taken_at >= ? AND taken_at <= ?".to_string());
        params.push(range.start);
        params.push(range.end);
    }

    (clauses.join(" AND "), params)
}

/// ORDER BY clause for a sort order.
///
/// `Random` orders by a seed-keyed integer hash of the id, so windowed
/// limit/offset pages are stable for a fixed seed without materializing
/// ids. Operands stay below 2^62 to avoid sqlite integer overflow.
fn order_clause(order: &SortOrder) -> String {
    match order {
        SortOrder::DateAscending => "ORDER BY taken_at ASC, id ASC".to_string(),
        SortOrder::DateDescending => "ORDER BY taken_at DESC, id DESC".to_string(),
        SortOrder::Random { seed } => {
            let key = (seed % 2_147_483_647) as i64;
            format!("ORDER BY ((id % 2147483647) * 1103515245 + {key}) % 2147483647, id")
        }
    }
}

fn map_photo_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Photo> {
    let status: String = row.get(4)?;
    Ok(Photo {
        id: row.get(0)?,
        path: row.get(1)?,
        album_id: row.get(2)?,
        taken_at: row.get(3)?,
        status: PhotoStatus::parse(&status),
    })
}

const PHOTO_COLUMNS: &str = "id, path, album_id, taken_at, status";

impl PhotoStore for Library {
    fn count(&self, criteria: &Criteria) -> Result<u64, StoreError> {
        let (clause, params) = criteria_where(criteria);
        let conn = self.conn();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM photos WHERE {clause}"),
            params_from_iter(params),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn ids(&self, criteria: &Criteria, order: &SortOrder) -> Result<Vec<PhotoId>, StoreError> {
        let (clause, params) = criteria_where(criteria);
        let sql = format!(
            "SELECT id FROM photos WHERE {clause} {}",
            order_clause(order)
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| row.get(0))?;

        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    fn page(
        &self,
        criteria: &Criteria,
        order: &SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Photo>, StoreError> {
        let (clause, mut params) = criteria_where(criteria);
        let sql = format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE {clause} {} LIMIT ? OFFSET ?",
            order_clause(order)
        );
        params.push(limit as i64);
        params.push(offset as i64);

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), map_photo_row)?;

        let mut photos = Vec::new();
        for photo in rows {
            photos.push(photo?);
        }
        Ok(photos)
    }

    fn by_ids(&self, ids: &[PhotoId]) -> Result<Vec<Photo>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE id IN ({})",
            placeholders(ids.len())
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), map_photo_row)?;

        let mut by_id: HashMap<PhotoId, Photo> = HashMap::new();
        for photo in rows {
            let photo = photo?;
            by_id.insert(photo.id, photo);
        }
        // SQL IN does not preserve order; ids vanished from the catalog
        // are skipped.
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    fn set_status(&self, id: PhotoId, status: PhotoStatus) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE photos SET status = ?1 WHERE id = ?2",
            rusqlite::params![status.as_str(), id],
        )?;
        Ok(())
    }

    fn set_status_batch(&self, ids: &[PhotoId], status: PhotoStatus) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        // Single statement, so the batch commits atomically.
        let sql = format!(
            "UPDATE photos SET status = ? WHERE id IN ({})",
            placeholders(ids.len())
        );
        let status_str = status.as_str();
        let mut params: Vec<&dyn ToSql> = vec![&status_str];
        for id in ids {
            params.push(id);
        }
        let conn = self.conn();
        conn.execute(&sql, &params[..])?;
        Ok(())
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::DateRange;

    /// 30 photos: ids 1..=30, albums alternating 1/2, taken_at descending
    /// with id (newest photo has the smallest id).
    fn seeded_library() -> Library {
        let library = Library::in_memory().unwrap();
        for i in 0..30 {
            library
                .add_photo(
                    &format!("/photos/img_{i:03}.jpg"),
                    if i % 2 == 0 { 1 } else { 2 },
                    1_000_000 - i,
                )
                .unwrap();
        }
        library
    }

    #[test]
    fn test_count_and_album_filter() {
        let library = seeded_library();
        assert_eq!(library.count(&Criteria::default()).unwrap(), 30);

        let criteria = Criteria {
            include_albums: Some(vec![1]),
            ..Criteria::default()
        };
        assert_eq!(library.count(&criteria).unwrap(), 15);

        let criteria = Criteria {
            exclude_albums: Some(vec![1]),
            ..Criteria::default()
        };
        assert_eq!(library.count(&criteria).unwrap(), 15);
    }

    #[test]
    fn test_date_range_filter() {
        let library = seeded_library();
        let criteria = Criteria {
            date_range: Some(DateRange {
                start: 1_000_000 - 9,
                end: 1_000_000,
            }),
            ..Criteria::default()
        };
        assert_eq!(library.count(&criteria).unwrap(), 10);
    }

    #[test]
    fn test_page_ordering_and_offset() {
        let library = seeded_library();
        let page = library
            .page(&Criteria::default(), &SortOrder::DateDescending, 5, 0)
            .unwrap();
        // newest first: taken_at 1_000_000 is photo id 1
        let ids: Vec<PhotoId> = page.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let page = library
            .page(&Criteria::default(), &SortOrder::DateAscending, 5, 2)
            .unwrap();
        let ids: Vec<PhotoId> = page.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![28, 27, 26, 25, 24]);
    }

    #[test]
    fn test_random_order_is_stable_for_seed() {
        let library = seeded_library();
        let order = SortOrder::Random { seed: 99 };
        let first = library.ids(&Criteria::default(), &order).unwrap();
        let second = library.ids(&Criteria::default(), &order).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 30);

        // limit/offset pages tile the same ordering
        let page0 = library.page(&Criteria::default(), &order, 10, 0).unwrap();
        let page1 = library.page(&Criteria::default(), &order, 10, 10).unwrap();
        let paged: Vec<PhotoId> = page0.iter().chain(page1.iter()).map(|p| p.id).collect();
        assert_eq!(paged, first[..20].to_vec());
    }

    #[test]
    fn test_by_ids_preserves_input_order_and_skips_missing() {
        let library = seeded_library();
        let photos = library.by_ids(&[5, 2, 999, 9]).unwrap();
        let ids: Vec<PhotoId> = photos.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![5, 2, 9]);
    }

    #[test]
    fn test_set_status_removes_from_triage_set() {
        let library = seeded_library();
        library.set_status(1, PhotoStatus::Keep).unwrap();
        assert_eq!(library.count(&Criteria::default()).unwrap(), 29);

        let photos = library.by_ids(&[1]).unwrap();
        assert_eq!(photos[0].status, PhotoStatus::Keep);
    }

    #[test]
    fn test_set_status_batch() {
        let library = seeded_library();
        library
            .set_status_batch(&[1, 2, 3], PhotoStatus::Trash)
            .unwrap();
        assert_eq!(library.count(&Criteria::default()).unwrap(), 27);
        for photo in library.by_ids(&[1, 2, 3]).unwrap() {
            assert_eq!(photo.status, PhotoStatus::Trash);
        }
    }

    #[test]
    fn test_allow_list_criteria() {
        let library = seeded_library();
        let criteria = Criteria {
            allow_ids: Some(vec![3, 7, 11]),
            ..Criteria::default()
        };
        assert_eq!(library.count(&criteria).unwrap(), 3);
        let ids = library.ids(&criteria, &SortOrder::DateDescending).unwrap();
        assert_eq!(ids, vec![3, 7, 11]);
    }
}
