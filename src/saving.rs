use bincode::{deserialize_from, serialize_into};
use chrono::Utc;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::batch::{Batch, BatchRow, NewBatch, RowUpdate, ValidationError, encode_columns, validate_new_row};
use crate::grid::RowData;
use crate::login::is_valid_username;

const DATABASE_FILE: &str = "batches.bin.gz";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt batch database: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("batch {0} not found")]
    BatchNotFound(u64),

    #[error("row {0} not found")]
    RowNotFound(u64),

    #[error("invalid user name: {0}")]
    InvalidUser(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Everything one user owns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDatabase {
    pub next_batch_id: u64,
    pub next_row_id: u64,
    pub batches: Vec<Batch>,
    pub rows: Vec<BatchRow>,
}

impl UserDatabase {
    fn allocate_batch_id(&mut self) -> u64 {
        self.next_batch_id += 1;
        self.next_batch_id
    }

    fn allocate_row_id(&mut self) -> u64 {
        self.next_row_id += 1;
        self.next_row_id
    }

    fn batch_mut(&mut self, batch_id: u64) -> Result<&mut Batch, StoreError> {
        self.batches
            .iter_mut()
            .find(|b| b.id == batch_id)
            .ok_or(StoreError::BatchNotFound(batch_id))
    }
}

pub fn save_database(db: &UserDatabase, path: &Path) -> Result<(), StoreError> {
    // Write next to the target and rename so a crash never leaves half a file
    let tmp = path.with_extension("gz.tmp");
    {
        let file = File::create(&tmp)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = std::io::BufWriter::new(encoder);
        serialize_into(&mut writer, db)?;
        let encoder = writer.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn load_database(path: &Path) -> Result<UserDatabase, StoreError> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut reader = std::io::BufReader::new(decoder);
    Ok(deserialize_from(&mut reader)?)
}

/// Batch persistence rooted at a data directory, one database file per user
#[derive(Debug, Clone)]
pub struct BatchStore {
    root: PathBuf,
}

impl BatchStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(BatchStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn database_path(&self, user: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_username(user) {
            return Err(StoreError::InvalidUser(user.to_string()));
        }
        Ok(self.root.join(user).join(DATABASE_FILE))
    }

    fn load(&self, user: &str) -> Result<UserDatabase, StoreError> {
        let path = self.database_path(user)?;
        if !path.exists() {
            return Ok(UserDatabase::default());
        }
        load_database(&path)
    }

    fn save(&self, user: &str, db: &UserDatabase) -> Result<(), StoreError> {
        let path = self.database_path(user)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        save_database(db, &path)
    }

    fn update<T>(
        &self,
        user: &str,
        f: impl FnOnce(&mut UserDatabase) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut db = self.load(user)?;
        let out = f(&mut db)?;
        self.save(user, &db)?;
        Ok(out)
    }

    /// All batches of `user`, newest upload first
    pub fn list_batches(&self, user: &str) -> Result<Vec<Batch>, StoreError> {
        let mut batches = self.load(user)?.batches;
        batches.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(b.id.cmp(&a.id)));
        Ok(batches)
    }

    pub fn get_batch(&self, user: &str, batch_id: u64) -> Result<Batch, StoreError> {
        self.load(user)?
            .batches
            .into_iter()
            .find(|b| b.id == batch_id)
            .ok_or(StoreError::BatchNotFound(batch_id))
    }

    /// Stores a new batch and its rows, numbering rows from 1
    pub fn upload_batch(&self, user: &str, batch: NewBatch) -> Result<u64, StoreError> {
        if batch.file_name.trim().is_empty() {
            return Err(ValidationError::MissingBatchName.into());
        }
        let id = self.update(user, |db| {
            let id = db.allocate_batch_id();
            for (index, row_data) in batch.rows.iter().enumerate() {
                let row_id = db.allocate_row_id();
                db.rows.push(BatchRow {
                    id: row_id,
                    batch_id: id,
                    row_index: index as u64 + 1,
                    row_data: row_data.clone(),
                });
            }
            db.batches.push(Batch {
                id,
                file_name: batch.file_name.clone(),
                original_name: batch.original_name.clone(),
                column_headers: encode_columns(&batch.column_headers),
                row_count: batch.rows.len(),
                uploaded_at: Utc::now(),
            });
            Ok(id)
        })?;
        info!(
            "user {} uploaded batch {} ({} rows from {})",
            user,
            id,
            batch.rows.len(),
            batch.original_name
        );
        Ok(id)
    }

    /// Rows of a batch ordered by row index
    pub fn batch_rows(&self, user: &str, batch_id: u64) -> Result<Vec<BatchRow>, StoreError> {
        let db = self.load(user)?;
        if !db.batches.iter().any(|b| b.id == batch_id) {
            return Err(StoreError::BatchNotFound(batch_id));
        }
        let mut rows: Vec<BatchRow> = db
            .rows
            .into_iter()
            .filter(|r| r.batch_id == batch_id)
            .collect();
        rows.sort_by_key(|r| r.row_index);
        Ok(rows)
    }

    /// Replaces the data of each listed row. Nothing is written unless
    /// every id exists.
    pub fn update_rows(&self, user: &str, updates: Vec<RowUpdate>) -> Result<usize, StoreError> {
        let count = self.update(user, |db| {
            if let Some(missing) = updates
                .iter()
                .find(|u| !db.rows.iter().any(|r| r.id == u.id))
            {
                return Err(StoreError::RowNotFound(missing.id));
            }
            for update in &updates {
                if let Some(row) = db.rows.iter_mut().find(|r| r.id == update.id) {
                    row.row_data = update.row_data.clone();
                }
            }
            Ok(updates.len())
        })?;
        info!("user {} updated {} rows", user, count);
        Ok(count)
    }

    /// Appends a row after the current last row index
    pub fn create_row(&self, user: &str, batch_id: u64, row_data: RowData) -> Result<BatchRow, StoreError> {
        let row = self.update(user, |db| {
            let columns = db.batch_mut(batch_id)?.columns();
            validate_new_row(&columns, &row_data)?;

            let row_index = db
                .rows
                .iter()
                .filter(|r| r.batch_id == batch_id)
                .map(|r| r.row_index + 1)
                .max()
                .unwrap_or(0);
            let row = BatchRow {
                id: db.allocate_row_id(),
                batch_id,
                row_index,
                row_data: row_data.clone(),
            };
            db.rows.push(row.clone());
            db.batch_mut(batch_id)?.row_count += 1;
            Ok(row)
        })?;
        debug!("user {} added row {} to batch {}", user, row.id, batch_id);
        Ok(row)
    }

    pub fn reorder_columns(&self, user: &str, batch_id: u64, columns: &[String]) -> Result<(), StoreError> {
        self.update(user, |db| {
            db.batch_mut(batch_id)?.column_headers = encode_columns(columns);
            Ok(())
        })?;
        debug!("user {} reordered columns of batch {}: {:?}", user, batch_id, columns);
        Ok(())
    }

    /// Removes a batch together with its rows
    pub fn delete_batch(&self, user: &str, batch_id: u64) -> Result<(), StoreError> {
        self.update(user, |db| {
            let before = db.batches.len();
            db.batches.retain(|b| b.id != batch_id);
            if db.batches.len() == before {
                return Err(StoreError::BatchNotFound(batch_id));
            }
            db.rows.retain(|r| r.batch_id != batch_id);
            Ok(())
        })?;
        info!("user {} deleted batch {}", user, batch_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RowData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn upload(store: &BatchStore) -> u64 {
        store
            .upload_batch(
                "alice",
                NewBatch {
                    file_name: "people".to_string(),
                    original_name: "people.csv".to_string(),
                    column_headers: vec!["name".to_string(), "age".to_string()],
                    rows: vec![
                        row(&[("name", "Alice"), ("age", "30")]),
                        row(&[("name", "Bob"), ("age", "25")]),
                    ],
                },
            )
            .unwrap()
    }

    #[test]
    fn test_upload_numbers_rows_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = BatchStore::open(dir.path()).unwrap();
        let id = upload(&store);

        let rows = store.batch_rows("alice", id).unwrap();
        assert_eq!(rows.iter().map(|r| r.row_index).collect::<Vec<_>>(), vec![1, 2]);
        let batch = store.get_batch("alice", id).unwrap();
        assert_eq!(batch.columns(), vec!["name", "age"]);
        assert_eq!(batch.row_count, 2);
    }

    #[test]
    fn test_batches_are_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = BatchStore::open(dir.path()).unwrap();
        let id = upload(&store);
        assert!(matches!(
            store.get_batch("bob", id),
            Err(StoreError::BatchNotFound(_))
        ));
        assert!(store.list_batches("bob").unwrap().is_empty());
    }

    #[test]
    fn test_update_rows_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = BatchStore::open(dir.path()).unwrap();
        let id = upload(&store);
        let rows = store.batch_rows("alice", id).unwrap();

        let result = store.update_rows(
            "alice",
            vec![
                RowUpdate {
                    id: rows[0].id,
                    row_data: row(&[("name", "Alicia"), ("age", "31")]),
                },
                RowUpdate {
                    id: 999,
                    row_data: RowData::new(),
                },
            ],
        );
        assert!(matches!(result, Err(StoreError::RowNotFound(999))));
        assert_eq!(store.batch_rows("alice", id).unwrap()[0].row_data["name"], "Alice");
    }

    #[test]
    fn test_create_row_validates_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = BatchStore::open(dir.path()).unwrap();
        let id = upload(&store);

        let err = store
            .create_row("alice", id, row(&[("name", "Carol")]))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::MissingField(ref c)) if c == "age"
        ));

        let created = store
            .create_row("alice", id, row(&[("name", "Carol"), ("age", "41")]))
            .unwrap();
        assert_eq!(created.row_index, 3);
        assert_eq!(store.get_batch("alice", id).unwrap().row_count, 3);
    }

    #[test]
    fn test_delete_removes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = BatchStore::open(dir.path()).unwrap();
        let id = upload(&store);
        store.delete_batch("alice", id).unwrap();
        assert!(matches!(
            store.batch_rows("alice", id),
            Err(StoreError::BatchNotFound(_))
        ));
        assert!(matches!(
            store.delete_batch("alice", id),
            Err(StoreError::BatchNotFound(_))
        ));
    }

    #[test]
    fn test_rejects_path_like_user_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = BatchStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.list_batches("../etc"),
            Err(StoreError::InvalidUser(_))
        ));
    }
}
