use crate::store::{KeyValueStore, StoreError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Length of a record file name: a hex-encoded SHA-256 digest of the key.
const FILE_NAME_LEN: usize = 64;

/// A [`KeyValueStore`] that keeps one file per key in a directory.
///
/// Each file is named after the SHA-256 digest of its key, so names have a
/// fixed length whatever the key. The file holds the hex-encoded key on its
/// first line and the value after it:
///
/// ```text
/// 666c69676874636163686521
/// {"createdAt":1700000000000,"expiresAt":1700000900000,"result":1}
/// ```
///
/// The optional quota bounds the total size of record files, key lines
/// included. Writes go to a temporary file first and are renamed into place,
/// so readers never see a half-written value.
///
/// Several processes may open the same directory, but the quota check and the
/// write are not atomic across processes.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    quota: Option<usize>,
}

impl FileStore {
    /// Opens (and creates if needed) a store in `dir`.
    pub async fn open(dir: impl Into<PathBuf>, quota: Option<usize>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir, quota })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(hex::encode(Sha256::digest(key.as_bytes())))
    }

    /// Reads the key line of a record file; `None` if the file vanished or is
    /// not a record.
    async fn read_key(path: &Path) -> Result<Option<String>, StoreError> {
        let file = match File::open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut line = String::new();
        match BufReader::new(file).read_line(&mut line).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::InvalidData => return Ok(None),
            Err(err) => return Err(err.into()),
        }
        let Some(header) = line.strip_suffix('\n') else {
            return Ok(None);
        };
        Ok(hex::decode(header)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok()))
    }

    /// Stored keys in sorted order.
    async fn sorted_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(file) = dir.next_entry().await? {
            // Skips temporary files and anything that is not ours.
            if !is_record_file(&file.file_name()) {
                continue;
            }
            if let Some(key) = Self::read_key(&file.path()).await? {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Total size of record files, except the one at `skip`.
    async fn used_bytes(&self, skip: &Path) -> Result<usize, StoreError> {
        let mut used = 0usize;
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(file) = dir.next_entry().await? {
            if !is_record_file(&file.file_name()) || file.path() == skip {
                continue;
            }
            let metadata = match file.metadata().await {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            if metadata.is_file() {
                used = used.saturating_add(metadata.len() as usize);
            }
        }
        Ok(used)
    }
}

fn is_record_file(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| {
        name.len() == FILE_NAME_LEN && name.bytes().all(|b| b.is_ascii_hexdigit())
    })
}

/// Splits a record file into its value, if the key line matches `key`.
fn record_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let (header, value) = text.split_once('\n')?;
    (header == hex::encode(key.as_bytes())).then_some(value)
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read(self.path_for(key)).await {
            // Unreadable files read as a missing item; the next write replaces them.
            Ok(bytes) => Ok(String::from_utf8(bytes)
                .ok()
                .and_then(|text| record_value(&text, key).map(str::to_string))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let content = format!("{}\n{}", hex::encode(key.as_bytes()), value);

        if let Some(quota) = self.quota {
            let needed = self.used_bytes(&path).await?.saturating_add(content.len());
            if needed > quota {
                return Err(StoreError::QuotaExceeded { needed, quota });
            }
        }

        let tmp = path.with_extension(format!("tmp{}", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, content).await?;
        if let Err(err) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    async fn key(&self, index: usize) -> Result<Option<String>, StoreError> {
        Ok(self.sorted_keys().await?.into_iter().nth(index))
    }

    async fn length(&self) -> Result<usize, StoreError> {
        Ok(self.sorted_keys().await?.len())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.sorted_keys().await
    }
}
