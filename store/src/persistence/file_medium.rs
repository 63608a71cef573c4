use super::{KeyValueMedium, PersistenceError};
use std::path::PathBuf;

/// Directory-backed medium: one `<encoded key>.json` file per key.
///
/// Keys are URL-encoded into file names, so any key (including the ISO
/// timestamps in backup keys) maps to a portable file name.
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn ensure_dir(&self) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl KeyValueMedium for FileMedium {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.file_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.ensure_dir()?;
        std::fs::write(self.file_path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let path = self.file_path(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, PersistenceError> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match urlencoding::decode(stem) {
                Ok(key) => keys.push(key.into_owned()),
                Err(e) => {
                    tracing::warn!("Skipping undecodable file name {:?}: {}", path, e);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path().join("store"));
        medium.set("exam_data", "{\"a\":1}").unwrap();
        assert_eq!(
            medium.get("exam_data").unwrap(),
            Some("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn test_get_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path().join("store"));
        assert_eq!(medium.get("missing").unwrap(), None);
    }

    #[test]
    fn test_keys_decode_timestamp_names() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path().join("store"));
        medium
            .set("exam_backup_2024-05-01T10:00:00.000Z", "{}")
            .unwrap();
        medium.set("exam_data", "{}").unwrap();
        std::fs::write(dir.path().join("store").join("notes.txt"), "ignored").unwrap();

        let keys = medium.keys().unwrap();
        assert_eq!(
            keys,
            vec!["exam_backup_2024-05-01T10:00:00.000Z", "exam_data"]
        );
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path().join("store"));
        medium.set("k", "v").unwrap();
        medium.remove("k").unwrap();
        medium.remove("k").unwrap();
        assert!(medium.keys().unwrap().is_empty());
    }

    #[test]
    fn test_keys_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let medium = FileMedium::new(dir.path().join("never_created"));
        assert!(medium.keys().unwrap().is_empty());
    }
}
