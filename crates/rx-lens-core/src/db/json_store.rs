//! Directory of JSON files, one per collection.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{Collection, DbResult, RecordStore};

/// Stores `<collection>.json` files under one directory.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Use `dir`, creating it if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> DbResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.as_str()))
    }
}

impl RecordStore for JsonDirStore {
    fn load_document(&self, collection: Collection) -> DbResult<Option<String>> {
        match fs::read_to_string(self.path_for(collection)) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_documents(&mut self, documents: &[(Collection, String)]) -> DbResult<()> {
        // Stage every temp file before the first rename.
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(documents.len());
        for (collection, body) in documents {
            let path = self.path_for(*collection);
            let tmp = path.with_extension("json.tmp");
            if let Err(e) = fs::write(&tmp, body) {
                discard(staged.iter().map(|(tmp, _)| tmp));
                return Err(e.into());
            }
            staged.push((tmp, path));
        }

        for (tmp, path) in &staged {
            fs::rename(tmp, path)?;
            debug!(path = %path.display(), "Saved collection");
        }
        Ok(())
    }
}

fn discard<'a>(tmp_files: impl Iterator<Item = &'a PathBuf>) {
    for tmp in tmp_files {
        if let Err(e) = fs::remove_file(tmp) {
            warn!(path = %tmp.display(), error = %e, "Cannot remove staged file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        assert!(store.load_document(Collection::Prescriptions).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonDirStore::open(dir.path()).unwrap();
        store
            .save_document(Collection::Medications, "[\n  {}\n]")
            .unwrap();

        assert!(dir.path().join("medications.json").exists());
        assert!(!dir.path().join("medications.json.tmp").exists());
        assert_eq!(
            store.load_document(Collection::Medications).unwrap().as_deref(),
            Some("[\n  {}\n]")
        );
    }

    #[test]
    fn test_failed_batch_leaves_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonDirStore::open(dir.path()).unwrap();
        store.save_document(Collection::Prescriptions, "[]").unwrap();
        // A directory in the way makes the reminders write fail.
        fs::create_dir(dir.path().join("reminders.json.tmp")).unwrap();

        let result = store.save_documents(&[
            (Collection::Prescriptions, "[{}]".to_string()),
            (Collection::Medications, "[{}]".to_string()),
            (Collection::Reminders, "[{}]".to_string()),
        ]);

        assert!(result.is_err());
        assert_eq!(
            store.load_document(Collection::Prescriptions).unwrap().as_deref(),
            Some("[]")
        );
        assert!(store.load_document(Collection::Medications).unwrap().is_none());
        assert!(!dir.path().join("prescriptions.json.tmp").exists());
        assert!(!dir.path().join("medications.json.tmp").exists());
    }

    #[test]
    fn test_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = JsonDirStore::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(
            store.path_for(Collection::DrugAlternatives),
            nested.join("drug_alternatives.json")
        );
    }
}
