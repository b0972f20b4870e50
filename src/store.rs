use std::fs;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::Url;
use tempfile::Builder;
use tracing::info;

use crate::error::DqmError;

pub const ARCHIVE_EXTENSION: &str = "root";

/// Destination directory for downloaded ROOT files.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: Utf8PathBuf,
}

impl OutputStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Creates the output directory when missing; returns whether it did.
    pub fn ensure_root(&self) -> Result<bool, DqmError> {
        if self.root.as_std_path().is_dir() {
            return Ok(false);
        }
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| DqmError::Filesystem(format!("create {}: {err}", self.root)))?;
        info!("created directory '{}'", self.root);
        Ok(true)
    }

    /// Target path named after the URL's final segment. Anything that is not
    /// a `.root` file means the resolver handed back a wrong link.
    pub fn target_path(&self, url: &Url) -> Result<Utf8PathBuf, DqmError> {
        let file_name = file_name_from_url(url).unwrap_or_default();
        let path = self.root.join(&file_name);
        let is_root_file = !file_name.starts_with('.')
            && path.extension() == Some(ARCHIVE_EXTENSION)
            && path.file_stem().is_some_and(|stem| !stem.is_empty());
        if !is_root_file {
            return Err(DqmError::UnexpectedExtension(url.to_string()));
        }
        Ok(path)
    }

    /// Streams `content` into `path`, replacing any earlier download of the
    /// same file only once the new copy is complete.
    pub fn write_atomic(&self, path: &Utf8Path, content: &mut dyn Read) -> Result<u64, DqmError> {
        let parent = path
            .parent()
            .ok_or_else(|| DqmError::Filesystem(format!("invalid destination path {path}")))?;
        let mut temp = Builder::new()
            .prefix(".dqm-fetch")
            .suffix(".part")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| DqmError::Filesystem(err.to_string()))?;
        let written = io::copy(content, temp.as_file_mut())
            .map_err(|err| DqmError::Filesystem(format!("write {path}: {err}")))?;
        temp.persist(path.as_std_path())
            .map_err(|err| DqmError::Filesystem(format!("persist {path}: {}", err.error)))?;
        Ok(written)
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }
}

pub fn file_name_from_url(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|segment| segment.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn store() -> (tempfile::TempDir, OutputStore) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("out")).unwrap();
        (temp, OutputStore::new(root))
    }

    #[test]
    fn target_path_uses_last_segment() {
        let (_temp, store) = store();
        let url = Url::parse("https://cmsweb.cern.ch/a/b/DQM_V0001_GEM_R000355361.root").unwrap();
        let path = store.target_path(&url).unwrap();
        assert!(path.ends_with("out/DQM_V0001_GEM_R000355361.root"));
    }

    #[test]
    fn target_path_rejects_other_extensions() {
        let (_temp, store) = store();
        for link in [
            "https://cmsweb.cern.ch/a/b/index.html",
            "https://cmsweb.cern.ch/a/b/",
            "https://cmsweb.cern.ch/a/b/.root",
        ] {
            let url = Url::parse(link).unwrap();
            assert_matches!(store.target_path(&url), Err(DqmError::UnexpectedExtension(_)));
        }
    }

    #[test]
    fn write_atomic_overwrites_previous_download() {
        let (_temp, store) = store();
        assert!(store.ensure_root().unwrap());
        assert!(!store.ensure_root().unwrap());
        let path = store.root().join("DQM_V0001_GEM_R000355361.root");

        store.write_atomic(&path, &mut &b"first"[..]).unwrap();
        let written = store.write_atomic(&path, &mut &b"second"[..]).unwrap();

        assert_eq!(written, 6);
        assert_eq!(fs::read(path.as_std_path()).unwrap(), b"second");
        let leftovers = fs::read_dir(store.root().as_std_path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
