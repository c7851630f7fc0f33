use super::PipelineError;
use std::fs;
use std::path::{Path, PathBuf};

/// Content written to a sibling temp file of its target. `commit` renames it into place;
/// dropping it uncommitted removes the temp file and leaves the target untouched.
#[derive(Debug)]
pub(crate) struct StagedFile {
    tmp_path: PathBuf,
    path: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub(crate) fn write(path: &Path, content: &[u8]) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PipelineError::io(parent, source))?;
        }

        let mut tmp_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        fs::write(&tmp_path, content).map_err(|source| PipelineError::io(&tmp_path, source))?;
        Ok(Self {
            tmp_path,
            path: path.to_path_buf(),
            committed: false,
        })
    }

    pub(crate) fn commit(mut self) -> Result<(), PipelineError> {
        fs::rename(&self.tmp_path, &self.path)
            .map_err(|source| PipelineError::io(&self.path, source))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Replaces `path` with `content` through a sibling temp file and a rename, so readers see either
/// the previous file or the new one.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), PipelineError> {
    StagedFile::write(path, content)?.commit()
}

/// Serializes rows to CSV bytes with a header row.
pub(crate) fn csv_bytes<T: serde::Serialize>(
    rows: &[T],
    origin: &str,
) -> Result<Vec<u8>, PipelineError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|source| PipelineError::csv(origin, source))?;
    }
    writer
        .into_inner()
        .map_err(|err| PipelineError::csv(origin, csv::Error::from(err.into_error())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_parents_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("nested/out.csv");

        write_atomic(&target, b"a,b\n").expect("first write");
        write_atomic(&target, b"c,d\n").expect("second write");

        assert_eq!(fs::read(&target).expect("read"), b"c,d\n");
        assert!(!dir.path().join("nested/out.csv.tmp").exists());
    }

    #[test]
    fn dropped_staged_file_leaves_target_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("out.csv");
        write_atomic(&target, b"old\n").expect("initial write");

        let staged = StagedFile::write(&target, b"new\n").expect("stage");
        assert!(dir.path().join("out.csv.tmp").exists());
        drop(staged);

        assert_eq!(fs::read(&target).expect("read"), b"old\n");
        assert!(!dir.path().join("out.csv.tmp").exists());
    }
}
