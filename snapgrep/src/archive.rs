/// A single file in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub path: String,
    pub data: Vec<u8>,
}

/// An in-memory snapshot of a repository: ordered files plus the length of
/// the largest one.
///
/// Snapshots are size-bounded by whoever builds them; the matcher does not
/// re-check file sizes.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    files: Vec<ArchiveFile>,
    max_len: usize,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an archive from `(path, contents)` pairs, keeping their order
    pub fn from_files<I, P, D>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, D)>,
        P: Into<String>,
        D: Into<Vec<u8>>,
    {
        let mut archive = Self::new();
        for (path, data) in files {
            archive.push(path, data);
        }
        archive
    }

    pub fn push(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        let data = data.into();
        self.max_len = self.max_len.max(data.len());
        self.files.push(ArchiveFile {
            path: path.into(),
            data,
        });
    }

    pub fn files(&self) -> &[ArchiveFile] {
        &self.files
    }

    /// Length in bytes of the largest file
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total size of all file contents
    pub fn total_size(&self) -> usize {
        self.files.iter().map(|f| f.data.len()).sum()
    }
}
