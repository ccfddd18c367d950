use ignore::WalkBuilder;
use snapgrep::Archive;
use std::fs;
use std::path::Path;
use tracing::{debug, info, trace, warn};

/// Bytes inspected when deciding whether a file is binary
const BINARY_PROBE_LEN: usize = 8192;

/// Reads the text files under `root` into an archive.
///
/// Honors `.gitignore` and hidden-file rules. Files larger than
/// `max_file_size` and files that look binary are left out, since the
/// matcher itself does not re-check either. Paths are stored relative to
/// `root` with `/` separators, in walk order.
pub fn load_archive(root: &Path, max_file_size: u64) -> anyhow::Result<Archive> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .standard_filters(true)
        .require_git(false)
        .sort_by_file_name(|a, b| a.cmp(b));

    let mut archive = Archive::new();
    let mut oversized = 0usize;
    let mut binary = 0usize;

    debug!("Scanning directory: {}", root.display());
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        match entry.metadata() {
            Ok(metadata) if metadata.len() > max_file_size => {
                trace!("Skipping large file: {}", path.display());
                oversized += 1;
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        }

        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        if looks_binary(&data) {
            trace!("Skipping binary file: {}", path.display());
            binary += 1;
            continue;
        }

        archive.push(archive_path(root, path), data);
    }

    info!(
        "Loaded {} files ({} bytes), skipped {} large and {} binary",
        archive.len(),
        archive.total_size(),
        oversized,
        binary
    );
    Ok(archive)
}

fn looks_binary(data: &[u8]) -> bool {
    data[..data.len().min(BINARY_PROBE_LEN)].contains(&0)
}

fn archive_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
