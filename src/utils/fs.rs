//! File system utilities

use std::io::Write;
use std::path::Path;

/// Shortens long paths for display, keeping the last two components
pub fn shorten_path(path: &Path, max_length: usize) -> String {
    let text = path.display().to_string();
    if text.chars().count() <= max_length {
        return text;
    }

    let components: Vec<&str> = text.split('/').filter(|s| !s.is_empty()).collect();
    if components.len() <= 2 {
        return text;
    }

    let prefix = if text.starts_with("./") { "./" } else { "" };
    format!(
        "{}.../{}/{}",
        prefix,
        components[components.len() - 2],
        components[components.len() - 1]
    )
}

/// Writes `contents` to a sibling temp file, syncs it, then renames it over
/// `path`. Readers see either the old file or the new one, never a mix.
pub fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let tmp = parent.join(format!(".{file_name}.{}.tmp", std::process::id()));

    let written = (|| {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    })();
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}
