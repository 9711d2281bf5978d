//! Filesystem helpers shared by backup and recovery

use audit_ledger::storage::staging_path;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Copy a file through a sibling temp path so the destination is never torn.
/// Returns bytes copied.
pub fn atomic_copy(src: &Path, dst: &Path) -> io::Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = staging_path(dst);
    let copied = fs::copy(src, &tmp)?;
    File::open(&tmp)?.sync_all()?;
    fs::rename(&tmp, dst)?;
    Ok(copied)
}

/// Gzip `src` into `dst`. Returns the compressed size.
pub fn gzip_file(src: &Path, dst: &Path) -> io::Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut input = BufReader::new(File::open(src)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(dst)?), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    drop(writer);
    Ok(fs::metadata(dst)?.len())
}

/// Gunzip `src` into `dst` through a temp path
pub fn gunzip_file(src: &Path, dst: &Path) -> io::Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = staging_path(dst);
    let written = {
        let mut decoder = GzDecoder::new(BufReader::new(File::open(src)?));
        let mut out = BufWriter::new(File::create(&tmp)?);
        let n = io::copy(&mut decoder, &mut out)?;
        out.flush()?;
        n
    };
    fs::rename(&tmp, dst)?;
    Ok(written)
}

/// Recursively copy a directory. Returns the number of files copied.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<usize> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Copy a file or a directory tree
pub fn copy_path(src: &Path, dst: &Path) -> io::Result<usize> {
    if src.is_dir() {
        copy_dir_recursive(src, dst)
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
        Ok(1)
    }
}

/// Remove a file or a directory tree; absent paths are fine
pub fn remove_path(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else if path.exists() {
        fs::remove_file(path)
    } else {
        Ok(())
    }
}

/// Total bytes under a path (0 when absent)
pub fn dir_size(path: &Path) -> u64 {
    list_files(path)
        .into_iter()
        .filter_map(|p| fs::metadata(p).ok())
        .map(|m| m.len())
        .sum()
}

/// Every regular file under `root`, sorted
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if root.is_file() {
        files.push(root.to_path_buf());
        return files;
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(t) if t.is_dir() => stack.push(path),
                Ok(t) if t.is_file() => files.push(path),
                _ => {}
            }
        }
    }
    files.sort();
    files
}

/// Hex SHA-256 of a file, streamed
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Combined checksum of a directory tree: SHA-256 over the sorted
/// `relative_path:file_hash` lines joined by `|`. Files named in `exclude`
/// (matched on the relative path) are skipped.
pub fn tree_checksum(root: &Path, exclude: &[&str]) -> io::Result<String> {
    let mut lines = Vec::new();
    for path in list_files(root) {
        let relative = relative_name(root, &path);
        if exclude.contains(&relative.as_str()) {
            continue;
        }
        lines.push(format!("{}:{}", relative, file_sha256(&path)?));
    }
    lines.sort();

    let mut hasher = Sha256::new();
    hasher.update(lines.join("|").as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// `path` relative to `root`, with `/` separators
pub fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Write JSON through a temp path
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> crate::Result<()> {
    let tmp = staging_path(path);
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read JSON
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> crate::Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_gzip_round_trip() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("app.log");
        fs::write(&src, "line one\nline two\n".repeat(100)).unwrap();

        let gz = dir.path().join("out/app.log.gz");
        let compressed = gzip_file(&src, &gz).unwrap();
        assert!(compressed > 0);
        assert!(compressed < fs::metadata(&src).unwrap().len());

        let restored = dir.path().join("restored/app.log");
        gunzip_file(&gz, &restored).unwrap();
        assert_eq!(fs::read(&src).unwrap(), fs::read(&restored).unwrap());
    }

    #[test]
    fn test_copy_dir_recursive_and_size() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.txt"), b"aaaa").unwrap();
        fs::write(src.join("nested/b.txt"), b"bb").unwrap();

        let copied = copy_dir_recursive(&src, &dir.path().join("dst")).unwrap();
        assert_eq!(copied, 2);
        assert_eq!(dir_size(&dir.path().join("dst")), 6);
        assert_eq!(
            fs::read(dir.path().join("dst/nested/b.txt")).unwrap(),
            b"bb"
        );
    }

    #[test]
    fn test_tree_checksum_excludes_and_detects_change() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config/config.json"), b"{}").unwrap();
        fs::write(dir.path().join("meta.json"), b"first").unwrap();

        let before = tree_checksum(dir.path(), &["meta.json"]).unwrap();
        fs::write(dir.path().join("meta.json"), b"second").unwrap();
        assert_eq!(before, tree_checksum(dir.path(), &["meta.json"]).unwrap());

        fs::write(dir.path().join("config/config.json"), b"{\"x\":1}").unwrap();
        assert_ne!(before, tree_checksum(dir.path(), &["meta.json"]).unwrap());
    }

    #[test]
    fn test_atomic_copy_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("chain.json.gz");
        fs::write(&src, b"payload").unwrap();

        let dst = dir.path().join("copy/chain.json.gz");
        assert_eq!(atomic_copy(&src, &dst).unwrap(), 7);
        let names: Vec<_> = fs::read_dir(dir.path().join("copy"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("chain.json.gz")]);
    }

    #[test]
    fn test_remove_path_absent_is_ok() {
        let dir = TempDir::new().unwrap();
        remove_path(&dir.path().join("missing")).unwrap();
    }
}
