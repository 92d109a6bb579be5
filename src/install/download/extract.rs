//! Archive extraction into a per-run staging directory
//!
//! Handles the vendor's `.zip` archives and `.tar.gz` mirrors. Every entry
//! path is validated before anything is written, so an archive with an
//! entry such as `../escape.txt` is rejected as a whole.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use log::{debug, info};
use tar::Archive;
use tempfile::TempDir;
use zip::ZipArchive;

use crate::error::{Result, UpdateError};

/// Freshly extracted archive contents, removed when dropped.
#[derive(Debug)]
pub struct StagingTree {
    dir: TempDir,
    entries: usize,
}

impl StagingTree {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Number of files and directories extracted.
    pub fn entries(&self) -> usize {
        self.entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    fn of(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else {
            ArchiveKind::Zip
        }
    }
}

/// Unpacks release archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    /// Extract `archive` into a new staging directory created under `work_dir`.
    ///
    /// The directory name is unique to this call, so a stale tree from an
    /// earlier failed run is never reused.
    pub async fn extract(&self, archive: &Path, work_dir: &Path) -> Result<StagingTree> {
        let dir = tempfile::Builder::new()
            .prefix("staging-")
            .tempdir_in(work_dir)
            .map_err(|e| UpdateError::extraction(work_dir, e))?;

        // Wrap CPU-bound extraction in spawn_blocking
        let archive = archive.to_path_buf();
        let root = dir.path().to_path_buf();
        let entries = tokio::task::spawn_blocking(move || extract_archive(&archive, &root))
            .await
            .map_err(|e| UpdateError::extraction(dir.path(), io::Error::other(e)))??;

        info!("Extracted {entries} entries into {}", dir.path().display());
        Ok(StagingTree { dir, entries })
    }
}

/// Extract `archive` into the existing directory `dest` (dispatch on file name).
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize> {
    match ArchiveKind::of(archive) {
        ArchiveKind::Zip => extract_zip(archive, dest),
        ArchiveKind::TarGz => extract_tar_gz(archive, dest),
    }
}

fn corrupt(err: impl std::fmt::Display) -> UpdateError {
    UpdateError::CorruptArchive(err.to_string())
}

fn escapes(entry: &str) -> UpdateError {
    UpdateError::CorruptArchive(format!(
        "entry `{entry}` would be written outside the staging directory"
    ))
}

/// Decompression errors surface as I/O errors; tell them apart from disk errors.
fn classify_io(path: &Path, err: io::Error) -> UpdateError {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => corrupt(err),
        _ => UpdateError::extraction(path, err),
    }
}

/// Extract a ZIP archive into `dest`.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<usize> {
    let zip_file = File::open(archive).map_err(|e| UpdateError::extraction(archive, e))?;
    let mut zip = ZipArchive::new(BufReader::new(zip_file)).map_err(corrupt)?;

    // Validate every entry before writing anything.
    let mut targets: Vec<PathBuf> = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip.by_index_raw(i).map_err(corrupt)?;
        let relative = entry.enclosed_name().ok_or_else(|| escapes(entry.name()))?;
        targets.push(relative);
    }

    for (i, relative) in targets.iter().enumerate() {
        let mut entry = zip.by_index(i).map_err(corrupt)?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| UpdateError::extraction(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| UpdateError::extraction(parent, e))?;
        }

        let mut outfile =
            File::create(&out_path).map_err(|e| UpdateError::extraction(&out_path, e))?;
        io::copy(&mut entry, &mut outfile).map_err(|e| classify_io(&out_path, e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|e| UpdateError::extraction(&out_path, e))?;
        }

        debug!("Extracted {}", relative.display());
    }

    Ok(targets.len())
}

fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Extract a gzip-compressed tarball into `dest`.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<usize> {
    let open = || -> Result<Archive<GzDecoder<BufReader<File>>>> {
        let file = File::open(archive).map_err(|e| UpdateError::extraction(archive, e))?;
        Ok(Archive::new(GzDecoder::new(BufReader::new(file))))
    };

    // First pass: validate entry paths and link targets.
    let mut count = 0usize;
    let mut tarball = open()?;
    for entry in tarball.entries().map_err(corrupt)? {
        let entry = entry.map_err(corrupt)?;
        let path = entry.path().map_err(corrupt)?.into_owned();
        if !is_contained(&path) {
            return Err(escapes(&path.to_string_lossy()));
        }
        if let Some(link) = entry.link_name().map_err(corrupt)?
            && !is_contained(&link)
        {
            return Err(escapes(&link.to_string_lossy()));
        }
        count += 1;
    }

    // Second pass: unpack.
    let mut tarball = open()?;
    tarball.set_preserve_permissions(true);
    for entry in tarball.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let path = entry.path().map_err(corrupt)?.into_owned();
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| classify_io(&dest.join(&path), e))?;
        if !unpacked {
            return Err(escapes(&path.to_string_lossy()));
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).expect("create zip");
        let mut writer = zip::ZipWriter::new(file);
        for (name, body) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .expect("dir");
            } else {
                writer
                    .start_file(*name, SimpleFileOptions::default().unix_permissions(0o755))
                    .expect("start");
                writer.write_all(body).expect("body");
            }
        }
        writer.finish().expect("finish");
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).expect("create tgz");
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, body) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            // set_path refuses `..`, so write the raw name bytes.
            let raw = &mut header.as_old_mut().name;
            raw[..name.len()].copy_from_slice(name.as_bytes());
            header.set_cksum();
            builder.append(&header, *body).expect("append");
        }
        builder
            .into_inner()
            .expect("tar")
            .finish()
            .expect("gzip");
    }

    #[test]
    fn extracts_nested_zip_tree() {
        let work = tempfile::tempdir().expect("tempdir");
        let archive = work.path().join("bedrock-server-1.0.0.1.zip");
        write_zip(
            &archive,
            &[
                ("bedrock_server", b"ELF"),
                ("behavior_packs/", b""),
                ("behavior_packs/vanilla/manifest.json", b"{}"),
                ("server.properties", b"level-name=Bedrock level"),
            ],
        );

        let dest = work.path().join("out");
        fs::create_dir(&dest).expect("dest");
        let count = extract_archive(&archive, &dest).expect("extract");

        assert_eq!(count, 4);
        assert_eq!(fs::read(dest.join("bedrock_server")).expect("read"), b"ELF");
        assert!(dest.join("behavior_packs/vanilla/manifest.json").is_file());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dest.join("bedrock_server"))
                .expect("meta")
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn rejects_parent_traversal_without_writing() {
        let work = tempfile::tempdir().expect("tempdir");
        let archive = work.path().join("evil.zip");
        write_zip(&archive, &[("ok.txt", b"fine"), ("../escape.txt", b"gotcha")]);

        let dest = work.path().join("stage");
        fs::create_dir(&dest).expect("dest");
        let err = extract_archive(&archive, &dest).unwrap_err();

        assert!(matches!(err, UpdateError::CorruptArchive(_)), "{err:?}");
        assert!(!work.path().join("escape.txt").exists());
        assert!(!dest.join("ok.txt").exists(), "nothing written before validation");
    }

    #[test]
    fn rejects_absolute_entries() {
        let work = tempfile::tempdir().expect("tempdir");
        let archive = work.path().join("abs.zip");
        write_zip(&archive, &[("/tmp/abs-escape.txt", b"x")]);

        let err = extract_archive(&archive, work.path()).unwrap_err();
        assert!(matches!(err, UpdateError::CorruptArchive(_)));
    }

    #[test]
    fn garbage_is_corrupt() {
        let work = tempfile::tempdir().expect("tempdir");
        let archive = work.path().join("bedrock-server.zip");
        fs::write(&archive, b"<html>blocked</html>").expect("write");

        let err = extract_archive(&archive, work.path()).unwrap_err();
        assert!(matches!(err, UpdateError::CorruptArchive(_)));
    }

    #[test]
    fn extracts_tar_gz() {
        let work = tempfile::tempdir().expect("tempdir");
        let archive = work.path().join("bedrock-server-1.0.0.1.tar.gz");
        write_tar_gz(&archive, &[("bin/bedrock_server", b"ELF"), ("README", b"hi")]);

        let dest = work.path().join("out");
        fs::create_dir(&dest).expect("dest");
        assert_eq!(extract_archive(&archive, &dest).expect("extract"), 2);
        assert_eq!(fs::read(dest.join("bin/bedrock_server")).expect("read"), b"ELF");
    }

    #[test]
    fn tar_traversal_is_rejected() {
        let work = tempfile::tempdir().expect("tempdir");
        let archive = work.path().join("evil.tgz");
        write_tar_gz(&archive, &[("../escape.txt", b"gotcha")]);

        let dest = work.path().join("out");
        fs::create_dir(&dest).expect("dest");
        let err = extract_archive(&archive, &dest).unwrap_err();
        assert!(matches!(err, UpdateError::CorruptArchive(_)));
        assert!(!work.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn staging_directories_are_unique_and_cleaned() {
        let work = tempfile::tempdir().expect("tempdir");
        let archive = work.path().join("a.zip");
        write_zip(&archive, &[("file.txt", b"1")]);

        let first = ArchiveExtractor.extract(&archive, work.path()).await.expect("first");
        let second = ArchiveExtractor.extract(&archive, work.path()).await.expect("second");
        assert_ne!(first.root(), second.root());
        assert_eq!(first.entries(), 1);

        let root = first.root().to_path_buf();
        drop(first);
        assert!(!root.exists());
    }
}
