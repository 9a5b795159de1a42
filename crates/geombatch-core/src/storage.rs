//! Storage layer: artifact discovery, working directory cleanup, output
//! directories and YAML/JSON file I/O.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::{LaunchError, Result};
use crate::models::{ArchiveMetadata, BatchReport};

/// Name of the optional metadata file inside an output directory.
pub const METADATA_FILE_NAME: &str = "launch.yaml";

// ─── Artifact manifest ───────────────────────────────────────────────────────

/// File extensions that identify tool artifacts in the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactManifest {
    extensions: Vec<String>,
}

impl ArtifactManifest {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Case-sensitive, like the `*.h5m` shell globs it replaces.
    pub fn matches(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.extensions.iter().any(|e| e == ext),
            None => false,
        }
    }

    /// Top-level files in `dir` matching the manifest, sorted. Symlinks to
    /// files count, as they would for a shell glob.
    pub fn matching_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = vec![];
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && self.matches(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Default for ArtifactManifest {
    fn default() -> Self {
        Self::new(["h5m", "jou", "log"])
    }
}

/// Remove stale artifacts from `dir`, except the files in `keep`. Returns the
/// removed paths.
pub fn clean_artifacts(
    dir: &Path,
    manifest: &ArtifactManifest,
    keep: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    let mut removed = vec![];
    for path in manifest.matching_files(dir)? {
        if is_same_file_as_any(&path, keep) {
            debug!(file = %path.display(), "Keeping matching file");
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(file = %path.display(), "Removed stale artifact");
                removed.push(path);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(removed)
}

/// Compares canonical paths; `keep` entries are expected to be canonical.
pub fn is_same_file_as_any(path: &Path, keep: &[PathBuf]) -> bool {
    match fs::canonicalize(path) {
        Ok(canonical) => keep.iter().any(|k| *k == canonical),
        Err(_) => false,
    }
}

// ─── Artifact registry ───────────────────────────────────────────────────────

/// Matching files in a directory keyed by file name, with their mtimes.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSnapshot {
    dir: PathBuf,
    files: BTreeMap<PathBuf, Option<SystemTime>>,
}

impl ArtifactSnapshot {
    pub fn scan(dir: &Path, manifest: &ArtifactManifest) -> Result<Self> {
        let mut files = BTreeMap::new();
        for path in manifest.matching_files(dir)? {
            let modified = path.metadata()?.modified().ok();
            if let Some(name) = path.file_name() {
                files.insert(PathBuf::from(name), modified);
            }
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
        })
    }

    /// Files in this snapshot that are absent from `before` or were modified
    /// since it was taken. Paths are joined onto the scanned directory.
    pub fn produced_since(&self, before: &ArtifactSnapshot) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|(name, mtime)| match before.files.get(*name) {
                None => true,
                Some(prev) => prev != *mtime,
            })
            .map(|(name, _)| self.dir.join(name))
            .collect()
    }
}

// ─── Directory helpers ───────────────────────────────────────────────────────

/// Reject names that are empty, `.`/`..`, or contain a path separator.
pub fn validate_file_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(LaunchError::InvalidOutputName(name.to_string()));
    }
    Ok(())
}

/// Create `parent/name`. The directory must not exist yet.
pub fn create_output_dir(parent: &Path, name: &str) -> Result<PathBuf> {
    validate_file_name(name)?;
    let path = parent.join(name);
    fs::create_dir(&path).map_err(|source| LaunchError::DirectoryCreation {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Move a file, falling back to copy + remove when a rename is not possible
/// (for instance across filesystems).
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    let map = |source| LaunchError::FileMove {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    if let Err(rename_err) = fs::rename(from, to) {
        if !from.is_file() {
            return Err(map(rename_err));
        }
        warn!(
            from = %from.display(),
            to = %to.display(),
            "rename failed ({}), copying instead",
            rename_err
        );
        fs::copy(from, to).map_err(map)?;
        if let Err(e) = fs::remove_file(from) {
            // The source stays authoritative; drop the copy.
            let _ = fs::remove_file(to);
            return Err(map(e));
        }
    }
    Ok(())
}

/// A file stored in an output directory.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArchivedFile {
    pub name: String,
    pub size: u64,
    pub ext: String,
}

pub fn list_archive(dir: &Path) -> Result<Vec<ArchivedFile>> {
    let mut files = vec![];
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        files.push(ArchivedFile {
            name: entry.file_name().to_string_lossy().to_string(),
            size: path.metadata()?.len(),
            ext,
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

// ─── YAML / JSON I/O ─────────────────────────────────────────────────────────

pub fn save_yaml<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
    let content = serde_yaml::to_string(data)?;
    fs::write(path, content)?;
    Ok(())
}

pub fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

pub fn save_archive_metadata(dir: &Path, meta: &ArchiveMetadata) -> Result<()> {
    save_yaml(&dir.join(METADATA_FILE_NAME), meta)
}

/// `None` when the directory has no metadata file.
pub fn load_archive_metadata(dir: &Path) -> Result<Option<ArchiveMetadata>> {
    let path = dir.join(METADATA_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }
    load_yaml(&path).map(Some)
}

/// Write a batch report: JSON for `.json` paths, YAML otherwise.
pub fn save_report(path: &Path, report: &BatchReport) -> Result<()> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        fs::write(path, serde_json::to_string_pretty(report)?)?;
        Ok(())
    } else {
        save_yaml(path, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        path
    }

    #[test]
    fn test_manifest_matches_extensions() {
        let m = ArtifactManifest::default();
        assert!(m.matches(Path::new("dagmc.h5m")));
        assert!(m.matches(Path::new("cubit01.jou")));
        assert!(m.matches(Path::new("trelis.log")));
        assert!(!m.matches(Path::new("geom_config")));
        assert!(!m.matches(Path::new("part.step")));
        assert!(!m.matches(Path::new("MESH.H5M")));
    }

    #[test]
    fn test_clean_removes_only_matching_files() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "old.h5m");
        touch(tmp.path(), "old.jou");
        touch(tmp.path(), "old.log");
        touch(tmp.path(), "keep.step");
        fs::create_dir(tmp.path().join("archive.h5m")).unwrap();

        let removed = clean_artifacts(tmp.path(), &ArtifactManifest::default(), &[]).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(tmp.path().join("keep.step").exists());
        assert!(tmp.path().join("archive.h5m").is_dir());
        assert!(!tmp.path().join("old.h5m").exists());
    }

    #[test]
    fn test_clean_empty_dir_is_ok() {
        let tmp = TempDir::new().unwrap();
        let removed = clean_artifacts(tmp.path(), &ArtifactManifest::default(), &[]).unwrap();
        assert!(removed.is_empty());
    }

    #[test]
    fn test_clean_skips_kept_files() {
        let tmp = TempDir::new().unwrap();
        let cfg = touch(tmp.path(), "demo.log");
        touch(tmp.path(), "stale.log");
        let keep = vec![fs::canonicalize(&cfg).unwrap()];

        let removed = clean_artifacts(tmp.path(), &ArtifactManifest::default(), &keep).unwrap();
        assert_eq!(removed, vec![tmp.path().join("stale.log")]);
        assert!(cfg.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_artifacts_are_matched() {
        let tmp = TempDir::new().unwrap();
        let target = touch(tmp.path(), "real.dat");
        std::os::unix::fs::symlink(&target, tmp.path().join("linked.h5m")).unwrap();
        let manifest = ArtifactManifest::default();

        assert_eq!(
            manifest.matching_files(tmp.path()).unwrap(),
            vec![tmp.path().join("linked.h5m")]
        );
        clean_artifacts(tmp.path(), &manifest, &[]).unwrap();
        assert!(!tmp.path().join("linked.h5m").exists());
        assert!(target.exists());
    }

    #[test]
    fn test_snapshot_diff_reports_new_files() {
        let tmp = TempDir::new().unwrap();
        let manifest = ArtifactManifest::default();
        touch(tmp.path(), "stale.log");
        let before = ArtifactSnapshot::scan(tmp.path(), &manifest).unwrap();
        assert_eq!(
            before.produced_since(&ArtifactSnapshot::default()),
            vec![tmp.path().join("stale.log")]
        );

        touch(tmp.path(), "dagmc.h5m");
        touch(tmp.path(), "notes.txt");
        let after = ArtifactSnapshot::scan(tmp.path(), &manifest).unwrap();

        assert_eq!(after.produced_since(&before), vec![tmp.path().join("dagmc.h5m")]);
    }

    #[test]
    fn test_output_dir_must_not_exist() {
        let tmp = TempDir::new().unwrap();
        let dir = create_output_dir(tmp.path(), "demo").unwrap();
        assert!(dir.is_dir());

        let err = create_output_dir(tmp.path(), "demo").unwrap_err();
        assert!(matches!(err, LaunchError::DirectoryCreation { .. }));
    }

    #[test]
    fn test_output_dir_name_validation() {
        let tmp = TempDir::new().unwrap();
        for name in ["", ".", "..", "a/b", "..\\x"] {
            let err = create_output_dir(tmp.path(), name).unwrap_err();
            assert!(matches!(err, LaunchError::InvalidOutputName(_)), "{name:?}");
        }
    }

    #[test]
    fn test_move_file_into_output_dir() {
        let tmp = TempDir::new().unwrap();
        let src = touch(tmp.path(), "dagmc.h5m");
        let out = create_output_dir(tmp.path(), "run1").unwrap();

        move_file(&src, &out.join("dagmc.h5m")).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(out.join("dagmc.h5m")).unwrap(), "dagmc.h5m");
    }

    #[test]
    fn test_move_missing_file_errors() {
        let tmp = TempDir::new().unwrap();
        let err = move_file(&tmp.path().join("nope.h5m"), &tmp.path().join("x.h5m")).unwrap_err();
        assert!(matches!(err, LaunchError::FileMove { .. }));
    }

    #[test]
    fn test_list_archive_sorted() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "geom_config");
        touch(tmp.path(), "b.jou");
        touch(tmp.path(), "a.h5m");
        let names: Vec<_> = list_archive(tmp.path())
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a.h5m", "b.jou", "geom_config"]);
    }

    #[test]
    fn test_missing_metadata_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load_archive_metadata(tmp.path()).unwrap().is_none());
    }
}
