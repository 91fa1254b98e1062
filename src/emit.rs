//! Submission emitter
//!
//! Scripts are persisted with an atomic swap: the bytes go to a unique
//! temporary file in the destination directory, the file is synced, and it
//! is then renamed over the destination. A failure at any step removes the
//! temporary file, so the destination either holds the complete new script
//! or is left as it was.
//!
//! The emitter never executes or submits what it writes.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::digest::ContentHash;
use crate::error::{Error, Result};
use crate::renderer::RenderedScript;
use crate::validate::Bindings;

const SCRIPT_MODE: u32 = 0o644;
const EXECUTABLE_MODE: u32 = 0o755;
const METADATA_SUFFIX: &str = ".meta.json";

/// What was written and where
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub destination: String,
    pub content_hash: ContentHash,
    pub bytes: usize,
    pub template: String,
    pub dialect: Option<String>,
    pub template_version: ContentHash,
    /// Exact values substituted, defaults included
    pub bindings: Bindings,
}

impl Receipt {
    fn new(script: &RenderedScript, destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            content_hash: *script.content_hash(),
            bytes: script.text().len(),
            template: script.template().to_string(),
            dialect: script.dialect().map(str::to_string),
            template_version: *script.template_version(),
            bindings: script.bindings().clone(),
        }
    }
}

/// Writes rendered scripts to files or streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Emitter {
    write_metadata: bool,
    executable: bool,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write a `<file>.meta.json` receipt beside each script
    pub fn with_metadata(mut self, write_metadata: bool) -> Self {
        self.write_metadata = write_metadata;
        self
    }

    /// Mark emitted files executable (Unix only)
    pub fn with_executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }

    pub fn writes_metadata(&self) -> bool {
        self.write_metadata
    }

    pub fn is_executable(&self) -> bool {
        self.executable
    }

    /// Atomically write `script` to `path`
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteFailure`] naming the file that could not be
    /// created, written, synced or renamed. The script at `path` is left as
    /// it was in that case, including when only the metadata fails.
    pub fn emit_to_path(&self, script: &RenderedScript, path: &Path) -> Result<Receipt> {
        let destination = path.display().to_string();
        let mode = if self.executable {
            EXECUTABLE_MODE
        } else {
            SCRIPT_MODE
        };

        let staged = stage(path, script.text().as_bytes(), mode)
            .map_err(|source| Error::write_failure(&destination, source))?;
        let receipt = Receipt::new(script, destination);

        // The sidecar lands first so a failure on either file leaves the
        // script at `path` untouched
        let mut sidecar_written = None;
        if self.write_metadata {
            let sidecar = metadata_path(path);
            let label = sidecar.display().to_string();
            let json = serde_json::to_vec_pretty(&receipt)
                .map_err(|err| Error::write_failure(&label, err.into()))?;
            stage(&sidecar, &json, SCRIPT_MODE)
                .and_then(|temp| persist(temp, &sidecar))
                .map_err(|source| Error::write_failure(&label, source))?;
            debug!(path = %label, "wrote metadata");
            sidecar_written = Some(sidecar);
        }

        if let Err(source) = persist(staged, path) {
            if let Some(sidecar) = sidecar_written {
                if let Err(err) = std::fs::remove_file(&sidecar) {
                    warn!(path = %sidecar.display(), error = %err, "failed to remove metadata");
                }
            }
            return Err(Error::write_failure(&receipt.destination, source));
        }

        info!(
            destination = %receipt.destination,
            hash = %receipt.content_hash.short(),
            bytes = receipt.bytes,
            "emitted script"
        );
        Ok(receipt)
    }

    /// Write `script` to a stream, labelled `destination` in the receipt
    pub fn emit_to_writer<W: Write>(
        &self,
        script: &RenderedScript,
        writer: &mut W,
        destination: &str,
    ) -> Result<Receipt> {
        writer
            .write_all(script.text().as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|source| Error::write_failure(destination, source))?;

        let receipt = Receipt::new(script, destination);
        info!(
            destination = %receipt.destination,
            hash = %receipt.content_hash.short(),
            bytes = receipt.bytes,
            "emitted script"
        );
        Ok(receipt)
    }
}

/// Path of the metadata sidecar for a script written to `path`
pub fn metadata_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(METADATA_SUFFIX);
    PathBuf::from(name)
}

/// Write `contents` to a synced temporary file beside `path`
fn stage(path: &Path, contents: &[u8], mode: u32) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".qscript-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(contents)?;
    temp.flush()?;
    set_mode(temp.as_file(), mode)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}

/// Rename a staged file over `path`; the temporary file is removed on failure
fn persist(temp: NamedTempFile, path: &Path) -> io::Result<()> {
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{render_script, RenderConfig};
    use crate::template::Template;
    use crate::validate::{validate, ValidationMode};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn script() -> RenderedScript {
        let template = Template::new("t", "#!/bin/sh\nexec $${cmd}\n").expect("Should build");
        let bindings = Bindings::new().with("cmd", "a.out");
        let validated =
            validate(&template, &bindings, ValidationMode::Strict).expect("Should validate");
        render_script(&template, &validated, &RenderConfig::default()).expect("Should render")
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("Should list")
            .map(|entry| entry.expect("Should read entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_emit_to_path() {
        let dir = tempdir().expect("Should create temp dir");
        let path = dir.path().join("job.sh");
        let script = script();

        let receipt = Emitter::new().emit_to_path(&script, &path).expect("Should emit");

        assert_eq!(fs::read_to_string(&path).expect("Should read"), "#!/bin/sh\nexec a.out\n");
        assert_eq!(receipt.content_hash, *script.content_hash());
        assert_eq!(receipt.bytes, script.text().len());
        assert_eq!(receipt.bindings.get("cmd"), Some("a.out"));
        assert_eq!(entries(dir.path()), vec!["job.sh"]);
    }

    #[test]
    fn test_overwrites_existing_file() {
        let dir = tempdir().expect("Should create temp dir");
        let path = dir.path().join("job.sh");
        fs::write(&path, "stale").expect("Should write");

        Emitter::new().emit_to_path(&script(), &path).expect("Should emit");
        assert_eq!(fs::read_to_string(&path).expect("Should read"), "#!/bin/sh\nexec a.out\n");
    }

    #[test]
    fn test_metadata_sidecar() {
        let dir = tempdir().expect("Should create temp dir");
        let path = dir.path().join("job.sh");
        let receipt = Emitter::new()
            .with_metadata(true)
            .emit_to_path(&script(), &path)
            .expect("Should emit");

        let raw = fs::read_to_string(dir.path().join("job.sh.meta.json")).expect("Should read");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("Should parse");
        assert_eq!(json["content_hash"], receipt.content_hash.to_hex());
        assert_eq!(json["bindings"]["cmd"], "a.out");
        assert_eq!(json["template"], "t");
        assert_eq!(entries(dir.path()), vec!["job.sh", "job.sh.meta.json"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("Should create temp dir");
        let plain = dir.path().join("plain.sh");
        let exec = dir.path().join("exec.sh");

        Emitter::new().emit_to_path(&script(), &plain).expect("Should emit");
        Emitter::new()
            .with_executable(true)
            .emit_to_path(&script(), &exec)
            .expect("Should emit");

        let mode = |p: &Path| fs::metadata(p).expect("Should stat").permissions().mode() & 0o777;
        assert_eq!(mode(&plain), 0o644);
        assert_eq!(mode(&exec), 0o755);
    }

    #[test]
    fn test_missing_directory_is_write_failure() {
        let dir = tempdir().expect("Should create temp dir");
        let path = dir.path().join("absent").join("job.sh");

        let err = Emitter::new().emit_to_path(&script(), &path).unwrap_err();
        match err {
            Error::WriteFailure { destination, .. } => {
                assert_eq!(destination, path.display().to_string())
            }
            other => panic!("Expected WriteFailure, got {:?}", other),
        }
        assert!(!path.exists());
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn test_failed_rename_leaves_no_temp_file() {
        let dir = tempdir().expect("Should create temp dir");
        let path = dir.path().join("job.sh");
        fs::create_dir(&path).expect("Should create dir");

        let err = Emitter::new().emit_to_path(&script(), &path).unwrap_err();
        assert!(matches!(err, Error::WriteFailure { .. }));
        assert!(path.is_dir());
        assert_eq!(entries(dir.path()), vec!["job.sh"]);
    }

    #[test]
    fn test_failed_metadata_leaves_script_untouched() {
        let dir = tempdir().expect("Should create temp dir");
        let path = dir.path().join("job.sh");
        fs::create_dir(dir.path().join("job.sh.meta.json")).expect("Should create dir");

        let err = Emitter::new()
            .with_metadata(true)
            .emit_to_path(&script(), &path)
            .unwrap_err();
        match err {
            Error::WriteFailure { destination, .. } => {
                assert!(destination.ends_with("job.sh.meta.json"))
            }
            other => panic!("Expected WriteFailure, got {:?}", other),
        }
        assert!(!path.exists());
        assert_eq!(entries(dir.path()), vec!["job.sh.meta.json"]);

        fs::write(&path, "previous").expect("Should write");
        Emitter::new()
            .with_metadata(true)
            .emit_to_path(&script(), &path)
            .unwrap_err();
        assert_eq!(fs::read_to_string(&path).expect("Should read"), "previous");
    }

    #[test]
    fn test_failed_script_rename_removes_metadata() {
        let dir = tempdir().expect("Should create temp dir");
        let path = dir.path().join("job.sh");
        fs::create_dir(&path).expect("Should create dir");

        let err = Emitter::new()
            .with_metadata(true)
            .emit_to_path(&script(), &path)
            .unwrap_err();
        assert!(matches!(err, Error::WriteFailure { .. }));
        assert_eq!(entries(dir.path()), vec!["job.sh"]);
    }

    #[test]
    fn test_emit_to_writer() {
        let mut out = Vec::new();
        let receipt = Emitter::new()
            .emit_to_writer(&script(), &mut out, "<stdout>")
            .expect("Should emit");
        assert_eq!(String::from_utf8(out).expect("utf-8"), "#!/bin/sh\nexec a.out\n");
        assert_eq!(receipt.destination, "<stdout>");
    }

    #[test]
    fn test_metadata_path() {
        assert_eq!(metadata_path(Path::new("out/job.sh")), PathBuf::from("out/job.sh.meta.json"));
    }
}
