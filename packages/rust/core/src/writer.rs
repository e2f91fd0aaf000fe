//! Output writer.
//!
//! Files are first written into a hidden staging directory inside the output
//! directory, then renamed into place one by one. A failure while staging
//! leaves the output directory untouched. Renames are per file, so a failure
//! (or crash) during the final move can still leave a subset of complete
//! files behind; no file is ever published half-written.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use chatsplit_shared::{ChatsplitError, Result};

use crate::pipeline::{OutputFile, ProgressReporter};

/// Name prefix of the staging directory.
const STAGING_PREFIX: &str = ".chatsplit-staging-";

/// Write `files` into `output_dir`, creating it if needed.
///
/// Existing files with the same names are replaced. Returns the published
/// paths in input order.
#[instrument(skip_all, fields(dir = %output_dir.display(), files = files.len()))]
pub fn publish(
    output_dir: &Path,
    files: &[OutputFile],
    progress: &dyn ProgressReporter,
) -> Result<Vec<PathBuf>> {
    for file in files {
        check_file_name(&file.name)?;
    }

    std::fs::create_dir_all(output_dir).map_err(|e| ChatsplitError::io(output_dir, e))?;

    let staging = output_dir.join(format!("{STAGING_PREFIX}{}", Uuid::now_v7()));
    std::fs::create_dir(&staging).map_err(|e| ChatsplitError::io(&staging, e))?;

    let outcome = stage_and_move(&staging, output_dir, files, progress);

    if let Err(e) = std::fs::remove_dir_all(&staging) {
        warn!(path = %staging.display(), error = %e, "failed to remove staging directory");
    }

    let published = outcome?;
    info!(count = published.len(), "files published");
    Ok(published)
}

fn stage_and_move(
    staging: &Path,
    output_dir: &Path,
    files: &[OutputFile],
    progress: &dyn ProgressReporter,
) -> Result<Vec<PathBuf>> {
    let total = files.len();

    for (i, file) in files.iter().enumerate() {
        let path = staging.join(&file.name);
        std::fs::write(&path, &file.content).map_err(|e| ChatsplitError::io(&path, e))?;
        progress.file_written(&file.name, i + 1, total);
        debug!(file = %file.name, size = file.content.len(), "staged");
    }

    let mut published = Vec::with_capacity(total);
    for file in files {
        let from = staging.join(&file.name);
        let to = output_dir.join(&file.name);
        std::fs::rename(&from, &to).map_err(|e| ChatsplitError::io(&to, e))?;
        published.push(to);
    }

    Ok(published)
}

/// Output names must be plain file names inside the output directory.
fn check_file_name(name: &str) -> Result<()> {
    let path = Path::new(name);
    let plain = path.file_name().is_some_and(|f| f == path.as_os_str());
    if !plain || name.starts_with('.') {
        return Err(ChatsplitError::validation(format!(
            "invalid output file name {name:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ConversionResult, SilentProgress};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chatsplit-writer-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn file(name: &str, content: &str) -> OutputFile {
        OutputFile {
            name: name.into(),
            content: content.into(),
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    struct Counting(AtomicUsize);

    impl ProgressReporter for Counting {
        fn phase(&self, _name: &str) {}
        fn file_written(&self, _name: &str, _current: usize, _total: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn done(&self, _result: &ConversionResult) {}
    }

    #[test]
    fn publish_writes_all_files() {
        let tmp = temp_dir();
        let out = tmp.join("notes");
        let files = vec![file("headers_1.md", "# headers_1\n"), file("page 001.md", "body\n")];
        let progress = Counting(AtomicUsize::new(0));

        let paths = publish(&out, &files, &progress).unwrap();

        assert_eq!(paths, vec![out.join("headers_1.md"), out.join("page 001.md")]);
        assert_eq!(entries(&out), vec!["headers_1.md", "page 001.md"]);
        assert_eq!(std::fs::read_to_string(&paths[1]).unwrap(), "body\n");
        assert_eq!(progress.0.load(Ordering::SeqCst), 2);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn publish_replaces_existing_files() {
        let tmp = temp_dir();
        std::fs::write(tmp.join("page 001.md"), "old").unwrap();

        publish(&tmp, &[file("page 001.md", "new")], &SilentProgress).unwrap();
        assert_eq!(std::fs::read_to_string(tmp.join("page 001.md")).unwrap(), "new");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn failed_publish_removes_staging() {
        let tmp = temp_dir();
        // A non-empty directory where the first file should go blocks the rename.
        std::fs::create_dir_all(tmp.join("a.md").join("inner")).unwrap();

        let err = publish(&tmp, &[file("a.md", "a"), file("b.md", "b")], &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, ChatsplitError::Io { .. }));
        assert_eq!(entries(&tmp), vec!["a.md"]);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_names_outside_output_dir() {
        let tmp = temp_dir();
        for bad in ["../escape.md", "sub/page.md", ".hidden.md", ""] {
            let err = publish(&tmp, &[file(bad, "x")], &SilentProgress).unwrap_err();
            assert!(matches!(err, ChatsplitError::Validation { .. }), "{bad:?}");
        }
        assert!(entries(&tmp).is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
