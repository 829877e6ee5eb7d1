//! Run artifact persistence: one directory per run id holding the final
//! file map plus `run_report.json`.

use devmatrix_core::model::file_map::{FileContents, FileMap};
use devmatrix_core::model::report::RunReport;
use devmatrix_core::Result;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Directory for one run's artifacts.
#[must_use]
pub fn run_dir(root: &Path, report: &RunReport) -> PathBuf {
    root.join(report.run_id.to_string())
}

/// Write the file map and report under `<root>/<run_id>/`.
pub async fn persist_run(root: &Path, files: &FileMap, report: &RunReport) -> Result<()> {
    let dir = run_dir(root, report);
    fs::create_dir_all(&dir).await?;

    for (path, contents) in files.iter() {
        let target = dir.join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        match contents {
            FileContents::Text(text) => fs::write(&target, text).await?,
            FileContents::Binary(bytes) => fs::write(&target, bytes).await?,
        }
    }

    fs::write(
        dir.join("run_report.json"),
        serde_json::to_vec_pretty(report)?,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn writes_tree_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileMap::new();
        files.insert("entities.py", "class User: ...").unwrap();
        files.insert("routes/users.py", "@router.get(\"/users\")").unwrap();

        let mut report = RunReport::started(Uuid::new_v4());
        report.succeed();

        persist_run(dir.path(), &files, &report).await.unwrap();

        let run = run_dir(dir.path(), &report);
        assert!(run.join("entities.py").exists());
        assert!(run.join("routes/users.py").exists());
        let raw = std::fs::read_to_string(run.join("run_report.json")).unwrap();
        assert!(raw.contains("\"success\""));
    }
}
