use crate::errors::RunnerError;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const LOGS_BUNDLE: &str = "scraper-logs";
pub const DATA_BUNDLE: &str = "scraper-data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub path: String,
    pub size: u64,
}

/// Written next to the bundle as `<name>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub name: String,
    pub source: PathBuf,
    pub files: Vec<BundleEntry>,
}

impl BundleManifest {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Copy `source_dir` into `bundle_dir/<name>/`, replacing any earlier bundle
/// with the same name. Dot-files are left out.
pub fn export_bundle(
    name: &str,
    source_dir: &Path,
    bundle_dir: &Path,
) -> Result<BundleManifest, RunnerError> {
    let target = bundle_dir.join(name);
    if target.exists() {
        std::fs::remove_dir_all(&target)?;
    }
    std::fs::create_dir_all(&target)?;

    let mut files = Vec::new();
    if source_dir.is_dir() {
        copy_tree(source_dir, &target, Path::new(""), &mut files)?;
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let manifest = BundleManifest {
        name: name.to_string(),
        source: source_dir.to_path_buf(),
        files,
    };
    std::fs::write(
        bundle_dir.join(format!("{}.json", name)),
        serde_json::to_vec_pretty(&manifest)?,
    )?;

    info!(
        "Bundle {} holds {} file(s), {} bytes",
        name,
        manifest.files.len(),
        manifest.total_size()
    );
    Ok(manifest)
}

fn copy_tree(
    from: &Path,
    to: &Path,
    relative: &Path,
    files: &mut Vec<BundleEntry>,
) -> Result<(), RunnerError> {
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }
        let rel = relative.join(&file_name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            std::fs::create_dir_all(to.join(&file_name))?;
            copy_tree(&entry.path(), &to.join(&file_name), &rel, files)?;
        } else if file_type.is_file() {
            let size = std::fs::copy(entry.path(), to.join(&file_name))?;
            files.push(BundleEntry {
                path: rel.to_string_lossy().replace('\\', "/"),
                size,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_copies_tree_and_writes_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        std::fs::create_dir_all(data.join("raw")).unwrap();
        std::fs::write(data.join("turbo_az_listings.csv"), "id\n1\n").unwrap();
        std::fs::write(data.join("raw/page1.html"), "<html/>").unwrap();
        std::fs::write(data.join(".hidden"), "x").unwrap();
        let out = tmp.path().join("artifacts");

        let manifest = export_bundle(DATA_BUNDLE, &data, &out).unwrap();

        assert_eq!(
            manifest.files,
            vec![
                BundleEntry {
                    path: "raw/page1.html".into(),
                    size: 7
                },
                BundleEntry {
                    path: "turbo_az_listings.csv".into(),
                    size: 5
                },
            ]
        );
        assert_eq!(manifest.total_size(), 12);
        assert!(out.join("scraper-data/raw/page1.html").is_file());
        assert!(!out.join("scraper-data/.hidden").exists());

        let written: BundleManifest =
            serde_json::from_slice(&std::fs::read(out.join("scraper-data.json")).unwrap()).unwrap();
        assert_eq!(written, manifest);
    }

    #[test]
    fn test_export_replaces_previous_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let logs = tmp.path().join("logs");
        std::fs::create_dir_all(&logs).unwrap();
        std::fs::write(logs.join("scraper_20240101_000000.log"), "a").unwrap();
        let out = tmp.path().join("artifacts");
        export_bundle(LOGS_BUNDLE, &logs, &out).unwrap();

        std::fs::remove_file(logs.join("scraper_20240101_000000.log")).unwrap();
        std::fs::write(logs.join("scraper_20240102_000000.log"), "b").unwrap();
        let manifest = export_bundle(LOGS_BUNDLE, &logs, &out).unwrap();

        assert_eq!(manifest.files.len(), 1);
        assert!(!out.join("scraper-logs/scraper_20240101_000000.log").exists());
        assert!(out.join("scraper-logs/scraper_20240102_000000.log").exists());
    }

    #[test]
    fn test_missing_source_gives_empty_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest =
            export_bundle(DATA_BUNDLE, &tmp.path().join("nope"), &tmp.path().join("out")).unwrap();
        assert!(manifest.files.is_empty());
        assert!(tmp.path().join("out/scraper-data").is_dir());
    }
}
