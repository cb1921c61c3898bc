//! Output file naming and writing for one run.
//!
//! Every file of a run shares one local-time tag (`20250314-091502`):
//!
//! | File                          | Written when            |
//! |-------------------------------|-------------------------|
//! | `RTW-Check-<tag>.pdf`         | the result downloaded   |
//! | `RTW-Error-<tag>.pdf`         | the site reported error |
//! | `rtw-<tag>.error.png`         | any failure             |
//! | `rtw-<tag>.trace.zip`         | always, if enabled      |

use crate::error::RunError;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use std::path::{Path, PathBuf};

/// Paths of every artifact a run may produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub tag: String,
    pub result_pdf: PathBuf,
    pub error_pdf: PathBuf,
    pub error_png: PathBuf,
    pub trace: PathBuf,
}

impl ArtifactPaths {
    pub fn new(out_dir: &Path, tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            result_pdf: out_dir.join(format!("RTW-Check-{tag}.pdf")),
            error_pdf: out_dir.join(format!("RTW-Error-{tag}.pdf")),
            error_png: out_dir.join(format!("rtw-{tag}.error.png")),
            trace: out_dir.join(format!("rtw-{tag}.trace.zip")),
        }
    }

    /// Paths tagged with the current local time.
    pub fn now(out_dir: &Path) -> Self {
        Self::new(out_dir, &timestamp_tag(&Local::now()))
    }
}

/// `%Y%m%d-%H%M%S`.
pub fn timestamp_tag<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d-%H%M%S").to_string()
}

/// `<base>/rtw-YYYYMMDD`, the default output directory for a day's runs.
pub fn daily_dir(base: &Path, day: NaiveDate) -> PathBuf {
    base.join(format!("rtw-{}", day.format("%Y%m%d")))
}

/// Create `dir` and its parents.
pub async fn ensure_dir(dir: &Path) -> Result<(), RunError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| RunError::Io {
            path: dir.to_path_buf(),
            source: e,
        })
}

/// Write `bytes` to `path` atomically (temp file + rename).
pub async fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), RunError> {
    let io_err = |e| RunError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn names_share_one_tag() {
        let p = ArtifactPaths::new(Path::new("/out"), "20250314-091502");
        assert_eq!(p.result_pdf, Path::new("/out/RTW-Check-20250314-091502.pdf"));
        assert_eq!(p.error_pdf, Path::new("/out/RTW-Error-20250314-091502.pdf"));
        assert_eq!(p.error_png, Path::new("/out/rtw-20250314-091502.error.png"));
        assert_eq!(p.trace, Path::new("/out/rtw-20250314-091502.trace.zip"));
    }

    #[test]
    fn tag_format() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 15, 2).unwrap();
        assert_eq!(timestamp_tag(&at), "20250314-091502");
    }

    #[test]
    fn daily_directory() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        assert_eq!(daily_dir(Path::new("output"), day), Path::new("output/rtw-20250107"));
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_dir(&nested).await.unwrap();
        let path = nested.join("RTW-Check-x.pdf");
        write_artifact(&path, b"%PDF-1.7").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
        assert!(!nested.join("RTW-Check-x.pdf.part").exists());
    }
}
