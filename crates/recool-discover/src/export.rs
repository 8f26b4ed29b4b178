//! Network model export through nplan.
//!
//! After each completed scan the latest nmap XML is folded into an nplan
//! model, which is then rendered as a draw.io diagram. Both steps are
//! best-effort: a failure is logged and the scan workflow carries on.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

/// Wrapper around the nplan binary.
pub struct ModelExporter {
    nplan_path: String,
    storage: PathBuf,
}

impl ModelExporter {
    pub fn new(nplan_path: &str, storage: &Path) -> Self {
        Self {
            nplan_path: nplan_path.to_string(),
            storage: storage.to_path_buf(),
        }
    }

    pub fn model_path(&self) -> PathBuf {
        self.storage.join("model.json")
    }

    pub fn diagram_path(&self) -> PathBuf {
        self.storage.join("drawio.xml")
    }

    /// Arguments for the two nplan invocations, in order.
    fn invocations(&self, scan_xml: &Path) -> [Vec<String>; 2] {
        let model = self.model_path().display().to_string();
        [
            vec![
                "-nmap".to_string(),
                scan_xml.display().to_string(),
                "-json".to_string(),
                model.clone(),
            ],
            vec![
                "-export".to_string(),
                "-json".to_string(),
                model,
                "-drawio".to_string(),
                self.diagram_path().display().to_string(),
            ],
        ]
    }

    /// Update the model from `scan_xml` and regenerate the diagram.
    ///
    /// Returns whether both steps succeeded.
    pub async fn export(&self, scan_xml: &Path) -> bool {
        for args in self.invocations(scan_xml) {
            let status = Command::new(&self.nplan_path)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;

            match status {
                Ok(s) if s.success() => {}
                Ok(s) => {
                    tracing::warn!(nplan = %self.nplan_path, args = ?args, code = ?s.code(), "nplan failed");
                    return false;
                }
                Err(e) => {
                    tracing::warn!(nplan = %self.nplan_path, error = %e, "Could not run nplan");
                    return false;
                }
            }
        }

        tracing::debug!(diagram = %self.diagram_path().display(), "Network model exported");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocations() {
        let exporter = ModelExporter::new("nplan", Path::new("/data"));
        let [update, render] = exporter.invocations(Path::new("/data/scan.xml"));

        assert_eq!(
            update,
            vec!["-nmap", "/data/scan.xml", "-json", "/data/model.json"]
        );
        assert_eq!(
            render,
            vec!["-export", "-json", "/data/model.json", "-drawio", "/data/drawio.xml"]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ModelExporter::new("/nonexistent/nplan", dir.path());
        assert!(!exporter.export(&dir.path().join("scan.xml")).await);
    }
}
