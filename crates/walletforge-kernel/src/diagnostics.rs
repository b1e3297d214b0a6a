//! Screenshot and UI source bundles written when a step cannot proceed.

use std::path::{Path, PathBuf};

use chrono::Utc;
use device_adapter::{DeviceSession, DeviceShell, SurfaceId};
use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};
use walletforge_core_types::UnitId;

/// What a capture managed to write. Individual artifacts may be missing when
/// the device refused them; the directory itself always exists.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticBundle {
    pub dir: PathBuf,
    pub surfaces: Vec<String>,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DiagnosticsCapture {
    root: PathBuf,
}

impl DiagnosticsCapture {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bundle for a failed step of one unit, under `unit-<id>/<timestamp>-<step>/`.
    /// Never fails; problems are logged and `None` is returned.
    pub async fn capture_step(
        &self,
        session: &DeviceSession,
        unit: UnitId,
        step: &str,
    ) -> Option<PathBuf> {
        let dir = self
            .root
            .join(format!("unit-{unit}"))
            .join(format!("{}-{step}", timestamp()));
        match self.capture_into(&dir, session, None).await {
            Ok(bundle) => {
                info!(
                    unit_id = %unit,
                    step,
                    dir = %bundle.dir.display(),
                    files = bundle.files.len(),
                    "Diagnostics captured"
                );
                Some(bundle.dir)
            }
            Err(err) => {
                warn!(unit_id = %unit, step, error = %err, "Failed to capture diagnostics");
                None
            }
        }
    }

    /// Full scan of the current screen, including the shell UI dump when available.
    pub async fn scan(
        &self,
        session: &DeviceSession,
        shell: Option<&dyn DeviceShell>,
    ) -> std::io::Result<DiagnosticBundle> {
        let dir = self.root.join("scan").join(timestamp());
        self.capture_into(&dir, session, shell).await
    }

    async fn capture_into(
        &self,
        dir: &Path,
        session: &DeviceSession,
        shell: Option<&dyn DeviceShell>,
    ) -> std::io::Result<DiagnosticBundle> {
        fs::create_dir_all(dir).await?;
        let mut bundle = DiagnosticBundle {
            dir: dir.to_path_buf(),
            surfaces: Vec::new(),
            files: Vec::new(),
        };

        match session.screenshot().await {
            Ok(png) => write_artifact(&mut bundle, "screenshot.png", &png).await,
            Err(err) => warn!(error = %err, "Screenshot unavailable"),
        }

        if let Err(err) = session.switch_to_native().await {
            warn!(error = %err, "Could not switch to native surface for capture");
        }
        match session.page_source().await {
            Ok(source) => write_artifact(&mut bundle, "native.xml", source.as_bytes()).await,
            Err(err) => warn!(error = %err, "Native source unavailable"),
        }

        if let Some(shell) = shell {
            match shell.dump_ui_tree() {
                Ok(tree) => write_artifact(&mut bundle, "uiautomator.xml", tree.as_bytes()).await,
                Err(err) => warn!(error = %err, "uiautomator dump failed"),
            }
        }

        let surfaces = match session.list_surfaces().await {
            Ok(surfaces) => surfaces,
            Err(err) => {
                warn!(error = %err, "Could not list surfaces");
                Vec::new()
            }
        };
        bundle.surfaces = surfaces.iter().map(ToString::to_string).collect();
        let embedded: Vec<&SurfaceId> = surfaces.iter().filter(|s| s.is_embedded()).collect();
        for (index, surface) in embedded.into_iter().enumerate() {
            match embedded_source(session, surface).await {
                Ok(source) => {
                    let name = format!("embedded-{}.html", index + 1);
                    write_artifact(&mut bundle, &name, source.as_bytes()).await;
                }
                Err(err) => warn!(%surface, error = %err, "Embedded source unavailable"),
            }
        }

        let listing = bundle.surfaces.join("\n");
        write_artifact(&mut bundle, "surfaces.txt", listing.as_bytes()).await;
        Ok(bundle)
    }
}

async fn embedded_source(
    session: &DeviceSession,
    surface: &SurfaceId,
) -> Result<String, device_adapter::DeviceError> {
    session.switch_surface(surface).await?;
    let source = session.page_source().await;
    let restored = session.switch_to_native().await;
    let source = source?;
    restored?;
    Ok(source)
}

async fn write_artifact(bundle: &mut DiagnosticBundle, name: &str, bytes: &[u8]) {
    let path = bundle.dir.join(name);
    match fs::write(&path, bytes).await {
        Ok(()) => bundle.files.push(path),
        Err(err) => warn!(path = %path.display(), error = %err, "Failed to write artifact"),
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_adapter::{AppIdentity, MockDevice, MockShell};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn step_bundle_has_screenshot_and_both_sources() {
        let mock = Arc::new(MockDevice::new());
        let web = SurfaceId::new("WEBVIEW_com.example.wallet");
        mock.attach_surface(web.clone());
        mock.set_source(&SurfaceId::native(), "<hierarchy/>");
        mock.set_source(&web, "<html>claim</html>");
        let session = DeviceSession::from_driver(mock.clone(), AppIdentity::default());

        let dir = tempdir().unwrap();
        let capture = DiagnosticsCapture::new(dir.path());
        let path = capture
            .capture_step(&session, UnitId(4), "secret-entry")
            .await
            .unwrap();

        assert!(path.starts_with(dir.path().join("unit-4")));
        assert!(path.to_string_lossy().ends_with("-secret-entry"));
        assert!(path.join("screenshot.png").exists());
        assert!(path.join("native.xml").exists());
        let embedded = std::fs::read_to_string(path.join("embedded-1.html")).unwrap();
        assert!(embedded.contains("claim"));
        assert_eq!(mock.active_surface(), SurfaceId::native());
        session.close().await;
    }

    #[tokio::test]
    async fn scan_includes_shell_dump() {
        let mock = Arc::new(MockDevice::new());
        let session = DeviceSession::from_driver(mock, AppIdentity::default());
        let shell = MockShell::new();
        let dir = tempdir().unwrap();
        let bundle = DiagnosticsCapture::new(dir.path())
            .scan(&session, Some(&shell as &dyn DeviceShell))
            .await
            .unwrap();
        assert!(bundle.dir.join("uiautomator.xml").exists());
        assert_eq!(bundle.surfaces, vec![SurfaceId::NATIVE.to_string()]);
        session.close().await;
    }
}
