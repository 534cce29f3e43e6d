//! DSLR capture through `gphoto2` and collage composition through ImageMagick `montage`.

use crate::config::CameraConfig;
use crate::domain::ports::CaptureDevice;
use crate::error::{KioskError, Result};
use crate::infrastructure::command;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Desktop volume monitor that grabs the camera over USB as soon as it appears.
const STALE_PROCESS: &str = "gvfsd-gphoto2";
const COLLAGE_NAME: &str = "final_collage.jpg";
const COLLAGE_SPACING: u32 = 140;
const COLLAGE_QUALITY: u32 = 85;
const RELEASE_PAUSE: Duration = Duration::from_millis(500);
const TOOL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct GphotoCamera {
    gphoto2: String,
    montage: String,
    photos_dir: PathBuf,
    max_photos: u32,
    capture_timeout: Duration,
    collage_timeout: Duration,
    count: AtomicU32,
}

impl GphotoCamera {
    pub fn new(config: &CameraConfig, photos_dir: impl Into<PathBuf>) -> Result<Self> {
        let photos_dir = photos_dir.into();
        std::fs::create_dir_all(&photos_dir)?;
        Ok(Self {
            gphoto2: config.gphoto2.clone(),
            montage: config.montage.clone(),
            photos_dir,
            max_photos: config.max_photos,
            capture_timeout: Duration::from_secs(config.capture_timeout_secs),
            collage_timeout: Duration::from_secs(config.collage_timeout_secs),
            count: AtomicU32::new(0),
        })
    }

    async fn session_photos(&self) -> Result<Vec<PathBuf>> {
        let mut photos = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.photos_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_photo(&path) {
                photos.push(path);
            }
        }
        photos.sort();
        Ok(photos)
    }
}

fn is_photo(path: &Path) -> bool {
    let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"));
    is_image && path.file_name() != Some(OsStr::new(COLLAGE_NAME))
}

/// Arguments for a two-column collage with every photo shown twice side by side, one row
/// per photo, on white.
pub fn collage_args(photos: &[PathBuf], output: &Path) -> Vec<String> {
    let mut args = Vec::with_capacity(photos.len() * 2 + 9);
    for photo in photos {
        let photo = photo.display().to_string();
        args.push(photo.clone());
        args.push(photo);
    }
    args.extend([
        "-tile".to_string(),
        format!("2x{}", photos.len()),
        "-geometry".to_string(),
        format!("+{COLLAGE_SPACING}+{COLLAGE_SPACING}"),
        "-background".to_string(),
        "white".to_string(),
        "-quality".to_string(),
        COLLAGE_QUALITY.to_string(),
        output.display().to_string(),
    ]);
    args
}

#[async_trait]
impl CaptureDevice for GphotoCamera {
    async fn take_photo(&self) -> Result<PathBuf> {
        self.release_stale_process().await;
        tokio::time::sleep(RELEASE_PAUSE).await;

        let number = self.count.load(Ordering::SeqCst) + 1;
        let target = self.photos_dir.join(format!("photo_{number:04}.jpg"));
        info!(photo = number, "taking photo");
        command::run_checked(
            &self.gphoto2,
            [
                "--capture-image-and-download".to_string(),
                "--filename".to_string(),
                target.display().to_string(),
            ],
            self.capture_timeout,
        )
        .await
        .map_err(|e| KioskError::CaptureError(e.to_string()))?;

        if !tokio::fs::try_exists(&target).await? {
            return Err(KioskError::CaptureError(format!(
                "{} reported success but {} is missing",
                self.gphoto2,
                target.display()
            )));
        }
        self.count.store(number, Ordering::SeqCst);
        info!(photo = number, path = %target.display(), "photo downloaded");
        Ok(target)
    }

    async fn create_collage(&self) -> Result<PathBuf> {
        let photos = self.session_photos().await?;
        if photos.len() != self.max_photos as usize {
            return Err(KioskError::CaptureError(format!(
                "expected {} photos, found {}",
                self.max_photos,
                photos.len()
            )));
        }

        let output = self.photos_dir.join(COLLAGE_NAME);
        command::run_checked(&self.montage, collage_args(&photos, &output), self.collage_timeout)
            .await
            .map_err(|e| KioskError::CaptureError(e.to_string()))?;
        let size = tokio::fs::metadata(&output).await?.len();
        info!(path = %output.display(), size_bytes = size, "collage created");
        Ok(output)
    }

    async fn release_stale_process(&self) {
        // pkill exits 1 when nothing matched.
        match command::run("pkill", ["-KILL", "-x", STALE_PROCESS], TOOL_TIMEOUT).await {
            Ok(output) if output.success() => info!("killed interfering {STALE_PROCESS}"),
            Ok(_) => debug!("no interfering {STALE_PROCESS} found"),
            Err(e) => warn!(error = %e, "could not look for {STALE_PROCESS}"),
        }
    }

    async fn purge_photos(&self) {
        let Ok(mut entries) = tokio::fs::read_dir(&self.photos_dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_file() {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => debug!(path = %path.display(), "deleted leftover photo"),
                    Err(e) => warn!(path = %path.display(), error = %e, "could not delete"),
                }
            }
        }
    }

    fn reset_count(&self) {
        self.count.store(0, Ordering::SeqCst);
        debug!("photo count reset");
    }

    fn current_count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    fn max_count(&self) -> u32 {
        self.max_photos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collage_args_duplicate_each_photo() {
        let photos = vec![PathBuf::from("p/photo_0001.jpg"), PathBuf::from("p/photo_0002.jpg")];
        let args = collage_args(&photos, Path::new("p/final_collage.jpg"));

        assert_eq!(
            &args[..4],
            ["p/photo_0001.jpg", "p/photo_0001.jpg", "p/photo_0002.jpg", "p/photo_0002.jpg"]
        );
        assert!(args.windows(2).any(|w| w == ["-tile", "2x2"]));
        assert!(args.windows(2).any(|w| w == ["-geometry", "+140+140"]));
        assert!(args.windows(2).any(|w| w == ["-quality", "85"]));
        assert_eq!(args.last().map(String::as_str), Some("p/final_collage.jpg"));
    }

    #[test]
    fn test_collage_is_not_a_session_photo() {
        assert!(is_photo(Path::new("photos/photo_0003.JPG")));
        assert!(is_photo(Path::new("photos/photo_0003.png")));
        assert!(!is_photo(Path::new("photos/final_collage.jpg")));
        assert!(!is_photo(Path::new("photos/notes.txt")));
    }

    #[tokio::test]
    async fn test_collage_needs_every_photo() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("photo_0001.jpg"), b"x").unwrap();
        let camera = GphotoCamera::new(&CameraConfig::default(), dir.path()).unwrap();

        let err = camera.create_collage().await.unwrap_err();
        assert!(matches!(err, KioskError::CaptureError(msg) if msg.contains("expected 4")));
    }

    #[tokio::test]
    async fn test_purge_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("photo_0001.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join(COLLAGE_NAME), b"x").unwrap();
        let camera = GphotoCamera::new(&CameraConfig::default(), dir.path()).unwrap();

        camera.purge_photos().await;

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
