use crate::config::ChimeConfig;
use crate::domain::ports::Chime;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Plays the countdown chime with an external player (`aplay` by default).
///
/// A new playback cuts off the previous one.
pub struct AplayChime {
    player: String,
    file: PathBuf,
    playing: Mutex<Option<Child>>,
}

impl AplayChime {
    pub fn new(config: &ChimeConfig) -> Self {
        if !config.file.exists() {
            warn!(file = %config.file.display(), "chime file not found, countdown will be silent");
        }
        Self {
            player: config.player.clone(),
            file: config.file.clone(),
            playing: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Chime for AplayChime {
    async fn play(&self) {
        let mut playing = self.playing.lock().await;
        if let Some(mut previous) = playing.take() {
            let _ = previous.kill().await;
        }

        let spawned = Command::new(&self.player)
            .arg("-q")
            .arg(&self.file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        match spawned {
            Ok(child) => {
                debug!(file = %self.file.display(), "chime playing");
                *playing = Some(child);
            }
            Err(e) => warn!(player = %self.player, error = %e, "could not play chime"),
        }
    }

    async fn stop(&self) {
        if let Some(mut child) = self.playing.lock().await.take() {
            let _ = child.kill().await;
            debug!("chime stopped");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_player_is_not_fatal() {
        let chime = AplayChime::new(&ChimeConfig {
            file: PathBuf::from("timer_audio.wav"),
            player: "definitely-not-a-player".to_string(),
        });
        chime.play().await;
        chime.stop().await;
        assert!(chime.playing.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_kills_playback() {
        // `true` ignores its arguments.
        let chime = AplayChime::new(&ChimeConfig {
            file: PathBuf::from("x"),
            player: "true".to_string(),
        });
        chime.play().await;
        assert!(chime.playing.lock().await.is_some());

        chime.stop().await;
        assert!(chime.playing.lock().await.is_none());
    }
}
