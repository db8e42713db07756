use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::core::lifecycle::LifecycleComponent;
use crate::core::motion::{MotionDecision, MotionGate};
use crate::core::notify::Notifier;

/// Still-frame capture via `fswebcam`. The camera is a collaborator: this
/// module only shells out and hands back the file path.
pub struct Camera {
    media_dir: PathBuf,
}

impl Camera {
    pub fn new(media_dir: PathBuf) -> Self {
        Self { media_dir }
    }

    pub async fn capture(&self) -> Result<PathBuf> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = self.media_dir.join(format!("photo_{stamp}.jpg"));

        let output = Command::new("fswebcam")
            .args(["-r", "1280x720", "--no-banner"])
            .arg(&path)
            .output()
            .await?;
        if !output.status.success() {
            bail!(
                "fswebcam failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if !path.exists() {
            bail!("fswebcam reported success but wrote no file");
        }
        info!("photo captured: {}", path.display());
        Ok(path)
    }
}

/// One raw signal from the external motion detector.
#[derive(Debug)]
pub struct MotionSignal {
    pub at: DateTime<Utc>,
    pub photo: Option<PathBuf>,
}

pub fn motion_channel() -> (mpsc::Sender<MotionSignal>, mpsc::Receiver<MotionSignal>) {
    mpsc::channel(16)
}

/// Bridges raw motion signals to the cooldown gate and fans allowed alerts
/// out to operators. The pixel-level detection itself lives outside this
/// process; whatever feeds the channel is the detector.
pub struct MotionWatcher {
    rx: Option<mpsc::Receiver<MotionSignal>>,
    gate: Arc<MotionGate>,
    notifier: Arc<dyn Notifier>,
}

impl MotionWatcher {
    pub fn new(
        rx: mpsc::Receiver<MotionSignal>,
        gate: Arc<MotionGate>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            rx: Some(rx),
            gate,
            notifier,
        }
    }
}

#[async_trait]
impl LifecycleComponent for MotionWatcher {
    async fn on_start(&mut self) -> Result<()> {
        let Some(mut rx) = self.rx.take() else {
            return Ok(());
        };
        let gate = self.gate.clone();
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                let photo_str = signal.photo.as_ref().map(|p| p.display().to_string());
                match gate.on_motion_signal(signal.at, photo_str.as_deref()).await {
                    Ok(MotionDecision::Allowed) => {
                        let text = format!(
                            "🚨 SECURITY ALERT\n\n⚠️ Motion detected\n🕐 {}",
                            signal.at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
                        );
                        if let Err(e) = notifier.broadcast(&text, signal.photo.as_deref()).await {
                            error!("failed to broadcast motion alert: {}", e);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => error!("motion signal not recorded: {}", e),
                }
            }
            info!("motion watcher stopped: signal channel closed");
        });
        Ok(())
    }
}

/// Watches a spool directory where an external detector (e.g. `motion(1)`)
/// drops captured frames; every new file is one motion signal carrying that
/// frame. Files present at startup are not replayed.
pub struct MotionSpool {
    dir: PathBuf,
    tx: mpsc::Sender<MotionSignal>,
}

impl MotionSpool {
    const POLL_INTERVAL: Duration = Duration::from_secs(2);

    pub fn new(dir: PathBuf, tx: mpsc::Sender<MotionSignal>) -> Self {
        Self { dir, tx }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut seen: HashSet<PathBuf> = list_files(&self.dir).await.into_iter().collect();
            let mut interval = tokio::time::interval(Self::POLL_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                for path in list_files(&self.dir).await {
                    if seen.insert(path.clone())
                        && self
                            .tx
                            .send(MotionSignal {
                                at: Utc::now(),
                                photo: Some(path),
                            })
                            .await
                            .is_err()
                    {
                        // watcher gone, nothing left to feed
                        return;
                    }
                }
            }
        })
    }
}

async fn list_files(dir: &PathBuf) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return files;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.path());
        }
    }
    files
}
