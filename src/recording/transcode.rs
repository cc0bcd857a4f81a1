use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, TranscodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Unloaded,
    Ready,
}

/// Wrapper around the system `ffmpeg` binary.
///
/// The binary is probed once on first use; afterwards `load` is free. No
/// transcoder on the host is not fatal for recording, callers fall back to
/// saving the raw MJPEG stream.
pub struct TranscodeEngine {
    binary: String,
    state: Mutex<EngineState>,
}

impl TranscodeEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            state: Mutex::new(EngineState::Unloaded),
        }
    }

    pub async fn is_ready(&self) -> bool {
        *self.state.lock().await == EngineState::Ready
    }

    /// Probe the transcoder binary. Memoized: only the first call spawns a
    /// process.
    pub async fn load(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state == EngineState::Ready {
            return Ok(());
        }

        debug!("Probing transcoder binary '{}'", self.binary);
        let status = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| TranscodeError::EngineUnavailable {
                details: format!("failed to run '{} -version': {}", self.binary, e),
            })?;

        if !status.success() {
            return Err(TranscodeError::EngineUnavailable {
                details: format!("'{} -version' exited with {}", self.binary, status),
            }
            .into());
        }

        info!("Transcoder '{}' is available", self.binary);
        *state = EngineState::Ready;
        Ok(())
    }

    /// Convert an in-memory MJPEG elementary stream into an H.264 MP4.
    ///
    /// Input and output go through a temporary directory that is removed
    /// whether or not the conversion succeeds.
    pub async fn convert(&self, mjpeg: &[u8], framerate: u32) -> Result<Vec<u8>> {
        self.load().await?;

        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("input.mjpeg");
        let output = workdir.path().join("output.mp4");
        tokio::fs::write(&input, mjpeg).await?;

        let result = Command::new(&self.binary)
            .arg("-y")
            .arg("-f")
            .arg("mjpeg")
            .arg("-framerate")
            .arg(framerate.to_string())
            .arg("-i")
            .arg(&input)
            .arg("-c:v")
            .arg("libx264")
            .arg("-preset")
            .arg("ultrafast")
            .arg("-crf")
            .arg("28")
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| TranscodeError::Conversion {
                details: format!("failed to spawn '{}': {}", self.binary, e),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join("; ");
            return Err(TranscodeError::Conversion {
                details: format!("'{}' exited with {}: {}", self.binary, result.status, tail),
            }
            .into());
        }

        let data = tokio::fs::read(&output)
            .await
            .map_err(|e| TranscodeError::Conversion {
                details: format!("no MP4 output produced: {}", e),
            })?;
        if data.is_empty() {
            return Err(TranscodeError::Conversion {
                details: "transcoder produced an empty file".to_string(),
            }
            .into());
        }

        info!(
            "Transcoded {} bytes of MJPEG into {} bytes of MP4",
            mjpeg.len(),
            data.len()
        );
        Ok(data)
    }
}

impl std::fmt::Debug for TranscodeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeEngine")
            .field("binary", &self.binary)
            .finish()
    }
}
