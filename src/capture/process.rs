//! Child processes that stream sensor data on stdout.

use crate::capture::CaptureError;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// A spawned capture tool (`libcamera-vid`, `arecord`, ...).
#[derive(Debug)]
pub struct StreamProcess {
    program: String,
    child: Child,
}

impl StreamProcess {
    /// Spawn `program` with stdout piped and stderr discarded.
    pub fn spawn(program: &str, args: &[String]) -> Result<(Self, ChildStdout), CaptureError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{program}: {e}")))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CaptureError::DeviceUnavailable(format!("{program}: stdout not captured"))
        })?;

        tracing::debug!("Spawned {} (pid {})", program, child.id());
        Ok((
            Self {
                program: program.to_string(),
                child,
            },
            stdout,
        ))
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Wait up to `grace` for the process to exit on its own, then kill it.
    ///
    /// Streaming tools exit on a broken pipe once their reader is gone.
    pub fn terminate(&mut self, grace: Duration) {
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!("{} exited with {}", self.program, status);
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(20));
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Could not poll {}: {}", self.program, e);
                    break;
                }
            }
        }

        tracing::info!("Killing {} after {:?} grace period", self.program, grace);
        if let Err(e) = self.child.kill() {
            tracing::warn!("Could not kill {}: {}", self.program, e);
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_device_unavailable() {
        let err = StreamProcess::spawn("sleep-sentinel-no-such-tool", &[]).unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }
}
