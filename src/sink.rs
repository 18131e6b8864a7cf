use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channels::{frame_channel, Frame};

/// Wire format of the OLA streaming client: comma separated levels, one
/// frame per line.
pub fn encode(frame: &Frame) -> String {
    let mut line = frame.iter().map(u8::to_string).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

#[async_trait]
pub trait Sink: Send {
    async fn send(&mut self, frame: &Frame) -> Result<()>;
}

/// Pipes frames into `ola_streaming_client -u <universe>`.
pub struct OlaSink {
    _child: Child,
    stdin: ChildStdin,
}

impl OlaSink {
    pub fn spawn(universe: u16) -> Result<Self> {
        let mut child = Command::new("ola_streaming_client")
            .arg("-u")
            .arg(universe.to_string())
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn ola_streaming_client")?;

        let stdin = child.stdin.take().context("ola_streaming_client has no stdin")?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::error!("ola stderr: {}", line);
                }
                log::warn!("ola streaming client closed");
            });
        }

        log::info!("streaming to ola universe {}", universe);
        Ok(Self { _child: child, stdin })
    }
}

#[async_trait]
impl Sink for OlaSink {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        self.stdin.write_all(encode(frame).as_bytes()).await?;
        Ok(())
    }
}

/// Drops frames. Used when no transmitter is available.
pub struct NullSink;

#[async_trait]
impl Sink for NullSink {
    async fn send(&mut self, _frame: &Frame) -> Result<()> {
        Ok(())
    }
}

/// Runs `sink` on its own task, fed in commit order. Write failures are
/// logged once per outage and otherwise ignored.
pub fn spawn(mut sink: Box<dyn Sink>) -> (mpsc::Sender<Frame>, JoinHandle<()>) {
    let (tx, mut rx) = frame_channel();
    let handle = tokio::spawn(async move {
        let mut failing = false;
        while let Some(frame) = rx.recv().await {
            match sink.send(&frame).await {
                Ok(()) if failing => {
                    log::info!("sink recovered");
                    failing = false;
                }
                Ok(()) => {}
                Err(e) => {
                    if !failing {
                        log::warn!("sink write failed: {:?}", e);
                    }
                    failing = true;
                }
            }
        }
        log::debug!("sink stopped");
    });
    (tx, handle)
}
