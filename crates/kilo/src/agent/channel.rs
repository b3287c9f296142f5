//! Persistent stdio channel to a streaming agent subprocess.
//!
//! Frames in both directions are JSON [`ChannelFrame`]s behind a 4-byte
//! big-endian length prefix. The gateway writes one `request` frame and
//! closes stdin; the agent answers with `chunk` frames and then exactly one
//! `done` or `error` frame.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, stream};
use kilo_protocol::{ChannelFrame, Mode};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, warn};

use super::{AgentError, AgentEvent, AgentEventStream, AgentStreamer};

#[derive(Debug, Clone)]
pub struct StdioAgentConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Streams from an agent program spawned once per call.
///
/// The child is killed when the returned stream is dropped.
#[derive(Debug, Clone)]
pub struct StdioAgent {
    config: StdioAgentConfig,
}

impl StdioAgent {
    pub fn new(config: StdioAgentConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AgentStreamer for StdioAgent {
    fn name(&self) -> &'static str {
        "stdio"
    }

    async fn run_stream(&self, mode: Mode, input: Value) -> Result<AgentEventStream, AgentError> {
        let program = &self.config.program;
        let mut cmd = Command::new(program);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|err| AgentError::Unavailable(format!("failed to spawn {program}: {err}")))?;
        debug!(program = %program, pid = ?child.id(), %mode, "spawned stdio agent");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Unavailable("agent stdin was not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Unavailable("agent stdout was not captured".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr, program.clone()));
        }

        let request = ChannelFrame::Request { mode, input }.to_bytes()?;
        let mut writer = FramedWrite::new(stdin, LengthDelimitedCodec::new());
        writer
            .send(request)
            .await
            .map_err(|err| AgentError::Unavailable(format!("failed to write to {program}: {err}")))?;
        // Closing stdin tells the agent the request is complete.
        drop(writer);

        Ok(channel_events(stdout, child))
    }
}

async fn log_stderr(stderr: ChildStderr, program: String) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!(program = %program, "agent stderr: {}", line);
    }
}

/// Decode agent frames from `reader`.
///
/// `guard` lives exactly as long as the channel is open: it is dropped when
/// a terminal frame arrives, on failure, or when the stream itself is
/// dropped.
pub fn channel_events<R, G>(reader: R, guard: G) -> AgentEventStream
where
    R: AsyncRead + Unpin + Send + 'static,
    G: Send + 'static,
{
    let frames = FramedRead::new(reader, LengthDelimitedCodec::new());

    Box::pin(stream::unfold(Some((frames, guard)), |state| async move {
        let (mut frames, guard) = state?;
        let terminal = match frames.next().await {
            Some(Ok(bytes)) => match ChannelFrame::from_bytes(&bytes) {
                Ok(ChannelFrame::Chunk { payload }) => {
                    return Some((Ok(AgentEvent::Chunk(payload)), Some((frames, guard))));
                }
                Ok(ChannelFrame::Done) => Ok(AgentEvent::Done),
                Ok(ChannelFrame::Error { message }) => Err(AgentError::Failed(message)),
                Ok(ChannelFrame::Request { .. }) => Err(AgentError::Malformed(
                    "agent sent a request frame".to_string(),
                )),
                Err(err) => Err(err.into()),
            },
            Some(Err(err)) => {
                warn!("agent channel read failed: {}", err);
                Err(AgentError::StreamInterrupted)
            }
            None => Err(AgentError::StreamInterrupted),
        };
        drop(guard);
        Some((terminal, None))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::DuplexStream;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    async fn write_frames(agent_side: DuplexStream, frames: Vec<ChannelFrame>) {
        let mut writer = FramedWrite::new(agent_side, LengthDelimitedCodec::new());
        for frame in frames {
            writer.send(frame.to_bytes().unwrap()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn relays_chunks_then_done() {
        let (agent_side, gateway_side) = tokio::io::duplex(1024);
        write_frames(
            agent_side,
            vec![
                ChannelFrame::Chunk { payload: "a".into() },
                ChannelFrame::Chunk { payload: "b\nc".into() },
                ChannelFrame::Done,
            ],
        )
        .await;

        let events: Vec<_> = channel_events(gateway_side, ()).collect().await;
        let events: Vec<AgentEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                AgentEvent::Chunk("a".into()),
                AgentEvent::Chunk("b\nc".into()),
                AgentEvent::Done
            ]
        );
    }

    #[tokio::test]
    async fn eof_before_done_is_interrupted() {
        let (agent_side, gateway_side) = tokio::io::duplex(1024);
        write_frames(agent_side, vec![ChannelFrame::Chunk { payload: "a".into() }]).await;

        let events: Vec<_> = channel_events(gateway_side, ()).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Err(AgentError::StreamInterrupted)));
    }

    #[tokio::test]
    async fn error_frame_fails_the_stream() {
        let (agent_side, gateway_side) = tokio::io::duplex(1024);
        write_frames(
            agent_side,
            vec![ChannelFrame::Error {
                message: "model overloaded".into(),
            }],
        )
        .await;

        let events: Vec<_> = channel_events(gateway_side, ()).collect().await;
        assert!(matches!(&events[..], [Err(AgentError::Failed(msg))] if msg == "model overloaded"));
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_the_guard() {
        let (agent_side, gateway_side) = tokio::io::duplex(1024);
        let mut writer = FramedWrite::new(agent_side, LengthDelimitedCodec::new());
        writer
            .send(ChannelFrame::Chunk { payload: "a".into() }.to_bytes().unwrap())
            .await
            .unwrap();

        let released = Arc::new(AtomicBool::new(false));
        let mut events = channel_events(gateway_side, DropFlag(released.clone()));
        assert_eq!(events.next().await.unwrap().unwrap(), AgentEvent::Chunk("a".into()));
        assert!(!released.load(Ordering::SeqCst));

        drop(events);
        assert!(released.load(Ordering::SeqCst));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_agent_streams_frames() {
        // 31-byte chunk frame then 15-byte done frame, length-prefixed.
        let script = r#"cat >/dev/null; printf '\000\000\000\037{"type":"chunk","payload":"hi"}\000\000\000\017{"type":"done"}'"#;
        let agent = StdioAgent::new(StdioAgentConfig {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            working_dir: None,
        });

        let stream = agent
            .run_stream(Mode::Coder, Value::String("go".into()))
            .await
            .unwrap();
        let events: Vec<AgentEvent> = stream.map(Result::unwrap).collect().await;
        assert_eq!(events, vec![AgentEvent::Chunk("hi".into()), AgentEvent::Done]);
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let agent = StdioAgent::new(StdioAgentConfig {
            program: "/nonexistent/kilo-agent".into(),
            args: vec![],
            working_dir: None,
        });
        let err = agent.run_stream(Mode::Ask, Value::Null).await.err().unwrap();
        assert!(matches!(err, AgentError::Unavailable(_)));
    }
}
