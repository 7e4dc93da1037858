// crates/autoflow-runtime/src/transport.rs
//
// Newline-delimited JSON framing for running a flow in a separate worker
// process. One control message per line; events flow worker -> supervisor,
// commands flow supervisor -> worker.

use crate::channel::{bounded, ChannelReceiver, ChannelSender, RunnerEndpoint, SupervisorHandle};
use autoflow_core::{CommandMessage, ControlMessage, EventMessage};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Write every message from `source` as one JSON line until the channel
/// closes. Returns the number of lines written.
pub async fn write_lines<T, W>(mut source: ChannelReceiver<T>, mut writer: W) -> io::Result<u64>
where
    T: Into<ControlMessage>,
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(message) = source.get().await {
        let line = match message.into().to_json_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("Skipping unserializable control message: {}", e);
                continue;
            }
        };
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        written += 1;
    }
    writer.shutdown().await?;
    Ok(written)
}

/// Read event lines into `sink` until EOF. Commands and malformed lines are
/// logged and skipped.
pub async fn read_events<R>(reader: R, sink: ChannelSender<EventMessage>) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    read_lines(reader, sink, |message| match message {
        ControlMessage::Event(event) => Some(event),
        ControlMessage::Command(command) => {
            warn!("Ignoring command '{}' on the event stream", command.command);
            None
        }
    })
    .await
}

/// Read command lines into `sink` until EOF. Events and malformed lines are
/// logged and skipped.
pub async fn read_commands<R>(reader: R, sink: ChannelSender<CommandMessage>) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    read_lines(reader, sink, |message| match message {
        ControlMessage::Command(command) => Some(command),
        ControlMessage::Event(event) => {
            warn!("Ignoring event '{}' on the command stream", event.kind);
            None
        }
    })
    .await
}

async fn read_lines<R, T>(
    reader: R,
    sink: ChannelSender<T>,
    pick: impl Fn(ControlMessage) -> Option<T>,
) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message = match ControlMessage::from_json_line(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping malformed control line: {}", e);
                continue;
            }
        };
        let Some(item) = pick(message) else {
            continue;
        };

        if sink.put_wait(item).await.is_err() {
            debug!("Receiver went away; stop reading");
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}

/// Background tasks pumping one side of a stdio bridge.
pub struct TransportTasks {
    inbound: JoinHandle<io::Result<u64>>,
    outbound: JoinHandle<io::Result<u64>>,
}

impl TransportTasks {
    /// Wait until every outbound message is written, then stop reading.
    pub async fn finish_outbound(self) -> io::Result<u64> {
        let written = join(self.outbound).await;
        self.inbound.abort();
        written
    }

    /// Wait until the inbound stream hits EOF, then stop writing.
    pub async fn finish_inbound(self) -> io::Result<u64> {
        let read = join(self.inbound).await;
        self.outbound.abort();
        read
    }

    /// Stop both directions now, closing the underlying streams.
    pub fn abort(self) {
        self.inbound.abort();
        self.outbound.abort();
    }
}

async fn join(handle: JoinHandle<io::Result<u64>>) -> io::Result<u64> {
    handle
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Worker side: commands are read from `input`, events written to `output`.
pub fn serve_runner<R, W>(
    input: R,
    output: W,
    capacity: usize,
    put_timeout: Duration,
) -> (RunnerEndpoint, TransportTasks)
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (event_tx, event_rx) = bounded::<EventMessage>(capacity, put_timeout);
    let (command_tx, command_rx) = bounded::<CommandMessage>(capacity, put_timeout);

    let tasks = TransportTasks {
        inbound: tokio::spawn(read_commands(input, command_tx)),
        outbound: tokio::spawn(write_lines(event_rx, output)),
    };
    (
        RunnerEndpoint {
            events: event_tx,
            commands: command_rx,
        },
        tasks,
    )
}

/// Supervisor side: events are read from `input`, commands written to
/// `output`.
pub fn connect_supervisor<R, W>(
    input: R,
    output: W,
    capacity: usize,
    put_timeout: Duration,
) -> (SupervisorHandle, TransportTasks)
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (event_tx, event_rx) = bounded::<EventMessage>(capacity, put_timeout);
    let (command_tx, command_rx) = bounded::<CommandMessage>(capacity, put_timeout);

    let tasks = TransportTasks {
        inbound: tokio::spawn(read_events(input, event_tx)),
        outbound: tokio::spawn(write_lines(command_rx, output)),
    };
    (SupervisorHandle::from_parts(command_tx, event_rx), tasks)
}
