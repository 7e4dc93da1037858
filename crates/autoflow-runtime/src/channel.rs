// crates/autoflow-runtime/src/channel.rs

use autoflow_core::{ChannelError, Command, CommandMessage, EventMessage};
use std::time::Duration;
use tokio::sync::mpsc::{
    self,
    error::{SendTimeoutError, TryRecvError, TrySendError},
};

/// Create a bounded FIFO channel.
///
/// `put` never waits longer than `put_timeout`; a zero timeout makes it a
/// plain non-blocking try-send. Capacity is clamped to at least one.
pub fn bounded<T>(
    capacity: usize,
    put_timeout: Duration,
) -> (ChannelSender<T>, ChannelReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelSender {
            inner: tx,
            put_timeout,
        },
        ChannelReceiver { inner: rx },
    )
}

/// Producer half of a bounded channel.
pub struct ChannelSender<T> {
    inner: mpsc::Sender<T>,
    put_timeout: Duration,
}

impl<T> Clone for ChannelSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            put_timeout: self.put_timeout,
        }
    }
}

impl<T> ChannelSender<T> {
    /// Enqueue without waiting.
    pub fn try_put(&self, message: T) -> Result<(), ChannelError> {
        self.inner.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::Full,
            TrySendError::Closed(_) => ChannelError::Closed,
        })
    }

    /// Enqueue, waiting at most the configured put timeout for capacity.
    pub async fn put(&self, message: T) -> Result<(), ChannelError> {
        if self.put_timeout.is_zero() {
            return self.try_put(message);
        }
        self.inner
            .send_timeout(message, self.put_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => ChannelError::Timeout,
                SendTimeoutError::Closed(_) => ChannelError::Closed,
            })
    }

    /// Enqueue, waiting as long as it takes for capacity. Only for bridges
    /// whose producer is a pipe rather than the runner.
    pub async fn put_wait(&self, message: T) -> Result<(), ChannelError> {
        self.inner
            .send(message)
            .await
            .map_err(|_| ChannelError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Free slots right now.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.inner.max_capacity()
    }
}

/// Consumer half of a bounded channel.
pub struct ChannelReceiver<T> {
    inner: mpsc::Receiver<T>,
}

impl<T> ChannelReceiver<T> {
    /// Next message if one is queued. `Err(Closed)` once every sender is gone
    /// and the queue is drained.
    pub fn try_get(&mut self) -> Result<Option<T>, ChannelError> {
        match self.inner.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    /// Wait for the next message. `None` once the channel is closed and drained.
    pub async fn get(&mut self) -> Option<T> {
        self.inner.recv().await
    }

    pub async fn get_timeout(&mut self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.inner.recv())
            .await
            .ok()
            .flatten()
    }

    /// Everything currently queued, without waiting.
    pub fn drain(&mut self) -> Vec<T> {
        let mut messages = Vec::new();
        while let Ok(message) = self.inner.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Stop accepting new messages; queued ones can still be read.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

/// Runner side of a control channel: emits events, receives commands.
pub struct RunnerEndpoint {
    pub events: ChannelSender<EventMessage>,
    pub commands: ChannelReceiver<CommandMessage>,
}

/// Supervisor side of a control channel.
pub struct SupervisorHandle {
    commands: CommandSender,
    events: ChannelReceiver<EventMessage>,
}

/// Build both ends of a control channel, one bounded queue per direction.
pub fn control_channel(
    capacity: usize,
    put_timeout: Duration,
) -> (RunnerEndpoint, SupervisorHandle) {
    let (event_tx, event_rx) = bounded(capacity, put_timeout);
    let (command_tx, command_rx) = bounded(capacity, put_timeout);
    (
        RunnerEndpoint {
            events: event_tx,
            commands: command_rx,
        },
        SupervisorHandle::from_parts(command_tx, event_rx),
    )
}

impl SupervisorHandle {
    /// Assemble a handle from queues bridged elsewhere, e.g. to a worker process.
    pub fn from_parts(
        commands: ChannelSender<CommandMessage>,
        events: ChannelReceiver<EventMessage>,
    ) -> Self {
        Self {
            commands: CommandSender { inner: commands },
            events,
        }
    }

    pub fn commands(&self) -> &CommandSender {
        &self.commands
    }

    pub fn send(&self, command: Command) -> Result<(), ChannelError> {
        self.commands.send(command)
    }

    pub async fn next_event(&mut self) -> Option<EventMessage> {
        self.events.get().await
    }

    pub fn try_next_event(&mut self) -> Result<Option<EventMessage>, ChannelError> {
        self.events.try_get()
    }

    pub fn into_parts(self) -> (CommandSender, ChannelReceiver<EventMessage>) {
        (self.commands, self.events)
    }
}

/// Cloneable command producer with one helper per command.
#[derive(Clone)]
pub struct CommandSender {
    inner: ChannelSender<CommandMessage>,
}

impl CommandSender {
    pub fn send(&self, command: Command) -> Result<(), ChannelError> {
        self.send_message(CommandMessage::new(command))
    }

    pub fn send_message(&self, message: CommandMessage) -> Result<(), ChannelError> {
        tracing::debug!("Sending command: {}", message.command);
        self.inner.try_put(message)
    }

    pub fn cancel(&self) -> Result<(), ChannelError> {
        self.send(Command::Cancel)
    }

    pub fn pause(&self) -> Result<(), ChannelError> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<(), ChannelError> {
        self.send(Command::Resume)
    }

    pub fn step(&self) -> Result<(), ChannelError> {
        self.send(Command::StepContinue)
    }

    pub fn end(&self) -> Result<(), ChannelError> {
        self.send(Command::End)
    }

    pub fn set_step_mode(&self, enabled: bool) -> Result<(), ChannelError> {
        if enabled {
            self.send(Command::EnableStepMode)
        } else {
            self.send(Command::DisableStepMode)
        }
    }
}
