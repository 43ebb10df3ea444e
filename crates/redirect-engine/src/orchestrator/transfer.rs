//! Outbound call-transfer hand-off

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::types::CallTransferCommand;
use crate::error::{RedirectError, Result};

/// Receiver of transfer commands, usually the telephony layer
#[async_trait]
pub trait CallTransferSink: Send + Sync {
    async fn transfer(&self, command: CallTransferCommand) -> Result<()>;
}

/// Forwards commands over a bounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelTransferSink {
    tx: mpsc::Sender<CallTransferCommand>,
}

impl ChannelTransferSink {
    /// Sink plus the receiving end for the telephony task
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CallTransferCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CallTransferSink for ChannelTransferSink {
    async fn transfer(&self, command: CallTransferCommand) -> Result<()> {
        debug!(
            ticket = %command.ticket_id,
            to = %command.to_username,
            "📞 sending transfer command"
        );
        self.tx
            .send(command)
            .await
            .map_err(|e| RedirectError::transfer(format!("call layer is gone: {}", e)))
    }
}

/// Keeps every command it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingTransferSink {
    commands: Arc<Mutex<Vec<CallTransferCommand>>>,
}

impl RecordingTransferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<CallTransferCommand> {
        self.commands.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }
}

#[async_trait]
impl CallTransferSink for RecordingTransferSink {
    async fn transfer(&self, command: CallTransferCommand) -> Result<()> {
        self.commands.lock().push(command);
        Ok(())
    }
}
