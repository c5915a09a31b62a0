//! UART-like text channel
//! Binds the Tx/Rx characteristics of the UART service, queues outbound text as
//! MTU-sized chunks, and keeps the console transcript with its commit cursor.

use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{UUID_UART_RX_CHAR, UUID_UART_TX_CHAR};
use crate::core::bluetooth::types::{CharacteristicInfo, WriteMode};
use crate::core::codec::chunk_text;

/// Which end of the UART a characteristic plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartRole {
    /// Outbound, written by us
    Tx,
    /// Inbound, notified by the peripheral
    Rx,
}

impl UartRole {
    pub fn of(characteristic: &CharacteristicInfo) -> Option<Self> {
        match characteristic.uuid {
            UUID_UART_TX_CHAR => Some(UartRole::Tx),
            UUID_UART_RX_CHAR => Some(UartRole::Rx),
            _ => None,
        }
    }
}

/// What to do with the rest of a message when one chunk fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WriteFailurePolicy {
    /// Drop the remaining chunks and report once
    #[default]
    Abort,
    /// Report every failed chunk and keep sending
    Continue,
}

/// Outcome of one completed chunk write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Sent,
    /// Failed; `dropped` queued chunks were discarded
    Failed { dropped: usize },
}

/// UART sub-state of a peripheral session
#[derive(Debug, Default)]
pub struct UartChannel {
    tx: Option<CharacteristicInfo>,
    rx: Option<CharacteristicInfo>,
    write_mode: Option<WriteMode>,
    outbound: VecDeque<Vec<u8>>,
    in_flight: bool,
    pub console: UartConsole,
}

impl UartChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches `characteristic` if it plays a UART role. The write mode is
    /// fixed here from the Tx characteristic's declared capability.
    pub fn bind(&mut self, characteristic: &CharacteristicInfo) -> Option<UartRole> {
        let role = UartRole::of(characteristic)?;
        match role {
            UartRole::Tx => {
                let mode = WriteMode::for_properties(&characteristic.properties);
                debug!("Bound UART Tx {} with {:?}", characteristic.uuid, mode);
                self.write_mode = Some(mode);
                self.tx = Some(characteristic.clone());
            }
            UartRole::Rx => {
                debug!("Bound UART Rx {}", characteristic.uuid);
                self.rx = Some(characteristic.clone());
            }
        }
        Some(role)
    }

    /// Forgets both characteristics and anything still queued
    pub fn unbind(&mut self) {
        self.tx = None;
        self.rx = None;
        self.write_mode = None;
        self.outbound.clear();
        self.in_flight = false;
    }

    pub fn tx(&self) -> Option<&CharacteristicInfo> {
        self.tx.as_ref()
    }

    pub fn rx(&self) -> Option<&CharacteristicInfo> {
        self.rx.as_ref()
    }

    pub fn write_mode(&self) -> Option<WriteMode> {
        self.write_mode
    }

    /// Queues `text` as chunks of at most `chunk_size` bytes. Returns the chunk count.
    pub fn enqueue(&mut self, text: &str, chunk_size: usize) -> usize {
        let chunks = chunk_text(text, chunk_size);
        let count = chunks.len();
        self.outbound.extend(chunks);
        count
    }

    /// Next chunk to write, if none is in flight
    pub fn next_chunk(&mut self) -> Option<Vec<u8>> {
        if self.in_flight {
            return None;
        }
        let chunk = self.outbound.pop_front()?;
        self.in_flight = true;
        Some(chunk)
    }

    /// Records the completion of the in-flight chunk
    pub fn complete_write(&mut self, ok: bool, policy: WriteFailurePolicy) -> WriteOutcome {
        self.in_flight = false;
        if ok {
            return WriteOutcome::Sent;
        }
        match policy {
            WriteFailurePolicy::Abort => {
                let dropped = self.outbound.len();
                self.outbound.clear();
                WriteOutcome::Failed { dropped }
            }
            WriteFailurePolicy::Continue => WriteOutcome::Failed { dropped: 0 },
        }
    }

    pub fn queued(&self) -> usize {
        self.outbound.len()
    }
}

/// Transcript of the UART text area.
/// Text before the cursor has been sent or received and is immutable; text
/// after it is locally typed and not yet sent.
#[derive(Debug, Clone)]
pub struct UartConsole {
    buffer: String,
    cursor: usize,
    /// Show typed text locally; when off every keystroke is sent at once
    pub echo_outgoing: bool,
    /// RETURN sends the pending text
    pub return_sends: bool,
    /// Append "\n" to text sent by RETURN
    pub also_send_return: bool,
}

impl Default for UartConsole {
    fn default() -> Self {
        Self {
            buffer: String::new(),
            cursor: 0,
            echo_outgoing: true,
            return_sends: true,
            also_send_return: false,
        }
    }
}

impl UartConsole {
    /// Handles typed text. Returns text that must be sent now, if any.
    pub fn input(&mut self, text: &str) -> Option<String> {
        if !self.echo_outgoing {
            return (!text.is_empty()).then(|| text.to_string());
        }

        if text == "\n" && self.return_sends {
            let mut outgoing = self.buffer[self.cursor..].to_string();
            self.buffer.push('\n');
            self.cursor = self.buffer.len();
            if self.also_send_return {
                outgoing.push('\n');
            }
            return (!outgoing.is_empty()).then_some(outgoing);
        }

        self.buffer.push_str(text);
        None
    }

    /// Whether [`input`](Self::input) would commit and return text for `text`
    pub fn releases(&self, text: &str) -> bool {
        if !self.echo_outgoing {
            return !text.is_empty();
        }
        text == "\n" && self.return_sends
    }

    /// Commits and returns everything typed since the cursor (the Send button)
    pub fn send_pending(&mut self) -> Option<String> {
        let outgoing = self.buffer[self.cursor..].to_string();
        self.cursor = self.buffer.len();
        (!outgoing.is_empty()).then_some(outgoing)
    }

    /// Appends text from the peripheral; it commits any pending local text too
    pub fn append_received(&mut self, text: &str) {
        self.buffer.push_str(text);
        self.cursor = self.buffer.len();
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    /// False for positions inside already committed text
    pub fn can_edit(&self, position: usize) -> bool {
        position >= self.cursor
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn pending(&self) -> &str {
        &self.buffer[self.cursor..]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Plain-text transcript for export
    pub fn export_text(&self) -> String {
        self.buffer.clone()
    }
}
