//! Presentation boundary
//! Events pushed to whatever renders the device list and detail views.

use std::sync::Weak;

use log::{error, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::bluetooth::{DeviceId, DisplayState};
use crate::error::{BuddyError, Notice};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UiEvent {
    /// Some record changed; re-read the device list
    Refresh,
    Notice(Notice),
    TextReceived { id: DeviceId, text: String },
}

/// A detail view attached to one record. The record only keeps a weak
/// reference; the view owns its own lifetime.
pub trait DetailsObserver: Send + Sync {
    fn refresh(&self, state: &DisplayState);
    fn text_received(&self, text: &str);
}

pub type DetailsSlot = Option<Weak<dyn DetailsObserver>>;

/// Sending half of the presentation channel
#[derive(Clone, Default)]
pub struct UiSink {
    tx: Option<mpsc::UnboundedSender<UiEvent>>,
}

impl UiSink {
    pub fn new(tx: mpsc::UnboundedSender<UiEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn refresh(&self) {
        self.emit(UiEvent::Refresh);
    }

    /// Logs `err` and surfaces it as a dismissable notice
    pub fn notice(&self, err: &BuddyError) {
        warn!("{}", err);
        self.emit(UiEvent::Notice(Notice::from(err)));
    }

    pub fn text_received(&self, id: &DeviceId, text: &str) {
        self.emit(UiEvent::TextReceived {
            id: id.clone(),
            text: text.to_string(),
        });
    }

    fn emit(&self, event: UiEvent) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.send(event) {
                error!("Failed to emit UI event: {}", e);
            }
        }
    }
}
