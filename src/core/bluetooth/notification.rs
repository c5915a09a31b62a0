//! Notification handling
//! One task per subscribed characteristic forwards every value as an adapter
//! event until it is unsubscribed or the stream ends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bluest::{Characteristic, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::adapter::{AdapterEvent, EventSender};
use crate::core::bluetooth::connection::CharacteristicKey;
use crate::core::bluetooth::device::DeviceId;
use crate::core::bluetooth::types::CharacteristicInfo;

#[derive(Clone)]
pub struct NotificationHandler {
    events: EventSender,
    subscriptions: Arc<Mutex<HashMap<CharacteristicKey, CancellationToken>>>,
}

impl NotificationHandler {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<CharacteristicKey, CancellationToken>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts forwarding notifications. Subscribing twice is a no-op.
    pub fn subscribe(
        &self,
        key: CharacteristicKey,
        info: CharacteristicInfo,
        device: Device,
        characteristic: Characteristic,
    ) {
        let cancel_token = {
            let mut subscriptions = self.subscriptions();
            if subscriptions.contains_key(&key) {
                debug!("Already subscribed to {}", info.uuid);
                return;
            }
            let token = CancellationToken::new();
            subscriptions.insert(key.clone(), token.clone());
            token
        };

        let handler = self.clone();
        tokio::spawn(async move {
            let id = key.0.clone();
            let cancelled = handler
                .process_notifications(id.clone(), info, characteristic, cancel_token)
                .await;
            if cancelled {
                return;
            }
            // the first stream to notice a dropped link reports it for the device
            let released = handler.subscriptions().remove(&key).is_some();
            if released && !device.is_connected().await {
                handler.unsubscribe_device(&id);
                let event = AdapterEvent::Disconnected {
                    id,
                    reason: Some("The connection was lost.".to_string()),
                };
                let _ = handler.events.send(event.into());
            }
        });
    }

    pub fn unsubscribe(&self, key: &CharacteristicKey) {
        if let Some(token) = self.subscriptions().remove(key) {
            token.cancel();
        }
    }

    /// Cancels every subscription of `id`
    pub fn unsubscribe_device(&self, id: &DeviceId) {
        self.subscriptions().retain(|(device, _, _), token| {
            if device == id {
                token.cancel();
                false
            } else {
                true
            }
        });
    }

    pub fn unsubscribe_all(&self) {
        for (_, token) in self.subscriptions().drain() {
            token.cancel();
        }
    }

    /// Returns true when stopped by cancellation rather than by the stream ending
    async fn process_notifications(
        &self,
        id: DeviceId,
        info: CharacteristicInfo,
        characteristic: Characteristic,
        cancel_token: CancellationToken,
    ) -> bool {
        info!("Listening for notifications on {} of {}", info.uuid, id);

        let mut notification_stream = match characteristic.notify().await {
            Ok(stream) => stream,
            Err(e) => {
                // reads still deliver the value; a refused subscription is not fatal
                error!("Failed to subscribe to {} on {}: {}", info.uuid, id, e);
                return false;
            }
        };

        loop {
            tokio::select! {
                result = notification_stream.next() => {
                    match result {
                        Some(Ok(value)) => {
                            debug!("Notification from {} {}: {:02x?}", id, info.uuid, value);
                            let event = AdapterEvent::ValueUpdated {
                                id: id.clone(),
                                characteristic: info.clone(),
                                result: Ok(value),
                            };
                            if self.events.send(event.into()).is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            error!("Error in notification stream: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
                _ = cancel_token.cancelled() => {
                    debug!("Notifications on {} of {} cancelled", info.uuid, id);
                    return true;
                }
            }
        }

        info!("Notification stream for {} of {} ended", info.uuid, id);
        false
    }
}
