//! Application state management
//! Owns the coordinator, its event loop task and the platform adapter.

use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::bluetooth::adapter::{EventReceiver, EventSender, RadioAdapter};
use crate::core::bluetooth::BluestAdapter;
use crate::core::{run_event_loop, DiscoveryCoordinator, UiSink};

/// Global application state
pub struct AppState {
    /// The coordinator; holding its lock is the only way to touch sessions
    pub coordinator: Arc<Mutex<DiscoveryCoordinator>>,
    pub config: AppConfig,
    platform: Option<Arc<BluestAdapter>>,
    cancel_token: CancellationToken,
    event_loop: JoinHandle<()>,
}

impl AppState {
    /// Acquires the system Bluetooth adapter and starts discovery
    pub async fn new(config: AppConfig, ui: UiSink) -> Result<Self> {
        let (events, receiver) = mpsc::unbounded_channel();
        info!("Initializing Bluetooth adapter...");
        let platform = Arc::new(BluestAdapter::new(events.clone()).await?);
        let mut state = Self::with_adapter(platform.clone(), events, receiver, ui, config);
        state.platform = Some(platform);
        Ok(state)
    }

    /// Wires a coordinator to any radio adapter and spawns its event loop.
    /// `events` must be the sender the adapter posts to.
    pub fn with_adapter(
        adapter: Arc<dyn RadioAdapter>,
        events: EventSender,
        receiver: EventReceiver,
        ui: UiSink,
        config: AppConfig,
    ) -> Self {
        let coordinator = Arc::new(Mutex::new(DiscoveryCoordinator::new(
            adapter, events, ui, &config,
        )));
        let cancel_token = CancellationToken::new();
        let event_loop = tokio::spawn(run_event_loop(
            coordinator.clone(),
            receiver,
            cancel_token.clone(),
        ));

        Self {
            coordinator,
            config,
            platform: None,
            cancel_token,
            event_loop,
        }
    }

    /// Stops scanning and the event loop, then releases the adapter
    pub async fn shutdown(self) {
        self.coordinator.lock().await.stop();
        self.cancel_token.cancel();
        if let Err(e) = self.event_loop.await {
            log::error!("Event loop ended abnormally: {}", e);
        }
        if let Some(platform) = &self.platform {
            platform.shutdown();
        }
        info!("Application state shut down.");
    }
}
