//! Discovery coordinator
//! Owns the scan for the whole process, creates one session per new device
//! identity and routes every adapter and timer event to the session it names.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::config::discovery_config::DiscoveryConfig;
use crate::config::session_config::SessionConfig;
use crate::core::bluetooth::adapter::{
    AdapterEvent, CoordinatorEvent, EventReceiver, EventSender, RadioAdapter, TimerEvent,
};
use crate::core::bluetooth::constants::RSSI_UNAVAILABLE;
use crate::core::bluetooth::device::{AdvertisementInfo, DeviceId};
use crate::core::bluetooth::peripheral::{PeripheralSession, SessionContext};
use crate::core::bluetooth::types::{AdapterState, DisplayState};
use crate::core::registry::DeviceRegistry;
use crate::core::scheduler::Scheduler;
use crate::core::ui::{DetailsObserver, UiSink};
use crate::error::{BuddyError, Result};

pub struct DiscoveryCoordinator {
    adapter: Arc<dyn RadioAdapter>,
    registry: DeviceRegistry,
    scheduler: Scheduler,
    ui: UiSink,
    discovery: DiscoveryConfig,
    session: SessionConfig,
    adapter_state: AdapterState,
    scan_requested: bool,
    scanning: bool,
}

impl DiscoveryCoordinator {
    /// `events` is the sending half of the channel the event loop drains
    pub fn new(
        adapter: Arc<dyn RadioAdapter>,
        events: EventSender,
        ui: UiSink,
        config: &AppConfig,
    ) -> Self {
        Self {
            adapter,
            registry: DeviceRegistry::new(),
            scheduler: Scheduler::new(events),
            ui,
            discovery: config.discovery.clone(),
            session: config.session.clone(),
            adapter_state: AdapterState::Unknown,
            scan_requested: false,
            scanning: false,
        }
    }

    pub fn adapter_state(&self) -> AdapterState {
        self.adapter_state
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Begins scanning for every advertisement, duplicates included.
    /// While the adapter state is still unknown the scan is deferred until it
    /// reports powered on.
    pub fn start(&mut self) -> Result<()> {
        self.scan_requested = true;
        match self.adapter_state {
            AdapterState::PoweredOn => {
                self.start_scan();
                Ok(())
            }
            AdapterState::Unknown => {
                debug!("Adapter state unknown, scan deferred until it powers on");
                Ok(())
            }
            state => {
                let err = BuddyError::AdapterUnavailable(state);
                self.ui.notice(&err);
                Err(err)
            }
        }
    }

    fn start_scan(&mut self) {
        if self.scanning {
            return;
        }
        info!("Scanning for all peripherals");
        self.adapter.start_scan();
        self.scanning = true;
    }

    pub fn stop(&mut self) {
        self.scan_requested = false;
        if self.scanning {
            self.adapter.stop_scan();
            self.scanning = false;
        }
    }

    /// Applies one event. Must run on the coordinator's context.
    pub fn handle_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Adapter(event) => self.handle_adapter_event(event),
            CoordinatorEvent::Timer(event) => self.handle_timer_event(event),
        }
    }

    fn handle_adapter_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::StateChanged(state) => self.on_state_changed(state),
            AdapterEvent::Advertisement {
                id,
                name,
                advertisement,
                rssi,
            } => self.on_advertisement(id, name, advertisement, rssi),
            AdapterEvent::Connected { id } => {
                self.route(&id, |session, ctx| session.on_connected(ctx));
            }
            AdapterEvent::ConnectFailed { id, reason } => {
                self.route(&id, |session, ctx| session.on_connect_failed(reason, ctx));
            }
            AdapterEvent::Disconnected { id, reason } => {
                self.route(&id, |session, ctx| session.on_disconnected(reason, ctx));
            }
            AdapterEvent::ServicesDiscovered { id, result } => {
                self.route(&id, |session, ctx| {
                    session.on_services_discovered(result, ctx)
                });
            }
            AdapterEvent::CharacteristicsDiscovered {
                id,
                service,
                result,
            } => {
                self.route(&id, |session, ctx| {
                    session.on_characteristics_discovered(&service, result, ctx)
                });
            }
            AdapterEvent::ValueUpdated {
                id,
                characteristic,
                result,
            } => {
                self.route(&id, |session, ctx| {
                    session.on_value_updated(&characteristic, result, ctx)
                });
            }
            AdapterEvent::WriteCompleted { id, result, .. } => {
                self.route(&id, |session, ctx| session.on_write_completed(result, ctx));
            }
        }
    }

    fn handle_timer_event(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::ConnectDue(id) => {
                self.route(&id, |session, ctx| session.begin_traversal(ctx));
            }
            TimerEvent::LivenessExpired { id, generation } => {
                self.route(&id, |session, ctx| {
                    session.on_liveness_expired(generation, ctx)
                });
            }
            TimerEvent::OperationTimedOut { id, step } => {
                self.route(&id, |session, ctx| session.on_operation_timed_out(step, ctx));
            }
        }
    }

    /// Runs `f` against the session for `id`. Events for identities dropped by
    /// a reset are discarded.
    fn route<R>(
        &mut self,
        id: &DeviceId,
        f: impl FnOnce(&mut PeripheralSession, &SessionContext<'_>) -> R,
    ) -> Option<R> {
        let ctx = SessionContext {
            adapter: self.adapter.as_ref(),
            scheduler: &self.scheduler,
            ui: &self.ui,
            config: &self.session,
        };
        match self.registry.get_mut(id) {
            Some(session) => Some(f(session, &ctx)),
            None => {
                debug!("Dropping event for unregistered device {}", id);
                None
            }
        }
    }

    fn with_session<R>(
        &mut self,
        id: &DeviceId,
        f: impl FnOnce(&mut PeripheralSession, &SessionContext<'_>) -> R,
    ) -> Result<R> {
        self.route(id, f)
            .ok_or_else(|| BuddyError::UnknownDevice(id.clone()))
    }

    fn on_state_changed(&mut self, state: AdapterState) {
        if state == self.adapter_state {
            return;
        }
        info!("Adapter state {:?} -> {:?}", self.adapter_state, state);
        self.adapter_state = state;

        match state {
            AdapterState::PoweredOn => {
                if self.scan_requested {
                    self.start_scan();
                }
            }
            AdapterState::Unknown => {}
            state => {
                // the platform stops scans on its own when the radio goes away
                self.scanning = false;
                self.ui.notice(&BuddyError::AdapterUnavailable(state));
            }
        }
    }

    /// Creates a session on first sighting and schedules its first connection;
    /// later sightings only refresh the advertisement and liveness.
    fn on_advertisement(
        &mut self,
        id: DeviceId,
        name: Option<String>,
        advertisement: AdvertisementInfo,
        rssi: i16,
    ) {
        let ctx = SessionContext {
            adapter: self.adapter.as_ref(),
            scheduler: &self.scheduler,
            ui: &self.ui,
            config: &self.session,
        };

        if let Some(session) = self.registry.get_mut(&id) {
            session.record_advertisement(name, advertisement, rssi, &ctx);
            self.ui.refresh();
            return;
        }

        info!(
            "Discovered {} ({}) at {} dBm",
            id,
            name.as_deref().unwrap_or("unnamed"),
            rssi
        );
        let mut session = PeripheralSession::new(
            id.clone(),
            None,
            AdvertisementInfo::default(),
            RSSI_UNAVAILABLE,
            &self.session,
        );
        session.record_advertisement(name, advertisement, rssi, &ctx);
        session.set_pending_connect(
            self.scheduler
                .schedule(self.discovery.connect_delay(), TimerEvent::ConnectDue(id)),
        );
        self.registry.insert(session);
        self.ui.refresh();
    }

    /// Forgets every device. The scan keeps running, so devices still in
    /// range come back as new records.
    pub fn reset(&mut self) {
        info!("Resetting discovery, dropping {} devices", self.registry.len());
        let ctx = SessionContext {
            adapter: self.adapter.as_ref(),
            scheduler: &self.scheduler,
            ui: &self.ui,
            config: &self.session,
        };
        for mut session in self.registry.clear() {
            session.teardown(&ctx);
        }
        self.ui.refresh();
    }

    // ---- presentation commands ----

    pub fn device_list(&self) -> Vec<DisplayState> {
        self.registry.iter().map(PeripheralSession::display_state).collect()
    }

    pub fn display_state(&self, id: &DeviceId) -> Result<DisplayState> {
        self.registry
            .get(id)
            .map(PeripheralSession::display_state)
            .ok_or_else(|| BuddyError::UnknownDevice(id.clone()))
    }

    pub fn supports(&self, id: &DeviceId, service: &Uuid) -> Result<bool> {
        self.registry
            .get(id)
            .map(|session| session.supports(service))
            .ok_or_else(|| BuddyError::UnknownDevice(id.clone()))
    }

    pub fn open_details(
        &mut self,
        id: &DeviceId,
        observer: &Arc<dyn DetailsObserver>,
    ) -> Result<()> {
        self.with_session(id, |session, ctx| session.open_details(observer, ctx))
    }

    pub fn close_details(&mut self, id: &DeviceId) -> Result<()> {
        self.with_session(id, |session, ctx| session.close_details(ctx))
    }

    pub fn send_text(&mut self, id: &DeviceId, text: &str) -> Result<()> {
        self.with_session(id, |session, ctx| session.send_text(text, ctx))?
    }

    /// Feeds typed text through the console model and sends whatever it
    /// releases. Text is only committed when it can actually go out.
    pub fn console_input(&mut self, id: &DeviceId, text: &str) -> Result<()> {
        self.with_session(id, |session, ctx| {
            let id = session.id().clone();
            let can_send = session.can_send();
            let console = &mut session
                .uart_mut()
                .ok_or_else(|| BuddyError::UartUnavailable(id.clone()))?
                .console;
            if !can_send && console.releases(text) {
                return Err(BuddyError::UartUnavailable(id));
            }
            let outgoing = console.input(text);
            match outgoing {
                Some(outgoing) => session.send_text(&outgoing, ctx),
                None => Ok(()),
            }
        })?
    }

    /// The Send button: commits and sends everything typed since the cursor
    pub fn console_send(&mut self, id: &DeviceId) -> Result<()> {
        self.with_session(id, |session, ctx| {
            let id = session.id().clone();
            if !session.can_send() {
                return Err(BuddyError::UartUnavailable(id));
            }
            let outgoing = session
                .uart_mut()
                .ok_or(BuddyError::UartUnavailable(id))?
                .console
                .send_pending();
            match outgoing {
                Some(outgoing) => session.send_text(&outgoing, ctx),
                None => Ok(()),
            }
        })?
    }

    pub fn set_receive_enabled(&mut self, id: &DeviceId, enabled: bool) -> Result<()> {
        self.with_session(id, |session, ctx| session.set_receive_enabled(enabled, ctx))
    }

    pub fn export_uart_text(&self, id: &DeviceId) -> Result<String> {
        let session = self
            .registry
            .get(id)
            .ok_or_else(|| BuddyError::UnknownDevice(id.clone()))?;
        session
            .uart()
            .map(|uart| uart.console.export_text())
            .ok_or_else(|| BuddyError::UartUnavailable(id.clone()))
    }
}

/// Drains adapter and timer events into the coordinator until cancelled.
/// Each event is applied while holding the coordinator lock, which serialises
/// it with presentation commands.
pub async fn run_event_loop(
    coordinator: Arc<Mutex<DiscoveryCoordinator>>,
    mut events: EventReceiver,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => coordinator.lock().await.handle_event(event),
                    None => {
                        warn!("Event channel closed");
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("Coordinator event loop cancelled");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::fake::{AdapterRequest, RecordingAdapter};
    use crate::core::ui::UiEvent;
    use tokio::sync::mpsc;

    struct Fixture {
        adapter: Arc<RecordingAdapter>,
        coordinator: DiscoveryCoordinator,
        ui: mpsc::UnboundedReceiver<UiEvent>,
        _events: EventReceiver,
    }

    fn fixture() -> Fixture {
        let adapter = Arc::new(RecordingAdapter::new());
        let (tx, events) = mpsc::unbounded_channel();
        let (ui_tx, ui) = mpsc::unbounded_channel();
        let coordinator =
            DiscoveryCoordinator::new(adapter.clone(), tx, UiSink::new(ui_tx), &AppConfig::default());
        Fixture {
            adapter,
            coordinator,
            ui,
            _events: events,
        }
    }

    fn notices(ui: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<String> {
        let mut titles = Vec::new();
        while let Ok(event) = ui.try_recv() {
            if let UiEvent::Notice(notice) = event {
                titles.push(notice.title);
            }
        }
        titles
    }

    fn advertise(id: &str, rssi: i16) -> CoordinatorEvent {
        AdapterEvent::Advertisement {
            id: DeviceId::from(id),
            name: None,
            advertisement: AdvertisementInfo::default(),
            rssi,
        }
        .into()
    }

    #[tokio::test]
    async fn scan_waits_for_powered_on() {
        let mut f = fixture();
        f.coordinator.start().unwrap();
        assert!(f.adapter.requests().is_empty());

        f.coordinator
            .handle_event(AdapterEvent::StateChanged(AdapterState::PoweredOn).into());
        assert_eq!(f.adapter.requests(), vec![AdapterRequest::StartScan]);
        assert!(f.coordinator.is_scanning());
    }

    #[tokio::test]
    async fn unusable_adapter_is_reported_once_and_not_retried() {
        let mut f = fixture();
        f.coordinator
            .handle_event(AdapterEvent::StateChanged(AdapterState::PoweredOff).into());
        assert_eq!(
            f.coordinator.start(),
            Err(BuddyError::AdapterUnavailable(AdapterState::PoweredOff))
        );
        assert_eq!(notices(&mut f.ui).len(), 2);

        f.coordinator
            .handle_event(AdapterEvent::StateChanged(AdapterState::Resetting).into());
        f.coordinator
            .handle_event(AdapterEvent::StateChanged(AdapterState::Resetting).into());
        assert_eq!(notices(&mut f.ui), vec!["Bluetooth snag".to_string()]);
        assert!(f.adapter.requests().is_empty());

        f.coordinator
            .handle_event(AdapterEvent::StateChanged(AdapterState::PoweredOn).into());
        assert_eq!(f.adapter.requests(), vec![AdapterRequest::StartScan]);
    }

    #[tokio::test]
    async fn repeated_advertisements_keep_one_record() {
        let mut f = fixture();
        f.coordinator.handle_event(advertise("a", -70));
        f.coordinator.handle_event(advertise("a", -40));
        f.coordinator.handle_event(advertise("b", -80));

        let list = f.coordinator.device_list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].rssi, Some(-40));
        assert!(list.iter().all(|d| d.disabled && d.gatt_lines.len() == 1));
    }

    #[tokio::test]
    async fn reset_clears_registry_but_keeps_scanning() {
        let mut f = fixture();
        f.coordinator
            .handle_event(AdapterEvent::StateChanged(AdapterState::PoweredOn).into());
        f.coordinator.start().unwrap();
        f.coordinator.handle_event(advertise("a", -70));
        f.coordinator.reset();

        assert!(f.coordinator.registry().is_empty());
        assert!(f.coordinator.is_scanning());
        assert!(!f.adapter.requests().contains(&AdapterRequest::StopScan));

        // events for forgotten devices are dropped
        f.coordinator.handle_event(
            AdapterEvent::Connected {
                id: DeviceId::from("a"),
            }
            .into(),
        );
        assert!(f.coordinator.registry().is_empty());
    }

    #[tokio::test]
    async fn commands_on_unknown_device_fail() {
        let mut f = fixture();
        let id = DeviceId::from("ghost");
        assert_eq!(
            f.coordinator.display_state(&id),
            Err(BuddyError::UnknownDevice(id.clone()))
        );
        assert_eq!(
            f.coordinator.send_text(&id, "hi"),
            Err(BuddyError::UnknownDevice(id.clone()))
        );
    }

    #[tokio::test]
    async fn connect_failure_is_surfaced_and_record_stays_disabled() {
        let mut f = fixture();
        f.coordinator.handle_event(advertise("a", -70));
        f.coordinator
            .handle_event(TimerEvent::ConnectDue(DeviceId::from("a")).into());
        f.coordinator.handle_event(
            AdapterEvent::ConnectFailed {
                id: DeviceId::from("a"),
                reason: "refused".into(),
            }
            .into(),
        );
        assert_eq!(notices(&mut f.ui), vec!["Failed to connect".to_string()]);
        assert!(f.coordinator.device_list()[0].disabled);
    }

    #[tokio::test]
    async fn receive_toggle_on_a_plain_device_leaves_it_without_uart() {
        let mut f = fixture();
        let id = DeviceId::from("a");
        f.coordinator.handle_event(advertise("a", -70));
        f.coordinator.set_receive_enabled(&id, false).unwrap();
        assert_eq!(
            f.coordinator.export_uart_text(&id),
            Err(BuddyError::UartUnavailable(id.clone()))
        );
        assert_eq!(
            f.coordinator.console_input(&id, "hi"),
            Err(BuddyError::UartUnavailable(id.clone()))
        );
        assert!(f.adapter.requests().is_empty());
    }
}
