//! Peripheral session
//!
//! One per device identity. Tracks advertisements and liveness, walks the full
//! GATT tree once (connect, discover every service, discover every
//! characteristic, read every readable one), then disconnects so the device
//! resumes advertising. Devices exposing the UART service can later be
//! reconnected for a bidirectional text channel.
//!
//! All methods run on the coordinator's context. Radio requests go out through
//! [`RadioAdapter`] and their answers come back as adapter events; nothing here
//! blocks or awaits.

use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::config::session_config::SessionConfig;
use crate::core::bluetooth::adapter::{RadioAdapter, TimerEvent};
use crate::core::bluetooth::constants::{
    RSSI_UNAVAILABLE, SIGNAL_BAR_THRESHOLDS, UUID_UART_SERVICE,
};
use crate::core::bluetooth::device::{AdvertisementInfo, DeviceId};
use crate::core::bluetooth::liveness::LivenessTimer;
use crate::core::bluetooth::names::uuid_name;
use crate::core::bluetooth::types::{
    CharacteristicInfo, CharacteristicValue, ConnectionState, DisplayState, GattNode,
    ServiceInfo,
};
use crate::core::bluetooth::uart::{UartChannel, UartRole, WriteOutcome};
use crate::core::codec::render_btle_text;
use crate::core::scheduler::{next_stamp, Scheduler, TimerHandle};
use crate::core::ui::{DetailsObserver, DetailsSlot, UiSink};
use crate::error::{BuddyError, Result};

const ACQUIRING_PLACEHOLDER: &str = "Acquiring Device Information Status";

/// Collaborators a session needs while handling one event
pub struct SessionContext<'a> {
    pub adapter: &'a dyn RadioAdapter,
    pub scheduler: &'a Scheduler,
    pub ui: &'a UiSink,
    pub config: &'a SessionConfig,
}

/// Where the session is in its connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Idle,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    ReadingCharacteristic,
    Disconnecting,
    TraversalComplete,
    UartConnecting,
    UartDiscovering,
    UartReady,
    /// The UART link is being torn down; it is not re-established on its own
    UartClosing,
}

impl SessionPhase {
    fn is_link_up(&self) -> bool {
        matches!(
            self,
            SessionPhase::DiscoveringServices
                | SessionPhase::DiscoveringCharacteristics
                | SessionPhase::ReadingCharacteristic
                | SessionPhase::UartDiscovering
                | SessionPhase::UartReady
        )
    }

    fn is_traversing(&self) -> bool {
        matches!(
            self,
            SessionPhase::Connecting
                | SessionPhase::DiscoveringServices
                | SessionPhase::DiscoveringCharacteristics
                | SessionPhase::ReadingCharacteristic
        )
    }

    fn is_uart(&self) -> bool {
        matches!(
            self,
            SessionPhase::UartConnecting
                | SessionPhase::UartDiscovering
                | SessionPhase::UartReady
                | SessionPhase::UartClosing
        )
    }
}

/// Position of an active traversal. Snapshots are taken from the discovery
/// results in case the platform reorders them later.
#[derive(Debug)]
struct TraversalCursor {
    services: Vec<ServiceInfo>,
    service_idx: usize,
    characteristics: Vec<CharacteristicInfo>,
    char_idx: usize,
}

pub struct PeripheralSession {
    id: DeviceId,
    name: Option<String>,
    advertisement: AdvertisementInfo,
    rssi: i16,
    disabled: bool,
    phase: SessionPhase,
    nodes: Vec<GattNode>,
    traversal_complete: bool,
    cursor: Option<TraversalCursor>,
    /// Characteristic whose value the traversal is waiting for
    awaiting: Option<CharacteristicInfo>,
    acquisitions: usize,
    uart: Option<UartChannel>,
    /// The last UART link attempt could not find the service; cleared when a
    /// detail view is opened again
    uart_failed: bool,
    /// Receive toggle of the detail view, applied whenever Rx is bound
    receive_enabled: bool,
    details: DetailsSlot,
    liveness: LivenessTimer,
    pending_connect: Option<TimerHandle>,
    step: u64,
    watchdog: Option<TimerHandle>,
}

impl PeripheralSession {
    /// A freshly sighted device. Starts disabled: nothing is known about it yet.
    pub fn new(
        id: DeviceId,
        name: Option<String>,
        advertisement: AdvertisementInfo,
        rssi: i16,
        config: &SessionConfig,
    ) -> Self {
        Self {
            id,
            name,
            advertisement,
            rssi,
            disabled: true,
            phase: SessionPhase::Idle,
            nodes: Vec::new(),
            traversal_complete: false,
            cursor: None,
            awaiting: None,
            acquisitions: 0,
            uart: None,
            uart_failed: false,
            receive_enabled: true,
            details: None,
            liveness: LivenessTimer::new(config.liveness_timeout()),
            pending_connect: None,
            step: 0,
            watchdog: None,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn rssi(&self) -> i16 {
        self.rssi
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn nodes(&self) -> &[GattNode] {
        &self.nodes
    }

    pub fn is_traversal_complete(&self) -> bool {
        self.traversal_complete
    }

    /// Number of characteristic value acquisitions started by the traversal
    pub fn acquisition_count(&self) -> usize {
        self.acquisitions
    }

    pub fn uart(&self) -> Option<&UartChannel> {
        self.uart.as_ref()
    }

    pub fn uart_mut(&mut self) -> Option<&mut UartChannel> {
        self.uart.as_mut()
    }

    pub fn advertisement(&self) -> &AdvertisementInfo {
        &self.advertisement
    }

    pub fn liveness_armed(&self) -> bool {
        self.liveness.is_armed()
    }

    /// True iff a service node with this UUID has been recorded so far
    pub fn supports(&self, service: &Uuid) -> bool {
        self.nodes
            .iter()
            .any(|node| matches!(node, GattNode::Service(s) if s.uuid == *service))
    }

    // ---- advertisement and liveness ----

    /// Records a fresh advertisement. Postcondition: unless `rssi` is the
    /// unavailable sentinel, the liveness timer is re-armed.
    pub fn record_advertisement(
        &mut self,
        name: Option<String>,
        advertisement: AdvertisementInfo,
        rssi: i16,
        ctx: &SessionContext<'_>,
    ) {
        if name.is_some() {
            self.name = name;
        }
        self.advertisement = advertisement;
        self.rssi = rssi;
        if rssi != RSSI_UNAVAILABLE {
            self.rearm_liveness(ctx);
        }
    }

    /// Re-arms the countdown. A traversed device becomes selectable again.
    fn rearm_liveness(&mut self, ctx: &SessionContext<'_>) {
        self.liveness.rearm(&self.id, ctx.scheduler);
        if self.traversal_complete {
            self.disabled = false;
        }
    }

    /// Liveness window elapsed with no advertisement
    pub fn on_liveness_expired(&mut self, generation: u64, ctx: &SessionContext<'_>) {
        if !self.liveness.expire(generation) {
            debug!("Ignoring stale liveness firing for {}", self.id);
            return;
        }
        info!("{} stopped advertising, disabling", self.id);
        self.disabled = true;
        self.rssi = RSSI_UNAVAILABLE;
        ctx.ui.refresh();
    }

    // ---- connection ----

    /// Keeps the deferred first-connection timer alive with the session
    pub fn set_pending_connect(&mut self, handle: TimerHandle) {
        self.pending_connect = Some(handle);
    }

    /// Starts the traversal by connecting. Only from `Idle`.
    pub fn begin_traversal(&mut self, ctx: &SessionContext<'_>) {
        self.pending_connect = None;
        if self.phase != SessionPhase::Idle || self.traversal_complete {
            debug!("{} not idle ({:?}), skipping traversal", self.id, self.phase);
            return;
        }
        info!("Connecting to {} to read its GATT tree", self.id);
        self.phase = SessionPhase::Connecting;
        self.issue_step(ctx);
        ctx.adapter.connect(&self.id);
        ctx.ui.refresh();
    }

    pub fn on_connected(&mut self, ctx: &SessionContext<'_>) {
        match self.phase {
            SessionPhase::Connecting => {
                debug!("Connected to {}, discovering all services", self.id);
                self.phase = SessionPhase::DiscoveringServices;
            }
            SessionPhase::UartConnecting => {
                debug!("Connected to {}, looking for the UART service", self.id);
                self.phase = SessionPhase::UartDiscovering;
            }
            other => {
                debug!("Unexpected connect for {} in {:?}", self.id, other);
                return;
            }
        }
        self.issue_step(ctx);
        ctx.adapter.discover_services(&self.id);
        ctx.ui.refresh();
    }

    pub fn on_connect_failed(&mut self, reason: String, ctx: &SessionContext<'_>) {
        if !matches!(
            self.phase,
            SessionPhase::Connecting | SessionPhase::UartConnecting
        ) {
            debug!("Ignoring connect failure for {} in {:?}", self.id, self.phase);
            return;
        }
        self.watchdog = None;
        self.fall_back_to_rest();
        ctx.ui.notice(&BuddyError::ConnectFailed {
            id: self.id.clone(),
            reason,
        });
        ctx.ui.refresh();
    }

    /// Handles a link drop. Only a drop carrying a reason is surfaced, and
    /// never the one the traversal asked for itself.
    pub fn on_disconnected(&mut self, reason: Option<String>, ctx: &SessionContext<'_>) {
        let was = self.phase;
        self.watchdog = None;
        self.awaiting = None;

        match was {
            SessionPhase::Disconnecting => {
                debug!("{} disconnected as requested", self.id);
                if let Some(uart) = self.uart.as_mut() {
                    uart.unbind();
                }
                self.fall_back_to_rest();
                if self.wants_uart_link() {
                    self.begin_uart_link(ctx);
                }
            }
            SessionPhase::UartClosing => {
                debug!("UART link to {} closed as requested", self.id);
                if let Some(uart) = self.uart.as_mut() {
                    uart.unbind();
                }
                self.fall_back_to_rest();
                // a view reopened while the old link was closing
                if self.wants_uart_link() {
                    self.begin_uart_link(ctx);
                }
            }
            phase if phase.is_uart() => {
                info!("UART link to {} closed", self.id);
                if let Some(uart) = self.uart.as_mut() {
                    uart.unbind();
                }
                self.disabled = true;
                self.fall_back_to_rest();
                self.surface_disconnect(reason, ctx);
            }
            phase if phase.is_traversing() => {
                warn!("{} disconnected mid-traversal, abandoning it", self.id);
                self.cursor = None;
                self.fall_back_to_rest();
                self.surface_disconnect(reason, ctx);
            }
            _ => debug!("{} already at rest, ignoring disconnect {:?}", self.id, reason),
        }
        ctx.ui.refresh();
    }

    fn wants_uart_link(&self) -> bool {
        self.details_open() && !self.uart_failed && self.supports(&UUID_UART_SERVICE)
    }

    fn surface_disconnect(&self, reason: Option<String>, ctx: &SessionContext<'_>) {
        if let Some(reason) = reason {
            ctx.ui.notice(&BuddyError::Disconnected {
                id: self.id.clone(),
                reason,
            });
        }
    }

    /// Resting phase once no link is up
    fn fall_back_to_rest(&mut self) {
        self.phase = if self.traversal_complete {
            SessionPhase::TraversalComplete
        } else {
            SessionPhase::Idle
        };
    }

    // ---- traversal ----

    pub fn on_services_discovered(
        &mut self,
        result: std::result::Result<Vec<ServiceInfo>, String>,
        ctx: &SessionContext<'_>,
    ) {
        match self.phase {
            SessionPhase::DiscoveringServices => {}
            SessionPhase::UartDiscovering => return self.on_uart_services(result, ctx),
            other => {
                debug!("Ignoring late service list for {} in {:?}", self.id, other);
                return;
            }
        }
        self.watchdog = None;

        let services = result.unwrap_or_else(|reason| {
            warn!(
                "{}",
                BuddyError::DiscoveryFailed {
                    id: self.id.clone(),
                    reason
                }
            );
            Vec::new()
        });
        debug!("{} offers {} services", self.id, services.len());

        if services.is_empty() {
            self.finish_traversal(ctx);
            return;
        }
        self.cursor = Some(TraversalCursor {
            services,
            service_idx: 0,
            characteristics: Vec::new(),
            char_idx: 0,
        });
        self.discover_current_service(ctx);
    }

    /// Records the cursor's service and asks for all of its characteristics
    fn discover_current_service(&mut self, ctx: &SessionContext<'_>) {
        let Some(cursor) = self.cursor.as_ref() else {
            return;
        };
        let service = cursor.services[cursor.service_idx].clone();
        debug!("Discovered service {} on {}", uuid_name(&service.uuid), self.id);

        self.nodes.push(GattNode::Service(service.clone()));
        if service.uuid == UUID_UART_SERVICE && self.uart.is_none() {
            self.uart = Some(UartChannel::new());
        }

        self.phase = SessionPhase::DiscoveringCharacteristics;
        self.issue_step(ctx);
        ctx.adapter.discover_characteristics(&self.id, &service);
        ctx.ui.refresh();
    }

    pub fn on_characteristics_discovered(
        &mut self,
        service: &ServiceInfo,
        result: std::result::Result<Vec<CharacteristicInfo>, String>,
        ctx: &SessionContext<'_>,
    ) {
        if self.phase == SessionPhase::UartDiscovering {
            return self.on_uart_characteristics(result, ctx);
        }
        let current = self
            .cursor
            .as_ref()
            .map(|c| c.services[c.service_idx].uuid);
        if self.phase != SessionPhase::DiscoveringCharacteristics || current != Some(service.uuid) {
            debug!(
                "Ignoring late characteristics of {} for {} in {:?}",
                service.uuid, self.id, self.phase
            );
            return;
        }
        self.watchdog = None;

        let characteristics = result.unwrap_or_else(|reason| {
            warn!(
                "{}",
                BuddyError::DiscoveryFailed {
                    id: self.id.clone(),
                    reason
                }
            );
            Vec::new()
        });
        for characteristic in &characteristics {
            self.latch_uart(characteristic);
        }

        if let Some(cursor) = self.cursor.as_mut() {
            cursor.characteristics = characteristics;
            cursor.char_idx = 0;
        }
        self.continue_traversal(ctx);
    }

    /// A read completion or notification
    pub fn on_value_updated(
        &mut self,
        characteristic: &CharacteristicInfo,
        result: std::result::Result<Vec<u8>, String>,
        ctx: &SessionContext<'_>,
    ) {
        if self.phase.is_uart() && UartRole::of(characteristic) == Some(UartRole::Rx) {
            if let Ok(bytes) = result {
                self.receive_text(&bytes, ctx);
            }
            return;
        }

        let value = match result {
            Ok(bytes) => {
                debug!(
                    "{} {} = {:02x?}",
                    self.id,
                    uuid_name(&characteristic.uuid),
                    bytes
                );
                CharacteristicValue::Bytes(bytes)
            }
            Err(reason) => {
                warn!(
                    "{}",
                    BuddyError::ReadFailed {
                        id: self.id.clone(),
                        reason: reason.clone()
                    }
                );
                CharacteristicValue::Failed(reason)
            }
        };
        self.nodes
            .push(GattNode::Characteristic(characteristic.clone(), value));
        ctx.ui.refresh();

        let awaited = self.phase == SessionPhase::ReadingCharacteristic
            && self.awaiting.as_ref().map(|c| (c.service, c.uuid))
                == Some((characteristic.service, characteristic.uuid));
        if awaited {
            self.watchdog = None;
            self.awaiting = None;
            self.advance(ctx);
        }
    }

    /// Moves to the next characteristic, the next service, or the end
    fn advance(&mut self, ctx: &SessionContext<'_>) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.char_idx += 1;
        }
        self.continue_traversal(ctx);
    }

    /// The single sequencer of the traversal. Non-readable characteristics are
    /// recorded and skipped in place; the loop only returns once a network
    /// request is outstanding or the traversal is over.
    fn continue_traversal(&mut self, ctx: &SessionContext<'_>) {
        loop {
            let Some(cursor) = self.cursor.as_mut() else {
                return;
            };

            if cursor.char_idx < cursor.characteristics.len() {
                let characteristic = cursor.characteristics[cursor.char_idx].clone();
                self.acquisitions += 1;
                if characteristic.properties.read {
                    self.acquire_value(characteristic, ctx);
                    return;
                }
                debug!(
                    "{} is not readable, recording without a value",
                    uuid_name(&characteristic.uuid)
                );
                self.nodes.push(GattNode::Characteristic(
                    characteristic,
                    CharacteristicValue::NotReadable,
                ));
                cursor.char_idx += 1;
                continue;
            }

            cursor.service_idx += 1;
            if cursor.service_idx < cursor.services.len() {
                cursor.characteristics.clear();
                cursor.char_idx = 0;
                self.discover_current_service(ctx);
            } else {
                self.finish_traversal(ctx);
            }
            return;
        }
    }

    /// Reads the value and subscribes to changes. Either may answer first.
    fn acquire_value(&mut self, characteristic: CharacteristicInfo, ctx: &SessionContext<'_>) {
        self.phase = SessionPhase::ReadingCharacteristic;
        self.issue_step(ctx);
        ctx.adapter.read_value(&self.id, &characteristic);
        ctx.adapter.set_notify(&self.id, &characteristic, true);
        self.awaiting = Some(characteristic);
    }

    /// Done with every service: disconnect so the device advertises again,
    /// drop the snapshots and start the liveness countdown.
    fn finish_traversal(&mut self, ctx: &SessionContext<'_>) {
        info!(
            "Traversal of {} complete: {} nodes, {} characteristics",
            self.id,
            self.nodes.len(),
            self.acquisitions
        );
        self.watchdog = None;
        self.cursor = None;
        self.awaiting = None;
        self.phase = SessionPhase::Disconnecting;
        ctx.adapter.disconnect(&self.id);
        self.traversal_complete = true;
        self.rearm_liveness(ctx);
        ctx.ui.refresh();
    }

    fn latch_uart(&mut self, characteristic: &CharacteristicInfo) {
        if UartRole::of(characteristic).is_some() {
            self.uart
                .get_or_insert_with(UartChannel::new)
                .bind(characteristic);
        }
    }

    // ---- operation timeout ----

    /// Arms the optional watchdog for the request about to be issued
    fn issue_step(&mut self, ctx: &SessionContext<'_>) {
        self.step = next_stamp();
        self.watchdog = ctx.config.operation_timeout().map(|timeout| {
            ctx.scheduler.schedule(
                timeout,
                TimerEvent::OperationTimedOut {
                    id: self.id.clone(),
                    step: self.step,
                },
            )
        });
    }

    /// The outstanding request never answered. Treated like its failure.
    pub fn on_operation_timed_out(&mut self, step: u64, ctx: &SessionContext<'_>) {
        if step != self.step || self.watchdog.take().is_none() {
            return;
        }
        let secs = ctx.config.operation_timeout_secs.unwrap_or_default();
        warn!("{}", BuddyError::Timeout { id: self.id.clone(), secs });

        match self.phase {
            SessionPhase::Connecting | SessionPhase::UartConnecting => {
                ctx.adapter.disconnect(&self.id);
                self.fall_back_to_rest();
                ctx.ui.notice(&BuddyError::Timeout {
                    id: self.id.clone(),
                    secs,
                });
                ctx.ui.refresh();
            }
            SessionPhase::DiscoveringServices => {
                self.on_services_discovered(Err("timed out".into()), ctx)
            }
            SessionPhase::DiscoveringCharacteristics => {
                if let Some(service) = self
                    .cursor
                    .as_ref()
                    .map(|c| c.services[c.service_idx].clone())
                {
                    self.on_characteristics_discovered(&service, Err("timed out".into()), ctx);
                }
            }
            SessionPhase::ReadingCharacteristic => {
                if let Some(characteristic) = self.awaiting.clone() {
                    self.on_value_updated(&characteristic, Err("timed out".into()), ctx);
                }
            }
            SessionPhase::UartDiscovering => {
                self.uart_failed = true;
                ctx.ui.notice(&BuddyError::UartUnavailable(self.id.clone()));
                self.close_uart_link(ctx);
            }
            _ => {}
        }
    }

    // ---- details view and UART ----

    pub fn details_open(&self) -> bool {
        self.details
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some()
    }

    /// Attaches a detail view. Devices with the UART service get a link for text.
    pub fn open_details(&mut self, observer: &Arc<dyn DetailsObserver>, ctx: &SessionContext<'_>) {
        self.details = Some(Arc::downgrade(observer));
        self.uart_failed = false;
        if self.supports(&UUID_UART_SERVICE) {
            self.begin_uart_link(ctx);
        }
        observer.refresh(&self.display_state());
        ctx.ui.refresh();
    }

    /// Clears the observer slot and drops any UART link
    pub fn close_details(&mut self, ctx: &SessionContext<'_>) {
        self.details = None;
        if self.phase.is_uart() {
            self.close_uart_link(ctx);
        }
        ctx.ui.refresh();
    }

    /// Disconnects the UART link, including one still connecting. Idempotent.
    fn close_uart_link(&mut self, ctx: &SessionContext<'_>) {
        if self.phase == SessionPhase::UartClosing {
            return;
        }
        self.watchdog = None;
        self.phase = SessionPhase::UartClosing;
        ctx.adapter.disconnect(&self.id);
    }

    fn begin_uart_link(&mut self, ctx: &SessionContext<'_>) {
        if !matches!(
            self.phase,
            SessionPhase::Idle | SessionPhase::TraversalComplete
        ) {
            debug!("UART link for {} deferred, phase {:?}", self.id, self.phase);
            return;
        }
        info!("Connecting to {} for UART", self.id);
        self.uart.get_or_insert_with(UartChannel::new).unbind();
        self.phase = SessionPhase::UartConnecting;
        self.issue_step(ctx);
        ctx.adapter.connect(&self.id);
    }

    fn on_uart_services(
        &mut self,
        result: std::result::Result<Vec<ServiceInfo>, String>,
        ctx: &SessionContext<'_>,
    ) {
        self.watchdog = None;
        let uart_service = result
            .unwrap_or_default()
            .into_iter()
            .find(|s| s.uuid == UUID_UART_SERVICE);
        match uart_service {
            Some(service) => {
                self.issue_step(ctx);
                ctx.adapter.discover_characteristics(&self.id, &service);
            }
            None => {
                warn!("No UART service on the new link to {}, giving up", self.id);
                self.uart_failed = true;
                ctx.ui.notice(&BuddyError::UartUnavailable(self.id.clone()));
                self.close_uart_link(ctx);
            }
        }
    }

    fn on_uart_characteristics(
        &mut self,
        result: std::result::Result<Vec<CharacteristicInfo>, String>,
        ctx: &SessionContext<'_>,
    ) {
        self.watchdog = None;
        for characteristic in result.unwrap_or_default() {
            self.latch_uart(&characteristic);
        }
        let receive_enabled = self.receive_enabled;
        let uart = self.uart.get_or_insert_with(UartChannel::new);
        if let Some(rx) = uart.rx() {
            ctx.adapter.set_notify(&self.id, rx, receive_enabled);
        }
        if uart.tx().is_none() {
            ctx.ui.notice(&BuddyError::UartUnavailable(self.id.clone()));
        }
        self.phase = SessionPhase::UartReady;
        info!("UART link to {} ready", self.id);
        self.notify_details();
        ctx.ui.refresh();
    }

    /// Turns inbound notifications on or off. Safe to repeat, and kept for
    /// the next UART link when none is up.
    pub fn set_receive_enabled(&mut self, enabled: bool, ctx: &SessionContext<'_>) {
        self.receive_enabled = enabled;
        if !self.phase.is_link_up() {
            return;
        }
        if let Some(rx) = self.uart.as_ref().and_then(UartChannel::rx) {
            ctx.adapter.set_notify(&self.id, rx, enabled);
        }
    }

    pub fn receive_enabled(&self) -> bool {
        self.receive_enabled
    }

    /// True while text handed to [`send_text`](Self::send_text) would go out
    pub fn can_send(&self) -> bool {
        self.phase.is_link_up() && self.uart.as_ref().and_then(UartChannel::tx).is_some()
    }

    fn receive_text(&mut self, bytes: &[u8], ctx: &SessionContext<'_>) {
        let text = render_btle_text(bytes);
        debug!("receiving {:?} from {}", text, self.id);
        if let Some(uart) = self.uart.as_mut() {
            uart.console.append_received(&text);
        }
        ctx.ui.text_received(&self.id, &text);
        if let Some(observer) = self.details.as_ref().and_then(Weak::upgrade) {
            observer.text_received(&text);
        }
    }

    /// Queues `text` for the UART Tx characteristic and starts sending
    pub fn send_text(&mut self, text: &str, ctx: &SessionContext<'_>) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        if !self.can_send() {
            return Err(BuddyError::UartUnavailable(self.id.clone()));
        }
        let Some(uart) = self.uart.as_mut() else {
            return Err(BuddyError::UartUnavailable(self.id.clone()));
        };

        let chunks = uart.enqueue(text, ctx.config.chunk_size);
        debug!("sending {:?} to {} in {} chunks", text, self.id, chunks);
        self.pump_writes(ctx);
        Ok(())
    }

    fn pump_writes(&mut self, ctx: &SessionContext<'_>) {
        let Some(uart) = self.uart.as_mut() else {
            return;
        };
        let (Some(tx), Some(mode)) = (uart.tx().cloned(), uart.write_mode()) else {
            return;
        };
        if let Some(chunk) = uart.next_chunk() {
            ctx.adapter.write_value(&self.id, &tx, chunk, mode);
        }
    }

    pub fn on_write_completed(
        &mut self,
        result: std::result::Result<(), String>,
        ctx: &SessionContext<'_>,
    ) {
        let Some(uart) = self.uart.as_mut() else {
            return;
        };
        let outcome = uart.complete_write(result.is_ok(), ctx.config.write_failure_policy);
        if let (WriteOutcome::Failed { dropped }, Err(reason)) = (outcome, result) {
            if dropped > 0 {
                warn!("Dropped {} queued chunks for {}", dropped, self.id);
            }
            ctx.ui.notice(&BuddyError::WriteFailed {
                id: self.id.clone(),
                reason,
            });
        }
        self.pump_writes(ctx);
    }

    // ---- presentation ----

    fn notify_details(&self) {
        if let Some(observer) = self.details.as_ref().and_then(Weak::upgrade) {
            observer.refresh(&self.display_state());
        }
    }

    pub fn display_state(&self) -> DisplayState {
        let in_use = self.details_open();
        let connection = if in_use {
            ConnectionState::InUse
        } else {
            match self.phase {
                SessionPhase::Connecting | SessionPhase::UartConnecting => {
                    ConnectionState::Connecting
                }
                SessionPhase::Idle | SessionPhase::TraversalComplete => {
                    ConnectionState::Disconnected
                }
                _ => ConnectionState::Connected,
            }
        };
        let rssi = (self.rssi != RSSI_UNAVAILABLE).then_some(self.rssi);
        let connectable = self.advertisement.is_connectable != Some(false);
        let gatt_lines = if self.traversal_complete {
            self.nodes.iter().map(GattNode::display_line).collect()
        } else {
            vec![ACQUIRING_PLACEHOLDER.to_string()]
        };

        DisplayState {
            id: self.id.to_string(),
            address: self.id.mac_address(),
            name: self
                .name
                .clone()
                .or_else(|| self.advertisement.local_name.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            rssi,
            signal_bars: signal_bars(rssi),
            tx_power_level: self.advertisement.tx_power_level,
            is_connectable: self.advertisement.is_connectable,
            advertised_services: self.advertisement.services.iter().map(uuid_name).collect(),
            disabled: self.disabled,
            connection,
            selectable: (connectable && !self.disabled) || in_use,
            gatt_lines,
            traversal_complete: self.traversal_complete,
        }
    }

    /// Drops timers and any link when the record is discarded
    pub fn teardown(&mut self, ctx: &SessionContext<'_>) {
        self.liveness.cancel();
        self.pending_connect = None;
        self.watchdog = None;
        if self.phase.is_link_up()
            || matches!(
                self.phase,
                SessionPhase::Connecting | SessionPhase::UartConnecting
            )
        {
            ctx.adapter.disconnect(&self.id);
        }
    }
}

/// 0 to 4 bars from the RSSI
fn signal_bars(rssi: Option<i16>) -> u8 {
    match rssi {
        Some(rssi) => SIGNAL_BAR_THRESHOLDS
            .iter()
            .filter(|&&threshold| rssi >= threshold)
            .count() as u8,
        None => 0,
    }
}
