use std::sync::{Arc, Mutex};
use std::time::Duration;

use ble_buddy_lib::BuddyError;
use ble_buddy_lib::config::AppConfig;
use ble_buddy_lib::core::bluetooth::constants::{
    UUID_BATTERY_LEVEL, UUID_BATTERY_SERVICE, UUID_DEVICE_INFORMATION_SERVICE,
    UUID_MANUFACTURER_NAME, UUID_MODEL_NUMBER, UUID_UART_RX_CHAR, UUID_UART_SERVICE,
    UUID_UART_TX_CHAR,
};
use ble_buddy_lib::core::bluetooth::fake::{AdapterRequest, RecordingAdapter};
use ble_buddy_lib::core::bluetooth::{
    AdapterEvent, AdapterState, AdvertisementInfo, CharacteristicInfo, CharacteristicProperties,
    CoordinatorEvent, DeviceId, DisplayState, ServiceInfo, WriteFailurePolicy,
};
use ble_buddy_lib::core::{DetailsObserver, DiscoveryCoordinator, UiEvent, UiSink};
use ble_buddy_lib::state::AppState;
use tokio::sync::mpsc;
use tokio::time::sleep;
use uuid::Uuid;

struct Bench {
    adapter: Arc<RecordingAdapter>,
    coordinator: DiscoveryCoordinator,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    receiver: mpsc::UnboundedReceiver<CoordinatorEvent>,
    ui: mpsc::UnboundedReceiver<UiEvent>,
}

impl Bench {
    fn new(config: AppConfig) -> Self {
        let adapter = Arc::new(RecordingAdapter::new());
        let (events, receiver) = mpsc::unbounded_channel();
        let (ui_tx, ui) = mpsc::unbounded_channel();
        let coordinator =
            DiscoveryCoordinator::new(adapter.clone(), events.clone(), UiSink::new(ui_tx), &config);
        Self {
            adapter,
            coordinator,
            events,
            receiver,
            ui,
        }
    }

    fn inject(&mut self, event: AdapterEvent) {
        self.coordinator.handle_event(event.into());
        self.pump();
    }

    /// Applies every timer firing and adapter answer queued so far
    fn pump(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.coordinator.handle_event(event);
        }
    }

    fn state(&self, id: &DeviceId) -> DisplayState {
        self.coordinator.display_state(id).unwrap()
    }

    fn notices(&mut self) -> Vec<String> {
        let mut titles = Vec::new();
        while let Ok(event) = self.ui.try_recv() {
            if let UiEvent::Notice(notice) = event {
                titles.push(notice.title);
            }
        }
        titles
    }

    fn advertise(&mut self, id: &DeviceId, name: &str, rssi: i16) {
        self.inject(AdapterEvent::Advertisement {
            id: id.clone(),
            name: Some(name.to_string()),
            advertisement: AdvertisementInfo {
                local_name: Some(name.to_string()),
                is_connectable: Some(true),
                ..Default::default()
            },
            rssi,
        });
    }

    fn reads(&self) -> Vec<Uuid> {
        self.adapter
            .requests()
            .into_iter()
            .filter_map(|r| match r {
                AdapterRequest::ReadValue(_, c) => Some(c.uuid),
                _ => None,
            })
            .collect()
    }

    fn writes(&self) -> Vec<Vec<u8>> {
        self.adapter
            .requests()
            .into_iter()
            .filter_map(|r| match r {
                AdapterRequest::WriteValue(_, _, bytes, _) => Some(bytes),
                _ => None,
            })
            .collect()
    }
}

fn characteristic(uuid: Uuid, service: Uuid, read: bool) -> CharacteristicInfo {
    CharacteristicInfo::new(
        uuid,
        service,
        CharacteristicProperties {
            read,
            ..Default::default()
        },
    )
}

fn uart_tx() -> CharacteristicInfo {
    CharacteristicInfo::new(
        UUID_UART_TX_CHAR,
        UUID_UART_SERVICE,
        CharacteristicProperties {
            write: true,
            write_without_response: true,
            ..Default::default()
        },
    )
}

fn uart_rx() -> CharacteristicInfo {
    CharacteristicInfo::new(
        UUID_UART_RX_CHAR,
        UUID_UART_SERVICE,
        CharacteristicProperties {
            notify: true,
            ..Default::default()
        },
    )
}

#[derive(Default)]
struct RecordingView {
    refreshes: Mutex<usize>,
    texts: Mutex<Vec<String>>,
}

impl DetailsObserver for RecordingView {
    fn refresh(&self, _state: &DisplayState) {
        *self.refreshes.lock().unwrap() += 1;
    }

    fn text_received(&self, text: &str) {
        self.texts.lock().unwrap().push(text.to_string());
    }
}

#[tokio::test(start_paused = true)]
async fn single_service_device_is_traversed_then_ages_out() {
    let mut bench = Bench::new(AppConfig::default());
    let id = DeviceId::from("ada-board");
    let service = ServiceInfo::new(UUID_DEVICE_INFORMATION_SERVICE);
    let readable = characteristic(UUID_MANUFACTURER_NAME, service.uuid, true);
    let opaque = characteristic(UUID_MODEL_NUMBER, service.uuid, false);

    bench.advertise(&id, "Ada", -55);
    let fresh = bench.state(&id);
    assert!(fresh.disabled);
    assert!(!fresh.traversal_complete);

    // connection waits for the deliberate delay
    assert!(bench.adapter.requests().is_empty());
    sleep(Duration::from_millis(101)).await;
    bench.pump();
    assert_eq!(bench.adapter.take(), vec![AdapterRequest::Connect(id.clone())]);

    bench.inject(AdapterEvent::Connected { id: id.clone() });
    assert_eq!(bench.adapter.take(), vec![AdapterRequest::DiscoverServices(id.clone())]);

    bench.inject(AdapterEvent::ServicesDiscovered {
        id: id.clone(),
        result: Ok(vec![service.clone()]),
    });
    assert_eq!(bench.coordinator.supports(&id, &service.uuid), Ok(true));

    bench.inject(AdapterEvent::CharacteristicsDiscovered {
        id: id.clone(),
        service: service.clone(),
        result: Ok(vec![readable.clone(), opaque.clone()]),
    });
    bench.inject(AdapterEvent::ValueUpdated {
        id: id.clone(),
        characteristic: readable.clone(),
        result: Ok(vec![0x41, 0x64, 0x61]),
    });

    let session_steps = bench
        .coordinator
        .registry()
        .get(&id)
        .map(|s| s.acquisition_count());
    assert_eq!(session_steps, Some(2));

    let done = bench.state(&id);
    assert!(done.traversal_complete);
    assert!(!done.disabled);
    assert_eq!(
        done.gatt_lines,
        vec![
            "Device Information".to_string(),
            "    Manufacturer Name String \"Ada\"".to_string(),
            "    Model Number String".to_string(),
        ]
    );
    assert_eq!(
        bench.adapter.requests().last(),
        Some(&AdapterRequest::Disconnect(id.clone()))
    );
    bench.inject(AdapterEvent::Disconnected {
        id: id.clone(),
        reason: None,
    });
    assert!(bench.notices().is_empty(), "voluntary disconnect is silent");

    sleep(Duration::from_secs(19)).await;
    bench.pump();
    assert!(!bench.state(&id).disabled);

    sleep(Duration::from_secs(2)).await;
    bench.pump();
    let aged = bench.state(&id);
    assert!(aged.disabled);
    assert_eq!(aged.rssi, None);
    assert_eq!(aged.rssi_label(), "n/a dBm");
    assert!(bench.coordinator.supports(&id, &service.uuid).unwrap());
}

#[tokio::test(start_paused = true)]
async fn fresh_advertisements_keep_a_device_enabled() {
    let mut bench = Bench::new(AppConfig::default());
    let id = DeviceId::from("beacon");
    bench.advertise(&id, "Beacon", -70);
    sleep(Duration::from_millis(101)).await;
    bench.pump();
    bench.inject(AdapterEvent::Connected { id: id.clone() });
    bench.inject(AdapterEvent::ServicesDiscovered {
        id: id.clone(),
        result: Ok(vec![]),
    });
    assert!(!bench.state(&id).disabled);

    for _ in 0..3 {
        sleep(Duration::from_secs(15)).await;
        bench.pump();
        bench.advertise(&id, "Beacon", -65);
    }
    assert!(!bench.state(&id).disabled);
    assert_eq!(bench.coordinator.device_list().len(), 1);

    sleep(Duration::from_secs(21)).await;
    bench.pump();
    assert!(bench.state(&id).disabled);
}

#[tokio::test(start_paused = true)]
async fn acquisition_steps_cover_every_characteristic_in_order() {
    let mut bench = Bench::new(AppConfig::default());
    let id = DeviceId::from("multi");
    let services = vec![
        ServiceInfo::new(UUID_DEVICE_INFORMATION_SERVICE),
        ServiceInfo::new(Uuid::from_u128(0xfeed)),
        ServiceInfo::new(UUID_BATTERY_SERVICE),
    ];
    let characteristics = vec![
        vec![
            characteristic(UUID_MANUFACTURER_NAME, services[0].uuid, true),
            characteristic(UUID_MODEL_NUMBER, services[0].uuid, true),
        ],
        vec![],
        vec![
            characteristic(Uuid::from_u128(0xa1), services[2].uuid, false),
            characteristic(UUID_BATTERY_LEVEL, services[2].uuid, true),
            characteristic(Uuid::from_u128(0xa3), services[2].uuid, true),
        ],
    ];

    bench.advertise(&id, "Multi", -60);
    sleep(Duration::from_millis(101)).await;
    bench.pump();
    bench.inject(AdapterEvent::Connected { id: id.clone() });
    bench.inject(AdapterEvent::ServicesDiscovered {
        id: id.clone(),
        result: Ok(services.clone()),
    });

    for (service, chars) in services.iter().zip(&characteristics) {
        bench.inject(AdapterEvent::CharacteristicsDiscovered {
            id: id.clone(),
            service: service.clone(),
            result: Ok(chars.clone()),
        });
        for c in chars.iter().filter(|c| c.properties.read) {
            // the model number read fails; traversal goes on regardless
            let result = if c.uuid == UUID_MODEL_NUMBER {
                Err("read not permitted".to_string())
            } else {
                Ok(vec![0x32])
            };
            bench.inject(AdapterEvent::ValueUpdated {
                id: id.clone(),
                characteristic: c.clone(),
                result,
            });
        }
    }

    let session = bench.coordinator.registry().get(&id).unwrap();
    assert!(session.is_traversal_complete());
    let total: usize = characteristics.iter().map(Vec::len).sum();
    assert_eq!(session.acquisition_count(), total);

    assert_eq!(
        bench.reads(),
        vec![
            UUID_MANUFACTURER_NAME,
            UUID_MODEL_NUMBER,
            UUID_BATTERY_LEVEL,
            Uuid::from_u128(0xa3)
        ]
    );
    let lines = bench.state(&id).gatt_lines;
    assert_eq!(lines.len(), services.len() + total);
    assert!(lines.contains(&"    Battery Level \"50%\"".to_string()));
    assert!(lines.contains(&"    Model Number String \"n/a\"".to_string()));
}

#[tokio::test(start_paused = true)]
async fn failed_discovery_still_completes_traversal() {
    let mut bench = Bench::new(AppConfig::default());
    let id = DeviceId::from("flaky");
    let service = ServiceInfo::new(UUID_BATTERY_SERVICE);

    bench.advertise(&id, "Flaky", -60);
    sleep(Duration::from_millis(101)).await;
    bench.pump();
    bench.inject(AdapterEvent::Connected { id: id.clone() });
    bench.inject(AdapterEvent::ServicesDiscovered {
        id: id.clone(),
        result: Ok(vec![service.clone()]),
    });
    bench.inject(AdapterEvent::CharacteristicsDiscovered {
        id: id.clone(),
        service,
        result: Err("attribute not found".to_string()),
    });

    let state = bench.state(&id);
    assert!(state.traversal_complete);
    assert_eq!(state.gatt_lines, vec!["Battery Service".to_string()]);
    assert!(bench.notices().is_empty());
}

/// Traverses a UART board and opens its detail view, leaving the link ready
async fn uart_bench(config: AppConfig) -> (Bench, DeviceId, Arc<RecordingView>, Arc<dyn DetailsObserver>) {
    let mut bench = Bench::new(config);
    let id = DeviceId::from("feather");
    let service = ServiceInfo::new(UUID_UART_SERVICE);

    bench.advertise(&id, "Feather", -50);
    sleep(Duration::from_millis(101)).await;
    bench.pump();
    bench.inject(AdapterEvent::Connected { id: id.clone() });
    bench.inject(AdapterEvent::ServicesDiscovered {
        id: id.clone(),
        result: Ok(vec![service.clone()]),
    });
    bench.inject(AdapterEvent::CharacteristicsDiscovered {
        id: id.clone(),
        service: service.clone(),
        result: Ok(vec![uart_tx(), uart_rx()]),
    });
    bench.inject(AdapterEvent::Disconnected {
        id: id.clone(),
        reason: None,
    });
    assert!(bench.state(&id).traversal_complete);
    bench.adapter.take();

    let view = Arc::new(RecordingView::default());
    let observer: Arc<dyn DetailsObserver> = view.clone();
    bench.coordinator.open_details(&id, &observer).unwrap();
    assert_eq!(bench.adapter.take(), vec![AdapterRequest::Connect(id.clone())]);

    bench.inject(AdapterEvent::Connected { id: id.clone() });
    bench.inject(AdapterEvent::ServicesDiscovered {
        id: id.clone(),
        result: Ok(vec![service.clone()]),
    });
    bench.inject(AdapterEvent::CharacteristicsDiscovered {
        id: id.clone(),
        service,
        result: Ok(vec![uart_tx(), uart_rx()]),
    });
    assert!(
        bench
            .adapter
            .requests()
            .contains(&AdapterRequest::SetNotify(id.clone(), uart_rx(), true))
    );
    bench.adapter.answer_writes(bench.events.clone());
    bench.adapter.take();
    bench.notices();

    (bench, id, view, observer)
}

#[tokio::test(start_paused = true)]
async fn detail_view_reconnects_for_uart_and_exchanges_text() {
    let (mut bench, id, view, _observer) = uart_bench(AppConfig::default()).await;
    let state = bench.state(&id);
    assert!(state.selectable);
    assert_eq!(state.connection.label(), "In Use");
    assert!(*view.refreshes.lock().unwrap() > 0);

    bench.coordinator.console_input(&id, "hello").unwrap();
    assert!(bench.writes().is_empty(), "typed text waits for return");
    bench.coordinator.console_input(&id, "\n").unwrap();
    bench.pump();
    assert_eq!(bench.writes(), vec![b"hello".to_vec()]);

    bench.inject(AdapterEvent::ValueUpdated {
        id: id.clone(),
        characteristic: uart_rx(),
        result: Ok(b"pong\0\0".to_vec()),
    });
    assert_eq!(*view.texts.lock().unwrap(), vec!["pong".to_string()]);
    assert_eq!(bench.coordinator.export_uart_text(&id).unwrap(), "hello\npong");

    bench.coordinator.set_receive_enabled(&id, false).unwrap();
    assert!(
        bench
            .adapter
            .requests()
            .contains(&AdapterRequest::SetNotify(id.clone(), uart_rx(), false))
    );

    bench.coordinator.close_details(&id).unwrap();
    assert_eq!(
        bench.adapter.requests().last(),
        Some(&AdapterRequest::Disconnect(id.clone()))
    );
    bench.inject(AdapterEvent::Disconnected {
        id: id.clone(),
        reason: None,
    });
    assert_eq!(bench.state(&id).connection.label(), "Disconnected");
    assert!(bench.notices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn long_text_goes_out_in_twenty_byte_chunks() {
    let (mut bench, id, _view, _observer) = uart_bench(AppConfig::default()).await;
    let text = "The quick brown fox jumps over the lazy dog";

    bench.coordinator.send_text(&id, text).unwrap();
    bench.pump();

    let writes = bench.writes();
    assert_eq!(writes.len(), 3);
    assert!(writes.iter().all(|chunk| chunk.len() <= 20));
    assert_eq!(writes.concat(), text.as_bytes());
}

#[tokio::test(start_paused = true)]
async fn abort_policy_drops_the_rest_after_a_failed_chunk() {
    let (mut bench, id, _view, _observer) = uart_bench(AppConfig::default()).await;
    bench.adapter.fail_next_writes(1);

    bench.coordinator.send_text(&id, &"x".repeat(50)).unwrap();
    bench.pump();

    assert_eq!(bench.writes().len(), 1);
    assert_eq!(bench.notices(), vec!["Failed to write value".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn continue_policy_keeps_sending_after_a_failed_chunk() {
    let mut config = AppConfig::default();
    config.session.write_failure_policy = WriteFailurePolicy::Continue;
    let (mut bench, id, _view, _observer) = uart_bench(config).await;
    bench.adapter.fail_next_writes(1);

    bench.coordinator.send_text(&id, &"x".repeat(50)).unwrap();
    bench.pump();

    assert_eq!(bench.writes().len(), 3);
    assert_eq!(bench.notices(), vec!["Failed to write value".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn dropped_uart_link_disables_the_device() {
    let (mut bench, id, _view, _observer) = uart_bench(AppConfig::default()).await;
    bench.inject(AdapterEvent::Disconnected {
        id: id.clone(),
        reason: Some("The connection was lost.".to_string()),
    });

    assert!(bench.state(&id).disabled);
    assert_eq!(bench.notices(), vec!["Peripheral disconnected".to_string()]);
    assert_eq!(
        bench.coordinator.send_text(&id, "anyone?"),
        Err(BuddyError::UartUnavailable(id.clone()))
    );
}

#[tokio::test(start_paused = true)]
async fn typed_text_stays_pending_while_the_link_is_down() {
    let (mut bench, id, _view, _observer) = uart_bench(AppConfig::default()).await;
    bench.inject(AdapterEvent::Disconnected {
        id: id.clone(),
        reason: Some("The connection was lost.".to_string()),
    });
    bench.notices();

    bench.coordinator.console_input(&id, "hi").unwrap();
    assert_eq!(
        bench.coordinator.console_input(&id, "\n"),
        Err(BuddyError::UartUnavailable(id.clone()))
    );
    assert_eq!(
        bench.coordinator.console_send(&id),
        Err(BuddyError::UartUnavailable(id.clone()))
    );
    bench.pump();

    assert!(bench.writes().is_empty());
    let console = &bench.coordinator.registry().get(&id).unwrap().uart().unwrap().console;
    assert_eq!(console.pending(), "hi");
    assert!(console.can_edit(0));
    assert_eq!(bench.coordinator.export_uart_text(&id).unwrap(), "hi");
}

#[tokio::test(start_paused = true)]
async fn reset_forgets_devices_and_they_return_on_next_advertisement() {
    let mut bench = Bench::new(AppConfig::default());
    bench.inject(AdapterEvent::StateChanged(AdapterState::PoweredOn));
    bench.coordinator.start().unwrap();
    let id = DeviceId::from("returning");
    bench.advertise(&id, "Returning", -60);

    bench.coordinator.reset();
    assert!(bench.coordinator.device_list().is_empty());

    // the pending first connection died with the old record
    sleep(Duration::from_millis(200)).await;
    bench.pump();
    assert!(!bench
        .adapter
        .requests()
        .contains(&AdapterRequest::Connect(id.clone())));

    bench.advertise(&id, "Returning", -60);
    assert_eq!(bench.coordinator.device_list().len(), 1);
    assert!(bench.state(&id).disabled);
    assert!(bench.coordinator.is_scanning());
}

#[tokio::test(start_paused = true)]
async fn event_loop_applies_events_under_the_coordinator_lock() {
    let adapter = Arc::new(RecordingAdapter::new());
    let (events, receiver) = mpsc::unbounded_channel();
    let (ui_tx, _ui) = mpsc::unbounded_channel();
    let state = AppState::with_adapter(
        adapter.clone(),
        events.clone(),
        receiver,
        UiSink::new(ui_tx),
        AppConfig::default(),
    );

    events
        .send(AdapterEvent::StateChanged(AdapterState::PoweredOn).into())
        .unwrap();
    state.coordinator.lock().await.start().unwrap();
    events
        .send(
            AdapterEvent::Advertisement {
                id: DeviceId::from("looped"),
                name: None,
                advertisement: AdvertisementInfo::default(),
                rssi: -40,
            }
            .into(),
        )
        .unwrap();

    sleep(Duration::from_millis(150)).await;
    let requests = adapter.requests();
    assert!(requests.contains(&AdapterRequest::StartScan));
    assert!(requests.contains(&AdapterRequest::Connect(DeviceId::from("looped"))));

    state.shutdown().await;
}
