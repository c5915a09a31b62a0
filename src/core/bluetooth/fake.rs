//! In-memory radio adapter that records every request.
//! Tests drive the coordinator by feeding it the adapter events a real radio
//! would produce in answer.

use std::sync::Mutex;

use crate::core::bluetooth::adapter::{AdapterEvent, EventSender, RadioAdapter};
use crate::core::bluetooth::device::DeviceId;
use crate::core::bluetooth::types::{CharacteristicInfo, ServiceInfo, WriteMode};

/// One call made on the adapter
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterRequest {
    StartScan,
    StopScan,
    Connect(DeviceId),
    DiscoverServices(DeviceId),
    DiscoverCharacteristics(DeviceId, ServiceInfo),
    ReadValue(DeviceId, CharacteristicInfo),
    SetNotify(DeviceId, CharacteristicInfo, bool),
    WriteValue(DeviceId, CharacteristicInfo, Vec<u8>, WriteMode),
    Disconnect(DeviceId),
}

#[derive(Debug, Default)]
pub struct RecordingAdapter {
    requests: Mutex<Vec<AdapterRequest>>,
    /// When set, writes are answered with `WriteCompleted` at once
    write_answers: Mutex<Option<EventSender>>,
    failing_writes: Mutex<usize>,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, request: AdapterRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
    }

    /// Everything requested so far, oldest first
    pub fn requests(&self) -> Vec<AdapterRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Returns and forgets everything requested so far
    pub fn take(&self) -> Vec<AdapterRequest> {
        self.requests
            .lock()
            .map(|mut requests| std::mem::take(&mut *requests))
            .unwrap_or_default()
    }

    /// Answers every later write on `events`
    pub fn answer_writes(&self, events: EventSender) {
        if let Ok(mut answers) = self.write_answers.lock() {
            *answers = Some(events);
        }
    }

    /// Makes the next `count` answered writes fail
    pub fn fail_next_writes(&self, count: usize) {
        if let Ok(mut failing) = self.failing_writes.lock() {
            *failing = count;
        }
    }

    fn answer_write(&self, id: &DeviceId, characteristic: &CharacteristicInfo) {
        let Ok(answers) = self.write_answers.lock() else {
            return;
        };
        let Some(events) = answers.as_ref() else {
            return;
        };
        let fail = match self.failing_writes.lock() {
            Ok(mut failing) if *failing > 0 => {
                *failing -= 1;
                true
            }
            _ => false,
        };
        let result = if fail {
            Err("write rejected".to_string())
        } else {
            Ok(())
        };
        let _ = events.send(
            AdapterEvent::WriteCompleted {
                id: id.clone(),
                characteristic: characteristic.clone(),
                result,
            }
            .into(),
        );
    }
}

impl RadioAdapter for RecordingAdapter {
    fn start_scan(&self) {
        self.record(AdapterRequest::StartScan);
    }

    fn stop_scan(&self) {
        self.record(AdapterRequest::StopScan);
    }

    fn connect(&self, id: &DeviceId) {
        self.record(AdapterRequest::Connect(id.clone()));
    }

    fn discover_services(&self, id: &DeviceId) {
        self.record(AdapterRequest::DiscoverServices(id.clone()));
    }

    fn discover_characteristics(&self, id: &DeviceId, service: &ServiceInfo) {
        self.record(AdapterRequest::DiscoverCharacteristics(
            id.clone(),
            service.clone(),
        ));
    }

    fn read_value(&self, id: &DeviceId, characteristic: &CharacteristicInfo) {
        self.record(AdapterRequest::ReadValue(id.clone(), characteristic.clone()));
    }

    fn set_notify(&self, id: &DeviceId, characteristic: &CharacteristicInfo, enabled: bool) {
        self.record(AdapterRequest::SetNotify(
            id.clone(),
            characteristic.clone(),
            enabled,
        ));
    }

    fn write_value(
        &self,
        id: &DeviceId,
        characteristic: &CharacteristicInfo,
        bytes: Vec<u8>,
        mode: WriteMode,
    ) {
        self.record(AdapterRequest::WriteValue(
            id.clone(),
            characteristic.clone(),
            bytes,
            mode,
        ));
        self.answer_write(id, characteristic);
    }

    fn disconnect(&self, id: &DeviceId) {
        self.record(AdapterRequest::Disconnect(id.clone()));
    }
}
