//! Core functionality for the BLE buddy
//! Discovery, GATT traversal and the UART text channel, independent of any
//! particular presentation.

pub mod bluetooth;
pub mod codec;
pub mod coordinator;
pub mod registry;
pub mod scheduler;
pub mod ui;

// Re-export commonly used types
pub use coordinator::{run_event_loop, DiscoveryCoordinator};
pub use ui::{DetailsObserver, UiEvent, UiSink};
