//! In-memory state: per-collection snapshot stores and the shared
//! application context.

mod app;
pub mod history;
pub mod store;
pub mod views;

pub use app::{AlertBoard, AppState, CycleReport, ScanPermit, StatusReport};
