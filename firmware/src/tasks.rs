//! タスクモジュール

pub mod telemetry;

pub use telemetry::telemetry_task;
