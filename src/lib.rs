//! BLDCドライブ用 Hallセクタートラッキング・相電流センシング
//!
//! ADC完了割り込みから1サイクルごとに呼ばれる推定処理一式です。
//! ハードウェア依存部分（ADC/DMA/タイマー設定、割り込みエントリ）は`firmware`パッケージ側にあり、
//! このクレートはホスト上でテストできます。
#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod calibration;
pub mod capture;
pub mod config;
pub mod cycle;
pub mod hall;
pub mod phase_current;
pub mod safety;
pub mod state;
pub mod tracker;
pub mod trigger;

pub use capture::{CaptureBuffer, RawSample};
pub use config::{ConfigError, SenseConfig};
pub use cycle::{CaptureSource, CycleHandler, CycleOutcome, EdgeIndicator};
pub use hall::{HallPattern, HallReading};
pub use safety::SafetyMonitor;
pub use state::{DutyCommand, Fault, MotorState, SharedMotorState, Status};
pub use tracker::{RotorSectorTracker, SectorEdge};
pub use trigger::{TriggerMode, TriggerTimer};
