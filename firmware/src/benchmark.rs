//! ベンチマークモジュール
//!
//! サイクルハンドラの処理時間をDWTサイクルカウンタで測定します。

use core::hint::black_box;

use cortex_m::peripheral::DWT;
use g4_hall_sense::config::cycle_budget;
use g4_hall_sense::safety::{BusVoltageMonitor, CurrentLimitMonitor};
use g4_hall_sense::{CycleHandler, HallPattern, RawSample, SenseConfig};

use crate::config;

/// 正転方向のHallパターン列（セクター0→5）
const FORWARD_PATTERNS: [u8; 6] = [1, 3, 2, 6, 4, 5];

/// DWTサイクルカウンタを有効化
///
/// # Safety
/// Cortex-Mペリフェラルへの直接アクセスを含む
pub unsafe fn enable_cycle_counter() {
    let mut cp = cortex_m::Peripherals::steal();
    cp.DCB.enable_trace();
    cp.DWT.enable_cycle_counter();
}

/// サイクルハンドラのベンチマークを実行して結果を表示
///
/// 割り込みとは別のハンドラ（キャリブレーション無し）で、
/// 毎サイクルセクターが進む最悪ケースを測定します。
///
/// # 引数
/// * `iterations` - ベンチマーク実行回数
pub fn run_cycle_handler_benchmark(iterations: u32) {
    if iterations == 0 {
        return;
    }
    info!("Running cycle handler benchmark...");

    let sense = SenseConfig {
        calibration_samples: 0,
        ..SenseConfig::new()
    };
    let mut handler = CycleHandler::new(
        &sense,
        (CurrentLimitMonitor::default(), BusVoltageMonitor::default()),
    );

    let start = DWT::cycle_count();
    for i in 0..iterations {
        let sample = RawSample {
            ia: 2048 + (i & 0xFF) as u16,
            ib: 2048,
            aux: 2700,
        };
        let hall = HallPattern::from_bits(FORWARD_PATTERNS[(i % 6) as usize]);
        black_box(handler.process(black_box(&sample), hall, 100));
    }
    let ticks = DWT::cycle_count().wrapping_sub(start);

    let cycles_per_call = ticks / iterations;
    let budget = cycle_budget(config::CPU_CLOCK_HZ, config::SAMPLE_RATE_HZ);
    // 10倍してdefmtで小数1桁表示
    let load_x10 = if budget == 0 {
        0
    } else {
        cycles_per_call * 1000 / budget
    };

    info!("Benchmark results ({} iterations):", iterations);
    info!(
        "  CycleHandler::process: {} cycles total, {} cycles/call",
        ticks, cycles_per_call
    );
    info!(
        "  Budget: {} cycles/sample @ {}Hz, load {}.{}%",
        budget,
        config::SAMPLE_RATE_HZ,
        load_x10 / 10,
        load_x10 % 10
    );
    info!(
        "  Final state: counter={}, angle={}",
        handler.state().sector_counter,
        handler.state().angle
    );

    if cycles_per_call >= budget {
        error!("Cycle handler exceeds the sample period budget");
    }
}
