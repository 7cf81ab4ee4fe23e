#![no_std]
#![no_main]

// ログマクロは他モジュールより先に定義する
mod fmt;

mod benchmark;
mod config;
mod hardware;
mod sampling;
mod state;
mod tasks;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::Spawner;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_time::{Duration, Timer};

use tasks::telemetry_task;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // ハードウェア初期化
    let clock_config = hardware::create_clock_config();
    let p = embassy_stm32::init(clock_config);

    info!("═══════════════════════════════════════════════════════════════════");
    info!("");
    info!("        G4 HALL SENSE • Rotor sector & phase current estimation");
    info!("        STM32G431VB @ 170MHz • ADC sampling {}Hz", config::SAMPLE_RATE_HZ);
    info!("");
    info!("═══════════════════════════════════════════════════════════════════");

    // 回転インジケータLED（PC13）
    let led = Output::new(p.PC13, Level::Low, Speed::Low);

    // Hall入力、ADC入力ピン
    unsafe {
        hardware::init_hall_inputs();
        hardware::init_analog_inputs();
    }

    // ベンチマーク実行（サンプリング開始前）
    unsafe {
        benchmark::enable_cycle_counter();
    }
    benchmark::run_cycle_handler_benchmark(config::BENCHMARK_ITERATIONS);

    // サンプリング開始（失敗時はpanic）
    sampling::start(config::TRIGGER_MODE, led).unwrap();

    spawner.spawn(telemetry_task()).unwrap();

    // メインループ（外部制御ループはstate::DUTYへ書き込む）
    loop {
        Timer::after(Duration::from_millis(100)).await;
    }
}
