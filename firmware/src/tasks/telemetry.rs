//! テレメトリタスク
//!
//! 共有スナップショットを定期的に読み出してログに出力します。

use embassy_time::{Duration, Ticker};
use g4_hall_sense::{MotorState, Status};

use crate::config;
use crate::state::MOTOR_STATE;

/// テレメトリタスク - モーター状態を1秒ごとに出力
#[embassy_executor::task]
pub async fn telemetry_task() {
    info!("Telemetry task started");

    let mut ticker = Ticker::every(Duration::from_millis(config::telemetry::PERIOD_MS));
    let mut last_status = Status::Calibrating;
    let mut last_overruns = 0u32;
    let mut last_cycles = 0u32;

    loop {
        ticker.next().await;

        // 書き込み中に当たった場合は次の周期で読む
        let Some(state) = MOTOR_STATE.try_snapshot() else {
            trace!("Snapshot busy, skipping");
            continue;
        };

        if state.status != last_status {
            info!("Status: {} -> {}", last_status, state.status);
            if state.status == Status::Ready {
                info!(
                    "Current offsets: A={}, B={}",
                    state.offset_a, state.offset_b
                );
            }
            last_status = state.status;
        }

        if state.overruns != last_overruns {
            warn!(
                "Capture overruns: {} (+{})",
                state.overruns,
                state.overruns.wrapping_sub(last_overruns)
            );
            last_overruns = state.overruns;
        }

        let rate = state.cycles.wrapping_sub(last_cycles);
        last_cycles = state.cycles;
        log_state(&state, rate);
    }
}

fn log_state(state: &MotorState, rate: u32) {
    debug!(
        "[{}Hz] hall={} last={} counter={} angle={} pwm={}",
        rate,
        state.sector_now,
        state.sector_last,
        state.sector_counter,
        state.angle,
        state.pwm_now
    );
    debug!(
        "  Ia={} Ib={} I_phase={} aux={} fault={} hall_fault={}",
        state.ia,
        state.ib,
        state.phase_current,
        state.aux,
        state.fault,
        state.hall_fault
    );
}
