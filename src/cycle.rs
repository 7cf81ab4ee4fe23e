//! サイクルハンドラ
//!
//! キャプチャ完了イベント1回ごとに呼ばれ、安全監視 → キャリブレーション または
//! セクタートラッキング → 相電流再構成 → スナップショット公開 を行います。
//!
//! ハードウェアとの接点はすべて同期トレイト経由で、呼び出しグラフに`async`や
//! 待ちの発生するロックは含まれません。

use crate::calibration::{CalibrationEstimator, CalibrationStep};
use crate::capture::RawSample;
use crate::config::{SenseConfig, CURRENT_SHIFT};
use crate::hall::HallPattern;
use crate::phase_current::block_phase_current;
use crate::safety::SafetyMonitor;
use crate::state::{DutyCommand, Fault, MotorState, SharedMotorState, Status};
use crate::tracker::{RotorSectorTracker, SectorEdge};

/// キャプチャパイプライン側の操作
pub trait CaptureSource {
    /// 完了フラグをクリア
    fn acknowledge(&mut self);

    /// 最新サンプル（サイクルが揃っていなければ`None`）
    fn sample(&mut self) -> Option<RawSample>;

    /// Hallピンを読み取る
    fn hall(&mut self) -> HallPattern;
}

/// 回転カウンタ更新時にトグルするデバッグ出力
pub trait EdgeIndicator {
    fn toggle(&mut self);
}

/// 1サイクルの処理結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleOutcome {
    pub status: Status,
    pub edge: SectorEdge,
    pub fault: Option<Fault>,
}

/// サイクルハンドラ（ISRが所有する唯一の書き込み側）
pub struct CycleHandler<M> {
    monitor: M,
    calibration: CalibrationEstimator,
    tracker: RotorSectorTracker,
    state: MotorState,
    /// キャリブレーション後の初回トラッキングを済ませたか
    seeded: bool,
}

impl<M: SafetyMonitor> CycleHandler<M> {
    pub fn new(config: &SenseConfig, monitor: M) -> Self {
        Self {
            monitor,
            calibration: CalibrationEstimator::new(config.calibration_samples),
            tracker: RotorSectorTracker::new(config),
            state: MotorState::new(config.calibration_samples),
            seeded: false,
        }
    }

    /// 現在の状態
    pub fn state(&self) -> &MotorState {
        &self.state
    }

    /// 完了イベント1回分の処理
    ///
    /// 1. 完了フラグをクリア
    /// 2. サンプルとHallを取得して[`Self::process`]
    /// 3. 回転カウンタが動いたらインジケータをトグル
    /// 4. スナップショット公開
    ///
    /// DMAがサイクルを書き終えていなければ、そのサイクルは捨ててオーバーランとして数えます。
    pub fn service<S, E>(
        &mut self,
        source: &mut S,
        duty: &DutyCommand,
        indicator: &mut E,
        shared: &SharedMotorState,
    ) -> Option<CycleOutcome>
    where
        S: CaptureSource,
        E: EdgeIndicator,
    {
        source.acknowledge();

        let outcome = match source.sample() {
            Some(sample) => {
                let hall = source.hall();
                let outcome = self.process(&sample, hall, duty.get());
                if outcome.edge.is_wrap() {
                    indicator.toggle();
                }
                Some(outcome)
            }
            None => {
                self.state.overruns = self.state.overruns.wrapping_add(1);
                None
            }
        };

        shared.publish(&self.state);
        outcome
    }

    /// 1サンプル分の推定処理
    ///
    /// # 引数
    /// * `sample` - ADC生値
    /// * `hall` - このサイクルで読んだHallパターン
    /// * `duty` - 外部制御ループのデューティ指令（符号のみ使用）
    pub fn process(&mut self, sample: &RawSample, hall: HallPattern, duty: i32) -> CycleOutcome {
        self.state.cycles = self.state.cycles.wrapping_add(1);
        self.state.pwm_now = duty;
        self.state.aux = sample.aux;

        let fault = self.monitor.check(sample, &self.state);
        if fault != self.state.fault {
            match fault {
                Some(f) => error!("Safety monitor fault: {}", f),
                None => info!("Safety monitor fault cleared"),
            }
            self.state.fault = fault;
        }

        let edge = if self.calibration.is_calibrating() {
            self.calibrate(sample, hall, duty);
            SectorEdge::None
        } else {
            self.track(sample, hall, duty)
        };

        CycleOutcome {
            status: self.state.status,
            edge,
            fault,
        }
    }

    fn calibrate(&mut self, sample: &RawSample, hall: HallPattern, duty: i32) {
        let step = self.calibration.update(sample);
        self.state.ia = self.calibration.ia();
        self.state.ib = self.calibration.ib();
        self.state.calib_remaining = self.calibration.remaining();
        self.state.status = Status::CalibrationDone;

        if step == CalibrationStep::Finished {
            self.state.offset_a = self.calibration.ia();
            self.state.offset_b = self.calibration.ib();
            // 完了サイクルで角度を確定させる
            self.seed_tracker(hall, duty);
        }
    }

    fn seed_tracker(&mut self, hall: HallPattern, duty: i32) {
        self.tracker.seed(hall, duty);
        self.seeded = true;
        self.copy_tracker();
    }

    fn copy_tracker(&mut self) {
        self.state.sector_now = self.tracker.sector_now();
        self.state.sector_last = self.tracker.sector_last();
        self.state.sector_counter = self.tracker.sector_counter();
        self.state.angle = self.tracker.angle();
    }

    fn track(&mut self, sample: &RawSample, hall: HallPattern, duty: i32) -> SectorEdge {
        self.state.ia = (sample.ia as i32) << CURRENT_SHIFT;
        self.state.ib = (sample.ib as i32) << CURRENT_SHIFT;

        // キャリブレーション無し（N=0）の場合は初回トラッキングで確定
        let edge = if self.seeded {
            self.tracker.update(hall, duty)
        } else {
            self.tracker.seed(hall, duty);
            self.seeded = true;
            SectorEdge::None
        };

        let hall_fault = !hall.is_valid();
        if hall_fault && !self.state.hall_fault {
            warn!("Invalid hall pattern: {}", hall.bits());
        }
        self.state.hall_fault = hall_fault;

        self.copy_tracker();
        self.state.phase_current = block_phase_current(
            self.state.sector_now,
            self.state.ia - self.state.offset_a,
            self.state.ib - self.state.offset_b,
        );
        self.state.status = Status::Ready;

        edge
    }
}
