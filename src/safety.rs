//! 安全監視
//!
//! サイクルごとに同期的に評価される異常検出の拡張ポイントです。
//! 検出結果は状態に記録されるだけで、推定処理は止めません（PWM遮断は外部制御ループの責務）。

use crate::capture::RawSample;
use crate::config::{safety, CURRENT_SHIFT};
use crate::state::{Fault, MotorState, Status};

/// 1サイクルごとの安全チェック
///
/// ISRから呼ばれるため、ブロッキングや動的確保は不可
pub trait SafetyMonitor {
    /// 異常があれば返す
    fn check(&mut self, sample: &RawSample, state: &MotorState) -> Option<Fault>;
}

/// 何も検出しないモニタ（デフォルト）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl SafetyMonitor for NoopMonitor {
    #[inline(always)]
    fn check(&mut self, _sample: &RawSample, _state: &MotorState) -> Option<Fault> {
        None
    }
}

/// 2つのモニタを順に評価（先に検出した方を返す）
impl<A: SafetyMonitor, B: SafetyMonitor> SafetyMonitor for (A, B) {
    #[inline(always)]
    fn check(&mut self, sample: &RawSample, state: &MotorState) -> Option<Fault> {
        let first = self.0.check(sample, state);
        let second = self.1.check(sample, state);
        first.or(second)
    }
}

/// 相電流リミット監視
///
/// オフセット補正後の電流（固定小数点）の絶対値がリミットを超えたら異常。
/// オフセットが確定するまで（キャリブレーション中）は評価しません。
#[derive(Debug, Clone, Copy)]
pub struct CurrentLimitMonitor {
    limit: i32,
}

impl CurrentLimitMonitor {
    /// # 引数
    /// * `limit` - 固定小数点（生値 << 4）でのリミット
    pub const fn new(limit: i32) -> Self {
        Self { limit }
    }
}

impl Default for CurrentLimitMonitor {
    fn default() -> Self {
        Self::new(safety::DEFAULT_CURRENT_LIMIT)
    }
}

impl SafetyMonitor for CurrentLimitMonitor {
    fn check(&mut self, sample: &RawSample, state: &MotorState) -> Option<Fault> {
        if state.status == Status::Calibrating || state.calib_remaining > 0 {
            return None;
        }
        let ia = ((sample.ia as i32) << CURRENT_SHIFT) - state.offset_a;
        let ib = ((sample.ib as i32) << CURRENT_SHIFT) - state.offset_b;
        if ia.abs() > self.limit || ib.abs() > self.limit {
            Some(Fault::Overcurrent)
        } else {
            None
        }
    }
}

/// バス電圧監視パラメータ
#[derive(Debug, Clone, Copy)]
pub struct BusVoltageConfig {
    /// 分圧抵抗の上側 [Ω]
    pub r_upper: f32,
    /// 分圧抵抗の下側 [Ω]
    pub r_lower: f32,
    /// ADC分解能（12ビット = 4096）
    pub adc_max: u16,
    /// ADC基準電圧 [V]
    pub vref: f32,
    /// 過電圧しきい値 [V]
    pub overvoltage_threshold: f32,
    /// 低電圧しきい値 [V]
    pub undervoltage_threshold: f32,
    /// ローパスフィルタのシフト量（α = 1/2^n）
    pub filter_shift: u32,
}

impl Default for BusVoltageConfig {
    fn default() -> Self {
        Self {
            r_upper: safety::BUS_R_UPPER,
            r_lower: safety::BUS_R_LOWER,
            adc_max: safety::ADC_MAX,
            vref: safety::ADC_VREF,
            overvoltage_threshold: safety::DEFAULT_OVERVOLTAGE,
            undervoltage_threshold: safety::DEFAULT_UNDERVOLTAGE,
            filter_shift: safety::BUS_FILTER_SHIFT,
        }
    }
}

impl BusVoltageConfig {
    /// バス電圧 [V] をADCカウントに換算
    pub fn volts_to_counts(&self, volts: f32) -> u16 {
        // V_adc = V_bus * R_lower / (R_upper + R_lower)
        let v_adc = volts * self.r_lower / (self.r_upper + self.r_lower);
        let counts = v_adc / self.vref * self.adc_max as f32;
        let full_scale = self.adc_max.saturating_sub(1);
        if counts <= 0.0 {
            0
        } else if counts >= full_scale as f32 {
            full_scale
        } else {
            // NaN（vref = 0など）は0になる
            counts as u16
        }
    }
}

/// バス電圧監視（補助チャネル）
///
/// しきい値は構築時にADCカウントへ換算し、ISR内は整数演算のみ
#[derive(Debug, Clone, Copy)]
pub struct BusVoltageMonitor {
    overvoltage_counts: i32,
    undervoltage_counts: i32,
    filter_shift: u32,
    /// フィルタ済みADC値（<< filter_shift）
    filtered: i32,
    primed: bool,
}

impl BusVoltageMonitor {
    pub fn new(config: BusVoltageConfig) -> Self {
        Self {
            overvoltage_counts: config.volts_to_counts(config.overvoltage_threshold) as i32,
            undervoltage_counts: config.volts_to_counts(config.undervoltage_threshold) as i32,
            filter_shift: config.filter_shift,
            filtered: 0,
            primed: false,
        }
    }

    /// フィルタ済みADC値
    pub fn filtered_counts(&self) -> i32 {
        self.filtered >> self.filter_shift
    }
}

impl Default for BusVoltageMonitor {
    fn default() -> Self {
        Self::new(BusVoltageConfig::default())
    }
}

impl SafetyMonitor for BusVoltageMonitor {
    fn check(&mut self, sample: &RawSample, _state: &MotorState) -> Option<Fault> {
        let raw = (sample.aux as i32) << self.filter_shift;
        if self.primed {
            // filtered += (raw - filtered) / 2^n
            self.filtered += (raw - self.filtered) >> self.filter_shift;
        } else {
            // 初回は生値で初期化（起動時の誤検出防止）
            self.filtered = raw;
            self.primed = true;
        }

        let counts = self.filtered_counts();
        if counts > self.overvoltage_counts {
            Some(Fault::BusOvervoltage)
        } else if counts < self.undervoltage_counts {
            Some(Fault::BusUndervoltage)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_state(offset: i32) -> MotorState {
        let mut state = MotorState::new(0);
        state.status = Status::Ready;
        state.offset_a = offset;
        state.offset_b = offset;
        state
    }

    fn sample(ia: u16, ib: u16, aux: u16) -> RawSample {
        RawSample { ia, ib, aux }
    }

    #[test]
    fn test_noop_never_faults() {
        let mut monitor = NoopMonitor;
        assert_eq!(monitor.check(&sample(4095, 0, 0), &ready_state(0)), None);
    }

    #[test]
    fn test_current_limit() {
        let offset = 2048 << CURRENT_SHIFT;
        let mut monitor = CurrentLimitMonitor::new(100 << CURRENT_SHIFT);
        let state = ready_state(offset);

        assert_eq!(monitor.check(&sample(2100, 2000, 0), &state), None);
        assert_eq!(
            monitor.check(&sample(2200, 2048, 0), &state),
            Some(Fault::Overcurrent)
        );
        assert_eq!(
            monitor.check(&sample(2048, 1900, 0), &state),
            Some(Fault::Overcurrent)
        );
    }

    #[test]
    fn test_current_limit_inactive_while_calibrating() {
        let mut monitor = CurrentLimitMonitor::new(0);
        let state = MotorState::new(10);
        assert_eq!(monitor.check(&sample(4095, 4095, 0), &state), None);
    }

    #[test]
    fn test_volts_to_counts() {
        let config = BusVoltageConfig::default();
        // 24V * 3.3k / 36.6k = 2.164V -> 2686 counts
        let counts = config.volts_to_counts(24.0);
        assert!((2680..=2690).contains(&counts));
        assert_eq!(config.volts_to_counts(-1.0), 0);
        assert_eq!(config.volts_to_counts(1000.0), 4095);
    }

    #[test]
    fn test_volts_to_counts_degenerate_config() {
        let config = BusVoltageConfig {
            adc_max: 0,
            vref: 0.0,
            ..BusVoltageConfig::default()
        };
        assert_eq!(config.volts_to_counts(24.0), 0);
        assert_eq!(config.volts_to_counts(-1.0), 0);

        let config = BusVoltageConfig {
            adc_max: 0,
            ..BusVoltageConfig::default()
        };
        assert_eq!(config.volts_to_counts(24.0), 0);
        let _ = BusVoltageMonitor::new(config);
    }

    #[test]
    fn test_bus_voltage_thresholds() {
        let config = BusVoltageConfig::default();
        let nominal = config.volts_to_counts(24.0);
        let high = config.volts_to_counts(33.0);
        let low = config.volts_to_counts(5.0);
        let state = ready_state(0);

        let mut monitor = BusVoltageMonitor::new(config);
        assert_eq!(monitor.check(&sample(0, 0, nominal), &state), None);

        let mut monitor = BusVoltageMonitor::new(config);
        assert_eq!(
            monitor.check(&sample(0, 0, high), &state),
            Some(Fault::BusOvervoltage)
        );

        let mut monitor = BusVoltageMonitor::new(config);
        assert_eq!(
            monitor.check(&sample(0, 0, low), &state),
            Some(Fault::BusUndervoltage)
        );
    }

    #[test]
    fn test_bus_voltage_filter_rejects_single_spike() {
        let config = BusVoltageConfig::default();
        let nominal = config.volts_to_counts(24.0);
        let spike = config.volts_to_counts(36.0);
        let state = ready_state(0);

        let mut monitor = BusVoltageMonitor::new(config);
        monitor.check(&sample(0, 0, nominal), &state);
        assert_eq!(monitor.check(&sample(0, 0, spike), &state), None);

        // 持続すれば検出する
        let mut tripped = false;
        for _ in 0..200 {
            tripped |= monitor.check(&sample(0, 0, spike), &state).is_some();
        }
        assert!(tripped);
    }

    #[test]
    fn test_tuple_returns_first_fault() {
        let mut monitor = (CurrentLimitMonitor::new(0), BusVoltageMonitor::default());
        let state = ready_state(0);
        assert_eq!(
            monitor.check(&sample(100, 0, 0), &state),
            Some(Fault::Overcurrent)
        );

        let mut monitor = (NoopMonitor, BusVoltageMonitor::default());
        assert_eq!(
            monitor.check(&sample(0, 0, 0), &state),
            Some(Fault::BusUndervoltage)
        );
    }
}
