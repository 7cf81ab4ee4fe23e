//! センシングパラメータ
//!
//! 角度スケール、キャリブレーション長、サンプリング周期などのデフォルト値と、
//! 実行時に差し替え可能な[`SenseConfig`]を提供します。

/// 1電気回転あたりの角度単位（セクターカウンタ1つ分）
pub const DEFAULT_SECTOR_SIZE: i32 = 360;

/// Hallセクター1ステップあたりの角度単位（60°電気角）
pub const DEFAULT_STEP_SIZE: i32 = 60;

/// 起動時の電流オフセットキャリブレーションに使うサンプル数
pub const DEFAULT_CALIBRATION_SAMPLES: u32 = 1024;

/// 電流値の固定小数点シフト量（生値 << 4）
pub const CURRENT_SHIFT: u32 = 4;

/// 1サイクルで変換するADCチャネル数（Va, Vb, Vaux）
pub const CAPTURE_CHANNELS: usize = 3;

/// Hallセクター数
pub const SECTOR_COUNT: i32 = 6;

/// サンプリング周期の設定
pub mod sampling {
    /// 目標サンプリング周波数 [Hz]（約28μs周期）
    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 18_000;
}

/// 安全監視のデフォルトしきい値
pub mod safety {
    /// 電流リミット（固定小数点、オフセット補正後の絶対値）
    /// 12ビットADCの約半分のスイング
    pub const DEFAULT_CURRENT_LIMIT: i32 = 1800 << super::CURRENT_SHIFT;

    /// 12ビットADCのフルスケール
    pub const ADC_MAX: u16 = 4096;

    /// ADC基準電圧 [V]
    pub const ADC_VREF: f32 = 3.3;

    /// バス電圧分圧抵抗 上側 [Ω]
    pub const BUS_R_UPPER: f32 = 33_300.0;

    /// バス電圧分圧抵抗 下側 [Ω]
    pub const BUS_R_LOWER: f32 = 3_300.0;

    /// 過電圧しきい値 [V]
    pub const DEFAULT_OVERVOLTAGE: f32 = 30.0;

    /// 低電圧しきい値 [V]
    pub const DEFAULT_UNDERVOLTAGE: f32 = 10.0;

    /// バス電圧ローパスフィルタのシフト量（α = 1/2^n）
    pub const BUS_FILTER_SHIFT: u32 = 4;
}

/// 設定値の検証エラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// ステップサイズが0以下
    NonPositiveStepSize,

    /// セクターサイズが6ステップ分より小さい
    SectorSizeTooSmall,

    /// サンプリング周波数が0、またはタイマークロックより高い
    InvalidSampleRate,
}

/// センシングの実行時設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SenseConfig {
    /// 1回転分の角度単位
    pub sector_size: i32,
    /// 1セクター分の角度単位
    pub step_size: i32,
    /// キャリブレーションサンプル数（0でキャリブレーション省略）
    pub calibration_samples: u32,
}

impl SenseConfig {
    pub const fn new() -> Self {
        Self {
            sector_size: DEFAULT_SECTOR_SIZE,
            step_size: DEFAULT_STEP_SIZE,
            calibration_samples: DEFAULT_CALIBRATION_SAMPLES,
        }
    }

    /// 角度スケールの整合性をチェック
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_size <= 0 {
            return Err(ConfigError::NonPositiveStepSize);
        }
        if self.sector_size < self.step_size * SECTOR_COUNT {
            return Err(ConfigError::SectorSizeTooSmall);
        }
        Ok(())
    }
}

impl Default for SenseConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 目標周波数を得るためのタイマー自動リロード値（ARR）を計算
///
/// プリスケーラ0、アップカウント前提。`ARR = clock / rate - 1`
pub fn timer_reload(timer_clock_hz: u32, rate_hz: u32) -> Result<u32, ConfigError> {
    if rate_hz == 0 || rate_hz > timer_clock_hz {
        return Err(ConfigError::InvalidSampleRate);
    }
    Ok(timer_clock_hz / rate_hz - 1)
}

/// 1サンプル周期あたりに使えるCPUサイクル数
pub fn cycle_budget(cpu_clock_hz: u32, rate_hz: u32) -> u32 {
    if rate_hz == 0 {
        return 0;
    }
    cpu_clock_hz / rate_hz
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(SenseConfig::default().validate(), Ok(()));
        assert_eq!(SenseConfig::default().sector_size, 6 * DEFAULT_STEP_SIZE);
    }

    #[test]
    fn test_validate_rejects_bad_scales() {
        let mut config = SenseConfig::new();
        config.step_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveStepSize));

        config.step_size = 100;
        config.sector_size = 500;
        assert_eq!(config.validate(), Err(ConfigError::SectorSizeTooSmall));
    }

    #[test]
    fn test_timer_reload() {
        // 170MHz / 18kHz = 9444.4 -> ARR 9443
        assert_eq!(timer_reload(170_000_000, 18_000), Ok(9443));
        // 72MHz / 36kHz -> ARR 1999 (周期2000カウント)
        assert_eq!(timer_reload(72_000_000, 36_000), Ok(1999));
        assert_eq!(timer_reload(1_000, 0), Err(ConfigError::InvalidSampleRate));
        assert_eq!(timer_reload(1_000, 2_000), Err(ConfigError::InvalidSampleRate));
    }

    #[test]
    fn test_cycle_budget() {
        assert_eq!(cycle_budget(170_000_000, 18_000), 9444);
        assert_eq!(cycle_budget(170_000_000, 0), 0);
    }
}
