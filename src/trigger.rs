//! サンプリングトリガ選択
//!
//! ADC変換を起動するタイマーイベントの選択。レジスタ操作はファームウェア側で行い、
//! ここではモードごとの設定値だけを扱います。

use crate::config::{timer_reload, ConfigError};

/// ADC変換トリガ源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerMode {
    /// モーターPWMタイマー（TIM1 CC1）
    PwmTimer,
    /// サブタイマー（TIM2 CC2）
    SecondaryTimer,
    /// 専用フリーランタイマー（TIM3 TRGO）
    #[default]
    DedicatedTimer,
}

/// 起動するタイマー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerTimer {
    Tim1,
    Tim2,
    Tim3,
}

impl TriggerMode {
    /// ADC12 EXTSELコード（STM32G4）
    pub const fn extsel(self) -> u8 {
        match self {
            TriggerMode::PwmTimer => 0,
            TriggerMode::SecondaryTimer => 3,
            TriggerMode::DedicatedTimer => 4,
        }
    }

    pub const fn timer(self) -> TriggerTimer {
        match self {
            TriggerMode::PwmTimer => TriggerTimer::Tim1,
            TriggerMode::SecondaryTimer => TriggerTimer::Tim2,
            TriggerMode::DedicatedTimer => TriggerTimer::Tim3,
        }
    }

    /// タイマーを外部（PWM制御側）が起動するか
    ///
    /// trueの場合、PWMチャネルが止まると変換も止まる
    pub const fn requires_external_timer(self) -> bool {
        matches!(self, TriggerMode::PwmTimer)
    }

    /// 自前で起動するタイマーのARR値
    ///
    /// PWMタイマーは外部管理なので`None`
    pub fn reload(self, timer_clock_hz: u32, rate_hz: u32) -> Result<Option<u32>, ConfigError> {
        if self.requires_external_timer() {
            return Ok(None);
        }
        timer_reload(timer_clock_hz, rate_hz).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_dedicated_timer() {
        assert_eq!(TriggerMode::default(), TriggerMode::DedicatedTimer);
    }

    #[test]
    fn test_extsel_codes() {
        assert_eq!(TriggerMode::PwmTimer.extsel(), 0);
        assert_eq!(TriggerMode::SecondaryTimer.extsel(), 3);
        assert_eq!(TriggerMode::DedicatedTimer.extsel(), 4);
    }

    #[test]
    fn test_timer_selection() {
        assert_eq!(TriggerMode::PwmTimer.timer(), TriggerTimer::Tim1);
        assert_eq!(TriggerMode::SecondaryTimer.timer(), TriggerTimer::Tim2);
        assert_eq!(TriggerMode::DedicatedTimer.timer(), TriggerTimer::Tim3);
        assert!(TriggerMode::PwmTimer.requires_external_timer());
        assert!(!TriggerMode::DedicatedTimer.requires_external_timer());
    }

    #[test]
    fn test_reload() {
        assert_eq!(
            TriggerMode::DedicatedTimer.reload(170_000_000, 18_000),
            Ok(Some(9443))
        );
        assert_eq!(TriggerMode::PwmTimer.reload(170_000_000, 18_000), Ok(None));
        assert!(TriggerMode::SecondaryTimer.reload(170_000_000, 0).is_err());
    }
}
