//! 電流オフセットキャリブレーション
//!
//! 起動直後のNサイクルはロータ状態を更新せず、電流センサ生値を指数平滑して
//! ゼロ電流オフセットを求めます。カウンタは一度0になると再始動まで戻りません。

use crate::capture::RawSample;
use crate::config::CURRENT_SHIFT;

/// 1サイクル分のキャリブレーション結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationStep {
    /// まだサンプルが残っている
    InProgress,
    /// このサイクルで最後のサンプルを取り込んだ
    Finished,
}

/// 電流オフセット推定器
pub struct CalibrationEstimator {
    /// 残りサンプル数
    remaining: u32,
    /// A相電流（固定小数点、平滑中）
    ia: i32,
    /// B相電流（固定小数点、平滑中）
    ib: i32,
}

impl CalibrationEstimator {
    /// 新しい推定器を作成
    ///
    /// # 引数
    /// * `samples` - 平滑に使うサンプル数（0なら即完了）
    pub fn new(samples: u32) -> Self {
        Self {
            remaining: samples,
            ia: 0,
            ib: 0,
        }
    }

    /// キャリブレーション中かどうか
    #[inline(always)]
    pub fn is_calibrating(&self) -> bool {
        self.remaining > 0
    }

    /// 残りサンプル数
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// 1サンプル取り込む
    ///
    /// `I ← ((raw << 4) + I) / 2` で平滑します。完了済みなら何もしません。
    pub fn update(&mut self, sample: &RawSample) -> CalibrationStep {
        if self.remaining == 0 {
            return CalibrationStep::Finished;
        }

        self.remaining -= 1;
        self.ia = smooth(self.ia, sample.ia);
        self.ib = smooth(self.ib, sample.ib);

        if self.remaining == 0 {
            info!(
                "Current offset calibration finished: Ia={}, Ib={}",
                self.ia, self.ib
            );
            CalibrationStep::Finished
        } else {
            CalibrationStep::InProgress
        }
    }

    /// 平滑後のA相電流（固定小数点）
    pub fn ia(&self) -> i32 {
        self.ia
    }

    /// 平滑後のB相電流（固定小数点）
    pub fn ib(&self) -> i32 {
        self.ib
    }
}

/// 係数1/2の指数平滑
#[inline(always)]
fn smooth(prev: i32, raw: u16) -> i32 {
    (((raw as i32) << CURRENT_SHIFT) + prev) / 2
}
