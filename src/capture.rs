//! ADCサンプルバッファ
//!
//! 変換ごとのイベント（下位）とサイクル完了イベント（上位）の2段構成をモデル化します。
//! ハードウェアではDMAが下位側を担当し、上位側は[`RawSample::from_slots`]でDMAバッファを読み出します。

use crate::config::CAPTURE_CHANNELS;

/// 1サイクル分のADC生値
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    /// ランク1: A相電流センス
    pub ia: u16,
    /// ランク2: B相電流センス
    pub ib: u16,
    /// ランク3: 補助チャネル（バス電圧センス）
    pub aux: u16,
}

impl RawSample {
    /// ランク順のバッファから作成
    #[inline(always)]
    pub const fn from_slots(slots: [u16; CAPTURE_CHANNELS]) -> Self {
        Self {
            ia: slots[0],
            ib: slots[1],
            aux: slots[2],
        }
    }
}

/// 3スロットの変換結果バッファ
pub struct CaptureBuffer {
    slots: [u16; CAPTURE_CHANNELS],
    /// 次に書き込むランク
    next: usize,
}

impl CaptureBuffer {
    pub const fn new() -> Self {
        Self {
            slots: [0; CAPTURE_CHANNELS],
            next: 0,
        }
    }

    /// 変換1回分の結果を格納（変換完了イベント）
    ///
    /// サイクル完了前に4回目以降の変換が来た場合は最終スロットを上書きします。
    #[inline(always)]
    pub fn on_conversion(&mut self, value: u16) {
        let rank = self.next.min(CAPTURE_CHANNELS - 1);
        self.slots[rank] = value;
        self.next = self.next.saturating_add(1);
    }

    /// サイクル完了イベント
    ///
    /// 全ランクが揃っていればサンプルを返し、次のサイクルに向けて再アームします。
    /// 揃っていなければ`None`（そのサイクルは破棄）。
    pub fn take_cycle(&mut self) -> Option<RawSample> {
        let complete = self.next == CAPTURE_CHANNELS;
        self.next = 0;
        if complete {
            Some(RawSample::from_slots(self.slots))
        } else {
            None
        }
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new()
    }
}
