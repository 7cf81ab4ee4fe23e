//! モーター状態と共有ハンドオフ
//!
//! サイクルハンドラ（ISR、唯一の書き込み側）が[`SharedMotorState`]へスナップショットを公開し、
//! 外部の転流ループ（読み出し側）はロックを取らずに読み出します。
//! 逆方向（デューティ指令）は[`DutyCommand`]で渡します。

use core::sync::atomic::{fence, AtomicBool, AtomicI32, AtomicU16, AtomicU32, AtomicU8, Ordering};

/// センシング状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// 起動直後（まだ1サイクルも処理していない）
    Calibrating,
    /// キャリブレーションのサンプルを取り込んだサイクル（N回すべて）
    CalibrationDone,
    /// 通常トラッキング中
    Ready,
}

impl Status {
    const fn to_bits(self) -> u8 {
        match self {
            Status::Calibrating => 0,
            Status::CalibrationDone => 1,
            Status::Ready => 2,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Status::Calibrating,
            1 => Status::CalibrationDone,
            _ => Status::Ready,
        }
    }
}

/// 安全監視が検出した異常
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// 相電流がリミットを超えた
    Overcurrent,
    /// バス電圧が上限を超えた
    BusOvervoltage,
    /// バス電圧が下限を下回った
    BusUndervoltage,
}

impl Fault {
    const fn to_bits(fault: Option<Fault>) -> u8 {
        match fault {
            None => 0,
            Some(Fault::Overcurrent) => 1,
            Some(Fault::BusOvervoltage) => 2,
            Some(Fault::BusUndervoltage) => 3,
        }
    }

    const fn from_bits(bits: u8) -> Option<Fault> {
        match bits {
            1 => Some(Fault::Overcurrent),
            2 => Some(Fault::BusOvervoltage),
            3 => Some(Fault::BusUndervoltage),
            _ => None,
        }
    }
}

/// 1サイクル分のモーター状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorState {
    /// A相電流（固定小数点、生値 << 4）
    pub ia: i32,
    /// B相電流（固定小数点、生値 << 4）
    pub ib: i32,
    /// A相ゼロ電流オフセット
    pub offset_a: i32,
    /// B相ゼロ電流オフセット
    pub offset_b: i32,
    /// 現在セクターの相電流（オフセット補正済み）
    pub phase_current: i32,
    /// 補助チャネル生値
    pub aux: u16,
    /// 現在のセクター
    pub sector_now: u8,
    /// 前回のセクター
    pub sector_last: u8,
    /// 回転カウンタ
    pub sector_counter: i32,
    /// 推定角度
    pub angle: i32,
    /// このサイクルで使ったデューティ指令
    pub pwm_now: i32,
    /// キャリブレーション残りサンプル数
    pub calib_remaining: u32,
    pub status: Status,
    /// 最新の安全監視結果
    pub fault: Option<Fault>,
    /// Hallパターン0/7を検出
    pub hall_fault: bool,
    /// 処理済みサイクル数（ラップアラウンド）
    pub cycles: u32,
    /// DMA未完了で破棄したサイクル数
    pub overruns: u32,
}

impl MotorState {
    pub const fn new(calib_samples: u32) -> Self {
        Self {
            ia: 0,
            ib: 0,
            offset_a: 0,
            offset_b: 0,
            phase_current: 0,
            aux: 0,
            sector_now: 0,
            sector_last: 0,
            sector_counter: 0,
            angle: 0,
            pwm_now: 0,
            calib_remaining: calib_samples,
            status: Status::Calibrating,
            fault: None,
            hall_fault: false,
            cycles: 0,
            overruns: 0,
        }
    }
}

/// スナップショット読み出しの最大リトライ回数
const SNAPSHOT_RETRIES: usize = 4;

/// シーケンス番号付きスナップショット（seqlock）
///
/// 書き込み中はシーケンスが奇数になります。書き込み側は待たず、
/// 読み出し側は前後のシーケンスが一致したときだけ一貫したスナップショットとみなします。
pub struct SharedMotorState {
    seq: AtomicU32,
    ia: AtomicI32,
    ib: AtomicI32,
    offset_a: AtomicI32,
    offset_b: AtomicI32,
    phase_current: AtomicI32,
    aux: AtomicU16,
    sector_now: AtomicU8,
    sector_last: AtomicU8,
    sector_counter: AtomicI32,
    angle: AtomicI32,
    pwm_now: AtomicI32,
    calib_remaining: AtomicU32,
    status: AtomicU8,
    fault: AtomicU8,
    hall_fault: AtomicBool,
    cycles: AtomicU32,
    overruns: AtomicU32,
}

impl SharedMotorState {
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            ia: AtomicI32::new(0),
            ib: AtomicI32::new(0),
            offset_a: AtomicI32::new(0),
            offset_b: AtomicI32::new(0),
            phase_current: AtomicI32::new(0),
            aux: AtomicU16::new(0),
            sector_now: AtomicU8::new(0),
            sector_last: AtomicU8::new(0),
            sector_counter: AtomicI32::new(0),
            angle: AtomicI32::new(0),
            pwm_now: AtomicI32::new(0),
            calib_remaining: AtomicU32::new(0),
            status: AtomicU8::new(Status::Calibrating.to_bits()),
            fault: AtomicU8::new(0),
            hall_fault: AtomicBool::new(false),
            cycles: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
        }
    }

    /// 状態を公開（書き込み側は1つだけ）
    pub fn publish(&self, state: &MotorState) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.ia.store(state.ia, Ordering::Relaxed);
        self.ib.store(state.ib, Ordering::Relaxed);
        self.offset_a.store(state.offset_a, Ordering::Relaxed);
        self.offset_b.store(state.offset_b, Ordering::Relaxed);
        self.phase_current.store(state.phase_current, Ordering::Relaxed);
        self.aux.store(state.aux, Ordering::Relaxed);
        self.sector_now.store(state.sector_now, Ordering::Relaxed);
        self.sector_last.store(state.sector_last, Ordering::Relaxed);
        self.sector_counter.store(state.sector_counter, Ordering::Relaxed);
        self.angle.store(state.angle, Ordering::Relaxed);
        self.pwm_now.store(state.pwm_now, Ordering::Relaxed);
        self.calib_remaining
            .store(state.calib_remaining, Ordering::Relaxed);
        self.status.store(state.status.to_bits(), Ordering::Relaxed);
        self.fault.store(Fault::to_bits(state.fault), Ordering::Relaxed);
        self.hall_fault.store(state.hall_fault, Ordering::Relaxed);
        self.cycles.store(state.cycles, Ordering::Relaxed);
        self.overruns.store(state.overruns, Ordering::Relaxed);

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// 一貫したスナップショットを1回だけ試みる
    ///
    /// 書き込みと重なった場合は`None`
    pub fn try_snapshot(&self) -> Option<MotorState> {
        let before = self.seq.load(Ordering::Acquire);
        if before & 1 == 1 {
            return None;
        }

        let state = self.read_fields();

        fence(Ordering::Acquire);
        let after = self.seq.load(Ordering::Relaxed);
        (before == after).then_some(state)
    }

    /// スナップショットを取得
    ///
    /// 数回リトライしても一貫した値が取れなければ、各フィールドをそのまま返します
    /// （フィールド間で異なるサイクルの値が混在しうる）。
    pub fn snapshot(&self) -> MotorState {
        for _ in 0..SNAPSHOT_RETRIES {
            if let Some(state) = self.try_snapshot() {
                return state;
            }
        }
        self.read_fields()
    }

    /// 公開回数（書き込み中は奇数）
    pub fn sequence(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }

    fn read_fields(&self) -> MotorState {
        MotorState {
            ia: self.ia.load(Ordering::Relaxed),
            ib: self.ib.load(Ordering::Relaxed),
            offset_a: self.offset_a.load(Ordering::Relaxed),
            offset_b: self.offset_b.load(Ordering::Relaxed),
            phase_current: self.phase_current.load(Ordering::Relaxed),
            aux: self.aux.load(Ordering::Relaxed),
            sector_now: self.sector_now.load(Ordering::Relaxed),
            sector_last: self.sector_last.load(Ordering::Relaxed),
            sector_counter: self.sector_counter.load(Ordering::Relaxed),
            angle: self.angle.load(Ordering::Relaxed),
            pwm_now: self.pwm_now.load(Ordering::Relaxed),
            calib_remaining: self.calib_remaining.load(Ordering::Relaxed),
            status: Status::from_bits(self.status.load(Ordering::Relaxed)),
            fault: Fault::from_bits(self.fault.load(Ordering::Relaxed)),
            hall_fault: self.hall_fault.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }
}

impl Default for SharedMotorState {
    fn default() -> Self {
        Self::new()
    }
}

/// デューティ指令（外部制御ループ → トラッカー）
///
/// 符号が回転方向として使われます。
pub struct DutyCommand(AtomicI32);

impl DutyCommand {
    pub const fn new() -> Self {
        Self(AtomicI32::new(0))
    }

    #[inline(always)]
    pub fn set(&self, duty: i32) {
        self.0.store(duty, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for DutyCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> MotorState {
        MotorState {
            ia: 32_000,
            ib: -1,
            offset_a: 31_900,
            offset_b: 32_100,
            phase_current: -200,
            aux: 1234,
            sector_now: 2,
            sector_last: 1,
            sector_counter: -3,
            angle: -960,
            pwm_now: -500,
            calib_remaining: 0,
            status: Status::Ready,
            fault: Some(Fault::BusUndervoltage),
            hall_fault: true,
            cycles: 99,
            overruns: 2,
        }
    }

    #[test]
    fn test_initial_snapshot() {
        let shared = SharedMotorState::new();
        let state = shared.snapshot();
        assert_eq!(state.status, Status::Calibrating);
        assert_eq!(state.fault, None);
        assert_eq!(shared.sequence(), 0);
    }

    #[test]
    fn test_publish_then_snapshot_roundtrip() {
        let shared = SharedMotorState::new();
        let state = sample_state();
        shared.publish(&state);
        assert_eq!(shared.try_snapshot(), Some(state));
        assert_eq!(shared.sequence(), 2);
    }

    #[test]
    fn test_write_in_progress_is_rejected() {
        let shared = SharedMotorState::new();
        shared.publish(&sample_state());
        // 書き込み途中を再現
        shared.seq.store(3, Ordering::Relaxed);
        assert_eq!(shared.try_snapshot(), None);
        // リトライ後も取れなければフィールドをそのまま返す
        assert_eq!(shared.snapshot(), sample_state());
    }

    #[test]
    fn test_concurrent_reader_never_sees_mixed_cycle() {
        use std::sync::Arc;

        let shared = Arc::new(SharedMotorState::new());
        let writer = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                let mut state = MotorState::new(0);
                for i in 0..20_000 {
                    state.angle = i;
                    state.sector_counter = i;
                    state.cycles = i as u32;
                    shared.publish(&state);
                }
            })
        };

        for _ in 0..20_000 {
            if let Some(state) = shared.try_snapshot() {
                assert_eq!(state.angle, state.sector_counter);
                assert_eq!(state.cycles, state.angle as u32);
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_duty_command() {
        let duty = DutyCommand::new();
        assert_eq!(duty.get(), 0);
        duty.set(-750);
        assert_eq!(duty.get(), -750);
    }

    #[test]
    fn test_status_and_fault_encoding() {
        for status in [Status::Calibrating, Status::CalibrationDone, Status::Ready] {
            assert_eq!(Status::from_bits(status.to_bits()), status);
        }
        for fault in [
            None,
            Some(Fault::Overcurrent),
            Some(Fault::BusOvervoltage),
            Some(Fault::BusUndervoltage),
        ] {
            assert_eq!(Fault::from_bits(Fault::to_bits(fault)), fault);
        }
    }
}
