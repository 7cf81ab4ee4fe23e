//! グローバル共有状態
//!
//! サイクルハンドラ（ADC1_2割り込み）が唯一の書き込み側で、
//! スレッドモードのタスクや外部制御ループは読み出し専用です。
//! 割り込みと共有するためMutexではなくアトミックで受け渡します。

use g4_hall_sense::{DutyCommand, SharedMotorState};

/// モーター状態のスナップショット（シーケンスロック）
pub static MOTOR_STATE: SharedMotorState = SharedMotorState::new();

/// 外部制御ループからのデューティ指令（符号が回転方向）
pub static DUTY: DutyCommand = DutyCommand::new();
