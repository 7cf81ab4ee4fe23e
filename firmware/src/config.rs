//! ファームウェア設定パラメータ
//!
//! 推定ロジック側のデフォルト値は`g4_hall_sense::config`にあり、
//! ここではペリフェラル・ピン・タイミングに関する定数を定義します。

use g4_hall_sense::config::sampling::DEFAULT_SAMPLE_RATE_HZ;
use g4_hall_sense::TriggerMode;

/// システムクロック [Hz]（HSI → PLL）
pub const CPU_CLOCK_HZ: u32 = 170_000_000;

/// TIM2/TIM3のカウンタクロック [Hz]（APB1プリスケーラ=1）
pub const TIMER_CLOCK_HZ: u32 = 170_000_000;

/// ADCサンプリング周波数 [Hz]（約28µs周期）
pub const SAMPLE_RATE_HZ: u32 = DEFAULT_SAMPLE_RATE_HZ;

/// ADC変換トリガ源
pub const TRIGGER_MODE: TriggerMode = TriggerMode::DedicatedTimer;

/// ADC設定
pub mod adc {
    /// ランク1: A相電流（PA0 = ADC1_IN1）
    pub const CHANNEL_IA: u8 = 1;
    /// ランク2: B相電流（PA1 = ADC1_IN2）
    pub const CHANNEL_IB: u8 = 2;
    /// ランク3: バス電圧（PC1 = ADC12_IN7）
    pub const CHANNEL_AUX: u8 = 7;

    /// DMAMUXリクエストID（ADC1）
    pub const DMAMUX_REQUEST_ADC1: u8 = 5;

    /// 電圧レギュレータ起動待ち [µs]（データシート t_ADCVREG_STUP = 20µs）
    pub const REGULATOR_STARTUP_US: u64 = 20;

    /// キャリブレーション完了・ADRDY待ちのポーリング上限
    pub const READY_POLL_LIMIT: u32 = 100_000;
}

/// 割り込み優先度（上位4ビットのみ有効）
pub mod irq {
    /// ADC1_2（サイクルハンドラ）: 最高優先度
    pub const ADC_PRIORITY: u8 = 0x00;
}

/// ピン割り当て
pub mod pins {
    /// Hallセンサー入力（GPIOB）
    pub const HALL_H1: usize = 6;
    pub const HALL_H2: usize = 7;
    pub const HALL_H3: usize = 8;
}

/// テレメトリ
pub mod telemetry {
    /// スナップショット出力周期 [ms]
    pub const PERIOD_MS: u64 = 1000;
}

/// 起動時ベンチマークの反復回数
pub const BENCHMARK_ITERATIONS: u32 = 1000;
