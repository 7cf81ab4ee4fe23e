//! ADCサンプリングパイプライン
//!
//! タイマーイベントでADC1の3チャネル変換を起動し、DMAでバッファへ転送、
//! シーケンス完了（EOS）割り込みでサイクルハンドラを実行します。
//!
//! ## ハードウェア構成
//! - ADC1: ランク1=IN1(PA0) 電流A、ランク2=IN2(PA1) 電流B、ランク3=IN7(PC1) バス電圧
//! - DMA1_CH1: DMAMUX経由でADC1に接続、サーキュラー、ハーフワード×3
//! - トリガ: TIM1_CC1 / TIM2_CC2 / TIM3_TRGO（立ち上がりエッジ）
//! - ADC1_2割り込み: EOSのみ有効（DMA割り込みは使わない）
//!
//! ## 動作原理
//! 1. トリガごとに3チャネルを順に変換、変換ごとにDMAが1ワード転送
//! 2. 3回目の変換でEOSが立ち、ADC1_2割り込みが発生
//! 3. DMAの残り転送数（NDTR）が3に戻っていればサイクル完了としてバッファを読む

use core::cell::{RefCell, UnsafeCell};
use core::sync::atomic::{compiler_fence, Ordering};

use embassy_stm32::gpio::Output;
use embassy_stm32::pac;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{block_for, Duration};
use g4_hall_sense::config::CAPTURE_CHANNELS;
use g4_hall_sense::safety::{BusVoltageMonitor, CurrentLimitMonitor};
use g4_hall_sense::{
    CaptureSource, ConfigError, CycleHandler, EdgeIndicator, HallPattern, RawSample, SenseConfig,
    TriggerMode, TriggerTimer,
};

use crate::config::{self, adc, irq, pins};
use crate::state::{DUTY, MOTOR_STATE};

/// サイクルハンドラで使う安全監視（相電流リミット + バス電圧）
pub type Monitor = (CurrentLimitMonitor, BusVoltageMonitor);

/// 初期化エラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// 設定値が不正
    Config(ConfigError),
    /// ADCセルフキャリブレーションが完了しない
    AdcCalibrationTimeout,
    /// ADRDYが立たない
    AdcReadyTimeout,
    /// DMAチャネルが使用中
    DmaBusy,
}

impl From<ConfigError> for InitError {
    fn from(e: ConfigError) -> Self {
        InitError::Config(e)
    }
}

/// DMA転送先バッファ
struct DmaBuffer(UnsafeCell<[u16; CAPTURE_CHANNELS]>);

// 書き込みはDMAのみ、CPUからの読み出しはADC1_2割り込みのみ
unsafe impl Sync for DmaBuffer {}

impl DmaBuffer {
    const fn new() -> Self {
        Self(UnsafeCell::new([0; CAPTURE_CHANNELS]))
    }

    fn address(&self) -> u32 {
        self.0.get() as u32
    }

    #[inline(always)]
    fn read(&self) -> [u16; CAPTURE_CHANNELS] {
        unsafe { core::ptr::read_volatile(self.0.get()) }
    }
}

static DMA_BUFFER: DmaBuffer = DmaBuffer::new();

/// 割り込みコンテキストが所有するもの一式
struct IsrContext {
    handler: CycleHandler<Monitor>,
    capture: PacCapture,
    led: DebugLed,
}

/// 起動後はADC1_2割り込みからのみアクセス
static ISR_CONTEXT: Mutex<CriticalSectionRawMutex, RefCell<Option<IsrContext>>> =
    Mutex::new(RefCell::new(None));

/// ADC1 + DMA1_CH1 + GPIOBのレジスタ直接アクセス
struct PacCapture;

impl CaptureSource for PacCapture {
    #[inline(always)]
    fn acknowledge(&mut self) {
        // EOSは1書き込みでクリア
        pac::ADC1.isr().write(|w| w.set_eos(true));
    }

    #[inline(always)]
    fn sample(&mut self) -> Option<RawSample> {
        // サーキュラーモードでは3転送ごとにNDTRが3へリロードされる
        let remaining = pac::DMA1.ch(0).ndtr().read().ndt();
        if remaining as usize != CAPTURE_CHANNELS {
            return None;
        }
        compiler_fence(Ordering::Acquire);
        Some(RawSample::from_slots(DMA_BUFFER.read()))
    }

    #[inline(always)]
    fn hall(&mut self) -> HallPattern {
        let idr = pac::GPIOB.idr().read();
        HallPattern::from_pins(
            idr.idr(pins::HALL_H1) as u8 != 0,
            idr.idr(pins::HALL_H2) as u8 != 0,
            idr.idr(pins::HALL_H3) as u8 != 0,
        )
    }
}

/// 回転カウンタ更新時にトグルするLED
struct DebugLed(Output<'static>);

impl EdgeIndicator for DebugLed {
    #[inline(always)]
    fn toggle(&mut self) {
        self.0.toggle();
    }
}

/// サンプリングパイプラインを起動
///
/// 1. 設定検証とサイクルハンドラの生成
/// 2. DMA → ADC の順に初期化
/// 3. ADC1_2割り込みを有効化し、変換待機を開始
/// 4. 選択したトリガタイマーを起動
///
/// # 引数
/// * `mode` - ADC変換トリガ源
/// * `led` - 回転インジケータ用LED
pub fn start(mode: TriggerMode, led: Output<'static>) -> Result<(), InitError> {
    info!(
        "Starting sampling pipeline: trigger={}, rate={}Hz",
        mode,
        config::SAMPLE_RATE_HZ
    );

    let sense = SenseConfig::default();
    sense.validate()?;
    let reload = mode.reload(config::TIMER_CLOCK_HZ, config::SAMPLE_RATE_HZ)?;

    let handler = CycleHandler::new(
        &sense,
        (CurrentLimitMonitor::default(), BusVoltageMonitor::default()),
    );
    ISR_CONTEXT.lock(|cell| {
        *cell.borrow_mut() = Some(IsrContext {
            handler,
            capture: PacCapture,
            led: DebugLed(led),
        });
    });

    unsafe {
        init_dma()?;
        init_adc(mode)?;
        enable_interrupt();
    }

    // 外部トリガ待機を開始
    pac::ADC1.cr().modify(|w| w.set_adstart(true));

    unsafe {
        start_trigger(mode, reload)?;
    }

    info!(
        "Sampling started: calibrating offsets over {} samples",
        sense.calibration_samples
    );
    Ok(())
}

/// 条件が成立するまでポーリング（上限付き）
fn wait_until(mut done: impl FnMut() -> bool, error: InitError) -> Result<(), InitError> {
    for _ in 0..adc::READY_POLL_LIMIT {
        if done() {
            return Ok(());
        }
    }
    error!("Init timeout: {}", error);
    Err(error)
}

/// DMA1_CH1初期化（ADC1 DR → DMA_BUFFER、サーキュラー）
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む
unsafe fn init_dma() -> Result<(), InitError> {
    let rcc = pac::RCC;
    rcc.ahb1enr().modify(|w| {
        w.set_dma1en(true);
        w.set_dmamux1en(true);
    });

    let ch = pac::DMA1.ch(0);
    if ch.cr().read().en() {
        return Err(InitError::DmaBusy);
    }

    // DMAMUX1 チャネル0 = DMA1 チャネル1
    pac::DMAMUX1
        .ccr(0)
        .write(|w| w.set_dmareq_id(adc::DMAMUX_REQUEST_ADC1));

    ch.par().write_value(pac::ADC1.dr().as_ptr() as u32);
    ch.mar().write_value(DMA_BUFFER.address());
    ch.ndtr().write(|w| w.set_ndt(CAPTURE_CHANNELS as u16));
    ch.cr().write(|w| {
        w.set_dir(pac::bdma::vals::Dir::FROM_PERIPHERAL);
        w.set_psize(pac::bdma::vals::Size::BITS16);
        w.set_msize(pac::bdma::vals::Size::BITS16);
        w.set_pinc(false);
        w.set_minc(true);
        w.set_circ(true);
        w.set_pl(pac::bdma::vals::Pl::VERY_HIGH);
        // 割り込みは使わない（EOSで処理）
        w.set_tcie(false);
        w.set_htie(false);
        w.set_en(true);
    });
    Ok(())
}

/// ADC1初期化（キャリブレーション、3チャネルシーケンス、外部トリガ、DMA）
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む
unsafe fn init_adc(mode: TriggerMode) -> Result<(), InitError> {
    let rcc = pac::RCC;
    let adc1 = pac::ADC1;

    rcc.ahb2enr().modify(|w| w.set_adc12en(true));

    // ディープパワーダウン解除、内部レギュレータ起動
    adc1.cr().modify(|w| {
        w.set_deeppwd(false);
        w.set_advregen(true);
    });
    block_for(Duration::from_micros(adc::REGULATOR_STARTUP_US));

    // シングルエンドでセルフキャリブレーション
    adc1.cr()
        .modify(|w| w.set_adcaldif(pac::adc::vals::Adcaldif::SINGLE_ENDED));
    adc1.cr().modify(|w| w.set_adcal(true));
    wait_until(|| !adc1.cr().read().adcal(), InitError::AdcCalibrationTimeout)?;

    // 有効化
    adc1.isr().write(|w| w.set_adrdy(true));
    adc1.cr().modify(|w| w.set_aden(true));
    wait_until(|| adc1.isr().read().adrdy(), InitError::AdcReadyTimeout)?;

    // 変換シーケンス（L = チャネル数 - 1）
    let channels = [adc::CHANNEL_IA, adc::CHANNEL_IB, adc::CHANNEL_AUX];
    adc1.sqr1().modify(|w| {
        w.set_l((CAPTURE_CHANNELS - 1) as u8);
        for (rank, ch) in channels.iter().enumerate() {
            w.set_sq(rank, *ch);
        }
    });
    // サンプリング時間 24.5サイクル（3チャネル合計 < 1µs @170MHz）
    for ch in channels {
        adc1.smpr()
            .modify(|w| w.set_smp(ch as usize, pac::adc::vals::SampleTime::CYCLES24_5));
    }

    adc1.cfgr().modify(|w| {
        w.set_cont(false);
        w.set_exten(pac::adc::vals::Exten::RISING_EDGE);
        w.set_extsel(mode.extsel());
        w.set_dmaen(pac::adc::vals::Dmaen::ENABLE);
        w.set_dmacfg(pac::adc::vals::Dmacfg::CIRCULAR);
        w.set_ovrmod(pac::adc::vals::Ovrmod::OVERWRITE);
    });

    // 古いフラグをクリアしてからEOS割り込みを有効化
    adc1.isr().write(|w| {
        w.set_eoc(true);
        w.set_eos(true);
        w.set_ovr(true);
    });
    adc1.ier().modify(|w| w.set_eosie(true));

    info!(
        "ADC1 ready: channels IN{}/IN{}/IN{}, EXTSEL={}",
        adc::CHANNEL_IA,
        adc::CHANNEL_IB,
        adc::CHANNEL_AUX,
        mode.extsel()
    );
    Ok(())
}

/// ADC1_2割り込みの優先度設定と有効化
///
/// # Safety
/// NVICへの直接アクセスを含む
unsafe fn enable_interrupt() {
    let mut cp = cortex_m::Peripherals::steal();
    cp.NVIC
        .set_priority(pac::Interrupt::ADC1_2, irq::ADC_PRIORITY);
    cortex_m::peripheral::NVIC::unpend(pac::Interrupt::ADC1_2);
    cortex_m::peripheral::NVIC::unmask(pac::Interrupt::ADC1_2);
}

/// トリガタイマーを起動
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む
unsafe fn start_trigger(mode: TriggerMode, reload: Option<u32>) -> Result<(), InitError> {
    let rcc = pac::RCC;

    match (mode.timer(), reload) {
        (TriggerTimer::Tim3, Some(arr)) => {
            // TIM3は16ビット
            let arr = u16::try_from(arr).map_err(|_| ConfigError::InvalidSampleRate)?;
            rcc.apb1enr1().modify(|w| w.set_tim3en(true));

            let tim3 = pac::TIM3;
            tim3.cr1().modify(|w| w.set_cen(false));
            tim3.psc().write_value(0);
            tim3.arr().write(|w| w.set_arr(arr));
            // TRGO = Update
            tim3.cr2().modify(|w| w.set_mms(pac::timer::vals::Mms::UPDATE));
            tim3.egr().write(|w| w.set_ug(true));
            tim3.cr1().modify(|w| w.set_cen(true));
            info!("TIM3 TRGO trigger: ARR={}", arr);
        }
        (TriggerTimer::Tim2, Some(arr)) => {
            rcc.apb1enr1().modify(|w| w.set_tim2en(true));

            let tim2 = pac::TIM2;
            tim2.cr1().modify(|w| w.set_cen(false));
            tim2.psc().write_value(0);
            tim2.arr().write(|w| w.set_arr(arr));
            // CH2をPWMモード1にしてCC2イベントを毎周期発生させる
            tim2.ccmr_output(0)
                .modify(|w| w.set_ocm(1, pac::timer::vals::Ocm::PWM_MODE1));
            tim2.ccr(1).write(|w| w.set_ccr(arr / 2));
            tim2.ccer().modify(|w| w.set_cce(1, true));
            tim2.egr().write(|w| w.set_ug(true));
            tim2.cr1().modify(|w| w.set_cen(true));
            info!("TIM2 CC2 trigger: ARR={}", arr);
        }
        _ => {
            // TIM1はモーターPWM側が起動・管理する
            warn!("Trigger on TIM1 CC1: conversions stop whenever PWM channel 1 is inactive");
        }
    }
    Ok(())
}

/// ADC1_2割り込みハンドラー（EOS）
///
/// # Safety
/// 割り込みコンテキストで実行されるため、処理は最小限にする
#[inline(always)]
unsafe fn adc1_2_irq_handler() {
    ISR_CONTEXT.lock(|cell| {
        match cell.borrow_mut().as_mut() {
            Some(ctx) => {
                let IsrContext {
                    handler,
                    capture,
                    led,
                } = ctx;
                handler.service(capture, &DUTY, led, &MOTOR_STATE);
            }
            // コンテキスト設定前のEOSはクリアだけ
            None => pac::ADC1.isr().write(|w| w.set_eos(true)),
        }
    });
}

/// ADC1_2割り込みのRust側エントリーポイント
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn ADC1_2() {
    adc1_2_irq_handler();
}
