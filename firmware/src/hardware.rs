//! ハードウェア初期化モジュール
//!
//! クロック設定とGPIOのレジスタ直接設定を集約します。

use embassy_stm32::{pac, Config};

use crate::config::pins;

/// RCCクロック設定を初期化
///
/// HSI → PLL（÷4 × 85 ÷ 2）で170MHz生成、ADC12クロックはSYSCLK
pub fn create_clock_config() -> Config {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::mux::{Adcsel, ClockMux};
        use embassy_stm32::rcc::{Pll, PllMul, PllPreDiv, PllRDiv, PllSource, Sysclk};

        config.rcc.hsi = true;
        config.rcc.pll = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL85,
            divp: None,
            divq: None,
            divr: Some(PllRDiv::DIV2),
        });
        config.rcc.sys = Sysclk::PLL1_R;

        let mut clock_mux = ClockMux::default();
        clock_mux.adc12sel = Adcsel::SYS;
        config.rcc.mux = clock_mux;
    }
    config
}

/// Hallセンサー入力の初期化（PB6=H1、PB7=H2、PB8=H3）
///
/// タイマーを使わず、サイクルハンドラがIDRを直接読む
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む
pub unsafe fn init_hall_inputs() {
    let rcc = pac::RCC;
    let gpiob = pac::GPIOB;

    rcc.ahb2enr().modify(|w| w.set_gpioben(true));

    // 外部プルアップ前提なので内部プルは無効
    for pin in [pins::HALL_H1, pins::HALL_H2, pins::HALL_H3] {
        gpiob
            .moder()
            .modify(|w| w.set_moder(pin, pac::gpio::vals::Moder::INPUT));
        gpiob
            .pupdr()
            .modify(|w| w.set_pupdr(pin, pac::gpio::vals::Pupdr::FLOATING));
    }

    info!(
        "Hall inputs: PB{}/PB{}/PB{}",
        pins::HALL_H1,
        pins::HALL_H2,
        pins::HALL_H3
    );
}

/// ADC入力ピンをアナログモードに設定（PA0、PA1、PC1）
///
/// # Safety
/// PACを使用した直接レジスタ操作を含む
pub unsafe fn init_analog_inputs() {
    let rcc = pac::RCC;
    rcc.ahb2enr().modify(|w| {
        w.set_gpioaen(true);
        w.set_gpiocen(true);
    });

    for pin in [0, 1] {
        pac::GPIOA
            .moder()
            .modify(|w| w.set_moder(pin, pac::gpio::vals::Moder::ANALOG));
    }
    pac::GPIOC
        .moder()
        .modify(|w| w.set_moder(1, pac::gpio::vals::Moder::ANALOG));
}
