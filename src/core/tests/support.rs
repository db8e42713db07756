//! Shared fixtures for the core test modules.

use chrono::{DateTime, Local, TimeZone};

use crate::core::config::{
    Config, ConfigHandle, GpioConfig, PathsConfig, SecurityConfig, TelegramConfig,
};

fn base_config() -> Config {
    Config {
        telegram: TelegramConfig {
            token: String::new(),
            authorized_users: vec![42],
            stt_api_key: None,
        },
        security: SecurityConfig::default(),
        paths: PathsConfig::default(),
        gpio: GpioConfig::default(),
    }
}

pub(crate) fn config(whitelist: &[&str], timeout_secs: u64) -> ConfigHandle {
    let mut config = base_config();
    config.security.commands_whitelist = whitelist.iter().map(|s| s.to_string()).collect();
    config.security.command_timeout_secs = timeout_secs;
    ConfigHandle::new(config)
}

pub(crate) fn config_with_cooldown(whitelist: &[&str], cooldown_secs: u64) -> ConfigHandle {
    let mut config = base_config();
    config.security.commands_whitelist = whitelist.iter().map(|s| s.to_string()).collect();
    config.security.motion_cooldown_secs = cooldown_secs;
    ConfigHandle::new(config)
}

pub(crate) fn config_with_pins(pins: &[u8]) -> ConfigHandle {
    let mut config = base_config();
    config.gpio.allowed_pins = pins.to_vec();
    ConfigHandle::new(config)
}

pub(crate) fn swap_whitelist(handle: &ConfigHandle, whitelist: &[&str]) {
    let mut config = (*handle.snapshot()).clone();
    config.security.commands_whitelist = whitelist.iter().map(|s| s.to_string()).collect();
    handle.swap(config);
}

pub(crate) fn local(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, second)
        .unwrap()
}
