use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;

const ENV_PREFIX: &str = "ESTATE_";

/// 시세 엔진 설정. 기본값만으로 화면용 시세가 돈다.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 동시에 도는 tick 루프 수
    pub concurrency: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// tick 한 번의 최대 변동폭 비율. 실제 진폭은 ±volatility/2
    pub volatility: f64,
    pub trade_probability: f64,
    pub max_trade_size: f64,
    /// 체결 수량 * 가격을 이 값으로 나눠 거래대금에 더한다 (백만 원 단위)
    pub volume_divisor: f64,
    pub book_depth: usize,
    pub book_levels: usize,
    pub detail_interval_ms: u64,
    /// 상세 화면 가격의 1초당 최대 변동폭 (절대값)
    pub detail_amplitude: f64,
    pub event_capacity: usize,
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            min_delay_ms: 50,
            max_delay_ms: 750,
            volatility: 0.005,
            trade_probability: 0.3,
            max_trade_size: 500.0,
            volume_divisor: 1_000_000.0,
            book_depth: 15,
            book_levels: 7,
            detail_interval_ms: 1_000,
            detail_amplitude: 2_000_000.0,
            event_capacity: 1_024,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// 기본값 위에 `ESTATE_*` 환경 변수를 덮어쓴다
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        override_from(&lookup, "CONCURRENCY", &mut config.concurrency)?;
        override_from(&lookup, "MIN_DELAY_MS", &mut config.min_delay_ms)?;
        override_from(&lookup, "MAX_DELAY_MS", &mut config.max_delay_ms)?;
        override_from(&lookup, "VOLATILITY", &mut config.volatility)?;
        override_from(&lookup, "TRADE_PROBABILITY", &mut config.trade_probability)?;
        override_from(&lookup, "MAX_TRADE_SIZE", &mut config.max_trade_size)?;
        override_from(&lookup, "VOLUME_DIVISOR", &mut config.volume_divisor)?;
        override_from(&lookup, "BOOK_DEPTH", &mut config.book_depth)?;
        override_from(&lookup, "BOOK_LEVELS", &mut config.book_levels)?;
        override_from(&lookup, "DETAIL_INTERVAL_MS", &mut config.detail_interval_ms)?;
        override_from(&lookup, "DETAIL_AMPLITUDE", &mut config.detail_amplitude)?;
        override_from(&lookup, "EVENT_CAPACITY", &mut config.event_capacity)?;

        let mut seed = 0u64;
        if override_from(&lookup, "SEED", &mut seed)? {
            config.seed = Some(seed);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let bad = |key: &str, value: String| EngineError::Config {
            key: format!("{ENV_PREFIX}{key}"),
            value,
        };

        if self.concurrency == 0 {
            return Err(bad("CONCURRENCY", "0".to_string()));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(bad(
                "MIN_DELAY_MS",
                format!("{} > max {}", self.min_delay_ms, self.max_delay_ms),
            ));
        }
        if !(0.0..=1.0).contains(&self.trade_probability) {
            return Err(bad("TRADE_PROBABILITY", self.trade_probability.to_string()));
        }
        // NaN, inf는 루프 안에서 gen_range 패닉이나 NaN 가격으로 번진다
        if !non_negative(self.volatility) {
            return Err(bad("VOLATILITY", self.volatility.to_string()));
        }
        if !positive(self.max_trade_size) {
            return Err(bad("MAX_TRADE_SIZE", self.max_trade_size.to_string()));
        }
        if !positive(self.volume_divisor) {
            return Err(bad("VOLUME_DIVISOR", self.volume_divisor.to_string()));
        }
        if !non_negative(self.detail_amplitude) {
            return Err(bad("DETAIL_AMPLITUDE", self.detail_amplitude.to_string()));
        }
        if self.book_levels > self.book_depth {
            return Err(bad(
                "BOOK_LEVELS",
                format!("{} > depth {}", self.book_levels, self.book_depth),
            ));
        }
        if self.detail_interval_ms == 0 {
            return Err(bad("DETAIL_INTERVAL_MS", "0".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(bad("EVENT_CAPACITY", "0".to_string()));
        }
        Ok(())
    }

    pub fn detail_interval(&self) -> Duration {
        Duration::from_millis(self.detail_interval_ms)
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn override_from<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<bool, EngineError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let full_key = format!("{ENV_PREFIX}{key}");
    let Some(raw) = lookup(&full_key) else {
        return Ok(false);
    };
    *slot = raw.trim().parse().map_err(|_| EngineError::Config {
        key: full_key,
        value: raw.clone(),
    })?;
    Ok(true)
}
