use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// 거래 가능한 단지 하나의 실시간 상태
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub id: String,
    pub name: String,
    pub location: String,
    pub price: f64,
    /// 세션 기준가. 생성 시 한 번 정해지고 이후 바뀌지 않는다.
    pub prev_price: f64,
    pub change_rate: f64, // 0.5 == 0.5%
    pub volume: f64,
}

impl Instrument {
    /// change_rate는 항상 price와 prev_price에서 다시 계산해서 채운다.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
        price: f64,
        prev_price: f64,
        volume: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: location.into(),
            price,
            prev_price,
            change_rate: change_rate(price, prev_price),
            volume,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: &str| EngineError::InvalidInstrument {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(invalid("price must be finite and non-negative"));
        }
        if !self.prev_price.is_finite() || self.prev_price <= 0.0 {
            return Err(invalid("prevPrice must be finite and positive"));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(invalid("volume must be finite and non-negative"));
        }
        Ok(())
    }

    /// 현재 가격 대신 주어진 가격으로 본 change rate
    pub fn change_rate_at(&self, price: f64) -> f64 {
        change_rate(price, self.prev_price)
    }
}

/// `(price - prev_price) / prev_price * 100`
/// prev_price가 0 이하이면 NaN/inf 대신 0을 돌려준다.
pub fn change_rate(price: f64, prev_price: f64) -> f64 {
    if prev_price <= 0.0 || !prev_price.is_finite() {
        return 0.0;
    }
    (price - prev_price) / prev_price * 100.0
}
