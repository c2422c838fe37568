use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TickDirection {
    Up,
    Down,
    Flat,
}

impl TickDirection {
    pub fn between(previous: f64, current: f64) -> Self {
        if current > previous {
            TickDirection::Up
        } else if current < previous {
            TickDirection::Down
        } else {
            TickDirection::Flat
        }
    }
}

/// 스토어에 반영된 tick 한 건 (구독자에게 브로드캐스트)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickEvent {
    pub instrument_id: String,
    pub price: f64,
    pub previous_price: f64,
    pub change_rate: f64,
    pub volume: f64,
    pub direction: TickDirection,
    pub revision: u64,
    pub at: DateTime<Utc>,
}
