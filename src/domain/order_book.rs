use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookLevel {
    pub price: f64,
    pub quantity: u64,
    pub change_rate_pct: f64,
}

/// 합성 호가 스냅샷. 요청마다 새로 만들고 캐시하지 않는다.
/// asks는 가격 오름차순(index 0이 최우선 매도), bids는 가격 내림차순(index 0이 최우선 매수)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderBookSnapshot {
    pub asks: Vec<OrderBookLevel>,
    pub bids: Vec<OrderBookLevel>,
}

impl OrderBookSnapshot {
    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks.first()
    }

    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bids.first()
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// 양쪽 호가 중 가장 큰 잔량. 깊이 바 스케일링용
    pub fn max_quantity(&self) -> u64 {
        self.asks
            .iter()
            .chain(self.bids.iter())
            .map(|level| level.quantity)
            .max()
            .unwrap_or(0)
    }
}
