//! 가격 크기별 호가 단위 규칙.
//!
//! 스토어에 쓰는 가격의 반올림 구간(`round_to_tick`, 초과 기준)과
//! 호가 합성에 쓰는 단위(`order_book_tick_size`, 이상 기준)는 서로 다른 표다.

/// 가격 구간에 맞는 단위로 반올림. 위에서부터 먼저 맞는 구간이 이긴다.
pub fn round_to_tick(raw_price: f64) -> f64 {
    let step = price_step(raw_price);
    if step >= 1.0 {
        (raw_price / step).round() * step
    } else {
        // 0.1, 0.01 단위는 곱해서 반올림해야 부동소수 오차가 덜 남는다
        let scale = (1.0 / step).round();
        (raw_price * scale).round() / scale
    }
}

/// 스토어 가격 반올림 단위
pub fn price_step(raw_price: f64) -> f64 {
    if raw_price > 100_000.0 {
        100.0
    } else if raw_price > 1_000.0 {
        1.0
    } else if raw_price > 100.0 {
        0.1
    } else {
        0.01
    }
}

/// 호가창 한 칸의 가격 간격
pub fn order_book_tick_size(price: f64) -> f64 {
    if price >= 1_000_000.0 {
        1_000.0
    } else if price >= 100_000.0 {
        100.0
    } else if price >= 1_000.0 {
        1.0
    } else {
        0.01
    }
}
