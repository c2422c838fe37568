use rand::Rng;

use crate::domain::{Instrument, OrderBookLevel, OrderBookSnapshot};
use crate::tick_size::order_book_tick_size;

pub const DEFAULT_DEPTH: usize = 15;
pub const DEFAULT_LEVELS: usize = 7;

const MIN_BASE_VOLUME: f64 = 500.0;
const BASE_VOLUME_DIVISOR: f64 = 50.0;
const IMBALANCE_CLAMP: f64 = 5.0;
const IMBALANCE_SCALE: f64 = 0.1;
const WALL_MULTIPLIER: f64 = 2.5;

/// 호가 깊이에 따른 잔량 모양: (i+1)^1.5 * e^(-(i+1)/4)
/// 최우선 호가는 얇고, 몇 칸 밖에서 가장 두껍고, 멀어지면 다시 얇아진다.
/// 정규화하지 않은 값이라 상대적인 모양만 의미가 있다.
pub fn liquidity_weight(index: usize) -> f64 {
    let x = (index + 1) as f64;
    x.powf(1.5) * (-x / 4.0).exp()
}

/// 최근 등락률로 매수/매도 잔량 쏠림을 만든다. 범위는 [0.5, 1.5]
pub fn imbalance(change_rate: f64) -> f64 {
    let raw = if change_rate.is_finite() {
        change_rate.clamp(-IMBALANCE_CLAMP, IMBALANCE_CLAMP)
    } else {
        0.0
    };
    1.0 + raw * IMBALANCE_SCALE
}

pub fn base_volume(volume: f64) -> f64 {
    (volume / BASE_VOLUME_DIVISOR).max(MIN_BASE_VOLUME)
}

#[derive(Clone, Copy)]
enum Side {
    Ask,
    Bid,
}

impl Side {
    fn is_wall_index(self, index: usize) -> bool {
        match self {
            Side::Ask => index % 7 == 3,
            Side::Bid => index % 8 == 2,
        }
    }
}

/// 기본 깊이(15)로 만들고 양쪽 7호가씩 돌려준다
pub fn synthesize<R: Rng + ?Sized>(instrument: &Instrument, rng: &mut R) -> OrderBookSnapshot {
    synthesize_with(instrument, DEFAULT_DEPTH, DEFAULT_LEVELS, rng)
}

/// 종목의 현재 상태에서 가상의 호가창을 만든다. 순수 함수라 같은 rng 상태면 같은 결과가 나온다.
///
/// asks는 시장가에서 가까운 순(가격 오름차순), bids도 가까운 순(가격 내림차순)이다.
/// 최우선 매수호가는 현재가와 같을 수 있다. 0 미만이 되는 매수호가는 버린다.
pub fn synthesize_with<R: Rng + ?Sized>(
    instrument: &Instrument,
    depth: usize,
    levels: usize,
    rng: &mut R,
) -> OrderBookSnapshot {
    let price = instrument.price;
    let tick_size = order_book_tick_size(price);
    let imbalance = imbalance(instrument.change_rate);
    let base_volume = base_volume(instrument.volume);

    // 먼 호가부터 만든 뒤 가까운 쪽만 잘라낸다
    let mut asks: Vec<OrderBookLevel> = (0..depth)
        .rev()
        .map(|i| {
            let level_price = level_price(price, tick_size, (i + 1) as i64);
            let quantity = level_quantity(base_volume, i, 2.0 - imbalance, Side::Ask, rng);
            OrderBookLevel {
                price: level_price,
                quantity,
                change_rate_pct: instrument.change_rate_at(level_price),
            }
        })
        .collect();
    let far_end = asks.len() - levels.min(asks.len());
    asks.drain(..far_end);
    asks.reverse();

    let bids: Vec<OrderBookLevel> = (0..depth)
        .map(|i| {
            let level_price = level_price(price, tick_size, -(i as i64));
            let quantity = level_quantity(base_volume, i, imbalance, Side::Bid, rng);
            OrderBookLevel {
                price: level_price,
                quantity,
                change_rate_pct: instrument.change_rate_at(level_price),
            }
        })
        .take(levels)
        .filter(|level| level.price >= 0.0)
        .collect();

    OrderBookSnapshot { asks, bids }
}

/// 현재가에서 `offset`칸 떨어진 호가 가격.
/// 1 미만 단위는 정수 칸 수로 계산해서 나눠야 격자에서 벗어나지 않는다.
fn level_price(price: f64, tick_size: f64, offset: i64) -> f64 {
    if tick_size >= 1.0 {
        price + offset as f64 * tick_size
    } else {
        let scale = (1.0 / tick_size).round();
        ((price * scale).round() + offset as f64) / scale
    }
}

fn level_quantity<R: Rng + ?Sized>(
    base_volume: f64,
    index: usize,
    side_bias: f64,
    side: Side,
    rng: &mut R,
) -> u64 {
    let raw = base_volume * liquidity_weight(index) * side_bias;
    let wall = side.is_wall_index(index) && rng.gen_bool(0.5);
    let noise: f64 = rng.gen_range(0.8..=1.2);
    let quantity = raw * noise * if wall { WALL_MULTIPLIER } else { 1.0 };
    quantity.max(0.0).floor() as u64
}
