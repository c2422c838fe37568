use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::domain::{change_rate, Instrument, TickDirection, TickEvent};
use crate::store::{InstrumentStore, InstrumentUpdate};
use crate::tick_size::round_to_tick;

/// tick 한 번의 가격 변동폭: uniform(-0.5, 0.5) * price * volatility
pub fn draw_fluctuation<R: Rng + ?Sized>(price: f64, volatility: f64, rng: &mut R) -> f64 {
    rng.gen_range(-0.5_f64..0.5) * price * volatility
}

/// 체결이 났으면 체결 수량을 돌려준다
pub fn draw_trade_size<R: Rng + ?Sized>(config: &EngineConfig, rng: &mut R) -> Option<f64> {
    if rng.gen_bool(config.trade_probability) {
        Some(rng.gen_range(0.0..config.max_trade_size))
    } else {
        None
    }
}

/// 정해진 변동폭과 체결 수량으로 다음 상태를 계산한다.
/// prev_price가 0 이하면 이번 tick은 건너뛴다 (None).
pub fn next_state(
    instrument: &Instrument,
    fluctuation: f64,
    trade_size: Option<f64>,
    volume_divisor: f64,
) -> Option<InstrumentUpdate> {
    if instrument.prev_price <= 0.0 {
        return None;
    }

    let raw_price = (instrument.price + fluctuation).max(0.0);
    let price = round_to_tick(raw_price);

    let added_volume = trade_size
        .map(|size| size.max(0.0) * price / volume_divisor)
        .unwrap_or(0.0);

    Some(InstrumentUpdate {
        price,
        change_rate: change_rate(price, instrument.prev_price),
        volume: instrument.volume + added_volume,
    })
}

/// 스토어의 종목 하나를 골라 한 번 흔든다. 반영된 경우 이벤트를 돌려준다.
pub(crate) fn tick_once<R: Rng + ?Sized>(
    store: &InstrumentStore,
    config: &EngineConfig,
    rng: &mut R,
) -> Option<TickEvent> {
    let id = store.random_id(rng)?.to_string();

    let applied = store.update(&id, |instrument| {
        let fluctuation = draw_fluctuation(instrument.price, config.volatility, rng);
        let trade_size = draw_trade_size(config, rng);
        let next = next_state(instrument, fluctuation, trade_size, config.volume_divisor);
        if next.is_none() {
            warn!(
                "prev_price가 0 이하라 tick을 건너뜁니다 (id: {}, prev_price: {})",
                instrument.id, instrument.prev_price
            );
        }
        next
    });

    match applied {
        Ok(Some(applied)) => Some(TickEvent {
            instrument_id: applied.after.id,
            price: applied.after.price,
            previous_price: applied.before.price,
            change_rate: applied.after.change_rate,
            volume: applied.after.volume,
            direction: TickDirection::between(applied.before.price, applied.after.price),
            revision: applied.revision,
            at: Utc::now(),
        }),
        Ok(None) => None,
        Err(e) => {
            warn!("tick update failed: {}", e);
            None
        }
    }
}

/// 스토어를 계속 흔드는 독립 루프 묶음.
///
/// 루프마다 종목 하나를 무작위로 골라 갱신하고, 50~750ms 중 무작위로 쉰 뒤 다시 돈다.
/// 루프끼리는 위상을 맞추지 않는다.
pub struct TickGenerator {
    config: EngineConfig,
    loops: Mutex<Option<JoinSet<()>>>,
    generation: AtomicU64,
}

impl TickGenerator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            loops: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// 루프를 띄운다. 이미 돌고 있으면 아무것도 하지 않고 false
    pub async fn start(
        &self,
        store: Arc<InstrumentStore>,
        events: broadcast::Sender<TickEvent>,
    ) -> bool {
        let mut guard = self.loops.lock().await;
        if guard.is_some() {
            return false;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let mut set = JoinSet::new();
        for loop_id in 0..self.config.concurrency {
            let rng = self.loop_rng(generation, loop_id);
            set.spawn(run_loop(
                loop_id,
                Arc::clone(&store),
                events.clone(),
                self.config.clone(),
                rng,
            ));
        }

        info!(
            "tick 루프 시작: {}개 루프, {}개 종목, {}~{}ms 간격",
            self.config.concurrency,
            store.len(),
            self.config.min_delay_ms,
            self.config.max_delay_ms
        );
        *guard = Some(set);
        true
    }

    /// 모든 루프를 취소하고 끝날 때까지 기다린다.
    /// 반환 이후에는 이 생성기에서 더 이상 쓰기가 일어나지 않는다.
    pub async fn stop(&self) -> bool {
        let mut guard = self.loops.lock().await;
        let Some(mut set) = guard.take() else {
            return false;
        };
        // tick 본문에는 await가 없어서 취소는 항상 대기 구간에서만 걸린다
        set.shutdown().await;
        info!("tick 루프 정지");
        true
    }

    pub async fn is_running(&self) -> bool {
        self.loops.lock().await.is_some()
    }

    pub async fn active_loops(&self) -> usize {
        self.loops
            .lock()
            .await
            .as_ref()
            .map(|set| set.len())
            .unwrap_or(0)
    }

    fn loop_rng(&self, generation: u64, loop_id: usize) -> StdRng {
        match self.config.seed {
            Some(seed) => {
                let offset = generation * self.config.concurrency as u64 + loop_id as u64;
                StdRng::seed_from_u64(seed.wrapping_add(offset))
            }
            None => StdRng::from_entropy(),
        }
    }
}

async fn run_loop(
    loop_id: usize,
    store: Arc<InstrumentStore>,
    events: broadcast::Sender<TickEvent>,
    config: EngineConfig,
    mut rng: StdRng,
) {
    loop {
        if let Some(event) = tick_once(&store, &config, &mut rng) {
            debug!(
                "[loop {}] {} {:?} {} -> {} ({:+.4}%)",
                loop_id,
                event.instrument_id,
                event.direction,
                event.previous_price,
                event.price,
                event.change_rate
            );
            // 구독자가 없으면 그냥 버린다
            let _ = events.send(event);
        }

        let delay = rng.gen_range(config.min_delay_ms..=config.max_delay_ms);
        sleep(Duration::from_millis(delay)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::tick_size::price_step;

    use super::*;

    fn catalog() -> Vec<Instrument> {
        vec![
            Instrument::new("JAMSIL", "잠실래미안아이파크", "서울시 송파구 신천동", 2_750_000_000.0, 2_720_000_000.0, 1_018_177.0),
            Instrument::new("EXPO", "엑스포", "대전시 유성구 전민동", 650_000_000.0, 620_000_000.0, 12_000.0),
            Instrument::new("MID", "mid", "x", 54_321.0, 50_000.0, 300.0),
            Instrument::new("LOW", "low", "y", 512.3, 500.0, 10.0),
            Instrument::new("TINY", "tiny", "z", 42.5, 40.0, 0.0),
        ]
    }

    fn generator(seed: u64) -> TickGenerator {
        TickGenerator::new(EngineConfig {
            seed: Some(seed),
            ..EngineConfig::default()
        })
    }

    #[test]
    fn test_next_state_rounds_to_hundreds() {
        let inst = Instrument::new("A", "a", "x", 1_200_000.0, 1_200_000.0, 50_000.0);
        let next = next_state(&inst, 3_450.0, None, 1_000_000.0).unwrap();
        assert_eq!(next.price, 1_203_500.0);
        assert!((next.change_rate - 0.291_666_666_666_666_7).abs() < 1e-9);
        assert_eq!(next.volume, 50_000.0);
    }

    #[test]
    fn test_next_state_adds_trade_volume() {
        let inst = Instrument::new("A", "a", "x", 1_200_000.0, 1_200_000.0, 50_000.0);
        let next = next_state(&inst, 3_450.0, Some(200.0), 1_000_000.0).unwrap();
        assert!((next.volume - (50_000.0 + 240.7)).abs() < 1e-9);
    }

    #[test]
    fn test_next_state_never_goes_negative() {
        let inst = Instrument::new("A", "a", "x", 10.0, 12.0, 1.0);
        let next = next_state(&inst, -1_000.0, Some(100.0), 1_000_000.0).unwrap();
        assert_eq!(next.price, 0.0);
        assert_eq!(next.volume, 1.0);
        assert!((next.change_rate + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_next_state_skips_bad_baseline() {
        let mut inst = Instrument::new("A", "a", "x", 10.0, 12.0, 1.0);
        inst.prev_price = 0.0;
        assert!(next_state(&inst, 1.0, None, 1_000_000.0).is_none());
    }

    #[test]
    fn test_draw_fluctuation_amplitude() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10_000 {
            let f = draw_fluctuation(1_000_000.0, 0.005, &mut rng);
            assert!(f >= -2_500.0 && f < 2_500.0);
        }
    }

    #[test]
    fn test_tick_once_respects_invariants() {
        let store = InstrumentStore::new(catalog()).unwrap();
        let config = EngineConfig::default();
        let mut rng = StdRng::seed_from_u64(5);

        let mut last_volume: HashMap<String, f64> = store
            .snapshot()
            .instruments
            .into_iter()
            .map(|i| (i.id, i.volume))
            .collect();

        for _ in 0..5_000 {
            let event = tick_once(&store, &config, &mut rng).unwrap();
            let inst = store.get(&event.instrument_id).unwrap();

            assert!(inst.price >= 0.0);
            let step = price_step(inst.price);
            let units = inst.price / step;
            assert!((units - units.round()).abs() < 1e-6, "{} not on {} grid", inst.price, step);
            assert!((inst.change_rate - inst.change_rate_at(inst.price)).abs() < 1e-9);

            let prev = last_volume.insert(inst.id.clone(), inst.volume).unwrap();
            assert!(inst.volume >= prev);
        }
        assert_eq!(store.revision(), 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let store = Arc::new(InstrumentStore::new(catalog()).unwrap());
        let (tx, _rx) = broadcast::channel(64);
        let generator = generator(1);

        assert!(generator.start(Arc::clone(&store), tx.clone()).await);
        assert!(!generator.start(Arc::clone(&store), tx.clone()).await);
        assert_eq!(generator.active_loops().await, 5);

        assert!(generator.stop().await);
        assert!(!generator.stop().await);
        assert_eq!(generator.active_loops().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_writes_after_stop() {
        let store = Arc::new(InstrumentStore::new(catalog()).unwrap());
        let (tx, _rx) = broadcast::channel(64);
        let generator = generator(2);

        generator.start(Arc::clone(&store), tx).await;
        sleep(Duration::from_secs(5)).await;
        generator.stop().await;

        let frozen = store.revision();
        // 5 루프 * 5초 / 평균 400ms
        assert!(frozen > 20, "only {frozen} writes in 5s");

        sleep(Duration::from_millis(2_000)).await;
        assert_eq!(store.revision(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cycles_do_not_leak_loops() {
        let store = Arc::new(InstrumentStore::new(catalog()).unwrap());
        let (tx, _rx) = broadcast::channel(64);
        let generator = generator(3);

        for _ in 0..3 {
            generator.start(Arc::clone(&store), tx.clone()).await;
            assert_eq!(generator.active_loops().await, 5);
            sleep(Duration::from_millis(800)).await;
            generator.stop().await;
            assert!(!generator.is_running().await);
        }

        let frozen = store.revision();
        sleep(Duration::from_secs(2)).await;
        assert_eq!(store.revision(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loops_publish_events() {
        let store = Arc::new(InstrumentStore::new(catalog()).unwrap());
        let (tx, mut rx) = broadcast::channel(1_024);
        let generator = generator(4);

        generator.start(Arc::clone(&store), tx).await;
        sleep(Duration::from_secs(3)).await;
        generator.stop().await;

        let mut received = 0u64;
        let mut last_revision = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(event.revision > last_revision);
            last_revision = event.revision;
            assert!(event.price >= 0.0);
            received += 1;
        }
        assert_eq!(received, store.revision());
    }
}
