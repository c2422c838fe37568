use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{Instrument, OrderBookSnapshot, TickEvent};
use crate::error::EngineError;
use crate::market::detail_mover::DetailPriceMover;
use crate::market::order_book::synthesize_with;
use crate::market::tick_generator::TickGenerator;
use crate::store::{InstrumentStore, StoreSnapshot};

/// 열린 상세 화면 하나를 가리키는 핸들
#[derive(Debug, Clone)]
pub struct DetailHandle {
    session_id: Uuid,
    instrument_id: String,
    display: watch::Receiver<f64>,
}

impl DetailHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    /// 상세 화면용 표시 가격 (스토어 가격과 별개)
    pub fn display_price(&self) -> f64 {
        *self.display.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.display.clone()
    }

    /// 세션이 닫히면 워커가 송신 쪽을 놓으므로 채널이 닫힌다
    pub fn is_open(&self) -> bool {
        self.display.has_changed().is_ok()
    }
}

/// 시세 엔진의 바깥 창구. 화면 쪽은 이것만 쓴다.
pub struct MarketEngine {
    config: EngineConfig,
    store: Arc<InstrumentStore>,
    generator: TickGenerator,
    events: broadcast::Sender<TickEvent>,
    sessions: Mutex<HashMap<Uuid, DetailPriceMover>>,
    detail_seq: AtomicU64,
}

impl MarketEngine {
    pub fn new(catalog: Vec<Instrument>, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let store = Arc::new(InstrumentStore::new(catalog)?);
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            generator: TickGenerator::new(config.clone()),
            config,
            store,
            events,
            sessions: Mutex::new(HashMap::new()),
            detail_seq: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// tick 루프 시작. 이미 돌고 있으면 false
    pub async fn start(&self) -> bool {
        self.generator
            .start(Arc::clone(&self.store), self.events.clone())
            .await
    }

    /// tick 루프와 열린 상세 세션을 모두 정리한다. 멈춰 있으면 false
    pub async fn stop(&self) -> bool {
        let stopped = self.generator.stop().await;

        let sessions: Vec<DetailPriceMover> = {
            let mut guard = self.sessions.lock().await;
            guard.drain().map(|(_, mover)| mover).collect()
        };
        let closed = sessions.len();
        for mover in sessions {
            mover.cancel().await;
        }
        if closed > 0 {
            info!("엔진 정지와 함께 상세 세션 {}개 종료", closed);
        }

        stopped
    }

    pub async fn is_running(&self) -> bool {
        self.generator.is_running().await
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn instrument(&self, id: &str) -> Result<Instrument, EngineError> {
        self.store.get(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TickEvent> {
        self.events.subscribe()
    }

    pub fn synthesize_order_book(&self, id: &str) -> Result<OrderBookSnapshot, EngineError> {
        let instrument = self.store.get(id)?;
        Ok(self.book_for(&instrument))
    }

    /// 상세 화면의 호가창. 스토어 가격이 아니라 세션의 표시 가격 기준으로 만든다.
    /// 이미 닫힌 세션이면 NotFound
    pub fn detail_order_book(&self, handle: &DetailHandle) -> Result<OrderBookSnapshot, EngineError> {
        if !handle.is_open() {
            return Err(EngineError::NotFound(handle.session_id.to_string()));
        }
        let mut instrument = self.store.get(handle.instrument_id())?;
        instrument.price = handle.display_price();
        instrument.change_rate = instrument.change_rate_at(instrument.price);
        Ok(self.book_for(&instrument))
    }

    pub async fn open_detail(&self, id: &str) -> Result<DetailHandle, EngineError> {
        // 세션 락을 먼저 잡아야 stop과 엇갈려도 세션이 남지 않는다
        let mut sessions = self.sessions.lock().await;
        if !self.generator.is_running().await {
            return Err(EngineError::NotRunning);
        }
        let instrument = self.store.get(id)?;

        let mover = DetailPriceMover::spawn(
            instrument.id.clone(),
            instrument.price,
            self.config.detail_interval(),
            self.config.detail_amplitude,
            self.detail_rng(),
        );
        let handle = DetailHandle {
            session_id: mover.session_id(),
            instrument_id: instrument.id.clone(),
            display: mover.subscribe(),
        };
        sessions.insert(handle.session_id, mover);

        info!("상세 세션 열림: {} ({})", instrument.id, handle.session_id);
        Ok(handle)
    }

    /// 상세 세션을 닫는다. 반환 이후 해당 세션의 표시 가격은 더 이상 움직이지 않는다.
    pub async fn close_detail(&self, handle: &DetailHandle) -> bool {
        let mover = self.sessions.lock().await.remove(&handle.session_id);
        match mover {
            Some(mover) => {
                mover.cancel().await;
                info!("상세 세션 닫힘: {} ({})", handle.instrument_id, handle.session_id);
                true
            }
            None => false,
        }
    }

    /// 아직 살아있는 상세 워커 수
    pub async fn open_sessions(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|mover| !mover.is_finished())
            .count()
    }

    fn book_for(&self, instrument: &Instrument) -> OrderBookSnapshot {
        let mut rng = rand::thread_rng();
        synthesize_with(
            instrument,
            self.config.book_depth,
            self.config.book_levels,
            &mut rng,
        )
    }

    fn detail_rng(&self) -> StdRng {
        let seq = self.detail_seq.fetch_add(1, Ordering::Relaxed);
        match self.config.seed {
            // tick 루프 시드와 겹치지 않게 상위 비트를 섞는다
            Some(seed) => StdRng::seed_from_u64(seed ^ (0xD37A_11 << 32) ^ seq),
            None => StdRng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;

    fn catalog() -> Vec<Instrument> {
        vec![
            Instrument::new("HELIO", "헬리오시티", "서울시 송파구 가락동", 2_150_000_000.0, 2_180_000_000.0, 995_843.0),
            Instrument::new("CLOVER", "크로바", "대전시 서구 둔산동", 1_450_000_000.0, 1_480_000_000.0, 89_000.0),
        ]
    }

    fn engine() -> MarketEngine {
        let config = EngineConfig {
            seed: Some(7),
            ..EngineConfig::default()
        };
        MarketEngine::new(catalog(), config).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let config = EngineConfig {
            book_levels: 20,
            ..EngineConfig::default()
        };
        assert!(matches!(
            MarketEngine::new(catalog(), config),
            Err(EngineError::Config { .. })
        ));
    }

    #[test]
    fn test_synthesize_unknown_id() {
        let engine = engine();
        assert!(matches!(
            engine.synthesize_order_book("NOPE"),
            Err(EngineError::NotFound(id)) if id == "NOPE"
        ));
    }

    #[test]
    fn test_reads_work_while_stopped() {
        let engine = engine();
        let book = engine.synthesize_order_book("HELIO").unwrap();
        assert_eq!(book.asks.len(), 7);
        assert_eq!(book.bids[0].price, 2_150_000_000.0);
        assert_eq!(engine.snapshot().instruments.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_detail_requires_running_engine() {
        let engine = engine();
        assert!(matches!(
            engine.open_detail("HELIO").await,
            Err(EngineError::NotRunning)
        ));

        engine.start().await;
        assert!(matches!(
            engine.open_detail("NOPE").await,
            Err(EngineError::NotFound(_))
        ));
        engine.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_session_lifecycle() {
        let engine = engine();
        engine.start().await;

        let handle = engine.open_detail("HELIO").await.unwrap();
        let opening = handle.display_price();
        assert_eq!(opening, engine.instrument("HELIO").unwrap().price);
        assert_eq!(engine.open_sessions().await, 1);

        sleep(Duration::from_millis(3_500)).await;
        let moved = handle.display_price();
        assert_ne!(moved, opening);
        assert_eq!(moved, moved.floor());

        // 상세 가격은 스토어에 쓰지 않는다
        let stored = engine.instrument("HELIO").unwrap();
        assert_ne!(stored.price, moved);

        let book = engine.detail_order_book(&handle).unwrap();
        assert_eq!(book.bids[0].price, moved);

        assert!(handle.is_open());
        assert!(engine.close_detail(&handle).await);
        assert!(!engine.close_detail(&handle).await);
        assert!(!handle.is_open());
        assert!(matches!(
            engine.detail_order_book(&handle),
            Err(EngineError::NotFound(id)) if id == handle.session_id().to_string()
        ));
        let frozen = handle.display_price();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(handle.display_price(), frozen);

        engine.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_sessions() {
        let engine = engine();
        engine.start().await;
        let first = engine.open_detail("HELIO").await.unwrap();
        let _second = engine.open_detail("CLOVER").await.unwrap();
        assert_eq!(engine.open_sessions().await, 2);

        assert!(engine.stop().await);
        assert_eq!(engine.open_sessions().await, 0);
        assert!(!first.is_open());

        let frozen = first.display_price();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(first.display_price(), frozen);
    }
}
