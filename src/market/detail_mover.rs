use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::trace;
use uuid::Uuid;

/// 표시 가격 한 걸음: 고정 진폭의 대칭 랜덤워크, 정수로 내림, 0 아래로는 안 내려간다
pub fn step_display_price<R: Rng + ?Sized>(current: f64, amplitude: f64, rng: &mut R) -> f64 {
    let delta = rng.gen_range(-0.5_f64..0.5) * amplitude;
    (current + delta).floor().max(0.0)
}

/// 상세 화면 하나에 붙는 표시 가격 워커.
/// 스토어에는 절대 쓰지 않고 자기 watch 채널에만 쓴다.
pub struct DetailPriceMover {
    session_id: Uuid,
    instrument_id: String,
    display: watch::Receiver<f64>,
    task: Option<JoinHandle<()>>,
}

impl DetailPriceMover {
    pub fn spawn(
        instrument_id: impl Into<String>,
        opening_price: f64,
        period: Duration,
        amplitude: f64,
        mut rng: StdRng,
    ) -> Self {
        let session_id = Uuid::new_v4();
        let instrument_id = instrument_id.into();
        let (tx, rx) = watch::channel(opening_price);

        let log_id = instrument_id.clone();
        let task = tokio::spawn(async move {
            // 첫 갱신은 한 주기 뒤
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let next = step_display_price(*tx.borrow(), amplitude, &mut rng);
                trace!("[detail {}] display price -> {}", log_id, next);
                if tx.send(next).is_err() {
                    // 받는 쪽이 전부 사라졌다
                    break;
                }
            }
        });

        Self {
            session_id,
            instrument_id,
            display: rx,
            task: Some(task),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.display.clone()
    }

    pub fn display_price(&self) -> f64 {
        *self.display.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// 워커를 취소하고 완전히 끝날 때까지 기다린다
    pub async fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for DetailPriceMover {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
