use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::Rng;
use serde::Serialize;

use crate::domain::Instrument;
use crate::error::EngineError;

/// tick 한 번에 바뀌는 필드 묶음. 레코드에 한 번에 통째로 반영된다.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentUpdate {
    pub price: f64,
    pub change_rate: f64,
    pub volume: f64,
}

/// 전체 레코드의 일관된 사본
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub revision: u64,
    pub instruments: Vec<Instrument>,
}

/// 적용된 쓰기 한 건의 전후 상태
#[derive(Debug, Clone)]
pub(crate) struct AppliedUpdate {
    pub before: Instrument,
    pub after: Instrument,
    pub revision: u64,
}

struct StoreInner {
    records: HashMap<String, Instrument>,
    revision: u64,
}

/// id -> 종목 상태의 원본. 동시 갱신은 `update` 하나로만 들어온다.
pub struct InstrumentStore {
    // 종목 집합은 생성 이후 고정이라 락 밖에 둔다 (카탈로그 순서 유지)
    ids: Vec<String>,
    inner: RwLock<StoreInner>,
}

impl InstrumentStore {
    pub fn new(instruments: Vec<Instrument>) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(instruments.len());
        let mut records = HashMap::with_capacity(instruments.len());

        for mut instrument in instruments {
            instrument.validate()?;
            if !seen.insert(instrument.id.clone()) {
                return Err(EngineError::DuplicateInstrument(instrument.id));
            }
            // 시드에 들어있는 change_rate는 믿지 않는다
            instrument.change_rate = instrument.change_rate_at(instrument.price);
            ids.push(instrument.id.clone());
            records.insert(instrument.id.clone(), instrument);
        }

        Ok(Self {
            ids,
            inner: RwLock::new(StoreInner {
                records,
                revision: 0,
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    /// 카탈로그 순서대로 전체 사본을 돌려준다
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.read();
        let instruments = self
            .ids
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect();
        StoreSnapshot {
            revision: inner.revision,
            instruments,
        }
    }

    pub fn get(&self, id: &str) -> Result<Instrument, EngineError> {
        self.read()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    /// 전체 종목 중 하나를 균등 확률로 고른다
    pub fn random_id<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        if self.ids.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.ids.len());
        Some(self.ids[index].as_str())
    }

    /// 레코드 하나를 원자적으로 교체한다.
    /// `compute`가 None을 돌려주면 아무것도 쓰지 않는다.
    pub(crate) fn update<F>(&self, id: &str, compute: F) -> Result<Option<AppliedUpdate>, EngineError>
    where
        F: FnOnce(&Instrument) -> Option<InstrumentUpdate>,
    {
        let mut inner = self.write();
        let current = inner
            .records
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        let Some(update) = compute(current) else {
            return Ok(None);
        };

        let before = current.clone();
        let after = Instrument {
            price: update.price,
            change_rate: update.change_rate,
            volume: update.volume,
            ..before.clone()
        };

        inner.revision += 1;
        let revision = inner.revision;
        inner.records.insert(id.to_string(), after.clone());

        Ok(Some(AppliedUpdate {
            before,
            after,
            revision,
        }))
    }

    // 쓰기는 항상 레코드 전체 교체라 poison 상태여도 찢어진 레코드는 없다
    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
