//! IdGenerator port - ID 生成の抽象化
//!
//! テストで決定的な timestamp を得るために trait にしています。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（Clock の時刻 + ランダム部）

use ulid::Ulid;

use crate::domain::JobId;
use crate::ports::Clock;

/// IdGenerator は再利用されない Job ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（submit は複数タスクから同時に呼ばれる）
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// timestamp 部分に Clock を使うので、FixedClock では timestamp が揃い、
/// ランダム部分だけが異なる ID になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        JobId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
