/// Process-wide Thompson Sampling state: a mapping from `(main_id, rec_id)`
/// to Beta distribution parameters `(alpha, beta)`, with per-shard
/// synchronization so a sample never observes a torn `(alpha, beta)` pair
/// and a cap-rescale is atomic from any other sampler's perspective. Uses
/// `rand_distr::Beta` for sampling.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution};

use crate::errors::RecoError;

const SHARD_COUNT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arm {
    pub alpha: f64,
    pub beta: f64,
    pub updated_at: DateTime<Utc>,
}

impl Arm {
    pub fn expected(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }
}

pub type ArmKey = (i64, i64);

/// Durable counterpart of the `arm_stats` table: loaded wholesale at startup,
/// upserted by primary key on every successful feedback.
#[async_trait]
pub trait ArmStore: Send + Sync {
    async fn load_all_arms(&self) -> Result<Vec<(ArmKey, Arm)>, RecoError>;
    async fn upsert_arm(&self, key: ArmKey, arm: Arm) -> Result<(), RecoError>;
}

fn shard_index(key: ArmKey) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}

pub struct BanditState {
    shards: Vec<Mutex<HashMap<ArmKey, Arm>>>,
    rng: Mutex<SmallRng>,
    init_strength: f64,
    max_total: f64,
}

impl BanditState {
    pub fn new(init_strength: f64, max_total: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        BanditState {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            rng: Mutex::new(rng),
            init_strength,
            max_total,
        }
    }

    pub async fn load_from_store(
        store: &dyn ArmStore,
        init_strength: f64,
        max_total: f64,
        seed: Option<u64>,
    ) -> Result<Self, RecoError> {
        let bandit = BanditState::new(init_strength, max_total, seed);
        bandit.reload_from_store(store).await?;
        Ok(bandit)
    }

    /// Replaces the in-memory map wholesale from the durable store.
    pub async fn reload_from_store(&self, store: &dyn ArmStore) -> Result<(), RecoError> {
        let rows = store.load_all_arms().await?;
        for shard in &self.shards {
            shard.lock().expect("bandit shard lock poisoned").clear();
        }
        for (key, arm) in rows {
            let mut shard = self.shards[shard_index(key)].lock().expect("bandit shard lock poisoned");
            shard.insert(key, arm);
        }
        Ok(())
    }

    fn init_arm(&self, prior: Option<f64>) -> Arm {
        let now = Utc::now();
        match prior {
            // `s` falls back to 0.5 when a caller has some notion of a prior
            // context but couldn't resolve a value; the scorer never actually
            // calls with this fallback since it always resolves a real prior,
            // so in practice this path only matters for Some(0.5) passed
            // explicitly.
            Some(s) => {
                let s = s.clamp(0.0, 1.0);
                let i = self.init_strength;
                Arm { alpha: 1.0 + s * i, beta: 1.0 + (1.0 - s) * i, updated_at: now }
            }
            // No prior known at all: degenerate to Beta(1,1), uniform.
            None => Arm { alpha: 1.0, beta: 1.0, updated_at: now },
        }
    }

    fn get_or_init(&self, key: ArmKey, prior: Option<f64>) -> Arm {
        let mut shard = self.shards[shard_index(key)].lock().expect("bandit shard lock poisoned");
        if let Some(arm) = shard.get(&key) {
            return *arm;
        }
        let arm = self.init_arm(prior);
        shard.insert(key, arm);
        arm
    }

    /// Draws one sample `x ~ Beta(alpha, beta)`, lazily initializing the arm
    /// from `prior` if it doesn't exist yet.
    pub fn sample(&self, key: ArmKey, prior: Option<f64>) -> f64 {
        let arm = self.get_or_init(key, prior);
        let dist = Beta::new(arm.alpha, arm.beta).expect("alpha and beta are always > 0");
        let mut rng = self.rng.lock().expect("bandit rng lock poisoned");
        dist.sample(&mut *rng)
    }

    pub fn expected(&self, key: ArmKey) -> Option<f64> {
        self.stats(key).map(|arm| arm.expected())
    }

    pub fn stats(&self, key: ArmKey) -> Option<Arm> {
        self.shards[shard_index(key)]
            .lock()
            .expect("bandit shard lock poisoned")
            .get(&key)
            .copied()
    }

    /// Applies a feedback update and returns the post-update arm. Caller is
    /// responsible for writing it through to the durable store.
    pub fn update(&self, key: ArmKey, is_relevant: bool, update_strength: f64) -> Arm {
        let mut shard = self.shards[shard_index(key)].lock().expect("bandit shard lock poisoned");
        let mut arm = shard.get(&key).copied().unwrap_or_else(|| self.init_arm(None));

        if is_relevant {
            arm.alpha += update_strength;
        } else {
            arm.beta += update_strength;
        }

        let total = arm.alpha + arm.beta;
        if total > self.max_total {
            let scale = self.max_total / total;
            // Floor at 1.0: a bare proportional rescale can drive the
            // untouched side below 1 under a long run of same-direction
            // feedback (the scale factor compounds below 1 every update
            // once capped). The floor keeps alpha/beta >= 1 always, at the
            // cost of the total occasionally sitting a little above
            // max_total in that regime - bounded by how far under 1 the
            // proportional value would otherwise have fallen.
            arm.alpha = (arm.alpha * scale).max(1.0);
            arm.beta = (arm.beta * scale).max(1.0);
        }
        arm.updated_at = Utc::now();

        shard.insert(key, arm);
        arm
    }

    /// `n = max(0, round((alpha + beta - (2 + I)) / U))`. Assumes arms were
    /// all initialized under the `2 + I` baseline prior; clamps at zero
    /// rather than trusting a stored count.
    pub fn feedback_count(&self, key: ArmKey, update_strength: f64) -> u64 {
        let Some(arm) = self.stats(key) else { return 0 };
        if update_strength <= 0.0 {
            return 0;
        }
        let n = ((arm.alpha + arm.beta - (2.0 + self.init_strength)) / update_strength).round();
        n.max(0.0) as u64
    }
}
