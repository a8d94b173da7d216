// SPDX-FileCopyrightText: © 2025 Huawei Cloud Computing Technologies Co., Ltd
// SPDX-License-Identifier: Apache-2.0
//
// Copyright 2025 Huawei Cloud Computing Technologies Co., Ltd
//
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
//

//! Weighted selection among a dynamic set of entries.
//!
//! Two interchangeable strategies are provided: earliest deadline first ([`EdfScheduler`]) and
//! weighted random selection over per-weight FIFO queues ([`WrsqScheduler`]). Both hand out entries in
//! proportion to their weights and never starve an entry with a positive weight.

mod edf;
mod wrsq;

use std::sync::Arc;

use ballast_configuration::config::load_balancer::SchedulerPolicy;
use rand::rngs::SmallRng;
use tracing::debug;

pub use edf::EdfScheduler;
pub use wrsq::WrsqScheduler;

use crate::{Error, Result};

pub trait Scheduler<T> {
    /// Inserts `value` with the given weight, which must be finite and positive.
    fn add(&mut self, weight: f64, value: Arc<T>) -> Result<()>;

    /// Picks the next entry and requeues it with the weight currently reported by `weight_fn`.
    fn pick_and_requeue(&mut self, weight_fn: &dyn Fn(&T) -> f64) -> Option<Arc<T>>;

    /// Returns the entry a future [`Scheduler::pick_and_requeue`] will yield without consuming it.
    ///
    /// Each call looks one pick further ahead. Peeked entries are then handed out by
    /// `pick_and_requeue` in the order they were peeked.
    fn peek_again(&mut self, weight_fn: &dyn Fn(&T) -> f64) -> Option<Arc<T>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_weight(weight: f64) -> Result<f64> {
    if weight.is_finite() && weight > 0.0 {
        Ok(weight)
    } else {
        Err(Error::InvalidWeight(weight))
    }
}

fn refreshed_weight(previous: f64, current: f64) -> f64 {
    if current.is_finite() && current > 0.0 {
        current
    } else {
        debug!(previous, current, "Ignoring non-positive weight, keeping the previous one");
        previous
    }
}

#[derive(Debug)]
pub enum WeightedScheduler<T> {
    Edf(EdfScheduler<T>),
    Wrsq(WrsqScheduler<T>),
}

impl<T> WeightedScheduler<T> {
    /// `rng` is only consumed by the WRSQ strategy.
    pub fn new(policy: SchedulerPolicy, rng: SmallRng) -> Self {
        match policy {
            SchedulerPolicy::Edf => Self::Edf(EdfScheduler::new()),
            SchedulerPolicy::Wrsq => Self::Wrsq(WrsqScheduler::new(rng)),
        }
    }

    pub fn with_entries(
        policy: SchedulerPolicy,
        rng: SmallRng,
        entries: impl IntoIterator<Item = (f64, Arc<T>)>,
    ) -> Result<Self> {
        let mut scheduler = Self::new(policy, rng);
        for (weight, value) in entries {
            scheduler.add(weight, value)?;
        }
        Ok(scheduler)
    }

    pub fn policy(&self) -> SchedulerPolicy {
        match self {
            Self::Edf(_) => SchedulerPolicy::Edf,
            Self::Wrsq(_) => SchedulerPolicy::Wrsq,
        }
    }
}

impl<T> Scheduler<T> for WeightedScheduler<T> {
    fn add(&mut self, weight: f64, value: Arc<T>) -> Result<()> {
        match self {
            Self::Edf(s) => s.add(weight, value),
            Self::Wrsq(s) => s.add(weight, value),
        }
    }

    fn pick_and_requeue(&mut self, weight_fn: &dyn Fn(&T) -> f64) -> Option<Arc<T>> {
        match self {
            Self::Edf(s) => s.pick_and_requeue(weight_fn),
            Self::Wrsq(s) => s.pick_and_requeue(weight_fn),
        }
    }

    fn peek_again(&mut self, weight_fn: &dyn Fn(&T) -> f64) -> Option<Arc<T>> {
        match self {
            Self::Edf(s) => s.peek_again(weight_fn),
            Self::Wrsq(s) => s.peek_again(weight_fn),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Edf(s) => s.len(),
            Self::Wrsq(s) => s.len(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use ballast_configuration::config::load_balancer::SchedulerPolicy;
    use rand::{rngs::SmallRng, SeedableRng};

    use super::{Scheduler, WeightedScheduler};
    use crate::Error;

    fn schedulers() -> [WeightedScheduler<u32>; 2] {
        [
            WeightedScheduler::new(SchedulerPolicy::Edf, SmallRng::seed_from_u64(1)),
            WeightedScheduler::new(SchedulerPolicy::Wrsq, SmallRng::seed_from_u64(1)),
        ]
    }

    #[test]
    fn rejects_invalid_weights() {
        for mut scheduler in schedulers() {
            for weight in [0.0, -1.0, f64::NAN, f64::INFINITY] {
                assert!(matches!(scheduler.add(weight, Arc::new(1)), Err(Error::InvalidWeight(_))));
            }
            assert!(scheduler.is_empty());
        }
    }

    #[test]
    fn empty_picks_nothing() {
        for mut scheduler in schedulers() {
            assert!(scheduler.pick_and_requeue(&|_| 1.0).is_none());
            assert!(scheduler.peek_again(&|_| 1.0).is_none());
        }
    }

    #[test]
    fn single_entry_is_always_picked() {
        for mut scheduler in schedulers() {
            scheduler.add(3.0, Arc::new(7)).unwrap();
            for _ in 0..10 {
                assert_eq!(scheduler.pick_and_requeue(&|_| 3.0).as_deref(), Some(&7));
            }
            assert_eq!(scheduler.len(), 1);
        }
    }

    #[test]
    fn peeked_entries_are_picked_in_order() {
        for mut scheduler in schedulers() {
            let policy = scheduler.policy();
            for (i, w) in [1.0, 2.0, 3.0, 1.0].into_iter().enumerate() {
                scheduler.add(w, Arc::new(u32::try_from(i).unwrap())).unwrap();
            }
            let weight = |v: &u32| f64::from(*v % 3 + 1);
            let peeked: Vec<_> = (0..5).map(|_| *scheduler.peek_again(&weight).unwrap()).collect();
            let picked: Vec<_> = (0..5).map(|_| *scheduler.pick_and_requeue(&weight).unwrap()).collect();
            assert_eq!(peeked, picked, "{policy:?}");
        }
    }

    #[test]
    fn non_positive_weight_keeps_previous() {
        for mut scheduler in schedulers() {
            scheduler.add(1.0, Arc::new(0)).unwrap();
            scheduler.add(1.0, Arc::new(1)).unwrap();
            let mut counts = [0u32; 2];
            for _ in 0..1000 {
                let v = scheduler.pick_and_requeue(&|_| 0.0).unwrap();
                counts[*v as usize] += 1;
            }
            assert!(counts.iter().all(|c| *c > 0), "{counts:?}");
        }
    }
}
