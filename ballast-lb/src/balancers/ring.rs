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

use std::{
    fmt::Debug,
    hash::{Hash, Hasher},
    sync::Arc,
};

use ballast_configuration::config::load_balancer::RingHashConfig;

use super::{hash_policy::DeterministicBuildHasher, normalize::NormalizedHostWeights, HashingLoadBalancer, TableBuilder};
use crate::endpoint::EndpointWithAuthority;

/// Builds ketama rings sized so the lightest host gets at least one slot.
#[derive(Debug, Clone, Copy)]
pub struct RingHashBuilder {
    min_ring_size: u64,
    max_ring_size: u64,
}

impl RingHashBuilder {
    pub fn new(config: &RingHashConfig) -> Self {
        Self { min_ring_size: config.minimum_ring_size(), max_ring_size: config.maximum_ring_size() }
    }
}

impl From<&RingHashConfig> for RingHashBuilder {
    fn from(value: &RingHashConfig) -> Self {
        Self::new(value)
    }
}

impl Default for RingHashBuilder {
    fn default() -> Self {
        Self::new(&RingHashConfig::default())
    }
}

impl<E> TableBuilder<E> for RingHashBuilder
where
    E: EndpointWithAuthority + Debug + Send + Sync + 'static,
{
    fn build(&self, weights: &NormalizedHostWeights<E>) -> Arc<dyn HashingLoadBalancer<E>> {
        Arc::new(RingHashBalancer::new(weights, self.min_ring_size, self.max_ring_size))
    }
}

#[derive(Debug)]
pub struct RingHashBalancer<E> {
    items: Vec<Arc<E>>,
    ring: Vec<(u64, usize)>,
}

impl<E> RingHashBalancer<E>
where
    E: EndpointWithAuthority,
{
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn new(weights: &NormalizedHostWeights<E>, min_ring_size: u64, max_ring_size: u64) -> Self {
        let items: Vec<_> = weights.iter().map(|(host, _)| Arc::clone(host)).collect();

        // Scale so the lightest host gets at least one slot, within the size limits
        let minimum_weight = weights.min_normalized_weight();
        let scale = ((minimum_weight * min_ring_size as f64).ceil() / minimum_weight).min(max_ring_size as f64);

        let mut ring = Vec::with_capacity(scale.ceil() as usize);

        // Hosts get slots until the running total reaches their cumulative target
        let mut current_slots = 0.0;
        let mut target_slots = 0.0;
        for (index, (item, weight)) in weights.iter().enumerate() {
            let item_key = item.authority();
            target_slots += weight * scale;

            let mut slot_index = 0_u64;
            while current_slots < target_slots {
                let mut hasher = DeterministicBuildHasher::build_hasher();
                item_key.hash(&mut hasher);
                slot_index.hash(&mut hasher);
                ring.push((hasher.finish(), index));
                current_slots += 1.0;
                slot_index += 1;
            }
        }

        // sorted for the binary search in `choose_host()`
        ring.sort_unstable_by_key(|(hash, _)| *hash);

        RingHashBalancer { items, ring }
    }
}

impl<E> HashingLoadBalancer<E> for RingHashBalancer<E>
where
    E: Debug + Send + Sync,
{
    fn choose_host(&self, hash: u64, attempt: u32) -> Option<Arc<E>> {
        if self.ring.is_empty() {
            return None;
        }
        // first slot at or after the hash, wrapping around, then `attempt` slots clockwise
        let first = self.ring.partition_point(|(slot_hash, _)| *slot_hash < hash);
        let ring_index = (first + attempt as usize) % self.ring.len();
        let (_, index) = self.ring.get(ring_index)?;
        self.items.get(*index).cloned()
    }

    fn table_size(&self) -> usize {
        self.ring.len()
    }
}
