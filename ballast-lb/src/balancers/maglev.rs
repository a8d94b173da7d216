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

use std::{fmt::Debug, sync::Arc};

use ballast_configuration::config::{is_prime, load_balancer::MaglevConfig};
use http::uri::Authority;

use super::{hash_policy::DeterministicBuildHasher, normalize::NormalizedHostWeights, HashingLoadBalancer, TableBuilder};
use crate::endpoint::EndpointWithAuthority;

#[derive(Debug, Clone, Copy)]
pub struct MaglevBuilder {
    table_size: usize,
}

impl MaglevBuilder {
    pub fn new(config: &MaglevConfig) -> Self {
        Self { table_size: config.table_size.get() }
    }
}

impl From<&MaglevConfig> for MaglevBuilder {
    fn from(value: &MaglevConfig) -> Self {
        Self::new(value)
    }
}

impl Default for MaglevBuilder {
    fn default() -> Self {
        Self::new(&MaglevConfig::default())
    }
}

impl<E> TableBuilder<E> for MaglevBuilder
where
    E: EndpointWithAuthority + Debug + Send + Sync + 'static,
{
    fn build(&self, weights: &NormalizedHostWeights<E>) -> Arc<dyn HashingLoadBalancer<E>> {
        Arc::new(MaglevBalancer::new(weights, self.table_size))
    }
}

#[derive(Debug)]
pub struct MaglevBalancer<E> {
    items: Vec<Arc<E>>,
    table: Vec<usize>,
}

impl<E> MaglevBalancer<E>
where
    E: EndpointWithAuthority,
{
    fn new(weights: &NormalizedHostWeights<E>, table_size: usize) -> Self {
        debug_assert!(is_prime(table_size), "Maglev lookup table size is not a prime number");

        // Sort the items so rebuilding the table will yield consistent results.
        let mut weighted: Vec<_> = weights.iter().map(|(host, weight)| (Arc::clone(host), weight)).collect();
        weighted
            .sort_by(|(a, _), (b, _)| authority_sorting_key(a.authority()).cmp(authority_sorting_key(b.authority())));

        let max_normalized_weight = weights.max_normalized_weight();
        let table = match weighted.len() {
            0 => Vec::new(),
            1 => vec![0; table_size],
            _ => {
                let mut permutations: Vec<Permutation> = weighted
                    .iter()
                    .map(|(item, weight)| {
                        Permutation::new(item.authority(), *weight, max_normalized_weight, table_size)
                    })
                    .collect();

                let mut table_builder = LookupTable::new(table_size);

                // This implements the pseudocode from section 3.4 of the paper
                // If there is an error in the code, it could enter an infinite loop.
                // This is why there are debug assertions.
                'table_loop: for _ in 0..table_size {
                    'item_loop: for (item_index, permutation) in permutations.iter_mut().enumerate() {
                        if table_builder.is_full() {
                            break 'table_loop;
                        }

                        // The heaviest item takes an entry every round, lighter ones less often
                        if !permutation.has_enough_weight_after_iterating() {
                            continue;
                        }

                        // A prime table size guarantees the permutation walks the whole table
                        for _ in 0..table_size {
                            if table_builder.try_update(permutation.next(), item_index) {
                                continue 'item_loop;
                            }
                        }

                        debug_assert!(false, "Maglev lookup table generator could enter an infinite loop");
                    }
                }

                table_builder.build()
            },
        };

        let items = weighted.into_iter().map(|(item, _)| item).collect();
        MaglevBalancer { items, table }
    }
}

fn authority_sorting_key(authority: &Authority) -> impl Iterator<Item = u8> + '_ {
    authority.as_str().as_bytes().iter().map(u8::to_ascii_lowercase)
}

struct LookupTable {
    table: Vec<Option<usize>>,
    filled: usize,
}

impl LookupTable {
    fn new(size: usize) -> Self {
        LookupTable { table: vec![None; size], filled: 0 }
    }

    /// Claims `index` for `value`; `false` if the entry is already taken.
    fn try_update(&mut self, index: usize, value: usize) -> bool {
        let Some(entry) = self.table.get_mut(index) else {
            debug_assert!(false, "Unexpected invalid index while constructing Maglev lookup table");
            return false;
        };
        if entry.is_some() {
            return false;
        }
        *entry = Some(value);
        self.filled += 1;
        true
    }

    fn is_full(&self) -> bool {
        self.filled >= self.table.len()
    }

    fn build(self) -> Vec<usize> {
        self.table
            .into_iter()
            .map(|entry| {
                debug_assert!(entry.is_some(), "Incomplete Maglev lookup table");
                entry.unwrap_or_default()
            })
            .collect()
    }
}

struct Permutation {
    offset: usize,
    skip: usize,
    weight: f64,
    current_weight: f64,
    target_weight: f64,
    next: usize,
    table_size: usize,
}

impl Permutation {
    const OFFSET_SEED: u64 = 0;
    const SKIP_SEED: u64 = 1;

    fn new(authority: &Authority, weight: f64, target_weight: f64, table_size: usize) -> Self {
        let offset = usize::try_from(DeterministicBuildHasher::hash_one_with_seed(authority, Self::OFFSET_SEED))
            .unwrap_or(0)
            % table_size;
        let skip = (usize::try_from(DeterministicBuildHasher::hash_one_with_seed(authority, Self::SKIP_SEED))
            .unwrap_or(0)
            % (table_size - 1))
            + 1;
        Self { offset, skip, weight, current_weight: target_weight, target_weight, next: 0, table_size }
    }

    fn has_enough_weight_after_iterating(&mut self) -> bool {
        self.current_weight += self.weight;
        let has_reached_target = self.current_weight >= self.target_weight;
        if has_reached_target {
            self.current_weight -= self.target_weight;
        }
        has_reached_target
    }

    fn next(&mut self) -> usize {
        let index = (self.offset + self.skip * self.next) % self.table_size;
        self.next += 1;
        index
    }
}

impl<E> HashingLoadBalancer<E> for MaglevBalancer<E>
where
    E: Debug + Send + Sync,
{
    fn choose_host(&self, hash: u64, attempt: u32) -> Option<Arc<E>> {
        if self.table.is_empty() {
            return None;
        }
        let size = self.table.len() as u64;
        let table_index = usize::try_from((hash % size + u64::from(attempt)) % size).ok()?;
        let index = self.table.get(table_index)?;
        self.items.get(*index).cloned()
    }

    fn table_size(&self) -> usize {
        self.table.len()
    }
}
