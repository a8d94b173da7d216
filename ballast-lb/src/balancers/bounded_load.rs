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

use ballast_configuration::config::load_balancer::HashBalanceFactor;
use rustc_hash::FxHashMap as HashMap;
use tracing::{debug, trace};

use super::{normalize::NormalizedHostWeights, HashingLoadBalancer};
use crate::endpoint::EndpointWithLoad;

/// Decides whether a host, given its normalized weight, already carries more than its share of load.
pub type HostOverloadedPredicate<E> = Arc<dyn Fn(&E, f64) -> bool + Send + Sync>;

/// Overload check on outstanding request counters.
///
/// With `C` requests outstanding in the cluster, a host of normalized weight `w` may hold
/// `max(1, ceil(ceil((C + 1) * factor) * w))` of them, counting the request being placed.
pub fn active_request_predicate<E>(factor: HashBalanceFactor) -> HostOverloadedPredicate<E>
where
    E: EndpointWithLoad + 'static,
{
    let factor = factor.get();
    Arc::new(move |host: &E, weight: f64| {
        let total_slots = ((f64::from(host.cluster_active_requests()) + 1.0) * factor).ceil();
        let slots = (total_slots * weight).ceil().max(1.0);
        f64::from(host.active_requests()) + 1.0 > slots
    })
}

fn host_key<E>(host: &Arc<E>) -> usize {
    Arc::as_ptr(host).cast::<()>() as usize
}

/// Consistent hashing with bounded load.
///
/// Keeps the inner table's choice unless that host is overloaded, in which case successive attempts are probed
/// until a host under its bound turns up. If every host is overloaded the first choice is kept.
pub struct BoundedLoadHashingLoadBalancer<E> {
    inner: Arc<dyn HashingLoadBalancer<E>>,
    // host identity to (dense index, normalized weight)
    weights: HashMap<usize, (usize, f64)>,
    hash_balance_factor: HashBalanceFactor,
    is_overloaded: HostOverloadedPredicate<E>,
}

impl<E> BoundedLoadHashingLoadBalancer<E> {
    pub fn new(
        inner: Arc<dyn HashingLoadBalancer<E>>,
        normalized: &NormalizedHostWeights<E>,
        hash_balance_factor: HashBalanceFactor,
        is_overloaded: HostOverloadedPredicate<E>,
    ) -> Self {
        let mut weights = HashMap::<usize, (usize, f64)>::default();
        for (host, weight) in normalized.iter() {
            // a host listed more than once keeps one index and the sum of its shares
            let next = weights.len();
            weights.entry(host_key(host)).or_insert((next, 0.0)).1 += weight;
        }
        Self { inner, weights, hash_balance_factor, is_overloaded }
    }

    pub fn hash_balance_factor(&self) -> HashBalanceFactor {
        self.hash_balance_factor
    }

    fn weight_of(&self, host: &Arc<E>) -> Option<(usize, f64)> {
        self.weights.get(&host_key(host)).copied()
    }
}

impl<E> Debug for BoundedLoadHashingLoadBalancer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedLoadHashingLoadBalancer")
            .field("inner", &self.inner)
            .field("hosts", &self.weights.len())
            .field("hash_balance_factor", &self.hash_balance_factor.get())
            .finish_non_exhaustive()
    }
}

impl<E> HashingLoadBalancer<E> for BoundedLoadHashingLoadBalancer<E>
where
    E: Debug + Send + Sync,
{
    fn choose_host(&self, hash: u64, attempt: u32) -> Option<Arc<E>> {
        let first = self.inner.choose_host(hash, attempt)?;
        let Some((first_index, first_weight)) = self.weight_of(&first) else {
            return Some(first);
        };
        if !(self.is_overloaded)(&*first, first_weight) {
            return Some(first);
        }

        let mut rejected = vec![false; self.weights.len()];
        rejected[first_index] = true;
        let mut remaining = self.weights.len() - 1;

        for probe in 1..self.inner.table_size() {
            if remaining == 0 {
                break;
            }
            let probe_attempt = attempt.wrapping_add(u32::try_from(probe).unwrap_or(u32::MAX));
            let Some(candidate) = self.inner.choose_host(hash, probe_attempt) else {
                continue;
            };
            let Some((index, weight)) = self.weight_of(&candidate) else {
                continue;
            };
            if rejected[index] {
                continue;
            }
            if !(self.is_overloaded)(&*candidate, weight) {
                trace!(probe, "Bounded load moved request off an overloaded host");
                return Some(candidate);
            }
            rejected[index] = true;
            remaining -= 1;
        }

        debug!(hosts = self.weights.len(), "All hosts are overloaded, keeping the first choice");
        Some(first)
    }

    fn table_size(&self) -> usize {
        self.inner.table_size()
    }
}
