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

use crate::{endpoint::WeightedEndpoint, priority_set::Locality};

/// Hosts of one priority level with weights scaled to sum to 1.
///
/// Never empty: an empty priority is represented by the absence of a value.
pub struct NormalizedHostWeights<E> {
    hosts: Vec<(Arc<E>, f64)>,
    min_normalized_weight: f64,
    max_normalized_weight: f64,
}

impl<E> NormalizedHostWeights<E> {
    fn from_weighted(hosts: Vec<(Arc<E>, f64)>) -> Option<Self> {
        let min_normalized_weight = hosts.iter().map(|(_, w)| *w).reduce(f64::min)?;
        let max_normalized_weight = hosts.iter().map(|(_, w)| *w).reduce(f64::max)?;
        Some(Self { hosts, min_normalized_weight, max_normalized_weight })
    }

    pub fn hosts(&self) -> &[(Arc<E>, f64)] {
        &self.hosts
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<E>, f64)> {
        self.hosts.iter().map(|(host, weight)| (host, *weight))
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn min_normalized_weight(&self) -> f64 {
        self.min_normalized_weight
    }

    pub fn max_normalized_weight(&self) -> f64 {
        self.max_normalized_weight
    }
}

impl<E> Clone for NormalizedHostWeights<E> {
    fn clone(&self) -> Self {
        Self {
            hosts: self.hosts.clone(),
            min_normalized_weight: self.min_normalized_weight,
            max_normalized_weight: self.max_normalized_weight,
        }
    }
}

impl<E: Debug> Debug for NormalizedHostWeights<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedHostWeights")
            .field("hosts", &self.hosts.len())
            .field("min", &self.min_normalized_weight)
            .field("max", &self.max_normalized_weight)
            .finish()
    }
}

fn weight_sum<'a, E: WeightedEndpoint + 'a>(hosts: impl IntoIterator<Item = &'a Arc<E>>) -> u64 {
    hosts.into_iter().map(|host| u64::from(host.weight())).sum()
}

#[allow(clippy::cast_precision_loss)]
fn push_scaled<E: WeightedEndpoint>(out: &mut Vec<(Arc<E>, f64)>, hosts: &[Arc<E>], total: u64, share: f64) {
    let total = total as f64;
    out.extend(
        hosts
            .iter()
            .filter(|host| host.weight() > 0)
            .map(|host| (Arc::clone(host), f64::from(host.weight()) / total * share)),
    );
}

/// Scales raw host weights to `weight / Σweight`. Zero-weight hosts are dropped.
///
/// Returns `None` when no host has a positive weight.
pub fn normalize_host_weights<E: WeightedEndpoint>(hosts: &[Arc<E>]) -> Option<NormalizedHostWeights<E>> {
    let total = weight_sum(hosts);
    if total == 0 {
        return None;
    }
    let mut normalized = Vec::with_capacity(hosts.len());
    push_scaled(&mut normalized, hosts, total, 1.0);
    NormalizedHostWeights::from_weighted(normalized)
}

/// Splits the unit weight between localities by locality weight, then between each locality's hosts by host weight.
///
/// Localities with a zero weight, or whose hosts all have a zero weight, get no share.
pub fn normalize_locality_weights<E: WeightedEndpoint>(
    localities: &[Locality<E>],
) -> Option<NormalizedHostWeights<E>> {
    let eligible: Vec<_> = localities
        .iter()
        .filter(|locality| locality.weight > 0)
        .map(|locality| (locality, weight_sum(&locality.hosts)))
        .filter(|(_, host_total)| *host_total > 0)
        .collect();
    let locality_total: u64 = eligible.iter().map(|(locality, _)| u64::from(locality.weight)).sum();
    if locality_total == 0 {
        return None;
    }

    let mut normalized = Vec::new();
    for (locality, host_total) in eligible {
        #[allow(clippy::cast_precision_loss)]
        let share = f64::from(locality.weight) / locality_total as f64;
        push_scaled(&mut normalized, &locality.hosts, host_total, share);
    }
    NormalizedHostWeights::from_weighted(normalized)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{normalize_host_weights, normalize_locality_weights};
    use crate::{endpoint::WeightedEndpoint, priority_set::Locality};

    #[derive(Debug)]
    struct Weighted(u32);

    impl WeightedEndpoint for Weighted {
        fn weight(&self) -> u32 {
            self.0
        }
    }

    fn hosts(weights: &[u32]) -> Vec<Arc<Weighted>> {
        weights.iter().map(|w| Arc::new(Weighted(*w))).collect()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn host_weights() {
        let normalized = normalize_host_weights(&hosts(&[1, 1, 2])).unwrap();
        let weights: Vec<_> = normalized.iter().map(|(_, w)| w).collect();
        assert_close(weights[0], 0.25);
        assert_close(weights[2], 0.5);
        assert_close(normalized.min_normalized_weight(), 0.25);
        assert_close(normalized.max_normalized_weight(), 0.5);
        assert_close(weights.iter().sum(), 1.0);
    }

    #[test]
    fn zero_weights_are_dropped() {
        let normalized = normalize_host_weights(&hosts(&[0, 3, 0, 1])).unwrap();
        assert_eq!(normalized.len(), 2);
        assert_close(normalized.min_normalized_weight(), 0.25);
        assert!(normalize_host_weights(&hosts(&[0, 0])).is_none());
        assert!(normalize_host_weights::<Weighted>(&[]).is_none());
    }

    #[test]
    fn large_weights_do_not_overflow() {
        let normalized = normalize_host_weights(&hosts(&[u32::MAX, u32::MAX])).unwrap();
        assert_close(normalized.max_normalized_weight(), 0.5);
    }

    #[test]
    fn locality_weights() {
        let localities = vec![
            Locality { weight: 1, hosts: hosts(&[1, 1]) },
            Locality { weight: 3, hosts: hosts(&[1, 2, 1]) },
            Locality { weight: 0, hosts: hosts(&[5]) },
            Locality { weight: 4, hosts: hosts(&[0]) },
        ];
        let normalized = normalize_locality_weights(&localities).unwrap();
        let weights: Vec<_> = normalized.iter().map(|(_, w)| w).collect();
        assert_eq!(weights.len(), 5);
        assert_close(weights[0], 0.125);
        assert_close(weights[3], 0.375);
        assert_close(weights.iter().sum(), 1.0);
        assert_close(normalized.min_normalized_weight(), 0.125);

        let empty = vec![Locality { weight: 0, hosts: hosts(&[1]) }];
        assert!(normalize_locality_weights(&empty).is_none());
    }
}
