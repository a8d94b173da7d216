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

use std::fmt::Debug;

/// Host counts of one priority level, by health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityHealth {
    pub healthy: u32,
    pub degraded: u32,
    pub total: u32,
}

impl PriorityHealth {
    /// A priority is in panic when fewer than `panic_threshold` percent of its hosts are available, or when it has
    /// no hosts at all. Panicking priorities balance over every host regardless of health.
    pub fn is_panic(&self, panic_threshold: u32) -> bool {
        if self.total == 0 {
            return true;
        }
        let available = f64::from(self.healthy) + f64::from(self.degraded);
        available * 100.0 / f64::from(self.total) < f64::from(panic_threshold)
    }

    fn availability(count: u32, total: u32, overprovisioning_factor: f64) -> f64 {
        if total == 0 {
            return 0.0;
        }
        f64::min(100.0, overprovisioning_factor * 100.0 * f64::from(count) / f64::from(total))
    }
}

/// Percentage of traffic sent to each priority, indexed by priority. Sums to 100 or is all zeros.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthyLoad(Vec<u32>);

/// Percentage of traffic sent to the degraded hosts of each priority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DegradedLoad(Vec<u32>);

impl HealthyLoad {
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

impl DegradedLoad {
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityStatus {
    pub global_panic: bool,
    pub has_hosts: bool,
}

pub struct Priority;

impl Priority {
    ///
    /// Load distribution across priorities, following Envoy's priority levels
    /// https://www.envoyproxy.io/docs/envoy/latest/intro/arch_overview/upstream/load_balancing/priority
    ///
    /// health(P_X) = min(100, overprovisioning * 100 * healthy_P_X_backends / total_P_X_backends)
    /// degraded(P_X) = min(100, overprovisioning * 100 * degraded_P_X_backends / total_P_X_backends)
    /// normalized_total = min(100, Σ health + Σ degraded)
    /// healthy_load(P_X) = min(100 - Σ(healthy_load(P_0)..healthy_load(P_X-1)), health(P_X) * 100 / normalized_total)
    /// degraded_load(P_X) takes from what the healthy loads left, in the same way
    ///
    /// Fractional loads are rounded by largest remainder so the result sums to exactly 100.
    ///
    pub fn calculate_priority_loads(
        priorities: &[PriorityHealth],
        overprovisioning_factor: f64,
    ) -> (HealthyLoad, DegradedLoad) {
        let healthy: Vec<_> = priorities
            .iter()
            .map(|p| PriorityHealth::availability(p.healthy, p.total, overprovisioning_factor))
            .collect();
        let degraded: Vec<_> = priorities
            .iter()
            .map(|p| PriorityHealth::availability(p.degraded, p.total, overprovisioning_factor))
            .collect();

        let normalized_total = f64::min(100.0, healthy.iter().chain(&degraded).sum());
        if normalized_total <= 0.0 {
            return (HealthyLoad(vec![0; priorities.len()]), DegradedLoad(vec![0; priorities.len()]));
        }

        let mut remaining = 100.0;
        let mut raw = Vec::with_capacity(priorities.len() * 2);
        for availability in healthy.iter().chain(&degraded) {
            let load = f64::min(remaining, availability * 100.0 / normalized_total);
            remaining -= load;
            raw.push(load);
        }

        let mut rounded = largest_remainder(&raw, 100);
        let degraded_loads = rounded.split_off(priorities.len());
        (HealthyLoad(rounded), DegradedLoad(degraded_loads))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn largest_remainder(raw: &[f64], target: u32) -> Vec<u32> {
    let mut rounded: Vec<u32> = raw.iter().map(|v| v.floor() as u32).collect();
    let assigned: u32 = rounded.iter().sum();
    let mut order: Vec<usize> = (0..raw.len()).collect();
    // stable, so ties go to the lower index
    order.sort_by(|a, b| (raw[*b] - raw[*b].floor()).total_cmp(&(raw[*a] - raw[*a].floor())));
    for index in order.into_iter().take(target.saturating_sub(assigned) as usize) {
        rounded[index] += 1;
    }
    rounded
}

/// Picks the priority level a request is served from.
pub trait PriorityPolicy: Debug + Send + Sync {
    fn choose_priority(
        &self,
        hash: u64,
        healthy_load: &HealthyLoad,
        degraded_load: &DegradedLoad,
        status: &[PriorityStatus],
    ) -> Option<usize>;
}

/// Maps `hash % 100` onto the cumulative healthy loads, then the degraded ones.
///
/// If that priority has no hosts, or no priority has any load, the next priority with hosts is used, wrapping
/// around.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPriorityPolicy;

impl PriorityPolicy for DefaultPriorityPolicy {
    fn choose_priority(
        &self,
        hash: u64,
        healthy_load: &HealthyLoad,
        degraded_load: &DegradedLoad,
        status: &[PriorityStatus],
    ) -> Option<usize> {
        let count = status.len();
        let point = hash % 100;
        let mut cumulative = 0_u64;
        let selected = healthy_load
            .as_slice()
            .iter()
            .enumerate()
            .chain(degraded_load.as_slice().iter().enumerate())
            .find_map(|(priority, load)| {
                cumulative += u64::from(*load);
                (point < cumulative).then_some(priority)
            })
            .unwrap_or(0);
        (0..count).map(|offset| (selected + offset) % count).find(|priority| status[*priority].has_hosts)
    }
}
