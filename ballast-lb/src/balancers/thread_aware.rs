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
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use ballast_configuration::config::load_balancer::{HashlessPolicy, LoadBalancerConfig, SchedulerPolicy};
use parking_lot::Mutex;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing::{debug, trace, warn};

use super::{
    bounded_load::{active_request_predicate, BoundedLoadHashingLoadBalancer, HostOverloadedPredicate},
    hash_policy::LoadBalancerContext,
    normalize::{normalize_host_weights, normalize_locality_weights, NormalizedHostWeights},
    priority::{DefaultPriorityPolicy, DegradedLoad, HealthyLoad, Priority, PriorityPolicy, PriorityStatus},
    AnyTableBuilder, HashingLoadBalancer, TableBuilder,
};
use crate::{
    endpoint::{Endpoint, EndpointHealth, EndpointWithLoad},
    priority_set::{HostSet, Locality, PrioritySet},
    scheduler::{Scheduler, WeightedScheduler},
    snapshot::SnapshotCell,
};

pub struct PerPriorityState<E> {
    hashing_lb: Option<Arc<dyn HashingLoadBalancer<E>>>,
    weights: Option<NormalizedHostWeights<E>>,
    global_panic: bool,
}

impl<E> PerPriorityState<E> {
    /// `None` exactly when the priority has no host with a positive weight.
    pub fn hashing_lb(&self) -> Option<&Arc<dyn HashingLoadBalancer<E>>> {
        self.hashing_lb.as_ref()
    }

    pub fn normalized_weights(&self) -> Option<&NormalizedHostWeights<E>> {
        self.weights.as_ref()
    }

    pub fn global_panic(&self) -> bool {
        self.global_panic
    }
}

impl<E: Debug> Debug for PerPriorityState<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerPriorityState")
            .field("hashing_lb", &self.hashing_lb)
            .field("global_panic", &self.global_panic)
            .finish_non_exhaustive()
    }
}

/// Everything a worker needs to select hosts, published as a whole on every membership change.
#[derive(Debug)]
pub struct Snapshot<E> {
    per_priority_state: Vec<PerPriorityState<E>>,
    priority_status: Vec<PriorityStatus>,
    healthy_load: HealthyLoad,
    degraded_load: DegradedLoad,
}

impl<E> Snapshot<E> {
    fn empty() -> Self {
        Self {
            per_priority_state: Vec::new(),
            priority_status: Vec::new(),
            healthy_load: HealthyLoad::default(),
            degraded_load: DegradedLoad::default(),
        }
    }

    pub fn per_priority_state(&self) -> &[PerPriorityState<E>] {
        &self.per_priority_state
    }

    pub fn priority_status(&self) -> &[PriorityStatus] {
        &self.priority_status
    }

    pub fn healthy_load(&self) -> &HealthyLoad {
        &self.healthy_load
    }

    pub fn degraded_load(&self) -> &DegradedLoad {
        &self.degraded_load
    }
}

/// Consistent-hashing load balancer shared by all worker threads.
///
/// Host membership changes are turned into immutable [`Snapshot`]s: one hash table per priority level, optionally
/// wrapped with bounded load, plus the traffic split between priorities. Workers select hosts through their own
/// [`LoadBalancer`], obtained from [`ThreadAwareLoadBalancer::create`], without taking any lock.
pub struct ThreadAwareLoadBalancer<E> {
    priority_set: Arc<PrioritySet<E>>,
    config: LoadBalancerConfig,
    table_builder: Arc<dyn TableBuilder<E>>,
    overload_predicate: Option<HostOverloadedPredicate<E>>,
    factory: Arc<LoadBalancerFactory<E>>,
    initialized: AtomicBool,
}

impl<E> Debug for ThreadAwareLoadBalancer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadAwareLoadBalancer")
            .field("priority_set", &self.priority_set)
            .field("config", &self.config)
            .field("table_builder", &self.table_builder)
            .field("bounded_load", &self.overload_predicate.is_some())
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<E: Endpoint> ThreadAwareLoadBalancer<E> {
    pub fn new(priority_set: Arc<PrioritySet<E>>, config: LoadBalancerConfig) -> Self {
        Self {
            priority_set,
            config,
            table_builder: Arc::new(AnyTableBuilder::from(&config.hashing)),
            overload_predicate: None,
            factory: Arc::new(LoadBalancerFactory::new(&config, Arc::new(DefaultPriorityPolicy))),
            initialized: AtomicBool::new(false),
        }
    }

    /// Replaces the hash table chosen by the configuration.
    #[must_use]
    pub fn with_table_builder(self, table_builder: Arc<dyn TableBuilder<E>>) -> Self {
        Self { table_builder, ..self }
    }

    /// Takes effect for selectors created afterwards.
    #[must_use]
    pub fn with_priority_policy(self, policy: Arc<dyn PriorityPolicy>) -> Self {
        let factory = Arc::new(LoadBalancerFactory::new(&self.config, policy));
        Self { factory, ..self }
    }

    /// Enables bounded load with a custom overload check. Ignored unless a hash balance factor is configured.
    #[must_use]
    pub fn with_overload_predicate(self, predicate: HostOverloadedPredicate<E>) -> Self {
        Self { overload_predicate: Some(predicate), ..self }
    }

    /// Subscribes to the priority set. The first refresh runs before this returns.
    pub fn initialize(self: &Arc<Self>) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            warn!("Thread aware load balancer is already initialized");
            return;
        }
        if self.config.hash_balance_factor.is_some() && self.overload_predicate.is_none() {
            warn!("Hash balance factor is set without an overload predicate, bounded load is disabled");
        }
        let this = Arc::downgrade(self);
        self.priority_set.subscribe(Box::new(move |host_sets| {
            if let Some(this) = this.upgrade() {
                this.refresh(host_sets);
            }
        }));
    }

    /// Rebuilds the per-priority tables from `host_sets` and publishes the result.
    pub fn refresh(&self, host_sets: &[HostSet<E>]) {
        let health: Vec<_> = host_sets.iter().map(HostSet::health).collect();
        let (healthy_load, degraded_load) =
            Priority::calculate_priority_loads(&health, self.config.overprovisioning_factor.get());
        let panic_threshold = self.config.panic_threshold.get();

        let mut per_priority_state = Vec::with_capacity(host_sets.len());
        let mut priority_status = Vec::with_capacity(host_sets.len());
        for (host_set, health) in host_sets.iter().zip(&health) {
            let in_panic = health.is_panic(panic_threshold);
            if in_panic && !host_set.is_empty() {
                debug!(priority = host_set.priority(), ?health, "Priority is in panic, balancing over all hosts");
            }
            let weights = normalized_weights(host_set, in_panic);
            let hashing_lb = weights.as_ref().map(|weights| self.build_table(weights));
            let global_panic = in_panic || hashing_lb.is_none();
            priority_status.push(PriorityStatus { global_panic, has_hosts: hashing_lb.is_some() });
            per_priority_state.push(PerPriorityState { hashing_lb, weights, global_panic });
        }

        debug!(
            priorities = per_priority_state.len(),
            healthy_load = ?healthy_load.as_slice(),
            degraded_load = ?degraded_load.as_slice(),
            "Publishing load balancer snapshot"
        );
        self.factory.snapshot.publish(Snapshot { per_priority_state, priority_status, healthy_load, degraded_load });
    }

    fn build_table(&self, weights: &NormalizedHostWeights<E>) -> Arc<dyn HashingLoadBalancer<E>> {
        let table = self.table_builder.build(weights);
        match (self.config.hash_balance_factor, &self.overload_predicate) {
            (Some(factor), Some(predicate)) => {
                Arc::new(BoundedLoadHashingLoadBalancer::new(table, weights, factor, Arc::clone(predicate)))
            },
            _ => table,
        }
    }

    /// A selector for one worker, starting from the current snapshot.
    pub fn create(&self) -> LoadBalancer<E> {
        self.factory.create()
    }

    pub fn factory(&self) -> &Arc<LoadBalancerFactory<E>> {
        &self.factory
    }

    pub fn snapshot(&self) -> Arc<Snapshot<E>> {
        self.factory.snapshot.load()
    }

    pub fn config(&self) -> &LoadBalancerConfig {
        &self.config
    }
}

impl<E: Endpoint + EndpointWithLoad> ThreadAwareLoadBalancer<E> {
    /// Enables bounded load on the endpoints' outstanding request counters, if a hash balance factor is configured.
    #[must_use]
    pub fn with_active_request_load(self) -> Self {
        match self.config.hash_balance_factor {
            Some(factor) => self.with_overload_predicate(active_request_predicate(factor)),
            None => self,
        }
    }
}

/// Hosts eligible in one priority: every host while in panic, otherwise the healthy and degraded ones.
fn normalized_weights<E: Endpoint>(host_set: &HostSet<E>, in_panic: bool) -> Option<NormalizedHostWeights<E>> {
    let eligible = |hosts: &[Arc<E>]| -> Vec<Arc<E>> {
        hosts.iter().filter(|host| in_panic || host.health().is_available()).cloned().collect()
    };
    match host_set.localities() {
        Some(localities) => {
            let localities: Vec<_> = localities
                .iter()
                .map(|locality| Locality { weight: locality.weight, hosts: eligible(&locality.hosts) })
                .collect();
            normalize_locality_weights(&localities)
        },
        None => normalize_host_weights(&eligible(host_set.hosts())),
    }
}

/// Hands out worker selectors over the latest published snapshot.
pub struct LoadBalancerFactory<E> {
    snapshot: SnapshotCell<Snapshot<E>>,
    seeds: Mutex<SmallRng>,
    priority_policy: Arc<dyn PriorityPolicy>,
    hashless_policy: HashlessPolicy,
    scheduler_policy: SchedulerPolicy,
}

impl<E> Debug for LoadBalancerFactory<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancerFactory")
            .field("version", &self.snapshot.version())
            .field("priority_policy", &self.priority_policy)
            .field("hashless_policy", &self.hashless_policy)
            .field("scheduler_policy", &self.scheduler_policy)
            .finish_non_exhaustive()
    }
}

impl<E> LoadBalancerFactory<E> {
    fn new(config: &LoadBalancerConfig, priority_policy: Arc<dyn PriorityPolicy>) -> Self {
        let seeds = config.random_seed.map_or_else(SmallRng::from_entropy, SmallRng::seed_from_u64);
        Self {
            snapshot: SnapshotCell::new(Snapshot::empty()),
            seeds: Mutex::new(seeds),
            priority_policy,
            hashless_policy: config.hashless_policy,
            scheduler_policy: config.scheduler,
        }
    }

    /// With a configured random seed, the n-th selector created always gets the same seed.
    pub fn create(self: &Arc<Self>) -> LoadBalancer<E> {
        let rng = SmallRng::seed_from_u64(self.seeds.lock().gen());
        let (snapshot, version) = self.snapshot.load_versioned();
        LoadBalancer { factory: Arc::clone(self), snapshot, version, rng, schedulers: Vec::new() }
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }
}

struct ScheduledHost<E> {
    host: Arc<E>,
    weight: f64,
}

/// Host selection for a single worker.
///
/// Sticks to the snapshot it was created with until [`LoadBalancer::refresh_if_stale`] adopts a newer one.
pub struct LoadBalancer<E> {
    factory: Arc<LoadBalancerFactory<E>>,
    snapshot: Arc<Snapshot<E>>,
    version: u64,
    rng: SmallRng,
    // per priority, built on first hashless pick
    schedulers: Vec<Option<WeightedScheduler<ScheduledHost<E>>>>,
}

impl<E> Debug for LoadBalancer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("version", &self.version)
            .field("priorities", &self.snapshot.per_priority_state.len())
            .finish_non_exhaustive()
    }
}

impl<E> LoadBalancer<E> {
    pub fn choose_host(&mut self, context: &impl LoadBalancerContext<E>) -> Option<Arc<E>> {
        let hash_key = context.compute_hash_key();
        let hash = hash_key.unwrap_or_else(|| self.rng.gen());
        let snapshot = &self.snapshot;
        let priority = self.factory.priority_policy.choose_priority(
            hash,
            &snapshot.healthy_load,
            &snapshot.degraded_load,
            &snapshot.priority_status,
        )?;

        let retries = context.host_selection_retry_count();
        if hash_key.is_none() && self.factory.hashless_policy == HashlessPolicy::RoundRobin {
            return self.choose_scheduled(priority, retries, context);
        }

        let table = self.snapshot.per_priority_state.get(priority)?.hashing_lb.as_ref()?;
        let mut candidate = None;
        for attempt in 0..=retries {
            let host = table.choose_host(hash, attempt)?;
            if !context.should_select_another_host(&host) {
                trace!(priority, attempt, "Selected host");
                return Some(host);
            }
            candidate = Some(host);
        }
        trace!(priority, retries, "Every attempt was rejected, keeping the last candidate");
        candidate
    }

    fn choose_scheduled(
        &mut self,
        priority: usize,
        retries: u32,
        context: &impl LoadBalancerContext<E>,
    ) -> Option<Arc<E>> {
        if self.schedulers.len() < self.snapshot.per_priority_state.len() {
            self.schedulers.resize_with(self.snapshot.per_priority_state.len(), || None);
        }
        let scheduler = match self.schedulers.get_mut(priority)? {
            Some(scheduler) => scheduler,
            slot @ None => {
                let weights = self.snapshot.per_priority_state.get(priority)?.weights.as_ref()?;
                let entries = weights
                    .iter()
                    .map(|(host, weight)| (weight, Arc::new(ScheduledHost { host: Arc::clone(host), weight })));
                let rng = SmallRng::seed_from_u64(self.rng.gen());
                match WeightedScheduler::with_entries(self.factory.scheduler_policy, rng, entries) {
                    Ok(scheduler) => slot.insert(scheduler),
                    Err(e) => {
                        debug!(priority, "Can't build hashless scheduler: {e}");
                        return None;
                    },
                }
            },
        };

        let mut candidate = None;
        for _ in 0..=retries {
            let host = Arc::clone(&scheduler.pick_and_requeue(&|entry| entry.weight)?.host);
            if !context.should_select_another_host(&host) {
                return Some(host);
            }
            candidate = Some(host);
        }
        candidate
    }

    /// Adopts the newest published snapshot, if any. Returns whether it did.
    pub fn refresh_if_stale(&mut self) -> bool {
        if self.factory.version() == self.version {
            return false;
        }
        let (snapshot, version) = self.factory.snapshot.load_versioned();
        self.snapshot = snapshot;
        self.version = version;
        self.schedulers.clear();
        true
    }

    pub fn snapshot(&self) -> &Arc<Snapshot<E>> {
        &self.snapshot
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}
