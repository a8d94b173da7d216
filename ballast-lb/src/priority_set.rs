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

use ballast_configuration::config::Cluster;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    balancers::priority::PriorityHealth,
    endpoint::{ActiveRequests, EndpointHealth, LbEndpoint},
    Result,
};

/// Hosts sharing a locality, with the locality's share of its priority.
#[derive(Debug)]
pub struct Locality<E> {
    pub weight: u32,
    pub hosts: Vec<Arc<E>>,
}

impl<E> Clone for Locality<E> {
    fn clone(&self) -> Self {
        Self { weight: self.weight, hosts: self.hosts.clone() }
    }
}

/// Membership of one priority level.
#[derive(Debug)]
pub struct HostSet<E> {
    priority: u32,
    hosts: Vec<Arc<E>>,
    localities: Option<Vec<Locality<E>>>,
}

impl<E> Clone for HostSet<E> {
    fn clone(&self) -> Self {
        Self { priority: self.priority, hosts: self.hosts.clone(), localities: self.localities.clone() }
    }
}

impl<E> HostSet<E> {
    fn empty(priority: u32) -> Self {
        Self { priority, hosts: Vec::new(), localities: None }
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// All hosts of the priority, including those listed under a locality.
    pub fn hosts(&self) -> &[Arc<E>] {
        &self.hosts
    }

    /// Set when the hosts were assigned through [`PrioritySet::update_localities`].
    pub fn localities(&self) -> Option<&[Locality<E>]> {
        self.localities.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl<E: EndpointHealth> HostSet<E> {
    pub fn health(&self) -> PriorityHealth {
        let total = u32::try_from(self.hosts.len()).unwrap_or(u32::MAX);
        let mut health = PriorityHealth { total, ..Default::default() };
        for host in &self.hosts {
            if host.is_healthy() {
                health.healthy += 1;
            } else if host.health().is_available() {
                health.degraded += 1;
            }
        }
        health
    }
}

pub type UpdateCallback<E> = Box<dyn Fn(&[HostSet<E>]) + Send + Sync>;

struct Inner<E> {
    host_sets: Vec<HostSet<E>>,
    callbacks: Vec<UpdateCallback<E>>,
}

/// Host membership of a cluster, organized by priority.
///
/// Updates are serialized by an internal lock and subscribers run while it is held, so they observe every change
/// in order and never concurrently. Subscribers must not update the set they are subscribed to.
pub struct PrioritySet<E> {
    inner: Mutex<Inner<E>>,
}

impl<E> Default for PrioritySet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Debug for PrioritySet<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PrioritySet")
            .field("priorities", &inner.host_sets.len())
            .field("subscribers", &inner.callbacks.len())
            .finish()
    }
}

impl<E> PrioritySet<E> {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { host_sets: Vec::new(), callbacks: Vec::new() }) }
    }

    pub fn update_hosts(&self, priority: u32, hosts: Vec<Arc<E>>) {
        self.update(priority, hosts, None);
    }

    pub fn update_localities(&self, priority: u32, localities: Vec<Locality<E>>) {
        let hosts = localities.iter().flat_map(|locality| locality.hosts.iter().cloned()).collect();
        self.update(priority, hosts, Some(localities));
    }

    fn update(&self, priority: u32, hosts: Vec<Arc<E>>, localities: Option<Vec<Locality<E>>>) {
        let mut inner = self.inner.lock();
        let index = priority as usize;
        while inner.host_sets.len() <= index {
            let next = u32::try_from(inner.host_sets.len()).unwrap_or(u32::MAX);
            inner.host_sets.push(HostSet::empty(next));
        }
        debug!(priority, hosts = hosts.len(), "Updating host set");
        inner.host_sets[index] = HostSet { priority, hosts, localities };

        let Inner { host_sets, callbacks } = &*inner;
        for callback in callbacks {
            callback(host_sets);
        }
    }

    /// Registers `callback` for every future update and runs it once with the current host sets.
    pub fn subscribe(&self, callback: UpdateCallback<E>) {
        let mut inner = self.inner.lock();
        callback(&inner.host_sets);
        inner.callbacks.push(callback);
    }

    pub fn host_sets(&self) -> Vec<HostSet<E>> {
        self.inner.lock().host_sets.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().host_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PrioritySet<LbEndpoint> {
    /// Builds the host sets of a configured cluster. All endpoints share one cluster-wide request counter.
    ///
    /// A priority whose localities carry a weight is assigned by locality; unweighted localities then get none
    /// of the traffic.
    pub fn from_cluster(cluster: &Cluster) -> Result<Self> {
        let set = Self::new();
        let Some(max_priority) = cluster.max_priority() else {
            return Ok(set);
        };
        let cluster_load = Arc::new(ActiveRequests::default());

        for priority in 0..=max_priority {
            let groups: Vec<_> = cluster.endpoints.iter().filter(|l| l.priority == priority).collect();
            let mut localities = Vec::with_capacity(groups.len());
            for group in &groups {
                let hosts = group
                    .lb_endpoints
                    .iter()
                    .map(|endpoint| LbEndpoint::from_config(&cluster.name, endpoint, &cluster_load).map(Arc::new))
                    .collect::<Result<Vec<_>>>()?;
                localities.push(Locality { weight: group.load_balancing_weight.unwrap_or(0), hosts });
            }

            if groups.iter().any(|group| group.load_balancing_weight.is_some()) {
                set.update_localities(priority, localities);
            } else {
                set.update_hosts(priority, localities.into_iter().flat_map(|locality| locality.hosts).collect());
            }
        }
        Ok(set)
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use ballast_configuration::config::Cluster;

    use super::{Locality, PrioritySet};
    use crate::{
        balancers::{priority::PriorityHealth, test_util::endpoints},
        endpoint::{EndpointWithLoad, LbEndpoint},
    };

    #[test]
    fn updates_grow_priorities() {
        let set = PrioritySet::new();
        set.update_hosts(2, endpoints(&[1, 1]));
        let host_sets = set.host_sets();
        assert_eq!(host_sets.len(), 3);
        assert!(host_sets[0].is_empty());
        assert!(host_sets[1].is_empty());
        assert_eq!(host_sets[1].priority(), 1);
        assert_eq!(host_sets[2].hosts().len(), 2);
        assert!(host_sets[2].localities().is_none());
    }

    #[test]
    fn subscribers_see_every_update() {
        let set = PrioritySet::<LbEndpoint>::new();
        set.update_hosts(0, endpoints(&[1]));

        let calls = Arc::new(AtomicUsize::new(0));
        let hosts_seen = Arc::new(AtomicUsize::new(0));
        let (c, h) = (Arc::clone(&calls), Arc::clone(&hosts_seen));
        set.subscribe(Box::new(move |host_sets| {
            c.fetch_add(1, Ordering::SeqCst);
            h.store(host_sets.iter().map(|s| s.hosts().len()).sum(), Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(hosts_seen.load(Ordering::SeqCst), 1);

        set.update_localities(
            1,
            vec![Locality { weight: 1, hosts: endpoints(&[1, 1]) }, Locality { weight: 2, hosts: endpoints(&[3]) }],
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(hosts_seen.load(Ordering::SeqCst), 4);
        assert_eq!(set.host_sets()[1].localities().map(<[_]>::len), Some(2));
    }

    #[test]
    fn from_cluster() {
        let cluster: Cluster = serde_yaml::from_str(
            r"
name: backends
endpoints:
  - priority: 0
    lb_endpoints:
      - address: 10.0.0.1:80
      - address: 10.0.0.2:80
        health_status: degraded
      - address: 10.0.0.3:80
        health_status: unhealthy
  - priority: 2
    load_balancing_weight: 2
    lb_endpoints:
      - 10.0.2.1:80
",
        )
        .unwrap();
        let set = PrioritySet::from_cluster(&cluster).unwrap();
        let host_sets = set.host_sets();
        assert_eq!(host_sets.len(), 3);
        assert_eq!(host_sets[0].health(), PriorityHealth { healthy: 1, degraded: 1, total: 3 });
        assert!(host_sets[0].localities().is_none());
        assert!(host_sets[1].is_empty());
        assert_eq!(host_sets[2].localities().map(|l| l[0].weight), Some(2));

        let guard = host_sets[0].hosts()[0].start_request();
        assert_eq!(host_sets[2].hosts()[0].cluster_active_requests(), 1);
        drop(guard);
    }

    #[test]
    fn empty_cluster() {
        assert!(PrioritySet::from_cluster(&Cluster::default()).unwrap().is_empty());
    }
}
