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
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use ballast_configuration::config::endpoints::LbEndpoint as LbEndpointConfig;
pub use ballast_configuration::config::endpoints::HealthStatus;
use compact_str::CompactString;
use http::uri::Authority;
use typed_builder::TypedBuilder;

use crate::{Error, Result};

pub trait WeightedEndpoint {
    fn weight(&self) -> u32;
}

/// Identity of an endpoint, used as its key in hash tables.
pub trait EndpointWithAuthority {
    fn authority(&self) -> &Authority;
}

pub trait EndpointWithLoad {
    /// Requests currently outstanding on this endpoint.
    fn active_requests(&self) -> u32;
    /// Requests currently outstanding across the endpoint's cluster.
    fn cluster_active_requests(&self) -> u32;
}

pub trait EndpointHealth {
    fn health(&self) -> HealthStatus;
    fn is_healthy(&self) -> bool {
        self.health() == HealthStatus::Healthy
    }
}

pub trait Endpoint: WeightedEndpoint + EndpointWithAuthority + EndpointHealth + Debug + Send + Sync + 'static {}

impl<T> Endpoint for T where
    T: WeightedEndpoint + EndpointWithAuthority + EndpointHealth + Debug + Send + Sync + 'static
{
}

#[derive(Debug, Default)]
pub struct ActiveRequests(AtomicU32);

impl ActiveRequests {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement(&self) {
        // saturates at zero
        let _ = self.0.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }
}

#[derive(Debug, TypedBuilder)]
#[builder(field_defaults(setter(prefix = "with_")))]
pub struct LbEndpoint {
    #[builder(default, setter(into))]
    pub cluster_name: CompactString,
    pub authority: Authority,
    #[builder(default = 1)]
    pub weight: u32,
    #[builder(default)]
    pub health_status: HealthStatus,
    #[builder(default, setter(skip))]
    load: ActiveRequests,
    #[builder(default)]
    cluster_load: Arc<ActiveRequests>,
}

impl LbEndpoint {
    pub fn from_config(
        cluster_name: &CompactString,
        config: &LbEndpointConfig,
        cluster_load: &Arc<ActiveRequests>,
    ) -> Result<Self> {
        let address = config.address.to_string();
        let authority = Authority::try_from(address.as_str())
            .map_err(|source| Error::InvalidAddress { address: address.as_str().into(), source })?;
        Ok(Self::builder()
            .with_cluster_name(cluster_name.clone())
            .with_authority(authority)
            .with_weight(config.load_balancing_weight)
            .with_health_status(config.health_status)
            .with_cluster_load(Arc::clone(cluster_load))
            .build())
    }

    /// Marks a request as outstanding until the returned guard is dropped.
    pub fn start_request(self: &Arc<Self>) -> ActiveRequest {
        self.load.increment();
        self.cluster_load.increment();
        ActiveRequest { endpoint: Arc::clone(self) }
    }
}

impl PartialEq for LbEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.authority == other.authority
    }
}

impl WeightedEndpoint for LbEndpoint {
    fn weight(&self) -> u32 {
        self.weight
    }
}

impl EndpointWithAuthority for LbEndpoint {
    fn authority(&self) -> &Authority {
        &self.authority
    }
}

impl EndpointHealth for LbEndpoint {
    fn health(&self) -> HealthStatus {
        self.health_status
    }
}

impl EndpointWithLoad for LbEndpoint {
    fn active_requests(&self) -> u32 {
        self.load.get()
    }

    fn cluster_active_requests(&self) -> u32 {
        self.cluster_load.get()
    }
}

#[must_use]
#[derive(Debug)]
pub struct ActiveRequest {
    endpoint: Arc<LbEndpoint>,
}

impl ActiveRequest {
    pub fn endpoint(&self) -> &Arc<LbEndpoint> {
        &self.endpoint
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.endpoint.load.decrement();
        self.endpoint.cluster_load.decrement();
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use ballast_configuration::config::endpoints::LbEndpoint as LbEndpointConfig;
    use http::uri::Authority;

    use super::{ActiveRequests, EndpointHealth, EndpointWithLoad, HealthStatus, LbEndpoint};

    #[test]
    fn active_request_guard() {
        let cluster_load = Arc::new(ActiveRequests::default());
        let a = Arc::new(
            LbEndpoint::builder()
                .with_authority(Authority::from_static("a.example.com:80"))
                .with_cluster_load(Arc::clone(&cluster_load))
                .build(),
        );
        let b = Arc::new(
            LbEndpoint::builder()
                .with_authority(Authority::from_static("b.example.com:80"))
                .with_cluster_load(Arc::clone(&cluster_load))
                .build(),
        );

        let first = a.start_request();
        let second = a.start_request();
        let third = b.start_request();
        assert!(Arc::ptr_eq(third.endpoint(), &b));
        assert_eq!(a.active_requests(), 2);
        assert_eq!(b.active_requests(), 1);
        assert_eq!(a.cluster_active_requests(), 3);

        drop(first);
        drop(third);
        assert_eq!(a.active_requests(), 1);
        assert_eq!(b.active_requests(), 0);
        assert_eq!(cluster_load.get(), 1);
        drop(second);
        assert_eq!(cluster_load.get(), 0);
    }

    #[test]
    fn from_config() {
        let config = LbEndpointConfig {
            address: ([10, 0, 0, 1], 8080).into(),
            health_status: HealthStatus::Degraded,
            load_balancing_weight: 3,
        };
        let cluster_load = Arc::new(ActiveRequests::default());
        let endpoint = LbEndpoint::from_config(&"backends".into(), &config, &cluster_load).unwrap();
        assert_eq!(endpoint.authority.as_str(), "10.0.0.1:8080");
        assert_eq!(endpoint.weight, 3);
        assert_eq!(endpoint.health(), HealthStatus::Degraded);
        assert!(!endpoint.is_healthy());
        assert_eq!(endpoint.cluster_name, "backends");
    }
}
