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

pub mod bounded_load;
pub mod hash_policy;
pub mod maglev;
pub mod normalize;
pub mod priority;
pub mod ring;
pub mod thread_aware;

use std::{fmt::Debug, sync::Arc};

use ballast_configuration::config::load_balancer::HashingPolicy;

use self::{maglev::MaglevBuilder, normalize::NormalizedHostWeights, ring::RingHashBuilder};
use crate::endpoint::EndpointWithAuthority;

/// Immutable consistent-hashing table for one priority level.
pub trait HashingLoadBalancer<E>: Debug + Send + Sync {
    /// Maps a request hash to a host. Equal inputs on the same table always yield the same host, and each
    /// `attempt` explores a reproducible alternative.
    fn choose_host(&self, hash: u64, attempt: u32) -> Option<Arc<E>>;

    /// Number of entries in the table.
    fn table_size(&self) -> usize;
}

pub trait TableBuilder<E>: Debug + Send + Sync {
    fn build(&self, weights: &NormalizedHostWeights<E>) -> Arc<dyn HashingLoadBalancer<E>>;
}

#[derive(Debug, Clone, Copy)]
pub enum AnyTableBuilder {
    RingHash(RingHashBuilder),
    Maglev(MaglevBuilder),
}

impl From<&HashingPolicy> for AnyTableBuilder {
    fn from(value: &HashingPolicy) -> Self {
        match value {
            HashingPolicy::RingHash(config) => Self::RingHash(RingHashBuilder::from(config)),
            HashingPolicy::Maglev(config) => Self::Maglev(MaglevBuilder::from(config)),
        }
    }
}

impl<E> TableBuilder<E> for AnyTableBuilder
where
    E: EndpointWithAuthority + Debug + Send + Sync + 'static,
{
    fn build(&self, weights: &NormalizedHostWeights<E>) -> Arc<dyn HashingLoadBalancer<E>> {
        match self {
            Self::RingHash(builder) => builder.build(weights),
            Self::Maglev(builder) => builder.build(weights),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use http::uri::Authority;

    use crate::endpoint::{ActiveRequests, LbEndpoint};

    pub fn get_authority(port: u32) -> Authority {
        Authority::try_from(format!("example.com:{port}")).unwrap()
    }

    /// Endpoints `example.com:800X` with the given weights, where `X` is the position in `weights`.
    /// They share one cluster-wide request counter.
    pub fn endpoints(weights: &[u32]) -> Vec<Arc<LbEndpoint>> {
        let cluster_load = Arc::new(ActiveRequests::default());
        (0_u32..)
            .zip(weights)
            .map(|(value, weight)| {
                Arc::new(
                    LbEndpoint::builder()
                        .with_authority(get_authority(8000 + value))
                        .with_weight(*weight)
                        .with_cluster_load(Arc::clone(&cluster_load))
                        .build(),
                )
            })
            .collect()
    }

    pub fn port(endpoint: &LbEndpoint) -> usize {
        usize::from(endpoint.authority.port_u16().unwrap_or_default() - 8000)
    }

    pub fn distribution_within_margin(a: &[f64], b: &[f64], error_margin: f64) {
        for (value_a, value_b) in a.iter().zip(b.iter()) {
            assert!(
                (value_a - value_b).abs() / value_b < error_margin,
                "Value {} is {:+.1}% of {} which is not within {:.1}%, when comparing [{}] to [{}]",
                value_a,
                (value_a - value_b) * 100. / value_b,
                value_b,
                error_margin * 100.0,
                a.iter().map(|count| format!("{:.1}%", count * 100.)).collect::<Vec<_>>().join(", "),
                b.iter().map(|count| format!("{:.1}%", count * 100.)).collect::<Vec<_>>().join(", "),
            );
        }
    }
}
