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

use super::common::{is_default, is_prime, GenericError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPolicy {
    /// Earliest deadline first.
    #[default]
    Edf,
    /// Weighted random selection over per-weight queues.
    Wrsq,
}

/// How requests without a hash key are spread over a priority.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HashlessPolicy {
    #[default]
    Random,
    RoundRobin,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HashingPolicy {
    RingHash(RingHashConfig),
    Maglev(MaglevConfig),
}

impl Default for HashingPolicy {
    fn default() -> Self {
        Self::RingHash(RingHashConfig::default())
    }
}

#[derive(Deserialize)]
struct RawRingHashConfig {
    #[serde(default = "RingHashConfig::default_minimum")]
    minimum_ring_size: u64,
    #[serde(default = "RingHashConfig::default_maximum")]
    maximum_ring_size: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(try_from = "RawRingHashConfig")]
pub struct RingHashConfig {
    minimum_ring_size: u64,
    maximum_ring_size: u64,
}

impl RingHashConfig {
    pub const DEFAULT_MINIMUM_RING_SIZE: u64 = 1024;
    pub const DEFAULT_MAXIMUM_RING_SIZE: u64 = 8 * 1024 * 1024;

    const fn default_minimum() -> u64 {
        Self::DEFAULT_MINIMUM_RING_SIZE
    }

    const fn default_maximum() -> u64 {
        Self::DEFAULT_MAXIMUM_RING_SIZE
    }

    pub fn new(minimum_ring_size: u64, maximum_ring_size: u64) -> Result<Self, GenericError> {
        if minimum_ring_size == 0 {
            return Err(GenericError::invalid_value("minimum_ring_size", "must be greater than zero"));
        }
        if minimum_ring_size > maximum_ring_size {
            return Err(GenericError::invalid_value(
                "minimum_ring_size",
                format!("{minimum_ring_size} is larger than maximum_ring_size {maximum_ring_size}"),
            ));
        }
        Ok(Self { minimum_ring_size, maximum_ring_size })
    }

    pub fn minimum_ring_size(&self) -> u64 {
        self.minimum_ring_size
    }

    pub fn maximum_ring_size(&self) -> u64 {
        self.maximum_ring_size
    }
}

impl Default for RingHashConfig {
    fn default() -> Self {
        Self { minimum_ring_size: Self::DEFAULT_MINIMUM_RING_SIZE, maximum_ring_size: Self::DEFAULT_MAXIMUM_RING_SIZE }
    }
}

impl TryFrom<RawRingHashConfig> for RingHashConfig {
    type Error = GenericError;
    fn try_from(value: RawRingHashConfig) -> Result<Self, Self::Error> {
        Self::new(value.minimum_ring_size, value.maximum_ring_size)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct MaglevConfig {
    #[serde(default)]
    pub table_size: MaglevTableSize,
}

/// Maglev lookup table size, always a prime number.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "usize", into = "usize")]
pub struct MaglevTableSize(usize);

impl MaglevTableSize {
    pub const DEFAULT: usize = 65537;

    pub fn new(size: usize) -> Result<Self, GenericError> {
        if is_prime(size) {
            Ok(Self(size))
        } else {
            Err(GenericError::invalid_value("table_size", format!("{size} is not a prime number")))
        }
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for MaglevTableSize {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<usize> for MaglevTableSize {
    type Error = GenericError;
    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MaglevTableSize> for usize {
    fn from(value: MaglevTableSize) -> Self {
        value.0
    }
}

/// Multiplier over a host's fair share of outstanding requests, `>= 1.0`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, PartialOrd)]
#[serde(try_from = "f64", into = "f64")]
pub struct HashBalanceFactor(f64);

impl HashBalanceFactor {
    pub fn new(factor: f64) -> Result<Self, GenericError> {
        if factor.is_finite() && factor >= 1.0 {
            Ok(Self(factor))
        } else {
            Err(GenericError::invalid_value("hash_balance_factor", format!("{factor} must be a finite value >= 1.0")))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for HashBalanceFactor {
    type Error = GenericError;
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HashBalanceFactor> for f64 {
    fn from(value: HashBalanceFactor) -> Self {
        value.0
    }
}

/// Percentage of available hosts below which a priority level is in panic.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u32", into = "u32")]
pub struct PanicThreshold(u32);

impl PanicThreshold {
    pub const DEFAULT: u32 = 50;

    pub fn new(percent: u32) -> Result<Self, GenericError> {
        if percent <= 100 {
            Ok(Self(percent))
        } else {
            Err(GenericError::invalid_value("panic_threshold", format!("{percent} is not a percentage")))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PanicThreshold {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<u32> for PanicThreshold {
    type Error = GenericError;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PanicThreshold> for u32 {
    fn from(value: PanicThreshold) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, PartialOrd)]
#[serde(try_from = "f64", into = "f64")]
pub struct OverprovisioningFactor(f64);

impl OverprovisioningFactor {
    pub const DEFAULT: f64 = 1.4;

    pub fn new(factor: f64) -> Result<Self, GenericError> {
        if factor.is_finite() && factor > 0.0 {
            Ok(Self(factor))
        } else {
            Err(GenericError::invalid_value("overprovisioning_factor", format!("{factor} must be positive")))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for OverprovisioningFactor {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<f64> for OverprovisioningFactor {
    type Error = GenericError;
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OverprovisioningFactor> for f64 {
    fn from(value: OverprovisioningFactor) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
pub struct LoadBalancerConfig {
    #[serde(skip_serializing_if = "is_default", default)]
    pub scheduler: SchedulerPolicy,
    #[serde(skip_serializing_if = "is_default", default)]
    pub hashing: HashingPolicy,
    /// Enables bounded-load hashing when set.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hash_balance_factor: Option<HashBalanceFactor>,
    #[serde(skip_serializing_if = "is_default", default)]
    pub panic_threshold: PanicThreshold,
    #[serde(skip_serializing_if = "is_default", default)]
    pub overprovisioning_factor: OverprovisioningFactor,
    #[serde(skip_serializing_if = "is_default", default)]
    pub hashless_policy: HashlessPolicy,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub random_seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::{
        HashBalanceFactor, HashingPolicy, HashlessPolicy, LoadBalancerConfig, MaglevTableSize, PanicThreshold,
        RingHashConfig, SchedulerPolicy,
    };

    #[test]
    fn full_config() {
        let config: LoadBalancerConfig = serde_yaml::from_str(
            r"
scheduler: wrsq
hashing:
  maglev:
    table_size: 257
hash_balance_factor: 1.25
panic_threshold: 70
overprovisioning_factor: 1.0
hashless_policy: round_robin
random_seed: 42
",
        )
        .unwrap();
        assert_eq!(config.scheduler, SchedulerPolicy::Wrsq);
        assert!(matches!(config.hashing, HashingPolicy::Maglev(m) if m.table_size.get() == 257));
        assert_eq!(config.hash_balance_factor.map(HashBalanceFactor::get), Some(1.25));
        assert_eq!(config.panic_threshold.get(), 70);
        assert_eq!(config.hashless_policy, HashlessPolicy::RoundRobin);
        assert_eq!(config.random_seed, Some(42));
    }

    #[test]
    fn ring_hash_defaults() {
        let config: LoadBalancerConfig = serde_yaml::from_str("hashing:\n  ring_hash: {}\n").unwrap();
        assert_eq!(config.hashing, HashingPolicy::RingHash(RingHashConfig::default()));
        assert_eq!(config.panic_threshold, PanicThreshold::default());
        assert!(config.hash_balance_factor.is_none());
    }

    #[test]
    fn invalid_values() {
        assert!(HashBalanceFactor::new(0.99).is_err());
        assert!(HashBalanceFactor::new(f64::NAN).is_err());
        assert!(HashBalanceFactor::new(1.0).is_ok());
        assert!(MaglevTableSize::new(65536).is_err());
        assert!(PanicThreshold::new(101).is_err());
        assert!(RingHashConfig::new(2048, 1024).is_err());
        assert!(RingHashConfig::new(0, 1024).is_err());
    }

    #[test]
    fn serialization_skips_defaults() {
        let yaml = serde_yaml::to_string(&LoadBalancerConfig::default()).unwrap();
        assert_eq!(yaml.trim(), "{}");
    }
}
