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

use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

#[derive(Default)]
pub(crate) struct DeterministicBuildHasher;

impl DeterministicBuildHasher {
    const SEED: u64 = 0;

    pub fn build_hasher() -> XxHash64 {
        XxHash64::with_seed(Self::SEED)
    }

    pub fn hash_one<T: Hash>(x: T) -> u64 {
        Self::hash_one_with_seed(x, Self::SEED)
    }

    pub fn hash_one_with_seed<T: Hash>(x: T, seed: u64) -> u64 {
        let mut hasher = XxHash64::with_seed(seed);
        x.hash(&mut hasher);
        hasher.finish()
    }
}

/// Per-request input to host selection.
pub trait LoadBalancerContext<E> {
    /// Hash of the request's affinity key. `None` means the request carries no affinity.
    fn compute_hash_key(&self) -> Option<u64> {
        None
    }

    /// Extra attempts allowed when [`LoadBalancerContext::should_select_another_host`] rejects a host.
    fn host_selection_retry_count(&self) -> u32 {
        0
    }

    fn should_select_another_host(&self, _host: &E) -> bool {
        false
    }
}

impl<E> LoadBalancerContext<E> for () {}

impl<E> LoadBalancerContext<E> for u64 {
    fn compute_hash_key(&self) -> Option<u64> {
        Some(*self)
    }
}

impl<E> LoadBalancerContext<E> for Option<u64> {
    fn compute_hash_key(&self) -> Option<u64> {
        *self
    }
}

/// A [`LoadBalancerContext`] assembled by the caller.
pub struct SelectionContext<'a, E> {
    hash_key: Option<u64>,
    retry_count: u32,
    reject: Option<&'a (dyn Fn(&E) -> bool + Sync)>,
}

impl<'a, E> SelectionContext<'a, E> {
    pub fn new() -> Self {
        Self { hash_key: None, retry_count: 0, reject: None }
    }

    #[must_use]
    pub fn with_hash_key(self, hash_key: u64) -> Self {
        Self { hash_key: Some(hash_key), ..self }
    }

    /// Uses the deterministic hash of `key`, so equal keys map to the same host across processes.
    #[must_use]
    pub fn with_affinity_key<K: Hash>(self, key: K) -> Self {
        self.with_hash_key(DeterministicBuildHasher::hash_one(key))
    }

    #[must_use]
    pub fn with_retries(self, retry_count: u32, reject: &'a (dyn Fn(&E) -> bool + Sync)) -> Self {
        Self { retry_count, reject: Some(reject), ..self }
    }
}

impl<E> Default for SelectionContext<'_, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> LoadBalancerContext<E> for SelectionContext<'_, E> {
    fn compute_hash_key(&self) -> Option<u64> {
        self.hash_key
    }

    fn host_selection_retry_count(&self) -> u32 {
        self.retry_count
    }

    fn should_select_another_host(&self, host: &E) -> bool {
        self.reject.is_some_and(|reject| reject(host))
    }
}
