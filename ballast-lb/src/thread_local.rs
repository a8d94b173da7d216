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

use std::{cell::RefCell, fmt::Debug, sync::Arc};

use thread_local::ThreadLocal;

use crate::balancers::thread_aware::{LoadBalancer, LoadBalancerFactory};

/// Provides each thread with its own [`LoadBalancer`]. The first time a thread calls [`WorkerLocal::with`] the
/// selector is created from the factory; afterwards the same selector is reused, adopting newer snapshots as
/// they are published.
pub struct WorkerLocal<E: Send + Sync> {
    tls: ThreadLocal<RefCell<LoadBalancer<E>>>,
    factory: Arc<LoadBalancerFactory<E>>,
}

impl<E: Send + Sync> Debug for WorkerLocal<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLocal").field("factory", &self.factory).finish_non_exhaustive()
    }
}

impl<E: Send + Sync> WorkerLocal<E> {
    pub fn new(factory: Arc<LoadBalancerFactory<E>>) -> Self {
        Self { tls: ThreadLocal::new(), factory }
    }

    /// Runs `f` with this thread's selector, refreshed to the latest snapshot.
    ///
    /// Calls must not nest on the same thread.
    pub fn with<R>(&self, f: impl FnOnce(&mut LoadBalancer<E>) -> R) -> R {
        let cell = self.tls.get_or(|| RefCell::new(self.factory.create()));
        let mut lb = cell.borrow_mut();
        lb.refresh_if_stale();
        f(&mut lb)
    }
}
