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
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use arc_swap::ArcSwap;

/// Latest published value plus a version that increases on every publication.
///
/// Readers never lock: they either hold on to an `Arc` they loaded earlier or compare versions to find out
/// whether a newer value exists.
pub struct SnapshotCell<T> {
    value: ArcSwap<T>,
    version: AtomicU64,
}

impl<T> SnapshotCell<T> {
    pub fn new(value: T) -> Self {
        Self { value: ArcSwap::from_pointee(value), version: AtomicU64::new(0) }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn publish(&self, value: T) {
        self.value.store(Arc::new(value));
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn load(&self) -> Arc<T> {
        self.value.load_full()
    }

    /// The current value with a version no newer than it.
    pub fn load_versioned(&self) -> (Arc<T>, u64) {
        let version = self.version();
        (self.load(), version)
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Debug> Debug for SnapshotCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCell").field("version", &self.version()).field("value", &self.load()).finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::SnapshotCell;

    #[test]
    fn publish_bumps_version() {
        let cell = SnapshotCell::new(vec![1]);
        let (first, version) = cell.load_versioned();
        assert_eq!(version, 0);

        cell.publish(vec![1, 2]);
        assert_eq!(cell.version(), 1);
        assert_eq!(*cell.load(), [1, 2]);
        // earlier loads stay valid
        assert_eq!(*first, [1]);
    }

    #[test]
    fn readers_see_whole_values() {
        let cell = Arc::new(SnapshotCell::new((0_u64, 0_u64)));
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let cell = Arc::clone(&cell);
                scope.spawn(move || {
                    let mut last = 0;
                    for _ in 0..10_000 {
                        let value = cell.load();
                        assert_eq!(value.0, value.1);
                        assert!(value.0 >= last);
                        last = value.0;
                    }
                });
            }
            for i in 1..=1000 {
                cell.publish((i, i));
            }
        });
        assert_eq!(cell.version(), 1000);
    }
}
