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
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
    fmt::Debug,
    sync::Arc,
};

use super::{check_weight, refreshed_weight, Scheduler};
use crate::Result;

struct EdfEntry<T> {
    deadline: f64,
    order: u64,
    weight: f64,
    value: Arc<T>,
}

impl<T> PartialEq for EdfEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for EdfEntry<T> {}

impl<T> PartialOrd for EdfEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for EdfEntry<T> {
    // Reversed so the max-heap yields the earliest deadline, then the oldest insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.total_cmp(&self.deadline).then_with(|| other.order.cmp(&self.order))
    }
}

/// Earliest deadline first scheduler.
///
/// Each entry is due `1 / weight` units of virtual time after it was last served. Picking the entry with the
/// earliest deadline serves every entry in proportion to its weight. Ties go to the entry inserted first.
pub struct EdfScheduler<T> {
    queue: BinaryHeap<EdfEntry<T>>,
    prepicked: VecDeque<Arc<T>>,
    current_time: f64,
    order_offset: u64,
}

impl<T> EdfScheduler<T> {
    pub fn new() -> Self {
        Self { queue: BinaryHeap::new(), prepicked: VecDeque::new(), current_time: 0.0, order_offset: 0 }
    }

    fn next_order(&mut self) -> u64 {
        let order = self.order_offset;
        self.order_offset += 1;
        order
    }

    fn pick(&mut self, weight_fn: &dyn Fn(&T) -> f64) -> Option<Arc<T>> {
        let mut entry = self.queue.pop()?;
        self.current_time = entry.deadline;
        entry.weight = refreshed_weight(entry.weight, weight_fn(&*entry.value));
        entry.deadline = self.current_time + 1.0 / entry.weight;
        entry.order = self.next_order();
        let value = Arc::clone(&entry.value);
        self.queue.push(entry);
        Some(value)
    }
}

impl<T> Default for EdfScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for EdfScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdfScheduler")
            .field("entries", &self.queue.len())
            .field("prepicked", &self.prepicked.len())
            .field("current_time", &self.current_time)
            .finish()
    }
}

impl<T> Scheduler<T> for EdfScheduler<T> {
    fn add(&mut self, weight: f64, value: Arc<T>) -> Result<()> {
        let weight = check_weight(weight)?;
        let order = self.next_order();
        self.queue.push(EdfEntry { deadline: self.current_time + 1.0 / weight, order, weight, value });
        Ok(())
    }

    fn pick_and_requeue(&mut self, weight_fn: &dyn Fn(&T) -> f64) -> Option<Arc<T>> {
        if let Some(value) = self.prepicked.pop_front() {
            return Some(value);
        }
        self.pick(weight_fn)
    }

    fn peek_again(&mut self, weight_fn: &dyn Fn(&T) -> f64) -> Option<Arc<T>> {
        let value = self.pick(weight_fn)?;
        self.prepicked.push_back(Arc::clone(&value));
        Some(value)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::EdfScheduler;
    use crate::scheduler::Scheduler;

    #[test]
    fn ties_follow_insertion_order() {
        let mut edf = EdfScheduler::new();
        for v in 0..4 {
            edf.add(1.0, Arc::new(v)).unwrap();
        }
        let picks: Vec<_> = (0..8).map(|_| *edf.pick_and_requeue(&|_| 1.0).unwrap()).collect();
        assert_eq!(picks, [0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn weights_are_proportional() {
        let mut edf = EdfScheduler::new();
        edf.add(1.0, Arc::new(0usize)).unwrap();
        edf.add(3.0, Arc::new(1usize)).unwrap();
        let mut counts = [0; 2];
        for _ in 0..400 {
            counts[*edf.pick_and_requeue(&|v| if *v == 0 { 1.0 } else { 3.0 }).unwrap()] += 1;
        }
        assert!((99..=101).contains(&counts[0]), "{counts:?}");
        assert_eq!(counts[0] + counts[1], 400);
    }

    #[test]
    fn weight_changes_take_effect_on_requeue() {
        let mut edf = EdfScheduler::new();
        edf.add(1.0, Arc::new(0usize)).unwrap();
        edf.add(1.0, Arc::new(1usize)).unwrap();
        let mut counts = [0; 2];
        for _ in 0..1000 {
            counts[*edf.pick_and_requeue(&|v| if *v == 0 { 4.0 } else { 1.0 }).unwrap()] += 1;
        }
        assert!((790..=810).contains(&counts[0]), "{counts:?}");
    }
}
