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

use std::{collections::VecDeque, fmt::Debug, sync::Arc};

use rand::{rngs::SmallRng, Rng};
use rustc_hash::FxHashMap as HashMap;

use super::{check_weight, refreshed_weight, Scheduler};
use crate::Result;

struct WeightQueue<T> {
    weight: f64,
    entries: VecDeque<Arc<T>>,
}

/// Weighted random selection queue scheduler.
///
/// Entries sharing a weight live in one FIFO queue. A queue is chosen at random with probability
/// proportional to `weight * queue length`, its front entry is served and then pushed to the back of the queue
/// matching its current weight. With a single weight this is plain round robin.
pub struct WrsqScheduler<T> {
    queues: Vec<WeightQueue<T>>,
    queue_index: HashMap<u64, usize>,
    cumulative_weights: Vec<f64>,
    cumulative_weights_stale: bool,
    prepicked: VecDeque<Arc<T>>,
    len: usize,
    rng: SmallRng,
}

impl<T> WrsqScheduler<T> {
    pub fn new(rng: SmallRng) -> Self {
        Self {
            queues: Vec::new(),
            queue_index: HashMap::default(),
            cumulative_weights: Vec::new(),
            cumulative_weights_stale: false,
            prepicked: VecDeque::new(),
            len: 0,
            rng,
        }
    }

    fn enqueue(&mut self, weight: f64, value: Arc<T>) {
        let queues = &mut self.queues;
        let index = *self.queue_index.entry(weight.to_bits()).or_insert_with(|| {
            queues.push(WeightQueue { weight, entries: VecDeque::new() });
            queues.len() - 1
        });
        self.queues[index].entries.push_back(value);
    }

    /// Queue weights are scaled by the largest weight in use so that sums stay finite for any accepted weight.
    fn rebuild_cumulative_weights(&mut self) {
        let scale = self
            .queues
            .iter()
            .filter(|queue| !queue.entries.is_empty())
            .map(|queue| queue.weight)
            .fold(0.0, f64::max);
        let mut sum = 0.0;
        self.cumulative_weights.clear();
        for queue in &self.queues {
            #[allow(clippy::cast_precision_loss)]
            let queue_weight = queue.weight / scale * queue.entries.len() as f64;
            sum += queue_weight;
            self.cumulative_weights.push(sum);
        }
        self.cumulative_weights_stale = false;
    }

    fn select_queue(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        if self.cumulative_weights_stale {
            self.rebuild_cumulative_weights();
        }
        let total = self.cumulative_weights.last().copied().filter(|total| *total > 0.0)?;
        let target = self.rng.gen_range(0.0..total);
        // empty queues repeat the previous sum, so the first sum above the target is never an empty queue
        let index = self.cumulative_weights.partition_point(|sum| *sum <= target);
        Some(index.min(self.queues.len() - 1))
    }

    fn pick(&mut self, weight_fn: &dyn Fn(&T) -> f64) -> Option<Arc<T>> {
        let index = self.select_queue()?;
        let queue = &mut self.queues[index];
        let value = queue.entries.pop_front()?;
        let weight = refreshed_weight(queue.weight, weight_fn(&*value));
        if weight.to_bits() == queue.weight.to_bits() {
            queue.entries.push_back(Arc::clone(&value));
        } else {
            self.enqueue(weight, Arc::clone(&value));
            self.cumulative_weights_stale = true;
        }
        Some(value)
    }
}

impl<T> Debug for WrsqScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrsqScheduler")
            .field("entries", &self.len)
            .field("queues", &self.queues.iter().map(|q| (q.weight, q.entries.len())).collect::<Vec<_>>())
            .field("prepicked", &self.prepicked.len())
            .finish_non_exhaustive()
    }
}

impl<T> Scheduler<T> for WrsqScheduler<T> {
    fn add(&mut self, weight: f64, value: Arc<T>) -> Result<()> {
        let weight = check_weight(weight)?;
        self.enqueue(weight, value);
        self.len += 1;
        self.cumulative_weights_stale = true;
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
        self.len
    }
}
