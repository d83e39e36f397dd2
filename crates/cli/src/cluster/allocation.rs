// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared resource allocation. Placement prefers the requested node when
//! healthy, else the healthy capable node with the lowest combined load.
//! Conflicts on non-shareable types are resolved optimistically: commit,
//! re-read, and retry on a losing race (at most three attempts).

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::store::{AllocationRecord, NodeRecord};

use super::Coordinator;

const MAX_ALLOCATION_ATTEMPTS: usize = 3;

impl Coordinator {
    /// Best node advertising `service`: healthy, lowest cpu+memory load.
    pub fn placement_for(&self, service: &str) -> Option<NodeRecord> {
        let nodes = self.nodes.read();
        nodes
            .values()
            .filter(|n| n.is_healthy && n.services.iter().any(|s| s == service))
            .min_by(|a, b| {
                let load_a = a.cpu_usage + a.memory_usage;
                let load_b = b.cpu_usage + b.memory_usage;
                load_a.total_cmp(&load_b).then_with(|| a.node_id.cmp(&b.node_id))
            })
            .cloned()
    }

    /// Reserve `resource_type` for `requester`. Returns `None` when no
    /// node qualifies.
    pub async fn allocate(
        &self,
        resource_type: &str,
        requester: &str,
        preferred_node: Option<&str>,
        priority: i64,
    ) -> Result<Option<AllocationRecord>> {
        let shareable = self.shareable_types.iter().any(|t| t == resource_type);

        for attempt in 0..MAX_ALLOCATION_ATTEMPTS {
            let Some(target) = self.pick_node(resource_type, preferred_node) else {
                debug!(resource_type, "no suitable node for allocation");
                return Ok(None);
            };

            let allocation = AllocationRecord {
                id: Uuid::new_v4().to_string(),
                resource_type: resource_type.to_owned(),
                requester: requester.to_owned(),
                node_id: target.clone(),
                priority,
                allocated_at: self.clock.utc(),
                released_at: None,
            };
            self.store.insert_allocation(&allocation).await?;

            if shareable {
                info!(resource_type, node = %target, requester, "resource allocated");
                return Ok(Some(allocation));
            }

            // Re-read after commit: on a non-shareable type the earliest
            // active allocation wins; a loser releases and retries.
            let active = self.store.active_allocations(Some(resource_type), Some(&target)).await?;
            let winner = active
                .iter()
                .min_by(|a, b| {
                    a.allocated_at.cmp(&b.allocated_at).then_with(|| a.id.cmp(&b.id))
                })
                .map(|a| a.id.clone());

            if winner.as_deref() == Some(allocation.id.as_str()) {
                info!(resource_type, node = %target, requester, "resource allocated");
                return Ok(Some(allocation));
            }

            debug!(resource_type, node = %target, attempt, "lost allocation race, retrying");
            self.store.release_allocation(&allocation.id, self.clock.utc()).await?;
        }

        Ok(None)
    }

    /// Stamp `released_at`. Idempotent: releasing twice returns false.
    pub async fn release(&self, allocation_id: &str) -> Result<bool> {
        let released = self.store.release_allocation(allocation_id, self.clock.utc()).await?;
        if released {
            info!(allocation = allocation_id, "resource released");
        }
        Ok(released)
    }

    pub async fn active_allocations(
        &self,
        resource_type: Option<&str>,
    ) -> Result<Vec<AllocationRecord>> {
        self.store.active_allocations(resource_type, None).await
    }

    fn pick_node(&self, resource_type: &str, preferred: Option<&str>) -> Option<String> {
        let nodes = self.nodes.read();

        if let Some(preferred) = preferred {
            if let Some(node) = nodes.get(preferred) {
                if node.is_healthy {
                    return Some(node.node_id.clone());
                }
            }
        }

        nodes
            .values()
            .filter(|n| n.is_healthy && n.services.iter().any(|s| s == resource_type))
            .min_by(|a, b| {
                let load_a = a.cpu_usage + a.memory_usage;
                let load_b = b.cpu_usage + b.memory_usage;
                load_a.total_cmp(&load_b).then_with(|| a.node_id.cmp(&b.node_id))
            })
            .map(|n| n.node_id.clone())
    }
}

#[cfg(test)]
#[path = "allocation_tests.rs"]
mod tests;
