//! GPU/CPU demand decomposition
//!
//! Turns a job's aggregate resource request into per-node chunks. Each
//! chunk must land on a distinct node.

use crate::models::job::Resources;
use serde::{Deserialize, Serialize};

/// Resources one node must provide for one piece of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub gpus: u32,
    pub cpus: u32,
}

/// Split `resources` into per-node chunks
///
/// - `nodes > 1`: GPUs and CPUs are spread evenly over exactly `nodes`
///   chunks, the remainder going to the first chunks.
/// - otherwise: worst-case colocation, full nodes of `gpus_per_node` plus
///   one partial chunk (26 GPUs on 8-GPU nodes → `[8, 8, 8, 2]`). CPUs are
///   spread evenly over those chunks.
///
/// A request for no GPUs yields a single chunk carrying all the CPUs.
///
/// # Example
/// ```
/// use burst_simulator_core_rs::cluster::demand::decompose;
/// use burst_simulator_core_rs::Resources;
///
/// let gpus: Vec<u32> = decompose(Resources::gpus(26), 8).iter().map(|c| c.gpus).collect();
/// assert_eq!(gpus, vec![8, 8, 8, 2]);
/// ```
pub fn decompose(resources: Resources, gpus_per_node: u32) -> Vec<Chunk> {
    let pieces = if resources.nodes > 1 {
        resources.nodes
    } else if resources.gpus == 0 || gpus_per_node == 0 {
        1
    } else {
        resources.gpus.div_ceil(gpus_per_node)
    };

    let gpus: Vec<u32> = if resources.nodes > 1 || gpus_per_node == 0 {
        spread(resources.gpus, pieces)
    } else {
        (0..pieces)
            .map(|i| {
                let served = i * gpus_per_node;
                (resources.gpus - served).min(gpus_per_node)
            })
            .collect()
    };
    let cpus = spread(resources.cpus, pieces);

    gpus.into_iter()
        .zip(cpus)
        .map(|(gpus, cpus)| Chunk { gpus, cpus })
        .collect()
}

/// Whether `chunks` could ever fit an empty cluster of this shape
pub fn fits_empty(chunks: &[Chunk], num_nodes: usize, gpus_per_node: u32, cpus_per_node: u32) -> bool {
    chunks.len() <= num_nodes
        && chunks
            .iter()
            .all(|c| c.gpus <= gpus_per_node && c.cpus <= cpus_per_node)
}

fn spread(total: u32, pieces: u32) -> Vec<u32> {
    let base = total / pieces;
    let extra = total % pieces;
    (0..pieces).map(|i| base + u32::from(i < extra)).collect()
}
