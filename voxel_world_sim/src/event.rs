// Simulation events: the internal scheduling queue and the published change
// notifications.
//
// The sim is a discrete event simulation. Recurring work (actor ticks, the
// stress collapse tick) is scheduled into a priority queue ordered by
// `(tick, sequence)`, where a tick is one virtual millisecond. The sim pops
// them in order, advancing the clock as needed. Empty ticks are free.
//
// This file defines three related pieces:
// - `ScheduledEvent` / `EventQueue`: internal events that drive the sim.
// - `SimEvent`: change notifications (voxels, surfaces, paths, actors),
//   returned from every `step` and fanned out by topic.
// - `EventBus`: per-topic subscriber lists for hosts that want callbacks
//   instead of scanning `StepResult::events`.
//
// See also: `sim.rs` for the step loop and the publish/route logic,
// `actor.rs` for `KillCause`.
//
// **Critical constraint: determinism.** Event ordering must be identical
// across runs. The `(tick, sequence)` key provides a total order, and
// subscribers are called in registration order.

use crate::actor::KillCause;
use crate::types::{ActorId, Material, VoxelCoord, VoxelId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::fmt;

// ---------------------------------------------------------------------------
// Internal scheduled events (priority queue)
// ---------------------------------------------------------------------------

/// An event scheduled for future processing by the simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// The tick at which this event should fire.
    pub tick: u64,
    /// Unique ordering key for deterministic tiebreaking within a tick.
    /// Lower values are processed first.
    pub sequence: u64,
    pub kind: ScheduledEventKind,
}

/// The types of internal events the sim can schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledEventKind {
    /// One movement/behavior tick for an actor.
    ActorTick { actor_id: ActorId },
    /// Turn over-strength voxels into air.
    StressTick,
}

// We want a min-heap: lowest (tick, sequence) fires first.
// Rust's BinaryHeap is a max-heap, so we reverse the ordering.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .tick
            .cmp(&self.tick)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
    /// Monotonic counter for deterministic ordering within a tick.
    next_sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event at an absolute tick.
    pub fn schedule(&mut self, tick: u64, kind: ScheduledEventKind) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent {
            tick,
            sequence,
            kind,
        });
    }

    /// Schedule an event `delay_ms` after `now`.
    pub fn schedule_after(&mut self, now: u64, delay_ms: u64, kind: ScheduledEventKind) {
        self.schedule(now.saturating_add(delay_ms), kind);
    }

    pub fn peek_tick(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.tick)
    }

    /// Pop the next event if its tick is <= `up_to_tick`.
    pub fn pop_if_ready(&mut self, up_to_tick: u64) -> Option<ScheduledEvent> {
        if self.heap.peek().is_some_and(|e| e.tick <= up_to_tick) {
            self.heap.pop()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Published change notifications
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEventKind {
    /// The whole volume was replaced.
    VoxelsNew,
    /// One cell changed material.
    VoxelSet { coord: VoxelCoord, material: Material },
    SurfacesNew,
    SurfacesUpdate { updated: BTreeSet<VoxelId> },
    PathsNew,
    PathsUpdated { updated: BTreeSet<VoxelId> },
    ActorCreate { actor_id: ActorId, position: [f32; 3] },
    ActorKill { actor_id: ActorId, cause: KillCause },
}

pub const TOPIC_VOXELS_NEW: &str = "voxels.new";
pub const TOPIC_VOXELS_SET: &str = "voxels.set";
pub const TOPIC_SURFACES_NEW: &str = "surfaces.new";
pub const TOPIC_SURFACES_UPDATE: &str = "surfaces.update";
pub const TOPIC_PATHS_NEW: &str = "paths.new";
pub const TOPIC_PATHS_UPDATED: &str = "paths.updated";
pub const TOPIC_ACTOR_CREATE: &str = "actor.create";
pub const TOPIC_ACTOR_KILL: &str = "actor.kill";

impl SimEventKind {
    /// The topic subscribers register for.
    pub fn topic(&self) -> &'static str {
        match self {
            SimEventKind::VoxelsNew => TOPIC_VOXELS_NEW,
            SimEventKind::VoxelSet { .. } => TOPIC_VOXELS_SET,
            SimEventKind::SurfacesNew => TOPIC_SURFACES_NEW,
            SimEventKind::SurfacesUpdate { .. } => TOPIC_SURFACES_UPDATE,
            SimEventKind::PathsNew => TOPIC_PATHS_NEW,
            SimEventKind::PathsUpdated { .. } => TOPIC_PATHS_UPDATED,
            SimEventKind::ActorCreate { .. } => TOPIC_ACTOR_CREATE,
            SimEventKind::ActorKill { .. } => TOPIC_ACTOR_KILL,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

type Subscriber = Box<dyn FnMut(&SimEvent)>;

/// Host-side callbacks keyed by topic. Not part of saved state.
#[derive(Default)]
pub struct EventBus {
    subscribers: BTreeMap<&'static str, Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, topic: &'static str, handler: impl FnMut(&SimEvent) + 'static) {
        self.subscribers
            .entry(topic)
            .or_default()
            .push(Box::new(handler));
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.get(topic).map_or(0, Vec::len)
    }

    pub fn publish(&mut self, event: &SimEvent) {
        if let Some(handlers) = self.subscribers.get_mut(event.kind.topic()) {
            for handler in handlers {
                handler(event);
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.subscribers.iter().map(|(t, s)| (t, s.len())))
            .finish()
    }
}
