// Autonomous actors and their behavior stacks.
//
// An `Actor` stands in one cell (`coord`) at a fractional offset within it
// (`fraction`, each component in `[0, 1]`; z is height above the cell floor).
// What it does each tick is decided by the top of its behavior stack. The
// bottom entry is always `Idle` and is never popped; a freshly spawned actor
// starts as `[Idle, Wander]`.
//
// Behaviors:
//   Idle    - does nothing.
//   Wander  - picks a random traversable surface and, if a route exists,
//             pushes a `Goto` along it.
//   Goto    - walks the route one cell at a time, aiming for an exit point on
//             the edge shared with the next cell. Each hop re-checks that the
//             path graph still links the two cells, so terrain edits under a
//             walking actor pop the `Goto` instead of teleporting it.
//   Fall    - accelerates down under gravity until it meets a surface, or
//             leaves the world through z = 0.
//
// After any non-falling behavior runs, the actor's height is compared with
// the surface under it: above it starts a `Fall`, otherwise it snaps down.
// A tick that finds the actor's own cell solid kills it (buried).
//
// `ActorRoster` owns the live actors and remembers spawn order so the oldest
// can be evicted at capacity.
//
// See also: `sim.rs` for scheduling (`ScheduledEventKind::ActorTick`) and
// the kill/spawn events, `pathfinding.rs` for the routes `Wander` requests,
// `surface.rs` for elevation and slope queries.
//
// **Critical constraint: determinism.** Destination picks draw from the sim's
// `GameRng`. The roster is a `BTreeMap` plus an explicit spawn-order queue.

use crate::config::{ActorConfig, PathConfig};
use crate::nav::PathGraph;
use crate::pathfinding;
use crate::prng::GameRng;
use crate::surface::{MIN_ELEVATION, SurfaceMap};
use crate::types::{ActorId, VoxelCoord, VoxelId};
use crate::world::VoxelVolume;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::collections::{BTreeMap, VecDeque};

/// Why an actor left the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillCause {
    /// Its cell was filled with solid material.
    Buried,
    /// It fell below the bottom of the volume.
    FellOutOfWorld,
    /// The roster was full and it was the oldest actor.
    Evicted,
    /// The terrain was regenerated.
    Regenerated,
}

/// Read-only world state plus the RNG, lent to an actor for one tick.
pub struct ActorContext<'a> {
    pub volume: &'a VoxelVolume,
    pub surfaces: &'a SurfaceMap,
    pub paths: &'a PathGraph,
    pub path_config: &'a PathConfig,
    pub config: &'a ActorConfig,
    pub rng: &'a mut GameRng,
}

// ---------------------------------------------------------------------------
// Behaviors
// ---------------------------------------------------------------------------

/// In-progress walk along a route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GotoState {
    /// Cells from the starting cell to the destination.
    pub path: Vec<VoxelId>,
    /// Index into `path` of the cell the actor is in.
    pub step: usize,
    /// Point on the current cell's edge the actor is heading for.
    pub exit: [f32; 2],
    /// Unit heading in the xy plane.
    pub forward: [f32; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Behavior {
    Idle,
    Fall { velocity: f32 },
    Goto(GotoState),
    Wander,
}

/// What a behavior asks of the stack after ticking.
enum BehaviorStep {
    Continue,
    /// Pop this behavior.
    Stop,
    /// Keep this behavior and push another on top of it.
    Start(Behavior),
    Kill(KillCause),
}

/// Where to aim when leaving `here` for `there`, as a fraction of the cell.
/// Side crossings are offset from the edge midpoint so opposing traffic keeps
/// to the right.
pub fn find_exit(here: VoxelCoord, there: VoxelCoord) -> [f32; 2] {
    use std::cmp::Ordering::*;
    match (here.x.cmp(&there.x), here.y.cmp(&there.y)) {
        (Greater, Greater) => [0.0, 0.0],
        (Greater, Less) => [0.0, 1.0],
        (Greater, Equal) => [0.0, 0.6],
        (Less, Greater) => [1.0, 0.0],
        (Less, Less) => [1.0, 1.0],
        (Less, Equal) => [1.0, 0.4],
        (Equal, Greater) => [0.4, 0.0],
        (Equal, Less) => [0.6, 1.0],
        (Equal, Equal) => [0.5, 0.5],
    }
}

/// Where an actor arriving in `here` from `there` appears. Mirrors
/// `find_exit` so the exit of one cell meets the entrance of the next.
pub fn find_entrance(here: VoxelCoord, there: VoxelCoord) -> [f32; 2] {
    use std::cmp::Ordering::*;
    match (here.x.cmp(&there.x), here.y.cmp(&there.y)) {
        (Greater, Greater) => [0.0, 0.0],
        (Greater, Less) => [0.0, 1.0],
        (Greater, Equal) => [0.0, 0.4],
        (Less, Greater) => [1.0, 0.0],
        (Less, Less) => [1.0, 1.0],
        (Less, Equal) => [1.0, 0.6],
        (Equal, Greater) => [0.6, 0.0],
        (Equal, Less) => [0.4, 1.0],
        (Equal, Equal) => [0.5, 0.5],
    }
}

fn normalize(v: [f32; 2]) -> [f32; 2] {
    let magnitude = (v[0] * v[0] + v[1] * v[1]).sqrt();
    if magnitude > 0.0 {
        [v[0] / magnitude, v[1] / magnitude]
    } else {
        // Already at the exit point; any heading will do.
        [1.0, 0.0]
    }
}

impl GotoState {
    /// Start a walk along `path` from the actor's current position. `None`
    /// unless the path has at least two cells.
    pub fn new(actor: &mut Actor, path: Vec<VoxelId>) -> Option<Self> {
        let (&here, &there) = (path.first()?, path.get(1)?);
        let exit = find_exit(here.coord(), there.coord());
        let forward = normalize([exit[0] - actor.fraction[0], exit[1] - actor.fraction[1]]);
        actor.set_facing(forward);
        Some(Self {
            path,
            step: 0,
            exit,
            forward,
        })
    }

    /// Horizontal speed lost to climbing or descending along `forward`.
    fn slope_multiplier(&self, actor: &Actor, ctx: &ActorContext<'_>) -> f32 {
        let Some(id) = VoxelId::checked(actor.coord) else {
            return 1.0;
        };
        let [sx, sy] = ctx
            .surfaces
            .slope(id, actor.fraction[0], actor.fraction[1]);
        let slope = self.forward[0] * sx + self.forward[1] * sy;
        1.0 - slope.abs() * ctx.config.slope_penalty
    }

    fn tick(&mut self, actor: &mut Actor, ctx: &mut ActorContext<'_>, seconds: f32) -> BehaviorStep {
        let Some(&start) = self.path.get(self.step) else {
            return BehaviorStep::Stop;
        };
        let mut here = start;
        if actor.coord != here.coord() {
            log::debug!("{} is off its path at {}", actor.id, actor.coord);
            return BehaviorStep::Stop;
        }

        let mut travel = actor.walk_speed * seconds * self.slope_multiplier(actor, ctx);
        if actor.on_road {
            travel *= ctx.config.road_speed_multiplier;
        }
        let mut x_travel = self.forward[0] * travel;
        let mut y_travel = self.forward[1] * travel;
        let mut x_remaining = self.exit[0] - actor.fraction[0];
        let mut y_remaining = self.exit[1] - actor.fraction[1];

        while x_travel.abs() > x_remaining.abs() || y_travel.abs() > y_remaining.abs() {
            let Some(&next) = self.path.get(self.step + 1) else {
                return BehaviorStep::Stop;
            };
            if !ctx.paths.has_exit(here, next) {
                log::debug!("{} found its path broken at {}", actor.id, here);
                return BehaviorStep::Stop;
            }
            actor.on_road = ctx.paths.has_road(here, next);

            travel -= (x_remaining * x_remaining + y_remaining * y_remaining).sqrt();
            self.step += 1;
            let previous = here.coord();
            here = next;

            let entrance = find_entrance(here.coord(), previous);
            actor.coord = here.coord();
            actor.fraction = [entrance[0], entrance[1], 0.0];

            let Some(&there) = self.path.get(self.step + 1) else {
                // Arrived.
                return BehaviorStep::Stop;
            };
            self.exit = find_exit(here.coord(), there.coord());
            x_remaining = self.exit[0] - actor.fraction[0];
            y_remaining = self.exit[1] - actor.fraction[1];
            self.forward = normalize([x_remaining, y_remaining]);
            actor.set_facing(self.forward);

            x_travel = self.forward[0] * travel;
            y_travel = self.forward[1] * travel;
        }

        actor.fraction[0] = (actor.fraction[0] + x_travel).clamp(0.0, 1.0);
        actor.fraction[1] = (actor.fraction[1] + y_travel).clamp(0.0, 1.0);
        actor.fraction[2] = 0.0;
        BehaviorStep::Continue
    }
}

impl Behavior {
    fn tick(&mut self, actor: &mut Actor, ctx: &mut ActorContext<'_>, seconds: f32) -> BehaviorStep {
        match self {
            Behavior::Idle => BehaviorStep::Continue,
            Behavior::Wander => wander(actor, ctx),
            Behavior::Goto(state) => state.tick(actor, ctx, seconds),
            Behavior::Fall { velocity } => fall(velocity, actor, ctx, seconds),
        }
    }
}

fn wander(actor: &mut Actor, ctx: &mut ActorContext<'_>) -> BehaviorStep {
    let Some(start) = VoxelId::checked(actor.coord) else {
        return BehaviorStep::Continue;
    };
    let Some(destination) = ctx
        .surfaces
        .random_traversable(ctx.rng, ctx.config.wander_attempts)
    else {
        return BehaviorStep::Continue;
    };
    let path = pathfinding::find_path(ctx.paths, start, destination, true, ctx.path_config);
    match GotoState::new(actor, path) {
        Some(goto) => BehaviorStep::Start(Behavior::Goto(goto)),
        None => BehaviorStep::Continue,
    }
}

fn fall(
    velocity: &mut f32,
    actor: &mut Actor,
    ctx: &mut ActorContext<'_>,
    seconds: f32,
) -> BehaviorStep {
    *velocity = (*velocity + seconds * ctx.config.gravity).min(ctx.config.terminal_velocity);

    let [fx, fy, fz] = actor.fraction;
    let mut z = actor.coord.z + 1;
    let mut height = fz - *velocity * seconds;
    loop {
        z -= 1;
        if z < 0 {
            return BehaviorStep::Kill(KillCause::FellOutOfWorld);
        }
        let ground = VoxelId::checked(VoxelCoord::new(actor.coord.x, actor.coord.y, z))
            .map_or(MIN_ELEVATION, |id| ctx.surfaces.elevation(id, fx, fy));
        if ground > height {
            actor.coord.z = z;
            actor.fraction[2] = 0.0;
            return BehaviorStep::Stop;
        }
        height += 1.0;
        if height >= 1.0 {
            break;
        }
    }
    actor.coord.z = z;
    actor.fraction[2] = height - 1.0;
    BehaviorStep::Continue
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    /// The cell the actor stands in.
    pub coord: VoxelCoord,
    /// Offset within `coord`.
    pub fraction: [f32; 3],
    /// Clockwise rotation about z in radians; 0 faces north.
    pub facing: f32,
    /// Voxels per second on flat ground.
    pub walk_speed: f32,
    pub on_road: bool,
    pub destroyed: bool,
    /// Bottom entry is always `Idle`.
    pub behaviors: SmallVec<[Behavior; 4]>,
}

impl Actor {
    pub fn new(id: ActorId, position: [f32; 3], walk_speed: f32) -> Self {
        let mut actor = Self {
            id,
            coord: VoxelCoord::new(0, 0, 0),
            fraction: [0.0; 3],
            facing: 0.0,
            walk_speed,
            on_road: false,
            destroyed: false,
            behaviors: smallvec![Behavior::Idle, Behavior::Wander],
        };
        actor.set_position(position);
        actor
    }

    pub fn position(&self) -> [f32; 3] {
        [
            self.coord.x as f32 + self.fraction[0],
            self.coord.y as f32 + self.fraction[1],
            self.coord.z as f32 + self.fraction[2],
        ]
    }

    pub fn set_position(&mut self, position: [f32; 3]) {
        let [x, y, z] = position.map(f32::floor);
        self.coord = VoxelCoord::new(x as i32, y as i32, z as i32);
        self.fraction = [position[0] - x, position[1] - y, position[2] - z];
    }

    /// Face along a unit xy heading.
    pub fn set_facing(&mut self, forward: [f32; 2]) {
        let angle = forward[1].clamp(-1.0, 1.0).acos();
        self.facing = if forward[0] > 0.0 { -angle } else { angle };
    }

    pub fn current_behavior(&self) -> Option<&Behavior> {
        self.behaviors.last()
    }

    pub fn start_behavior(&mut self, behavior: Behavior) {
        self.behaviors.push(behavior);
    }

    /// Pop the top behavior. The base `Idle` stays.
    pub fn stop_behavior(&mut self) {
        if self.behaviors.len() > 1 {
            self.behaviors.pop();
        }
    }

    /// Advance one tick of `delta_ms`. Returns why the actor died, if it did;
    /// the caller removes it.
    pub fn tick(&mut self, ctx: &mut ActorContext<'_>, delta_ms: u64) -> Option<KillCause> {
        if self.destroyed {
            return None;
        }
        if ctx.volume.is_solid_at(self.coord) {
            return Some(KillCause::Buried);
        }

        let seconds = delta_ms as f32 / 1000.0;
        let mut behavior = self.behaviors.pop()?;
        let falling = matches!(behavior, Behavior::Fall { .. });
        match behavior.tick(self, ctx, seconds) {
            BehaviorStep::Continue => self.behaviors.push(behavior),
            BehaviorStep::Stop => {
                if self.behaviors.is_empty() {
                    self.behaviors.push(behavior);
                }
            }
            BehaviorStep::Start(next) => {
                self.behaviors.push(behavior);
                self.behaviors.push(next);
            }
            BehaviorStep::Kill(cause) => {
                self.behaviors.push(behavior);
                return Some(cause);
            }
        }

        if !falling {
            let elevation = VoxelId::checked(self.coord).map_or(MIN_ELEVATION, |id| {
                ctx.surfaces
                    .elevation(id, self.fraction[0], self.fraction[1])
            });
            if self.fraction[2] > elevation {
                self.start_behavior(Behavior::Fall { velocity: 0.0 });
            } else {
                self.fraction[2] = elevation;
            }
        }
        None
    }

    /// Tear down every behavior, newest first. `false` if already dead.
    pub fn kill(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        while self.behaviors.pop().is_some() {}
        self.destroyed = true;
        true
    }
}

// ---------------------------------------------------------------------------
// ActorRoster
// ---------------------------------------------------------------------------

/// Every live actor, plus the order they were spawned in.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActorRoster {
    actors: BTreeMap<ActorId, Actor>,
    spawn_order: VecDeque<ActorId>,
}

impl ActorRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.actors.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    /// Live actor ids, oldest first.
    pub fn spawn_order(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.spawn_order.iter().copied()
    }

    pub fn oldest(&self) -> Option<ActorId> {
        self.spawn_order.front().copied()
    }

    pub fn insert(&mut self, actor: Actor) {
        self.spawn_order.push_back(actor.id);
        self.actors.insert(actor.id, actor);
    }

    /// Kill and remove an actor. `None` if it is not in the roster.
    pub fn remove(&mut self, id: ActorId) -> Option<Actor> {
        let mut actor = self.actors.remove(&id)?;
        self.spawn_order.retain(|a| *a != id);
        actor.kill();
        Some(actor)
    }
}
