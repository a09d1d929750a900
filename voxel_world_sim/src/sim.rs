// Core simulation state and tick loop.
//
// `SimState` is the single source of truth for the voxel world. It owns the
// material volume, the three derived layers (surfaces, path graph, stress),
// the actor roster, the event queue, the PRNG, and the game config. The sim
// is a pure function: `(state, commands) -> (new_state, events)`.
//
// ## Change cascade
//
// Every material edit, whether from a `SetVoxel` command or a collapse,
// goes through `set_voxel()`, which updates the layers in dependency order
// and publishes what changed:
//
//   voxels.set -> surfaces (31-cell neighborhood) -> surfaces.update
//              -> path graph (diagonal ring)      -> paths.updated
//              -> stress (work-stack propagation; may queue collapses)
//
// Regeneration replaces the volume, rebuilds all three layers from scratch
// (`voxels.new`, `surfaces.new`, `paths.new`) and kills every actor.
//
// ## Scheduled work
//
// Two kinds of recurring work live in the `EventQueue`, keyed in virtual
// milliseconds:
// - `ActorTick`: one behavior tick per actor every `actors.tick_interval_ms`.
//   A tick for an actor that is no longer in the roster is dropped, which
//   is how killed actors stop.
// - `StressTick`: every `stress.tick_interval_ms`, over-strength voxels are
//   turned into air (weakest first) through the normal cascade. New
//   collapses they cause are picked up on the following tick.
//
// ## Events
//
// Published events go to `EventBus` subscribers immediately and are also
// buffered; `step()` returns the buffer in `StepResult::events`.
//
// See also: `event.rs` for the queue and bus, `command.rs` for `SimCommand`,
// `config.rs` for `GameConfig`, `world.rs`, `surface.rs`, `nav.rs`,
// `stress.rs` and `actor.rs` for the components.
//
// **Critical constraint: determinism.** All state mutations flow through
// `SimCommand` or internal scheduled events. No external input (system time,
// thread state, etc.) may influence the simulation.

use crate::actor::{Actor, ActorContext, ActorRoster, KillCause};
use crate::command::{SimAction, SimCommand};
use crate::config::GameConfig;
use crate::error::{SimError, SimResult};
use crate::event::{EventBus, EventQueue, ScheduledEventKind, SimEvent, SimEventKind};
use crate::nav::PathGraph;
use crate::prng::GameRng;
use crate::stress::StressMap;
use crate::surface::SurfaceMap;
use crate::types::{ActorId, Material, VoxelCoord};
use crate::world::VoxelVolume;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Top-level simulation state.
#[derive(Debug, Serialize, Deserialize)]
pub struct SimState {
    /// Current simulation tick (virtual milliseconds).
    pub tick: u64,

    /// The simulation's deterministic PRNG.
    pub rng: GameRng,

    /// Game configuration (immutable after initialization).
    pub config: GameConfig,

    /// The event priority queue driving the discrete event simulation.
    pub event_queue: EventQueue,

    pub voxels: VoxelVolume,
    pub surfaces: SurfaceMap,
    pub paths: PathGraph,
    pub stress: StressMap,
    pub actors: ActorRoster,

    /// Host callbacks. Not saved; re-subscribe after loading.
    #[serde(skip)]
    bus: EventBus,

    /// Events published since the last `step()` / `drain_events()`.
    #[serde(skip)]
    outbox: Vec<SimEvent>,
}

/// The result of processing commands and advancing the simulation.
#[derive(Debug, Default)]
pub struct StepResult {
    /// Everything published during this step, in order.
    pub events: Vec<SimEvent>,
    /// Commands that failed validation. They changed nothing.
    pub rejected: Vec<SimError>,
}

/// A component looked up by its well-known name.
#[derive(Clone, Copy, Debug)]
pub enum Component<'a> {
    Voxels(&'a VoxelVolume),
    VoxelSurfaces(&'a SurfaceMap),
    Paths(&'a PathGraph),
    VoxelStress(&'a StressMap),
    ActorBoss(&'a ActorRoster),
}

impl SimState {
    /// Create a new simulation with default config and the given seed.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, GameConfig::default())
    }

    /// Create a new simulation with generated terrain.
    pub fn with_config(seed: u64, config: GameConfig) -> Self {
        let mut rng = GameRng::new(seed);
        let (sx, sy, sz) = config.world_size;
        let mut voxels = VoxelVolume::new(sx, sy, sz);
        voxels.generate(&config.terrain, rng.noise_seed());
        Self::assemble(rng, config, voxels)
    }

    /// Create a simulation over an existing volume instead of generated
    /// terrain. `config.world_size` is ignored.
    pub fn from_volume(seed: u64, config: GameConfig, voxels: VoxelVolume) -> Self {
        Self::assemble(GameRng::new(seed), config, voxels)
    }

    fn assemble(rng: GameRng, mut config: GameConfig, voxels: VoxelVolume) -> Self {
        config.world_size = (voxels.size_x, voxels.size_y, voxels.size_z);
        let mut state = Self {
            tick: 0,
            rng,
            config,
            event_queue: EventQueue::new(),
            voxels,
            surfaces: SurfaceMap::new(),
            paths: PathGraph::new(),
            stress: StressMap::new(),
            actors: ActorRoster::new(),
            bus: EventBus::new(),
            outbox: Vec::new(),
        };
        state.rebuild_layers();
        state.event_queue.schedule_after(
            0,
            state.config.stress.tick_interval_ms,
            ScheduledEventKind::StressTick,
        );
        state
    }

    /// Recompute surfaces, paths and stress from the volume.
    fn rebuild_layers(&mut self) {
        self.surfaces.rebuild(&self.voxels);
        self.paths.rebuild(&self.surfaces, &self.config.paths);
        self.stress.rebuild(&self.voxels, &self.config.stress);
    }

    /// Look up a component by name: `"Voxels"`, `"VoxelSurfaces"`,
    /// `"Paths"`, `"VoxelStress"` or `"ActorBoss"`.
    pub fn component(&self, name: &str) -> Option<Component<'_>> {
        match name {
            "Voxels" => Some(Component::Voxels(&self.voxels)),
            "VoxelSurfaces" => Some(Component::VoxelSurfaces(&self.surfaces)),
            "Paths" => Some(Component::Paths(&self.paths)),
            "VoxelStress" => Some(Component::VoxelStress(&self.stress)),
            "ActorBoss" => Some(Component::ActorBoss(&self.actors)),
            _ => None,
        }
    }

    /// Register a callback for one event topic (see `event::TOPIC_*`).
    pub fn subscribe(&mut self, topic: &'static str, handler: impl FnMut(&SimEvent) + 'static) {
        self.bus.subscribe(topic, handler);
    }

    /// Events published outside `step()` (direct calls to `set_voxel` etc.).
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn emit(&mut self, kind: SimEventKind) {
        let event = SimEvent {
            tick: self.tick,
            kind,
        };
        self.bus.publish(&event);
        self.outbox.push(event);
    }

    // -----------------------------------------------------------------------
    // Step loop
    // -----------------------------------------------------------------------

    /// Apply a batch of commands and advance the sim to the target tick,
    /// processing all scheduled events up to that point.
    ///
    /// Commands must be sorted by tick. Commands with tick > `target_tick`
    /// are ignored (caller error).
    pub fn step(&mut self, commands: &[SimCommand], target_tick: u64) -> StepResult {
        let mut rejected = Vec::new();
        let mut cmd_idx = 0;

        loop {
            let next_event_tick = self.event_queue.peek_tick();
            let next_cmd_tick = commands
                .get(cmd_idx)
                .filter(|c| c.tick <= target_tick)
                .map(|c| c.tick);

            let next_tick = match (next_event_tick, next_cmd_tick) {
                (Some(et), Some(ct)) => et.min(ct).min(target_tick),
                (Some(et), None) => et.min(target_tick),
                (None, Some(ct)) => ct.min(target_tick),
                (None, None) => target_tick,
            };
            self.tick = self.tick.max(next_tick);

            while cmd_idx < commands.len() && commands[cmd_idx].tick <= self.tick {
                let cmd = &commands[cmd_idx];
                cmd_idx += 1;
                if let Err(err) = self.apply_command(cmd) {
                    log::warn!("rejected {:?} at tick {}: {err}", cmd.action, self.tick);
                    rejected.push(err);
                }
            }

            while let Some(event) = self.event_queue.pop_if_ready(self.tick) {
                self.process_event(event.kind);
            }

            if self.tick >= target_tick {
                break;
            }
        }

        StepResult {
            events: self.drain_events(),
            rejected,
        }
    }

    fn apply_command(&mut self, cmd: &SimCommand) -> SimResult<()> {
        match &cmd.action {
            SimAction::SetVoxel { coord, material } => {
                self.set_voxel(*coord, *material)?;
            }
            SimAction::SpawnActor { position } => {
                self.spawn_actor(*position)?;
            }
            SimAction::BuildRoad { coord } => {
                self.build_road(*coord)?;
            }
            SimAction::Demolish { coord } => {
                self.demolish(*coord)?;
            }
            SimAction::Regenerate => self.regenerate(),
        }
        Ok(())
    }

    fn process_event(&mut self, kind: ScheduledEventKind) {
        match kind {
            ScheduledEventKind::ActorTick { actor_id } => self.tick_actor(actor_id),
            ScheduledEventKind::StressTick => {
                let doomed = self.stress.collapse_tick(&self.voxels, &self.config.stress);
                for id in doomed {
                    if let Err(err) = self.set_voxel(id.coord(), Material::Air) {
                        log::warn!("collapse of {id} failed: {err}");
                    }
                }
                self.event_queue.schedule_after(
                    self.tick,
                    self.config.stress.tick_interval_ms,
                    ScheduledEventKind::StressTick,
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Terrain
    // -----------------------------------------------------------------------

    /// Write one cell and run the change cascade. `Ok(false)` when the cell
    /// already held `material`; nothing is published then.
    pub fn set_voxel(&mut self, coord: VoxelCoord, material: Material) -> SimResult<bool> {
        if !self.voxels.set(coord, material)? {
            return Ok(false);
        }
        self.emit(SimEventKind::VoxelSet { coord, material });

        let update = self.surfaces.handle_voxel_set(&self.voxels, coord);
        self.emit(SimEventKind::SurfacesUpdate {
            updated: BTreeSet::from([update.cleared]),
        });
        self.emit(SimEventKind::SurfacesUpdate {
            updated: update.updated.clone(),
        });

        let mut changed = update.updated;
        changed.insert(update.cleared);
        let updated = self.paths.handle_surface_update(
            &changed,
            &self.surfaces,
            &self.voxels,
            &self.config.paths,
        );
        self.emit(SimEventKind::PathsUpdated { updated });

        self.stress.handle_voxel_set(&self.voxels, coord, &self.config.stress);
        log::debug!("voxel {coord} set to {material:?}");
        Ok(true)
    }

    /// Replace the terrain with a fresh height field and start over.
    pub fn regenerate(&mut self) {
        let noise_seed = self.rng.noise_seed();
        self.voxels.generate(&self.config.terrain, noise_seed);
        self.emit(SimEventKind::VoxelsNew);

        self.surfaces.rebuild(&self.voxels);
        self.emit(SimEventKind::SurfacesNew);
        self.paths.rebuild(&self.surfaces, &self.config.paths);
        self.emit(SimEventKind::PathsNew);
        self.stress.rebuild(&self.voxels, &self.config.stress);

        let everyone: Vec<ActorId> = self.actors.spawn_order().collect();
        for actor_id in everyone {
            self.kill_actor(actor_id, KillCause::Regenerated);
        }
    }

    /// Toggle the road at `coord`. `Ok(false)` when there is no waypoint.
    pub fn build_road(&mut self, coord: VoxelCoord) -> SimResult<bool> {
        self.voxels.get(coord)?;
        match self.paths.build_road(coord, &self.surfaces, &self.voxels) {
            Some(updated) => {
                self.emit(SimEventKind::PathsUpdated { updated });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Clear the road at `coord`. `Ok(false)` when there is no road.
    pub fn demolish(&mut self, coord: VoxelCoord) -> SimResult<bool> {
        self.voxels.get(coord)?;
        match self.paths.demolish(coord, &self.surfaces, &self.voxels) {
            Some(updated) => {
                self.emit(SimEventKind::PathsUpdated { updated });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // -----------------------------------------------------------------------
    // Actors
    // -----------------------------------------------------------------------

    /// Spawn an actor at a world-space position, evicting the oldest actor
    /// when the roster is full. The first tick fires one interval later.
    pub fn spawn_actor(&mut self, position: [f32; 3]) -> SimResult<ActorId> {
        if self.config.actors.max_actors == 0 {
            return Err(SimError::ConfigValue("actors.max_actors must be at least 1"));
        }
        let [x, y, z] = position.map(f32::floor);
        self.voxels
            .get(VoxelCoord::new(x as i32, y as i32, z as i32))?;

        while self.actors.len() >= self.config.actors.max_actors {
            let Some(oldest) = self.actors.oldest() else {
                break;
            };
            self.kill_actor(oldest, KillCause::Evicted);
        }

        let actor_id = ActorId::new(&mut self.rng);
        let actor = Actor::new(actor_id, position, self.config.actors.walk_speed);
        self.actors.insert(actor);
        log::debug!("{actor_id} spawned ({} live)", self.actors.len());
        self.emit(SimEventKind::ActorCreate { actor_id, position });
        self.event_queue.schedule_after(
            self.tick,
            self.config.actors.tick_interval_ms,
            ScheduledEventKind::ActorTick { actor_id },
        );
        Ok(actor_id)
    }

    /// Remove an actor and publish its death. Does nothing if it is already
    /// gone.
    pub fn kill_actor(&mut self, actor_id: ActorId, cause: KillCause) {
        if self.actors.remove(actor_id).is_some() {
            log::debug!("{actor_id} killed: {cause:?}");
            self.emit(SimEventKind::ActorKill { actor_id, cause });
        }
    }

    fn tick_actor(&mut self, actor_id: ActorId) {
        let interval = self.config.actors.tick_interval_ms;
        let Some(actor) = self.actors.get_mut(actor_id) else {
            return;
        };
        let mut ctx = ActorContext {
            volume: &self.voxels,
            surfaces: &self.surfaces,
            paths: &self.paths,
            path_config: &self.config.paths,
            config: &self.config.actors,
            rng: &mut self.rng,
        };
        match actor.tick(&mut ctx, interval) {
            Some(cause) => self.kill_actor(actor_id, cause),
            None => self.event_queue.schedule_after(
                self.tick,
                interval,
                ScheduledEventKind::ActorTick { actor_id },
            ),
        }
    }

    // -----------------------------------------------------------------------
    // Save / load
    // -----------------------------------------------------------------------

    pub fn to_json(&self) -> SimResult<String> {
        serde_json::to_string(self).map_err(SimError::State)
    }

    /// Load a saved state. Subscribers are not restored.
    pub fn from_json(json: &str) -> SimResult<Self> {
        serde_json::from_str(json).map_err(SimError::State)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{TOPIC_ACTOR_KILL, TOPIC_VOXELS_SET};
    use crate::types::VoxelId;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Rock floor at z = 0 over a `size`×`size`×6 volume.
    fn flat_sim(size: u32, config: GameConfig) -> SimState {
        let mut volume = VoxelVolume::new(size, size, 6);
        for x in 0..size as i32 {
            for y in 0..size as i32 {
                volume.set(VoxelCoord::new(x, y, 0), Material::Rock).unwrap();
            }
        }
        SimState::from_volume(42, config, volume)
    }

    fn cmd(tick: u64, action: SimAction) -> SimCommand {
        SimCommand { tick, action }
    }

    fn topics(events: &[SimEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.kind.topic()).collect()
    }

    fn small_config() -> GameConfig {
        GameConfig {
            world_size: (16, 16, 24),
            ..GameConfig::default()
        }
    }

    #[test]
    fn new_sim_builds_every_layer() {
        let sim = SimState::with_config(7, small_config());
        assert_eq!(sim.voxels.size_x, 16);
        assert!(!sim.surfaces.is_empty());
        assert!(!sim.paths.is_empty());
        assert!(sim.actors.is_empty());
        assert_eq!(sim.event_queue.peek_tick(), Some(100));
    }

    #[test]
    fn step_advances_tick() {
        let mut sim = flat_sim(4, GameConfig::default());
        let result = sim.step(&[], 250);
        assert_eq!(sim.tick, 250);
        assert!(result.events.is_empty());
        assert!(result.rejected.is_empty());
    }

    #[test]
    fn set_voxel_publishes_the_cascade_in_order() {
        let mut sim = flat_sim(6, GameConfig::default());
        let coord = VoxelCoord::new(2, 2, 1);
        let result = sim.step(
            &[cmd(
                5,
                SimAction::SetVoxel {
                    coord,
                    material: Material::Dirt,
                },
            )],
            10,
        );
        assert_eq!(
            topics(&result.events),
            vec!["voxels.set", "surfaces.update", "surfaces.update", "paths.updated"]
        );
        assert!(result.events.iter().all(|e| e.tick == 5));
        // The block top is now walkable.
        assert!(sim.paths.contains(VoxelId::pack(coord.offset(0, 0, 1))));
        assert!(!sim.paths.contains(VoxelId::pack(coord)));
    }

    #[test]
    fn unchanged_material_publishes_nothing() {
        let mut sim = flat_sim(4, GameConfig::default());
        assert!(!sim.set_voxel(VoxelCoord::new(1, 1, 0), Material::Rock).unwrap());
        assert!(sim.drain_events().is_empty());
    }

    #[test]
    fn out_of_range_commands_are_rejected_without_side_effects() {
        let mut sim = flat_sim(4, GameConfig::default());
        let result = sim.step(
            &[
                cmd(
                    1,
                    SimAction::SetVoxel {
                        coord: VoxelCoord::new(4, 0, 0),
                        material: Material::Air,
                    },
                ),
                cmd(
                    1,
                    SimAction::SpawnActor {
                        position: [-1.0, 0.5, 1.0],
                    },
                ),
                cmd(
                    1,
                    SimAction::BuildRoad {
                        coord: VoxelCoord::new(0, 0, 9),
                    },
                ),
            ],
            2,
        );
        assert_eq!(result.rejected.len(), 3);
        assert!(
            result
                .rejected
                .iter()
                .all(|e| matches!(e, SimError::InvalidCoordinate { .. }))
        );
        assert!(result.events.is_empty());
        assert!(sim.actors.is_empty());
    }

    #[test]
    fn zero_actor_cap_spawns_nothing() {
        let mut config = GameConfig::default();
        config.actors.max_actors = 0;
        let mut sim = flat_sim(4, config);
        for _ in 0..2 {
            let err = sim.spawn_actor([1.5, 1.5, 1.0]).unwrap_err();
            assert!(matches!(err, SimError::ConfigValue(_)));
        }
        assert!(sim.actors.is_empty());
        assert!(sim.drain_events().is_empty());
    }

    #[test]
    fn spawn_past_capacity_evicts_the_oldest() {
        let mut config = GameConfig::default();
        config.actors.max_actors = 3;
        let mut sim = flat_sim(6, config);
        let ids: Vec<ActorId> = (0..4)
            .map(|i| sim.spawn_actor([i as f32 + 0.5, 0.5, 1.0]).unwrap())
            .collect();
        assert_eq!(sim.actors.len(), 3);
        assert!(!sim.actors.contains(ids[0]));
        let kills: Vec<SimEventKind> = sim
            .drain_events()
            .into_iter()
            .map(|e| e.kind)
            .filter(|k| matches!(k, SimEventKind::ActorKill { .. }))
            .collect();
        assert_eq!(
            kills,
            vec![SimEventKind::ActorKill {
                actor_id: ids[0],
                cause: KillCause::Evicted
            }]
        );
    }

    #[test]
    fn filling_an_actors_cell_buries_it() {
        let mut sim = flat_sim(6, GameConfig::default());
        let actor_id = sim.spawn_actor([2.5, 2.5, 1.0]).unwrap();
        let actor_coord = sim.actors.get(actor_id).unwrap().coord;
        // Let it take a few steps first.
        sim.step(&[], 30);
        let coord = sim.actors.get(actor_id).unwrap().coord;
        assert_eq!(coord.z, actor_coord.z);

        let result = sim.step(
            &[cmd(
                31,
                SimAction::SetVoxel {
                    coord,
                    material: Material::Clay,
                },
            )],
            60,
        );
        assert!(!sim.actors.contains(actor_id));
        assert!(result.events.iter().any(|e| e.kind
            == SimEventKind::ActorKill {
                actor_id,
                cause: KillCause::Buried
            }));
    }

    #[test]
    fn regenerate_kills_every_actor() {
        let mut sim = SimState::with_config(3, small_config());
        let (id, _) = sim
            .surfaces
            .iter()
            .find(|(_, s)| s.is_traversable())
            .unwrap();
        let c = id.coord();
        sim.spawn_actor([c.x as f32 + 0.5, c.y as f32 + 0.5, c.z as f32])
            .unwrap();
        sim.spawn_actor([c.x as f32 + 0.5, c.y as f32 + 0.5, c.z as f32])
            .unwrap();
        assert_eq!(topics(&sim.drain_events()), vec!["actor.create", "actor.create"]);
        let result = sim.step(&[cmd(1, SimAction::Regenerate)], 1);
        assert!(sim.actors.is_empty());
        let t = topics(&result.events);
        assert_eq!(&t[..3], &["voxels.new", "surfaces.new", "paths.new"]);
        assert_eq!(t.iter().filter(|t| **t == "actor.kill").count(), 2);
    }

    #[test]
    fn stress_tick_drops_an_unsupported_overhang() {
        let mut volume = VoxelVolume::new(6, 3, 5);
        for z in 0..=2 {
            volume.set(VoxelCoord::new(0, 1, z), Material::Rock).unwrap();
        }
        let overhang = VoxelCoord::new(1, 1, 2);
        volume.set(overhang, Material::Sand).unwrap();
        let mut sim = SimState::from_volume(1, GameConfig::default(), volume);
        assert!(sim.stress.collapsing().contains(&VoxelId::pack(overhang)));

        let result = sim.step(&[], 99);
        assert!(result.events.is_empty());
        assert_eq!(sim.voxels.material(overhang), Material::Sand);

        let result = sim.step(&[], 100);
        assert_eq!(sim.voxels.material(overhang), Material::Air);
        assert_eq!(topics(&result.events)[0], "voxels.set");
    }

    #[test]
    fn subscribers_hear_published_events() {
        let mut sim = flat_sim(5, GameConfig::default());
        let heard = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&heard);
        sim.subscribe(TOPIC_VOXELS_SET, move |e| sink.borrow_mut().push(e.kind.clone()));
        let kills = Rc::new(RefCell::new(0));
        let kill_sink = Rc::clone(&kills);
        sim.subscribe(TOPIC_ACTOR_KILL, move |_| *kill_sink.borrow_mut() += 1);

        sim.set_voxel(VoxelCoord::new(1, 1, 1), Material::Dirt).unwrap();
        assert_eq!(
            *heard.borrow(),
            vec![SimEventKind::VoxelSet {
                coord: VoxelCoord::new(1, 1, 1),
                material: Material::Dirt
            }]
        );
        assert_eq!(*kills.borrow(), 0);
    }

    #[test]
    fn components_are_found_by_name() {
        let sim = flat_sim(3, GameConfig::default());
        assert!(matches!(sim.component("Voxels"), Some(Component::Voxels(_))));
        assert!(matches!(
            sim.component("VoxelSurfaces"),
            Some(Component::VoxelSurfaces(_))
        ));
        assert!(matches!(sim.component("Paths"), Some(Component::Paths(_))));
        assert!(matches!(
            sim.component("VoxelStress"),
            Some(Component::VoxelStress(_))
        ));
        assert!(matches!(sim.component("ActorBoss"), Some(Component::ActorBoss(_))));
        assert!(sim.component("Player").is_none());
    }

    #[test]
    fn roads_toggle_through_commands() {
        let mut sim = flat_sim(5, GameConfig::default());
        let coord = VoxelCoord::new(2, 2, 1);
        let result = sim.step(&[cmd(1, SimAction::BuildRoad { coord })], 1);
        assert_eq!(topics(&result.events), vec!["paths.updated"]);
        assert!(sim.paths.get(VoxelId::pack(coord)).unwrap().is_road);

        assert!(sim.demolish(coord).unwrap());
        assert!(!sim.paths.get(VoxelId::pack(coord)).unwrap().is_road);
        assert!(!sim.demolish(coord).unwrap());
    }

    #[test]
    fn same_seed_same_history() {
        let run = || {
            let mut sim = flat_sim(8, GameConfig::default());
            let commands = [
                cmd(0, SimAction::SpawnActor { position: [1.5, 1.5, 1.0] }),
                cmd(0, SimAction::SpawnActor { position: [6.5, 6.5, 1.0] }),
            ];
            sim.step(&commands, 3000);
            serde_json::to_string(&sim.actors).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn json_roundtrip_continues_deterministically() {
        let mut original = flat_sim(8, GameConfig::default());
        original.spawn_actor([3.5, 3.5, 1.0]).unwrap();
        original.step(&[], 500);

        let mut restored = SimState::from_json(&original.to_json().unwrap()).unwrap();
        original.step(&[], 2000);
        restored.step(&[], 2000);
        assert_eq!(
            serde_json::to_string(&original.actors).unwrap(),
            serde_json::to_string(&restored.actors).unwrap()
        );
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(matches!(
            SimState::from_json("{not json"),
            Err(SimError::State(_))
        ));
    }
}
