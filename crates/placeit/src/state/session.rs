//! Session lifecycle, placement flow and the save/load round trip.
//!
//! [`SceneSessionManager`] is the owner of the scene. Gestures call into it
//! directly; everything produced elsewhere (tracking callbacks, geometry load
//! completions, world-map replies, anchor reassignment) arrives through the
//! scene queue and is applied in FIFO order by [`SceneSessionManager::process_scene_queue`].
//! UI-facing outcomes are collected as [`SessionEvent`]s.

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Mat4, Vec2, Vec3};
use shared::{AnchorRecord, Blob, ObjectId, ObjectsArchive, Room, RoomId, TextureSetId, WorldMap};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::assets::{AssetResolver, ModelRef};
use crate::error::{AssetLoadError, PersistenceError};
use crate::scene::{SceneCommand, SceneQueue};
use crate::state::interaction::{GestureInteractionController, PanGesture, RotationGesture, TapOutcome};
use crate::state::registry::{ObjectRegistry, PlacedObject};
use crate::state::settings::PlacementSettings;
use crate::state::status::{derive_status, SessionStatus, StatusInputs};
use crate::state::Scene;
use crate::store::RoomStore;
use crate::tracking::{FrameState, RunOptions, SessionConfig, TrackingSession, TrackingState};

/// Why a model is being loaded
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementIntent {
    /// User tapped a plane with a model pending placement
    Place,
    /// Duplicate of an existing object
    Copy { source: ObjectId },
    /// Replacement for the selected object's model
    Swap { replaced: ObjectId },
}

/// A pending placement, carried through the async load
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRequest {
    pub model: ModelRef,
    pub world_transform: Mat4,
    pub yaw: f32,
    pub scale: Vec3,
    pub texture: Option<TextureSetId>,
    pub intent: PlacementIntent,
    /// Selection epoch when the request was made
    pub epoch: u64,
}

impl PlacementRequest {
    pub fn place(model: ModelRef, world_transform: Mat4, epoch: u64) -> Self {
        Self {
            model,
            world_transform,
            yaw: 0.0,
            scale: Vec3::ONE,
            texture: None,
            intent: PlacementIntent::Place,
            epoch,
        }
    }
}

/// Notifications for the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PlacementModelChanged(Option<ModelRef>),
    ObjectPlaced { object: ObjectId, model: ModelRef },
    /// A saved object was re-attached after relocalization
    ObjectRestored(ObjectId),
    ObjectRemoved(ObjectId),
    SelectionChanged(Option<ObjectId>),
    TextureEditorRequested {
        object: ObjectId,
        sets: Vec<TextureSetId>,
    },
    TextureApplied { object: ObjectId, set: TextureSetId },
    AssetLoadFailed { model: ModelRef, message: String },
    ExperienceSaved(RoomId),
    SaveFailed(String),
    ExperienceLoaded(RoomId),
    LoadFailed(String),
    StatusChanged(SessionStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Never started
    Idle,
    Running,
    Paused,
}

pub struct SceneSessionManager {
    scene: Scene,
    interaction: GestureInteractionController,
    tracking: Box<dyn TrackingSession>,
    store: RoomStore,
    settings: PlacementSettings,
    queue: SceneQueue,
    commands: mpsc::UnboundedReceiver<SceneCommand>,
    runtime: Handle,
    tasks: Vec<JoinHandle<()>>,
    phase: SessionPhase,
    /// Configuration for the next `start`, set by a load while not running
    pending_config: Option<SessionConfig>,
    room: Option<Room>,
    relocalizing: bool,
    relocalization_image: Option<Blob>,
    save_pending: bool,
    frame: FrameState,
    status: Option<SessionStatus>,
    placement_model: Option<ModelRef>,
    events: Vec<SessionEvent>,
}

impl SceneSessionManager {
    pub fn new(
        resolver: Arc<dyn AssetResolver>,
        mut tracking: Box<dyn TrackingSession>,
        store: RoomStore,
        settings: PlacementSettings,
        runtime: Handle,
    ) -> Self {
        let (queue, commands) = SceneQueue::channel();
        tracking.connect(queue.clone());
        Self {
            scene: Scene::new(ObjectRegistry::new(resolver)),
            interaction: GestureInteractionController::new(queue.clone(), settings.clone()),
            tracking,
            store,
            settings,
            queue,
            commands,
            runtime,
            tasks: Vec::new(),
            phase: SessionPhase::Idle,
            pending_config: None,
            room: None,
            relocalizing: false,
            relocalization_image: None,
            save_pending: false,
            frame: FrameState::default(),
            status: None,
            placement_model: None,
            events: Vec::new(),
        }
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.scene.registry
    }

    pub fn interaction(&self) -> &GestureInteractionController {
        &self.interaction
    }

    pub fn tracking(&self) -> &dyn TrackingSession {
        self.tracking.as_ref()
    }

    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    pub fn settings(&self) -> &PlacementSettings {
        &self.settings
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    pub fn is_relocalizing(&self) -> bool {
        self.relocalizing
    }

    /// Snapshot image saved with the loaded map, shown while relocalizing
    pub fn relocalization_image(&self) -> Option<&Blob> {
        self.relocalization_image.as_ref()
    }

    pub fn status(&self) -> Option<&SessionStatus> {
        self.status.as_ref()
    }

    pub fn placement_model(&self) -> Option<&ModelRef> {
        self.placement_model.as_ref()
    }

    pub fn selected(&self) -> Option<ObjectId> {
        self.interaction.tracked_object()
    }

    /// Drain pending UI events
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: SessionEvent) {
        tracing::debug!("Session event: {:?}", event);
        self.events.push(event);
    }

    // ── Lifecycle ───────────────────────────────────────────

    /// Run tracking with horizontal plane detection. A map loaded while the
    /// session was not running is used here. Calling it while running does
    /// nothing.
    pub fn start(&mut self) {
        if self.phase == SessionPhase::Running {
            return;
        }
        let config = self
            .pending_config
            .take()
            .unwrap_or_else(SessionConfig::world_tracking);
        self.tracking.run(config);
        self.phase = SessionPhase::Running;
        tracing::info!("Session started");
        self.refresh_status();
    }

    /// Pause tracking only; placed objects are kept. Idempotent.
    pub fn pause(&mut self) {
        if self.phase != SessionPhase::Running {
            return;
        }
        self.tracking.pause();
        self.phase = SessionPhase::Paused;
        tracing::info!("Session paused");
    }

    /// Record the latest frame state and recompute the status message
    pub fn update_frame(&mut self, frame: FrameState) {
        self.frame = frame;
        if self.relocalizing && frame.tracking == TrackingState::Normal {
            self.relocalizing = false;
            tracing::info!("Relocalization complete");
        }
        self.refresh_status();
    }

    /// Pull the current frame state from tracking
    pub fn sync_frame(&mut self) {
        let frame = self.tracking.current_frame();
        self.update_frame(frame);
    }

    fn refresh_status(&mut self) {
        let inputs = StatusInputs {
            frame: self.frame,
            relocalizing: self.relocalizing,
            archived: self.room.as_ref().is_some_and(Room::is_archived),
            has_anchored_objects: self.scene.registry.has_anchored_objects(),
        };
        let status = derive_status(&inputs);
        if self.status.as_ref() != Some(&status) {
            self.status = Some(status.clone());
            self.emit(SessionEvent::StatusChanged(status));
        }
    }

    /// Finish deferred removals and animations; returns the number of nodes
    /// detached
    pub fn tick(&mut self, now: Instant) -> usize {
        self.scene.graph.tick(now).len()
    }

    // ── Gestures ────────────────────────────────────────────

    fn emit_selection_change(&mut self, before: Option<ObjectId>) {
        let after = self.interaction.tracked_object();
        if before != after {
            self.emit(SessionEvent::SelectionChanged(after));
        }
    }

    /// Resolve a tap at the given touch locations
    pub fn handle_tap(&mut self, touches: &[Vec2]) -> TapOutcome {
        let before = self.interaction.tracked_object();
        let outcome = self.interaction.handle_tap(
            touches,
            self.placement_model.is_some(),
            &mut self.scene,
            self.tracking.as_ref(),
            Instant::now(),
        );
        self.emit_selection_change(before);

        match &outcome {
            TapOutcome::Place(hit) => {
                if let Some(model) = self.placement_model.take() {
                    self.emit(SessionEvent::PlacementModelChanged(None));
                    self.place_model(model, hit.world_transform);
                }
            }
            TapOutcome::PlacementMissed => tracing::debug!("No plane under placement tap"),
            TapOutcome::Delete(id) => {
                self.remove_object(*id, true);
            }
            TapOutcome::Copy(request) => self.spawn_placement(request.clone()),
            TapOutcome::EditTexture(id) => {
                if let Some(object) = self.scene.registry.get(*id) {
                    let sets = self
                        .scene
                        .registry
                        .texture_sets(&object.model)
                        .into_iter()
                        .map(|s| s.id)
                        .collect();
                    self.emit(SessionEvent::TextureEditorRequested { object: *id, sets });
                }
            }
            TapOutcome::Selected(_) | TapOutcome::Cleared | TapOutcome::Ignored => {}
        }
        outcome
    }

    pub fn handle_pan(&mut self, gesture: &PanGesture) -> bool {
        self.interaction
            .handle_pan(gesture, &mut self.scene, self.tracking.as_ref())
    }

    pub fn handle_rotation(&mut self, gesture: &mut RotationGesture) -> bool {
        self.interaction.handle_rotation(gesture, &mut self.scene)
    }

    /// Answer from the texture editor: apply the set to the selection
    pub fn did_select_texture(&mut self, set: &str) -> bool {
        match self.interaction.did_select_texture(set, &mut self.scene) {
            Some((object, set)) => {
                self.emit(SessionEvent::TextureApplied { object, set });
                true
            }
            None => false,
        }
    }

    /// Replace the selected object's model, keeping its pose
    pub fn did_swap_model(&mut self, model: ModelRef) -> bool {
        let Some(object) = self
            .interaction
            .tracked_object()
            .and_then(|id| self.scene.registry.get(id))
        else {
            return false;
        };
        let request = PlacementRequest {
            model,
            world_transform: object.world_transform,
            yaw: object.yaw,
            scale: object.scale,
            texture: None,
            intent: PlacementIntent::Swap {
                replaced: object.id,
            },
            epoch: self.interaction.selection_epoch(),
        };
        self.spawn_placement(request);
        true
    }

    // ── Placement ───────────────────────────────────────────

    /// Place `model` at the next tap on a plane, or cancel with None
    pub fn select_model_for_placement(&mut self, model: Option<ModelRef>) {
        if self.placement_model == model {
            return;
        }
        self.placement_model = model.clone();
        self.emit(SessionEvent::PlacementModelChanged(model));
    }

    /// Load `model` and place it at `world_transform` once loaded
    pub fn place_model(&mut self, model: ModelRef, world_transform: Mat4) {
        let request = PlacementRequest::place(model, world_transform, self.interaction.selection_epoch());
        self.spawn_placement(request);
    }

    fn spawn_placement(&mut self, request: PlacementRequest) {
        tracing::info!("Loading {} ({:?})", request.model, request.intent);
        let load = self.scene.registry.load(request.model.clone());
        let queue = self.queue.clone();
        self.spawn(async move {
            let result = load.await;
            queue.push(SceneCommand::PlacementLoaded { request, result });
        });
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(self.runtime.spawn(task));
    }

    fn complete_placement(&mut self, request: PlacementRequest, result: Result<PlacedObject, AssetLoadError>) {
        let mut object = match result {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!("Failed to load {}: {}", request.model, e);
                self.emit(SessionEvent::AssetLoadFailed {
                    model: request.model,
                    message: e.to_string(),
                });
                return;
            }
        };

        object.world_transform = request.world_transform;
        object.yaw = request.yaw;
        object.scale = request.scale;
        if let Some(texture) = &request.texture {
            if let Some(set) = self.scene.registry.find_texture_set(&object.model, texture) {
                object.apply_texture(&set);
            }
        }

        let now = Instant::now();
        let id = object.id;
        let model = object.model.clone();
        match request.intent {
            PlacementIntent::Swap { replaced } if self.scene.registry.contains(replaced) => {
                let before = self.interaction.tracked_object();
                self.interaction.forget(replaced, &mut self.scene, now);
                let root = self.attach(&mut object);
                let Some(old) = self.scene.registry.replace(replaced, object) else {
                    self.scene.graph.detach(root);
                    return;
                };
                self.discard(old);
                self.scene
                    .anchors
                    .assign_anchor(id, &mut self.scene.registry, self.tracking.as_mut());
                self.emit(SessionEvent::ObjectRemoved(replaced));
                self.emit(SessionEvent::ObjectPlaced { object: id, model });
                self.interaction
                    .set_tracked_object(Some(id), &mut self.scene, now);
                self.emit_selection_change(before);
                tracing::info!("Swapped {} for {}", replaced, id);
            }
            intent => {
                if !self.add_placed(object) {
                    return;
                }
                self.emit(SessionEvent::ObjectPlaced { object: id, model });
                if let PlacementIntent::Copy { .. } = intent {
                    let before = self.interaction.tracked_object();
                    self.interaction
                        .complete_copy(id, request.epoch, &mut self.scene, now);
                    self.emit_selection_change(before);
                }
            }
        }
        self.refresh_status();
    }

    fn attach(&mut self, object: &mut PlacedObject) -> crate::scene::NodeId {
        let root = self.scene.graph.attach_object(
            object.id,
            object.world_transform,
            object.model_pose(),
            object.bounds,
        );
        object.node = Some(root);
        root
    }

    /// Register, attach and anchor a loaded object
    fn add_placed(&mut self, mut object: PlacedObject) -> bool {
        let id = object.id;
        let root = self.attach(&mut object);
        if !self.scene.registry.add(object) {
            self.scene.graph.detach(root);
            return false;
        }
        self.scene
            .anchors
            .assign_anchor(id, &mut self.scene.registry, self.tracking.as_mut());
        tracing::info!("Placed object {}", id);
        true
    }

    /// Release the scene and tracking resources of an object already taken
    /// out of the registry
    fn discard(&mut self, object: PlacedObject) {
        self.scene
            .anchors
            .release(object.id, object.anchor, self.tracking.as_mut());
        if let Some(node) = object.node {
            self.scene.graph.detach(node);
        }
    }

    /// Remove an object. Registry membership goes immediately; with
    /// `animated` the scene node shrinks out before it is detached.
    pub fn remove_object(&mut self, id: ObjectId, animated: bool) -> bool {
        let now = Instant::now();
        let before = self.interaction.tracked_object();
        self.interaction.forget(id, &mut self.scene, now);
        self.emit_selection_change(before);

        let Some(mut object) = self.scene.registry.remove(id) else {
            return false;
        };
        if animated {
            if let Some(node) = object.node.take() {
                let duration = Duration::from_secs_f32(self.settings.removal_seconds.max(0.0));
                self.scene.graph.schedule_removal(node, now, duration);
            }
        }
        self.discard(object);
        tracing::info!("Removed object {}", id);
        self.emit(SessionEvent::ObjectRemoved(id));
        self.refresh_status();
        true
    }

    // ── Scene queue ─────────────────────────────────────────

    /// Apply every queued scene command in order; returns how many ran
    pub fn process_scene_queue(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
            applied += 1;
        }
        applied
    }

    /// Wait for in-flight loads and replies, then drain the queue
    pub async fn settle(&mut self) {
        loop {
            let tasks = std::mem::take(&mut self.tasks);
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::warn!("Session task failed: {}", e);
                }
            }
            self.process_scene_queue();
        }
        self.process_scene_queue();
    }

    fn apply(&mut self, command: SceneCommand) {
        match command {
            SceneCommand::AnchorAdded(anchor) => {
                if let Some(id) =
                    self.scene
                        .anchors
                        .on_anchor_added(&anchor, &mut self.scene.registry, &mut self.scene.graph)
                {
                    self.emit(SessionEvent::ObjectRestored(id));
                    self.refresh_status();
                }
            }
            SceneCommand::AnchorUpdated(anchor) => {
                self.scene
                    .anchors
                    .on_anchor_updated(&anchor, &mut self.scene.registry, &mut self.scene.graph);
            }
            SceneCommand::AnchorRemoved(id) => {
                self.scene.anchors.on_anchor_removed(id, &mut self.scene.graph);
            }
            SceneCommand::PlacementLoaded { request, result } => {
                self.complete_placement(request, result);
            }
            SceneCommand::AssignAnchor(id) => {
                if self.interaction.is_dragging() && self.interaction.tracked_object() == Some(id) {
                    tracing::debug!("Object {} is being dragged again, deferring anchor", id);
                    return;
                }
                self.scene
                    .anchors
                    .assign_anchor(id, &mut self.scene.registry, self.tracking.as_mut());
            }
            SceneCommand::WorldMapReady(map) => {
                self.save_pending = false;
                match self.complete_save(map) {
                    Ok(id) => self.emit(SessionEvent::ExperienceSaved(id)),
                    Err(e) => {
                        tracing::warn!("Save failed: {}", e);
                        self.emit(SessionEvent::SaveFailed(e.to_string()));
                    }
                }
                self.refresh_status();
            }
        }
    }

    // ── Persistence ─────────────────────────────────────────

    /// Make `room` the active room. An archived room is loaded; an empty one
    /// starts a fresh session.
    pub fn enter_room(&mut self, room: Room) {
        if room.is_archived() {
            self.load_experience(room);
        } else {
            tracing::info!("Entered new room {} ({})", room.name, room.id);
            self.start_fresh();
            self.room = Some(room);
            self.refresh_status();
        }
    }

    /// Request the world map and save it with the placed objects into the
    /// active room. The outcome arrives as `ExperienceSaved` or `SaveFailed`
    /// once the map reply has been processed.
    pub fn save_experience(&mut self) {
        if self.room.is_none() {
            self.emit(SessionEvent::SaveFailed(PersistenceError::NoActiveRoom.to_string()));
            return;
        }
        if self.save_pending {
            tracing::debug!("Save already in progress");
            return;
        }
        self.save_pending = true;

        let (reply, answer) = oneshot::channel();
        self.tracking.request_world_map(reply);
        let queue = self.queue.clone();
        self.spawn(async move {
            let map = answer.await.ok().flatten();
            queue.push(SceneCommand::WorldMapReady(map));
        });
    }

    fn complete_save(&mut self, map: Option<WorldMap>) -> Result<RoomId, PersistenceError> {
        let mut map = map.ok_or(PersistenceError::WorldMapUnavailable)?;
        let room = self.room.as_ref().ok_or(PersistenceError::NoActiveRoom)?;

        map.strip_snapshot();
        map.anchors.push(AnchorRecord::snapshot(
            self.tracking.camera_transform(),
            self.tracking.capture_snapshot(),
        ));
        let objects = ObjectsArchive::new(self.scene.registry.records());

        let mut updated = room.clone();
        updated
            .set_archive(&map, &objects)
            .map_err(PersistenceError::Encode)?;
        self.store.save(&updated)?;

        tracing::info!(
            "Saved {} objects and {} anchors to room {}",
            objects.objects.len(),
            map.anchors.len(),
            updated.id
        );
        let id = updated.id;
        self.room = Some(updated);
        Ok(id)
    }

    /// Restore an archived room: relocalize against its map and re-register
    /// its objects, which stay detached until their anchors are delivered.
    /// A room that cannot be decoded falls back to a fresh session.
    pub fn load_experience(&mut self, room: Room) {
        let id = room.id;
        match self.try_load(&room) {
            Ok(()) => {
                tracing::info!("Loaded room {} ({})", room.name, id);
                self.room = Some(room);
                self.emit(SessionEvent::ExperienceLoaded(id));
            }
            Err(e) => {
                tracing::warn!("Failed to load room {}: {}", id, e);
                self.emit(SessionEvent::LoadFailed(e.to_string()));
                self.start_fresh();
                // same room identity, no archive: the next save overwrites it
                let mut fresh = Room::new(room.name.clone(), room.room_type);
                fresh.id = room.id;
                self.room = Some(fresh);
            }
        }
        self.refresh_status();
    }

    fn try_load(&mut self, room: &Room) -> Result<(), PersistenceError> {
        let mut map = room.world_map().map_err(PersistenceError::Decode)?;
        let archive = room.objects().map_err(PersistenceError::Decode)?;
        // anything still queued belongs to the scene being replaced
        self.process_scene_queue();

        let mut restored = Vec::with_capacity(archive.objects.len());
        for record in &archive.objects {
            match self.scene.registry.restore(record) {
                Ok(object) => restored.push(object),
                Err(e) => {
                    tracing::warn!("Skipping saved object {}: {}", record.id, e);
                    self.emit(SessionEvent::AssetLoadFailed {
                        model: ModelRef::new(record.model.clone()),
                        message: e.to_string(),
                    });
                }
            }
        }

        self.relocalization_image = map.strip_snapshot();
        self.reset_scene(restored);
        self.run_or_defer(SessionConfig::relocalizing(map));
        self.relocalizing = true;
        Ok(())
    }

    /// Drop the current scene and restart tracking without a map
    fn start_fresh(&mut self) {
        self.process_scene_queue();
        self.reset_scene(Vec::new());
        self.relocalizing = false;
        self.relocalization_image = None;
        self.run_or_defer(SessionConfig {
            options: RunOptions {
                reset_tracking: true,
                remove_existing_anchors: true,
            },
            ..SessionConfig::world_tracking()
        });
    }

    /// Clear selection, planes and objects, then register `objects`
    fn reset_scene(&mut self, objects: Vec<PlacedObject>) {
        let before = self.interaction.tracked_object();
        self.interaction
            .set_tracked_object(None, &mut self.scene, Instant::now());
        self.emit_selection_change(before);
        self.scene.anchors.reset(&mut self.scene.graph);
        for previous in self.scene.registry.replace_all(objects) {
            if let Some(node) = previous.node {
                self.scene.graph.detach(node);
            }
        }
    }

    fn run_or_defer(&mut self, config: SessionConfig) {
        if self.phase == SessionPhase::Running {
            self.tracking.run(config);
        } else {
            self.pending_config = Some(config);
        }
    }
}
