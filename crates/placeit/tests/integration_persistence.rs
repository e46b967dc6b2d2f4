//! Integration tests for saving, listing and reloading rooms.

use glam::{Vec2, Vec3};
use placeit_lib::fixtures;
use placeit_lib::harness::SessionHarness;
use placeit_lib::state::SessionEvent;
use placeit_lib::store::RoomStore;
use placeit_lib::tracking::{FrameState, LimitedReason, MappingStatus, TrackingState};
use shared::{ObjectId, Room, RoomType};
use tempfile::TempDir;

fn saved_id(events: &[SessionEvent]) -> Option<shared::RoomId> {
    events.iter().find_map(|e| match e {
        SessionEvent::ExperienceSaved(id) => Some(*id),
        _ => None,
    })
}

fn save_failure(events: &[SessionEvent]) -> Option<String> {
    events.iter().find_map(|e| match e {
        SessionEvent::SaveFailed(message) => Some(message.clone()),
        _ => None,
    })
}

/// Arrange a chair and a textured table in a new room and save it
async fn saved_room(dir: &TempDir) -> (Room, Vec<(ObjectId, String, glam::Mat4)>) {
    let mut h = SessionHarness::new(dir.path()).unwrap();
    let room = h.session.store().create("Den", RoomType::LivingRoom).unwrap();
    h.session.enter_room(room.clone());
    h.start_with_floor(Vec2::new(10.0, 10.0)).await;

    let chair = h.place(fixtures::CHAIR, Vec3::new(-1.0, 0.0, 0.5)).await.unwrap();
    h.tap_world(Vec3::new(-1.0, 0.0, 0.5));
    assert!(h.session.did_select_texture("Walnut"));
    h.place(fixtures::TABLE, Vec3::new(1.0, 0.0, -1.0)).await.unwrap();
    assert_eq!(h.session.selected(), Some(chair));

    h.session.save_experience();
    h.settle().await;
    let events = h.session.take_events();
    assert_eq!(saved_id(&events), Some(room.id), "events: {:?}", events);
    assert!(h.session.room().unwrap().is_archived());

    let placed = h
        .session
        .registry()
        .iter()
        .map(|o| (o.id, o.model.as_str().to_string(), o.world_transform))
        .collect();
    let stored = h.session.store().load(room.id).unwrap();
    (stored, placed)
}

#[tokio::test]
async fn test_save_writes_both_archives() {
    let dir = TempDir::new().unwrap();
    let (room, placed) = saved_room(&dir).await;

    assert!(room.is_archived());
    let map = room.world_map().unwrap();
    let archive = room.objects().unwrap();
    assert!(map.snapshot_anchor().is_some());
    assert_eq!(archive.objects.len(), placed.len());

    for (id, model, transform) in &placed {
        let record = archive.objects.iter().find(|r| r.id == *id).unwrap();
        assert_eq!(&record.model, model);
        assert_eq!(record.anchor_transform, *transform);
        assert_eq!(map.anchor(&record.anchor_id).map(|a| a.transform), Some(*transform));
    }
    let chair = archive
        .objects
        .iter()
        .find(|r| r.model == fixtures::CHAIR)
        .unwrap();
    assert_eq!(chair.texture.as_deref(), Some("Walnut"));
}

#[tokio::test]
async fn test_reload_relocalizes_and_reattaches() {
    let dir = TempDir::new().unwrap();
    let (room, placed) = saved_room(&dir).await;

    // a fresh launch
    let mut h = SessionHarness::new(dir.path()).unwrap();
    h.session.start();
    h.session.load_experience(room.clone());
    assert_eq!(h.tracking.run_count(), 2);
    assert!(h.tracking.last_run_options().unwrap().remove_existing_anchors);
    assert!(h.session.is_relocalizing());
    assert!(h.session.relocalization_image().is_some());

    assert_eq!(h.object_count(), placed.len());
    assert!(h.session.registry().iter().all(|o| o.node.is_none()));

    h.sync_frame();
    let status = h.session.status().unwrap();
    assert!(status.show_snapshot);
    assert_eq!(status.message, "Move your device to the location shown in the image.");

    h.tracking.relocalize();
    h.settle().await;
    let restored: Vec<ObjectId> = h
        .session
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::ObjectRestored(id) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(restored.len(), placed.len());

    for (id, model, transform) in &placed {
        let object = h.session.registry().get(*id).unwrap();
        assert_eq!(&object.model.as_str().to_string(), model);
        assert_eq!(object.world_transform, *transform);
        assert!(object.node.is_some());
    }
    let chair = h
        .session
        .registry()
        .iter()
        .find(|o| o.model.as_str() == fixtures::CHAIR)
        .unwrap();
    assert_eq!(chair.applied_texture.as_deref(), Some("Walnut"));
    assert_eq!(chair.materials.len(), 2);
    assert_eq!(h.session.scene().anchors.plane_count(), 1);

    h.sync_frame();
    assert!(!h.session.is_relocalizing());
    assert_eq!(
        h.session.status().unwrap().message,
        "Tap 'Save' to save the current room."
    );
}

#[tokio::test]
async fn test_load_before_start_defers_map() {
    let dir = TempDir::new().unwrap();
    let (room, placed) = saved_room(&dir).await;

    let mut h = SessionHarness::new(dir.path()).unwrap();
    h.session.enter_room(room);
    assert_eq!(h.tracking.run_count(), 0);
    assert_eq!(h.object_count(), placed.len());

    h.session.start();
    assert_eq!(h.tracking.run_count(), 1);
    assert!(h.tracking.last_run_options().unwrap().reset_tracking);
    h.tracking.relocalize();
    h.settle().await;
    assert!(h.session.registry().iter().all(|o| o.node.is_some()));
}

#[tokio::test]
async fn test_resave_after_reload_round_trips() {
    let dir = TempDir::new().unwrap();
    let (room, placed) = saved_room(&dir).await;

    let mut h = SessionHarness::new(dir.path()).unwrap();
    h.session.start();
    h.session.load_experience(room.clone());
    h.tracking.relocalize();
    h.settle().await;
    h.sync_frame();

    h.session.save_experience();
    h.settle().await;
    assert_eq!(saved_id(&h.session.take_events()), Some(room.id));

    let again = RoomStore::open(dir.path()).unwrap().load(room.id).unwrap();
    let map = again.world_map().unwrap();
    let snapshots = map.anchors.iter().filter(|a| a.is_snapshot()).count();
    assert_eq!(snapshots, 1);
    let mut pairs: Vec<(String, glam::Mat4)> = again
        .objects()
        .unwrap()
        .objects
        .into_iter()
        .map(|r| (r.model, r.anchor_transform))
        .collect();
    let mut expected: Vec<(String, glam::Mat4)> =
        placed.into_iter().map(|(_, model, transform)| (model, transform)).collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    expected.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(pairs, expected);
}

#[tokio::test]
async fn test_save_without_world_map_fails_recoverably() {
    let dir = TempDir::new().unwrap();
    let mut h = SessionHarness::new(dir.path()).unwrap();
    let room = h.session.store().create("Office", RoomType::Office).unwrap();
    h.session.enter_room(room.clone());
    h.start_with_floor(Vec2::new(6.0, 6.0)).await;
    h.place(fixtures::TABLE, Vec3::ZERO).await.unwrap();

    h.tracking.set_world_map_available(false);
    h.session.save_experience();
    h.settle().await;

    let events = h.session.take_events();
    assert!(save_failure(&events).is_some());
    assert!(!h.session.room().unwrap().is_archived());
    assert!(!h.session.store().load(room.id).unwrap().is_archived());
    assert_eq!(h.object_count(), 1);

    // the session keeps working and a later save succeeds
    h.tracking.set_world_map_available(true);
    h.session.save_experience();
    h.settle().await;
    assert_eq!(saved_id(&h.session.take_events()), Some(room.id));
}

#[tokio::test]
async fn test_save_without_room_fails() {
    let dir = TempDir::new().unwrap();
    let mut h = SessionHarness::new(dir.path()).unwrap();
    h.start_with_floor(Vec2::new(6.0, 6.0)).await;
    h.session.take_events();

    h.session.save_experience();
    h.settle().await;
    assert!(save_failure(&h.session.take_events()).is_some());
    assert!(h.session.store().list_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_room_falls_back_to_fresh_session() {
    let dir = TempDir::new().unwrap();
    let mut h = SessionHarness::new(dir.path()).unwrap();
    h.start_with_floor(Vec2::new(6.0, 6.0)).await;
    h.place(fixtures::CHAIR, Vec3::ZERO).await.unwrap();

    let mut document = serde_json::to_value(Room::new("Attic", RoomType::GuestRoom)).unwrap();
    document["world_map"] = serde_json::json!("Z2FyYmFnZQ==");
    document["objects"] = serde_json::json!("Z2FyYmFnZQ==");
    let corrupt = Room::from_json(&document.to_string()).unwrap();
    assert!(corrupt.is_archived());

    h.session.load_experience(corrupt.clone());
    let events = h.session.take_events();
    assert!(events.iter().any(|e| matches!(e, SessionEvent::LoadFailed(_))));

    assert!(h.session.registry().is_empty());
    assert!(!h.session.is_relocalizing());
    let active = h.session.room().unwrap();
    assert_eq!(active.id, corrupt.id);
    assert!(!active.is_archived());
    assert!(h.tracking.last_run_options().unwrap().remove_existing_anchors);
}

#[tokio::test]
async fn test_listing_skips_corrupt_rooms() {
    let dir = TempDir::new().unwrap();
    let (room, _) = saved_room(&dir).await;
    let store = RoomStore::open(dir.path()).unwrap();
    store.create("Attic", RoomType::GuestRoom).unwrap();
    std::fs::write(store.path_for(uuid::Uuid::new_v4()), "{\"version\": 1").unwrap();

    let rooms = store.list_all().unwrap();
    let names: Vec<&str> = rooms.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Attic", "Den"]);
    assert!(rooms.iter().any(|r| r.id == room.id && r.is_archived()));
}

#[tokio::test]
async fn test_status_follows_tracking() {
    let dir = TempDir::new().unwrap();
    let mut h = SessionHarness::new(dir.path()).unwrap();
    h.session.start();
    h.session.update_frame(FrameState {
        tracking: TrackingState::Limited(LimitedReason::ExcessiveMotion),
        mapping: MappingStatus::Limited,
    });
    assert_eq!(h.session.status().unwrap().message, "Move the device more slowly.");

    h.session.update_frame(FrameState {
        tracking: TrackingState::Normal,
        mapping: MappingStatus::Limited,
    });
    assert_eq!(
        h.session.status().unwrap().message,
        "Move around to map the environment."
    );
    let changes = h
        .session
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::StatusChanged(_)))
        .count();
    // idle start, excessive motion, limited mapping
    assert_eq!(changes, 3);
}

#[tokio::test]
async fn test_entering_empty_room_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let mut h = SessionHarness::new(dir.path()).unwrap();
    let first = h.session.store().create("Kitchen", RoomType::Kitchen).unwrap();
    h.session.enter_room(first);
    h.start_with_floor(Vec2::new(6.0, 6.0)).await;
    let chair = h.place(fixtures::CHAIR, Vec3::ZERO).await.unwrap();
    assert_eq!(h.session.selected(), Some(chair));
    assert_eq!(h.session.scene().anchors.plane_count(), 1);
    let runs = h.tracking.run_count();

    let second = h.session.store().create("Study", RoomType::Office).unwrap();
    h.session.enter_room(second.clone());
    h.settle().await;

    assert_eq!(h.object_count(), 0);
    assert_eq!(h.session.selected(), None);
    assert_eq!(h.session.scene().anchors.plane_count(), 0);
    assert!(!h.session.is_relocalizing());
    assert_eq!(h.tracking.run_count(), runs + 1);
    let options = h.tracking.last_run_options().unwrap();
    assert!(options.reset_tracking && options.remove_existing_anchors);

    // the chair from the first room is not written into the second
    h.tracking.add_floor(Vec2::ZERO, Vec2::new(6.0, 6.0));
    h.settle().await;
    h.sync_frame();
    h.session.save_experience();
    h.settle().await;
    assert_eq!(saved_id(&h.session.take_events()), Some(second.id));
    let stored = h.session.store().load(second.id).unwrap();
    assert!(stored.objects().unwrap().objects.is_empty());
}
