//! Integration tests for placement and interaction through the session
//! manager, driven by the headless harness.

use std::time::{Duration, Instant};

use glam::{Vec2, Vec3};
use placeit_lib::assets::ModelRef;
use placeit_lib::fixtures;
use placeit_lib::harness::SessionHarness;
use placeit_lib::scene::PanelAction;
use placeit_lib::state::interaction::{PanGesture, RotationGesture, TapOutcome};
use placeit_lib::state::{SessionEvent, SessionPhase};
use tempfile::TempDir;

async fn harness() -> (TempDir, SessionHarness) {
    let dir = TempDir::new().unwrap();
    let mut h = SessionHarness::new(dir.path()).unwrap();
    h.start_with_floor(Vec2::new(10.0, 10.0)).await;
    h.session.take_events();
    (dir, h)
}

#[tokio::test]
async fn test_place_on_floor_anchors_object() {
    let (_dir, mut h) = harness().await;
    let id = h.place(fixtures::CHAIR, Vec3::new(1.0, 0.0, 1.0)).await.unwrap();

    let object = h.session.registry().get(id).unwrap();
    assert_eq!(object.model.as_str(), fixtures::CHAIR);
    assert!((object.position() - Vec3::new(1.0, 0.0, 1.0)).length() < 1e-5);
    assert!(object.node.is_some());
    assert_eq!(h.anchor_transform(id), Some(object.world_transform));
    // floor + object anchor
    assert_eq!(h.tracking.anchor_count(), 2);
    assert!(h.session.selected().is_none());
    assert!(h.session.placement_model().is_none());
    assert_eq!(
        h.session.status().unwrap().message,
        "Tap 'Save' to save the current room."
    );
}

#[tokio::test]
async fn test_placement_tap_off_plane_keeps_model_pending() {
    let (_dir, mut h) = harness().await;
    h.session
        .select_model_for_placement(Some(ModelRef::new(fixtures::TABLE)));
    assert_eq!(h.tap_world(Vec3::new(20.0, 0.0, 20.0)), TapOutcome::PlacementMissed);
    h.settle().await;

    assert!(h.session.registry().is_empty());
    assert_eq!(h.session.placement_model().map(ModelRef::as_str), Some(fixtures::TABLE));

    h.session.select_model_for_placement(None);
    assert_eq!(
        h.session.take_events(),
        vec![
            SessionEvent::PlacementModelChanged(Some(ModelRef::new(fixtures::TABLE))),
            SessionEvent::PlacementModelChanged(None),
        ]
    );
}

#[tokio::test]
async fn test_broken_model_creates_nothing() {
    let (_dir, mut h) = harness().await;
    h.session
        .select_model_for_placement(Some(ModelRef::new(fixtures::BROKEN)));
    h.tap_world(Vec3::ZERO);
    h.settle().await;

    assert!(h.session.registry().is_empty());
    assert_eq!(h.tracking.anchor_count(), 1);
    let failed = h
        .session
        .take_events()
        .into_iter()
        .any(|e| matches!(e, SessionEvent::AssetLoadFailed { ref model, .. } if model.as_str() == fixtures::BROKEN));
    assert!(failed);
}

#[tokio::test]
async fn test_selection_is_exclusive() {
    let (_dir, mut h) = harness().await;
    let a = h.place(fixtures::CHAIR, Vec3::ZERO).await.unwrap();
    let b = h.place(fixtures::CHAIR, Vec3::new(2.0, 0.0, 0.0)).await.unwrap();

    assert_eq!(h.tap_world(Vec3::ZERO), TapOutcome::Selected(a));
    assert_eq!(h.tap_world(Vec3::new(2.0, 0.0, 0.0)), TapOutcome::Selected(b));

    let graph = &h.session.scene().graph;
    assert_eq!(graph.highlighted_objects(), vec![b]);
    assert_eq!(h.session.interaction().panel().attached_to(), Some(b));
    assert_eq!(
        h.session.take_events(),
        vec![
            SessionEvent::SelectionChanged(Some(a)),
            SessionEvent::SelectionChanged(Some(b)),
        ]
    );

    assert_eq!(h.tap_world(Vec3::new(-4.0, 0.0, -4.0)), TapOutcome::Cleared);
    assert!(h.session.selected().is_none());
    assert!(h.session.scene().graph.highlighted_objects().is_empty());
}

#[tokio::test]
async fn test_pan_threshold_and_reanchor() {
    let (_dir, mut h) = harness().await;
    let id = h.place(fixtures::CHAIR, Vec3::ZERO).await.unwrap();
    h.tap_world(Vec3::ZERO);
    let original_anchor = h.session.registry().get(id).unwrap().anchor.unwrap();

    h.session.handle_pan(&PanGesture::began(1));
    for _ in 0..29 {
        h.session.handle_pan(&PanGesture::moved(1, Vec2::X));
    }
    assert_eq!(h.object_position(id), Some(Vec3::ZERO));

    h.session.handle_pan(&PanGesture::moved(1, Vec2::X));
    assert!(h.session.handle_pan(&PanGesture::moved(1, Vec2::X)));
    let moved = h.object_position(id).unwrap();
    assert!((moved - Vec3::new(0.01, 0.0, 0.0)).length() < 1e-5);
    assert!(h.session.registry().get(id).unwrap().anchor.is_none());

    h.session.handle_pan(&PanGesture::ended());
    h.settle().await;

    let object = h.session.registry().get(id).unwrap();
    let anchor = object.anchor.unwrap();
    assert_ne!(anchor, original_anchor);
    assert!(h.tracking.anchor(original_anchor).is_none());
    assert_eq!(h.anchor_transform(id), Some(object.world_transform));
    assert_eq!(h.tracking.anchor_count(), 2);
}

#[tokio::test]
async fn test_two_finger_pan_uses_higher_threshold() {
    let (_dir, mut h) = harness().await;
    let id = h.place(fixtures::SOFA, Vec3::ZERO).await.unwrap();
    h.tap_world(Vec3::ZERO);

    h.session.handle_pan(&PanGesture::began(2));
    assert!(!h.session.handle_pan(&PanGesture::moved(2, Vec2::new(0.0, 45.0))));
    assert_eq!(h.object_position(id), Some(Vec3::ZERO));
    assert!(h.session.handle_pan(&PanGesture::moved(2, Vec2::new(0.0, 25.0))));
    let moved = h.object_position(id).unwrap();
    assert!((moved - Vec3::new(0.0, 0.0, 0.1)).length() < 1e-4);
    h.session.handle_pan(&PanGesture::ended());
    h.settle().await;
    assert!(h.session.registry().get(id).unwrap().anchor.is_some());
}

#[tokio::test]
async fn test_rotation_turns_selected_object() {
    let (_dir, mut h) = harness().await;
    let id = h.place(fixtures::CHAIR, Vec3::ZERO).await.unwrap();

    let mut gesture = RotationGesture::changed(0.5);
    assert!(!h.session.handle_rotation(&mut gesture));

    h.tap_world(Vec3::ZERO);
    assert!(h.session.handle_rotation(&mut gesture));
    assert_eq!(gesture.rotation, 0.0);
    assert!((h.session.registry().get(id).unwrap().yaw + 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn test_copy_places_offset_copy_and_selects_it() {
    let (_dir, mut h) = harness().await;
    let source = h.place(fixtures::TABLE, Vec3::new(1.0, 0.0, 1.0)).await.unwrap();
    h.tap_world(Vec3::new(1.0, 0.0, 1.0));
    h.session.take_events();

    assert!(matches!(h.tap_action(PanelAction::Copy), Some(TapOutcome::Copy(_))));
    assert!(h.session.selected().is_none());
    h.settle().await;

    assert_eq!(h.object_count(), 2);
    let copy = h.session.selected().unwrap();
    assert_ne!(copy, source);
    let object = h.session.registry().get(copy).unwrap();
    assert_eq!(object.model.as_str(), fixtures::TABLE);
    // table is 1.2 wide: offset 1.2 - 0.2 along local x
    assert!((object.position() - Vec3::new(2.0, 0.0, 1.0)).length() < 1e-5);
    assert!(object.anchor.is_some());
    assert_eq!(h.session.scene().graph.highlighted_objects(), vec![copy]);

    let events = h.session.take_events();
    assert_eq!(events.first(), Some(&SessionEvent::SelectionChanged(None)));
    assert_eq!(events.last(), Some(&SessionEvent::SelectionChanged(Some(copy))));
}

#[tokio::test]
async fn test_copy_keeps_texture() {
    let (_dir, mut h) = harness().await;
    let source = h.place(fixtures::CHAIR, Vec3::ZERO).await.unwrap();
    h.tap_world(Vec3::new(0.2, 0.0, 0.2));
    assert!(h.session.did_select_texture("Oak"));
    h.tap_action(PanelAction::Copy);
    h.settle().await;

    let copy = h.session.selected().unwrap();
    assert_ne!(copy, source);
    let object = h.session.registry().get(copy).unwrap();
    assert_eq!(object.applied_texture.as_deref(), Some("Oak"));
    assert_eq!(object.materials.len(), 2);
}

#[tokio::test]
async fn test_stale_copy_is_placed_but_not_selected() {
    let (_dir, mut h) = harness().await;
    h.place(fixtures::CHAIR, Vec3::ZERO).await.unwrap();
    let other = h.place(fixtures::CHAIR, Vec3::new(3.0, 0.0, 3.0)).await.unwrap();
    h.tap_world(Vec3::ZERO);
    h.tap_action(PanelAction::Copy);

    // user picks something else while the copy loads
    h.tap_world(Vec3::new(3.0, 0.0, 3.0));
    h.settle().await;

    assert_eq!(h.object_count(), 3);
    assert_eq!(h.session.selected(), Some(other));
    assert_eq!(h.session.scene().graph.highlighted_objects(), vec![other]);
}

#[tokio::test]
async fn test_delete_removes_object_and_anchor() {
    let (_dir, mut h) = harness().await;
    let id = h.place(fixtures::CHAIR, Vec3::new(-1.0, 0.0, 0.0)).await.unwrap();
    let root = h.session.registry().get(id).unwrap().node.unwrap();
    h.tap_world(Vec3::new(-1.0, 0.0, 0.0));

    assert_eq!(h.tap_action(PanelAction::Delete), Some(TapOutcome::Delete(id)));
    assert!(h.session.selected().is_none());
    assert!(!h.session.registry().contains(id));
    assert_eq!(h.tracking.anchor_count(), 1);

    // node shrinks out before it is detached
    assert!(h.session.scene().graph.contains(root));
    assert_eq!(h.tap_world(Vec3::new(-1.0, 0.0, 0.0)), TapOutcome::Cleared);
    assert!(h.session.tick(Instant::now() + Duration::from_secs(1)) > 0);
    assert!(!h.session.scene().graph.contains(root));

    let events = h.session.take_events();
    assert!(events.contains(&SessionEvent::ObjectRemoved(id)));
    assert!(!h.session.remove_object(id, true));
}

#[tokio::test]
async fn test_texture_editor_flow() {
    let (_dir, mut h) = harness().await;
    let id = h.place(fixtures::CHAIR, Vec3::ZERO).await.unwrap();
    h.tap_world(Vec3::new(0.2, 0.0, 0.2));
    h.session.take_events();

    assert_eq!(h.tap_action(PanelAction::Texture), Some(TapOutcome::EditTexture(id)));
    assert_eq!(
        h.session.take_events(),
        vec![SessionEvent::TextureEditorRequested {
            object: id,
            sets: vec!["Oak".to_string(), "Walnut".to_string()],
        }]
    );

    assert!(h.session.did_select_texture("Walnut"));
    assert!(!h.session.did_select_texture("Cherry"));
    let object = h.session.registry().get(id).unwrap();
    assert_eq!(object.applied_texture.as_deref(), Some("Walnut"));
    assert!(object.materials.values().all(|m| m
        .diffuse
        .as_ref()
        .is_some_and(|p| p.to_string_lossy().contains("Walnut"))));
}

#[tokio::test]
async fn test_swap_model_keeps_pose_and_selects_replacement() {
    let (_dir, mut h) = harness().await;
    let chair = h.place(fixtures::CHAIR, Vec3::new(1.0, 0.0, -1.0)).await.unwrap();
    h.tap_world(Vec3::new(1.0, 0.0, -1.0));
    h.session.handle_rotation(&mut RotationGesture::changed(-0.3));

    assert!(h.session.did_swap_model(ModelRef::new(fixtures::SOFA)));
    h.settle().await;

    assert_eq!(h.object_count(), 1);
    assert!(!h.session.registry().contains(chair));
    let sofa = h.session.selected().unwrap();
    let object = h.session.registry().get(sofa).unwrap();
    assert_eq!(object.model.as_str(), fixtures::SOFA);
    assert!((object.position() - Vec3::new(1.0, 0.0, -1.0)).length() < 1e-5);
    assert!((object.yaw - 0.3).abs() < 1e-6);
    assert_eq!(h.anchor_transform(sofa), Some(object.world_transform));
    assert_eq!(h.tracking.anchor_count(), 2);
}

#[tokio::test]
async fn test_start_and_pause_are_idempotent() {
    let (_dir, mut h) = harness().await;
    h.place(fixtures::CHAIR, Vec3::ZERO).await.unwrap();

    h.session.start();
    assert_eq!(h.tracking.run_count(), 1);

    h.session.pause();
    h.session.pause();
    assert_eq!(h.session.phase(), SessionPhase::Paused);
    assert!(!h.tracking.is_running());
    assert_eq!(h.object_count(), 1);

    h.session.start();
    h.session.start();
    assert_eq!(h.tracking.run_count(), 2);
    assert!(h.tracking.is_running());
    assert_eq!(h.object_count(), 1);
}

#[tokio::test]
async fn test_tracked_anchor_updates_move_object() {
    let (_dir, mut h) = harness().await;
    let id = h.place(fixtures::CHAIR, Vec3::ZERO).await.unwrap();
    let anchor = h.session.registry().get(id).unwrap().anchor.unwrap();

    let refined = glam::Mat4::from_translation(Vec3::new(0.05, 0.0, -0.02));
    h.tracking.move_anchor(anchor, refined);
    h.settle().await;

    assert_eq!(h.session.registry().get(id).unwrap().world_transform, refined);
}
