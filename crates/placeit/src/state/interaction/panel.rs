//! Action panel shown above the selected object

use std::time::{Duration, Instant};

use glam::{Mat4, Vec3};
use shared::ObjectId;

use crate::scene::{Aabb, NodeId, NodeKind, PanelAction, SceneGraph};
use crate::state::registry::PlacedObject;
use crate::state::settings::PanelSettings;

/// Copy / delete / texture controls, parented to the selected object's root
#[derive(Debug, Default)]
pub struct ActionPanel {
    node: Option<NodeId>,
    object: Option<ObjectId>,
    buttons: Vec<(PanelAction, NodeId)>,
}

impl ActionPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.node.is_some()
    }

    /// Object the panel is attached to
    pub fn attached_to(&self) -> Option<ObjectId> {
        self.object
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Attach above `object` and start the appear animation. Any previous
    /// attachment is removed first.
    pub fn attach(
        &mut self,
        graph: &mut SceneGraph,
        object: &PlacedObject,
        settings: &PanelSettings,
        now: Instant,
    ) {
        self.detach(graph);
        let Some(root) = object.node else {
            return;
        };

        let height = object.root_bounds().size().y;
        let rest = Mat4::from_translation(Vec3::new(0.0, height + settings.margin, 0.0));
        let panel = graph.insert(NodeKind::ActionPanel, Some(root), rest, None);

        let actions = PanelAction::all();
        let count = actions.len() as f32;
        let total = count * settings.button_size + (count - 1.0) * settings.button_padding;
        let button_bounds = Aabb::from_center_size(Vec3::ZERO, Vec3::splat(settings.button_size));
        for (i, action) in actions.iter().enumerate() {
            let x = -total * 0.5
                + settings.button_size * 0.5
                + i as f32 * (settings.button_size + settings.button_padding);
            let button = graph.insert(
                NodeKind::PanelButton(*action),
                Some(panel),
                Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
                Some(button_bounds),
            );
            self.buttons.push((*action, button));
        }

        graph.animate_appear(
            panel,
            rest,
            settings.appear_drop,
            now,
            Duration::from_secs_f32(settings.appear_seconds.max(0.0)),
        );
        self.node = Some(panel);
        self.object = Some(object.id);
    }

    pub fn detach(&mut self, graph: &mut SceneGraph) {
        if let Some(node) = self.node.take() {
            graph.detach(node);
        }
        self.object = None;
        self.buttons.clear();
    }

    /// World position of a control, for driving taps
    pub fn button_position(&self, graph: &SceneGraph, action: PanelAction) -> Option<Vec3> {
        let (_, node) = self.buttons.iter().find(|(a, _)| *a == action)?;
        graph
            .contains(*node)
            .then(|| graph.world_transform(*node).w_axis.truncate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::scene::Ray;

    fn attached_object(graph: &mut SceneGraph) -> PlacedObject {
        let mut object = fixtures::placed(fixtures::CHAIR, Vec3::new(1.0, 0.0, 0.0));
        object.node = Some(graph.attach_object(
            object.id,
            object.world_transform,
            object.model_pose(),
            object.bounds,
        ));
        object
    }

    #[test]
    fn test_panel_sits_above_object() {
        let mut graph = SceneGraph::new();
        let object = attached_object(&mut graph);
        let settings = PanelSettings::default();
        let now = Instant::now();
        let mut panel = ActionPanel::new();
        panel.attach(&mut graph, &object, &settings, now);
        graph.tick(now + Duration::from_secs(1));

        let height = object.root_bounds().size().y;
        let copy = panel.button_position(&graph, PanelAction::Copy).unwrap();
        let delete = panel.button_position(&graph, PanelAction::Delete).unwrap();
        let texture = panel.button_position(&graph, PanelAction::Texture).unwrap();
        assert!((copy.y - (height + 0.15)).abs() < 1e-5);
        assert!((delete.x - 1.0).abs() < 1e-5);
        assert!((texture.x - copy.x - 0.22).abs() < 1e-5);
    }

    #[test]
    fn test_panel_height_uses_object_extent() {
        let mut graph = SceneGraph::new();
        let mut object = fixtures::placed(fixtures::CHAIR, Vec3::ZERO);
        // raised base: 0.2..0.9 is 0.7 tall
        object.bounds = Aabb::new(Vec3::new(-0.25, 0.2, -0.25), Vec3::new(0.25, 0.9, 0.25));
        object.node = Some(graph.attach_object(
            object.id,
            object.world_transform,
            object.model_pose(),
            object.bounds,
        ));
        let now = Instant::now();
        let mut panel = ActionPanel::new();
        panel.attach(&mut graph, &object, &PanelSettings::default(), now);
        graph.tick(now + Duration::from_secs(1));

        let delete = panel.button_position(&graph, PanelAction::Delete).unwrap();
        assert!((delete.y - 0.85).abs() < 1e-5);
    }

    #[test]
    fn test_button_hit_testing() {
        let mut graph = SceneGraph::new();
        let object = attached_object(&mut graph);
        let mut panel = ActionPanel::new();
        panel.attach(&mut graph, &object, &PanelSettings::default(), Instant::now());

        let copy = panel.button_position(&graph, PanelAction::Copy).unwrap();
        let ray = Ray::new(copy + Vec3::Y, Vec3::NEG_Y);
        assert_eq!(graph.panel_action_at(&ray), Some(PanelAction::Copy));

        let miss = Ray::new(Vec3::new(5.0, 3.0, 5.0), Vec3::NEG_Y);
        assert_eq!(graph.panel_action_at(&miss), None);
    }

    #[test]
    fn test_reattach_replaces_panel() {
        let mut graph = SceneGraph::new();
        let object = attached_object(&mut graph);
        let mut panel = ActionPanel::new();
        let settings = PanelSettings::default();
        panel.attach(&mut graph, &object, &settings, Instant::now());
        let first = panel.node().unwrap();
        panel.attach(&mut graph, &object, &settings, Instant::now());

        assert!(!graph.contains(first));
        assert_eq!(panel.attached_to(), Some(object.id));
        // object root + model + panel + 3 buttons
        assert_eq!(graph.len(), 6);

        panel.detach(&mut graph);
        assert!(!panel.is_attached());
        assert_eq!(graph.len(), 2);
    }
}
