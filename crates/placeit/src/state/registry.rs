//! Placed objects and the registry that owns them

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use glam::{Mat4, Vec3};
use shared::{AnchorId, ObjectId, PlacedObjectRecord, TextureSetId};

use crate::assets::{AssetResolver, ModelAsset, ModelRef, NodeTexture, TextureSet};
use crate::error::AssetLoadError;
use crate::scene::{model_pose, Aabb, NodeId};

/// One piece of furniture in the scene
#[derive(Debug, Clone)]
pub struct PlacedObject {
    pub id: ObjectId,
    pub model: ModelRef,
    /// Pose of the object root: position and plane orientation
    pub world_transform: Mat4,
    /// Rotation around the local up axis, applied beneath the root
    pub yaw: f32,
    pub scale: Vec3,
    /// None while being dragged
    pub anchor: Option<AnchorId>,
    pub applied_texture: Option<TextureSetId>,
    /// Per-node material bindings from the applied texture set
    pub materials: BTreeMap<String, NodeTexture>,
    /// Local geometry bounds
    pub bounds: Aabb,
    pub nodes: Vec<String>,
    /// Root node in the scene graph; None while detached
    pub node: Option<NodeId>,
}

impl PlacedObject {
    pub fn new(asset: ModelAsset, world_transform: Mat4) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            model: asset.model,
            world_transform,
            yaw: 0.0,
            scale: Vec3::ONE,
            anchor: None,
            applied_texture: None,
            materials: BTreeMap::new(),
            bounds: asset.bounds,
            nodes: asset.nodes,
            node: None,
        }
    }

    /// Rebuild an archived object. It expects its saved anchor and stays
    /// detached until that anchor is delivered again.
    pub fn from_record(record: &PlacedObjectRecord, asset: ModelAsset) -> Self {
        Self {
            id: record.id,
            world_transform: record.anchor_transform,
            yaw: record.yaw,
            scale: record.scale,
            anchor: Some(record.anchor_id),
            ..Self::new(asset, record.anchor_transform)
        }
    }

    pub fn position(&self) -> Vec3 {
        self.world_transform.w_axis.truncate()
    }

    /// Yaw and scale beneath the root
    pub fn model_pose(&self) -> Mat4 {
        model_pose(self.yaw, self.scale)
    }

    /// Bounds in the root's frame (yaw and scale applied)
    pub fn root_bounds(&self) -> Aabb {
        self.bounds.transform(&self.model_pose())
    }

    pub fn world_bounds(&self) -> Aabb {
        self.bounds
            .transform(&(self.world_transform * self.model_pose()))
    }

    /// Bind the set's textures to matching nodes. Nodes the set does not
    /// cover keep their current material. Returns the number of nodes bound.
    pub fn apply_texture(&mut self, set: &TextureSet) -> usize {
        let mut bound = 0;
        for node in &self.nodes {
            if let Some(texture) = set.nodes.get(node) {
                self.materials.insert(node.clone(), texture.clone());
                bound += 1;
            }
        }
        self.applied_texture = Some(set.id.clone());
        bound
    }

    /// Persistable form; None while the object has no anchor
    pub fn to_record(&self) -> Option<PlacedObjectRecord> {
        Some(PlacedObjectRecord {
            id: self.id,
            model: self.model.as_str().to_string(),
            anchor_id: self.anchor?,
            anchor_transform: self.world_transform,
            yaw: self.yaw,
            scale: self.scale,
            texture: self.applied_texture.clone(),
        })
    }
}

/// Ordered collection of placed objects, unique by id
pub struct ObjectRegistry {
    resolver: Arc<dyn AssetResolver>,
    objects: Vec<PlacedObject>,
    /// Live instances per model; the resolver is told when one drops to zero
    geometry_refs: HashMap<ModelRef, usize>,
}

impl ObjectRegistry {
    pub fn new(resolver: Arc<dyn AssetResolver>) -> Self {
        Self {
            resolver,
            objects: Vec::new(),
            geometry_refs: HashMap::new(),
        }
    }

    pub fn resolver(&self) -> &Arc<dyn AssetResolver> {
        &self.resolver
    }

    /// Load a model off the interactive thread. The returned object is not a
    /// member of the registry until it is passed to [`ObjectRegistry::add`].
    pub fn load(
        &self,
        model: ModelRef,
    ) -> impl Future<Output = Result<PlacedObject, AssetLoadError>> + Send + 'static {
        let resolver = Arc::clone(&self.resolver);
        async move {
            let name = model.to_string();
            let asset = tokio::task::spawn_blocking(move || resolver.resolve(&model))
                .await
                .map_err(|e| {
                    tracing::warn!("Geometry load for {} did not complete: {}", name, e);
                    AssetLoadError::Aborted(name)
                })??;
            Ok(PlacedObject::new(asset, Mat4::IDENTITY))
        }
    }

    /// Rebuild an archived object, resolving its geometry and texture now
    pub fn restore(&self, record: &PlacedObjectRecord) -> Result<PlacedObject, AssetLoadError> {
        let model = ModelRef::new(record.model.clone());
        let asset = self.resolver.resolve(&model)?;
        let mut object = PlacedObject::from_record(record, asset);
        if let Some(texture) = &record.texture {
            match self.find_texture_set(&model, texture) {
                Some(set) => {
                    object.apply_texture(&set);
                }
                None => tracing::warn!("Texture set {} missing for {}", texture, model),
            }
        }
        Ok(object)
    }

    /// Texture sets available for a model
    pub fn texture_sets(&self, model: &ModelRef) -> Vec<TextureSet> {
        self.resolver.texture_sets(model)
    }

    pub fn find_texture_set(&self, model: &ModelRef, id: &str) -> Option<TextureSet> {
        self.texture_sets(model).into_iter().find(|s| s.id == id)
    }

    fn retain_model(&mut self, model: &ModelRef) {
        *self.geometry_refs.entry(model.clone()).or_insert(0) += 1;
    }

    fn release_model(&mut self, model: &ModelRef) {
        if let Some(count) = self.geometry_refs.get_mut(model) {
            *count -= 1;
            if *count == 0 {
                self.geometry_refs.remove(model);
                self.resolver.release(model);
                tracing::debug!("Released geometry for {}", model);
            }
        }
    }

    /// Append an object. A duplicate id is rejected.
    pub fn add(&mut self, object: PlacedObject) -> bool {
        if self.contains(object.id) {
            tracing::warn!("Object {} already registered, ignoring", object.id);
            return false;
        }
        self.retain_model(&object.model);
        self.objects.push(object);
        true
    }

    /// Remove an object. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: ObjectId) -> Option<PlacedObject> {
        let index = self.objects.iter().position(|o| o.id == id)?;
        let object = self.objects.remove(index);
        self.release_model(&object.model);
        Some(object)
    }

    /// Swap an object in place, keeping its position in the order.
    /// Returns the replaced object.
    pub fn replace(&mut self, old: ObjectId, object: PlacedObject) -> Option<PlacedObject> {
        if object.id != old && self.contains(object.id) {
            tracing::warn!("Replacement {} already registered", object.id);
            return None;
        }
        let index = self.objects.iter().position(|o| o.id == old)?;
        self.retain_model(&object.model);
        let previous = std::mem::replace(&mut self.objects[index], object);
        self.release_model(&previous.model);
        Some(previous)
    }

    /// Bulk replace, used when restoring a room. Returns the previous objects.
    pub fn replace_all(&mut self, objects: Vec<PlacedObject>) -> Vec<PlacedObject> {
        let previous = std::mem::take(&mut self.objects);
        for object in objects {
            self.add(object);
        }
        for object in &previous {
            self.release_model(&object.model);
        }
        previous
    }

    pub fn get(&self, id: ObjectId) -> Option<&PlacedObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut PlacedObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.iter().any(|o| o.id == id)
    }

    /// Object bound to (or expecting) an anchor
    pub fn find_by_anchor(&self, anchor: AnchorId) -> Option<ObjectId> {
        self.objects
            .iter()
            .find(|o| o.anchor == Some(anchor))
            .map(|o| o.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlacedObject> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlacedObject> {
        self.objects.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.iter().map(|o| o.id).collect()
    }

    /// Persistable snapshot of every anchored object, in order
    pub fn records(&self) -> Vec<PlacedObjectRecord> {
        self.objects
            .iter()
            .filter_map(|o| {
                let record = o.to_record();
                if record.is_none() {
                    tracing::debug!("Skipping unanchored object {} in snapshot", o.id);
                }
                record
            })
            .collect()
    }

    /// True if any object is anchored
    pub fn has_anchored_objects(&self) -> bool {
        self.objects.iter().any(|o| o.anchor.is_some())
    }

    /// Live instance count for a model
    pub fn geometry_refs(&self, model: &ModelRef) -> usize {
        self.geometry_refs.get(model).copied().unwrap_or(0)
    }
}
