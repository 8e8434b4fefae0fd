//! World model: named, posed collision geometry not attached to the robot.
//!
//! Objects are stored as `Arc<WorldObject>`.  Cloning a [`World`] shares
//! every object with the original; the first mutation of an object through
//! either copy detaches it (`Arc::make_mut`).  Observers and change tracking
//! belong to one world instance and are never cloned.
//!
//! Every mutation reports an [`Action`] to the observers and, when change
//! tracking is on, to the world's [`WorldDiff`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use planscene_collision::world::{Action, World};
//! use planscene_geometry::Shape;
//! use planscene_types::Pose;
//!
//! let mut world = World::new();
//! world.add_to_object(
//!     "box1",
//!     Pose::translation(1.0, 0.0, 0.0),
//!     vec![Arc::new(Shape::Box { size: [0.1; 3] })],
//!     vec![Pose::identity()],
//! );
//!
//! let mut fork = world.clone();
//! fork.track_changes(true);
//! fork.remove_object("box1");
//!
//! assert!(world.has_object("box1"));
//! assert_eq!(fork.diff().unwrap().get("box1"), Some(Action::DESTROY));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use planscene_geometry::Shape;
use planscene_types::Pose;
use tracing::{debug, error};

bitflags! {
    /// What happened to a world object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Action: u8 {
        const CREATE = 1;
        const DESTROY = 2;
        const MOVE_SHAPE = 4;
        const ADD_SHAPE = 8;
        const REMOVE_SHAPE = 16;
    }
}

/// Geometry of one world object.
///
/// `pose` places the object in the model frame; shape poses and subframes are
/// relative to it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldObject {
    pub id: String,
    pub pose: Pose,
    pub shapes: Vec<Arc<Shape>>,
    pub shape_poses: Vec<Pose>,
    pub subframes: BTreeMap<String, Pose>,
}

impl WorldObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pose: Pose::identity(),
            shapes: Vec::new(),
            shape_poses: Vec::new(),
            subframes: BTreeMap::new(),
        }
    }

    /// Shape poses in the model frame.
    pub fn global_shape_poses(&self) -> Vec<Pose> {
        self.shape_poses.iter().map(|p| self.pose * p).collect()
    }

    /// Subframe poses in the model frame.
    pub fn global_subframe(&self, name: &str) -> Option<Pose> {
        self.subframes.get(name).map(|p| self.pose * p)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// WorldDiff
// ────────────────────────────────────────────────────────────────────────────

/// Per-object record of the actions applied since tracking started.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldDiff {
    changes: BTreeMap<String, Action>,
}

impl WorldDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `action` into the record for `id`: a destroy replaces whatever
    /// was recorded, anything else accumulates.
    pub fn record(&mut self, id: &str, action: Action) {
        if action == Action::DESTROY {
            self.changes.insert(id.to_string(), action);
        } else {
            *self.changes.entry(id.to_string()).or_insert(Action::empty()) |= action;
        }
    }

    /// Overwrite the record for `id`.
    pub fn set(&mut self, id: &str, action: Action) {
        self.changes.insert(id.to_string(), action);
    }

    pub fn get(&self, id: &str) -> Option<Action> {
        self.changes.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Action)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// World
// ────────────────────────────────────────────────────────────────────────────

/// Callback invoked synchronously after every world mutation.
pub type ObserverCallback = Arc<dyn Fn(&WorldObject, Action) + Send + Sync>;

/// Registration handle returned by [`World::add_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

#[derive(Default)]
pub struct World {
    objects: BTreeMap<String, Arc<WorldObject>>,
    observers: Vec<(ObserverHandle, ObserverCallback)>,
    next_observer: u64,
    diff: Option<WorldDiff>,
}

impl Clone for World {
    fn clone(&self) -> Self {
        Self {
            objects: self.objects.clone(),
            observers: Vec::new(),
            next_observer: 0,
            diff: None,
        }
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("objects", &self.objects.keys().collect::<Vec<_>>())
            .field("observers", &self.observers.len())
            .field("diff", &self.diff)
            .finish()
    }
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub fn has_object(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    pub fn object(&self, id: &str) -> Option<&Arc<WorldObject>> {
        self.objects.get(id)
    }

    /// Object ids in sorted order.
    pub fn object_ids(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }

    pub fn objects(&self) -> impl Iterator<Item = &Arc<WorldObject>> {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// True for an object id or an `<id>/<subframe>` name.
    pub fn knows_transform(&self, name: &str) -> bool {
        self.transform(name).is_some()
    }

    /// Pose of an object or object subframe in the model frame.
    pub fn transform(&self, name: &str) -> Option<Pose> {
        if let Some(obj) = self.objects.get(name) {
            return Some(obj.pose);
        }
        let (id, sub) = name.split_once('/')?;
        self.objects.get(id)?.global_subframe(sub)
    }

    // ── Mutation ────────────────────────────────────────────────────────────

    /// Set the object pose and append shapes, creating the object if needed.
    pub fn add_to_object(
        &mut self,
        id: &str,
        pose: Pose,
        shapes: Vec<Arc<Shape>>,
        shape_poses: Vec<Pose>,
    ) -> bool {
        self.add_shapes_internal(id, Some(pose), shapes, shape_poses)
    }

    /// Append shapes, keeping the object pose (identity for a new object).
    pub fn add_shapes_to_object(
        &mut self,
        id: &str,
        shapes: Vec<Arc<Shape>>,
        shape_poses: Vec<Pose>,
    ) -> bool {
        self.add_shapes_internal(id, None, shapes, shape_poses)
    }

    fn add_shapes_internal(
        &mut self,
        id: &str,
        pose: Option<Pose>,
        shapes: Vec<Arc<Shape>>,
        shape_poses: Vec<Pose>,
    ) -> bool {
        if shapes.len() != shape_poses.len() {
            error!(
                object = %id,
                shapes = shapes.len(),
                poses = shape_poses.len(),
                "Number of shapes does not match number of poses"
            );
            return false;
        }
        let mut action = Action::ADD_SHAPE;
        let entry = self.objects.entry(id.to_string()).or_insert_with(|| {
            action |= Action::CREATE;
            Arc::new(WorldObject::new(id))
        });
        let obj = Arc::make_mut(entry);
        if let Some(pose) = pose {
            obj.pose = pose;
        }
        obj.shapes.extend(shapes);
        obj.shape_poses.extend(shape_poses);
        self.notify(id, action);
        true
    }

    /// Set the object pose, creating an empty object if needed.
    pub fn set_object_pose(&mut self, id: &str, pose: Pose) {
        let mut action = Action::MOVE_SHAPE;
        let entry = self.objects.entry(id.to_string()).or_insert_with(|| {
            action = Action::CREATE;
            Arc::new(WorldObject::new(id))
        });
        Arc::make_mut(entry).pose = pose;
        self.notify(id, action);
    }

    /// Pre-multiply the object pose by `transform`.
    pub fn move_object(&mut self, id: &str, transform: &Pose) -> bool {
        let Some(entry) = self.objects.get_mut(id) else {
            return false;
        };
        let obj = Arc::make_mut(entry);
        obj.pose = transform * obj.pose;
        self.notify(id, Action::MOVE_SHAPE);
        true
    }

    /// Set the pose of the shape `shape` (matched by pointer).
    pub fn move_shape_in_object(&mut self, id: &str, shape: &Arc<Shape>, pose: Pose) -> bool {
        let Some(entry) = self.objects.get_mut(id) else {
            return false;
        };
        let Some(i) = entry.shapes.iter().position(|s| Arc::ptr_eq(s, shape)) else {
            return false;
        };
        Arc::make_mut(entry).shape_poses[i] = pose;
        self.notify(id, Action::MOVE_SHAPE);
        true
    }

    /// Replace every shape pose at once; the count must match.
    pub fn move_shapes_in_object(&mut self, id: &str, poses: &[Pose]) -> bool {
        let Some(entry) = self.objects.get_mut(id) else {
            return false;
        };
        if entry.shapes.len() != poses.len() {
            return false;
        }
        Arc::make_mut(entry).shape_poses = poses.to_vec();
        self.notify(id, Action::MOVE_SHAPE);
        true
    }

    /// Remove one shape (matched by pointer); the object goes away with its
    /// last shape.
    pub fn remove_shape_from_object(&mut self, id: &str, shape: &Arc<Shape>) -> bool {
        let Some(entry) = self.objects.get_mut(id) else {
            return false;
        };
        let Some(i) = entry.shapes.iter().position(|s| Arc::ptr_eq(s, shape)) else {
            return false;
        };
        let obj = Arc::make_mut(entry);
        obj.shapes.remove(i);
        obj.shape_poses.remove(i);
        if obj.shapes.is_empty() {
            self.remove_object(id)
        } else {
            self.notify(id, Action::REMOVE_SHAPE);
            true
        }
    }

    pub fn remove_object(&mut self, id: &str) -> bool {
        match self.objects.remove(id) {
            Some(obj) => {
                self.notify_removed(&obj);
                true
            }
            None => false,
        }
    }

    pub fn clear_objects(&mut self) {
        let objects = std::mem::take(&mut self.objects);
        for obj in objects.values() {
            self.notify_removed(obj);
        }
    }

    /// Replace the subframes of an existing object.
    pub fn set_subframes_of_object(&mut self, id: &str, subframes: BTreeMap<String, Pose>) -> bool {
        match self.objects.get_mut(id) {
            Some(entry) => {
                Arc::make_mut(entry).subframes = subframes;
                true
            }
            None => false,
        }
    }

    // ── Observers ───────────────────────────────────────────────────────────

    pub fn add_observer(&mut self, callback: ObserverCallback) -> ObserverHandle {
        let handle = ObserverHandle(self.next_observer);
        self.next_observer += 1;
        self.observers.push((handle, callback));
        handle
    }

    pub fn remove_observer(&mut self, handle: ObserverHandle) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(h, _)| *h != handle);
        self.observers.len() != before
    }

    /// Replay every existing object to one observer with `action`.
    pub fn notify_observer_all_objects(&self, handle: ObserverHandle, action: Action) {
        if let Some((_, cb)) = self.observers.iter().find(|(h, _)| *h == handle) {
            for obj in self.objects.values() {
                cb(obj, action);
            }
        }
    }

    // ── Change tracking ─────────────────────────────────────────────────────

    /// Start (with an empty diff) or stop recording changes.
    pub fn track_changes(&mut self, enable: bool) {
        self.diff = enable.then(WorldDiff::new);
    }

    pub fn diff(&self) -> Option<&WorldDiff> {
        self.diff.as_ref()
    }

    pub fn diff_mut(&mut self) -> Option<&mut WorldDiff> {
        self.diff.as_mut()
    }

    /// Forget recorded changes, keeping tracking on if it was on.
    pub fn reset_diff(&mut self) {
        if let Some(diff) = &mut self.diff {
            diff.clear();
        }
    }

    fn notify(&mut self, id: &str, action: Action) {
        if let Some(obj) = self.objects.get(id).cloned() {
            self.dispatch(&obj, action);
        }
    }

    fn notify_removed(&mut self, obj: &Arc<WorldObject>) {
        debug!(object = %obj.id, "Removed world object");
        self.dispatch(obj, Action::DESTROY);
    }

    fn dispatch(&mut self, obj: &WorldObject, action: Action) {
        if let Some(diff) = &mut self.diff {
            diff.record(&obj.id, action);
        }
        for (_, cb) in &self.observers {
            cb(obj, action);
        }
    }
}
