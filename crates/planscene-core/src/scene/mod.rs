//! [`Scene`] – the planning scene aggregate.
//!
//! A scene combines a robot state, a [`World`] of free-standing collision
//! objects, an allowed-collision matrix, a fixed-frame table, per-object
//! metadata (colors, semantic types) and a pair of collision environments
//! (padded and unpadded).
//!
//! # Hierarchy
//!
//! Scenes form a copy-on-write tree.  [`Scene::diff`] derives a child that
//! reads through to its parent:
//!
//! | Field | Child before first write | After first write |
//! |-------|--------------------------|-------------------|
//! | robot state | read through to the parent | local copy |
//! | allowed-collision matrix | read through to the parent | local copy |
//! | fixed transforms | read through to the parent | local copy |
//! | object colors / types | parent entries, overlaid by local ones | local overlay |
//! | world | forked copy, changes tracked in a [`WorldDiff`] | same |
//!
//! Each scene owns one layer of values; a child shares its ancestors' layers
//! (`Rc<RefCell<_>>`) and only ever reads them.  Reads that fall through see
//! the parent's *current* value, so a parent stays freely editable after a
//! fork.  Edits flow back with [`Scene::push_diffs`] or as a message from
//! [`Scene::planning_scene_diff_msg`].
//!
//! Accessors hand out [`Ref`]/[`RefMut`] guards.  Holding a mutable guard of
//! a parent while reading a child that falls through to it panics, like any
//! other `RefCell` double borrow.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use planscene_core::Scene;
//! use planscene_geometry::Shape;
//! use planscene_robot::RobotModelBuilder;
//! use planscene_types::{CollisionObject, Header, Operation, Pose, PoseMsg, SolidPrimitive};
//!
//! let model = Arc::new(
//!     RobotModelBuilder::new("bot", "base")
//!         .collision("base", Shape::Sphere { radius: 0.2 }, Pose::identity())
//!         .build()
//!         .unwrap(),
//! );
//! let mut parent = Scene::new(model);
//!
//! let mut child = parent.diff();
//! let mut obj = CollisionObject::new("crate", Operation::Add);
//! obj.header = Header::new("base");
//! obj.primitives.push(SolidPrimitive::cuboid(0.1, 0.1, 0.1));
//! obj.primitive_poses.push(PoseMsg::from_translation(0.15, 0.0, 0.0));
//! child.process_collision_object_msg(&obj).unwrap();
//!
//! assert!(child.is_state_colliding(&child.current_state(), "", false));
//! assert!(!parent.is_state_colliding(&parent.current_state(), "", false));
//!
//! child.push_diffs(&mut parent);
//! assert!(parent.is_state_colliding(&parent.current_state(), "", false));
//! ```

mod attached;
mod collision;
mod frames;
mod messages;
mod metadata;
mod objects;
mod persist;
mod validity;

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use planscene_collision::world::ObserverCallback;
use planscene_collision::{
    Action, AllowedCollisionMatrix, BoundingVolumeAllocator, CollisionDetectorAllocator, CollisionEnv,
    ObserverHandle, World, WorldDiff,
};
use planscene_geometry::FixedTransforms;
use planscene_robot::{AttachedBodyCallback, RobotDescription, RobotModel, RobotState};
use planscene_types::{ColorRgba, DEFAULT_SCENE_NAME, ObjectType, SceneError};
use tracing::{Span, debug, error, info_span};

/// Decides whether a single state is acceptable (`verbose` asks for
/// diagnostics).
pub type StateFeasibilityFn = Arc<dyn Fn(&RobotState, bool) -> bool + Send + Sync>;

/// Decides whether moving between two states is acceptable.
pub type MotionFeasibilityFn = Arc<dyn Fn(&RobotState, &RobotState, bool) -> bool + Send + Sync>;

type Shared<T> = Rc<RefCell<T>>;

fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Values every layer of a tree bottoms out in.  Written only by the root
/// that created it.
struct Base {
    state: RobotState,
    acm: AllowedCollisionMatrix,
    transforms: FixedTransforms,
}

/// What one scene holds itself.  `None` means "ask the next layer down".
struct Layer {
    state: Option<RobotState>,
    acm: Option<AllowedCollisionMatrix>,
    transforms: Option<FixedTransforms>,
    object_colors: Option<BTreeMap<String, ColorRgba>>,
    original_object_colors: BTreeMap<String, ColorRgba>,
    object_types: Option<BTreeMap<String, ObjectType>>,
    world: World,
    detector: CollisionDetector,
}

impl Layer {
    fn root(world: World, detector: CollisionDetector) -> Self {
        Self {
            state: None,
            acm: None,
            transforms: None,
            object_colors: Some(BTreeMap::new()),
            original_object_colors: BTreeMap::new(),
            object_types: Some(BTreeMap::new()),
            world,
            detector,
        }
    }

    /// An empty overlay on `parent` with a change-tracked copy of its world.
    fn fork(parent: &Layer) -> Self {
        let mut world = parent.world.clone();
        world.track_changes(true);
        let detector = parent.detector.derive(&world);
        Self {
            state: None,
            acm: None,
            transforms: None,
            object_colors: None,
            original_object_colors: BTreeMap::new(),
            object_types: None,
            world,
            detector,
        }
    }
}

/// Padded and unpadded environments from one allocator.
struct CollisionDetector {
    alloc: Arc<dyn CollisionDetectorAllocator>,
    env: Box<dyn CollisionEnv>,
    env_unpadded: Box<dyn CollisionEnv>,
}

impl CollisionDetector {
    fn new(alloc: Arc<dyn CollisionDetectorAllocator>, world: &World, model: &Arc<RobotModel>) -> Self {
        let env = alloc.allocate_env(world, Arc::clone(model));
        let env_unpadded = alloc.allocate_env(world, Arc::clone(model));
        Self {
            alloc,
            env,
            env_unpadded,
        }
    }

    /// Same family and margins, serving `world`.
    fn derive(&self, world: &World) -> Self {
        Self {
            alloc: Arc::clone(&self.alloc),
            env: self.alloc.allocate_env_from(self.env.as_ref(), world),
            env_unpadded: self.alloc.allocate_env_from(self.env_unpadded.as_ref(), world),
        }
    }
}

/// The planning scene.  See the [module documentation](self).
pub struct Scene {
    name: String,
    span: Span,
    robot_model: Arc<RobotModel>,
    layer: Shared<Layer>,
    /// Layers this scene reads through, nearest first.
    ancestors: Vec<Shared<Layer>>,
    base: Shared<Base>,
    world_callback: Option<(ObserverCallback, ObserverHandle)>,
    attached_callback: Option<AttachedBodyCallback>,
    state_feasibility: Option<StateFeasibilityFn>,
    motion_feasibility: Option<MotionFeasibilityFn>,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layer = self.layer();
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("robot_model", &self.robot_model.name())
            .field("depth", &self.ancestors.len())
            .field("world", &layer.world)
            .field("detector", &layer.detector.alloc.name())
            .finish()
    }
}

impl Scene {
    // ── Construction ────────────────────────────────────────────────────────

    /// A root scene with an empty world.
    pub fn new(robot_model: Arc<RobotModel>) -> Self {
        Self::with_world(robot_model, World::new())
    }

    /// A root scene over `world`, using the bounding-volume detector.
    pub fn with_world(robot_model: Arc<RobotModel>, world: World) -> Self {
        Self::with_detector(robot_model, world, BoundingVolumeAllocator::shared())
    }

    /// A root scene over `world` whose collision environments come from
    /// `alloc`.
    ///
    /// The robot state starts at default values; the allowed-collision matrix
    /// starts with the model's disabled pairs.
    pub fn with_detector(
        robot_model: Arc<RobotModel>,
        mut world: World,
        alloc: Arc<dyn CollisionDetectorAllocator>,
    ) -> Self {
        let mut state = RobotState::new(Arc::clone(&robot_model));
        state.set_to_default_values();
        state.update();
        let acm = AllowedCollisionMatrix::from_pairs(
            robot_model
                .disabled_collision_pairs()
                .iter()
                .map(|(a, b)| (a.as_str(), b.as_str())),
            true,
        );
        let transforms = FixedTransforms::new(robot_model.model_frame());
        world.track_changes(false);
        let detector = CollisionDetector::new(alloc, &world, &robot_model);
        Self {
            name: DEFAULT_SCENE_NAME.to_string(),
            span: info_span!("scene", name = DEFAULT_SCENE_NAME),
            robot_model,
            layer: shared(Layer::root(world, detector)),
            ancestors: Vec::new(),
            base: shared(Base {
                state,
                acm,
                transforms,
            }),
            world_callback: None,
            attached_callback: None,
            state_feasibility: None,
            motion_feasibility: None,
        }
    }

    /// A root scene for a serde robot description.
    pub fn from_description(desc: &RobotDescription) -> Result<Self, SceneError> {
        let model = RobotModel::from_description(desc).map_err(|e| {
            error!(robot = %desc.name, error = %e, "Unable to construct robot model");
            SceneError::Construct(e.to_string())
        })?;
        Ok(Self::new(Arc::new(model)))
    }

    /// A child scene reading through to `self`.
    ///
    /// The world is forked and change-tracked; every other field is deferred
    /// to the parent until written.  The child inherits the parent's
    /// callbacks, feasibility predicates and collision detector family.
    pub fn diff(&self) -> Scene {
        let name = if self.name.is_empty() {
            String::new()
        } else {
            format!("{}+", self.name)
        };
        let layer = Layer::fork(&self.layer());
        let span = info_span!(parent: &self.span, "scene", name = %name);
        let mut ancestors = Vec::with_capacity(self.ancestors.len() + 1);
        ancestors.push(Rc::clone(&self.layer));
        ancestors.extend(self.ancestors.iter().map(Rc::clone));
        let mut child = Scene {
            name,
            span,
            robot_model: Arc::clone(&self.robot_model),
            layer: shared(layer),
            ancestors,
            base: Rc::clone(&self.base),
            world_callback: None,
            attached_callback: self.attached_callback.clone(),
            state_feasibility: self.state_feasibility.clone(),
            motion_feasibility: self.motion_feasibility.clone(),
        };
        let callback = self.world_callback.as_ref().map(|(cb, _)| Arc::clone(cb));
        child.set_collision_object_update_callback(callback);
        child
    }

    /// A child scene with a diff message applied.
    pub fn diff_with_msg(&self, msg: &planscene_types::PlanningSceneMsg) -> Result<Scene, SceneError> {
        let mut child = self.diff();
        child.set_planning_scene_diff_msg(msg)?;
        Ok(child)
    }

    /// An independent copy of `self` with the same name.
    pub fn clone_scene(&self) -> Scene {
        let mut scene = self.diff();
        scene.decouple_parent();
        scene.set_name(self.name.clone());
        scene
    }

    // ── Identity ────────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.span.record("name", self.name.as_str());
    }

    /// Span under which this scene logs.
    pub fn log_span(&self) -> &Span {
        &self.span
    }

    pub fn set_log_span(&mut self, span: Span) {
        self.span = span;
    }

    pub fn robot_model(&self) -> &Arc<RobotModel> {
        &self.robot_model
    }

    /// Frame every scene pose is expressed in.
    pub fn planning_frame(&self) -> &str {
        self.robot_model.model_frame()
    }

    pub fn is_diff(&self) -> bool {
        !self.ancestors.is_empty()
    }

    // ── Layer access ────────────────────────────────────────────────────────

    fn layer(&self) -> Ref<'_, Layer> {
        self.layer.borrow()
    }

    fn layer_mut(&mut self) -> RefMut<'_, Layer> {
        self.layer.borrow_mut()
    }

    /// Own layer, then ancestors, nearest first.
    fn layers(&self) -> impl DoubleEndedIterator<Item = &Shared<Layer>> {
        std::iter::once(&self.layer).chain(&self.ancestors)
    }

    /// First layer holding a value, else the base.  With `include_own` unset
    /// this is what the parent currently shows.
    fn resolve<T: ?Sized>(
        &self,
        include_own: bool,
        local: impl Fn(&Layer) -> Option<&T>,
        base: impl FnOnce(&Base) -> &T,
    ) -> Ref<'_, T> {
        for layer in self.layers().skip(usize::from(!include_own)) {
            if let Ok(value) = Ref::filter_map(layer.borrow(), &local) {
                return value;
            }
        }
        Ref::map(self.base.borrow(), base)
    }

    /// The value this scene holds itself: its layer's, or the base's on a
    /// root.
    fn own<T: ?Sized>(
        &self,
        local: impl FnOnce(&Layer) -> Option<&T>,
        base: impl FnOnce(&Base) -> &T,
    ) -> Option<Ref<'_, T>> {
        match Ref::filter_map(self.layer(), local) {
            Ok(value) => Some(value),
            Err(_) if self.is_diff() => None,
            Err(_) => Some(Ref::map(self.base.borrow(), base)),
        }
    }

    /// Mutable access to a read-through field.  A child copies the inherited
    /// value into its own layer first; a root writes its base.
    fn writable<T>(
        &mut self,
        local: impl Fn(&mut Layer) -> &mut Option<T>,
        base: impl FnOnce(&mut Base) -> &mut T,
        inherit: impl FnOnce(&Self) -> T,
    ) -> RefMut<'_, T> {
        if self.is_diff() && local(&mut *self.layer.borrow_mut()).is_none() {
            let value = inherit(self);
            *local(&mut *self.layer.borrow_mut()) = Some(value);
        }
        match RefMut::filter_map(self.layer.borrow_mut(), |l| local(l).as_mut()) {
            Ok(value) => value,
            Err(_) => RefMut::map(self.base.borrow_mut(), base),
        }
    }

    // ── Robot state ─────────────────────────────────────────────────────────

    pub fn current_state(&self) -> Ref<'_, RobotState> {
        self.resolve(true, |l| l.state.as_ref(), |b| &b.state)
    }

    /// Mutable robot state, materialised from the parent on first use.
    /// Link transforms are brought up to date before it is returned.
    pub fn current_state_mut(&mut self) -> RefMut<'_, RobotState> {
        let mut state = self.writable(
            |l| &mut l.state,
            |b| &mut b.state,
            |s| {
                let mut state = s.resolve(false, |l| l.state.as_ref(), |b| &b.state).clone();
                state.set_attached_body_update_callback(s.attached_callback.clone());
                state
            },
        );
        state.update();
        state
    }

    /// Replace the robot state.  The scene's attached-body callback is
    /// installed on it.
    pub fn set_current_state(&mut self, mut state: RobotState) {
        state.set_attached_body_update_callback(self.attached_callback.clone());
        *self.current_state_mut() = state;
    }

    fn local_state(&self) -> Option<Ref<'_, RobotState>> {
        self.own(|l| l.state.as_ref(), |b| &b.state)
    }

    /// The robot state the parent currently shows.  `None` on a root.
    fn parent_state(&self) -> Option<Ref<'_, RobotState>> {
        self.is_diff()
            .then(|| self.resolve(false, |l| l.state.as_ref(), |b| &b.state))
    }

    /// Invoked whenever a body is attached to or detached from the current
    /// state.
    pub fn set_attached_body_update_callback(&mut self, callback: Option<AttachedBodyCallback>) {
        self.attached_callback = callback.clone();
        if let Some(state) = self.layer_mut().state.as_mut() {
            state.set_attached_body_update_callback(callback.clone());
        }
        if !self.is_diff() {
            self.base
                .borrow_mut()
                .state
                .set_attached_body_update_callback(callback);
        }
    }

    // ── Allowed-collision matrix ────────────────────────────────────────────

    pub fn allowed_collision_matrix(&self) -> Ref<'_, AllowedCollisionMatrix> {
        self.resolve(true, |l| l.acm.as_ref(), |b| &b.acm)
    }

    pub fn allowed_collision_matrix_mut(&mut self) -> RefMut<'_, AllowedCollisionMatrix> {
        self.writable(
            |l| &mut l.acm,
            |b| &mut b.acm,
            |s| s.resolve(false, |l| l.acm.as_ref(), |b| &b.acm).clone(),
        )
    }

    pub fn set_allowed_collision_matrix(&mut self, acm: AllowedCollisionMatrix) {
        *self.allowed_collision_matrix_mut() = acm;
    }

    fn local_acm(&self) -> Option<Ref<'_, AllowedCollisionMatrix>> {
        self.own(|l| l.acm.as_ref(), |b| &b.acm)
    }

    // ── Fixed transforms ────────────────────────────────────────────────────

    pub fn transforms(&self) -> Ref<'_, FixedTransforms> {
        self.resolve(true, |l| l.transforms.as_ref(), |b| &b.transforms)
    }

    pub fn transforms_mut(&mut self) -> RefMut<'_, FixedTransforms> {
        self.writable(
            |l| &mut l.transforms,
            |b| &mut b.transforms,
            |s| s.resolve(false, |l| l.transforms.as_ref(), |b| &b.transforms).clone(),
        )
    }

    fn local_transforms(&self) -> Option<Ref<'_, FixedTransforms>> {
        self.own(|l| l.transforms.as_ref(), |b| &b.transforms)
    }

    // ── World ───────────────────────────────────────────────────────────────

    pub fn world(&self) -> Ref<'_, World> {
        Ref::map(self.layer(), |l| &l.world)
    }

    /// Direct access to the world.  Changes made here bypass the scene's
    /// metadata bookkeeping but are still tracked in the world diff.
    pub fn world_mut(&mut self) -> RefMut<'_, World> {
        RefMut::map(self.layer_mut(), |l| &mut l.world)
    }

    /// Changes since the scene was derived (children only).
    pub fn world_diff(&self) -> Option<Ref<'_, WorldDiff>> {
        Ref::filter_map(self.layer(), |l| l.world.diff()).ok()
    }

    /// Single observer slot on the world; replacing it unregisters the
    /// previous callback first.
    pub fn set_collision_object_update_callback(&mut self, callback: Option<ObserverCallback>) {
        if let Some((_, handle)) = self.world_callback.take() {
            self.world_mut().remove_observer(handle);
        }
        if let Some(cb) = callback {
            let handle = self.world_mut().add_observer(Arc::clone(&cb));
            self.world_callback = Some((cb, handle));
        }
    }

    // ── Feasibility predicates ──────────────────────────────────────────────

    pub fn set_state_feasibility_predicate(&mut self, predicate: Option<StateFeasibilityFn>) {
        self.state_feasibility = predicate;
    }

    pub fn state_feasibility_predicate(&self) -> Option<&StateFeasibilityFn> {
        self.state_feasibility.as_ref()
    }

    pub fn set_motion_feasibility_predicate(&mut self, predicate: Option<MotionFeasibilityFn>) {
        self.motion_feasibility = predicate;
    }

    pub fn motion_feasibility_predicate(&self) -> Option<&MotionFeasibilityFn> {
        self.motion_feasibility.as_ref()
    }

    // ── Collision detector ──────────────────────────────────────────────────

    pub fn active_collision_detector_name(&self) -> String {
        self.layer().detector.alloc.name().to_string()
    }

    /// Replace the collision detector.  Padding and scale carry over.
    pub fn allocate_collision_detector(&mut self, alloc: Arc<dyn CollisionDetectorAllocator>) {
        let mut layer = self.layer.borrow_mut();
        let mut next = CollisionDetector::new(alloc, &layer.world, &self.robot_model);
        next.env.copy_padding_and_scale_from(layer.detector.env.as_ref());
        next.env_unpadded
            .copy_padding_and_scale_from(layer.detector.env_unpadded.as_ref());
        debug!(parent: &self.span, detector = %next.alloc.name(), "Allocated collision detector");
        layer.detector = next;
    }

    /// The padded environment.  A name other than the active detector's is
    /// logged and answered with the active environment.
    pub fn collision_env(&self, name: &str) -> Ref<'_, dyn CollisionEnv> {
        self.check_detector_name(name);
        self.active_collision_env()
    }

    pub fn collision_env_unpadded(&self, name: &str) -> Ref<'_, dyn CollisionEnv> {
        self.check_detector_name(name);
        Ref::map(self.layer(), |l| l.detector.env_unpadded.as_ref())
    }

    fn check_detector_name(&self, name: &str) {
        let active = self.active_collision_detector_name();
        if name != active {
            error!(
                parent: &self.span,
                requested = %name,
                active = %active,
                "Could not get collision detector; returning the active one"
            );
        }
    }

    /// Padded environment of the active detector.
    pub fn active_collision_env(&self) -> Ref<'_, dyn CollisionEnv> {
        Ref::map(self.layer(), |l| l.detector.env.as_ref())
    }

    /// Padded environment for adjusting link padding and scale.
    pub fn collision_env_mut(&mut self) -> RefMut<'_, dyn CollisionEnv + 'static> {
        RefMut::map(self.layer_mut(), |l| l.detector.env.as_mut())
    }

    // ── Hierarchy operations ────────────────────────────────────────────────

    /// Discard every local change of a child scene, returning it to the
    /// parent's current contents.  No-op on a root.
    pub fn clear_diffs(&mut self) {
        let Some(parent) = self.ancestors.first().map(Rc::clone) else {
            return;
        };
        let callback = self.world_callback.take().map(|(cb, _)| cb);
        *self.layer_mut() = Layer::fork(&parent.borrow());
        self.set_collision_object_update_callback(callback);
        debug!(parent: &self.span, "Cleared scene diffs");
    }

    /// Materialise everything inherited from the parent and drop the parent
    /// link.  No-op on a root.
    pub fn decouple_parent(&mut self) {
        if !self.is_diff() {
            return;
        }
        let mut state = self.current_state().clone();
        state.set_attached_body_update_callback(self.attached_callback.clone());
        let acm = self.allowed_collision_matrix().clone();
        let transforms = self.transforms().clone();
        let object_colors = self.known_object_colors();
        let object_types = self.known_object_types();
        let original_object_colors = self.known_original_object_colors();
        {
            let mut layer = self.layer_mut();
            layer.state = None;
            layer.acm = None;
            layer.transforms = None;
            layer.object_colors = Some(object_colors);
            layer.object_types = Some(object_types);
            layer.original_object_colors = original_object_colors;
            layer.world.track_changes(false);
        }
        self.base = shared(Base {
            state,
            acm,
            transforms,
        });
        self.ancestors.clear();
        debug!(parent: &self.span, "Decoupled scene from its parent");
    }

    /// Apply this child's local changes to `target`, typically its parent.
    /// No-op on a root.
    ///
    /// Local transforms, robot state (with the type and color of each
    /// attached body) and collision matrix replace the target's; padding and
    /// scale are always copied; world changes are replayed object by object.
    pub fn push_diffs(&self, target: &mut Scene) {
        if !self.is_diff() {
            return;
        }

        // Everything is read before the target is touched: `target` may be
        // one of the layers this scene reads through.
        let transforms = self.local_transforms().map(|t| t.all_transforms().clone());
        let state = self.local_state().map(|s| s.clone());
        let acm = self.local_acm().map(|a| a.clone());
        let attached: Vec<_> = state
            .iter()
            .flat_map(|s| s.attached_bodies())
            .map(|body| (body.id.clone(), self.object_type(&body.id), self.object_color(&body.id)))
            .collect();
        let replay: Vec<_> = {
            let world = self.world();
            world
                .diff()
                .into_iter()
                .flat_map(|diff| diff.iter())
                .map(|(id, action)| {
                    (
                        id.to_string(),
                        action,
                        world.object(id).cloned(),
                        self.object_color(id),
                        self.object_type(id),
                    )
                })
                .collect()
        };

        if let Some(transforms) = transforms {
            target.transforms_mut().set_all_transforms(transforms);
        }

        if let Some(state) = state {
            target.set_current_state(state);
            for (id, object_type, color) in attached {
                if let Some(t) = object_type {
                    target.set_object_type(&id, t);
                }
                if let Some(c) = color {
                    target.set_object_color(&id, c);
                }
            }
        }

        if let Some(acm) = acm {
            target.set_allowed_collision_matrix(acm);
        }

        target
            .collision_env_mut()
            .copy_padding_and_scale_from(&*self.active_collision_env());

        for (id, action, object, color, object_type) in replay {
            if action == Action::DESTROY {
                target.world_mut().remove_object(&id);
                target.remove_object_color(&id);
                target.remove_object_type(&id);
                if !target.current_state().has_attached_body(&id) {
                    target.allowed_collision_matrix_mut().remove_entry(&id);
                }
            } else if let Some(obj) = object {
                {
                    let mut world = target.world_mut();
                    world.remove_object(&id);
                    world.add_to_object(&id, obj.pose, obj.shapes.clone(), obj.shape_poses.clone());
                }
                if let Some(c) = color {
                    target.set_object_color(&id, c);
                }
                if let Some(t) = object_type {
                    target.set_object_type(&id, t);
                }
                target
                    .world_mut()
                    .set_subframes_of_object(&id, obj.subframes.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planscene_geometry::Shape;
    use planscene_collision::WorldObject;
    use planscene_robot::AttachedBody;
    use planscene_robot::model::{Joint, RobotModelBuilder};
    use planscene_types::Pose;
    use std::sync::Mutex;

    fn model() -> Arc<RobotModel> {
        Arc::new(
            RobotModelBuilder::new("bot", "base")
                .link("arm", "base", Joint::revolute("shoulder", [0.0, 0.0, 1.0]))
                .collision("arm", Shape::Sphere { radius: 0.1 }, Pose::identity())
                .build()
                .unwrap(),
        )
    }

    fn cube(world: &mut World, id: &str, x: f64) {
        world.add_to_object(
            id,
            Pose::translation(x, 0.0, 0.0),
            vec![Arc::new(Shape::Box { size: [0.1; 3] })],
            vec![Pose::identity()],
        );
    }

    fn shoulder(scene: &Scene) -> Option<f64> {
        scene.current_state().variable_position("shoulder")
    }

    // ── Construction ────────────────────────────────────────────────────────

    #[test]
    fn root_scene_defaults() {
        let scene = Scene::new(model());
        assert_eq!(scene.name(), DEFAULT_SCENE_NAME);
        assert!(!scene.is_diff());
        assert_eq!(scene.planning_frame(), "base");
        assert_eq!(scene.active_collision_detector_name(), "BoundingVolume");
        assert!(scene.world_diff().is_none());
        assert!(
            scene
                .allowed_collision_matrix()
                .has_pair_entry("base", "arm")
        );
    }

    #[test]
    fn child_name_and_lineage() {
        let parent = Scene::new(model());
        let child = parent.diff();
        assert_eq!(child.name(), "(noname)+");
        assert!(child.is_diff());
        assert!(Rc::ptr_eq(&child.ancestors[0], &parent.layer));
        assert!(Rc::ptr_eq(&child.base, &parent.base));
        assert!(child.world_diff().unwrap().is_empty());

        let grandchild = child.diff();
        assert_eq!(grandchild.ancestors.len(), 2);
    }

    #[test]
    fn child_reads_through_until_written() {
        let mut parent = Scene::new(model());
        parent.current_state_mut().set_variable_position("shoulder", 0.3);

        let mut child = parent.diff();
        assert!(child.local_state().is_none());
        assert_eq!(shoulder(&child), Some(0.3));

        child.current_state_mut().set_variable_position("shoulder", 0.9);
        assert!(child.local_state().is_some());
        assert_eq!(shoulder(&parent), Some(0.3));
        assert_eq!(shoulder(&child), Some(0.9));
    }

    #[test]
    fn child_world_is_independent() {
        let mut world = World::new();
        cube(&mut world, "box1", 1.0);
        let parent = Scene::with_world(model(), world);

        let mut child = parent.diff();
        child.world_mut().remove_object("box1");
        assert!(parent.world().has_object("box1"));
        assert_eq!(child.world_diff().unwrap().get("box1"), Some(Action::DESTROY));
    }

    #[test]
    fn child_outlives_parent() {
        let mut parent = Scene::new(model());
        parent.current_state_mut().set_variable_position("shoulder", 0.4);
        let child = parent.diff();
        drop(parent);
        assert_eq!(shoulder(&child), Some(0.4));
    }

    // ── Tracking the parent ─────────────────────────────────────────────────

    #[test]
    fn parent_edits_after_fork_reach_child() {
        let mut parent = Scene::new(model());
        let child = parent.diff();
        let grandchild = child.diff();

        parent.current_state_mut().set_variable_position("shoulder", 1.2);
        parent.allowed_collision_matrix_mut().set_entry("arm", "tool", true);
        parent
            .transforms_mut()
            .set_transform("table", Pose::translation(1.0, 0.0, 0.0));
        parent.set_object_color("box1", ColorRgba::new(1.0, 0.0, 0.0, 1.0));

        for scene in [&child, &grandchild] {
            assert_eq!(shoulder(scene), Some(1.2));
            assert!(scene.allowed_collision_matrix().has_pair_entry("arm", "tool"));
            assert!(scene.transforms().can_transform("table"));
            assert!(scene.has_object_color("box1"));
            assert!(scene.local_state().is_none());
        }
    }

    #[test]
    fn materialised_child_stops_tracking_parent() {
        let mut parent = Scene::new(model());
        let mut child = parent.diff();
        child.current_state_mut().set_variable_position("shoulder", 0.5);

        parent.current_state_mut().set_variable_position("shoulder", 1.5);
        assert_eq!(shoulder(&child), Some(0.5));

        // Fields the child never wrote keep tracking.
        parent.allowed_collision_matrix_mut().set_entry("arm", "tool", true);
        assert!(child.allowed_collision_matrix().has_pair_entry("arm", "tool"));
        assert!(child.local_acm().is_none());
    }

    #[test]
    fn push_diffs_into_live_parent_then_clear() {
        let mut parent = Scene::new(model());
        let mut child = parent.diff();
        cube(&mut child.world_mut(), "box1", 1.0);
        child.set_object_color("box1", ColorRgba::new(0.0, 1.0, 0.0, 1.0));
        child.current_state_mut().set_variable_position("shoulder", 0.7);

        child.push_diffs(&mut parent);
        assert!(parent.world().has_object("box1"));
        assert!(parent.has_object_color("box1"));
        assert_eq!(shoulder(&parent), Some(0.7));

        child.clear_diffs();
        assert!(child.world_diff().unwrap().is_empty());
        assert!(child.local_state().is_none());
        assert!(child.world().has_object("box1"));
        assert!(child.has_object_color("box1"));
        assert_eq!(shoulder(&child), Some(0.7));

        // Still tracking after the reset.
        parent.current_state_mut().set_variable_position("shoulder", 0.1);
        assert_eq!(shoulder(&child), Some(0.1));
    }

    // ── Hierarchy operations ────────────────────────────────────────────────

    #[test]
    fn clear_diffs_resets_child() {
        let parent = Scene::new(model());
        let mut child = parent.diff();
        cube(&mut child.world_mut(), "box1", 1.0);
        child.current_state_mut().set_variable_position("shoulder", 1.0);
        child.set_object_color("box1", ColorRgba::new(1.0, 0.0, 0.0, 1.0));

        child.clear_diffs();
        assert!(!child.world().has_object("box1"));
        assert!(child.world_diff().unwrap().is_empty());
        assert!(child.local_state().is_none());
        assert!(!child.has_object_color("box1"));
        assert_eq!(shoulder(&child), Some(0.0));
    }

    #[test]
    fn decouple_materialises_and_is_idempotent() {
        let mut parent = Scene::new(model());
        parent.set_object_color("a", ColorRgba::new(0.0, 1.0, 0.0, 1.0));
        parent
            .transforms_mut()
            .set_transform("table", Pose::translation(1.0, 0.0, 0.0));

        let mut child = parent.diff();
        child.set_object_color("b", ColorRgba::new(0.0, 0.0, 1.0, 1.0));
        child.decouple_parent();
        child.decouple_parent();

        assert!(!child.is_diff());
        assert!(child.world_diff().is_none());
        assert!(child.has_object_color("a"));
        assert!(child.has_object_color("b"));
        assert!(child.transforms().can_transform("table"));
        assert!(child.local_state().is_some());

        parent.current_state_mut().set_variable_position("shoulder", 2.0);
        parent.remove_object_color("a");
        assert_eq!(shoulder(&child), Some(0.0));
        assert!(child.has_object_color("a"));
    }

    #[test]
    fn decoupled_scene_writes_stay_local() {
        let parent = Scene::new(model());
        let mut copy = parent.clone_scene();
        copy.current_state_mut().set_variable_position("shoulder", 0.8);
        assert_eq!(shoulder(&parent), Some(0.0));
    }

    #[test]
    fn decouple_on_root_is_noop() {
        let mut scene = Scene::new(model());
        scene.decouple_parent();
        assert!(!scene.is_diff());
    }

    #[test]
    fn clone_scene_keeps_name() {
        let mut parent = Scene::new(model());
        parent.set_name("kitchen");
        let copy = parent.clone_scene();
        assert_eq!(copy.name(), "kitchen");
        assert!(!copy.is_diff());
    }

    #[test]
    fn push_diffs_on_root_is_noop() {
        let mut root = Scene::new(model());
        root.collision_env_mut().set_padding(0.2);
        let mut target = Scene::new(model());
        root.push_diffs(&mut target);
        assert_eq!(target.active_collision_env().link_padding("arm"), 0.0);
    }

    // ── Callbacks ───────────────────────────────────────────────────────────

    #[test]
    fn world_callback_is_replaced_not_stacked() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut scene = Scene::new(model());
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            scene.set_collision_object_update_callback(Some(Arc::new(move |obj: &WorldObject, _: Action| {
                seen.lock().unwrap().push(format!("{tag}:{}", obj.id));
            })));
        }
        cube(&mut scene.world_mut(), "box1", 1.0);
        assert_eq!(*seen.lock().unwrap(), vec!["second:box1".to_string()]);
    }

    #[test]
    fn child_inherits_world_callback() {
        let seen = Arc::new(Mutex::new(0usize));
        let mut parent = Scene::new(model());
        let counter = Arc::clone(&seen);
        parent.set_collision_object_update_callback(Some(Arc::new(move |_: &WorldObject, _: Action| {
            *counter.lock().unwrap() += 1;
        })));
        let mut child = parent.diff();
        cube(&mut child.world_mut(), "box1", 1.0);
        assert_eq!(*seen.lock().unwrap(), 1);

        child.clear_diffs();
        cube(&mut child.world_mut(), "box2", 1.0);
        assert_eq!(*seen.lock().unwrap(), 2);
    }

    #[test]
    fn attached_callback_reaches_materialised_state() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut parent = Scene::new(model());
        let log = Arc::clone(&seen);
        parent.set_attached_body_update_callback(Some(Arc::new(move |body: &AttachedBody, attached: bool| {
            log.lock().unwrap().push((body.id.clone(), attached));
        })));
        let mut child = parent.diff();
        child.current_state_mut().attach_body(AttachedBody::new(
            "tool",
            "arm",
            Pose::identity(),
            vec![Arc::new(Shape::Sphere { radius: 0.05 })],
            vec![Pose::identity()],
        ));
        assert_eq!(*seen.lock().unwrap(), vec![("tool".to_string(), true)]);
    }

    // ── Collision detector ──────────────────────────────────────────────────

    #[test]
    fn unknown_detector_name_falls_back() {
        let mut scene = Scene::new(model());
        scene.collision_env_mut().set_link_padding("arm", 0.05);
        assert_eq!(scene.collision_env("FCL").link_padding("arm"), 0.05);
        assert_eq!(scene.collision_env_unpadded("FCL").link_padding("arm"), 0.0);
    }

    #[test]
    fn reallocating_detector_keeps_padding() {
        let mut scene = Scene::new(model());
        scene.collision_env_mut().set_link_padding("arm", 0.05);
        scene.allocate_collision_detector(BoundingVolumeAllocator::shared());
        assert_eq!(scene.active_collision_env().link_padding("arm"), 0.05);
    }

    #[test]
    fn child_inherits_padding() {
        let mut parent = Scene::new(model());
        parent.collision_env_mut().set_link_padding("arm", 0.05);
        let child = parent.diff();
        assert_eq!(child.active_collision_env().link_padding("arm"), 0.05);
    }
}
