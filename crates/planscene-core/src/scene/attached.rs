//! Moving collision geometry between the world and robot links.
//!
//! Attaching (`Add` / `Append`) takes geometry from the message, or for an
//! `Add` without geometry from the world object of the same id, expresses it
//! in the link frame and removes the world object.  Detaching (`Remove`)
//! puts each selected body back into the world at its current global pose
//! and restores the object's original color.

use std::collections::BTreeMap;

use planscene_robot::AttachedBody;
use planscene_types::{AttachedCollisionObject, OCTOMAP_NS, Operation, Pose, SceneError};
use tracing::{debug, error, warn};

use super::Scene;
use super::objects::subframes_of;

impl Scene {
    /// Attach, extend or detach a body as described by `msg`.
    pub fn process_attached_collision_object_msg(&mut self, msg: &AttachedCollisionObject) -> Result<(), SceneError> {
        let op = msg.object.operation;
        if op == Operation::Add && !self.robot_model.has_link(&msg.link_name) {
            error!(parent: &self.span, link = %msg.link_name, object = %msg.object.id, "Unable to attach: link not found");
            return Err(SceneError::LinkNotFound(msg.link_name.clone()));
        }
        if msg.object.id == OCTOMAP_NS {
            error!(parent: &self.span, "The octomap cannot be attached to the robot");
            return Err(SceneError::ReservedId(msg.object.id.clone()));
        }
        self.current_state_mut();

        match op {
            Operation::Add | Operation::Append => self.attach_object(msg),
            Operation::Remove => self.detach_objects(msg),
            Operation::Move => {
                error!(parent: &self.span, object = %msg.object.id, "Move for attached objects not yet implemented");
                Err(SceneError::Unsupported("move of an attached object".into()))
            }
            Operation::Unknown => {
                error!(parent: &self.span, object = %msg.object.id, "Unknown attached collision object operation");
                Err(SceneError::Unsupported(format!(
                    "unknown operation on attached object '{}'",
                    msg.object.id
                )))
            }
        }
    }

    fn attach_object(&mut self, msg: &AttachedCollisionObject) -> Result<(), SceneError> {
        let obj = &msg.object;
        let id = obj.id.as_str();
        let Some(link_pose) = self.current_state().global_link_transform(&msg.link_name) else {
            error!(parent: &self.span, link = %msg.link_name, object = %id, "Link not found in the robot state");
            return Err(SceneError::LinkNotFound(msg.link_name.clone()));
        };
        let world_obj = self.world().object(id).cloned();

        let (pose, mut shapes, mut shape_poses, mut subframes) = if obj.operation == Operation::Add && !obj.has_geometry()
        {
            let Some(existing) = &world_obj else {
                error!(parent: &self.span, object = %id, "Attempting to attach object that is not in the world and has no geometry");
                return Err(SceneError::NoGeometry(id.to_string()));
            };
            (
                link_pose.inverse() * existing.pose,
                existing.shapes.clone(),
                existing.shape_poses.clone(),
                existing.subframes.clone(),
            )
        } else {
            let world_to_header = self
                .try_frame_transform(&obj.header.frame_id)
                .inspect_err(|_| {
                    error!(parent: &self.span, object = %id, frame = %obj.header.frame_id, "Unknown frame");
                })?;
            let decoded = self.decode_shapes(obj)?;
            (
                link_pose.inverse() * world_to_header * decoded.pose,
                decoded.shapes,
                decoded.shape_poses,
                subframes_of(obj),
            )
        };

        if shapes.is_empty() {
            error!(parent: &self.span, object = %id, "There is no geometry to attach");
            return Err(SceneError::NoGeometry(id.to_string()));
        }

        if !obj.object_type.is_empty() {
            self.set_object_type(id, obj.object_type.clone());
        }

        if world_obj.is_some() && self.world_mut().remove_object(id) {
            if obj.operation == Operation::Add {
                debug!(parent: &self.span, object = %id, link = %msg.link_name, "Removing world object with the same name as newly attached object");
            } else {
                warn!(parent: &self.span, object = %id, "Appending to an attached object removed the world object of the same name");
            }
        }

        let span = self.span.clone();
        let mut state = self.current_state_mut();
        let existing = state.attached_body(id).cloned();
        let body = match existing {
            Some(old) if obj.operation == Operation::Append => {
                let pose = if obj.pose.is_empty() { old.pose } else { pose };
                shapes.extend(old.shapes);
                shape_poses.extend(old.shape_poses);
                for (name, frame) in old.subframes {
                    subframes.entry(name).or_insert(frame);
                }
                let detach_posture = if msg.detach_posture.joint_names.is_empty() {
                    old.detach_posture
                } else {
                    msg.detach_posture.clone()
                };
                debug!(parent: &span, object = %id, link = %msg.link_name, "Appending to attached body");
                AttachedBody::new(id, &msg.link_name, pose, shapes, shape_poses)
                    .with_touch_links(old.touch_links)
                    .with_touch_links(msg.touch_links.iter().cloned())
                    .with_detach_posture(detach_posture)
                    .with_subframes(subframes)
            }
            previous => {
                if previous.is_some() {
                    debug!(parent: &span, object = %id, "Replacing attached body");
                } else {
                    debug!(parent: &span, object = %id, link = %msg.link_name, "Attached object to link");
                }
                AttachedBody::new(id, &msg.link_name, pose, shapes, shape_poses)
                    .with_touch_links(msg.touch_links.iter().cloned())
                    .with_detach_posture(msg.detach_posture.clone())
                    .with_subframes(subframes)
            }
        };
        state.clear_attached_body(id);
        state.attach_body(body);
        Ok(())
    }

    fn detach_objects(&mut self, msg: &AttachedCollisionObject) -> Result<(), SceneError> {
        let id = msg.object.id.as_str();
        let state = self.current_state();
        let bodies: Vec<AttachedBody> = if id.is_empty() {
            if !msg.link_name.is_empty() && self.robot_model.has_link(&msg.link_name) {
                state
                    .attached_bodies_on_link(&msg.link_name)
                    .into_iter()
                    .cloned()
                    .collect()
            } else {
                state.attached_bodies().cloned().collect()
            }
        } else {
            match state.attached_body(id) {
                Some(body) if !msg.link_name.is_empty() && body.link != msg.link_name => {
                    error!(
                        parent: &self.span,
                        object = %id,
                        stated = %msg.link_name,
                        actual = %body.link,
                        "The object is not attached to the stated link"
                    );
                    return Err(SceneError::AttachedToOtherLink {
                        id: id.to_string(),
                        stated: msg.link_name.clone(),
                        actual: body.link.clone(),
                    });
                }
                Some(body) => vec![body.clone()],
                None => Vec::new(),
            }
        };
        drop(state);

        for body in &bodies {
            if self.world().has_object(&body.id) {
                warn!(
                    parent: &self.span,
                    object = %body.id,
                    "The detached body is not re-added to the world: an object with the same id already exists"
                );
            } else {
                let pose = self.current_state().attached_body_global_pose(body);
                {
                    let mut world = self.world_mut();
                    world.add_to_object(&body.id, pose, body.shapes.clone(), body.shape_poses.clone());
                    world.set_subframes_of_object(&body.id, body.subframes.clone());
                }
                if let Some(color) = self.original_object_color(&body.id) {
                    self.set_object_color(&body.id, color);
                }
                debug!(parent: &self.span, object = %body.id, link = %body.link, "Detached object from link and added it back to the world");
            }
            self.current_state_mut().clear_attached_body(&body.id);
        }

        if !bodies.is_empty() || id.is_empty() {
            Ok(())
        } else {
            warn!(parent: &self.span, object = %id, "Attached body not found for removal");
            Err(SceneError::ObjectNotFound(id.to_string()))
        }
    }

    /// Attached body `id` as an `Add` message.
    pub fn attached_collision_object_msg(&self, id: &str) -> Option<AttachedCollisionObject> {
        let mut msg = self.current_state().attached_body(id)?.to_msg();
        if let Some(t) = self.object_type(id) {
            msg.object.object_type = t;
        }
        Some(msg)
    }

    pub fn attached_collision_object_msgs(&self) -> Vec<AttachedCollisionObject> {
        self.current_state()
            .attached_bodies()
            .filter_map(|b| self.attached_collision_object_msg(&b.id))
            .collect()
    }

    /// Subframes of an attached body keyed by name.
    pub fn attached_body_subframes(&self, id: &str) -> Option<BTreeMap<String, Pose>> {
        self.current_state()
            .attached_body(id)
            .map(|b| b.subframes.clone())
    }
}
