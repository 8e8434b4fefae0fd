//! Collision queries against the scene's environments.

use std::borrow::Cow;
use std::collections::BTreeMap;

use planscene_collision::{AllowedCollisionMatrix, BodyType, CollisionRequest, CollisionResult, Contact};
use planscene_robot::RobotState;

use super::Scene;

/// Refresh stale link transforms on a private copy.
fn updated(state: &RobotState) -> Cow<'_, RobotState> {
    if state.dirty() {
        let mut fresh = state.clone();
        fresh.update();
        Cow::Owned(fresh)
    } else {
        Cow::Borrowed(state)
    }
}

impl Scene {
    /// Full check of the current state with the scene's matrix.
    pub fn check_collision(&self, req: &CollisionRequest, res: &mut CollisionResult) {
        self.check_collision_with(req, res, &self.current_state(), &self.allowed_collision_matrix());
    }

    pub fn check_collision_state(&self, req: &CollisionRequest, res: &mut CollisionResult, state: &RobotState) {
        self.check_collision_with(req, res, state, &self.allowed_collision_matrix());
    }

    /// Robot against the world, then, unless the answer is already settled,
    /// robot against itself.
    pub fn check_collision_with(
        &self,
        req: &CollisionRequest,
        res: &mut CollisionResult,
        state: &RobotState,
        acm: &AllowedCollisionMatrix,
    ) {
        let state = updated(state);
        {
            let layer = self.layer();
            let world_env = if req.pad_environment_collisions {
                &layer.detector.env
            } else {
                &layer.detector.env_unpadded
            };
            world_env.check_robot_collision(req, res, &state, &layer.world, Some(acm));
        }

        if res.collision && (!req.contacts || res.contact_count >= req.max_contacts) {
            return;
        }
        self.self_check(req, res, &state, acm);
    }

    /// As [`Scene::check_collision`] with environment padding disabled.
    pub fn check_collision_unpadded(&self, req: &CollisionRequest, res: &mut CollisionResult) {
        self.check_collision_unpadded_with(req, res, &self.current_state(), &self.allowed_collision_matrix());
    }

    pub fn check_collision_unpadded_with(
        &self,
        req: &CollisionRequest,
        res: &mut CollisionResult,
        state: &RobotState,
        acm: &AllowedCollisionMatrix,
    ) {
        let req = CollisionRequest {
            pad_environment_collisions: false,
            ..req.clone()
        };
        self.check_collision_with(&req, res, state, acm);
    }

    pub fn check_self_collision(&self, req: &CollisionRequest, res: &mut CollisionResult) {
        self.check_self_collision_with(req, res, &self.current_state(), &self.allowed_collision_matrix());
    }

    pub fn check_self_collision_with(
        &self,
        req: &CollisionRequest,
        res: &mut CollisionResult,
        state: &RobotState,
        acm: &AllowedCollisionMatrix,
    ) {
        let state = updated(state);
        self.self_check(req, res, &state, acm);
    }

    /// Self check on the unpadded environment regardless of the request's
    /// padding flags.
    pub fn check_self_collision_unpadded(&self, req: &CollisionRequest, res: &mut CollisionResult) {
        let req = CollisionRequest {
            pad_environment_collisions: false,
            pad_self_collisions: false,
            ..req.clone()
        };
        self.check_self_collision(&req, res);
    }

    fn self_check(&self, req: &CollisionRequest, res: &mut CollisionResult, state: &RobotState, acm: &AllowedCollisionMatrix) {
        let layer = self.layer();
        let env = if req.pad_self_collisions {
            &layer.detector.env
        } else {
            &layer.detector.env_unpadded
        };
        env.check_self_collision(req, res, state, Some(acm));
    }

    // ── Derived queries ─────────────────────────────────────────────────────

    /// Contacts of the current state, keyed by body pair.
    pub fn colliding_pairs(&self) -> BTreeMap<(String, String), Vec<Contact>> {
        self.colliding_pairs_with(&self.current_state(), &self.allowed_collision_matrix(), "")
    }

    /// One contact per colliding pair, with enough room for every link.
    pub fn colliding_pairs_with(
        &self,
        state: &RobotState,
        acm: &AllowedCollisionMatrix,
        group: &str,
    ) -> BTreeMap<(String, String), Vec<Contact>> {
        let req = CollisionRequest {
            group_name: group.to_string(),
            contacts: true,
            max_contacts: self.robot_model.links_with_collision_geometry().len() + 1,
            max_contacts_per_pair: 1,
            ..CollisionRequest::default()
        };
        let mut res = CollisionResult::default();
        self.check_collision_with(&req, &mut res, state, acm);
        res.contacts
    }

    /// Names of robot links in contact in the current state.
    pub fn colliding_links(&self) -> Vec<String> {
        self.colliding_links_with(&self.current_state(), &self.allowed_collision_matrix(), "")
    }

    pub fn colliding_links_with(&self, state: &RobotState, acm: &AllowedCollisionMatrix, group: &str) -> Vec<String> {
        let mut links = Vec::new();
        for contact in self.colliding_pairs_with(state, acm, group).values().flatten() {
            for (name, kind) in [
                (&contact.body_name_1, contact.body_type_1),
                (&contact.body_name_2, contact.body_type_2),
            ] {
                if kind == BodyType::RobotLink && !links.contains(name) {
                    links.push(name.clone());
                }
            }
        }
        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planscene_geometry::Shape;
    use planscene_robot::model::{Joint, RobotModelBuilder};
    use planscene_types::Pose;
    use std::sync::Arc;

    fn scene() -> Scene {
        let model = RobotModelBuilder::new("bot", "base")
            .collision("base", Shape::Sphere { radius: 0.2 }, Pose::identity())
            .link(
                "slider",
                "base",
                Joint::prismatic("rail", [1.0, 0.0, 0.0]).with_limits(-2.0, 2.0),
            )
            .collision("slider", Shape::Box { size: [0.2; 3] }, Pose::identity())
            .build()
            .unwrap();
        let mut s = Scene::new(Arc::new(model));
        s.current_state_mut().set_variable_position("rail", 1.0);
        s
    }

    fn obstacle(s: &mut Scene, id: &str, x: f64) {
        s.world_mut().add_to_object(
            id,
            Pose::translation(x, 0.0, 0.0),
            vec![Arc::new(Shape::Box { size: [0.2; 3] })],
            vec![Pose::identity()],
        );
    }

    // ── Dispatch ────────────────────────────────────────────────────────────

    #[test]
    fn free_state_is_clear() {
        let s = scene();
        let mut res = CollisionResult::default();
        s.check_collision(&CollisionRequest::default(), &mut res);
        assert!(!res.collision);
    }

    #[test]
    fn world_contact_found() {
        let mut s = scene();
        obstacle(&mut s, "box1", 1.1);
        let mut res = CollisionResult::default();
        s.check_collision(&CollisionRequest::default(), &mut res);
        assert!(res.collision);
    }

    #[test]
    fn padding_only_applies_to_padded_checks() {
        let mut s = scene();
        obstacle(&mut s, "box1", 1.25);
        let mut res = CollisionResult::default();
        s.check_collision(&CollisionRequest::default(), &mut res);
        assert!(!res.collision);

        s.collision_env_mut().set_link_padding("slider", 0.1);
        let mut res = CollisionResult::default();
        s.check_collision(&CollisionRequest::default(), &mut res);
        assert!(res.collision);

        let mut res = CollisionResult::default();
        s.check_collision_unpadded(&CollisionRequest::default(), &mut res);
        assert!(!res.collision);
    }

    #[test]
    fn acm_suppresses_world_contact() {
        let mut s = scene();
        obstacle(&mut s, "box1", 1.1);
        s.allowed_collision_matrix_mut().set_entry("slider", "box1", true);
        let mut res = CollisionResult::default();
        s.check_collision(&CollisionRequest::default(), &mut res);
        assert!(!res.collision);
    }

    #[test]
    fn stale_state_is_refreshed() {
        let mut s = scene();
        obstacle(&mut s, "box1", -1.0);
        let mut state = s.current_state().clone();
        state.set_variable_position("rail", -1.0);
        assert!(state.dirty());
        let mut res = CollisionResult::default();
        s.check_collision_state(&CollisionRequest::default(), &mut res, &state);
        assert!(res.collision);
    }

    #[test]
    fn self_collision_honours_acm() {
        let mut s = scene();
        s.current_state_mut().set_variable_position("rail", 0.1);
        let mut res = CollisionResult::default();
        s.check_self_collision(&CollisionRequest::default(), &mut res);
        // Parent and child links are disabled pairs by default.
        assert!(!res.collision);

        s.allowed_collision_matrix_mut().set_entry("base", "slider", false);
        let mut res = CollisionResult::default();
        s.check_self_collision_unpadded(&CollisionRequest::default(), &mut res);
        assert!(res.collision);
    }

    #[test]
    fn self_padding_follows_request_flag() {
        let mut s = scene();
        s.current_state_mut().set_variable_position("rail", 0.35);
        s.allowed_collision_matrix_mut().set_entry("base", "slider", false);
        s.collision_env_mut().set_link_padding("slider", 0.1);

        let mut res = CollisionResult::default();
        s.check_self_collision(&CollisionRequest::default(), &mut res);
        assert!(!res.collision);

        let req = CollisionRequest {
            pad_self_collisions: true,
            ..CollisionRequest::default()
        };
        let mut res = CollisionResult::default();
        s.check_self_collision(&req, &mut res);
        assert!(res.collision);

        let mut res = CollisionResult::default();
        s.check_self_collision_unpadded(&req, &mut res);
        assert!(!res.collision);
    }

    #[test]
    fn settled_world_result_skips_self_check() {
        let mut s = scene();
        s.current_state_mut().set_variable_position("rail", 0.25);
        s.allowed_collision_matrix_mut().set_entry("base", "slider", false);
        obstacle(&mut s, "box1", 0.4);
        let world_pair = ("box1".to_string(), "slider".to_string());
        let self_pair = ("base".to_string(), "slider".to_string());

        let req = CollisionRequest {
            contacts: true,
            max_contacts: 1,
            ..CollisionRequest::default()
        };
        let mut res = CollisionResult::default();
        s.check_collision(&req, &mut res);
        assert!(res.collision);
        assert_eq!(res.contact_count, 1);
        assert!(res.contacts.contains_key(&world_pair));
        assert!(!res.contacts.contains_key(&self_pair));

        // With room for another contact the self check runs.
        let req = CollisionRequest { max_contacts: 2, ..req };
        let mut res = CollisionResult::default();
        s.check_collision(&req, &mut res);
        assert_eq!(res.contact_count, 2);
        assert!(res.contacts.contains_key(&self_pair));
    }

    // ── Derived queries ─────────────────────────────────────────────────────

    #[test]
    fn colliding_pairs_and_links() {
        let mut s = scene();
        obstacle(&mut s, "box1", 1.1);
        obstacle(&mut s, "box2", 0.1);

        let pairs = s.colliding_pairs();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.values().all(|c| c.len() == 1));

        let mut links = s.colliding_links();
        links.sort();
        assert_eq!(links, ["base", "slider"]);
    }
}
