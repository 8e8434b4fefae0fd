//! Per-object colors and semantic types.
//!
//! Lookups read the local map first, then each ancestor layer.  Removal is
//! local only.  The first color ever assigned to an id is remembered as its
//! original color and restored when a detached body returns to the world.

use std::collections::BTreeMap;

use planscene_types::{ColorRgba, ObjectColorMsg, ObjectType};
use tracing::error;

use super::{Layer, Scene};

impl Scene {
    /// First hit walking from this scene's layer down the chain.
    fn lookup<T>(&self, find: impl Fn(&Layer) -> Option<T>) -> Option<T> {
        self.layers().find_map(|layer| find(&*layer.borrow()))
    }

    /// Union over the chain, nearer layers winning.
    fn merged<T: Clone>(&self, map: impl Fn(&Layer) -> Option<&BTreeMap<String, T>>) -> BTreeMap<String, T> {
        let mut out = BTreeMap::new();
        for layer in self.layers().rev() {
            if let Some(entries) = map(&*layer.borrow()) {
                out.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        out
    }

    // ── Colors ──────────────────────────────────────────────────────────────

    pub fn has_object_color(&self, id: &str) -> bool {
        self.object_color(id).is_some()
    }

    pub fn object_color(&self, id: &str) -> Option<ColorRgba> {
        self.lookup(|l| l.object_colors.as_ref().and_then(|m| m.get(id).copied()))
    }

    /// First color ever assigned to `id` in this scene or its ancestors.
    pub fn original_object_color(&self, id: &str) -> Option<ColorRgba> {
        self.lookup(|l| l.original_object_colors.get(id).copied())
    }

    pub fn set_object_color(&mut self, id: &str, color: ColorRgba) {
        if id.is_empty() {
            error!(parent: &self.span, "Cannot set color of object with empty id");
            return;
        }
        let first = self.original_object_color(id).is_none();
        let mut layer = self.layer_mut();
        if first {
            layer.original_object_colors.insert(id.to_string(), color);
        }
        layer
            .object_colors
            .get_or_insert_with(BTreeMap::new)
            .insert(id.to_string(), color);
    }

    pub fn remove_object_color(&mut self, id: &str) {
        if let Some(colors) = self.layer_mut().object_colors.as_mut() {
            colors.remove(id);
        }
    }

    /// Every color visible from this scene, local entries winning.
    pub fn known_object_colors(&self) -> BTreeMap<String, ColorRgba> {
        self.merged(|l| l.object_colors.as_ref())
    }

    pub(super) fn known_original_object_colors(&self) -> BTreeMap<String, ColorRgba> {
        self.merged(|l| Some(&l.original_object_colors))
    }

    /// Colors set on this scene itself.
    pub(super) fn local_object_colors(&self) -> Option<BTreeMap<String, ColorRgba>> {
        self.layer().object_colors.clone()
    }

    pub fn object_color_msgs(&self) -> Vec<ObjectColorMsg> {
        self.known_object_colors()
            .into_iter()
            .map(|(id, color)| ObjectColorMsg { id, color })
            .collect()
    }

    // ── Types ───────────────────────────────────────────────────────────────

    pub fn has_object_type(&self, id: &str) -> bool {
        self.object_type(id).is_some()
    }

    pub fn object_type(&self, id: &str) -> Option<ObjectType> {
        self.lookup(|l| l.object_types.as_ref().and_then(|m| m.get(id).cloned()))
    }

    pub fn set_object_type(&mut self, id: &str, object_type: ObjectType) {
        self.layer_mut()
            .object_types
            .get_or_insert_with(BTreeMap::new)
            .insert(id.to_string(), object_type);
    }

    pub fn remove_object_type(&mut self, id: &str) {
        if let Some(types) = self.layer_mut().object_types.as_mut() {
            types.remove(id);
        }
    }

    pub fn known_object_types(&self) -> BTreeMap<String, ObjectType> {
        self.merged(|l| l.object_types.as_ref())
    }

    /// Drop every color and type held by this scene, including original
    /// colors.
    pub(super) fn reset_object_metadata(&mut self) {
        let mut layer = self.layer_mut();
        layer.object_colors = Some(BTreeMap::new());
        layer.object_types = Some(BTreeMap::new());
        layer.original_object_colors.clear();
    }
}
