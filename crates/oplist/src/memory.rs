#![forbid(unsafe_code)]

//! In-memory schema model.
//!
//! [`MemoryModel`] is a small, self-contained implementation of
//! [`ObjectModel`] over [`SchemaObject`]s: a flat arena of objects plus the
//! ordering of top-level objects and of each parent's children. It is what
//! the crate's tests drive the operation list against, and a worked example
//! for hosts wiring their own model.
//!
//! Objects that still own children cannot be removed; remove the children
//! first (usually inside one operation chain).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::object::{ModelError, ModelObject, ObjectId, ObjectModel, ObjectType, Placement};

/// A schema object with free-form attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaObject {
    id: ObjectId,
    name: String,
    object_type: ObjectType,
    comment: String,
    attributes: BTreeMap<String, String>,
    /// References columns injected by a relationship.
    injected: bool,
}

impl SchemaObject {
    #[must_use]
    pub fn new(id: ObjectId, name: impl Into<String>, object_type: ObjectType) -> Self {
        Self {
            id,
            name: name.into(),
            object_type,
            comment: String::new(),
            attributes: BTreeMap::new(),
            injected: false,
        }
    }

    /// Mark the object as depending on relationship-injected columns.
    #[must_use]
    pub fn injected(mut self) -> Self {
        self.injected = true;
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn is_injected(&self) -> bool {
        self.injected
    }
}

impl ModelObject for SchemaObject {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn object_type(&self) -> ObjectType {
        self.object_type
    }

    fn dependent_definition(&self) -> Option<String> {
        let dependent = matches!(
            self.object_type,
            ObjectType::Trigger | ObjectType::Index | ObjectType::Sequence | ObjectType::Constraint
        );
        if !(dependent && self.injected) {
            return None;
        }
        serde_json::to_string(self).ok()
    }
}

/// Ordered in-memory model of schema objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryModel {
    objects: BTreeMap<ObjectId, SchemaObject>,
    roots: Vec<ObjectId>,
    children: BTreeMap<ObjectId, Vec<ObjectId>>,
    parents: BTreeMap<ObjectId, ObjectId>,
}

impl MemoryModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects in the model.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Top-level objects in order.
    #[must_use]
    pub fn roots(&self) -> &[ObjectId] {
        &self.roots
    }

    /// Children of `parent` in order.
    #[must_use]
    pub fn children(&self, parent: ObjectId) -> &[ObjectId] {
        self.children.get(&parent).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn parent_of(&self, id: ObjectId) -> Option<ObjectId> {
        self.parents.get(&id).copied()
    }

    fn sequence_mut(&mut self, parent: Option<ObjectId>) -> &mut Vec<ObjectId> {
        match parent {
            Some(parent) => self.children.entry(parent).or_default(),
            None => &mut self.roots,
        }
    }
}

impl ObjectModel for MemoryModel {
    type Object = SchemaObject;

    fn object(&self, id: ObjectId) -> Option<&SchemaObject> {
        self.objects.get(&id)
    }

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut SchemaObject> {
        self.objects.get_mut(&id)
    }

    fn object_index(&self, id: ObjectId, parent: Option<ObjectId>) -> Option<usize> {
        let sequence = match parent {
            Some(parent) => self.children(parent),
            None => &self.roots,
        };
        sequence.iter().position(|candidate| *candidate == id)
    }

    fn insert_object(&mut self, object: SchemaObject, placement: Placement) -> Result<(), ModelError> {
        let id = object.id();
        if self.objects.contains_key(&id) {
            return Err(ModelError::Duplicate(id));
        }
        if let Some(parent) = placement.parent
            && !self.objects.contains_key(&parent)
        {
            return Err(ModelError::ParentNotFound(parent));
        }
        if placement.parent.is_none() && object.object_type().is_table_object() {
            return Err(ModelError::MissingParent(id));
        }

        let len = match placement.parent {
            Some(parent) => self.children(parent).len(),
            None => self.roots.len(),
        };
        let index = placement.index.unwrap_or(len);
        if index > len {
            return Err(ModelError::IndexOutOfBounds { index, len });
        }
        self.sequence_mut(placement.parent).insert(index, id);

        if let Some(parent) = placement.parent {
            self.parents.insert(id, parent);
        }
        self.objects.insert(id, object);
        Ok(())
    }

    fn remove_object(
        &mut self,
        id: ObjectId,
        parent: Option<ObjectId>,
    ) -> Result<SchemaObject, ModelError> {
        if !self.objects.contains_key(&id) {
            return Err(ModelError::NotFound(id));
        }
        if !self.children(id).is_empty() {
            return Err(ModelError::HasChildren(id));
        }
        let position = self
            .object_index(id, parent)
            .ok_or(ModelError::NotFound(id))?;

        match parent {
            Some(parent) => {
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.remove(position);
                    if siblings.is_empty() {
                        self.children.remove(&parent);
                    }
                }
                self.parents.remove(&id);
            }
            None => {
                self.roots.remove(position);
            }
        }
        self.objects.remove(&id).ok_or(ModelError::NotFound(id))
    }

    fn regenerate_object(
        &mut self,
        definition: &str,
        snapshot: &SchemaObject,
    ) -> Result<SchemaObject, ModelError> {
        let object: SchemaObject = serde_json::from_str(definition)
            .map_err(|err| ModelError::InvalidDefinition(err.to_string()))?;
        if object.id() != snapshot.id() {
            return Err(ModelError::InvalidDefinition(format!(
                "definition describes {} but snapshot is {}",
                object.id(),
                snapshot.id()
            )));
        }
        Ok(object)
    }
}
