//! Back-reference invariant.
//!
//! Entities marked `delete_when_orphaned` must be referenced by at least one
//! owning relationship. The pass runs explicitly: once per migration step,
//! before every save, and as a cascade when an object is deleted.

use crate::catalog::SchemaVersion;
use crate::store::{ObjectGraph, ObjectId, StoredObject};
use std::collections::BTreeSet;
use tracing::debug;

/// Delete every orphaned object, repeating until none remain.
///
/// Returns the removed ids in removal order.
pub fn enforce_back_references(graph: &mut ObjectGraph, schema: &SchemaVersion) -> Vec<ObjectId> {
    let mut removed = Vec::new();
    loop {
        let referenced = referenced_ids(graph, schema);
        let orphans: Vec<ObjectId> = graph
            .iter()
            .filter(|o| deletes_when_orphaned(schema, o) && !referenced.contains(&o.id))
            .map(|o| o.id)
            .collect();
        if orphans.is_empty() {
            break;
        }
        for id in orphans {
            graph.remove(id);
            removed.push(id);
        }
    }

    if !removed.is_empty() {
        debug!(count = removed.len(), "Removed orphaned objects");
    }
    removed
}

/// Delete objects orphaned by the removal of `removed`.
///
/// Only objects `removed` referenced are candidates; the cascade follows
/// objects that become orphaned in turn.
pub fn cascade_orphans(
    graph: &mut ObjectGraph,
    schema: &SchemaVersion,
    removed: &StoredObject,
) -> Vec<ObjectId> {
    let mut pending: Vec<ObjectId> = owned_targets(schema, removed).collect();
    let mut deleted = Vec::new();

    while let Some(candidate) = pending.pop() {
        if !is_orphan(graph, schema, candidate) {
            continue;
        }
        if let Some(object) = graph.remove(candidate) {
            pending.extend(owned_targets(schema, &object));
            deleted.push(candidate);
        }
    }
    deleted
}

/// Check whether `id` is an orphan: deletable when unreferenced, and unreferenced.
pub fn is_orphan(graph: &ObjectGraph, schema: &SchemaVersion, id: ObjectId) -> bool {
    let Some(object) = graph.get(id) else {
        return false;
    };
    if !deletes_when_orphaned(schema, object) {
        return false;
    }
    !graph.iter().any(|owner| {
        schema.get_entity(&owner.entity).is_some_and(|def| {
            def.owning_relationships()
                .any(|rel| owner.related(&rel.name).contains(&id))
        })
    })
}

fn deletes_when_orphaned(schema: &SchemaVersion, object: &StoredObject) -> bool {
    schema
        .get_entity(&object.entity)
        .is_some_and(|def| def.deletes_when_orphaned())
}

fn referenced_ids(graph: &ObjectGraph, schema: &SchemaVersion) -> BTreeSet<ObjectId> {
    let mut referenced = BTreeSet::new();
    for owner in graph.iter() {
        let Some(def) = schema.get_entity(&owner.entity) else {
            continue;
        };
        for rel in def.owning_relationships() {
            referenced.extend(owner.related(&rel.name).iter().copied());
        }
    }
    referenced
}

fn owned_targets<'a>(
    schema: &'a SchemaVersion,
    object: &'a StoredObject,
) -> impl Iterator<Item = ObjectId> + 'a {
    schema
        .get_entity(&object.entity)
        .into_iter()
        .flat_map(|def| def.owning_relationships())
        .flat_map(move |rel| object.related(&rel.name).iter().copied())
}
