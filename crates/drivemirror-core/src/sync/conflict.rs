//! Conflict resolution between a remote snapshot and its mirror row

use crate::models::{ConflictStrategy, MirrorRecord, RemoteNode};

use super::detector::ChangeSet;

/// Decide what the mirror row should look like after seeing `remote`.
///
/// Pure: the result depends only on the three arguments. Only remote-owned
/// fields ever change; `local_fields`, `path` and bookkeeping are carried over.
#[must_use]
pub fn resolve(remote: &RemoteNode, mirror: &MirrorRecord, strategy: ConflictStrategy) -> MirrorRecord {
    match strategy {
        ConflictStrategy::Skip => mirror.clone(),
        ConflictStrategy::Overwrite => overwrite(remote, mirror),
        ConflictStrategy::Merge => merge(remote, mirror),
        ConflictStrategy::Newer => {
            let newer = match mirror.remote_modified_at {
                Some(seen) => remote.modified_at > seen,
                None => true,
            };
            if newer {
                overwrite(remote, mirror)
            } else {
                mirror.clone()
            }
        }
    }
}

fn overwrite(remote: &RemoteNode, mirror: &MirrorRecord) -> MirrorRecord {
    MirrorRecord {
        parent_id: remote.parent_id.clone(),
        name: remote.name.clone(),
        kind: remote.kind,
        remote_modified_at: Some(remote.modified_at),
        size_bytes: remote.size_bytes,
        mime_type: remote.mime_type.clone(),
        ..mirror.clone()
    }
}

/// Fill only the fields the mirror has left empty
fn merge(remote: &RemoteNode, mirror: &MirrorRecord) -> MirrorRecord {
    let mut merged = mirror.clone();
    if merged.name.trim().is_empty() {
        merged.name.clone_from(&remote.name);
    }
    if merged.parent_id.is_none() {
        merged.parent_id.clone_from(&remote.parent_id);
    }
    if merged.remote_modified_at.is_none() {
        merged.remote_modified_at = Some(remote.modified_at);
    }
    if merged.size_bytes.is_none() {
        merged.size_bytes = remote.size_bytes;
    }
    if merged.mime_type.is_none() {
        merged.mime_type.clone_from(&remote.mime_type);
    }
    merged
}

/// Change set after conflict resolution, ready for the batch applier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedChangeSet {
    /// Rows for added nodes (path still to be computed)
    pub inserts: Vec<MirrorRecord>,
    /// Modified rows whose remote-owned fields changed
    pub updates: Vec<MirrorRecord>,
    /// Ids of modified entries the strategy left untouched
    pub unchanged: Vec<String>,
}

impl ResolvedChangeSet {
    #[must_use]
    pub fn writes(&self) -> usize {
        self.inserts.len() + self.updates.len()
    }
}

/// Run every modified entry through [`resolve`] and turn additions into rows
#[must_use]
pub fn resolve_change_set(
    change_set: &ChangeSet,
    root_id: &str,
    strategy: ConflictStrategy,
    synced_at: i64,
) -> ResolvedChangeSet {
    let inserts = change_set
        .added
        .iter()
        .map(|node| MirrorRecord::from_remote(node, root_id, synced_at))
        .collect();

    let mut updates = Vec::new();
    let mut unchanged = Vec::new();
    for entry in &change_set.modified {
        let mut resolved = resolve(&entry.remote, &entry.mirror, strategy);
        if resolved.same_remote_fields(&entry.mirror) {
            unchanged.push(entry.mirror.id.clone());
        } else {
            resolved.last_synced_at = synced_at;
            updates.push(resolved);
        }
    }

    ResolvedChangeSet {
        inserts,
        updates,
        unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeKind;
    use crate::sync::detector::ModifiedEntry;
    use pretty_assertions::assert_eq;

    fn remote() -> RemoteNode {
        let mut node = RemoteNode::file("f1", Some("new-parent"), "renamed.pdf", 2_000, 64);
        node.mime_type = Some("application/pdf".to_string());
        node
    }

    fn mirror() -> MirrorRecord {
        let mut record = MirrorRecord::from_remote(
            &RemoteNode::file("f1", Some("old-parent"), "notes.pdf", 1_000, 32),
            "root",
            1_500,
        );
        record.path = "/Old/notes.pdf".to_string();
        record.path_depth = 2;
        record
            .local_fields
            .insert("tags".to_string(), serde_json::json!(["exam"]));
        record
    }

    #[test]
    fn skip_returns_mirror_unchanged() {
        assert_eq!(resolve(&remote(), &mirror(), ConflictStrategy::Skip), mirror());
    }

    #[test]
    fn overwrite_replaces_remote_owned_fields_only() {
        let resolved = resolve(&remote(), &mirror(), ConflictStrategy::Overwrite);
        assert_eq!(resolved.name, "renamed.pdf");
        assert_eq!(resolved.parent_id.as_deref(), Some("new-parent"));
        assert_eq!(resolved.remote_modified_at, Some(2_000));
        assert_eq!(resolved.size_bytes, Some(64));
        assert_eq!(resolved.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(resolved.local_fields, mirror().local_fields);
        assert_eq!(resolved.path, "/Old/notes.pdf");
        assert_eq!(resolved.last_synced_at, 1_500);
    }

    #[test]
    fn merge_fills_only_empty_fields() {
        let mut sparse = mirror();
        sparse.name = "  ".to_string();
        sparse.size_bytes = None;

        let resolved = resolve(&remote(), &sparse, ConflictStrategy::Merge);
        assert_eq!(resolved.name, "renamed.pdf");
        assert_eq!(resolved.size_bytes, Some(64));
        assert_eq!(resolved.mime_type.as_deref(), Some("application/pdf"));
        // Non-empty mirror fields survive
        assert_eq!(resolved.parent_id.as_deref(), Some("old-parent"));
        assert_eq!(resolved.remote_modified_at, Some(1_000));
        assert_eq!(resolved.kind, NodeKind::File);
    }

    #[test]
    fn newer_overwrites_only_when_remote_is_newer() {
        let resolved = resolve(&remote(), &mirror(), ConflictStrategy::Newer);
        assert_eq!(resolved, resolve(&remote(), &mirror(), ConflictStrategy::Overwrite));

        let mut stale = remote();
        stale.modified_at = 1_000;
        assert_eq!(resolve(&stale, &mirror(), ConflictStrategy::Newer), mirror());

        let mut unknown = mirror();
        unknown.remote_modified_at = None;
        assert_eq!(
            resolve(&stale, &unknown, ConflictStrategy::Newer).remote_modified_at,
            Some(1_000)
        );
    }

    #[test]
    fn every_strategy_is_deterministic() {
        let pairs = [
            (remote(), mirror()),
            (RemoteNode::folder("f1", None, "", 0), mirror()),
            (remote(), MirrorRecord::from_remote(&remote(), "root", 0)),
        ];
        for strategy in ConflictStrategy::ALL {
            for (remote, mirror) in &pairs {
                assert_eq!(
                    resolve(remote, mirror, strategy),
                    resolve(remote, mirror, strategy),
                    "strategy {strategy}"
                );
                assert_eq!(
                    resolve(remote, mirror, strategy).local_fields,
                    mirror.local_fields
                );
            }
        }
    }

    #[test]
    fn change_set_resolution_splits_writes_and_unchanged() {
        let mut stale = remote();
        stale.id = "f2".to_string();
        stale.modified_at = 10;
        let mut stale_mirror = mirror();
        stale_mirror.id = "f2".to_string();

        let change_set = ChangeSet {
            added: vec![RemoteNode::file("new", Some("root"), "new.txt", 5, 1)],
            modified: vec![
                ModifiedEntry {
                    remote: remote(),
                    mirror: mirror(),
                },
                ModifiedEntry {
                    remote: stale,
                    mirror: stale_mirror,
                },
            ],
            deleted: Vec::new(),
        };

        let resolved = resolve_change_set(&change_set, "root", ConflictStrategy::Newer, 9_000);
        assert_eq!(resolved.inserts.len(), 1);
        assert_eq!(resolved.inserts[0].root_id, "root");
        assert_eq!(resolved.updates.len(), 1);
        assert_eq!(resolved.updates[0].last_synced_at, 9_000);
        assert_eq!(resolved.unchanged, vec!["f2".to_string()]);
        assert_eq!(resolved.writes(), 2);
    }
}
