//! Chunk-level differences between two versions of the same source.
//!
//! Chunks are matched by `(kind, name)`. Output order follows the new
//! version for additions and modifications, then the old version for
//! removals. When a version declares the same `(kind, name)` twice, only
//! the first occurrence takes part in matching.

use std::collections::{HashMap, HashSet};

use crate::models::{ChangeType, ChunkKind, CodeChunk, CodeDifference};

/// Compare two chunk sequences.
///
/// Chunks present in both with identical content produce nothing.
pub fn compute_differences(old: &[CodeChunk], new: &[CodeChunk]) -> Vec<CodeDifference> {
    let old_by_key: HashMap<(ChunkKind, &str), &CodeChunk> = first_by_identity(old);
    let new_by_key: HashMap<(ChunkKind, &str), &CodeChunk> = first_by_identity(new);

    let mut diffs = Vec::new();
    let mut emitted = HashSet::new();

    for chunk in new {
        let key = chunk.identity();
        if !emitted.insert(key) {
            continue;
        }
        match old_by_key.get(&key) {
            None => diffs.push(CodeDifference {
                change_type: ChangeType::Added,
                chunk_kind: chunk.kind,
                chunk_name: chunk.name.clone(),
                old_content: String::new(),
                new_content: chunk.content.clone(),
            }),
            Some(previous) if previous.content != chunk.content => {
                diffs.push(CodeDifference {
                    change_type: ChangeType::Modified,
                    chunk_kind: chunk.kind,
                    chunk_name: chunk.name.clone(),
                    old_content: previous.content.clone(),
                    new_content: chunk.content.clone(),
                })
            }
            Some(_) => {}
        }
    }

    let mut removed = HashSet::new();
    for chunk in old {
        let key = chunk.identity();
        if new_by_key.contains_key(&key) || !removed.insert(key) {
            continue;
        }
        diffs.push(CodeDifference {
            change_type: ChangeType::Removed,
            chunk_kind: chunk.kind,
            chunk_name: chunk.name.clone(),
            old_content: chunk.content.clone(),
            new_content: String::new(),
        });
    }

    diffs
}

fn first_by_identity(chunks: &[CodeChunk]) -> HashMap<(ChunkKind, &str), &CodeChunk> {
    let mut map = HashMap::new();
    for chunk in chunks {
        map.entry(chunk.identity()).or_insert(chunk);
    }
    map
}
