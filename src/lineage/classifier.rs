//! Stage classification of resolved backup sets.

use super::BackupActionSet;
use serde::Serialize;
use tracing::debug;

/// Resolved backup sets, in restore order, and their stage buckets
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLineage {
    pub sets: Vec<BackupActionSet>,
    pub prepare_data: Vec<BackupActionSet>,
    pub post_ready: Vec<BackupActionSet>,
}

impl ResolvedLineage {
    pub fn backup_names(&self) -> Vec<&str> {
        self.sets.iter().map(BackupActionSet::backup_name).collect()
    }
}

/// Route each set into the prepare-data and/or post-ready bucket.
///
/// Volume-snapshot sets restore by creating claims from snapshots and go to
/// prepare-data only. Other sets follow their action definition's declared
/// stages; sets without a restore stage are left out of both buckets.
pub fn classify(sets: Vec<BackupActionSet>) -> ResolvedLineage {
    let mut prepare_data = Vec::new();
    let mut post_ready = Vec::new();

    for set in &sets {
        if set.use_volume_snapshot {
            prepare_data.push(set.clone());
            continue;
        }
        let (prepare, post) = (set.has_prepare_data_stage(), set.has_post_ready_stage());
        if prepare {
            prepare_data.push(set.clone());
        }
        if post {
            post_ready.push(set.clone());
        }
        if !prepare && !post {
            debug!(backup = %set.backup_name(), "Backup declares no restore stage, skipping");
        }
    }

    ResolvedLineage {
        sets,
        prepare_data,
        post_ready,
    }
}
