//! Source pod selection for targets backed up with the `All` strategy.
//!
//! When every pod of a target was backed up separately, each restore index
//! must pick which pod's backup it restores from.

use crate::error::{RestoreError, Result};
use crate::models::{BackupStatusTarget, DataRestorePolicy, PodSelectionStrategy, RequiredPolicyForAllPodSelection};

/// Source pod whose backup restore index `index` reads.
///
/// Returns an empty name when no particular pod applies: the target used the
/// `Any` strategy, recorded no pods, or has fewer pods than `index`.
pub fn source_pod_name(
    target: Option<&BackupStatusTarget>,
    policy: Option<&RequiredPolicyForAllPodSelection>,
    index: usize,
) -> Result<String> {
    let Some(target) = target.filter(|t| t.pod_selector.strategy == PodSelectionStrategy::All) else {
        return Ok(String::new());
    };
    if target.selected_target_pods.is_empty() {
        return Ok(String::new());
    }
    let Some(policy) = policy else {
        return Err(RestoreError::fatal(
            "requiredPolicyForAllPodSelection can not be empty when the pod selection strategy of the source target is All",
        ));
    };

    match policy.data_restore_policy {
        DataRestorePolicy::OneToMany => {
            let Some(source) = policy.source_of_one_to_many.as_ref() else {
                return Err(RestoreError::fatal(
                    "sourceOfOneToMany can not be empty when the data restore policy is OneToMany",
                ));
            };
            target
                .selected_target_pods
                .iter()
                .find(|p| **p == source.target_pod_name)
                .cloned()
                .ok_or_else(|| {
                    RestoreError::fatal(format!(
                        "can not found the source target pod \"{}\" in the selected pods of the backup",
                        source.target_pod_name
                    ))
                })
        }
        DataRestorePolicy::OneToOne => {
            let mut pods = target.selected_target_pods.clone();
            pods.sort();
            Ok(pods.into_iter().nth(index).unwrap_or_default())
        }
    }
}

/// Whether index `index` has nothing to restore: `All` strategy but no source pod
pub fn skip_index(target: Option<&BackupStatusTarget>, source_pod: &str) -> bool {
    source_pod.is_empty() && target.is_some_and(|t| t.pod_selector.strategy == PodSelectionStrategy::All)
}
