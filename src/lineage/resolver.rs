//! # Backup Lineage Resolver
//!
//! Computes which backups must be combined to satisfy a restore request.
//!
//! ## Resolution by backup type
//!
//! - **Full**: the target alone.
//! - **Differential**: the requested parent, then the target.
//! - **Incremental**: the target with its parent chain attached. Parents are
//!   followed until a non-incremental backup is reached, which becomes the
//!   base; every incremental in between is an ancestor, oldest first.
//! - **Continuous**: a point-in-time restore. The restore time must fall in
//!   the continuous backup's window and a base backup is selected whose end
//!   time lies between the window start and the restore time.
//!
//! Every failure that no retry can fix is returned as
//! [`RestoreError::Fatal`]; nothing is mutated before resolution completes.

use super::classifier::{classify, ResolvedLineage};
use super::BackupActionSet;
use crate::constants::{labels, reasons};
use crate::control_plane::ControlPlane;
use crate::error::{RestoreError, Result};
use crate::events::EventRecorder;
use crate::models::{ActionDefinition, Backup, BackupType, RestoreRequest};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct BackupLineageResolver {
    control_plane: Arc<dyn ControlPlane>,
    recorder: Arc<dyn EventRecorder>,
}

impl std::fmt::Debug for BackupLineageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupLineageResolver").finish_non_exhaustive()
    }
}

impl BackupLineageResolver {
    pub fn new(control_plane: Arc<dyn ControlPlane>, recorder: Arc<dyn EventRecorder>) -> Self {
        Self {
            control_plane,
            recorder,
        }
    }

    /// Resolve the request's target backup and classify the result into stages
    #[instrument(skip(self, request), fields(restore = %request.name(), backup = %request.spec.backup.name))]
    pub async fn resolve(&self, request: &RestoreRequest) -> Result<ResolvedLineage> {
        let namespace = if request.spec.backup.namespace.is_empty() {
            request.namespace()
        } else {
            request.spec.backup.namespace.as_str()
        };
        let target = self
            .get_backup_action_set(&request.spec.backup.name, namespace)
            .await?;

        let sets = match target.backup_type() {
            BackupType::Full => vec![target],
            BackupType::Incremental => vec![self.build_incremental(target).await?],
            BackupType::Differential => self.build_differential(target).await?,
            BackupType::Continuous => self.build_continuous(request, target).await?,
        };

        let lineage = classify(sets);
        info!(
            backups = ?lineage.backup_names(),
            prepare_data = lineage.prepare_data.len(),
            post_ready = lineage.post_ready.len(),
            "Backup lineage resolved"
        );
        Ok(lineage)
    }

    /// Fetch a backup and the action definition named by its method descriptor
    pub async fn get_backup_action_set(&self, name: &str, namespace: &str) -> Result<BackupActionSet> {
        let backup = self
            .control_plane
            .get_backup(namespace, name)
            .await
            .map_err(RestoreError::fatal_if_not_found)?;
        let Some(method) = backup.status.backup_method.as_ref() else {
            return Err(RestoreError::fatal(format!(
                "status.backupMethod of backup \"{name}\" is empty"
            )));
        };
        let action_definition = self.get_action_definition(&method.action_set_name).await?;
        Ok(BackupActionSet::new(backup, action_definition))
    }

    async fn get_action_definition(&self, name: &str) -> Result<Option<ActionDefinition>> {
        if name.is_empty() {
            return Ok(None);
        }
        self.control_plane
            .get_action_definition(name)
            .await
            .map(Some)
            .map_err(RestoreError::fatal_if_not_found)
    }

    /// Attach the parent chain of an incremental backup
    pub async fn build_incremental(&self, mut source: BackupActionSet) -> Result<BackupActionSet> {
        let namespace = source.backup.namespace().to_string();
        let mut visited: HashSet<String> = HashSet::new();
        let mut child = source.clone();

        while child.backup_type() == BackupType::Incremental {
            visited.insert(child.backup_name().to_string());

            let parent_name = child.backup.parent_backup_name().unwrap_or_default().to_string();
            let parent = self
                .get_backup_action_set(&parent_name, &namespace)
                .await
                .map_err(|e| {
                    if e.is_fatal() {
                        RestoreError::fatal(format!(
                            "fails to get parent backup \"{parent_name}\" of incremental backup \"{}\": {e}",
                            child.backup_name()
                        ))
                    } else {
                        e
                    }
                })?;

            if visited.contains(parent.backup_name()) {
                return Err(RestoreError::fatal(format!(
                    "backup \"{}\" relies on child backup \"{}\"",
                    child.backup_name(),
                    parent.backup_name()
                )));
            }
            validate_parent(&parent.backup, &child.backup)?;

            debug!(child = %child.backup_name(), parent = %parent.backup_name(), "Following incremental parent");
            if parent.backup_type() == BackupType::Incremental {
                source.ancestor_incremental_backups.insert(0, parent.backup.clone());
            } else {
                source.base_backup = Some(parent.backup.clone());
            }
            child = parent;
        }
        Ok(source)
    }

    /// A differential backup restores on top of its parent
    pub async fn build_differential(&self, source: BackupActionSet) -> Result<Vec<BackupActionSet>> {
        let Some(parent_name) = source.backup.spec.parent_backup_name.clone().filter(|p| !p.is_empty()) else {
            return Err(RestoreError::fatal(format!(
                "differential backup \"{}\" has no parent backup",
                source.backup_name()
            )));
        };
        let parent = self
            .get_backup_action_set(&parent_name, source.backup.namespace())
            .await?;
        Ok(vec![parent, source])
    }

    /// Resolve a point-in-time restore from a continuous backup
    pub async fn build_continuous(
        &self,
        request: &RestoreRequest,
        mut continuous: BackupActionSet,
    ) -> Result<Vec<BackupActionSet>> {
        let restore_time = check_restore_time(request, &continuous.backup)?;

        let definition = continuous.action_definition.as_ref();
        if definition.is_some_and(|d| !d.base_backup_required()) {
            debug!(backup = %continuous.backup_name(), "Continuous restore without base backup");
            return Ok(vec![continuous]);
        }
        let skip_base = definition.is_some_and(ActionDefinition::skip_base_backup_restore_in_pitr);

        let base = self
            .base_backup_for_continuous(&continuous.backup, restore_time)
            .await?;
        continuous.base_backup = Some(base.backup.clone());

        if base.backup_type() == BackupType::Incremental {
            if skip_base {
                return Err(RestoreError::fatal(
                    "unify incremental and continuous restore job is not supported",
                ));
            }
            let base = self.build_incremental(base).await?;
            return Ok(vec![base, continuous]);
        }

        if skip_base {
            let subject = request.object_ref();
            self.recorder.normal(
                &subject,
                reasons::SKIP_BASE_BACKUP_RESTORE_IN_PITR,
                "base backup restore skipped",
            );
            return Ok(vec![continuous]);
        }
        Ok(vec![base, continuous])
    }

    /// Latest completed full or incremental backup usable as the base of a
    /// continuous restore at `restore_time`
    pub async fn base_backup_for_continuous(
        &self,
        continuous: &Backup,
        restore_time: DateTime<Utc>,
    ) -> Result<BackupActionSet> {
        let not_found = || {
            RestoreError::fatal(format!(
                "can not found latest full or incremental backup based on backupPolicy \"{}\" and specified restoreTime \"{}\"",
                continuous.spec.backup_policy_name,
                restore_time.to_rfc3339()
            ))
        };
        let Some(window_start) = continuous.start_time() else {
            return Err(not_found());
        };

        let mut candidates = self
            .list_completed_backups(continuous, BackupType::Full)
            .await?;
        candidates.extend(
            self.list_completed_backups(continuous, BackupType::Incremental)
                .await?,
        );
        sort_by_end_time_desc(&mut candidates);

        let latest = candidates
            .into_iter()
            .find(|b| b.end_time().is_some_and(|end| end <= restore_time && end >= window_start))
            .ok_or_else(not_found)?;

        let definition_name = latest
            .status
            .backup_method
            .as_ref()
            .map(|m| m.action_set_name.clone())
            .unwrap_or_default();
        let definition = self.get_action_definition(&definition_name).await?;
        debug!(base = %latest.name(), "Selected base backup for continuous restore");
        Ok(BackupActionSet::new(latest, definition))
    }

    async fn list_completed_backups(&self, continuous: &Backup, backup_type: BackupType) -> Result<Vec<Backup>> {
        let selector = scope_labels(continuous, backup_type);
        let backups = self
            .control_plane
            .list_backups(continuous.namespace(), &selector)
            .await?;
        Ok(backups.into_iter().filter(Backup::is_completed).collect())
    }
}

/// Labels selecting backups of `backup_type` taken from the same workload
fn scope_labels(continuous: &Backup, backup_type: BackupType) -> BTreeMap<String, String> {
    let mut selector = BTreeMap::from([(labels::BACKUP_TYPE.to_string(), backup_type.to_string())]);
    for key in [labels::CLUSTER_UID, labels::APP_INSTANCE, labels::APP_COMPONENT] {
        if let Some(value) = continuous.metadata.label(key) {
            selector.insert(key.to_string(), value.to_string());
        }
    }
    if selector.len() == 1 {
        selector.insert(
            labels::BACKUP_POLICY.to_string(),
            continuous.spec.backup_policy_name.clone(),
        );
    }
    selector
}

/// Newest end time first; backups without an end time last; ties by name
fn sort_by_end_time_desc(backups: &mut [Backup]) {
    backups.sort_by(|a, b| {
        (Reverse(a.end_time()), a.name()).cmp(&(Reverse(b.end_time()), b.name()))
    });
}

fn check_restore_time(request: &RestoreRequest, continuous: &Backup) -> Result<DateTime<Utc>> {
    let (Some(start), Some(end)) = (continuous.start_time(), continuous.end_time()) else {
        return Err(RestoreError::fatal(format!(
            "startTimeStamp or completeTimeStamp of backup \"{}\" is empty",
            continuous.name()
        )));
    };
    match request.restore_time() {
        Some(t) if t >= start && t <= end => Ok(t),
        _ => Err(RestoreError::fatal(format!(
            "restore time out of the range for backup \"{}\"",
            continuous.name()
        ))),
    }
}

/// A parent must be completed and must not start after its child
fn validate_parent(parent: &Backup, child: &Backup) -> Result<()> {
    if !parent.is_completed() {
        return Err(RestoreError::fatal(format!(
            "parent backup \"{}\" of backup \"{}\" is not completed",
            parent.name(),
            child.name()
        )));
    }
    if let (Some(parent_start), Some(child_start)) = (parent.start_time(), child.start_time()) {
        if parent_start > child_start {
            return Err(RestoreError::fatal(format!(
                "parent backup \"{}\" starts after child backup \"{}\"",
                parent.name(),
                child.name()
            )));
        }
    }
    Ok(())
}
