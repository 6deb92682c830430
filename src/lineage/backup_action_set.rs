use crate::models::{ActionDefinition, Backup, BackupType};
use serde::Serialize;

/// One backup paired with the action definition that restores it.
///
/// Incremental and continuous backups cannot be restored on their own; the
/// resolver attaches the backups they depend on: `base_backup` is the
/// non-incremental root and `ancestor_incremental_backups` are the
/// incrementals between it and `backup`, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupActionSet {
    pub backup: Backup,
    /// Absent for snapshot-only backup methods
    pub action_definition: Option<ActionDefinition>,
    pub base_backup: Option<Backup>,
    pub ancestor_incremental_backups: Vec<Backup>,
    pub use_volume_snapshot: bool,
}

impl BackupActionSet {
    pub fn new(backup: Backup, action_definition: Option<ActionDefinition>) -> Self {
        let use_volume_snapshot = backup.uses_volume_snapshot();
        Self {
            backup,
            action_definition,
            base_backup: None,
            ancestor_incremental_backups: Vec::new(),
            use_volume_snapshot,
        }
    }

    pub fn backup_name(&self) -> &str {
        self.backup.name()
    }

    /// Declared by the action definition; backups without one restore as full
    pub fn backup_type(&self) -> BackupType {
        self.action_definition
            .as_ref()
            .map(ActionDefinition::backup_type)
            .unwrap_or_default()
    }

    pub fn has_prepare_data_stage(&self) -> bool {
        self.action_definition
            .as_ref()
            .is_some_and(ActionDefinition::has_prepare_data_stage)
    }

    pub fn has_post_ready_stage(&self) -> bool {
        self.action_definition
            .as_ref()
            .is_some_and(ActionDefinition::has_post_ready_stage)
    }

    /// Backups in restore order: base, ancestors oldest first, then this backup
    pub fn lineage(&self) -> Vec<&Backup> {
        self.base_backup
            .iter()
            .chain(self.ancestor_incremental_backups.iter())
            .chain(std::iter::once(&self.backup))
            .collect()
    }

    pub fn ancestor_names(&self) -> Vec<&str> {
        self.ancestor_incremental_backups
            .iter()
            .map(Backup::name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectMeta;

    fn backup(name: &str) -> Backup {
        Backup {
            metadata: ObjectMeta::named("ns", name),
            ..Default::default()
        }
    }

    #[test]
    fn test_lineage_order() {
        let mut set = BackupActionSet::new(backup("i2"), None);
        set.base_backup = Some(backup("f"));
        set.ancestor_incremental_backups = vec![backup("i1")];
        let names: Vec<&str> = set.lineage().into_iter().map(Backup::name).collect();
        assert_eq!(names, vec!["f", "i1", "i2"]);
        assert_eq!(set.ancestor_names(), vec!["i1"]);
    }

    #[test]
    fn test_missing_definition_defaults() {
        let set = BackupActionSet::new(backup("b"), None);
        assert_eq!(set.backup_type(), BackupType::Full);
        assert!(!set.has_prepare_data_stage());
        assert!(!set.has_post_ready_stage());
    }
}
