//! Volumes attached to restore tasks: restore claims, the backup repository
//! and the backup extras.

use crate::constants::{annotations, env as vars, volumes};
use crate::error::{RestoreError, Result};
use crate::lineage::BackupActionSet;
use crate::models::{BackupRepo, EnvVar, Volume, VolumeConfig, VolumeMount};

/// Claim volume and its mount for a restore target claim.
///
/// The mount path is the configured one, else the path the volume source was
/// mounted at during backup. Snapshot-only sets without a prepare-data stage
/// need no mount and yield `None`; any other missing path is fatal.
pub fn claim_volume(
    set: &BackupActionSet,
    config: &VolumeConfig,
    claim_name: &str,
    identifier: &str,
) -> Result<Option<(Volume, VolumeMount)>> {
    let volume_name = format!("{identifier}-{claim_name}");
    let volume = Volume::claim(&volume_name, claim_name);

    if let Some(path) = config.mount_path.as_deref().filter(|p| !p.is_empty()) {
        return Ok(Some((volume, VolumeMount::new(volume_name, path))));
    }
    let source = config.volume_source.as_deref().unwrap_or_default();
    if let Some(path) = set.backup.mount_path_for_volume_source(source) {
        return Ok(Some((volume, VolumeMount::new(volume_name, path))));
    }
    if set.use_volume_snapshot && !set.has_prepare_data_stage() {
        return Ok(None);
    }
    Err(RestoreError::fatal(format!(
        "unable to find the mountPath corresponding to volumeSource \"{source}\" from status.backupMethod.targetVolumes.volumeMounts of backup \"{}\"",
        set.backup_name()
    )))
}

/// Repository attachment of a task: the data claim to mount, if any, and the
/// repo env
#[derive(Debug, Clone, PartialEq)]
pub struct RepoAttachment {
    pub claim: Option<(Volume, VolumeMount)>,
    pub env: Vec<EnvVar>,
}

/// Mount the repository's claim, or the backup's legacy claim when the backup
/// predates repositories.
///
/// A repository without a claim (object storage reached by the restore tool
/// itself) only contributes its name and storage provider to the env.
pub fn backup_repo_attachment(set: &BackupActionSet, repo: Option<&BackupRepo>) -> Option<RepoAttachment> {
    let (claim, env) = match repo {
        Some(repo) => {
            let mut env = vec![EnvVar::new(vars::DP_BACKUP_REPO_NAME, &repo.metadata.name)];
            if let Some(provider) = repo.spec.storage_provider.as_deref().filter(|p| !p.is_empty()) {
                env.push(EnvVar::new(vars::DP_STORAGE_PROVIDER, provider));
            }
            (repo.spec.volume_claim.clone(), env)
        }
        None => (set.backup.status.persistent_volume_claim_name.clone(), Vec::new()),
    };
    let claim = claim.filter(|c| !c.is_empty()).map(|claim| {
        (
            Volume::claim(volumes::BACKUP_REPO_VOLUME, claim),
            VolumeMount::new(volumes::BACKUP_REPO_VOLUME, volumes::BACKUP_REPO_MOUNT_PATH),
        )
    });
    if claim.is_none() && env.is_empty() {
        return None;
    }
    Some(RepoAttachment { claim, env })
}

/// Backup extras serialized into a pod annotation and surfaced as a file
#[derive(Debug, Clone, PartialEq)]
pub struct ExtrasAttachment {
    pub annotation: (String, String),
    pub volume: Volume,
    pub mount: VolumeMount,
}

pub fn extras_attachment(set: &BackupActionSet) -> Result<Option<ExtrasAttachment>> {
    let extras = &set.backup.status.extras;
    if extras.is_empty() {
        return Ok(None);
    }
    let data = serde_json::to_string(extras)?;
    Ok(Some(ExtrasAttachment {
        annotation: (annotations::BACKUP_EXTRAS.to_string(), data),
        volume: Volume::downward_annotation(
            volumes::EXTRAS_VOLUME,
            volumes::EXTRAS_FILE,
            annotations::BACKUP_EXTRAS,
        ),
        mount: VolumeMount::new(volumes::EXTRAS_VOLUME, volumes::EXTRAS_MOUNT_PATH),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Backup, BackupMethod, ObjectMeta, TargetVolumeInfo};
    use std::collections::BTreeMap;

    fn set(snapshot: bool) -> BackupActionSet {
        let mut backup = Backup {
            metadata: ObjectMeta::named("ns", "b1"),
            ..Default::default()
        };
        backup.status.backup_method = Some(BackupMethod {
            snapshot_volumes: Some(snapshot),
            target_volumes: Some(TargetVolumeInfo {
                volumes: vec!["data".into()],
                volume_mounts: vec![VolumeMount::new("data", "/var/lib/mysql")],
            }),
            ..Default::default()
        });
        BackupActionSet::new(backup, None)
    }

    fn config(source: Option<&str>, path: Option<&str>) -> VolumeConfig {
        VolumeConfig {
            volume_source: source.map(str::to_string),
            mount_path: path.map(str::to_string),
        }
    }

    #[test]
    fn test_mount_path_resolution() {
        let s = set(false);
        let (volume, mount) = claim_volume(&s, &config(None, Some("/data")), "pvc-0", "dp-claim")
            .unwrap()
            .unwrap();
        assert_eq!(volume.name, "dp-claim-pvc-0");
        assert_eq!(volume.claim_name(), Some("pvc-0"));
        assert_eq!(mount.mount_path, "/data");

        let (_, mount) = claim_volume(&s, &config(Some("data"), None), "pvc-0", "dp-claim")
            .unwrap()
            .unwrap();
        assert_eq!(mount.mount_path, "/var/lib/mysql");
    }

    #[test]
    fn test_missing_mount_path() {
        let err = claim_volume(&set(false), &config(Some("logs"), None), "pvc-0", "dp-claim").unwrap_err();
        assert!(err.is_fatal());
        assert!(claim_volume(&set(true), &config(Some("logs"), None), "pvc-0", "dp-claim")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_repo_attachment() {
        let mut s = set(false);
        assert!(backup_repo_attachment(&s, None).is_none());

        s.backup.status.persistent_volume_claim_name = Some("legacy-pvc".into());
        let legacy = backup_repo_attachment(&s, None).unwrap();
        let (volume, _) = legacy.claim.unwrap();
        assert_eq!(volume.claim_name(), Some("legacy-pvc"));
        assert!(legacy.env.is_empty());

        let mut repo = BackupRepo::default();
        repo.metadata.name = "repo-1".into();
        repo.spec.volume_claim = Some("repo-pvc".into());
        let attached = backup_repo_attachment(&s, Some(&repo)).unwrap();
        let (volume, mount) = attached.claim.unwrap();
        assert_eq!(volume.claim_name(), Some("repo-pvc"));
        assert_eq!(mount.mount_path, "/backupdata");
        assert_eq!(attached.env[0].value.as_deref(), Some("repo-1"));
    }

    #[test]
    fn test_object_storage_repo_mounts_no_claim() {
        let mut repo = BackupRepo::default();
        repo.metadata.name = "s3-repo".into();
        repo.spec.storage_provider = Some("s3".into());

        let attached = backup_repo_attachment(&set(false), Some(&repo)).unwrap();
        assert!(attached.claim.is_none());
        let env: Vec<(&str, Option<&str>)> = attached
            .env
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_deref()))
            .collect();
        assert_eq!(
            env,
            vec![(vars::DP_BACKUP_REPO_NAME, Some("s3-repo")), (vars::DP_STORAGE_PROVIDER, Some("s3"))]
        );

        repo.spec.volume_claim = Some(String::new());
        assert!(backup_repo_attachment(&set(false), Some(&repo)).unwrap().claim.is_none());
    }

    #[test]
    fn test_extras_attachment() {
        let mut s = set(false);
        assert!(extras_attachment(&s).unwrap().is_none());
        s.backup.status.extras = vec![BTreeMap::from([("lsn".to_string(), "42".to_string())])];
        let extras = extras_attachment(&s).unwrap().unwrap();
        assert_eq!(extras.annotation.1, r#"[{"lsn":"42"}]"#);
        assert_eq!(extras.mount.mount_path, "/dp_downward/");
    }
}
