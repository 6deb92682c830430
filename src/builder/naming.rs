//! Deterministic task names.
//!
//! Names are derived only from the request uid, stage, backup name and index,
//! so every reconciliation pass computes the same name for the same task and
//! submission can check for existence by name.

use crate::constants::REQUEST_ID_PREFIX_LEN;
use crate::models::RestoreStage;

/// Length of the tail kept when a name is cut
const CUT_SUFFIX_LEN: usize = 5;

fn request_prefix(request_uid: &str) -> String {
    request_uid.chars().take(REQUEST_ID_PREFIX_LEN).collect()
}

/// `{backup}` or `{backup}-{target}` when the backup recorded a named target
fn backup_segment(backup_name: &str, target_name: Option<&str>) -> String {
    match target_name.filter(|t| !t.is_empty()) {
        Some(target) => format!("{backup_name}-{target}"),
        None => backup_name.to_string(),
    }
}

/// `restore-{stage}-{uid[..8]}-{backup}[-{target}]-{index}`
pub fn task_name(
    stage: RestoreStage,
    request_uid: &str,
    backup_name: &str,
    target_name: Option<&str>,
    index: usize,
    max_len: usize,
) -> String {
    let name = format!(
        "restore-{}-{}-{}-{index}",
        stage.name_segment(),
        request_prefix(request_uid),
        backup_segment(backup_name, target_name)
    );
    cut_name(&sanitize(&name), max_len)
}

/// `restore-post-ready-{uid[..8]}-{backup}[-{target}]-{step}-{index}`
pub fn post_ready_task_name(
    request_uid: &str,
    backup_name: &str,
    target_name: Option<&str>,
    step: usize,
    index: usize,
    max_len: usize,
) -> String {
    let name = format!(
        "restore-post-ready-{}-{}-{step}-{index}",
        request_prefix(request_uid),
        backup_segment(backup_name, target_name)
    );
    cut_name(&sanitize(&name), max_len)
}

/// Keep the head and the last five characters of an over-long name
pub fn cut_name(name: &str, max_len: usize) -> String {
    let len = name.len();
    if len <= max_len || max_len <= CUT_SUFFIX_LEN + 1 {
        return name.to_string();
    }
    let head = max_len - CUT_SUFFIX_LEN - 1;
    format!("{}-{}", &name[..head], &name[len - CUT_SUFFIX_LEN..])
}

/// Lowercase DNS-label characters only
pub fn sanitize(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    mapped.trim_matches('-').to_string()
}

/// Stage-scoped action name recorded on status actions
pub fn action_name(stage: RestoreStage, step: Option<usize>, target_name: Option<&str>) -> String {
    let mut name = match (stage, step) {
        (RestoreStage::PrepareData, _) => "prepare-data".to_string(),
        (RestoreStage::PostReady, Some(step)) => format!("post-ready-{step}"),
        (RestoreStage::PostReady, None) => "post-ready".to_string(),
    };
    if let Some(target) = target_name.filter(|t| !t.is_empty()) {
        name.push('-');
        name.push_str(target);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    const UID: &str = "0f3c9a2e-5d1b-4c8e-9f00-123456789abc";

    #[test]
    fn test_task_name_shape() {
        assert_eq!(
            task_name(RestoreStage::PrepareData, UID, "backup-1", None, 2, 63),
            "restore-preparedata-0f3c9a2e-backup-1-2"
        );
        assert_eq!(
            post_ready_task_name(UID, "backup-1", None, 0, 1, 63),
            "restore-post-ready-0f3c9a2e-backup-1-0-1"
        );
    }

    #[test]
    fn test_long_names_are_cut() {
        let backup = "a-very-long-backup-name-that-goes-on-and-on-20240101093000";
        let name = task_name(RestoreStage::PostReady, UID, backup, None, 11, 63);
        assert_eq!(name.len(), 63);
        assert!(name.starts_with("restore-postready-0f3c9a2e-"));
        assert!(name.ends_with("-00-11"));
    }

    #[test]
    fn test_distinct_indices_survive_cutting() {
        let backup = "x".repeat(80);
        let a = task_name(RestoreStage::PrepareData, UID, &backup, None, 1, 63);
        let b = task_name(RestoreStage::PrepareData, UID, &backup, None, 2, 63);
        assert_ne!(a, b);
    }

    #[test]
    fn test_target_name_is_part_of_task_name() {
        assert_eq!(
            task_name(RestoreStage::PrepareData, UID, "backup-1", Some("mysql"), 0, 63),
            "restore-preparedata-0f3c9a2e-backup-1-mysql-0"
        );
        assert_eq!(
            post_ready_task_name(UID, "backup-1", Some("proxy"), 1, 0, 63),
            "restore-post-ready-0f3c9a2e-backup-1-proxy-1-0"
        );
        assert_eq!(
            task_name(RestoreStage::PrepareData, UID, "backup-1", Some(""), 0, 63),
            task_name(RestoreStage::PrepareData, UID, "backup-1", None, 0, 63)
        );
        assert_ne!(
            task_name(RestoreStage::PrepareData, UID, "backup-1", Some("mysql"), 0, 63),
            task_name(RestoreStage::PrepareData, UID, "backup-1", Some("proxy"), 0, 63)
        );
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Restore_Data.1-"), "restore-data-1");
    }

    #[test]
    fn test_action_name() {
        assert_eq!(action_name(RestoreStage::PrepareData, None, None), "prepare-data");
        assert_eq!(action_name(RestoreStage::PostReady, Some(1), Some("mysql")), "post-ready-1-mysql");
    }
}
