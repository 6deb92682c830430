//! # Task Environment Assembly
//!
//! Restore images read their inputs from a fixed environment vocabulary
//! (see [`crate::constants::env`]). Entries are assembled in this order, later
//! entries replacing earlier ones with the same name:
//!
//! 1. `DP_BACKUP_NAME`
//! 2. backup file path variables
//! 3. base backup and ancestor incremental backup names
//! 4. time variables, formatted per the action definition's `TIME_FORMAT`
//!    in the backup's time zone
//! 5. restore parameters
//! 6. action-definition env
//! 7. backup-method env
//! 8. restore-request env
//! 9. for post-ready tasks, the target pod's env and connection credentials

use crate::constants::env as vars;
use crate::lineage::BackupActionSet;
use crate::models::{
    Backup, BackupStatusTarget, ConnectionCredential, EnvFromSource, EnvVar, Pod, RestoreRequest,
};
use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, Utc};

/// Merge `incoming` into `env`: same-name entries are replaced in place, new
/// names appended
pub fn merge_env(env: &mut Vec<EnvVar>, incoming: impl IntoIterator<Item = EnvVar>) {
    for var in incoming {
        match env.iter().position(|e| e.name == var.name) {
            Some(i) => env[i] = var,
            None => env.push(var),
        }
    }
}

/// Literal values of `env`, for placeholder expansion
pub fn env_value(env: &[EnvVar], name: &str) -> Option<String> {
    env.iter()
        .rev()
        .find(|e| e.name == name)
        .and_then(|e| e.value.clone())
}

fn join_path(segments: &[&str]) -> String {
    let absolute = segments.first().is_some_and(|s| s.starts_with('/'));
    let joined = segments
        .iter()
        .flat_map(|s| s.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Paths of the backup data inside the repository
pub fn backup_file_path_env(file_path: &str, target_name: &str, source_pod: &str) -> Vec<EnvVar> {
    let relative = join_path(&["/", target_name, source_pod]);
    vec![
        EnvVar::new(vars::DP_TARGET_RELATIVE_PATH, relative.clone()),
        EnvVar::new(vars::DP_BACKUP_ROOT_PATH, file_path),
        EnvVar::new(vars::DP_BACKUP_BASE_PATH, join_path(&[file_path, &relative])),
    ]
}

/// Parse `+08:00`, `UTC+08:00` or `UTC`; anything else is treated as UTC
pub fn parse_time_zone(zone: Option<&str>) -> FixedOffset {
    let utc = Utc.fix();
    let Some(zone) = zone.map(str::trim).filter(|z| !z.is_empty()) else {
        return utc;
    };
    let offset = zone.strip_prefix("UTC").unwrap_or(zone);
    if offset.is_empty() {
        return utc;
    }
    let (sign, digits) = match offset.as_bytes()[0] {
        b'+' => (1, &offset[1..]),
        b'-' => (-1, &offset[1..]),
        _ => return utc,
    };
    let (hours, minutes) = digits.split_once(':').unwrap_or((digits, "0"));
    match (hours.parse::<i32>(), minutes.parse::<i32>()) {
        (Ok(h), Ok(m)) if h <= 14 && m < 60 => {
            FixedOffset::east_opt(sign * (h * 3600 + m * 60)).unwrap_or(utc)
        }
        _ => utc,
    }
}

/// Formats time variables per an optional strftime layout; RFC 3339 otherwise
#[derive(Debug, Clone, Default)]
pub struct TimeFormatter {
    layout: Option<String>,
}

impl TimeFormatter {
    pub fn new(layout: Option<&str>) -> Self {
        Self {
            layout: layout.map(str::to_string),
        }
    }

    pub fn format(&self, time: DateTime<Utc>, zone: Option<&str>) -> String {
        let local = time.with_timezone(&parse_time_zone(zone));
        match &self.layout {
            Some(layout) => local.format(layout).to_string(),
            None => local.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    fn push(
        &self,
        env: &mut Vec<EnvVar>,
        name: &str,
        timestamp_name: Option<&str>,
        time: Option<DateTime<Utc>>,
        zone: Option<&str>,
    ) {
        let Some(time) = time else {
            return;
        };
        env.push(EnvVar::new(name, self.format(time, zone)));
        if let Some(timestamp_name) = timestamp_name {
            env.push(EnvVar::new(timestamp_name, time.timestamp().to_string()));
        }
    }
}

/// Environment shared by every task of a backup set, up to and including the
/// restore-request env
pub fn common_env(request: &RestoreRequest, set: &BackupActionSet, source_pod: &str) -> Vec<EnvVar> {
    let backup = &set.backup;
    let mut env = vec![EnvVar::new(vars::DP_BACKUP_NAME, backup.name())];

    if let Some(path) = backup.status.path.as_deref().filter(|p| !p.is_empty()) {
        let target_name = request.spec.backup.source_target_name.as_deref().unwrap_or_default();
        merge_env(&mut env, backup_file_path_env(path, target_name, source_pod));
    }
    if let Some(base) = &set.base_backup {
        merge_env(&mut env, [EnvVar::new(vars::DP_BASE_BACKUP_NAME, base.name())]);
    }
    if !set.ancestor_incremental_backups.is_empty() {
        merge_env(
            &mut env,
            [EnvVar::new(
                vars::DP_ANCESTOR_INCREMENTAL_BACKUP_NAMES,
                set.ancestor_names().join(","),
            )],
        );
    }

    let definition_env = set
        .action_definition
        .as_ref()
        .map(|d| d.spec.env.clone())
        .unwrap_or_default();
    let formatter = TimeFormatter::new(set.action_definition.as_ref().and_then(|d| d.time_format()));
    let mut time_env = Vec::new();
    formatter.push(&mut time_env, vars::DP_BACKUP_STOP_TIME, None, backup.end_time(), backup.time_zone());
    if let Some(base) = &set.base_backup {
        push_base_time_env(&formatter, &mut time_env, base);
    }
    formatter.push(
        &mut time_env,
        vars::DP_RESTORE_TIME,
        Some(vars::DP_RESTORE_TIMESTAMP),
        request.restore_time(),
        backup.time_zone(),
    );
    merge_env(&mut env, time_env);

    merge_env(
        &mut env,
        request
            .spec
            .parameters
            .iter()
            .map(|p| EnvVar::new(&p.name, &p.value)),
    );
    merge_env(&mut env, definition_env);
    if let Some(method) = &backup.status.backup_method {
        merge_env(&mut env, method.env.clone());
    }
    merge_env(&mut env, request.spec.env.clone());
    env
}

fn push_base_time_env(formatter: &TimeFormatter, env: &mut Vec<EnvVar>, base: &Backup) {
    formatter.push(
        env,
        vars::DP_BASE_BACKUP_START_TIME,
        Some(vars::DP_BASE_BACKUP_START_TIMESTAMP),
        base.start_time(),
        base.time_zone(),
    );
    formatter.push(
        env,
        vars::DP_BASE_BACKUP_STOP_TIME,
        Some(vars::DP_BASE_BACKUP_STOP_TIMESTAMP),
        base.end_time(),
        base.time_zone(),
    );
}

/// `DP_DB_PORT` from the target's named container port, else the pod's first port
fn port_env(pod: &Pod, target: Option<&BackupStatusTarget>) -> Option<EnvVar> {
    let named = target
        .and_then(|t| t.container_port.as_ref())
        .and_then(|cp| {
            pod.spec
                .containers
                .iter()
                .find(|c| c.name == cp.container_name)
                .and_then(|c| c.ports.iter().find(|p| p.name.as_deref() == Some(cp.port_name.as_str())))
        });
    let port = named.or_else(|| pod.spec.containers.first().and_then(|c| c.ports.first()))?;
    Some(EnvVar::new(vars::DP_DB_PORT, port.container_port.to_string()))
}

/// Env of the target pod's first container plus connection variables.
///
/// With a connection credential, user and password come from the secret, and
/// host and port too when their keys are configured. Otherwise host is the
/// pod's DNS identity and port its container port.
pub fn target_pod_env(
    pod: &Pod,
    credential: Option<&ConnectionCredential>,
    target: Option<&BackupStatusTarget>,
    cluster_domain: &str,
) -> (Vec<EnvVar>, Vec<EnvFromSource>) {
    let (mut env, env_from) = match pod.spec.containers.first() {
        Some(c) => (c.env.clone(), c.env_from.clone()),
        None => (Vec::new(), Vec::new()),
    };
    let host = EnvVar::new(vars::DP_DB_HOST, pod.host_dns(cluster_domain));

    let Some(credential) = credential else {
        env.push(host);
        env.extend(port_env(pod, target));
        return (env, env_from);
    };

    let from_secret = |name: &str, key: Option<&String>| {
        key.filter(|k| !k.is_empty())
            .map(|k| EnvVar::from_secret(name, &credential.secret_name, k))
    };
    env.extend(from_secret(vars::DP_DB_USER, credential.username_key.as_ref()));
    env.extend(from_secret(vars::DP_DB_PASSWORD, credential.password_key.as_ref()));
    match from_secret(vars::DP_DB_PORT, credential.port_key.as_ref()) {
        Some(port) => env.push(port),
        None => env.extend(port_env(pod, target)),
    }
    env.push(from_secret(vars::DP_DB_HOST, credential.host_key.as_ref()).unwrap_or(host));
    (env, env_from)
}
