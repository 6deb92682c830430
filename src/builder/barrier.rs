//! Barrier sidecar.
//!
//! Every restore task carries a sidecar that idles until the stop-barrier
//! annotation on its own pod reads `true`. The annotation is surfaced to the
//! sidecar as a file through a downward volume, so the coordinator releases a
//! task by patching one annotation. Tasks whose primary work finishes early
//! stay scheduled until every peer in the stage has finished.

use crate::config::RestoreEngineConfig;
use crate::constants::{annotations, containers, volumes};
use crate::models::{Container, Volume, VolumeMount};

/// Shell loop polling the marker file every `interval_seconds`
pub fn barrier_script(interval_seconds: u32, signal_file: &str) -> String {
    format!(
        r#"
set -o errexit
set -o nounset

sleep_seconds="{interval_seconds}"
signal_file="{signal_file}"

if [ "$sleep_seconds" -le 0 ]; then
  sleep_seconds=2
fi

while true; do
  if [ -f "$signal_file" ] && [ "$(cat "$signal_file")" = "true" ]; then
    break
  fi
  echo "waiting for other restore workloads, sleep ${{sleep_seconds}}s"
  sleep "$sleep_seconds"
done

echo "restore barrier released"
"#
    )
}

/// The sidecar container and the downward volume it reads the marker from
pub fn barrier_sidecar(config: &RestoreEngineConfig) -> (Container, Volume) {
    let signal_file = format!("{}/{}", volumes::BARRIER_MOUNT_PATH, volumes::BARRIER_FILE);
    let container = Container {
        name: containers::BARRIER.to_string(),
        image: config.tools_image.clone(),
        image_pull_policy: Some(config.image_pull_policy.clone()),
        command: vec!["sh".to_string(), "-c".to_string()],
        args: vec![barrier_script(config.barrier_check_interval_seconds, &signal_file)],
        volume_mounts: vec![VolumeMount::new(volumes::BARRIER_VOLUME, volumes::BARRIER_MOUNT_PATH)],
        ..Default::default()
    };
    let volume = Volume::downward_annotation(
        volumes::BARRIER_VOLUME,
        volumes::BARRIER_FILE,
        annotations::STOP_BARRIER,
    );
    (container, volume)
}
