//! Operator guidance attached to each terminal outcome.

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn backend_resolved(port: u16) -> Vec<String> {
    vec![
        format!("If this repeats, verify the backend process is running and port {port} is open."),
        "Check firewall rules if the URL is unreachable from other machines.".to_string(),
        "Schedule this check to run periodically.".to_string(),
    ]
}

pub fn backend_blocked(host: &str, port: u16, self_heal_allowed: bool) -> Vec<String> {
    let mut steps = Vec::new();
    if !self_heal_allowed {
        steps.push(
            "Backend self-heal is disabled by policy; enable ALLOW_BACKEND_SELF_HEAL to let the agent recover it."
                .to_string(),
        );
    }
    steps.push("Confirm the backend binary and its dependencies are installed.".to_string());
    steps.push(format!(
        "Try starting it manually and bind it to {host}:{port}."
    ));
    steps.push("Check if another process is already using the port.".to_string());
    steps
}

pub fn cpu_blocked() -> Vec<String> {
    lines(&[
        "Inspect the top CPU processes listed in the evidence.",
        "If a known service is misbehaving, restart that service (approved).",
        "Check recent deployments or scheduled tasks that could cause spikes.",
    ])
}

pub fn disk_resolved() -> Vec<String> {
    lines(&[
        "If the disk fills again quickly, check large folders (downloads, logs, caches).",
        "Add log rotation or a cleanup policy.",
    ])
}

pub fn disk_blocked(clear_temp_allowed: bool) -> Vec<String> {
    let mut steps = Vec::new();
    if !clear_temp_allowed {
        steps.push(
            "Temp cleanup is disabled by policy; enable ALLOW_CLEAR_TEMP to let the agent reclaim space."
                .to_string(),
        );
    }
    steps.push("Identify the largest directories on the volume.".to_string());
    steps.push("Archive non-critical files or increase disk size.".to_string());
    steps
}

pub fn no_incident() -> Vec<String> {
    lines(&["No action required."])
}
