use std::path::Path;

use sysinfo::Disks;
use tracing::warn;

/// Used space on the volume holding `volume`, in percent (0..=100).
///
/// The disk whose mount point is the longest prefix of `volume` wins, so
/// `/var/log` resolves to a `/var` mount before `/`. Returns `None` when no
/// mounted disk covers the path or it reports zero capacity.
pub fn usage_pct(volume: &Path) -> Option<f64> {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|d| volume.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    let Some(disk) = disk else {
        warn!(volume = %volume.display(), "no mounted disk covers volume");
        return None;
    };

    let pct = used_pct(disk.total_space(), disk.available_space());
    if pct.is_none() {
        warn!(volume = %volume.display(), "disk reports zero capacity");
    }
    pct
}

/// Percentage of `total` that is not `available`.
pub fn used_pct(total: u64, available: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(available);
    Some((used as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_percentage() {
        assert_eq!(used_pct(200, 50), Some(75.0));
        assert_eq!(used_pct(100, 100), Some(0.0));
        assert_eq!(used_pct(100, 0), Some(100.0));
    }

    #[test]
    fn zero_capacity_is_unknown() {
        assert_eq!(used_pct(0, 0), None);
    }

    #[test]
    fn available_above_total_clamps() {
        assert_eq!(used_pct(100, 150), Some(0.0));
    }
}
