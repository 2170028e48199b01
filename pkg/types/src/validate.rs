use anyhow::{Result, bail};

use pkg_constants::tuning::{
    DOWNSCALE_FORBIDDEN_WINDOW_RANGE, REPLICA_RANGE, UPSCALE_FORBIDDEN_WINDOW_RANGE,
};

use crate::tuner::HpaTunerSpec;

/// Validate a Kubernetes-style resource name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

fn check_range(field: &str, value: u32, (lo, hi): (u32, u32)) -> Result<()> {
    if value < lo || value > hi {
        bail!("{} must be within [{}, {}] (got {})", field, lo, hi, value);
    }
    Ok(())
}

/// Validate a tuner spec against its documented ranges.
pub fn validate_tuner_spec(spec: &HpaTunerSpec) -> Result<()> {
    validate_name(&spec.scale_target_ref.name)?;
    check_range("min_replicas", spec.min_replicas, REPLICA_RANGE)?;
    check_range("max_replicas", spec.max_replicas, REPLICA_RANGE)?;
    if spec.min_replicas > spec.max_replicas {
        bail!(
            "min_replicas ({}) must not exceed max_replicas ({})",
            spec.min_replicas,
            spec.max_replicas
        );
    }
    check_range(
        "downscale_forbidden_window_seconds",
        spec.downscale_forbidden_window_seconds,
        DOWNSCALE_FORBIDDEN_WINDOW_RANGE,
    )?;
    check_range(
        "upscale_forbidden_window_after_downscale_seconds",
        spec.upscale_forbidden_window_after_downscale_seconds,
        UPSCALE_FORBIDDEN_WINDOW_RANGE,
    )?;
    Ok(())
}
