use crate::error::InspectError;
use crate::types::{ResourceComparison, ResourcePair};

/// Binary memory tiers; adjacent tiers differ by a factor of 1024. Bare bytes sit below `Ki`.
const MEMORY_TIERS: &[&str] = &["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const TIER_FACTOR: u128 = 1024;

pub fn parse_cpu_to_millicores(q: &str) -> Option<i64> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }
    if let Some(stripped) = q.strip_suffix('n') {
        if let Ok(nanos) = stripped.parse::<i128>() {
            return Some((nanos / 1_000_000) as i64);
        }
    } else if let Some(stripped) = q.strip_suffix('u') {
        if let Ok(micros) = stripped.parse::<i128>() {
            return Some((micros / 1_000) as i64);
        }
    } else if let Some(stripped) = q.strip_suffix('m') {
        if let Ok(mc) = stripped.parse::<i64>() {
            return Some(mc);
        }
    } else {
        // treat as cores; can be integer or float
        if let Ok(cores) = q.parse::<f64>() {
            let millis = (cores * 1000.0).round();
            if millis.is_finite() && millis.abs() < i64::MAX as f64 {
                return Some(millis as i64);
            }
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryQuantity {
    pub magnitude: u64,
    pub unit: String,
}

impl MemoryQuantity {
    fn tier(&self) -> usize {
        // parse_memory_quantity only accepts known units
        MEMORY_TIERS.iter().position(|u| *u == self.unit).unwrap_or(0)
    }
}

/// Split `50000Mi` into `(50000, "Mi")`. The numeric prefix is mandatory.
pub fn parse_memory_quantity(q: &str) -> Result<MemoryQuantity, InspectError> {
    let trimmed = q.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    if digits.is_empty() || !MEMORY_TIERS.contains(&unit) {
        return Err(InspectError::MalformedQuantity(q.to_string()));
    }
    let magnitude = digits
        .parse::<u64>()
        .map_err(|_| InspectError::MalformedQuantity(q.to_string()))?;

    Ok(MemoryQuantity { magnitude, unit: unit.to_string() })
}

/// True when `limit <= observed`. Differing units are brought to the smaller unit first.
pub fn memory_within(limit: &str, observed: &str) -> Result<bool, InspectError> {
    let limit = parse_memory_quantity(limit)?;
    let observed = parse_memory_quantity(observed)?;

    if limit.unit == observed.unit {
        return Ok(limit.magnitude <= observed.magnitude);
    }

    let base = limit.tier().min(observed.tier());
    let scale = |q: &MemoryQuantity| -> u128 {
        let steps = (q.tier() - base) as u32;
        q.magnitude as u128 * TIER_FACTOR.pow(steps)
    };
    Ok(scale(&limit) <= scale(&observed))
}

pub fn cpu_within(limit: &str, observed: &str) -> Result<bool, InspectError> {
    let limit_mc = parse_cpu_to_millicores(limit)
        .ok_or_else(|| InspectError::MalformedQuantity(limit.to_string()))?;
    let observed_mc = parse_cpu_to_millicores(observed)
        .ok_or_else(|| InspectError::MalformedQuantity(observed.to_string()))?;
    Ok(limit_mc <= observed_mc)
}

/// Compare expected limits against the limits a container declares.
pub fn compare_resources(limit: &ResourcePair, observed: &ResourcePair) -> Result<ResourceComparison, InspectError> {
    let cpu_ok = cpu_within(&limit.cpu, &observed.cpu)?;
    let memory_ok = memory_within(&limit.memory, &observed.memory)?;

    Ok(ResourceComparison {
        passed: cpu_ok && memory_ok,
        cpu_ok,
        memory_ok,
        limit: limit.clone(),
        observed: observed.clone(),
    })
}
