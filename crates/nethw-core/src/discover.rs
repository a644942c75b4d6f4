//! Interface enumeration via device path globbing.
//!
//! Patterns like `/sys/bus/pci/drivers/ixgbe/*:*/net/*` resolve to one
//! path per interface; the final path segment is the interface name.

use crate::error::{Error, Result};

/// Expand every pattern, keep the last path segment of each match,
/// sort and deduplicate.
///
/// # Errors
///
/// A bad pattern or an unreadable path is fatal to the whole pass —
/// unlike per-interface read failures, a broken enumeration config
/// must not be papered over with an empty scrape.
pub fn discover_interfaces(patterns: &[String]) -> Result<Vec<String>> {
    let mut ret = Vec::new();
    for pattern in patterns {
        let before = ret.len();
        for entry in glob::glob(pattern)? {
            let path = entry.map_err(|e| Error::Io(e.into_error()))?;
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                ret.push(name.to_string());
            }
        }
        log::debug!("{pattern}: {} device path(s)", ret.len() - before);
    }
    ret.sort();
    ret.dedup();
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::discover_interfaces;

    #[test]
    fn names_are_sorted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["enp1s2f1", "enp1s2f0", "enp1s3f0"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }

        let pattern = format!("{}/*", dir.path().display());
        // The same pattern twice: duplicates must collapse.
        let ifaces = discover_interfaces(&[pattern.clone(), pattern]).unwrap();
        assert_eq!(ifaces, vec!["enp1s2f0", "enp1s2f1", "enp1s3f0"]);
    }

    #[test]
    fn invalid_pattern_is_fatal() {
        assert!(discover_interfaces(&["/sys/[".to_string()]).is_err());
    }

    #[test]
    fn no_matches_is_an_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/absent/*", dir.path().display());
        assert!(discover_interfaces(&[pattern]).unwrap().is_empty());
    }
}
