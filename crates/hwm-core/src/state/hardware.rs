//! Hardware summary for an allocated host.
//!
//! The profile's specs stand in for the host's inventory: they are read back
//! as facts and queried for memory, CPU, disk and NIC values.

use super::{State, StateError};
use crate::cmdb;
use crate::logging::event_names;
use crate::matcher::Bindings;
use hwm_common::{Fact, Record, Spec};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HardwareInfo {
    /// Total memory in MiB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ncpus: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<DiskInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nics: Vec<NicInfo>,
}

impl HardwareInfo {
    pub fn is_empty(&self) -> bool {
        self.memory.is_none() && self.ncpus.is_none() && self.disks.is_empty() && self.nics.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskInfo {
    /// Size with a `Gi` suffix, e.g. `"21Gi"`.
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NicInfo {
    pub mac: String,
}

impl State {
    /// Summarize the hardware allocated to `hostname`.
    ///
    /// The host is looked up in every profile's CMDB, in state order. An
    /// unknown hostname yields an empty summary.
    pub fn hardware_info(&self, hostname: &str) -> Result<HardwareInfo, StateError> {
        let cfg_dir = self.cfg_dir.as_deref().ok_or(StateError::NoConfigDir)?;

        for entry in &self.entries {
            let records = match cmdb::load_cmdb(cfg_dir, &entry.name) {
                Ok(Some(records)) => records,
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        event = event_names::CMDB_INVALID,
                        profile = %entry.name,
                        error = %err,
                        "skipping unreadable CMDB"
                    );
                    continue;
                }
            };
            let found = records
                .into_iter()
                .find(|record| record.get("hostname").and_then(Value::as_str) == Some(hostname));
            if let Some(record) = found {
                debug!(profile = %entry.name, hostname, "host found in CMDB");
                let specs = self.load_specs(&entry.name);
                return self.summarize(&specs, &record);
            }
        }
        debug!(hostname, "host not found in any CMDB");
        Ok(HardwareInfo::default())
    }

    fn summarize(&self, specs: &[Spec], record: &Record) -> Result<HardwareInfo, StateError> {
        let mut facts: Vec<Fact> = specs.iter().cloned().map(Fact::from).collect();

        let memory = self
            .integer_value(&mut facts, Spec::new("memory", "total", "size", "$size"), "size")?
            .map(|size| size / 1024)
            .filter(|&mib| mib > 0);
        let ncpus = self
            .integer_value(&mut facts, Spec::new("cpu", "logical", "number", "$ncpus"), "ncpus")?
            .filter(|&n| n > 0);
        let disks = self.disks(&mut facts)?;
        let nics = self.nics(&mut facts, record)?;

        Ok(HardwareInfo {
            memory,
            ncpus,
            disks,
            nics,
        })
    }

    fn integer_value(
        &self,
        facts: &mut Vec<Fact>,
        pattern: Spec,
        key: &str,
    ) -> Result<Option<u64>, StateError> {
        let mut vars = Bindings::new();
        if self.matcher.match_spec(&pattern, facts, &mut vars)?.is_none() {
            return Ok(None);
        }
        Ok(vars
            .get(key)
            .filter(|value| !value.starts_with('$'))
            .and_then(|value| value.parse().ok()))
    }

    fn disks(&self, facts: &mut Vec<Fact>) -> Result<Vec<DiskInfo>, StateError> {
        let pattern = Spec::new("disk", "$disk", "size", "$gb");
        let mut disks = Vec::new();
        loop {
            let mut vars = Bindings::new();
            if self.matcher.match_spec(&pattern, facts, &mut vars)?.is_none() {
                break;
            }
            if let Some(gb) = vars.get("gb") {
                disks.push(DiskInfo {
                    size: format!("{}Gi", disk_size(gb)),
                });
            }
        }
        Ok(disks)
    }

    fn nics(&self, facts: &mut Vec<Fact>, record: &Record) -> Result<Vec<NicInfo>, StateError> {
        let mut names: Vec<String> = Vec::new();
        let mut scan = facts.clone();
        let any = Spec::new("network", "$eth", "$key", "$value");
        loop {
            let mut vars = Bindings::new();
            if self.matcher.match_spec(&any, &mut scan, &mut vars)?.is_none() {
                break;
            }
            if let Some(eth) = vars.remove("eth") {
                if !names.contains(&eth) {
                    names.push(eth);
                }
            }
        }

        let mut nics = Vec::new();
        for name in names {
            let mut vars = Bindings::new();
            let serial = Spec::new("network", &name, "serial", "$mac");
            if self.matcher.match_spec(&serial, facts, &mut vars)?.is_none() {
                continue;
            }
            let Some(mac) = vars.get("mac") else { continue };
            match mac.strip_prefix("$$") {
                Some(var) => match record.get(var) {
                    Some(Value::String(value)) => nics.push(NicInfo { mac: value.clone() }),
                    Some(other) => nics.push(NicInfo {
                        mac: other.to_string(),
                    }),
                    None => warn!(setting = var, interface = %name, "cmdb setting not found"),
                },
                None => nics.push(NicInfo { mac: mac.clone() }),
            }
        }
        Ok(nics)
    }
}

/// Representative size in GiB for a disk size spec value.
///
/// Bounds become the smallest (or largest) integer satisfying them; other
/// values pass through. A `$name=` binding prefix is ignored.
fn disk_size(value: &str) -> String {
    let expr = match value.strip_prefix('$').and_then(|rest| rest.split_once('=')) {
        Some((_, expr)) => expr,
        None => value,
    };
    let bound = |prefix: &str| {
        expr.strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|n| n.trim().parse::<i64>().ok())
    };
    if let Some(n) = bound("gt(") {
        return (n + 1).to_string();
    }
    if let Some(n) = bound("ge(") {
        return n.to_string();
    }
    if let Some(n) = bound("lt(") {
        return (n - 1).to_string();
    }
    if let Some(n) = bound("le(") {
        return n.to_string();
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwm_common::{ProfileEntry, Quota};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).expect("write fixture");
    }

    #[test]
    fn disk_size_bounds() {
        assert_eq!(disk_size("gt(20)"), "21");
        assert_eq!(disk_size("ge(20)"), "20");
        assert_eq!(disk_size("lt(20)"), "19");
        assert_eq!(disk_size("le(20)"), "20");
        assert_eq!(disk_size("100"), "100");
        assert_eq!(disk_size("$size=gt(50)"), "51");
        assert_eq!(disk_size("gt(x)"), "gt(x)");
    }

    #[test]
    fn summary_from_specs() {
        let dir = tempdir().expect("tempdir");
        write(
            dir.path(),
            "hw1.specs",
            r#"[
                ["memory", "total", "size", "4294967296"],
                ["cpu", "logical", "number", "8"],
                ["disk", "sda", "size", "gt(100)"],
                ["disk", "sdb", "size", "50"],
                ["network", "eth0", "serial", "$$mac"],
                ["network", "eth0", "ipv4", "$ip"],
                ["network", "eth1", "serial", "aa:bb:cc:dd:ee:ff"]
            ]"#,
        );
        write(
            dir.path(),
            "hw1.cmdb",
            r#"[{"hostname": "node1", "mac": "11:22:33:44:55:66", "used": 1}]"#,
        );
        let state = State::with_config_dir(
            vec![ProfileEntry::new("hw1", Quota::Remaining(1))],
            dir.path(),
        );

        let info = state.hardware_info("node1").expect("info");
        assert_eq!(info.memory, Some(4194304));
        assert_eq!(info.ncpus, Some(8));
        assert_eq!(
            info.disks,
            vec![
                DiskInfo { size: "101Gi".to_string() },
                DiskInfo { size: "50Gi".to_string() },
            ]
        );
        assert_eq!(
            info.nics,
            vec![
                NicInfo { mac: "11:22:33:44:55:66".to_string() },
                NicInfo { mac: "aa:bb:cc:dd:ee:ff".to_string() },
            ]
        );
    }

    #[test]
    fn variables_and_predicates_are_skipped() {
        let dir = tempdir().expect("tempdir");
        write(
            dir.path(),
            "hw1.specs",
            r#"[
                ["memory", "total", "size", "ge(4096)"],
                ["cpu", "logical", "number", "$ncpus"],
                ["network", "eth0", "serial", "$$missing"]
            ]"#,
        );
        write(dir.path(), "hw1.cmdb", r#"[{"hostname": "node1"}]"#);
        let state = State::with_config_dir(
            vec![ProfileEntry::new("hw1", Quota::Unlimited)],
            dir.path(),
        );
        let info = state.hardware_info("node1").expect("info");
        assert!(info.is_empty());
        assert_eq!(serde_json::to_string(&info).expect("json"), "{}");
    }

    #[test]
    fn sub_mebibyte_memory_is_skipped() {
        let dir = tempdir().expect("tempdir");
        write(
            dir.path(),
            "hw1.specs",
            r#"[["memory", "total", "size", "512"], ["cpu", "logical", "number", "2"]]"#,
        );
        write(dir.path(), "hw1.cmdb", r#"[{"hostname": "node1"}]"#);
        let state = State::with_config_dir(
            vec![ProfileEntry::new("hw1", Quota::Unlimited)],
            dir.path(),
        );
        let info = state.hardware_info("node1").expect("info");
        assert_eq!(info.memory, None);
        assert_eq!(info.ncpus, Some(2));
    }

    #[test]
    fn unreadable_cmdb_is_skipped() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "broken.cmdb", r#"[{"hostname": "node1"},"#);
        write(dir.path(), "hw1.specs", r#"[["cpu", "logical", "number", "4"]]"#);
        write(dir.path(), "hw1.cmdb", r#"[{"hostname": "node1"}]"#);
        let state = State::with_config_dir(
            vec![
                ProfileEntry::new("broken", Quota::Unlimited),
                ProfileEntry::new("hw1", Quota::Unlimited),
            ],
            dir.path(),
        );
        assert_eq!(state.hardware_info("node1").expect("info").ncpus, Some(4));
    }

    #[test]
    fn unknown_host_is_empty() {
        let dir = tempdir().expect("tempdir");
        write(dir.path(), "hw1.cmdb", r#"[{"hostname": "node1"}]"#);
        let state = State::with_config_dir(
            vec![
                ProfileEntry::new("nocmdb", Quota::Unlimited),
                ProfileEntry::new("hw1", Quota::Unlimited),
            ],
            dir.path(),
        );
        assert!(state.hardware_info("node9").expect("info").is_empty());
    }

    #[test]
    fn requires_config_dir() {
        let state = State::new(Vec::new());
        assert!(matches!(
            state.hardware_info("node1"),
            Err(StateError::NoConfigDir)
        ));
    }
}
