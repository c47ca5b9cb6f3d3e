use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;
use serde_json::{Map, Value};

/// Display format for VM creation times, e.g. `05 March 2024, 14:02:11`.
pub const CREATED_AT_FORMAT: &str = "%d %B %Y, %H:%M:%S";

/// A VM row from a hypervisor inventory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub vmid: String,
    pub name: String,
}

/// Listing produced by `hostname && qm list`: the first line names the node,
/// the remaining lines are `<vmid> <name> ...` rows (the column header row
/// never matches a VM name in practice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    pub hostname: String,
    pub entries: Vec<InventoryEntry>,
}

impl Inventory {
    pub fn find(&self, vm_name: &str) -> Option<&InventoryEntry> {
        self.entries.iter().find(|entry| entry.name == vm_name)
    }
}

pub fn parse_inventory(output: &str) -> Option<Inventory> {
    let mut lines = output.lines();
    let hostname = lines.next()?.trim().to_string();
    let entries = lines
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let vmid = parts.next()?;
            let name = parts.next()?;
            Some(InventoryEntry {
                vmid: vmid.to_string(),
                name: name.to_string(),
            })
        })
        .collect();
    Some(Inventory { hostname, entries })
}

/// Extracts the resource fields of a VM configuration file. Fields that do
/// not appear stay `null`.
pub fn parse_vm_config(config_text: &str) -> Map<String, Value> {
    let mut data = Map::new();
    for key in ["cores", "memory", "disk_size", "iso_name", "created_at"] {
        data.insert(key.to_string(), Value::Null);
    }

    for line in config_text.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("cores:") {
            if let Ok(cores) = value.trim().parse::<i64>() {
                data.insert("cores".to_string(), Value::from(cores));
            }
        } else if let Some(value) = line.strip_prefix("memory:") {
            if let Ok(memory) = value.trim().parse::<i64>() {
                data.insert("memory".to_string(), Value::from(memory));
            }
        } else if line.starts_with("scsi0:") {
            if let Some(size) = disk_size_regex().captures(line).map(|caps| caps[1].to_string()) {
                data.insert("disk_size".to_string(), Value::from(size));
            }
        } else if line.starts_with("ide2:") {
            if let Some(iso) = iso_regex().captures(line).map(|caps| caps[1].to_string()) {
                data.insert("iso_name".to_string(), Value::from(iso));
            }
        } else if let Some(caps) = ctime_regex().captures(line) {
            let created = caps[1]
                .parse::<i64>()
                .ok()
                .and_then(humanize_epoch);
            if let Some(created) = created {
                data.insert("created_at".to_string(), Value::from(created));
            }
        }
    }
    data
}

/// Value of the `status:` line from `qm status`, or `"unknown"`.
pub fn parse_vm_status(output: &str) -> String {
    output
        .lines()
        .find_map(|line| line.strip_prefix("status:"))
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn humanize_epoch(seconds: i64) -> Option<String> {
    let utc = DateTime::from_timestamp(seconds, 0)?;
    Some(utc.with_timezone(&Local).format(CREATED_AT_FORMAT).to_string())
}

fn disk_size_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"size=([^,]+)").expect("invalid disk size regex"))
}

fn iso_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"iso/([^,]+)").expect("invalid iso regex"))
}

fn ctime_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"ctime=(\d+)").expect("invalid ctime regex"))
}
