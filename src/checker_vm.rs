use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::compare::compare;
use crate::error::SessionError;
use crate::models::HostCredential;
use crate::parser::{parse_inventory, parse_vm_config, parse_vm_status};
use crate::ssh_client::{RemoteShell, ShellConnector};
use crate::utils::{probe_error, vm_config_command, vm_status_command, INVENTORY_COMMAND};

/// Where a VM was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmLocation {
    pub hostname: String,
    pub vmid: String,
}

/// A VM found on one of several candidate nodes, together with the still-open
/// session to that node.
pub struct LocatedVm {
    pub shell: Box<dyn RemoteShell>,
    pub host: String,
    pub location: VmLocation,
}

/// Result of scanning candidate nodes. `errors` lists nodes that could not be
/// inspected; they are skipped rather than ending the scan.
pub struct VmSearch {
    pub located: Option<LocatedVm>,
    pub errors: Vec<String>,
}

/// Looks for `vm_name` in the inventory of the host behind `shell`.
pub fn locate_vm(shell: &mut dyn RemoteShell, vm_name: &str) -> Result<Option<VmLocation>, SessionError> {
    let result = shell.run(INVENTORY_COMMAND, false)?;
    let Some(inventory) = parse_inventory(&result.stdout) else {
        return Ok(None);
    };
    Ok(inventory.find(vm_name).map(|entry| VmLocation {
        hostname: inventory.hostname.clone(),
        vmid: entry.vmid.clone(),
    }))
}

/// Scans `credentials` in order and stops at the first node whose inventory
/// lists `vm_name`. Sessions to nodes that do not match are closed.
pub fn find_vm(connector: &dyn ShellConnector, credentials: &[HostCredential], vm_name: &str) -> VmSearch {
    let mut errors = Vec::new();

    for credential in credentials {
        let mut shell = match connector.connect(credential) {
            Ok(shell) => shell,
            Err(error) => {
                warn!(host = %credential.host, %error, "skipping node that refused the connection");
                errors.push(format!("{}: {error}", credential.host));
                continue;
            }
        };

        match locate_vm(shell.as_mut(), vm_name) {
            Ok(Some(location)) => {
                info!(host = %credential.host, vmid = %location.vmid, vm = vm_name, "vm located");
                return VmSearch {
                    located: Some(LocatedVm {
                        shell,
                        host: credential.host.clone(),
                        location,
                    }),
                    errors,
                };
            }
            Ok(None) => {}
            Err(error) => {
                warn!(host = %credential.host, %error, "inventory listing failed");
                errors.push(format!("{}: {error}", credential.host));
            }
        }
        shell.close();
    }

    VmSearch {
        located: None,
        errors,
    }
}

/// Reads the VM configuration and parses its resource fields.
pub fn inspect_resources(shell: &mut dyn RemoteShell, vmid: &str) -> Result<Map<String, Value>, SessionError> {
    let result = shell.run(&vm_config_command(vmid), false)?;
    Ok(parse_vm_config(&result.stdout))
}

/// One raw outcome per expected resource key, in the order of `expected`.
pub fn check_vm_resources(
    shell: &mut dyn RemoteShell,
    vmid: &str,
    expected: &Map<String, Value>,
) -> Vec<(String, Value)> {
    match inspect_resources(shell, vmid) {
        Ok(actual) => compare(&actual, expected)
            .into_iter()
            .map(|comparison| {
                let raw = json!({
                    "status": comparison.matches,
                    "expected": comparison.expected,
                    "actual": comparison.actual,
                    "message": format!("expected={} actual={}", comparison.expected, comparison.actual),
                });
                (comparison.key, raw)
            })
            .collect(),
        Err(error) => expected
            .keys()
            .map(|key| (key.clone(), probe_error("Reading VM configuration", &error)))
            .collect(),
    }
}

/// Compares the VM's power state with `expected_status`, ignoring case and
/// surrounding whitespace.
pub fn check_vm_status(shell: &mut dyn RemoteShell, vmid: &str, expected_status: &str) -> Value {
    match shell.run(&vm_status_command(vmid), false) {
        Ok(result) => {
            let actual = parse_vm_status(&result.stdout);
            let expected = expected_status.trim();
            let matches = actual.trim().eq_ignore_ascii_case(expected);
            json!({
                "status": matches,
                "expected": expected,
                "actual": actual,
                "message": if matches {
                    None
                } else {
                    Some(format!("expected vm_status={expected:?}, actual={actual:?}"))
                },
            })
        }
        Err(error) => probe_error("Reading VM status", error),
    }
}

#[cfg(test)]
mod tests {
    use super::{check_vm_resources, check_vm_status, find_vm};
    use crate::models::HostCredential;
    use crate::test_support::{ScriptedConnector, ScriptedHost};
    use serde_json::json;

    const NODE_TWO_LISTING: &str = "pve-2\n VMID NAME STATUS\n 205 exam-proxmox running\n";

    #[test]
    fn first_matching_node_wins_and_others_are_closed() {
        let connector = ScriptedConnector::new()
            .with_host("node-1", ScriptedHost::new().ok("hostname && qm list", "pve-1\n 100 other running\n"))
            .with_host("node-2", ScriptedHost::new().ok("hostname && qm list", NODE_TWO_LISTING))
            .with_host("node-3", ScriptedHost::new().ok("hostname && qm list", NODE_TWO_LISTING));
        let credentials = ["node-1", "node-2", "node-3"]
            .map(|host| HostCredential::new(host, "root", "pw"))
            .to_vec();

        let search = find_vm(&connector, &credentials, "exam-proxmox");
        let located = search.located.expect("vm should be found");
        assert_eq!(located.host, "node-2");
        assert_eq!(located.location.vmid, "205");
        assert_eq!(located.location.hostname, "pve-2");

        let journal = connector.journal();
        assert!(journal.contains(&"close node-1".to_string()));
        assert!(!journal.iter().any(|line| line.starts_with("connect node-3")));
    }

    #[test]
    fn unreachable_nodes_are_skipped() {
        let connector = ScriptedConnector::new()
            .refuse("node-1", "connection refused")
            .with_host("node-2", ScriptedHost::new().ok("hostname && qm list", NODE_TWO_LISTING));
        let credentials = vec![
            HostCredential::new("node-1", "root", "pw"),
            HostCredential::new("node-2", "root", "pw"),
        ];
        let search = find_vm(&connector, &credentials, "exam-proxmox");
        assert!(search.located.is_some());
        assert_eq!(search.errors, vec!["node-1: connection refused".to_string()]);
    }

    #[test]
    fn resource_outcomes_follow_expected_keys() {
        let mut shell = ScriptedHost::new()
            .ok("cat /etc/pve/qemu-server/101.conf", "cores: 2\nmemory: 2048\n")
            .into_shell("node-1");
        let expected = json!({"cores": 2, "memory": 4096}).as_object().cloned().unwrap();
        let outcomes = check_vm_resources(shell.as_mut(), "101", &expected);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].1["status"], json!(true));
        assert_eq!(outcomes[1].1["status"], json!(false));
        assert_eq!(outcomes[1].1["message"], json!("expected=4096 actual=2048"));
    }

    #[test]
    fn status_comparison_ignores_case_and_unknown_output_fails() {
        let mut shell = ScriptedHost::new()
            .ok("qm status 101", "status: Running\n")
            .ok("qm status 102", "")
            .into_shell("node-1");
        assert_eq!(check_vm_status(shell.as_mut(), "101", "running")["status"], json!(true));
        let unknown = check_vm_status(shell.as_mut(), "102", "running");
        assert_eq!(unknown["status"], json!(false));
        assert_eq!(unknown["actual"], json!("unknown"));
    }
}
