use serde_json::{json, Value};

use crate::ssh_client::RemoteShell;
use crate::utils::{binary_probe, probe_error, service_probe};

pub fn check_bind_binary(shell: &mut dyn RemoteShell) -> Value {
    binary_probe(shell, "named", "Checking DNS Binary", "Bind9 binary not found")
}

pub fn check_bind_service(shell: &mut dyn RemoteShell) -> Value {
    service_probe(shell, "bind9", "Checking DNS Service", "Bind9 service not running")
}

/// The local resolver's answer for `domain` must contain `expected_ip`.
/// Containment rather than equality tolerates extra answers and trailing dots.
pub fn check_forward_dns(shell: &mut dyn RemoteShell, domain: &str, expected_ip: &str) -> Value {
    let step = "Checking Forward DNS";
    match shell.run(&format!("dig {domain} @localhost +short"), false) {
        Ok(result) => {
            let resolved = result.stdout.trim().to_string();
            let correct = resolved.contains(expected_ip);
            json!({
                "step": step,
                "status": correct,
                "domain": domain,
                "expected_ip": expected_ip,
                "actual_ip": resolved,
                "message": if correct { None } else { Some("Forward DNS mismatch") },
            })
        }
        Err(error) => probe_error(step, error),
    }
}

pub fn check_reverse_dns(shell: &mut dyn RemoteShell, ip_address: &str, expected_domain: &str) -> Value {
    let step = "Checking Reverse DNS";
    match shell.run(&format!("dig -x {ip_address} @localhost +short"), false) {
        Ok(result) => {
            let resolved = result.stdout.trim().to_string();
            let correct = resolved.contains(expected_domain);
            json!({
                "step": step,
                "status": correct,
                "ip": ip_address,
                "expected_domain": expected_domain,
                "actual_domain": resolved,
                "message": if correct { None } else { Some("Reverse DNS mismatch") },
            })
        }
        Err(error) => probe_error(step, error),
    }
}

#[cfg(test)]
mod tests {
    use super::{check_forward_dns, check_reverse_dns};
    use crate::test_support::ScriptedHost;
    use serde_json::json;

    #[test]
    fn answers_are_matched_by_containment() {
        let mut shell = ScriptedHost::new()
            .ok("dig ukk.lab @localhost +short", "192.168.10.5\n")
            .ok("dig -x 192.168.10.5 @localhost +short", "ukk.lab.\n")
            .into_shell("ubuntu");
        assert_eq!(check_forward_dns(shell.as_mut(), "ukk.lab", "192.168.10.5")["status"], json!(true));
        assert_eq!(check_reverse_dns(shell.as_mut(), "192.168.10.5", "ukk.lab")["status"], json!(true));
    }

    #[test]
    fn empty_answer_is_a_mismatch() {
        let mut shell = ScriptedHost::new()
            .ok("dig ukk.lab @localhost +short", "")
            .into_shell("ubuntu");
        let raw = check_forward_dns(shell.as_mut(), "ukk.lab", "192.168.10.5");
        assert_eq!(raw["status"], json!(false));
        assert_eq!(raw["message"], json!("Forward DNS mismatch"));
    }
}
