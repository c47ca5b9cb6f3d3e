use std::fmt::Display;

use serde_json::{json, Value};

use crate::ssh_client::RemoteShell;

pub const INVENTORY_COMMAND: &str = "hostname && qm list";
pub const PHP_MODULES_COMMAND: &str = "php -m";
pub const NGINX_CONFIG_TEST_COMMAND: &str = "nginx -t";
pub const NGINX_SYNTAX_OK_MARKER: &str = "syntax is ok";
pub const NGINX_TEST_SUCCESSFUL_MARKER: &str = "test is successful";
pub const DEFAULT_PHP_MODULES: &[&str] = &[
    "mysqli", "curl", "gd", "mbstring", "xml", "json", "zip", "openssl", "exif", "fileinfo",
    "intl",
];

pub fn vm_config_command(vmid: &str) -> String {
    format!("cat /etc/pve/qemu-server/{vmid}.conf")
}

pub fn vm_status_command(vmid: &str) -> String {
    format!("qm status {vmid}")
}

pub fn which_command(binary: &str) -> String {
    format!("which {binary}")
}

pub fn service_active_command(service: &str) -> String {
    format!("systemctl is-active {service}")
}

/// Raw outcome of a probe whose underlying call failed. The non-boolean status
/// makes the check an errored one.
pub fn probe_error(step: &str, error: impl Display) -> Value {
    json!({
        "step": step,
        "status": "error",
        "message": error.to_string(),
    })
}

/// `which <binary>` succeeds when it prints a path.
pub fn binary_probe(shell: &mut dyn RemoteShell, binary: &str, step: &str, missing_message: &str) -> Value {
    match shell.run(&which_command(binary), false) {
        Ok(result) => {
            let path = result.stdout.trim().to_string();
            let found = !path.is_empty();
            json!({
                "step": step,
                "status": found,
                "path": if found { Some(path) } else { None },
                "message": if found { None } else { Some(missing_message) },
            })
        }
        Err(error) => probe_error(step, error),
    }
}

/// `systemctl is-active <service>` succeeds on exactly `active`.
pub fn service_probe(shell: &mut dyn RemoteShell, service: &str, step: &str, inactive_message: &str) -> Value {
    match shell.run(&service_active_command(service), false) {
        Ok(result) => {
            let state = result.stdout.trim().to_string();
            let active = state == "active";
            json!({
                "step": step,
                "status": active,
                "value": state,
                "message": if active { None } else { Some(inactive_message) },
            })
        }
        Err(error) => probe_error(step, error),
    }
}

/// Both nginx markers must be present; either one alone is not a pass.
pub fn output_contains_nginx_syntax_ok(stdout: &str, stderr: &str) -> bool {
    let joined = format!("{stdout}{stderr}");
    joined.contains(NGINX_SYNTAX_OK_MARKER) && joined.contains(NGINX_TEST_SUCCESSFUL_MARKER)
}

#[cfg(test)]
mod tests {
    use super::output_contains_nginx_syntax_ok;

    #[test]
    fn nginx_markers_are_both_required() {
        let ok = "nginx: the configuration file /etc/nginx/nginx.conf syntax is ok\n";
        let successful = "nginx: configuration file /etc/nginx/nginx.conf test is successful\n";
        assert!(output_contains_nginx_syntax_ok("", &format!("{ok}{successful}")));
        assert!(output_contains_nginx_syntax_ok(ok, successful));
        assert!(!output_contains_nginx_syntax_ok("", ok));
        assert!(!output_contains_nginx_syntax_ok(successful, ""));
    }
}
