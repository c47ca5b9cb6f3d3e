use serde_json::{json, Value};

use crate::ssh_client::RemoteShell;
use crate::utils::{
    binary_probe, output_contains_nginx_syntax_ok, probe_error, service_probe,
    NGINX_CONFIG_TEST_COMMAND,
};

pub fn check_nginx_binary(shell: &mut dyn RemoteShell) -> Value {
    binary_probe(shell, "nginx", "Checking Nginx Binary", "Nginx binary not found")
}

pub fn check_nginx_service(shell: &mut dyn RemoteShell) -> Value {
    service_probe(shell, "nginx", "Checking Nginx Service", "Nginx service not running")
}

/// Runs `nginx -t` with elevation. Passing needs both the "syntax is ok" and
/// the "test is successful" lines.
pub fn check_nginx_config_syntax(shell: &mut dyn RemoteShell) -> Value {
    let step = "Checking Nginx Config Syntax";
    match shell.run(NGINX_CONFIG_TEST_COMMAND, true) {
        Ok(result) => {
            let success = output_contains_nginx_syntax_ok(&result.stdout, &result.stderr);
            json!({
                "step": step,
                "status": success,
                "output": result.combined_output().trim(),
                "message": if success { None } else { Some("Nginx configuration test failed") },
            })
        }
        Err(error) => probe_error(step, error),
    }
}

#[cfg(test)]
mod tests {
    use super::{check_nginx_config_syntax, check_nginx_service};
    use crate::test_support::ScriptedHost;
    use serde_json::json;

    const SYNTAX_OK: &str = "nginx: the configuration file /etc/nginx/nginx.conf syntax is ok\n";
    const TEST_OK: &str = "nginx: configuration file /etc/nginx/nginx.conf test is successful\n";

    #[test]
    fn syntax_check_needs_both_markers() {
        let mut passing = ScriptedHost::new()
            .output("nginx -t", "", &format!("{SYNTAX_OK}{TEST_OK}"), 0)
            .into_shell("ubuntu");
        assert_eq!(check_nginx_config_syntax(passing.as_mut())["status"], json!(true));

        let mut half = ScriptedHost::new()
            .output("nginx -t", "", SYNTAX_OK, 1)
            .into_shell("ubuntu");
        let raw = check_nginx_config_syntax(half.as_mut());
        assert_eq!(raw["status"], json!(false));
        assert_eq!(raw["message"], json!("Nginx configuration test failed"));
    }

    #[test]
    fn inactive_service_fails() {
        let mut shell = ScriptedHost::new()
            .ok("systemctl is-active nginx", "inactive\n")
            .into_shell("ubuntu");
        let raw = check_nginx_service(shell.as_mut());
        assert_eq!(raw["status"], json!(false));
        assert_eq!(raw["value"], json!("inactive"));
    }
}
