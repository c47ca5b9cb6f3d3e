use serde_json::{json, Map, Value};

use crate::ssh_client::RemoteShell;
use crate::utils::{binary_probe, probe_error, DEFAULT_PHP_MODULES, PHP_MODULES_COMMAND};

pub fn check_php_binary(shell: &mut dyn RemoteShell, binary: &str) -> Value {
    binary_probe(shell, binary, "Checking PHP Binary", "PHP binary not found")
}

/// Module names expected by the test spec: a list of names, or a map whose `true`
/// entries are expected. Anything else falls back to the default module set.
pub fn expected_modules(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, enabled)| enabled.as_bool().unwrap_or(false))
            .map(|(name, _)| name.clone())
            .collect(),
        _ => DEFAULT_PHP_MODULES.iter().map(|name| name.to_string()).collect(),
    }
}

/// Every expected module must appear in `php -m`. Extra installed modules do
/// not matter.
pub fn check_php_modules(shell: &mut dyn RemoteShell, modules_expected: &[String]) -> Value {
    let step = "Checking PHP Modules";
    let result = match shell.run(PHP_MODULES_COMMAND, false) {
        Ok(result) => result,
        Err(error) => return probe_error(step, error),
    };

    let installed = result
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();

    let mut comparison = Map::new();
    let mut missing = Vec::new();
    for module in modules_expected {
        let present = installed.contains(&module.as_str());
        if !present {
            missing.push(module.clone());
        }
        comparison.insert(
            module.clone(),
            json!({"expected": true, "actual": present, "status": present}),
        );
    }

    let all_present = missing.is_empty();
    json!({
        "step": step,
        "status": all_present,
        "modules": comparison,
        "message": if all_present {
            None
        } else {
            Some(format!("Missing PHP modules: {}", missing.join(", ")))
        },
    })
}
