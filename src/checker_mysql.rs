use serde_json::{json, Value};

use crate::ssh_client::RemoteShell;
use crate::utils::{binary_probe, probe_error, service_probe};

pub const DEFAULT_ADMIN_USER: &str = "root";

/// How administrative queries log into the database server.
///
/// Without a password the query runs as the OS superuser through elevation
/// (socket authentication); an empty password logs in directly with no `-p`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlAdmin {
    pub user: String,
    pub password: Option<String>,
}

impl Default for MysqlAdmin {
    fn default() -> Self {
        Self {
            user: DEFAULT_ADMIN_USER.to_string(),
            password: None,
        }
    }
}

impl MysqlAdmin {
    /// Command line for `query` plus whether it needs elevation.
    pub fn command(&self, query: &str) -> (String, bool) {
        match self.password.as_deref() {
            None => (format!("mysql -u {} -e \"{query}\"", self.user), true),
            Some("") => (format!("mysql -u {} -e \"{query}\"", self.user), false),
            Some(password) => (
                format!("mysql -u {} -p\"{password}\" -e \"{query}\"", self.user),
                false,
            ),
        }
    }
}

pub fn check_mysql_binary(shell: &mut dyn RemoteShell) -> Value {
    binary_probe(shell, "mysql", "Checking MySQL Binary", "MySQL binary not found")
}

pub fn check_mysql_service(shell: &mut dyn RemoteShell) -> Value {
    service_probe(shell, "mysql", "Checking MySQL Service", "MySQL service not running")
}

pub fn check_database_exists(shell: &mut dyn RemoteShell, db_name: &str, admin: &MysqlAdmin) -> Value {
    let step = "Checking Database Exists";
    let (command, elevate) = admin.command(&format!("SHOW DATABASES LIKE '{db_name}';"));
    match shell.run(&command, elevate) {
        Ok(result) => {
            let exists = result.stdout.contains(db_name);
            json!({
                "step": step,
                "status": exists,
                "database": db_name,
                "message": if exists { None } else { Some(format!("DB '{db_name}' not found")) },
            })
        }
        Err(error) => probe_error(step, error),
    }
}

pub fn check_database_user_exists(shell: &mut dyn RemoteShell, db_user: &str, admin: &MysqlAdmin) -> Value {
    let step = "Checking Database User Exists";
    let (command, elevate) =
        admin.command(&format!("SELECT User FROM mysql.user WHERE User = '{db_user}';"));
    match shell.run(&command, elevate) {
        Ok(result) => {
            let exists = result.stdout.contains(db_user);
            json!({
                "step": step,
                "status": exists,
                "db_user": db_user,
                "message": if exists { None } else { Some(format!("User '{db_user}' not found")) },
            })
        }
        Err(error) => probe_error(step, error),
    }
}

/// Logs in with the application's own credentials and selects its database.
/// Passing proves the path the application uses, not just admin visibility.
pub fn check_app_connection(
    shell: &mut dyn RemoteShell,
    db_name: &str,
    db_user: &str,
    db_password: &str,
) -> Value {
    let step = "Checking Application Database Connection";
    let command = format!("mysql -u {db_user} -p\"{db_password}\" -e \"USE {db_name};\"");
    match shell.run(&command, false) {
        Ok(result) => {
            let success = result.exit_status == 0;
            json!({
                "step": step,
                "status": success,
                "exit_status": result.exit_status,
                "message": if success { None } else { Some(result.stderr.trim().to_string()) },
            })
        }
        Err(error) => probe_error(step, error),
    }
}
