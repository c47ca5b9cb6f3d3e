//! In-memory stand-ins for SSH hosts and the CMS login endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::checker_cms::{CmsTarget, LoginClient, LoginResponse};
use crate::error::SessionError;
use crate::models::HostCredential;
use crate::ssh_client::{CommandResult, RemoteShell, ShellConnector};

type Journal = Arc<Mutex<Vec<String>>>;
type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
enum Reply {
    Output { stdout: String, stderr: String, exit_status: i32 },
    Fail(String),
}

/// Canned replies for one host, keyed by the exact command text.
#[derive(Clone, Default)]
pub struct ScriptedHost {
    replies: HashMap<String, Reply>,
    hooks: HashMap<String, Hook>,
    fingerprint: Option<String>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(self, command: &str, stdout: &str) -> Self {
        self.output(command, stdout, "", 0)
    }

    pub fn output(mut self, command: &str, stdout: &str, stderr: &str, exit_status: i32) -> Self {
        self.replies.insert(
            command.to_string(),
            Reply::Output {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_status,
            },
        );
        self
    }

    pub fn fail(mut self, command: &str, message: &str) -> Self {
        self.replies
            .insert(command.to_string(), Reply::Fail(message.to_string()));
        self
    }

    /// Runs `hook` whenever `command` is executed.
    pub fn on_run(mut self, command: &str, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.insert(command.to_string(), Arc::new(hook));
        self
    }

    pub fn fingerprint(mut self, fingerprint: &str) -> Self {
        self.fingerprint = Some(fingerprint.to_string());
        self
    }

    pub fn into_shell(self, host: &str) -> Box<dyn RemoteShell> {
        Box::new(ScriptedShell {
            host: host.to_string(),
            script: self,
            journal: Arc::new(Mutex::new(Vec::new())),
            closed: false,
        })
    }
}

struct ScriptedShell {
    host: String,
    script: ScriptedHost,
    journal: Journal,
    closed: bool,
}

impl RemoteShell for ScriptedShell {
    fn run(&mut self, command: &str, elevate: bool) -> Result<CommandResult, SessionError> {
        let marker = if elevate { "sudo " } else { "" };
        self.journal
            .lock()
            .unwrap()
            .push(format!("run {} {marker}{command}", self.host));
        if let Some(hook) = self.script.hooks.get(command) {
            hook();
        }
        match self.script.replies.get(command) {
            Some(Reply::Output { stdout, stderr, exit_status }) => Ok(CommandResult {
                command: command.to_string(),
                stdout: stdout.clone(),
                stderr: stderr.clone(),
                exit_status: *exit_status,
            }),
            Some(Reply::Fail(message)) => Err(SessionError::Command(message.clone())),
            None => Ok(CommandResult {
                command: command.to_string(),
                stdout: String::new(),
                stderr: format!("{command}: command not found"),
                exit_status: 127,
            }),
        }
    }

    fn fingerprint(&self) -> Option<String> {
        self.script.fingerprint.clone()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.journal.lock().unwrap().push(format!("close {}", self.host));
        }
    }
}

/// Hands out scripted shells by host name and records every connect, command
/// and close in a shared journal.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    hosts: HashMap<String, Result<ScriptedHost, String>>,
    journal: Journal,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, script: ScriptedHost) -> Self {
        self.hosts.insert(host.to_string(), Ok(script));
        self
    }

    pub fn refuse(mut self, host: &str, message: &str) -> Self {
        self.hosts.insert(host.to_string(), Err(message.to_string()));
        self
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

impl ShellConnector for ScriptedConnector {
    fn connect(&self, credential: &HostCredential) -> Result<Box<dyn RemoteShell>, SessionError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("connect {}", credential.host));
        match self.hosts.get(&credential.host) {
            Some(Ok(script)) => Ok(Box::new(ScriptedShell {
                host: credential.host.clone(),
                script: script.clone(),
                journal: self.journal.clone(),
                closed: false,
            })),
            Some(Err(message)) => Err(SessionError::Connect(message.clone())),
            None => Err(SessionError::Connect(format!(
                "Failed to resolve host `{}:{}`",
                credential.host, credential.port
            ))),
        }
    }
}

/// Login client that answers every attempt with the same response.
pub struct FixedLoginClient {
    response: Result<LoginResponse, String>,
}

impl FixedLoginClient {
    pub fn new(response: Result<LoginResponse, String>) -> Self {
        Self { response }
    }

    pub fn dashboard() -> Self {
        Self::new(Ok(LoginResponse {
            final_url: "http://10.0.0.20/wp-admin/".to_string(),
            status_code: 200,
            cookie_names: vec!["wordpress_logged_in_abc123".to_string()],
            body: "<title>Dashboard</title>".to_string(),
        }))
    }
}

impl LoginClient for FixedLoginClient {
    fn login(&self, _target: &CmsTarget) -> Result<LoginResponse, String> {
        self.response.clone()
    }
}
