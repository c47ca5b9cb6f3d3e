use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use ssh2::Session;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::models::HostCredential;
use crate::security::redact_text;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandResult {
    pub fn combined_output(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// One open remote shell. Commands run one at a time and block until the
/// remote side exits; nothing is retried and no per-command timeout applies.
pub trait RemoteShell: Send {
    /// Runs `command`. With `elevate` the command goes through `sudo -S` and the
    /// login password is written to its stdin, so elevation only works when the
    /// login password is also the sudo password.
    fn run(&mut self, command: &str, elevate: bool) -> Result<CommandResult, SessionError>;

    /// Host key fingerprint of the peer, when the transport exposes one.
    fn fingerprint(&self) -> Option<String> {
        None
    }

    /// Closes the session. Calling it more than once is a no-op.
    fn close(&mut self);
}

/// Opens remote shells for host credentials.
pub trait ShellConnector: Send + Sync {
    fn connect(&self, credential: &HostCredential) -> Result<Box<dyn RemoteShell>, SessionError>;
}

#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
}

impl SshConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl ShellConnector for SshConnector {
    fn connect(&self, credential: &HostCredential) -> Result<Box<dyn RemoteShell>, SessionError> {
        let session = SshSession::connect(credential, self.connect_timeout)?;
        Ok(Box::new(session))
    }
}

pub struct SshSession {
    session: Option<Session>,
    address: String,
    password: String,
    fingerprint: String,
}

impl SshSession {
    pub fn connect(credential: &HostCredential, timeout: Duration) -> Result<Self, SessionError> {
        let socket_address = format!("{}:{}", credential.host, credential.port);
        let resolved_socket = socket_address
            .to_socket_addrs()
            .map_err(|error| {
                SessionError::Connect(format!(
                    "Failed to resolve host `{socket_address}`: {error}"
                ))
            })?
            .next()
            .ok_or_else(|| {
                SessionError::Connect(format!("No resolved socket address for `{socket_address}`"))
            })?;

        let tcp_stream = TcpStream::connect_timeout(&resolved_socket, timeout).map_err(|error| {
            SessionError::Connect(format!(
                "Failed to establish TCP connection to `{socket_address}`: {error}"
            ))
        })?;

        let mut session = Session::new().map_err(|error| {
            SessionError::Connect(format!("Failed to initialize SSH session: {error}"))
        })?;
        session.set_tcp_stream(tcp_stream);
        session.set_timeout(timeout.as_millis().min(u128::from(u32::MAX)) as u32);
        session.handshake().map_err(|error| {
            SessionError::Connect(format!("SSH handshake failed for `{socket_address}`: {error}"))
        })?;

        let fingerprint = host_key_fingerprint(&session)?;

        session
            .userauth_password(&credential.username, &credential.password)
            .map_err(|error| {
                SessionError::Connect(format!("SSH password authentication failed: {error}"))
            })?;
        if !session.authenticated() {
            return Err(SessionError::Connect(
                "SSH authentication was rejected by the server".to_string(),
            ));
        }

        // Only the connect phase is bounded; commands may run as long as they need.
        session.set_timeout(0);

        info!(host = %socket_address, user = %credential.username, "ssh session opened");
        Ok(Self {
            session: Some(session),
            address: socket_address,
            password: credential.password.clone(),
            fingerprint,
        })
    }
}

impl RemoteShell for SshSession {
    fn run(&mut self, command: &str, elevate: bool) -> Result<CommandResult, SessionError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| SessionError::Command(format!("Session to `{}` is closed", self.address)))?;

        let wrapped_command = wrap_command(command, elevate);
        debug!(
            host = %self.address,
            command = %redact_text(&wrapped_command, std::slice::from_ref(&self.password)),
            "running remote command"
        );
        let stdin_password = elevate.then_some(self.password.as_str());
        let result = run_raw_command_via_libssh2(session, &wrapped_command, stdin_password)?;
        debug!(host = %self.address, exit_status = result.exit_status, "remote command finished");

        Ok(CommandResult {
            command: command.to_string(),
            ..result
        })
    }

    fn fingerprint(&self) -> Option<String> {
        Some(self.fingerprint.clone())
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "closing", None);
            info!(host = %self.address, "ssh session closed");
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.close();
    }
}

pub fn wrap_command(command: &str, elevate: bool) -> String {
    if elevate {
        format!("sudo -S -p '' bash -c '{}'", single_quote_escape(command))
    } else {
        command.to_string()
    }
}

fn run_raw_command_via_libssh2(
    session: &Session,
    command: &str,
    stdin_password: Option<&str>,
) -> Result<CommandResult, SessionError> {
    let mut channel = session
        .channel_session()
        .map_err(|error| SessionError::Command(format!("Failed to open SSH channel: {error}")))?;
    channel.exec(command).map_err(|error| {
        SessionError::Command(format!("Failed to execute remote command: {error}"))
    })?;

    if let Some(password) = stdin_password {
        channel
            .write_all(format!("{password}\n").as_bytes())
            .map_err(|error| SessionError::Command(format!("Failed to send sudo password: {error}")))?;
        channel.flush().map_err(|error| {
            SessionError::Command(format!(
                "Failed to flush sudo password to remote channel: {error}"
            ))
        })?;
        channel.send_eof().map_err(|error| {
            SessionError::Command(format!("Failed to close remote stdin: {error}"))
        })?;
    }

    let mut stdout = String::new();
    let mut stderr = String::new();

    channel
        .read_to_string(&mut stdout)
        .map_err(|error| SessionError::Command(format!("Failed to read SSH stdout: {error}")))?;
    channel
        .stderr()
        .read_to_string(&mut stderr)
        .map_err(|error| SessionError::Command(format!("Failed to read SSH stderr: {error}")))?;

    channel.wait_close().map_err(|error| {
        SessionError::Command(format!("Failed while waiting for SSH command close: {error}"))
    })?;

    let exit_status = channel.exit_status().map_err(|error| {
        SessionError::Command(format!("Failed to obtain SSH exit status: {error}"))
    })?;

    Ok(CommandResult {
        command: command.to_string(),
        stdout,
        stderr,
        exit_status,
    })
}

fn host_key_fingerprint(session: &Session) -> Result<String, SessionError> {
    let (host_key, _host_key_type) = session.host_key().ok_or_else(|| {
        SessionError::Connect("SSH session did not provide host key bytes".to_string())
    })?;
    let digest = Sha256::digest(host_key);
    let encoded = STANDARD_NO_PAD.encode(digest);
    Ok(format!("SHA256:{encoded}"))
}

fn single_quote_escape(value: &str) -> String {
    value.replace('\'', "'\"'\"'")
}

#[cfg(test)]
mod tests {
    use super::{wrap_command, CommandResult};

    #[test]
    fn elevated_commands_read_password_from_stdin() {
        assert_eq!(wrap_command("nginx -t", true), "sudo -S -p '' bash -c 'nginx -t'");
        assert_eq!(wrap_command("nginx -t", false), "nginx -t");
    }

    #[test]
    fn elevated_commands_escape_single_quotes() {
        let wrapped = wrap_command("mysql -e \"SHOW DATABASES LIKE 'wp';\"", true);
        assert_eq!(
            wrapped,
            "sudo -S -p '' bash -c 'mysql -e \"SHOW DATABASES LIKE '\"'\"'wp'\"'\"';\"'"
        );
    }

    #[test]
    fn combined_output_joins_stdout_and_stderr() {
        let result = CommandResult {
            command: "nginx -t".into(),
            stdout: "a\n".into(),
            stderr: "b\n".into(),
            exit_status: 0,
        };
        assert_eq!(result.combined_output(), "a\nb\n");
    }
}
