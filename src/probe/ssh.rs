//! `RemoteTransport` over the system OpenSSH client
//!
//! A session is an OpenSSH control master (`ControlMaster`/`ControlPersist`)
//! started in the background; every command afterwards is multiplexed over
//! that master's socket, so only `open` pays for the handshake. Password
//! authentication goes through `sshpass -e` with the secret passed in the
//! environment, never on the command line.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, trace};

use super::FailureKind;
use super::remote::{MetricCommand, RemoteTransport, TransportError};
use crate::config::{RemoteAccess, RemoteAuth};

/// ssh reserves exit status 255 for its own errors
const SSH_ERROR_STATUS: i32 = 255;
/// sshpass: "invalid/incorrect password"
const SSHPASS_BAD_PASSWORD: i32 = 5;

#[derive(Debug, Clone)]
pub struct SshTransport {
    control_dir: PathBuf,
    connect_timeout: Duration,
    persist: Duration,
}

/// An established control master for one host
#[derive(Debug, Clone)]
pub struct SshSession {
    access: RemoteAccess,
    control_path: PathBuf,
}

impl SshTransport {
    /// `control_dir` holds the control sockets and is created if missing
    pub fn new(control_dir: impl Into<PathBuf>, connect_timeout: Duration) -> std::io::Result<Self> {
        let control_dir = control_dir.into();
        std::fs::create_dir_all(&control_dir)?;

        Ok(Self {
            control_dir,
            connect_timeout,
            persist: Duration::from_secs(600),
        })
    }

    pub fn default_control_dir() -> PathBuf {
        std::env::temp_dir().join("hostwatch-ssh")
    }

    fn control_path(&self, access: &RemoteAccess) -> PathBuf {
        // short file name: unix socket paths are limited to ~100 bytes
        self.control_dir
            .join(format!(
                "{}@{}-{}",
                sanitize(&access.user),
                access.port,
                sanitize(&access.address)
            ))
    }

    /// Base invocation with authentication and connection options applied
    fn command(&self, access: &RemoteAccess, control_path: &Path) -> Command {
        let mut command = match &access.auth {
            RemoteAuth::Password(password) => {
                let mut command = Command::new("sshpass");
                command.arg("-e").arg("ssh").env("SSHPASS", password);
                command.args([
                    "-o",
                    "PreferredAuthentications=password,keyboard-interactive",
                    "-o",
                    "PubkeyAuthentication=no",
                ]);
                command
            }
            RemoteAuth::KeyPath(key) => {
                let mut command = Command::new("ssh");
                command
                    .arg("-i")
                    .arg(key)
                    .args(["-o", "IdentitiesOnly=yes", "-o", "BatchMode=yes"]);
                command
            }
        };

        command
            .arg("-p")
            .arg(access.port.to_string())
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .args(["-o", "ServerAliveInterval=15"])
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn master_alive(&self, session: &SshSession) -> bool {
        if !session.control_path.exists() {
            return false;
        }

        let mut command = self.command(&session.access, &session.control_path);
        command
            .args(["-O", "check"])
            .arg(destination(&session.access))
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        matches!(Self::output(command).await, Ok(output) if output.status.success())
    }

    async fn output(mut command: Command) -> Result<Output, TransportError> {
        command.output().await.map_err(|e| {
            TransportError::new(FailureKind::Connect, format!("cannot spawn ssh client: {e}"))
        })
    }
}

fn sanitize(address: &str) -> String {
    address
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

fn destination(access: &RemoteAccess) -> String {
    format!("{}@{}", access.user, access.address)
}

/// Map a failed ssh/sshpass invocation to a failure kind
pub fn classify(status: Option<i32>, stderr: &str) -> FailureKind {
    let lowered = stderr.to_lowercase();

    if status == Some(SSHPASS_BAD_PASSWORD)
        || lowered.contains("permission denied")
        || lowered.contains("authentication failed")
        || lowered.contains("too many authentication failures")
    {
        FailureKind::Auth
    } else if lowered.contains("timed out") {
        FailureKind::Timeout
    } else if status == Some(SSH_ERROR_STATUS) || status.is_none() {
        FailureKind::Connect
    } else {
        FailureKind::Command
    }
}

fn failure(output: &Output) -> TransportError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let status = output.status.code();
    let kind = classify(status, &stderr);

    let detail = stderr.trim().lines().last().unwrap_or_default().to_string();
    let message = match (detail.is_empty(), status) {
        (false, _) => detail,
        (true, Some(code)) => format!("exit status {code}"),
        (true, None) => "terminated by signal".to_string(),
    };
    TransportError::new(kind, message)
}

#[async_trait]
impl RemoteTransport for SshTransport {
    type Session = SshSession;

    #[instrument(skip_all, fields(host = %access.address))]
    async fn open(&self, access: &RemoteAccess) -> Result<SshSession, TransportError> {
        let control_path = self.control_path(access);
        let session = SshSession {
            access: access.clone(),
            control_path,
        };

        // a master left behind by a dropped session or an earlier run
        if self.master_alive(&session).await {
            debug!("reusing control master at {}", session.control_path.display());
            return Ok(session);
        }

        let mut command = self.command(access, &session.control_path);
        command
            .args(["-M", "-f", "-N"])
            .arg("-o")
            .arg(format!("ControlPersist={}", self.persist.as_secs()))
            .arg(destination(access))
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let output = Self::output(command).await?;
        if !output.status.success() {
            return Err(failure(&output));
        }

        debug!("control master ready at {}", session.control_path.display());
        Ok(session)
    }

    async fn execute(
        &self,
        session: &SshSession,
        commands: &[MetricCommand],
    ) -> Result<Vec<String>, TransportError> {
        let mut outputs = Vec::with_capacity(commands.len());

        for metric in commands {
            trace!("running {:?}", metric);
            let mut command = self.command(&session.access, &session.control_path);
            command
                .args(["-o", "ControlMaster=no"])
                .arg(destination(&session.access))
                .arg("--")
                .arg(metric.command_line())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());

            let output = Self::output(command).await?;
            if !output.status.success() {
                let mut err = failure(&output);
                err.message = format!("{}: {}", metric.metric(), err.message);
                return Err(err);
            }
            outputs.push(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        Ok(outputs)
    }

    async fn close(&self, session: SshSession) {
        let mut command = self.command(&session.access, &session.control_path);
        command
            .args(["-O", "exit"])
            .arg(destination(&session.access))
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if let Err(e) = Self::output(command).await {
            debug!("closing control master failed: {e}");
        }
    }
}
