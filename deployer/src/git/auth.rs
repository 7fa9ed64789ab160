use std::io::Write;
use std::os::unix::fs::PermissionsExt;

use dockhand_common::Credentials;
use tempfile::NamedTempFile;

use super::error::GitError;

/// URLs starting with these forms are SSH-style and must use the SSHKey
/// credential path regardless of what the project configured (§4.2).
fn is_ssh_style(url: &str) -> bool {
    url.starts_with("git@") || url.starts_with("ssh://")
}

/// Materialized auxiliary state a single `git` invocation needs: extra
/// environment variables and any temp files (key, askpass script) that must
/// outlive the `git` child process. Every file here is unlinked when this
/// value is dropped, success or failure (§4.2).
pub struct GitEnv {
    pub env: Vec<(String, String)>,
    _temp_files: Vec<NamedTempFile>,
}

impl GitEnv {
    /// Builds the environment for a `git` invocation against `url` using
    /// `credentials`. SSH-style URLs force the SSHKey path; HTTPS-style URLs
    /// use a process-scoped credential helper for Token/UserPass.
    pub fn prepare(url: &str, credentials: &Credentials) -> Result<Self, GitError> {
        let mut env = vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];

        if is_ssh_style(url) {
            let key_bytes = match credentials {
                Credentials::SshKey(bytes) => bytes,
                _ => {
                    return Err(GitError::Unknown(
                        "SSH-style URL requires SSH key credentials".to_string(),
                    ))
                }
            };

            let mut temp = NamedTempFile::new()
                .map_err(|e| GitError::Unknown(format!("failed to create key file: {e}")))?;
            temp.write_all(key_bytes)
                .map_err(|e| GitError::Unknown(format!("failed to write key file: {e}")))?;
            temp.flush()
                .map_err(|e| GitError::Unknown(format!("failed to flush key file: {e}")))?;

            let mut perms = std::fs::metadata(temp.path())
                .map_err(|e| GitError::Unknown(e.to_string()))?
                .permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(temp.path(), perms)
                .map_err(|e| GitError::Unknown(e.to_string()))?;

            let key_path = temp
                .path()
                .to_str()
                .ok_or_else(|| GitError::Unknown("non-utf8 key path".to_string()))?;

            env.push((
                "GIT_SSH_COMMAND".to_string(),
                format!("ssh -i '{key_path}' -o StrictHostKeyChecking=no -o IdentitiesOnly=yes"),
            ));

            Ok(Self {
                env,
                _temp_files: vec![temp],
            })
        } else {
            let mut temp_files = Vec::new();
            match credentials {
                Credentials::None => {}
                Credentials::Token(token) => {
                    env.push(("GIT_ASKPASS_TOKEN".to_string(), token.clone()));
                    let (path, script) = askpass_script_for("oauth2", "GIT_ASKPASS_TOKEN")?;
                    env.push(("GIT_ASKPASS".to_string(), path));
                    temp_files.push(script);
                }
                Credentials::UserPass(username, password) => {
                    env.push(("GIT_ASKPASS_USER".to_string(), username.clone()));
                    env.push(("GIT_ASKPASS_PASS".to_string(), password.clone()));
                    let (path, script) = askpass_script_user_pass()?;
                    env.push(("GIT_ASKPASS".to_string(), path));
                    temp_files.push(script);
                }
                Credentials::SshKey(_) => {
                    return Err(GitError::Unknown(
                        "SSH key credentials require an SSH-style URL".to_string(),
                    ))
                }
            }
            Ok(Self {
                env,
                _temp_files: temp_files,
            })
        }
    }
}

/// Writes a tiny shell script used as `GIT_ASKPASS`: git calls it once per
/// prompt ("Username for..." / "Password for...") and reads the answer from
/// stdout. Returning the token as password and `oauth2` as username matches
/// a bearer-token credential helper's conventional answers (§4.2).
fn askpass_script_for(
    username: &str,
    token_env: &str,
) -> Result<(String, NamedTempFile), GitError> {
    let script = format!(
        "#!/bin/sh\ncase \"$1\" in\n  Username*) echo '{username}' ;;\n  Password*) echo \"${token_env}\" ;;\nesac\n"
    );
    write_askpass_script(&script)
}

fn askpass_script_user_pass() -> Result<(String, NamedTempFile), GitError> {
    let script = "#!/bin/sh\ncase \"$1\" in\n  Username*) echo \"$GIT_ASKPASS_USER\" ;;\n  Password*) echo \"$GIT_ASKPASS_PASS\" ;;\nesac\n".to_string();
    write_askpass_script(&script)
}

/// Writes the script and returns its path alongside the owning temp-file
/// handle — the caller must keep the handle alive for as long as `git` may
/// invoke the script, and dropping it unlinks the file.
fn write_askpass_script(script: &str) -> Result<(String, NamedTempFile), GitError> {
    let mut temp = NamedTempFile::new()
        .map_err(|e| GitError::Unknown(format!("failed to create askpass script: {e}")))?;
    temp.write_all(script.as_bytes())
        .map_err(|e| GitError::Unknown(e.to_string()))?;
    temp.flush().map_err(|e| GitError::Unknown(e.to_string()))?;

    let mut perms = std::fs::metadata(temp.path())
        .map_err(|e| GitError::Unknown(e.to_string()))?
        .permissions();
    perms.set_mode(0o700);
    std::fs::set_permissions(temp.path(), perms).map_err(|e| GitError::Unknown(e.to_string()))?;

    let path = temp
        .path()
        .to_str()
        .ok_or_else(|| GitError::Unknown("non-utf8 askpass path".to_string()))?
        .to_string();

    Ok((path, temp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_style_detection() {
        assert!(is_ssh_style("git@github.com:org/repo.git"));
        assert!(is_ssh_style("ssh://git@github.com/org/repo.git"));
        assert!(!is_ssh_style("https://github.com/org/repo.git"));
    }

    #[test]
    fn ssh_url_with_non_key_credentials_is_rejected() {
        let result = GitEnv::prepare("git@github.com:org/repo.git", &Credentials::None);
        assert!(result.is_err());
    }

    #[test]
    fn https_url_with_key_credentials_is_rejected() {
        let result = GitEnv::prepare(
            "https://github.com/org/repo.git",
            &Credentials::SshKey(vec![1, 2, 3]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn token_credentials_produce_an_askpass_env() {
        let env = GitEnv::prepare(
            "https://github.com/org/repo.git",
            &Credentials::Token("secret".to_string()),
        )
        .unwrap();
        assert!(env.env.iter().any(|(k, _)| k == "GIT_ASKPASS"));
    }
}
