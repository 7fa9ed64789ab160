use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Git credential selection (§4.2, §9 "Duck-typed credentials").
///
/// Exactly one variant is ever active for a project; `None` is anonymous
/// access (public repositories over HTTPS).
#[derive(Clone, Serialize, Deserialize)]
pub enum Credentials {
    None,
    Token(String),
    UserPass(String, String),
    SshKey(Vec<u8>),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "Credentials::None"),
            Self::Token(_) => write!(f, "Credentials::Token(<redacted>)"),
            Self::UserPass(user, _) => write!(f, "Credentials::UserPass({user}, <redacted>)"),
            Self::SshKey(_) => write!(f, "Credentials::SshKey(<redacted>)"),
        }
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        match self {
            Self::Token(t) => t.zeroize(),
            Self::UserPass(_, p) => p.zeroize(),
            Self::SshKey(k) => k.zeroize(),
            Self::None => {}
        }
    }
}

/// SSH credential selection (§4.4, §9).
#[derive(Clone, Serialize, Deserialize)]
pub enum SshAuth {
    Password(String),
    Key(Vec<u8>),
}

impl std::fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => write!(f, "SshAuth::Password(<redacted>)"),
            Self::Key(_) => write!(f, "SshAuth::Key(<redacted>)"),
        }
    }
}

impl Drop for SshAuth {
    fn drop(&mut self) {
        match self {
            Self::Password(p) => p.zeroize(),
            Self::Key(k) => k.zeroize(),
        }
    }
}
