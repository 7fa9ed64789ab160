use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Determines the default install command and the expected upload file
/// extension (§4.3, §4.7).
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ProjectKind {
    Frontend,
    Backend,
    Java,
}

impl ProjectKind {
    /// The default install command when `auto_install` is set and no
    /// explicit command is configured (§4.3 step 1).
    pub fn default_install_command(self) -> Option<&'static str> {
        match self {
            Self::Frontend => Some("npm install"),
            Self::Java => Some("mvn dependency:resolve"),
            Self::Backend => None,
        }
    }

    /// The file extension an UPLOAD deployment's artifact must carry
    /// (§4.7 kind == UPLOAD).
    pub fn expected_upload_extension(self) -> &'static str {
        match self {
            Self::Frontend => "zip",
            Self::Backend => "zip",
            Self::Java => "jar",
        }
    }
}

/// Health-check probe kind (§4.5).
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum HealthCheckType {
    Http,
    Tcp,
    Command,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_install_commands_match_project_kind() {
        assert_eq!(
            ProjectKind::Frontend.default_install_command(),
            Some("npm install")
        );
        assert_eq!(
            ProjectKind::Java.default_install_command(),
            Some("mvn dependency:resolve")
        );
        assert_eq!(ProjectKind::Backend.default_install_command(), None);
    }

    #[test]
    fn upload_extension_matches_project_kind() {
        assert_eq!(ProjectKind::Frontend.expected_upload_extension(), "zip");
        assert_eq!(ProjectKind::Java.expected_upload_extension(), "jar");
    }
}
