use dockhand_common::ProjectKind;

/// The subset of a project's configuration the Builder needs (§4.3).
#[derive(Clone, Debug)]
pub struct BuildConfig {
    pub project_kind: ProjectKind,
    pub auto_install: bool,
    pub install_command: Option<String>,
    pub build_command: String,
    pub output_dir: String,
}

impl BuildConfig {
    /// Resolves the effective install command: an explicit command wins,
    /// otherwise the project kind's default, otherwise none (§4.3 step 1).
    pub fn effective_install_command(&self) -> Option<String> {
        if !self.auto_install && self.install_command.is_none() {
            return None;
        }
        self.install_command
            .clone()
            .or_else(|| self.project_kind.default_install_command().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_install_command_wins_over_default() {
        let config = BuildConfig {
            project_kind: ProjectKind::Frontend,
            auto_install: true,
            install_command: Some("pnpm install".to_string()),
            build_command: "npm run build".to_string(),
            output_dir: "dist".to_string(),
        };
        assert_eq!(
            config.effective_install_command(),
            Some("pnpm install".to_string())
        );
    }

    #[test]
    fn backend_has_no_default_install_command() {
        let config = BuildConfig {
            project_kind: ProjectKind::Backend,
            auto_install: true,
            install_command: None,
            build_command: "cargo build --release".to_string(),
            output_dir: "target/release".to_string(),
        };
        assert_eq!(config.effective_install_command(), None);
    }

    #[test]
    fn no_install_when_auto_install_is_off_and_no_explicit_command() {
        let config = BuildConfig {
            project_kind: ProjectKind::Java,
            auto_install: false,
            install_command: None,
            build_command: "mvn package".to_string(),
            output_dir: "target".to_string(),
        };
        assert_eq!(config.effective_install_command(), None);
    }
}
