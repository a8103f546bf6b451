//! Table-driven manager that shells out to a package manager's CLI.
//!
//! Every built-in manager is a [`ManagerSpec`] describing its binary, the
//! argument lists for each operation, how to parse its list output, and
//! which failure messages actually mean "already done".

use crate::error::{Error, ErrorCategory, Result};
use crate::manager::{CheckHealth, Info, PackageManager, Search, SelfInstall, Upgrade};
use crate::retry::{LogCallback, with_retry};
use crate::types::{InstalledPackage, PackageInfo, RetryConfig};
use declarative::{CommandOutput, CommandSpec, Env, HealthReport};
use regex::Regex;
use std::time::Duration;

/// Placeholder replaced by the package name in argument lists
pub const PACKAGE_PLACEHOLDER: &str = "{package}";

/// Timeout for list, search and info commands
const QUERY_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for install, uninstall and upgrade commands
const MUTATE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How a manager's list output is turned into packages.
#[derive(Debug, Clone, Copy)]
pub enum ListFormat {
    /// One package per line. `pattern` must capture `name` and may capture
    /// `version`; lines that do not match are ignored.
    Lines {
        /// Regex applied to each trimmed line
        pattern: &'static str,
        /// Ignore lines starting with whitespace (detail lines)
        skip_indented: bool,
    },
    /// A JSON object whose `field` maps names to objects with a `version`.
    JsonMap {
        /// Top-level key holding the map
        field: &'static str,
    },
}

/// How a manager's info output is parsed.
#[derive(Debug, Clone, Copy)]
pub enum InfoFormat {
    /// `brew info --json=v2`
    BrewJson,
    /// `npm view --json`
    NpmJson,
}

/// An operation's argument list and the messages that mean success.
#[derive(Debug, Clone, Copy)]
pub struct CommandTemplate {
    /// Arguments after the binary; may contain [`PACKAGE_PLACEHOLDER`]
    pub args: &'static [&'static str],
    /// Case-insensitive output fragments treated as success on failure
    pub idempotent: &'static [&'static str],
}

impl CommandTemplate {
    /// Arguments with the placeholder replaced.
    pub fn render(&self, package: Option<&str>) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| match package {
                Some(name) => arg.replace(PACKAGE_PLACEHOLDER, name),
                None => (*arg).to_string(),
            })
            .collect()
    }

    fn is_idempotent(&self, output: &str) -> bool {
        let lower = output.to_lowercase();
        self.idempotent
            .iter()
            .any(|pattern| lower.contains(&pattern.to_lowercase()))
    }
}

/// Info command and its output format.
#[derive(Debug, Clone, Copy)]
pub struct InfoSpec {
    /// Arguments after the binary
    pub args: &'static [&'static str],
    /// How to read the output
    pub format: InfoFormat,
}

/// How a missing manager can install itself.
#[derive(Debug, Clone, Copy)]
pub struct SelfInstallSpec {
    /// Homebrew formula providing the manager, tried first
    pub brew_formula: Option<&'static str>,
    /// Shell script run when Homebrew is unavailable
    pub script: Option<&'static str>,
}

/// Static description of a command-line package manager.
#[derive(Debug, Clone, Copy)]
pub struct ManagerSpec {
    /// Canonical manager name
    pub name: &'static str,
    /// Executable looked up on PATH
    pub binary: &'static str,
    /// Human readable description
    pub description: &'static str,
    /// Shown when the binary is missing
    pub install_hint: &'static str,
    /// Arguments of the list command
    pub list_args: &'static [&'static str],
    /// Format of the list command's output
    pub list_format: ListFormat,
    /// Install one package
    pub install: CommandTemplate,
    /// Uninstall one package
    pub uninstall: CommandTemplate,
    /// Upgrade one package
    pub upgrade: Option<CommandTemplate>,
    /// Upgrade every package
    pub upgrade_all: Option<CommandTemplate>,
    /// Search the registry
    pub search: Option<&'static [&'static str]>,
    /// Describe one package
    pub info: Option<InfoSpec>,
    /// Install the manager itself
    pub self_install: Option<SelfInstallSpec>,
}

/// A [`PackageManager`] driven by a [`ManagerSpec`].
#[derive(Debug, Clone)]
pub struct CommandManager {
    spec: ManagerSpec,
    retry: RetryConfig,
}

impl CommandManager {
    /// Create a manager with the default retry policy.
    pub fn new(spec: ManagerSpec) -> Self {
        Self {
            spec,
            retry: RetryConfig::default(),
        }
    }

    /// Replace the retry policy used for installs.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The static description this manager runs from.
    pub fn spec(&self) -> &ManagerSpec {
        &self.spec
    }

    fn command(&self, args: Vec<String>, timeout: Duration) -> CommandSpec {
        CommandSpec::new(self.spec.binary)
            .args(args)
            .timeout(timeout)
    }

    fn ensure_available(&self, env: &Env) -> Result<()> {
        if self.is_available(env)? {
            Ok(())
        } else {
            Err(Error::ManagerNotFound {
                manager: self.spec.name.to_string(),
            })
        }
    }

    fn run(&self, env: &Env, spec: &CommandSpec) -> Result<CommandOutput> {
        log::debug!("{}: {spec}", self.spec.name);
        Ok(env.runner.run(spec, &env.cancel)?)
    }

    /// Run a mutating command, treating idempotent failures as success.
    fn run_checked(
        &self,
        env: &Env,
        template: &CommandTemplate,
        package: Option<&str>,
        ignorable: Option<ErrorCategory>,
    ) -> Result<()> {
        let spec = self.command(template.render(package), MUTATE_TIMEOUT);
        let output = self.run(env, &spec)?;
        if output.success() {
            return Ok(());
        }

        let text = output.combined();
        if template.is_idempotent(&text) {
            log::debug!("{}: treating `{spec}` output as success", self.spec.name);
            return Ok(());
        }
        let err = Error::from_output(self.spec.name, &spec.to_string(), &text, package);
        if Some(err.category()) == ignorable {
            log::debug!("{}: {err}", self.spec.name);
            return Ok(());
        }
        Err(err)
    }

    fn parse_list(&self, output: &CommandOutput) -> Result<Vec<InstalledPackage>> {
        match self.spec.list_format {
            ListFormat::Lines {
                pattern,
                skip_indented,
            } => {
                let re = Regex::new(pattern).map_err(|e| self.parse_error(e.to_string()))?;
                Ok(parse_lines(&output.stdout, &re, skip_indented))
            }
            ListFormat::JsonMap { field } => {
                if output.stdout.trim().is_empty() {
                    return Ok(Vec::new());
                }
                let value: serde_json::Value = serde_json::from_str(&output.stdout)
                    .map_err(|e| self.parse_error(e.to_string()))?;
                Ok(parse_json_map(&value, field))
            }
        }
    }

    fn parse_error(&self, message: String) -> Error {
        Error::Parse {
            manager: self.spec.name.to_string(),
            message,
        }
    }

    fn unsupported(&self, operation: &'static str) -> Error {
        Error::Unsupported {
            manager: self.spec.name.to_string(),
            operation,
        }
    }
}

/// Parse line-oriented list output.
pub fn parse_lines(stdout: &str, pattern: &Regex, skip_indented: bool) -> Vec<InstalledPackage> {
    stdout
        .lines()
        .filter(|line| !(skip_indented && line.starts_with([' ', '\t'])))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let caps = pattern.captures(line)?;
            let name = caps.name("name")?.as_str();
            let mut pkg = InstalledPackage::new(name);
            if let Some(version) = caps.name("version") {
                pkg = pkg.with_version(version.as_str());
            }
            Some(pkg)
        })
        .collect()
}

/// Parse a JSON object mapping names to `{version}` objects.
pub fn parse_json_map(value: &serde_json::Value, field: &str) -> Vec<InstalledPackage> {
    let Some(map) = value.get(field).and_then(serde_json::Value::as_object) else {
        return Vec::new();
    };
    map.iter()
        .map(|(name, details)| {
            let pkg = InstalledPackage::new(name.clone());
            match details.get("version").and_then(serde_json::Value::as_str) {
                Some(v) => pkg.with_version(v),
                None => pkg,
            }
        })
        .collect()
}

impl PackageManager for CommandManager {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn is_available(&self, env: &Env) -> Result<bool> {
        Ok(env.runner.locate(self.spec.binary).is_some())
    }

    fn list_packages(&self, env: &Env) -> Result<Vec<InstalledPackage>> {
        self.ensure_available(env)?;
        let args = self.spec.list_args.iter().map(ToString::to_string).collect();
        let spec = self.command(args, QUERY_TIMEOUT);
        let output = self.run(env, &spec)?;

        // npm exits non-zero for peer dependency problems but still prints
        // a complete listing.
        let tolerate = matches!(self.spec.list_format, ListFormat::JsonMap { .. })
            && !output.stdout.trim().is_empty();
        if !output.success() && !tolerate {
            return Err(Error::from_output(
                self.spec.name,
                &spec.to_string(),
                &output.combined(),
                None,
            ));
        }
        self.parse_list(&output)
    }

    fn install(&self, env: &Env, name: &str) -> Result<()> {
        self.ensure_available(env)?;
        with_retry(&self.retry, &env.cancel, Some(&LogCallback), || {
            self.run_checked(
                env,
                &self.spec.install,
                Some(name),
                Some(ErrorCategory::AlreadyInstalled),
            )
        })
    }

    fn uninstall(&self, env: &Env, name: &str) -> Result<()> {
        self.ensure_available(env)?;
        self.run_checked(
            env,
            &self.spec.uninstall,
            Some(name),
            Some(ErrorCategory::NotInstalled),
        )
    }

    fn searcher(&self) -> Option<&dyn Search> {
        self.spec.search.map(|_| self as &dyn Search)
    }

    fn info_provider(&self) -> Option<&dyn Info> {
        self.spec.info.map(|_| self as &dyn Info)
    }

    fn upgrader(&self) -> Option<&dyn Upgrade> {
        (self.spec.upgrade.is_some() || self.spec.upgrade_all.is_some())
            .then_some(self as &dyn Upgrade)
    }

    fn health_checker(&self) -> Option<&dyn CheckHealth> {
        Some(self)
    }

    fn self_installer(&self) -> Option<&dyn SelfInstall> {
        self.spec.self_install.map(|_| self as &dyn SelfInstall)
    }
}

impl Search for CommandManager {
    fn search(&self, env: &Env, query: &str) -> Result<Vec<String>> {
        let args = self.spec.search.ok_or_else(|| self.unsupported("search"))?;
        self.ensure_available(env)?;
        let template = CommandTemplate {
            args,
            idempotent: &[],
        };
        let spec = self.command(template.render(Some(query)), QUERY_TIMEOUT);
        let output = self.run(env, &spec)?;
        if !output.success() {
            let text = output.combined();
            // Several managers exit non-zero for "no results".
            if text.to_lowercase().contains("no ") && text.to_lowercase().contains("found") {
                return Ok(Vec::new());
            }
            return Err(Error::from_output(self.spec.name, &spec.to_string(), &text, Some(query)));
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '@'))
            .filter_map(|line| line.split_whitespace().next())
            .map(ToString::to_string)
            .collect())
    }
}

impl Info for CommandManager {
    fn info(&self, env: &Env, name: &str) -> Result<PackageInfo> {
        let info = self.spec.info.ok_or_else(|| self.unsupported("info"))?;
        self.ensure_available(env)?;
        let template = CommandTemplate {
            args: info.args,
            idempotent: &[],
        };
        let spec = self.command(template.render(Some(name)), QUERY_TIMEOUT);
        let output = self.run(env, &spec)?;
        if !output.success() {
            return Err(Error::from_output(
                self.spec.name,
                &spec.to_string(),
                &output.combined(),
                Some(name),
            ));
        }
        let value: serde_json::Value = serde_json::from_str(&output.stdout)
            .map_err(|e| self.parse_error(e.to_string()))?;
        parse_info(info.format, &value, name).ok_or_else(|| Error::NotFound {
            manager: self.spec.name.to_string(),
            name: name.to_string(),
        })
    }
}

/// Read package details from an info command's JSON.
pub fn parse_info(format: InfoFormat, value: &serde_json::Value, name: &str) -> Option<PackageInfo> {
    let text = |v: &serde_json::Value, key: &str| {
        v.get(key)
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
    };
    match format {
        InfoFormat::BrewJson => {
            let formula = value
                .get("formulae")
                .and_then(serde_json::Value::as_array)
                .and_then(|arr| arr.first())?;
            Some(PackageInfo {
                name: text(formula, "name").unwrap_or_else(|| name.to_string()),
                version: formula
                    .get("versions")
                    .and_then(|v| text(v, "stable")),
                description: text(formula, "desc"),
                homepage: text(formula, "homepage"),
            })
        }
        InfoFormat::NpmJson => {
            // npm prints an array when a range matches several versions.
            let doc = value
                .as_array()
                .and_then(|arr| arr.last())
                .unwrap_or(value);
            doc.as_object()?;
            Some(PackageInfo {
                name: text(doc, "name").unwrap_or_else(|| name.to_string()),
                version: text(doc, "version"),
                description: text(doc, "description"),
                homepage: text(doc, "homepage"),
            })
        }
    }
}

impl Upgrade for CommandManager {
    fn upgrade(&self, env: &Env, names: &[String]) -> Result<()> {
        self.ensure_available(env)?;
        if names.is_empty() {
            let all = self
                .spec
                .upgrade_all
                .ok_or_else(|| self.unsupported("upgrading all packages"))?;
            return self.run_checked(env, &all, None, None);
        }
        let one = self
            .spec
            .upgrade
            .ok_or_else(|| self.unsupported("upgrade"))?;
        for name in names {
            self.run_checked(env, &one, Some(name), None)?;
        }
        Ok(())
    }
}

impl CheckHealth for CommandManager {
    fn check_health(&self, env: &Env) -> HealthReport {
        match env.runner.locate(self.spec.binary) {
            Some(path) => HealthReport::ok(
                self.spec.name,
                format!("{} at {}", self.spec.description, path.display()),
            ),
            None => HealthReport::error(
                self.spec.name,
                format!("`{}` not found on PATH", self.spec.binary),
            )
            .with_fix(self.spec.install_hint),
        }
    }
}

impl SelfInstall for CommandManager {
    fn self_install(&self, env: &Env) -> Result<()> {
        if self.is_available(env)? {
            return Ok(());
        }
        let how = self
            .spec
            .self_install
            .ok_or_else(|| self.unsupported("self-install"))?;

        if let Some(formula) = how.brew_formula
            && env.runner.locate("brew").is_some()
        {
            let spec = CommandSpec::new("brew")
                .args(["install", formula])
                .timeout(MUTATE_TIMEOUT);
            let output = self.run(env, &spec)?;
            if output.success() {
                return Ok(());
            }
            log::warn!(
                "{}: `{spec}` failed, trying the install script",
                self.spec.name
            );
        }

        let script = how.script.ok_or_else(|| self.unsupported("self-install without Homebrew"))?;
        let spec = CommandSpec::shell(script).timeout(MUTATE_TIMEOUT);
        let output = self.run(env, &spec)?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                manager: self.spec.name.to_string(),
                command: script.to_string(),
                stderr: output.combined().trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::builtin;
    use declarative::ScriptedRunner;
    use std::sync::Arc;

    fn env_with(runner: ScriptedRunner) -> (Env, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let env = Env::new("/home/test", "/home/test/.config/driftless").with_runner(runner.clone());
        (env, runner)
    }

    fn fast(spec: ManagerSpec) -> CommandManager {
        CommandManager::new(spec).with_retry(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(5),
        })
    }

    #[test]
    fn test_render_substitutes_package() {
        let t = CommandTemplate {
            args: &["install", "-g", "{package}"],
            idempotent: &[],
        };
        assert_eq!(t.render(Some("prettier")), vec!["install", "-g", "prettier"]);
    }

    #[test]
    fn test_brew_list_with_versions() {
        let (env, _) = env_with(
            ScriptedRunner::new()
                .with_program("brew")
                .on("brew list --formula --versions", 0, "jq 1.7.1\ntree 2.1.1 2.1.0\n", ""),
        );
        let pkgs = CommandManager::new(builtin::BREW).list_packages(&env).unwrap();
        assert_eq!(
            pkgs,
            vec![
                InstalledPackage::new("jq").with_version("1.7.1"),
                InstalledPackage::new("tree").with_version("2.1.1"),
            ]
        );
    }

    #[test]
    fn test_cargo_list_skips_binary_lines() {
        let listing = "ripgrep v14.1.0:\n    rg\nbat v0.24.0:\n    bat\n";
        let (env, _) = env_with(
            ScriptedRunner::new()
                .with_program("cargo")
                .on("cargo install --list", 0, listing, ""),
        );
        let names = CommandManager::new(builtin::CARGO).list_installed(&env).unwrap();
        assert_eq!(names, vec!["ripgrep", "bat"]);
    }

    #[test]
    fn test_npm_list_json_tolerates_nonzero_exit() {
        let json = r#"{"dependencies":{"prettier":{"version":"3.2.5"},"@vue/cli":{"version":"5.0.8"}}}"#;
        let (env, _) = env_with(
            ScriptedRunner::new()
                .with_program("npm")
                .on("npm list -g --depth=0 --json", 1, json, "npm ERR! peer dep missing"),
        );
        let mut names = CommandManager::new(builtin::NPM).list_installed(&env).unwrap();
        names.sort();
        assert_eq!(names, vec!["@vue/cli", "prettier"]);
    }

    #[test]
    fn test_list_requires_binary() {
        let (env, runner) = env_with(ScriptedRunner::new());
        let err = CommandManager::new(builtin::GEM).list_installed(&env).unwrap_err();
        assert!(matches!(err, Error::ManagerNotFound { .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_install_already_installed_is_success() {
        let (env, _) = env_with(
            ScriptedRunner::new()
                .with_program("brew")
                .on("brew install jq", 1, "", "Warning: jq 1.7.1 is already installed"),
        );
        CommandManager::new(builtin::BREW).install(&env, "jq").unwrap();
    }

    #[test]
    fn test_install_retries_network_errors() {
        let (env, runner) = env_with(
            ScriptedRunner::new()
                .with_program("npm")
                .on("npm install -g prettier", 1, "", "npm ERR! code ETIMEDOUT")
                .on("npm install -g prettier", 0, "added 1 package", ""),
        );
        fast(builtin::NPM).install(&env, "prettier").unwrap();
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn test_install_not_found_is_not_retried() {
        let (env, runner) = env_with(ScriptedRunner::new().with_program("brew").on(
            "brew install nope",
            1,
            "",
            "Error: No available formula with the name \"nope\"",
        ));
        let err = fast(builtin::BREW).install(&env, "nope").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_uninstall_absent_is_success() {
        let (env, _) = env_with(ScriptedRunner::new().with_program("pipx").on(
            "pipx uninstall black",
            1,
            "",
            "Nothing to uninstall for black 😴\nblack is not installed",
        ));
        CommandManager::new(builtin::PIPX).uninstall(&env, "black").unwrap();
    }

    #[test]
    fn test_capability_probes() {
        let brew = CommandManager::new(builtin::BREW);
        assert!(brew.searcher().is_some());
        assert!(brew.info_provider().is_some());
        assert!(brew.upgrader().is_some());
        assert!(brew.health_checker().is_some());

        let pipx = CommandManager::new(builtin::PIPX);
        assert!(pipx.searcher().is_none());
        assert!(pipx.info_provider().is_none());
    }

    #[test]
    fn test_brew_info_json() {
        let json = r#"{"formulae":[{"name":"jq","desc":"Lightweight JSON processor","homepage":"https://jqlang.github.io/jq/","versions":{"stable":"1.7.1"}}],"casks":[]}"#;
        let (env, _) = env_with(
            ScriptedRunner::new()
                .with_program("brew")
                .on("brew info --json=v2 jq", 0, json, ""),
        );
        let brew = CommandManager::new(builtin::BREW);
        let info = brew.info_provider().unwrap().info(&env, "jq").unwrap();
        assert_eq!(info.version.as_deref(), Some("1.7.1"));
        assert_eq!(info.description.as_deref(), Some("Lightweight JSON processor"));
    }

    #[test]
    fn test_search_first_tokens() {
        let (env, _) = env_with(ScriptedRunner::new().with_program("gem").on(
            "gem search rake",
            0,
            "rake (13.1.0)\nrake-compiler (1.2.7)\n",
            "",
        ));
        let gem = CommandManager::new(builtin::GEM);
        let hits = gem.searcher().unwrap().search(&env, "rake").unwrap();
        assert_eq!(hits, vec!["rake", "rake-compiler"]);
    }

    #[test]
    fn test_upgrade_named_packages_one_by_one() {
        let (env, runner) = env_with(
            ScriptedRunner::new()
                .with_program("pipx")
                .on("pipx upgrade black", 0, "upgraded black", "")
                .on("pipx upgrade ruff", 1, "", "ruff is already at latest version"),
        );
        let pipx = CommandManager::new(builtin::PIPX);
        let names = vec!["black".to_string(), "ruff".to_string()];
        pipx.upgrader().unwrap().upgrade(&env, &names).unwrap();
        assert_eq!(runner.calls(), vec!["pipx upgrade black", "pipx upgrade ruff"]);
    }

    #[test]
    fn test_upgrade_everything() {
        let (env, runner) = env_with(
            ScriptedRunner::new()
                .with_program("pipx")
                .on("pipx upgrade-all", 0, "", ""),
        );
        let pipx = CommandManager::new(builtin::PIPX);
        pipx.upgrader().unwrap().upgrade(&env, &[]).unwrap();
        assert_eq!(runner.calls(), vec!["pipx upgrade-all"]);
    }

    #[test]
    fn test_upgrade_failure_stops_at_first_package() {
        let (env, runner) = env_with(
            ScriptedRunner::new()
                .with_program("brew")
                .on("brew upgrade nope", 1, "", "Error: No available formula with the name \"nope\"")
                .on("brew upgrade jq", 0, "", ""),
        );
        let brew = CommandManager::new(builtin::BREW);
        let names = vec!["nope".to_string(), "jq".to_string()];
        let err = brew.upgrader().unwrap().upgrade(&env, &names).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(runner.calls(), vec!["brew upgrade nope"]);
    }

    #[test]
    fn test_upgrade_all_unsupported_for_cargo() {
        let (env, runner) = env_with(ScriptedRunner::new().with_program("cargo"));
        let cargo = CommandManager::new(builtin::CARGO);
        let err = cargo.upgrader().unwrap().upgrade(&env, &[]).unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_health_reports_missing_binary_with_fix() {
        let (env, _) = env_with(ScriptedRunner::new());
        let report = CommandManager::new(builtin::UV).check_health(&env);
        assert_eq!(report.status, declarative::HealthStatus::Error);
        assert!(report.fix.is_some());
    }

    #[test]
    fn test_self_install_prefers_brew() {
        let (env, runner) = env_with(
            ScriptedRunner::new()
                .with_program("brew")
                .on("brew install pipx", 0, "", ""),
        );
        CommandManager::new(builtin::PIPX).self_install(&env).unwrap();
        assert_eq!(runner.calls(), vec!["brew install pipx"]);
    }
}
