//! Built-in manager definitions.

use crate::manager::command::{
    CommandTemplate, InfoFormat, InfoSpec, ListFormat, ManagerSpec, SelfInstallSpec,
};

/// `name version...` per line
const NAME_VERSION: &str = r"^(?P<name>[^\s]+)(?:\s+(?P<version>[^\s]+))?";

/// Homebrew formulae.
pub const BREW: ManagerSpec = ManagerSpec {
    name: "brew",
    binary: "brew",
    description: "Homebrew (macOS/Linux package manager)",
    install_hint: "Visit https://brew.sh for installation instructions",
    list_args: &["list", "--formula", "--versions"],
    list_format: ListFormat::Lines {
        pattern: NAME_VERSION,
        skip_indented: false,
    },
    install: CommandTemplate {
        args: &["install", "{package}"],
        idempotent: &["already installed"],
    },
    uninstall: CommandTemplate {
        args: &["uninstall", "{package}"],
        idempotent: &["no such keg", "not installed"],
    },
    upgrade: Some(CommandTemplate {
        args: &["upgrade", "{package}"],
        idempotent: &["already installed", "already up-to-date"],
    }),
    upgrade_all: Some(CommandTemplate {
        args: &["upgrade"],
        idempotent: &["already up-to-date"],
    }),
    search: Some(&["search", "{package}"]),
    info: Some(InfoSpec {
        args: &["info", "--json=v2", "{package}"],
        format: InfoFormat::BrewJson,
    }),
    self_install: Some(SelfInstallSpec {
        brew_formula: None,
        script: Some(
            r#"NONINTERACTIVE=1 /bin/bash -c "$(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh)""#,
        ),
    }),
};

/// Global npm packages.
pub const NPM: ManagerSpec = ManagerSpec {
    name: "npm",
    binary: "npm",
    description: "npm (Node.js package manager)",
    install_hint: "Install Node.js from https://nodejs.org/ or use brew install node",
    list_args: &["list", "-g", "--depth=0", "--json"],
    list_format: ListFormat::JsonMap {
        field: "dependencies",
    },
    install: CommandTemplate {
        args: &["install", "-g", "{package}"],
        idempotent: &["already installed"],
    },
    uninstall: CommandTemplate {
        args: &["uninstall", "-g", "{package}"],
        idempotent: &[],
    },
    upgrade: Some(CommandTemplate {
        args: &["update", "-g", "{package}"],
        idempotent: &["up to date"],
    }),
    upgrade_all: Some(CommandTemplate {
        args: &["update", "-g"],
        idempotent: &["up to date"],
    }),
    search: Some(&["search", "--parseable", "{package}"]),
    info: Some(InfoSpec {
        args: &["view", "{package}", "--json"],
        format: InfoFormat::NpmJson,
    }),
    self_install: Some(SelfInstallSpec {
        brew_formula: Some("node"),
        script: None,
    }),
};

/// Binaries installed with `cargo install`.
pub const CARGO: ManagerSpec = ManagerSpec {
    name: "cargo",
    binary: "cargo",
    description: "Cargo (Rust package manager)",
    install_hint: "Install Rust from https://rustup.rs/",
    list_args: &["install", "--list"],
    list_format: ListFormat::Lines {
        pattern: r"^(?P<name>[^\s]+) v(?P<version>[^\s:]+).*:$",
        skip_indented: true,
    },
    install: CommandTemplate {
        args: &["install", "{package}"],
        idempotent: &["already exists", "already installed"],
    },
    uninstall: CommandTemplate {
        args: &["uninstall", "{package}"],
        idempotent: &["did not match any packages"],
    },
    upgrade: Some(CommandTemplate {
        args: &["install", "--force", "{package}"],
        idempotent: &[],
    }),
    upgrade_all: None,
    search: Some(&["search", "{package}"]),
    info: None,
    self_install: Some(SelfInstallSpec {
        brew_formula: None,
        script: Some("curl --proto '=https' --tlsv1.2 -sSf https://sh.rustup.rs | sh -s -- -y"),
    }),
};

/// Python applications installed with pipx.
pub const PIPX: ManagerSpec = ManagerSpec {
    name: "pipx",
    binary: "pipx",
    description: "pipx (isolated Python applications)",
    install_hint: "Install pipx with brew install pipx or see https://pipx.pypa.io/",
    list_args: &["list", "--short"],
    list_format: ListFormat::Lines {
        pattern: NAME_VERSION,
        skip_indented: false,
    },
    install: CommandTemplate {
        args: &["install", "{package}"],
        idempotent: &["already seems to be installed", "already installed"],
    },
    uninstall: CommandTemplate {
        args: &["uninstall", "{package}"],
        idempotent: &["not installed"],
    },
    upgrade: Some(CommandTemplate {
        args: &["upgrade", "{package}"],
        idempotent: &["already at latest version", "up to date"],
    }),
    upgrade_all: Some(CommandTemplate {
        args: &["upgrade-all"],
        idempotent: &[],
    }),
    search: None,
    info: None,
    self_install: Some(SelfInstallSpec {
        brew_formula: Some("pipx"),
        script: Some("python3 -m pip install --user pipx"),
    }),
};

/// Tools installed with `uv tool`.
pub const UV: ManagerSpec = ManagerSpec {
    name: "uv",
    binary: "uv",
    description: "uv (Python package manager)",
    install_hint: "Install uv from https://docs.astral.sh/uv/ or use brew install uv",
    list_args: &["tool", "list"],
    list_format: ListFormat::Lines {
        pattern: r"^(?P<name>[^\s-][^\s]*)\s+v(?P<version>[^\s]+)",
        skip_indented: true,
    },
    install: CommandTemplate {
        args: &["tool", "install", "{package}"],
        idempotent: &["already installed"],
    },
    uninstall: CommandTemplate {
        args: &["tool", "uninstall", "{package}"],
        idempotent: &["not installed"],
    },
    upgrade: Some(CommandTemplate {
        args: &["tool", "upgrade", "{package}"],
        idempotent: &["nothing to upgrade"],
    }),
    upgrade_all: Some(CommandTemplate {
        args: &["tool", "upgrade", "--all"],
        idempotent: &["nothing to upgrade"],
    }),
    search: None,
    info: None,
    self_install: Some(SelfInstallSpec {
        brew_formula: Some("uv"),
        script: Some("curl -LsSf https://astral.sh/uv/install.sh | sh"),
    }),
};

/// Ruby gems installed for the current user.
pub const GEM: ManagerSpec = ManagerSpec {
    name: "gem",
    binary: "gem",
    description: "gem (Ruby package manager)",
    install_hint: "Install Ruby from https://ruby-lang.org/ or use brew install ruby",
    list_args: &["list", "--local"],
    list_format: ListFormat::Lines {
        pattern: r"^(?P<name>[^\s]+) \((?:default: )?(?P<version>[^,)\s]+)",
        skip_indented: false,
    },
    install: CommandTemplate {
        args: &["install", "{package}", "--user-install"],
        idempotent: &["already installed"],
    },
    uninstall: CommandTemplate {
        args: &["uninstall", "{package}", "-x"],
        idempotent: &["is not installed"],
    },
    upgrade: Some(CommandTemplate {
        args: &["update", "{package}"],
        idempotent: &["nothing to update"],
    }),
    upgrade_all: Some(CommandTemplate {
        args: &["update"],
        idempotent: &["nothing to update"],
    }),
    search: Some(&["search", "{package}"]),
    info: None,
    self_install: Some(SelfInstallSpec {
        brew_formula: Some("ruby"),
        script: None,
    }),
};

/// Every built-in manager, in display order.
pub const ALL: &[ManagerSpec] = &[BREW, NPM, CARGO, PIPX, UV, GEM];
