//! Providers for the two managed domains
//!
//! - [`package::PackageProvider`]: packages across every registered manager
//! - [`dotfile::DotfileProvider`]: files under the config directory deployed
//!   into home

pub mod dotfile;
pub mod package;

use declarative::{BoxedProvider, Domain};
use pkgkit::ManagerRegistry;

use crate::config::Config;

/// Build every provider a config asks for, in apply order
pub fn providers(config: &Config, registry: ManagerRegistry) -> Vec<BoxedProvider> {
    vec![
        Box::new(package::PackageProvider::new(config.package_specs(), registry)),
        Box::new(dotfile::DotfileProvider::new(&config.dotfiles)),
    ]
}

/// Domains selected by `--packages` / `--dotfiles`; `None` means all
pub fn domain_filter(packages: bool, dotfiles: bool) -> Option<std::collections::BTreeSet<Domain>> {
    if !packages && !dotfiles {
        return None;
    }
    let mut domains = std::collections::BTreeSet::new();
    if packages {
        domains.insert(Domain::Package);
    }
    if dotfiles {
        domains.insert(Domain::Dotfile);
    }
    Some(domains)
}
