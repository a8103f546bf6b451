pub mod apply;
pub mod diff;
pub mod doctor;
pub mod info;
pub mod lock;
pub mod packages;
pub mod search;
pub mod status;
pub mod uninstall;
pub mod upgrade;

use anyhow::Result;
use declarative::{Env, LockStore, Orchestrator};
use pkgkit::ManagerRegistry;

use crate::Context;
use crate::config::Config;
use crate::paths;
use crate::resource;

/// Resolved paths and the run's cancel token, without reading any config
pub fn env(ctx: &Context) -> Result<Env> {
    let home = paths::home_dir()?;
    let config_dir = paths::config_dir(ctx.config_dir.as_deref())?;
    Ok(Env::new(home, config_dir).with_cancel(ctx.cancel.clone()))
}

/// Resolved environment and validated config for one command
pub struct Session {
    pub env: Env,
    pub config: Config,
}

impl Session {
    /// Resolve paths, then load and validate `driftless.yaml`
    pub fn open(ctx: &Context) -> Result<Self> {
        let env = env(ctx)?;
        let config = Config::load(&env.config_dir)?;

        let registry = ManagerRegistry::builtin();
        config.validate(|name| registry.contains(name))?;
        log::debug!(
            "loaded {} package(s) from {}",
            config.packages.len(),
            Config::path(&env.config_dir).display()
        );
        Ok(Self { env, config })
    }

    pub fn lock_store(&self) -> LockStore {
        LockStore::new(&self.env.config_dir)
    }

    /// Orchestrator with every provider and the configured hooks
    pub fn orchestrator(&self) -> Result<Orchestrator<'_>> {
        let mut orchestrator =
            Orchestrator::new(&self.env, self.lock_store()).with_hooks(self.config.hooks()?);
        for provider in resource::providers(&self.config, ManagerRegistry::builtin()) {
            orchestrator = orchestrator.with_provider(provider);
        }
        Ok(orchestrator)
    }

    /// Render a path relative to home for display
    pub fn display(&self, path: &std::path::Path) -> String {
        paths::display(path, &self.env.home_dir)
    }
}
