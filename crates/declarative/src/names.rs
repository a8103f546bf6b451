//! Package-manager name normalization.
//!
//! Every place that compares or stores a manager name goes through
//! [`canonical_manager`]: config parsing, the manager registry, the
//! reconciliation key and the ledger.

/// Aliases and the canonical name they resolve to.
const ALIASES: &[(&str, &str)] = &[
    ("homebrew", "brew"),
    ("uv-tool", "uv"),
    ("uvx", "uv"),
    ("rubygems", "gem"),
    ("npm-global", "npm"),
    ("cargo-install", "cargo"),
];

/// Resolve a manager name to its canonical spelling.
///
/// Alias lookup ignores case; names that are not aliases are returned
/// trimmed but otherwise as given.
pub fn canonical_manager(name: &str) -> String {
    let trimmed = name.trim();
    ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
        .map_or_else(|| trimmed.to_string(), |(_, canonical)| (*canonical).to_string())
}

/// All accepted aliases, for help text and diagnostics.
pub fn aliases() -> impl Iterator<Item = (&'static str, &'static str)> {
    ALIASES.iter().copied()
}
