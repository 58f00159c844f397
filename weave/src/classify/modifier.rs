use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A code block modifier tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modifier {
    /// Render as literate code only.
    NoExec,
    /// Execute, but do not show printed output.
    HideOutput,
    /// Execute and show output and artifacts, but not the code.
    OutputOnly,
    /// Execute and embed only the declared artifacts.
    ArtifactOnly,
    /// Execute and emit nothing.
    Silent,
}

impl Modifier {
    pub const ALL: [Modifier; 5] = [
        Modifier::NoExec,
        Modifier::HideOutput,
        Modifier::OutputOnly,
        Modifier::ArtifactOnly,
        Modifier::Silent,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Modifier::NoExec => "no-exec",
            Modifier::HideOutput => "hide-output",
            Modifier::OutputOnly => "output-only",
            Modifier::ArtifactOnly => "artifact-only",
            Modifier::Silent => "silent",
        }
    }

    pub fn from_token(token: &str) -> Option<Modifier> {
        Modifier::ALL.into_iter().find(|m| m.token() == token)
    }

    /// Every modifier except `no-exec` only makes sense on a block that runs.
    pub fn requires_execution(self) -> bool {
        self != Modifier::NoExec
    }

    pub fn conflicts_with(self, other: Modifier) -> bool {
        use Modifier::*;
        matches!(
            (self, other),
            (NoExec, HideOutput | OutputOnly | ArtifactOnly | Silent)
                | (HideOutput | OutputOnly | ArtifactOnly | Silent, NoExec)
                | (OutputOnly, HideOutput | ArtifactOnly)
                | (HideOutput | ArtifactOnly, OutputOnly)
                | (Silent, OutputOnly | HideOutput | ArtifactOnly)
                | (OutputOnly | HideOutput | ArtifactOnly, Silent)
        )
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// The resolved, conflict-free modifiers of one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierSet {
    flags: BTreeSet<Modifier>,
}

impl ModifierSet {
    pub fn contains(&self, modifier: Modifier) -> bool {
        self.flags.contains(&modifier)
    }

    pub(crate) fn insert(&mut self, modifier: Modifier) {
        self.flags.insert(modifier);
    }

    pub fn iter(&self) -> impl Iterator<Item = Modifier> + '_ {
        self.flags.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn executes(&self) -> bool {
        !self.contains(Modifier::NoExec)
    }

    pub fn shows_code(&self) -> bool {
        !(self.contains(Modifier::OutputOnly)
            || self.contains(Modifier::ArtifactOnly)
            || self.contains(Modifier::Silent))
    }

    pub fn shows_output(&self) -> bool {
        !(self.contains(Modifier::HideOutput)
            || self.contains(Modifier::ArtifactOnly)
            || self.contains(Modifier::Silent))
    }

    pub fn shows_artifacts(&self) -> bool {
        !self.contains(Modifier::Silent)
    }
}

impl fmt::Display for ModifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<&str> = self.iter().map(Modifier::token).collect();
        write!(f, "{{{}}}", tokens.join(", "))
    }
}

/// Known modifier tokens: the built-in set plus configured aliases.
#[derive(Debug, Clone, Default)]
pub struct ModifierRegistry {
    aliases: BTreeMap<String, Modifier>,
}

impl ModifierRegistry {
    pub fn new() -> Self {
        ModifierRegistry::default()
    }

    /// Register `alias` as another spelling of `target`.
    pub fn alias(&mut self, alias: impl Into<String>, target: Modifier) {
        self.aliases.insert(alias.into(), target);
    }

    pub fn lookup(&self, token: &str) -> Option<Modifier> {
        Modifier::from_token(token).or_else(|| self.aliases.get(token).copied())
    }

    /// Every accepted token, built-ins first.
    pub fn known_tokens(&self) -> Vec<String> {
        Modifier::ALL
            .iter()
            .map(|m| m.token().to_string())
            .chain(self.aliases.keys().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_symmetric() {
        for a in Modifier::ALL {
            for b in Modifier::ALL {
                assert_eq!(a.conflicts_with(b), b.conflicts_with(a), "{a} / {b}");
            }
            assert!(!a.conflicts_with(a));
        }
    }

    #[test]
    fn hide_output_and_artifact_only_combine() {
        assert!(!Modifier::HideOutput.conflicts_with(Modifier::ArtifactOnly));
        assert!(Modifier::NoExec.conflicts_with(Modifier::OutputOnly));
    }

    #[test]
    fn aliases_resolve_to_builtins() {
        let mut registry = ModifierRegistry::new();
        registry.alias("echo-false", Modifier::OutputOnly);
        assert_eq!(registry.lookup("echo-false"), Some(Modifier::OutputOnly));
        assert_eq!(registry.lookup("silent"), Some(Modifier::Silent));
        assert_eq!(registry.lookup("loud"), None);
        assert_eq!(registry.known_tokens().last().map(String::as_str), Some("echo-false"));
    }

    #[test]
    fn display_flags() {
        let mut set = ModifierSet::default();
        assert!(set.shows_code() && set.shows_output() && set.executes());
        set.insert(Modifier::ArtifactOnly);
        assert!(!set.shows_code() && !set.shows_output() && set.shows_artifacts());
        set.insert(Modifier::HideOutput);
        assert_eq!(set.to_string(), "{hide-output, artifact-only}");
    }
}
