//! Type tag → constructor table for distributions.

use std::collections::BTreeMap;

use depot_core::error::{DepotError, Result};

use super::{docker_archive, Cimd, Distribution, DistributionType};

/// Builds a distribution from a parsed identifier whose type matched the tag
/// it was registered under.
pub type Constructor = fn(&Cimd) -> Result<Box<dyn Distribution>>;

/// Maps distribution type tags to their constructors.
#[derive(Debug, Default)]
pub struct Registry {
    constructors: BTreeMap<DistributionType, Constructor>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every distribution type this crate ships.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(DistributionType::DOCKER_ARCHIVE, docker_archive::construct);
        registry
    }

    /// Associate `kind` with `constructor`.
    ///
    /// # Panics
    ///
    /// Panics if `kind` is already registered. Registration happens once at
    /// startup, so a duplicate is a programming error.
    pub fn register(&mut self, kind: DistributionType, constructor: Constructor) {
        if let Err(e) = self.try_register(kind, constructor) {
            panic!("{}", e);
        }
    }

    /// Like [`Registry::register`], but reports a duplicate as an error.
    pub fn try_register(&mut self, kind: DistributionType, constructor: Constructor) -> Result<()> {
        if self.constructors.contains_key(&kind) {
            return Err(DepotError::ConfigError(format!(
                "distribution type {:?} registered twice",
                kind.as_str()
            )));
        }
        self.constructors.insert(kind, constructor);
        Ok(())
    }

    pub fn contains(&self, kind: &DistributionType) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered type tags, sorted.
    pub fn types(&self) -> Vec<DistributionType> {
        self.constructors.keys().cloned().collect()
    }

    /// Parse `input` and hand it to the constructor for its type.
    ///
    /// Grammar errors are reported before the type lookup, so an unknown
    /// type in a malformed identifier is still a malformed identifier.
    pub fn parse(&self, input: &str) -> Result<Box<dyn Distribution>> {
        let cimd = Cimd::parse(input)?;
        self.construct(&cimd)
    }

    /// Dispatch an already-parsed identifier.
    pub fn construct(&self, cimd: &Cimd) -> Result<Box<dyn Distribution>> {
        let constructor = self
            .constructors
            .get(cimd.kind())
            .ok_or_else(|| DepotError::UnknownType(cimd.kind().to_string()))?;
        constructor(cimd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_constructor(cimd: &Cimd) -> Result<Box<dyn Distribution>> {
        CALLS.fetch_add(1, Ordering::SeqCst);
        Err(DepotError::Other(format!("refused {}", cimd)))
    }

    fn refusing_constructor(cimd: &Cimd) -> Result<Box<dyn Distribution>> {
        Err(DepotError::Other(format!("refused {}", cimd)))
    }

    #[test]
    fn test_builtin_types() {
        let registry = Registry::with_builtin();
        assert_eq!(registry.types(), vec![DistributionType::DOCKER_ARCHIVE]);
        assert!(registry.contains(&DistributionType::DOCKER_ARCHIVE));
    }

    #[test]
    fn test_parse_dispatches_on_type() {
        let registry = Registry::with_builtin();
        let d = registry
            .parse("cimd:docker-archive:v=0:file%3A%2F%2F%2Ffull%2Fpath%2Fto%2Fbusybox.tar")
            .unwrap();
        assert_eq!(d.kind(), DistributionType::DOCKER_ARCHIVE);
        assert_eq!(d.display_form(), "file:///full/path/to/busybox.tar");
    }

    #[test]
    fn test_unknown_type_never_calls_constructor() {
        let mut registry = Registry::new();
        registry.register(DistributionType::new("counting"), counting_constructor);

        let before = CALLS.load(Ordering::SeqCst);
        let err = registry.parse("cimd:not-a-real-type:v=0:x").unwrap_err();
        assert!(matches!(err, DepotError::UnknownType(ref t) if t == "not-a-real-type"));
        assert_eq!(CALLS.load(Ordering::SeqCst), before);
    }

    #[test]
    fn test_constructor_error_is_propagated() {
        let mut registry = Registry::new();
        registry.register(DistributionType::new("refusing"), refusing_constructor);

        let err = registry.parse("cimd:refusing:v=1:x").unwrap_err();
        assert!(err.to_string().contains("refused cimd:refusing:v=1:x"));
    }

    #[test]
    fn test_malformed_identifier() {
        let registry = Registry::with_builtin();
        let err = registry.parse("cimd:docker-archive").unwrap_err();
        assert!(matches!(err, DepotError::MalformedIdentifier { .. }));
    }

    #[test]
    fn test_malformed_wins_over_unknown_type() {
        let registry = Registry::with_builtin();
        let err = registry.parse("cimd:not-a-real-type:x").unwrap_err();
        assert!(matches!(err, DepotError::MalformedIdentifier { .. }));
    }

    #[test]
    fn test_try_register_duplicate() {
        let mut registry = Registry::with_builtin();
        let err = registry
            .try_register(DistributionType::DOCKER_ARCHIVE, refusing_constructor)
            .unwrap_err();
        assert!(err.to_string().contains("docker-archive"));
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_register_duplicate_panics() {
        let mut registry = Registry::new();
        registry.register(DistributionType::new("refusing"), refusing_constructor);
        registry.register(DistributionType::new("refusing"), refusing_constructor);
    }
}
