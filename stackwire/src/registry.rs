//! Mapping discriminants to protocol definitions.
//!
//! A registry is one namespace of discriminants, such as ethertypes or IP protocol numbers. The
//! decoder consults it to choose the definition of the next layer from a field of the enclosing
//! header. Registries are built once and only read afterwards, typically from a `OnceLock` that
//! a schema's [`Dispatch`] refers to:
//!
//! ```
//! use std::sync::OnceLock;
//! use stackwire::registry::Registry;
//! use stackwire::schema::{Dispatch, Field, LengthSource, Protocol, Schema};
//!
//! static OUTER: Protocol = Protocol::new("outer", Schema::new(&[
//!     Field::uint("kind", 1),
//! ]).with_next(Dispatch::new("kind", kinds)));
//!
//! static INNER: Protocol = Protocol::new("inner", Schema::new(&[
//!     Field::variable("data", LengthSource::Remaining),
//! ]));
//!
//! fn kinds() -> &'static Registry {
//!     static KINDS: OnceLock<Registry> = OnceLock::new();
//!     KINDS.get_or_init(|| Registry::from_entries("kinds", &[(1, &INNER)])
//!         .expect("valid kinds"))
//! }
//!
//! let packet = OUTER.decode(&[1, 0xde, 0xad])?;
//! let inner = packet.next_layer().unwrap();
//! assert!(inner.protocol().same(&INNER));
//! assert_eq!(inner.bytes("data")?, &[0xde, 0xad]);
//! # Ok::<(), stackwire::wire::Error>(())
//! ```
//!
//! [`Dispatch`]: ../schema/struct.Dispatch.html
use std::collections::BTreeMap;

use crate::schema::Protocol;
use crate::wire::{Error, Result};

/// A namespace of discriminants.
///
/// At most one definition is registered under each discriminant. A definition may be registered
/// under several discriminants.
#[derive(Debug, Clone)]
pub struct Registry {
    name: &'static str,
    entries: BTreeMap<u64, &'static Protocol>,
}

impl Registry {
    /// An empty registry.
    pub fn new(name: &'static str) -> Self {
        Registry {
            name,
            entries: BTreeMap::new(),
        }
    }

    /// Build a registry from a table of entries.
    ///
    /// Fails like `register` on the first invalid entry.
    pub fn from_entries(name: &'static str, entries: &[(u64, &'static Protocol)]) -> Result<Self> {
        let mut registry = Registry::new(name);
        for &(discriminant, protocol) in entries {
            registry.register(discriminant, protocol)?;
        }
        Ok(registry)
    }

    /// The name of the namespace.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Associate a discriminant with a definition.
    ///
    /// Registering the same definition again is accepted. Returns
    /// `Err(Error::ConflictingRegistration)` if another definition already uses the discriminant
    /// and `Err(Error::InvalidSchema)` if the definition does not validate.
    pub fn register(&mut self, discriminant: u64, protocol: &'static Protocol) -> Result<()> {
        protocol.schema().validate()?;

        match self.entries.get(&discriminant) {
            Some(existing) if existing.same(protocol) => Ok(()),
            Some(existing) => {
                net_debug!("registry {}: {:#x} already maps to {}, refusing {}",
                    self.name, discriminant, existing.name(), protocol.name());
                Err(Error::ConflictingRegistration)
            },
            None => {
                self.entries.insert(discriminant, protocol);
                Ok(())
            },
        }
    }

    /// The definition registered under a discriminant.
    pub fn lookup(&self, discriminant: u64) -> Option<&'static Protocol> {
        self.entries.get(&discriminant).copied()
    }

    /// The lowest discriminant a definition is registered under.
    pub fn discriminant_of(&self, protocol: &Protocol) -> Option<u64> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.same(protocol))
            .map(|(&discriminant, _)| discriminant)
    }

    /// All entries, ordered by discriminant.
    pub fn iter(&self) -> impl Iterator<Item=(u64, &'static Protocol)> + '_ {
        self.entries
            .iter()
            .map(|(&discriminant, &protocol)| (discriminant, protocol))
    }

    /// The number of registered discriminants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// If nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::{Field, LengthSource, Schema};

    static ALPHA: Protocol = Protocol::new("alpha", Schema::new(&[
        Field::uint("kind", 1),
    ]));

    static BETA: Protocol = Protocol::new("beta", Schema::new(&[
        Field::variable("data", LengthSource::Remaining),
    ]));

    static BROKEN: Protocol = Protocol::new("broken", Schema::new(&[
        Field::uint("a", 1),
        Field::uint("a", 2),
    ]));

    #[test]
    fn register_and_lookup() {
        let mut registry = Registry::new("test");
        assert!(registry.is_empty());
        registry.register(6, &ALPHA).unwrap();
        registry.register(17, &BETA).unwrap();
        registry.register(4, &BETA).unwrap();

        assert_eq!(registry.len(), 3);
        assert!(registry.lookup(6).unwrap().same(&ALPHA));
        assert!(registry.lookup(17).unwrap().same(&BETA));
        assert!(registry.lookup(5).is_none());

        assert_eq!(registry.discriminant_of(&BETA), Some(4));
        assert_eq!(registry.discriminant_of(&BROKEN), None);

        let order: Vec<_> = registry.iter().map(|(disc, _)| disc).collect();
        assert_eq!(order, [4, 6, 17]);
    }

    #[test]
    fn conflicting() {
        let mut registry = Registry::new("test");
        registry.register(6, &ALPHA).unwrap();
        // Idempotent for the same definition.
        assert_eq!(registry.register(6, &ALPHA), Ok(()));
        assert_eq!(registry.register(6, &BETA), Err(Error::ConflictingRegistration));
        assert!(registry.lookup(6).unwrap().same(&ALPHA));
    }

    #[test]
    fn invalid_schema() {
        let mut registry = Registry::new("test");
        assert_eq!(registry.register(1, &BROKEN), Err(Error::InvalidSchema));
        assert!(registry.is_empty());

        let table = Registry::from_entries("table", &[(1, &ALPHA), (1, &BETA)]);
        assert_eq!(table.unwrap_err(), Error::ConflictingRegistration);
    }

    #[test]
    fn shared_between_threads() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<Registry>();
    }
}
