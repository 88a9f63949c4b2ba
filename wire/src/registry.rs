//! Event registry: tag to payload factory.

use std::collections::BTreeMap;

use blake3::Hasher;

use crate::error::{WireError, WireResult};
use crate::event::{standard_factories, EventKind, Payload};

/// Produces an empty payload that can then read its own fields.
pub type PayloadFactory = fn() -> Payload;

/// Builder for an [`EventRegistry`].
///
/// Registration happens once at startup; the built registry is immutable.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    factories: BTreeMap<u8, PayloadFactory>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for `kind`.
    ///
    /// The factory must produce a payload of the same kind.
    pub fn register(&mut self, kind: EventKind, factory: PayloadFactory) -> WireResult<&mut Self> {
        let produced = factory().kind();
        if produced != kind {
            return Err(WireError::FactoryKindMismatch {
                registered: kind.tag(),
                produced: produced.tag(),
            });
        }
        if self.factories.contains_key(&kind.tag()) {
            return Err(WireError::DuplicateRegistration { tag: kind.tag() });
        }
        self.factories.insert(kind.tag(), factory);
        Ok(self)
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> EventRegistry {
        EventRegistry {
            factories: self.factories,
        }
    }
}

/// Immutable map from event tag to payload factory.
///
/// Shared read-only by every component that decodes frames; pass it by
/// reference or `Arc`.
#[derive(Debug, Clone)]
pub struct EventRegistry {
    factories: BTreeMap<u8, PayloadFactory>,
}

impl EventRegistry {
    /// Registry with every built-in event kind.
    #[must_use]
    pub fn standard() -> Self {
        let mut builder = RegistryBuilder::new();
        for (kind, factory) in standard_factories() {
            let outcome = builder.register(kind, factory).map(|_| ());
            debug_assert!(outcome.is_ok(), "built-in {kind:?}: {outcome:?}");
        }
        builder.build()
    }

    /// Creates an empty payload for `tag`.
    pub fn create(&self, tag: u8) -> WireResult<Payload> {
        self.factories
            .get(&tag)
            .map(|factory| factory())
            .ok_or(WireError::UnknownEventKind { tag })
    }

    /// Returns `true` if `kind` is registered.
    #[must_use]
    pub fn contains(&self, kind: EventKind) -> bool {
        self.factories.contains_key(&kind.tag())
    }

    /// Registered kinds in tag order.
    pub fn kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.factories.keys().filter_map(|tag| EventKind::from_tag(*tag))
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Deterministic fingerprint of the registered `(tag, width)` table.
    ///
    /// Peers exchange this during the handshake; differing values mean the
    /// two sides would decode each other's frames differently.
    #[must_use]
    pub fn protocol_hash(&self) -> u32 {
        let mut hasher = Hasher::new();
        write_u32(&mut hasher, self.factories.len() as u32);
        for kind in self.kinds() {
            hasher.update(&[kind.tag()]);
            write_u32(&mut hasher, kind.payload_width() as u32);
        }
        let hash = hasher.finalize();
        let bytes = hash.as_bytes();
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

fn write_u32(hasher: &mut Hasher, value: u32) {
    hasher.update(&value.to_be_bytes());
}
