//! Interning for identifiers and string literals.
//!
//! Every name and string literal in a source file is interned once and referred to by a
//! [`StringId`] afterward, so declaration-name comparisons and `Name` expression lookups are
//! integer comparisons rather than string comparisons.

use ahash::AHashMap;

/// Index into an [`Interner`]'s storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StringId(u32);

impl StringId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Deduplicating string table. Source buffers, identifiers, and string literals are all
/// interned through the same pool.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    lookup: AHashMap<Box<str>, StringId>,
}

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: &str) -> StringId {
        if let Some(&id) = self.lookup.get(text) {
            return id;
        }
        let id = StringId(u32::try_from(self.strings.len()).expect("interner exceeded u32 capacity"));
        let boxed: Box<str> = text.into();
        self.strings.push(boxed.clone());
        self.lookup.insert(boxed, id);
        id
    }

    #[must_use]
    pub fn resolve(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_deduplicated() {
        let mut interner = Interner::new();
        let a = interner.intern("main");
        let b = interner.intern("main");
        let c = interner.intern("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.resolve(a), "main");
        assert_eq!(interner.resolve(c), "other");
    }
}
