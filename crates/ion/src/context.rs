//! Compilation-wide state threaded explicitly through the pipeline.
//!
//! The source draft this toolchain unifies kept the type intern pool and operator/cast
//! tables at module scope as global mutable statics. That makes every compilation share
//! state and rules out running two compilations concurrently for no benefit, so here they
//! live in one `Context` owned by the driver and passed by reference into the resolver,
//! emitter, and VM constructors instead.

use crate::intern::Interner;
use crate::tables::OperatorTables;
use crate::types::Types;

pub struct Context {
    pub interner: Interner,
    pub types: Types,
    pub operators: OperatorTables,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        let mut types = Types::new();
        let operators = OperatorTables::build(&mut types);
        Self {
            interner: Interner::new(),
            types,
            operators,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
