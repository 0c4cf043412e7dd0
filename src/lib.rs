//! The freestanding `<stddef.h>` layer of a C toolchain.
//!
//! A [`machine::Machine`] describes the target. From it the crate resolves the
//! primitive type set (`size_t`, `ptrdiff_t`, `wchar_t`), renders the
//! definitions header, preprocesses translation units that include it and
//! translates their declarations, so that `NULL`, `offsetof` and the typedefs
//! can be checked and evaluated for any configured target.

#[macro_use]
extern crate static_assertions;

#[macro_use]
extern crate lazy_static;

pub mod constant;
pub mod ctype;
pub mod error;
pub mod header;
pub mod machine;
pub mod offsetof;
pub mod preprocess;
pub mod primitive;
pub mod session;
pub mod struct_union;
pub mod translation_unit;
pub mod type_builder;
pub mod type_registry;
pub mod utils;
pub mod value;

#[cfg(test)]
mod test;

pub use error::{CompileError, CompileWarning, ErrorCollector};
pub use header::{HeaderOptions, OffsetofStyle};
pub use machine::{DataModel, Machine};
pub use primitive::PrimitiveTypes;
pub use session::Session;
pub use translation_unit::TranslationUnit;
