//! Schema Compiler.
//!
//! Compiles a declarative schema map into a pair `(Validator, WireSchema)`:
//! a runtime parser/validator and a provider-neutral structured-output
//! contract, per the design notes' "dynamic schema → typed model"
//! re-architecture.

pub mod compiler;
pub mod spec;
pub mod types;
pub mod validator;
pub mod wire;

pub use compiler::{compile_fields, compile_schema};
pub use spec::{RawField, RawSchema};
pub use types::{CompiledField, CompiledSchema, Convert, DynValue, FieldType, Lang, ScalarKind};
pub use validator::{Validator, contains_cjk};
pub use wire::WireSchema;

use crate::error::SchemaError;

/// Compiles a declarative schema into both runtime artifacts at once.
///
/// # Errors
///
/// Returns a [`SchemaError`] for any malformed field declaration.
pub fn compile(raw: &RawSchema) -> Result<(Validator, WireSchema), SchemaError> {
    let schema = compile_schema(raw)?;
    let wire = WireSchema::from_compiled(&schema);
    Ok((Validator::new(schema), wire))
}
