//! Binding references and their resolution

mod reference;
mod resolver;
mod table;

pub use reference::{BindingKind, BindingPayload, BindingReference};
pub use resolver::{BindingResolveParams, BindingResolveResult, BindingResolver};
pub use table::BindingReferenceTable;
