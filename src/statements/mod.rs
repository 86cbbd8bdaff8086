pub mod resolver;

pub use resolver::{resolve, CanonicalField, RawStatement, FIELD_TABLE};
