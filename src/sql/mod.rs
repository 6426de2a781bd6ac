//! SQL text helpers that need no database: statement builders, name-case conversion and
//! placeholder resolution.

pub mod builder;
pub mod case;
pub mod placeholder;

pub use builder::{Fields, build_insert, build_update};
pub use case::{camel_to_snake, snake_to_camel};
pub use placeholder::{Segment, UndecodedValue, lookup, resolve, tokenize};
