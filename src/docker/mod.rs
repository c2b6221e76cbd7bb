//! Dockerfile handling: locating and rewriting the base image declaration.

pub mod parser;

pub use parser::{parse_recipe, rewrite_base_line, split_reference, Recipe};
