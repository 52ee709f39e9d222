//! Preprocessor support
//!
//! The front end does not run a real preprocessor. Headers are located by
//! [`HeaderResolver`], directives become items of the program graph, and the
//! pieces here cover what is still needed textually: a token lexer for
//! macro bodies and an integer constant folder.

pub mod consteval;
pub mod headers;
pub mod lexer;

pub use headers::{HeaderResolver, IncludeError};
