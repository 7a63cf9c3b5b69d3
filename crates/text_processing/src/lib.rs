//! Text processing for the voice receptionist
//!
//! Model output is written for screens; this crate turns it into text a
//! speech synthesizer can read aloud.
//!
//! # Example
//!
//! ```
//! use receptionist_text_processing::clean;
//!
//! assert_eq!(clean("This is **very** important!"), "This is very important!");
//! assert_eq!(clean(" your"), " your");
//! ```

pub mod sanitizer;

pub use sanitizer::{clean, Rule, RULES};
