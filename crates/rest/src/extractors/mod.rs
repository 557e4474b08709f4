//! Custom extractors for the code list API.

pub mod caller;

pub use caller::{Caller, Credentials};
