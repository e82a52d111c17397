//! Domain models for the KineSphere persistence core.

mod evaluation;
mod patient;
mod session;

pub use evaluation::*;
pub use patient::*;
pub use session::*;
