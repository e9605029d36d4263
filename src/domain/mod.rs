//! Core value types
//!
//! Tasks, prompts, and the two algebraic wrappers: quality-graded values
//! (monad) and context observations (comonad). Everything here is immutable;
//! transformations return new values, which is what makes concurrent
//! composition branches safe without shared state.

mod graded;
mod observation;
mod prompt;
mod task;

pub use graded::GradedValue;
pub use observation::{EmptyContextError, Observation};
pub use prompt::{ComponentRef, ContextComponent, OutputComponent, Prompt, ReasoningComponent};
pub use task::{Complexity, Task};
