pub mod stack_depth;

pub use stack_depth::{max_stack_depth, Analysis, StackDepth};
