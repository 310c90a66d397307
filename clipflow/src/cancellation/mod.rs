//! Cooperative cancellation shared by the executor, stages and poll loops.

mod token;

pub use token::CancellationToken;
