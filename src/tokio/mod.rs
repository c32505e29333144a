//! Async front end, available with the `async` feature
pub mod worker;
