pub mod http;
pub mod retry;

pub use retry::{random_pause, RetryPolicy};
