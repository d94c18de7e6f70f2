pub mod dispatch;
pub mod types;
pub mod utils;

pub use dispatch::{Dispatch, InferenceClient};
pub use types::*;
