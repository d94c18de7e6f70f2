pub mod controller;
pub mod history;
mod live;
mod state;

pub use controller::ChatController;
pub use state::StateChange;

#[cfg(test)]
mod tests;
