mod client;
mod session;

pub use client::*;
pub use session::*;
