pub mod client;
pub mod message;
pub mod pixel;

pub use client::*;
pub use message::*;
pub use pixel::*;
