pub mod checkpoint;
pub mod event;

pub use checkpoint::*;
pub use event::*;
