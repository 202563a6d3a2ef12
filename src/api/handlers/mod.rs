pub mod checkpoints;
pub mod logs;
pub mod system;

pub use checkpoints::*;
pub use logs::*;
pub use system::*;
