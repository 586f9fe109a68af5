pub mod candle;
pub mod memory;
pub mod signals;

pub use candle::*;
pub use memory::*;
pub use signals::*;
