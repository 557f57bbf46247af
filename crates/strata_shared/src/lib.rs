pub mod block;
pub mod coords;
pub mod protocol;
pub mod worldgen;
