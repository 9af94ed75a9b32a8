// Audio plumbing shared by device backends

pub mod block_pool;

pub use block_pool::{
    block_pool, CallbackChannels, SampleBlock, SessionChannels, DEFAULT_BLOCK_COUNT,
    DEFAULT_BLOCK_SIZE,
};
