// BlockPool - lock-free sample-block pool with dual SPSC queues
//
// Object pool built from two rtrb ring buffers so the audio input callback
// never allocates. Filled blocks travel from the callback to the session
// thread on the data queue; drained blocks come back on the recycle queue.
//
// Block flow:
// 1. Input callback pops an empty block from the recycle queue
// 2. Callback fills it with one channel of captured samples
// 3. Callback pushes it onto the data queue
// 4. Session thread pops it, feeds the capture strategy
// 5. Session thread clears it and returns it to the recycle queue

use rtrb::{Consumer, Producer, RingBuffer};

/// Number of blocks pre-allocated by default
pub const DEFAULT_BLOCK_COUNT: usize = 32;
/// Default capacity of each block in samples
pub const DEFAULT_BLOCK_SIZE: usize = 2048;

/// One block of captured mono samples
pub type SampleBlock = Vec<f32>;

/// The callback-side ends of the pool
pub struct CallbackChannels {
    /// Push filled blocks towards the session thread
    pub data_producer: Producer<SampleBlock>,
    /// Pop empty blocks to fill
    pub recycle_consumer: Consumer<SampleBlock>,
}

/// The session-side ends of the pool
pub struct SessionChannels {
    /// Pop filled blocks coming from the callback
    pub data_consumer: Consumer<SampleBlock>,
    /// Return drained blocks for reuse
    pub recycle_producer: Producer<SampleBlock>,
}

/// Create a block pool, returning the two thread-facing halves.
///
/// All heap allocation happens here; afterwards blocks only circulate.
///
/// # Panics
/// Panics if `block_count` or `block_size` is zero.
pub fn block_pool(block_count: usize, block_size: usize) -> (CallbackChannels, SessionChannels) {
    assert!(block_count > 0, "block_count must be greater than 0");
    assert!(block_size > 0, "block_size must be greater than 0");

    let (mut recycle_producer, recycle_consumer) = RingBuffer::new(block_count);
    let (data_producer, data_consumer) = RingBuffer::new(block_count);

    for _ in 0..block_count {
        let block = Vec::with_capacity(block_size);
        recycle_producer
            .push(block)
            .expect("pool queue cannot be full during initialization");
    }

    (
        CallbackChannels {
            data_producer,
            recycle_consumer,
        },
        SessionChannels {
            data_consumer,
            recycle_producer,
        },
    )
}
