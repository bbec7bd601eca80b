pub mod errors;
pub mod layout;
pub mod notify;
pub mod paths;
pub mod region;
pub mod ring;
pub mod sizing;

pub use errors::TransportError;
pub use notify::ReadySignal;
pub use ring::{BorrowedFrame, DEFAULT_READ_TIMEOUT, RingConsumer, RingProducer};
pub use sizing::{BASE_RING_CONFIG, RingConfig, compute_ring_config};
