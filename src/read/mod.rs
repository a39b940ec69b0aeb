//! Bounded one-shot reads.

mod consumer;
mod stream;

pub use consumer::ReadStreamConsumer;
pub use stream::ReadStream;
