//! Outgoing write path.
//!
//! Writes are statement batches executed off the caller's task by a fixed set
//! of worker shards. Every batch carries a routing key; batches with the same
//! routing key always run on the same shard, in submission order. High
//! frequency fields go through the [`Coalescer`] first.

mod coalescer;
mod task_queue;
pub use coalescer::*;
pub use task_queue::*;

#[cfg(test)]
mod coalescer_test;
#[cfg(test)]
mod task_queue_test;
