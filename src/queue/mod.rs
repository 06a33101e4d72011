// Bounded background work

pub mod workers;

pub use workers::{WorkerPool, WorkerPools};
