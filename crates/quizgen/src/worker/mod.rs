pub mod pool;
mod timer;

pub use pool::WorkerPool;
