mod base;
mod batch;
mod kv_store;
mod pipeline;
mod transform;

pub use base::*;
pub use batch::*;
pub use kv_store::*;
pub use pipeline::*;
pub use transform::*;
