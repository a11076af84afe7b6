pub mod clear_cache;
pub mod compare;
pub mod connection;
pub mod coverage;
pub mod scan;
pub mod status;

pub use clear_cache::*;
pub use compare::*;
pub use connection::*;
pub use coverage::*;
pub use scan::*;
pub use status::*;
