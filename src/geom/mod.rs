pub mod sphere;
pub mod tan;

pub use tan::TanWcs;
