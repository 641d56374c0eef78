pub mod density;
pub mod dissolve;
pub mod projection;
pub mod render;

pub use dissolve::dissolve;
pub use projection::UtmProjection;
