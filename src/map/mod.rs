pub mod geometry;
pub mod hittest;
pub mod projection;
pub mod raster;
pub mod renderer;

pub use projection::Viewport;
pub use renderer::{Frame, FrameKind, MapLayers};
