//! vision_core: probability-map post-processing and prediction panels.

pub mod overlay;
pub mod postprocess;

pub mod prelude {
    pub use crate::overlay::*;
    pub use crate::postprocess::*;
}
