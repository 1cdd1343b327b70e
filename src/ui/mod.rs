pub mod locator;
pub mod overlays;

pub use locator::{elements, Locator};
pub use overlays::OverlayKind;
