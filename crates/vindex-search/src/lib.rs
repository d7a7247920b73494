//! Read-side navigation services.
//!
//! Query engines over the artifact store and its projections:
//! - jump within one video (nearest envelope in a direction, filtered)
//! - full-text find within one video across transcript and OCR
//! - global jump across all videos in chronological browse order
//! - location lookups over the geo projection

pub mod error;
pub mod find;
pub mod global;
pub mod jump;
pub mod places;
pub mod types;

pub use error::{ErrorBody, SearchError, SearchResult};
pub use find::FindService;
pub use global::{GlobalJumpRequest, GlobalJumpService};
pub use jump::JumpService;
pub use places::LocationService;
pub use types::{FindHit, FindRequest, FindSource, JumpDirection, JumpHit, JumpRequest};
