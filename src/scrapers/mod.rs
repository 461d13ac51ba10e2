pub mod nepremicnine;
pub mod pagination;
pub mod traits;
pub mod types;

pub use nepremicnine::NepremicnineExtractor;
pub use pagination::accumulate;
pub use traits::ListingExtractor;
pub use types::ChannelTarget;
