pub mod analysis;
pub mod decode;
pub mod events;
pub mod receipts;

pub use analysis::{AnalysisPayload, RawModelReply, VegetationComparison};
pub use decode::{DecodeOutcome, DecodeStrategy, FallbackRanges, ResponseDecoder};
