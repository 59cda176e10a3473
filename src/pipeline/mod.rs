//! Chunk → bounded dispatch → ordered reassembly.
//!
//! ```text
//! ┌──────────┐    ┌──────────────────────┐    ┌────────┐
//! │ Chunker  │───▶│ BoundedDispatcher    │───▶│ Joiner │───▶ artifact
//! │ (split)  │    │ (≤ K transforms live)│    │        │
//! └──────────┘    └──────────────────────┘    └────────┘
//!   units 0..n      results in any order        results in index order
//! ```

pub mod chunker;
pub mod dispatcher;
pub mod stage;
pub mod unit;

pub use chunker::{Boundary, Chunker};
pub use dispatcher::{BoundedDispatcher, RetryPolicy, UnitTransform};
pub use stage::{Joiner, PipelineConfig, Stage, StageOutput, StageReport, StageState};
pub use unit::{OrderedBatch, OrderedResultBatch, Unit, UnitResult};
