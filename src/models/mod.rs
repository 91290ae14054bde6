pub mod message;
pub mod segment;
pub mod session;

pub use message::{Message, NewMessage, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_USER, SEGMENT_ID_KEY};
pub use segment::{Segment, SegmentInput, SegmentOutcome, SegmentSpec, SegmentStatus};
pub use session::{SessionState, Summary, TimingSummary};
