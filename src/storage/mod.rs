//! Log streaming pipeline: segments, batch parsing and lazy readers.
//!
//! Data flows one way: segment bytes → [`SegmentReader`] →
//! [`ContinuousBatchParser`] → [`LogReader`] → consumer. Batches are the
//! unit of atomic visibility; any offset exposed by this module denotes a
//! batch boundary.

mod batch;
mod batch_parser;
mod log;
mod log_reader;
mod offset_tracker;
mod segment;
mod segment_reader;

pub use batch::{crc32c, BatchRecords, BatchType, Record, RecordBatch, RecordBatchHeader};
pub use batch_parser::{BatchConsumer, ContinuousBatchParser, ParseStatus, Skip, StopParser};
pub use log::{Log, LogManager};
pub use log_reader::{LogReader, LogReaderConfig};
pub use offset_tracker::OffsetTracker;
pub use segment::{Segment, SegmentSelector, SegmentSet, SegmentStream};
pub use segment_reader::SegmentReader;
