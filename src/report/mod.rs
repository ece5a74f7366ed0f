pub mod job;
pub mod prompt;
pub mod sink;

pub use job::{JobOutcome, ReportJob};
pub use sink::{ConsoleSink, Delivery, FileSink, ReportSink};
