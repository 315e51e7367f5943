// Analysis reporting module
// Trace port shared by the scan, classifier and sync stages

pub mod trace;

pub use trace::{
    read_trace_file, FanoutSink, LogSink, MemorySink, TraceBuilder, TraceEntry, TraceError,
    TraceSink, TraceWriter,
};
