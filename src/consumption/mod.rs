pub use consumption_thread::ConsumptionThread;
pub use read_records_loop::ConsumerReadRecordsLoop;

mod consumption_thread;
mod read_records_loop;
