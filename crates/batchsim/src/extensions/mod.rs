pub mod job_spawner;
pub mod trace_reader;
