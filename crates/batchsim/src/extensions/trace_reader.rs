//! Job trace ingestion.

use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use log::{info, warn};

use crate::core::job::Job;

/// Reads job records from a pipe-delimited trace file.
///
/// Two layouts are recognized by their header line: the accounting export
/// (`jobid|jobname|partition|NNodes|NTasks|ReqMem|Submit|Start|Elapsed|`
/// `Account|User|Timelimit|ConsumedEnergy|Priority|State|BatchOnly`) and the
/// energy-tagged export (`Scheduler assigned job id|Submission Time|`
/// `Start Time|End Time|Status|Energy Tag|Number of Utilized Nodes|`
/// `EtS (kWh)|APC (W)`).
pub struct JobTraceReader {
    limit: Option<usize>,
    partition: Option<String>,
}

impl JobTraceReader {
    pub fn new() -> Self {
        Self {
            limit: None,
            partition: None,
        }
    }

    /// Stops reading after the given number of jobs.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Keeps only jobs of the given partition.
    pub fn with_partition(mut self, partition: &str) -> Self {
        self.partition = Some(partition.to_string());
        self
    }

    /// Reads the trace and returns the jobs ordered by submission time.
    pub fn read(&self, file_name: &str) -> Vec<Job> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'|')
            .from_path(file_name)
            .unwrap_or_else(|_| panic!("Can't read file {}", file_name));
        let headers = reader
            .headers()
            .unwrap_or_else(|e| panic!("Can't parse header of {}: {}", file_name, e))
            .clone();

        let jobs = if headers.get(0) == Some("Scheduler assigned job id") {
            self.read_energy_tagged(&mut reader)
        } else {
            if headers.get(0) != Some("jobid") {
                warn!("could not find proper header in {}", file_name);
            }
            self.read_accounting(&mut reader)
        };
        if let Some(limit) = self.limit {
            if jobs.len() >= limit {
                info!("job limit reached: {}", limit);
            }
        }
        jobs
    }

    fn limit_reached(&self, count: usize) -> bool {
        self.limit.map(|limit| count >= limit).unwrap_or(false)
    }

    fn read_accounting(&self, reader: &mut csv::Reader<std::fs::File>) -> Vec<Job> {
        let mut jobs = Vec::new();
        let mut last_submission = 0.;
        for (line, record) in reader.records().enumerate() {
            let record = record.unwrap_or_else(|e| panic!("Bad trace record: {}", e));
            let partition = field(&record, 2);
            if let Some(wanted) = &self.partition {
                if partition.as_deref() != Some(wanted.as_str()) {
                    continue;
                }
            }

            let submission_time = parse_timestamp(&record[6]);
            if submission_time < last_submission {
                warn!("submissions are not sorted incrementally, line {}", line + 2);
            }
            last_submission = submission_time;

            let id = record[0].parse::<u64>().unwrap_or(line as u64);
            let nodes: u32 = record[3].parse().unwrap_or_else(|_| panic!("Bad node count: {}", &record[3]));
            let ppn: u32 = record[4].parse().unwrap_or(1);
            let elapsed: f64 = record[8].parse().unwrap_or_else(|_| panic!("Bad elapsed time: {}", &record[8]));
            if elapsed <= 0. {
                warn!("job {} is empty", id);
                continue;
            }

            let mut job = Job::new(id, &record[1], nodes, ppn, submission_time, vec![elapsed]);
            job.account = field(&record, 9);
            job.user = field(&record, 10);
            job.partition = partition;
            jobs.push(job);
            if self.limit_reached(jobs.len()) {
                break;
            }
        }
        jobs
    }

    fn read_energy_tagged(&self, reader: &mut csv::Reader<std::fs::File>) -> Vec<Job> {
        let mut jobs = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.unwrap_or_else(|e| panic!("Bad trace record: {}", e));
            let id = record[0].parse::<u64>().unwrap_or(line as u64);
            let submission_time = parse_timestamp(&record[1]);
            let elapsed = parse_timestamp(&record[3]) - parse_timestamp(&record[2]);
            let status = &record[4];
            if status == "Removed" && elapsed < 2. {
                continue;
            }
            if elapsed <= 0. {
                warn!("job {} is empty", id);
                continue;
            }
            let nodes: u32 = record[6].parse().unwrap_or_else(|_| panic!("Bad node count: {}", &record[6]));
            let apc = record[8].trim().parse::<f64>().unwrap_or_else(|_| {
                warn!("can't parse APC of job {}, setting it to 0", id);
                0.
            });

            let mut job = Job::new(id, &record[5], nodes, nodes, submission_time, vec![elapsed]);
            job.ets = record[7].trim().parse::<f64>().ok();
            job.apc = Some(apc);
            jobs.push(job);
            if self.limit_reached(jobs.len()) {
                break;
            }
        }
        jobs.sort_by(|a, b| a.submission_time.total_cmp(&b.submission_time));
        jobs
    }
}

impl Default for JobTraceReader {
    fn default() -> Self {
        Self::new()
    }
}

fn field(record: &StringRecord, index: usize) -> Option<String> {
    match record.get(index) {
        None | Some("") => None,
        Some(value) => Some(value.to_string()),
    }
}

/// Accepts epoch seconds or a `YYYY-MM-DD HH:MM:SS` style datetime.
fn parse_timestamp(value: &str) -> f64 {
    if let Ok(seconds) = value.parse::<f64>() {
        return seconds;
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .map(|datetime| datetime.and_utc().timestamp() as f64)
        .unwrap_or_else(|_| panic!("Can't parse timestamp: {}", value))
}
