//! Task lifecycle: directory layout, durable status, the runner that does
//! the work and the supervisor that launches it in a worker process.

pub mod directory;
pub mod runner;
pub mod status;
pub mod supervisor;

pub use directory::{AccessError, RunnerLock, TaskDirectory};
pub use runner::{TaskError, TaskRunner};
pub use status::{read_status, read_status_record, StatusError, StatusRecord, StatusWriter, TaskStatus};
pub use supervisor::{
    InputSource, SupervisorError, TaskHandle, TaskRequest, TaskSupervisor, WorkerOutcome,
};
