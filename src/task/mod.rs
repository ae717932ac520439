//! Task lifecycle: records, storage, dispatch and the submit/poll facade.

pub mod dispatcher;
pub mod model;
pub mod service;
pub mod store;
pub mod validation;

pub use dispatcher::{Dispatcher, Pipeline, PipelineError};
pub use model::{Task, TaskId, TaskStatus, TransitionError};
pub use service::{
    OutputFormat, PollResponse, ServiceError, SubmitReceipt, Submission, TaskOutput,
    TranscriptionService,
};
pub use store::{StoreError, TaskStore};
pub use validation::ValidationError;
