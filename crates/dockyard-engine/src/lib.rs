pub mod client;
pub mod executor;
pub mod ports;
pub mod tool;

pub use client::{
    Acquisition, BuildError, CheckResult, CloneError, ComposeUpError, DoctorReport, EngineClient,
    ListError, ListFilesError, LoginError, PortReconcileError, PushError, RunError, StopError,
    StoppedContainer,
};
pub use executor::{Invocation, RealExecutor, ToolExecutor};
pub use ports::{PortBinding, RunningContainer};
pub use tool::{Tool, ToolError};
