//! Runtime side of the agent: the page actor that serializes browser access,
//! the sampling loop and the session coordinator that ties them to a
//! screenshot stream and an event channel.
pub mod actor;
pub mod events;
pub mod page;
pub mod sampling;
pub mod session;
pub mod streaming;

pub use events::{SessionEvent, TaskStatus};
pub use page::{spawn_page, PageHandle};
pub use sampling::{sampling_loop, LoopOutcome, LoopStatus, SamplingOptions};
pub use session::{SessionConfig, SessionCoordinator, TaskHandle};
pub use streaming::StreamHandle;
