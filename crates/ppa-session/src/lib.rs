pub mod registry;
pub mod session;

pub use registry::{DeviceInfo, DeviceKey, DeviceRegistry};
pub use session::{Session, SessionConfig, SessionError, SessionEvent};
