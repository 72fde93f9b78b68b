#![warn(clippy::all)]

pub mod callbacks;
pub mod config;
pub mod error;
pub mod geometry;
pub mod options;
pub mod remote_operation;
pub mod server;
pub mod server_port;
pub mod suppression;
pub mod synthesis;

pub use callbacks::ScreenRefreshCallback;
pub use callbacks::ScreenUpdateMoveCallback;
pub use callbacks::UserInfo;
pub use config::Backend;
pub use config::RemoteOperationConfig;
pub use error::CGErrorCode;
pub use error::ConfigurationError;
pub use error::CoreGraphicsError;
pub use error::EventErr;
pub use geometry::MoveDelta;
pub use geometry::Point;
pub use geometry::Rect;
pub use geometry::Size;
pub use options::*;
pub use remote_operation::RemoteOperation;
pub use server::ScreenRefreshRects;
pub use server::ScreenUpdate;
pub use server::WindowServer;
pub use server::simulated::SimulatedServer;
pub use server_port::ServerPort;
pub use synthesis::MouseButton;
pub use synthesis::MouseState;
pub use synthesis::SyntheticEvent;

#[cfg(target_os = "macos")]
pub use server::quartz::QuartzServer;

#[derive(thiserror::Error, Debug)]
pub enum RemoteOperationError {
    #[error(transparent)]
    CoreGraphics(#[from] CoreGraphicsError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("the {0} backend is not available on this platform")]
    BackendUnavailable(Backend),
}
