pub mod client;
pub mod config;
pub mod error;
pub mod media;
pub mod protocol;
pub mod session;
pub mod transport;

pub use client::RtspClient;
pub use config::{ClientConfig, DeliveryMode, KeepAliveType, MediaFormat};
pub use error::{ClientError, ClientErrorCode, Result, RtspError};
pub use media::{MediaFrame, NalUnit};
pub use session::{ClientSession, Connection, SessionEvent, SessionObserver};
pub use transport::TcpConnection;
