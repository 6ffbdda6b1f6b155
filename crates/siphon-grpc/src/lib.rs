#![warn(missing_docs)]

//! Siphon gRPC Control Channel
//!
//! Generated client and server code for the coordinator service, plus
//! conversions between wire messages and domain types:
//! - `RegisterExecutor`: one-shot membership announcement
//! - `Heartbeat`: bidirectional stream carrying liveness out and tasks in

// Include generated protobuf code
pub mod proto {
    //! Generated protobuf types and service definitions
    tonic::include_proto!("siphon.coordinator.v1");
}

pub mod conversions;

pub use conversions::ConversionError;
pub use proto::coordinator_service_client::CoordinatorServiceClient;
pub use proto::coordinator_service_server::{CoordinatorService, CoordinatorServiceServer};
