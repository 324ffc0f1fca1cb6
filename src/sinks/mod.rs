//! Streamline consumers

pub mod visitation;
pub mod median;
pub mod callback;

pub use callback::CallbackSink;
pub use median::MedianSink;
pub use visitation::VisitationMapSink;
