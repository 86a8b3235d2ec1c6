//! Wire models for the HTTP front-end

pub mod requests;
pub mod responses;

pub use requests::SetRequest;
pub use responses::{
    ErrorResponse, GetResponse, HasResponse, HealthResponse, InvalidateResponse, MessageResponse,
    StatsResponse, SweepResponse,
};
