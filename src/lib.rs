pub mod auth;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod profile;
pub mod protocol;
pub mod wire;
