pub mod decoder;
pub mod factory;
pub mod forward_auth;

pub use factory::build_forward_auth;
pub use forward_auth::{ForwardAuth, ForwardAuthSettings};
