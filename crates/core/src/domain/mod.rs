pub mod access;
pub mod conversation;
pub mod entitlement;
pub mod ratelimit;
pub mod user;
