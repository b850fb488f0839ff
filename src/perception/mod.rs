pub mod locator;
pub mod readiness;
pub mod session;
