pub mod endpoint;
pub mod pr;
pub mod queries;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
