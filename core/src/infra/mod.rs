//! Infrastructure shared by the service layer

pub mod sync;
