pub(crate) mod job;
pub(crate) mod properties;
pub(crate) mod unit;
