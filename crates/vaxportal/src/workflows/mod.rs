pub mod reporting;
pub mod roster;
pub mod vaccination;
