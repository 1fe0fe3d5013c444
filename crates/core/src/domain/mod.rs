pub mod budget;
pub mod contract;
pub mod expense;
pub mod goal;
pub mod report;
pub mod scenario;
pub mod summary;
pub mod transaction;
pub mod validation;
